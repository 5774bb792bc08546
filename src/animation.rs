//! Time-based movement of items towards their target slots.
//!
//! Every move runs as its own tokio task that samples the easing curve once per
//! frame tick and writes the interpolated position into the shared scene. The
//! task finishes by writing the exact target. Callers await an
//! [`AnimationHandle`]; the sequencer keeps an abort handle for every task so a
//! new run can stop all motion before it starts writing positions itself.

use crate::config::{Easing, SnapConfig};
use crate::error::{Result, SnapError};
use crate::history::ItemMove;
use crate::layout::SlotAssignment;
use crate::types::{lock_scene, ItemId, Point, SharedScene};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{Instant, MissedTickBehavior};

/// Completion signal of one move.
#[derive(Debug)]
pub struct AnimationHandle {
    task: Option<JoinHandle<()>>,
}

impl AnimationHandle {
    fn done() -> Self {
        Self { task: None }
    }

    /// Waits for the move to finish. Fails with [`SnapError::Cancelled`] when
    /// the move was aborted.
    pub async fn finished(self) -> Result<()> {
        match self.task {
            None => Ok(()),
            Some(task) => task.await.map_err(|err| {
                if !err.is_cancelled() {
                    log::warn!("animation task failed: {err}");
                }
                SnapError::Cancelled
            }),
        }
    }

    /// Stops the move where it is.
    pub fn abort(&self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

/// Moves items of a shared scene over time.
#[derive(Debug, Clone)]
pub struct AnimationSequencer {
    scene: SharedScene,
    duration: Duration,
    easing: Easing,
    frame_interval: Duration,
    in_flight: Arc<Mutex<Vec<AbortHandle>>>,
}

impl AnimationSequencer {
    pub fn new(scene: SharedScene, config: &SnapConfig) -> Self {
        Self {
            scene,
            duration: config.move_duration(),
            easing: config.easing,
            frame_interval: config.frame_interval(),
            in_flight: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn scene(&self) -> &SharedScene {
        &self.scene
    }

    /// Number of moves that have not finished yet.
    pub fn active_count(&self) -> usize {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
        in_flight.retain(|handle| !handle.is_finished());
        in_flight.len()
    }

    /// Moves `id` from where it is now to `target` over `duration`.
    ///
    /// A zero duration places the item immediately. Unknown ids complete
    /// immediately without touching the scene.
    ///
    /// # Arguments
    ///
    /// * `id` - Item to move
    /// * `target` - Final position, written exactly when the move ends
    /// * `duration` - Total time of the move
    /// * `easing` - Curve mapping elapsed time to progress
    pub fn animate_to(
        &self,
        id: &ItemId,
        target: Point,
        duration: Duration,
        easing: Easing,
    ) -> AnimationHandle {
        let start = {
            let mut scene = lock_scene(&self.scene);
            let Some(start) = scene.get(id).map(|item| item.position) else {
                log::debug!("animate_to: {id} is not in the scene");
                return AnimationHandle::done();
            };
            if duration.is_zero() {
                scene.set_position(id, target);
                return AnimationHandle::done();
            }
            start
        };

        let scene = self.scene.clone();
        let frame = self.frame_interval;
        let id = id.clone();
        let task = tokio::spawn(async move {
            let began = Instant::now();
            let mut ticker = tokio::time::interval(frame);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let t = began.elapsed().as_secs_f32() / duration.as_secs_f32();
                if t >= 1.0 {
                    break;
                }
                let position = start.lerp(target, easing.evaluate(t));
                lock_scene(&scene).set_position(&id, position);
            }
            lock_scene(&scene).set_position(&id, target);
        });

        let mut in_flight = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
        in_flight.retain(|handle| !handle.is_finished());
        in_flight.push(task.abort_handle());
        AnimationHandle { task: Some(task) }
    }

    /// [`Self::animate_to`] with the configured duration and easing.
    pub fn move_item(&self, id: &ItemId, target: Point) -> AnimationHandle {
        self.animate_to(id, target, self.duration, self.easing)
    }

    /// Moves the items of one sub-group strictly one after the other, pausing
    /// `inter_item_delay` between consecutive moves.
    ///
    /// Each finished move is appended to `moves` with its start position as
    /// soon as it completes, so a cancelled sub-group still reports the moves
    /// it made. An item cut off mid-move is not recorded.
    pub async fn animate_sub_group_sequentially(
        &self,
        slots: &[SlotAssignment],
        inter_item_delay: Duration,
        moves: &mut Vec<ItemMove>,
    ) -> Result<()> {
        for (i, slot) in slots.iter().enumerate() {
            if i > 0 && !inter_item_delay.is_zero() {
                tokio::time::sleep(inter_item_delay).await;
            }
            let from = lock_scene(&self.scene).get(&slot.id).map(|item| item.position);
            let Some(from) = from else {
                continue;
            };
            self.move_item(&slot.id, slot.target).finished().await?;
            log::debug!("moved {} from {} to {}", slot.id, from, slot.target);
            moves.push(ItemMove {
                id: slot.id.clone(),
                from,
                to: slot.target,
            });
        }
        Ok(())
    }

    /// Aborts every move still in flight. Items stay where they are.
    pub fn cancel_all(&self) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
        let stopped = in_flight.iter().filter(|h| !h.is_finished()).count();
        for handle in in_flight.drain(..) {
            handle.abort();
        }
        if stopped > 0 {
            log::info!("cancelled {stopped} in-flight animation(s)");
        }
    }
}
