//! One arrangement run from trigger to summary.
//!
//! A run collects the active items no group owns yet, buckets them by class and
//! walks the classes in the configured order. For each class it waits until the
//! display driver has expanded that class, moves the class's items into their
//! sub-group slots one at a time, then reports completion and waits for the
//! collapse before moving on. Only one run is active at a time; a trigger that
//! arrives while a run is in progress is rejected, never queued.

use crate::animation::AnimationSequencer;
use crate::config::{GroupingStrategy, SnapConfig};
use crate::error::{Result, SnapError};
use crate::events::{ArrangeEvent, EventSink};
use crate::grouping::{dedupe_by_id, group_by_distance, group_by_type, ungrouped};
use crate::history::{ArrangementHistory, ItemMove, RunRecord};
use crate::layout::{lock_registry, GroupRegistry, SharedRegistry};
use crate::monitor::ContainerMonitor;
use crate::rendezvous::{drive_display, Rendezvous};
use crate::stabilize::{StabilizationLoop, StabilizeReport};
use crate::types::{lock_scene, Item, ItemId, Scene, SharedScene};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;

/// What a finished run did.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Sequence number of the run, starting at 1
    pub run: u32,
    /// Classes that received new groups, in processing order
    pub classes: Vec<String>,
    /// Every move made, grouping first and stabilization after
    pub moves: Vec<ItemMove>,
    /// Present when stabilization ran after grouping; its warnings are moved
    /// into `warnings`
    pub stabilization: Option<StabilizeReport>,
    /// Recovered problems; none of them stopped the run
    pub warnings: Vec<SnapError>,
}

/// Clears the processing flag however the run ends, including when its future
/// is dropped half way.
struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Orchestrates arrangement runs over a shared scene.
pub struct Arranger {
    scene: SharedScene,
    registry: SharedRegistry,
    config: SnapConfig,
    sequencer: AnimationSequencer,
    rendezvous: Rendezvous,
    events: EventSink,
    history: Mutex<ArrangementHistory>,
    processing: AtomicBool,
    run_counter: AtomicU32,
}

impl Arranger {
    pub fn new(scene: SharedScene, config: SnapConfig, events: EventSink) -> Self {
        let sequencer = AnimationSequencer::new(scene.clone(), &config);
        Self {
            scene,
            registry: GroupRegistry::new().into_shared(),
            config,
            sequencer,
            rendezvous: Rendezvous::new(),
            events,
            history: Mutex::new(ArrangementHistory::new()),
            processing: AtomicBool::new(false),
            run_counter: AtomicU32::new(0),
        }
    }

    pub fn scene(&self) -> &SharedScene {
        &self.scene
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn config(&self) -> &SnapConfig {
        &self.config
    }

    /// Handshake the display driver must answer during runs.
    pub fn rendezvous(&self) -> &Rendezvous {
        &self.rendezvous
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    /// Number of runs started so far.
    pub fn run_count(&self) -> u32 {
        self.run_counter.load(Ordering::SeqCst)
    }

    /// Monitor over this arranger's scene and groups.
    pub fn monitor(&self) -> ContainerMonitor {
        ContainerMonitor::new(self.scene.clone(), self.registry.clone(), self.events.clone())
    }

    /// Starts polling this arranger's groups every `monitor_interval_ms`.
    /// The task runs until aborted.
    pub fn start_monitor(&self) -> JoinHandle<()> {
        self.monitor().spawn(self.config.monitor_interval())
    }

    /// Stops the active run: waiters on the handshake give up and every
    /// animation stops where it is. The run then returns [`SnapError::Cancelled`].
    pub fn cancel(&self) {
        log::info!("cancelling arrangement");
        self.rendezvous.abort();
        self.sequencer.cancel_all();
    }

    /// Moves the items of the last run back to where they started.
    pub fn undo(&self) -> Option<u32> {
        let mut history = self.history.lock().unwrap_or_else(|p| p.into_inner());
        history.undo(&mut lock_scene(&self.scene))
    }

    /// Re-applies the last undone run.
    pub fn redo(&self) -> Option<u32> {
        let mut history = self.history.lock().unwrap_or_else(|p| p.into_inner());
        history.redo(&mut lock_scene(&self.scene))
    }

    /// Starts an arrangement run and waits for it to finish.
    ///
    /// The handshake is reset when the run starts, so a display driver should
    /// be started together with the run, not before it.
    ///
    /// A run that stops early keeps the moves it finished, on the undo stack
    /// and in the groups. Items it planned but never moved are released for
    /// the next run.
    ///
    /// # Returns
    ///
    /// The run's report, or [`SnapError::ReentrantTriggerRejected`] when another
    /// run is active. Handshake violations and cancellation also end the run
    /// with an error; everything else is reported as a warning.
    pub async fn arrange(&self) -> Result<RunReport> {
        if self
            .processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            if self.config.log_rejected_triggers {
                log::warn!("arrangement already in progress, trigger ignored");
            } else {
                log::debug!("arrangement already in progress, trigger ignored");
            }
            return Err(SnapError::ReentrantTriggerRejected);
        }
        let _guard = ProcessingGuard(&self.processing);

        // Leftovers of a cancelled run must not keep writing positions.
        self.sequencer.cancel_all();
        if self.config.use_rendezvous {
            self.rendezvous.reset();
        }

        let run = self.run_counter.fetch_add(1, Ordering::SeqCst) + 1;
        log::info!("arrangement run {run} started");

        let mut report = RunReport {
            run,
            ..RunReport::default()
        };
        let outcome = self.execute(&mut report).await;
        self.events.emit(ArrangeEvent::RunFinished { run });

        self.history
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(RunRecord {
                run,
                moves: report.moves.clone(),
            });

        if let Err(err) = outcome {
            log::warn!("arrangement run {run} stopped: {err}");
            self.sequencer.cancel_all();
            if self.config.use_rendezvous {
                self.rendezvous.abort();
            }
            self.release_unfinished(&report);
            return Err(err);
        }

        log::info!(
            "arrangement run {run} finished: {} class(es), {} move(s), {} warning(s)",
            report.classes.len(),
            report.moves.len(),
            report.warnings.len()
        );
        Ok(report)
    }

    /// Hands back the membership a failed run planned for items it never
    /// finished moving, so the next run picks them up again.
    fn release_unfinished(&self, report: &RunReport) {
        let committed: HashSet<ItemId> = report.moves.iter().map(|m| m.id.clone()).collect();
        let released = lock_registry(&self.registry).release_uncommitted(report.run, &committed);
        if released.is_empty() {
            return;
        }
        log::info!(
            "run {}: released {} unfinished item(s) for the next run",
            report.run,
            released.len()
        );
        let mut scene = lock_scene(&self.scene);
        for id in &released {
            if let Some(item) = scene.get_mut(id) {
                item.grouped = false;
            }
        }
    }

    fn mark_grouped(&self, moves: &[ItemMove]) {
        let mut scene = lock_scene(&self.scene);
        for id in moves.iter().map(|m| &m.id) {
            if let Some(item) = scene.get_mut(id) {
                item.grouped = true;
            }
        }
    }

    /// Runs [`Self::arrange`] together with [`drive_display`], which expands
    /// and collapses every class as soon as it is asked to.
    pub async fn arrange_with_scripted_display(&self) -> Result<RunReport> {
        if !self.config.use_rendezvous {
            return self.arrange().await;
        }
        let driver = drive_display(self.rendezvous.clone(), Duration::ZERO);
        let (report, visited) = futures::future::join(self.arrange(), driver).await;
        let report = report?;
        log::debug!("display driver visited {:?}", visited?);
        Ok(report)
    }

    /// Items a run may group: active components not owned by a group, each id once.
    fn collect_batch(&self) -> Vec<Item> {
        let items = lock_scene(&self.scene).active_items();
        let grouped = lock_registry(&self.registry).grouped_ids().clone();
        dedupe_by_id(ungrouped(items, &grouped))
            .into_iter()
            .filter(Item::collides)
            .collect()
    }

    async fn execute(&self, report: &mut RunReport) -> Result<()> {
        let batch = self.collect_batch();
        log::debug!("run {}: {} ungrouped item(s)", report.run, batch.len());

        let bare: HashSet<ItemId> = batch
            .iter()
            .filter(|item| !item.has_geometry())
            .map(|item| item.id.clone())
            .collect();
        for id in &bare {
            log::debug!("{id} has no geometry, using unit bounds");
            report
                .warnings
                .push(SnapError::MissingGeometry { item: id.clone() });
        }

        let (mut known, unknown): (BTreeMap<_, _>, BTreeMap<_, _>) = group_by_type(&batch)
            .into_iter()
            .partition(|(class, _)| self.config.is_known_class(class));
        for (class, items) in unknown {
            let err = SnapError::UnknownClass { class };
            log::warn!("{err} ({} item(s))", items.len());
            report.warnings.push(err);
        }
        let order: Vec<(String, Vec<Item>)> = self
            .config
            .class_sequence
            .iter()
            .filter_map(|class| known.remove_entry(class))
            .collect();

        for (class, items) in order {
            self.arrange_class(&class, &items, report).await?;
        }

        if self.config.stabilize_after_arrange {
            let mut stabilization = StabilizeReport::default();
            let outcome = StabilizationLoop::new(&self.sequencer, &self.config)
                .run_into(&mut stabilization)
                .await;
            report.moves.extend(stabilization.moves.iter().cloned());
            outcome?;
            let warnings = std::mem::take(&mut stabilization.warnings);
            report.warnings.extend(warnings.into_iter().filter(
                |w| !matches!(w, SnapError::MissingGeometry { item } if bare.contains(item)),
            ));
            report.stabilization = Some(stabilization);
        }

        if self.config.use_rendezvous {
            self.rendezvous.finish();
        }

        let (classes, summary) = {
            let registry = lock_registry(&self.registry);
            (registry.non_empty_classes(), registry.summary())
        };
        for class in classes {
            self.events.emit(ArrangeEvent::GroupFormed(class));
        }
        log::info!("{summary}");
        Ok(())
    }

    async fn arrange_class(
        &self,
        class: &str,
        items: &[Item],
        report: &mut RunReport,
    ) -> Result<()> {
        let clusters = match self.config.grouping {
            GroupingStrategy::ByType => vec![items.to_vec()],
            GroupingStrategy::ByDistance => {
                group_by_distance(items, self.config.distance_threshold)
            }
        };
        let anchor = self.config.class_anchors.get(class).copied();

        let plans: Vec<_> = {
            let mut registry = lock_registry(&self.registry);
            clusters
                .iter()
                .filter(|cluster| !cluster.is_empty())
                .flat_map(|cluster| {
                    registry.assign(class, report.run, cluster, anchor, &self.config)
                })
                .collect()
        };
        if plans.is_empty() {
            log::debug!("class {class}: nothing to arrange");
            return Ok(());
        }

        if self.config.use_rendezvous {
            self.events.emit(ArrangeEvent::ReadyForNextClass(class.to_string()));
            self.rendezvous.request_class(class)?;
            self.rendezvous.wait_display_expanded(class).await?;
        }

        log::info!("arranging class {class} in {} sub-group(s)", plans.len());
        for slots in &plans {
            let done = report.moves.len();
            let outcome = self
                .sequencer
                .animate_sub_group_sequentially(
                    slots,
                    self.config.inter_item_delay(),
                    &mut report.moves,
                )
                .await;
            self.mark_grouped(&report.moves[done..]);
            outcome?;
        }
        self.events.emit(ArrangeEvent::GroupFormed(class.to_string()));
        report.classes.push(class.to_string());

        if self.config.use_rendezvous {
            self.rendezvous.arrangement_complete(class)?;
        }
        self.events
            .emit(ArrangeEvent::ArrangementComplete(class.to_string()));
        let delay = self.config.inter_class_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.config.use_rendezvous {
            self.rendezvous.wait_collapsed(class).await?;
        }
        Ok(())
    }
}

/// Runs one arrangement on `scene` with a display driver that answers the
/// handshake immediately.
///
/// # Returns
///
/// The run's report and the scene as the run left it.
pub async fn run_headless(scene: Scene, config: SnapConfig) -> Result<(RunReport, Scene)> {
    let shared = scene.into_shared();
    let arranger = Arranger::new(shared.clone(), config, EventSink::disconnected());
    let report = arranger.arrange_with_scripted_display().await?;

    let scene = lock_scene(&shared).clone();
    Ok((report, scene))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Point;
    use std::sync::Arc;

    fn scene(names: &[&str]) -> SharedScene {
        let mut scene = Scene::new();
        for (i, name) in names.iter().enumerate() {
            scene.add_item(Item::sized(name, Point::new(i as f32 * 2.0, 0.0), 1.0, 1.0));
        }
        scene.into_shared()
    }

    fn quiet() -> SnapConfig {
        SnapConfig {
            use_rendezvous: false,
            ..SnapConfig::default().instant()
        }
    }

    #[tokio::test]
    async fn test_run_groups_items_and_marks_them() {
        let scene = scene(&["R1", "R2", "C1"]);
        let arranger = Arranger::new(scene.clone(), quiet(), EventSink::disconnected());

        let report = arranger.arrange().await.unwrap();
        assert_eq!(report.run, 1);
        assert_eq!(report.classes, vec!["R", "C"]);
        assert!(!arranger.is_processing());

        let guard = lock_scene(&scene);
        assert!(guard.items.values().all(|item| item.grouped));
        let registry = lock_registry(arranger.registry());
        assert_eq!(registry.groups_for("R")[0].name, "R_Subgroups_1");
        assert_eq!(registry.groups_for("C")[0].name, "C_Subgroups_1");
    }

    #[tokio::test]
    async fn test_second_run_leaves_grouped_items_alone() {
        let scene = scene(&["R1", "R2"]);
        let arranger = Arranger::new(scene.clone(), quiet(), EventSink::disconnected());
        arranger.arrange().await.unwrap();
        let before = lock_scene(&scene).clone();

        lock_scene(&scene).place("R", Point::new(30.0, 30.0), None);
        let report = arranger.arrange().await.unwrap();

        assert_eq!(report.run, 2);
        assert_eq!(report.moves.len(), 1);
        assert_eq!(report.moves[0].id, ItemId::new("R", 3));
        let after = lock_scene(&scene);
        for (id, item) in &before.items {
            assert_eq!(after.get(id).unwrap().position, item.position);
        }
        assert_eq!(lock_registry(arranger.registry()).groups_for("R").len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_class_is_skipped_with_warning() {
        let scene = scene(&["R1", "W1"]);
        let arranger = Arranger::new(scene.clone(), quiet(), EventSink::disconnected());

        let report = arranger.arrange().await.unwrap();
        assert_eq!(report.classes, vec!["R"]);
        assert!(report
            .warnings
            .iter()
            .any(|w| matches!(w, SnapError::UnknownClass { class } if class == "W")));
        assert!(!lock_scene(&scene).get(&ItemId::new("W", 1)).unwrap().grouped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reentrant_trigger_is_rejected() {
        let scene = scene(&["R1", "R2"]);
        let config = SnapConfig {
            use_rendezvous: false,
            ..SnapConfig::default()
        };
        let arranger = Arranger::new(scene, config, EventSink::disconnected());

        let (first, second) = futures::future::join(arranger.arrange(), async {
            tokio::task::yield_now().await;
            assert!(arranger.is_processing());
            arranger.arrange().await
        })
        .await;

        assert!(first.is_ok());
        assert!(matches!(second, Err(SnapError::ReentrantTriggerRejected)));
        assert_eq!(arranger.run_count(), 1);
        assert!(!arranger.is_processing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_run() {
        let scene = scene(&["R1", "R2", "R3"]);
        let config = SnapConfig {
            use_rendezvous: false,
            ..SnapConfig::default()
        };
        let arranger = Arc::new(Arranger::new(scene, config, EventSink::disconnected()));

        let run = {
            let arranger = arranger.clone();
            tokio::spawn(async move { arranger.arrange().await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        arranger.cancel();

        assert!(matches!(run.await.unwrap(), Err(SnapError::Cancelled)));
        assert!(!arranger.is_processing());
        // A fresh trigger is accepted afterwards.
        assert!(arranger.arrange().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_run_can_be_undone_and_retried() {
        let mut shared = Scene::new();
        shared.add_item(Item::sized("R1", Point::new(2.0, 0.0), 1.0, 1.0));
        shared.add_item(Item::sized("R2", Point::new(0.0, 0.0), 1.0, 1.0));
        let scene = shared.into_shared();
        let config = SnapConfig {
            use_rendezvous: false,
            ..SnapConfig::default()
        };
        let arranger = Arc::new(Arranger::new(scene.clone(), config, EventSink::disconnected()));

        let run = {
            let arranger = arranger.clone();
            tokio::spawn(async move { arranger.arrange().await })
        };
        // R1 is in place after ~500 ms, R2 is still moving at 1 s.
        tokio::time::sleep(Duration::from_millis(1000)).await;
        arranger.cancel();
        assert!(matches!(run.await.unwrap(), Err(SnapError::Cancelled)));

        let r1 = ItemId::new("R", 1);
        let r2 = ItemId::new("R", 2);
        {
            let registry = lock_registry(arranger.registry());
            assert!(registry.is_grouped(&r1));
            assert!(!registry.is_grouped(&r2));
            let guard = lock_scene(&scene);
            assert!(guard.get(&r1).unwrap().grouped);
            assert!(!guard.get(&r2).unwrap().grouped);
        }

        // The finished part of the cancelled run is on the undo stack.
        assert_eq!(lock_scene(&scene).get(&r1).unwrap().position, Point::ZERO);
        assert_eq!(arranger.undo(), Some(1));
        assert_eq!(lock_scene(&scene).get(&r1).unwrap().position, Point::new(2.0, 0.0));

        let retry = arranger.arrange().await.unwrap();
        let moved: Vec<&ItemId> = retry.moves.iter().map(|m| &m.id).collect();
        assert_eq!(moved, vec![&r2]);
        assert!(lock_scene(&scene).get(&r2).unwrap().grouped);
    }

    #[tokio::test]
    async fn test_released_item_is_arranged_again() {
        let scene = scene(&["R1", "R2"]);
        let arranger = Arranger::new(scene.clone(), quiet(), EventSink::disconnected());
        arranger.arrange().await.unwrap();

        let r1 = ItemId::new("R", 1);
        lock_scene(&scene).deactivate(&r1);
        arranger.monitor().check_once();
        if let Some(item) = lock_scene(&scene).get_mut(&r1) {
            item.active = true;
            item.position = Point::new(40.0, 40.0);
        }

        let report = arranger.arrange().await.unwrap();
        assert_eq!(report.classes, vec!["R"]);
        assert_eq!(report.moves.len(), 1);
        assert_eq!(report.moves[0].id, r1);
        let guard = lock_scene(&scene);
        let item = guard.get(&r1).unwrap();
        assert!(item.grouped);
        assert_ne!(item.position, Point::new(40.0, 40.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_started_monitor_reports_groups() {
        let scene = scene(&["R1", "C1"]);
        let (sink, mut rx) = EventSink::channel();
        let arranger = Arranger::new(scene.clone(), quiet(), sink);
        arranger.arrange().await.unwrap();
        while rx.try_recv().is_ok() {}

        let monitor = arranger.start_monitor();
        assert_eq!(rx.recv().await, Some(ArrangeEvent::GroupFormed("C".into())));
        assert_eq!(rx.recv().await, Some(ArrangeEvent::GroupFormed("R".into())));

        lock_scene(&scene).deactivate(&ItemId::new("R", 1));
        assert_eq!(rx.recv().await, Some(ArrangeEvent::GroupEmptied("R".into())));
        monitor.abort();
    }

    #[tokio::test]
    async fn test_events_and_history() {
        let scene = scene(&["R1", "R2", "C1"]);
        let (sink, mut rx) = EventSink::channel();
        let arranger = Arranger::new(scene.clone(), quiet(), sink);
        let start = lock_scene(&scene).get(&ItemId::new("R", 2)).unwrap().position;

        arranger.arrange().await.unwrap();
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                ArrangeEvent::GroupFormed("R".into()),
                ArrangeEvent::ArrangementComplete("R".into()),
                ArrangeEvent::GroupFormed("C".into()),
                ArrangeEvent::ArrangementComplete("C".into()),
                ArrangeEvent::GroupFormed("C".into()),
                ArrangeEvent::GroupFormed("R".into()),
                ArrangeEvent::RunFinished { run: 1 },
            ]
        );

        assert_eq!(start, Point::new(2.0, 0.0));
        assert_eq!(arranger.undo(), Some(1));
        assert_eq!(
            lock_scene(&scene).get(&ItemId::new("R", 2)).unwrap().position,
            start
        );
        assert_eq!(arranger.redo(), Some(1));
        assert_eq!(
            lock_scene(&scene).get(&ItemId::new("R", 2)).unwrap().position,
            Point::new(0.0, -3.0)
        );
    }

    #[tokio::test]
    async fn test_run_headless_with_driver() {
        let mut scene = Scene::new();
        for n in 1..=7 {
            scene.add_item(Item::sized(&format!("R{n}"), Point::new(n as f32, n as f32), 1.0, 1.0));
        }
        let config = SnapConfig {
            class_anchors: [("R".to_string(), Point::ZERO)].into_iter().collect(),
            ..SnapConfig::default().instant()
        };

        let (report, scene) = run_headless(scene, config).await.unwrap();
        assert_eq!(report.classes, vec!["R"]);
        assert_eq!(scene.get(&ItemId::new("R", 5)).unwrap().position, Point::new(0.0, -12.0));
        assert_eq!(scene.get(&ItemId::new("R", 7)).unwrap().position, Point::new(3.0, -3.0));
    }
}
