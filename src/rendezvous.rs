//! Two-phase handshake between the arranger and the display driver.
//!
//! For every class the arranger processes:
//!
//! ```text
//! Idle
//!  -> AwaitingDisplayExpand   arranger requests the class
//!  -> Arranging               driver reports the display expanded
//!  -> ArrangementComplete     arranger is done moving items
//!  -> AwaitingCollapse        arranger waits for the collapse
//!  -> Idle                    driver reports the display collapsed
//! ```
//!
//! The current phase lives in a `tokio::sync::watch` channel shared by both
//! sides, so every wait is a wake-up on a state change and never a poll. A
//! transition attempted from the wrong phase fails with
//! [`SnapError::HandshakeOutOfOrder`] and leaves the phase untouched.

use crate::error::{Result, SnapError};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Where the handshake currently stands.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HandshakePhase {
    #[default]
    Idle,
    AwaitingDisplayExpand(String),
    Arranging(String),
    ArrangementComplete(String),
    AwaitingCollapse(String),
    /// The run cycled through all of its classes.
    Finished,
    /// The run was cancelled; every waiter gives up.
    Aborted,
}

impl fmt::Display for HandshakePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakePhase::Idle => write!(f, "Idle"),
            HandshakePhase::AwaitingDisplayExpand(c) => write!(f, "AwaitingDisplayExpand({c})"),
            HandshakePhase::Arranging(c) => write!(f, "Arranging({c})"),
            HandshakePhase::ArrangementComplete(c) => write!(f, "ArrangementComplete({c})"),
            HandshakePhase::AwaitingCollapse(c) => write!(f, "AwaitingCollapse({c})"),
            HandshakePhase::Finished => write!(f, "Finished"),
            HandshakePhase::Aborted => write!(f, "Aborted"),
        }
    }
}

/// Shared handshake state. Clones observe and drive the same phase.
#[derive(Debug, Clone)]
pub struct Rendezvous {
    tx: Arc<watch::Sender<HandshakePhase>>,
}

impl Default for Rendezvous {
    fn default() -> Self {
        Self::new()
    }
}

impl Rendezvous {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(HandshakePhase::Idle);
        Self { tx: Arc::new(tx) }
    }

    pub fn phase(&self) -> HandshakePhase {
        self.tx.borrow().clone()
    }

    /// Receiver that yields on every phase change.
    pub fn subscribe(&self) -> watch::Receiver<HandshakePhase> {
        self.tx.subscribe()
    }

    /// True while the display for `class` is expanded.
    pub fn is_display_expanded(&self, class: &str) -> bool {
        matches!(
            &*self.tx.borrow(),
            HandshakePhase::Arranging(c)
                | HandshakePhase::ArrangementComplete(c)
                | HandshakePhase::AwaitingCollapse(c) if c == class
        )
    }

    fn transition(
        &self,
        class: &str,
        expected: &str,
        allowed: impl FnOnce(&HandshakePhase) -> bool,
        next: HandshakePhase,
    ) -> Result<()> {
        let mut outcome = Ok(());
        self.tx.send_if_modified(|phase| {
            if allowed(phase) {
                *phase = next;
                true
            } else {
                outcome = Err(SnapError::HandshakeOutOfOrder {
                    class: class.to_string(),
                    expected: expected.to_string(),
                    actual: phase.to_string(),
                });
                false
            }
        });
        outcome
    }

    async fn wait_until(
        &self,
        mut done: impl FnMut(&HandshakePhase) -> bool,
    ) -> Result<HandshakePhase> {
        let mut rx = self.tx.subscribe();
        let phase = rx
            .wait_for(|p| *p == HandshakePhase::Aborted || done(p))
            .await
            .map_err(|_| SnapError::Cancelled)?
            .clone();
        if phase == HandshakePhase::Aborted {
            return Err(SnapError::Cancelled);
        }
        Ok(phase)
    }

    // Arranger side

    /// Starts a new run from a clean state.
    pub fn reset(&self) {
        self.tx.send_replace(HandshakePhase::Idle);
    }

    /// Announces that `class` is next and its display should expand.
    pub fn request_class(&self, class: &str) -> Result<()> {
        self.transition(
            class,
            "Idle",
            |p| *p == HandshakePhase::Idle,
            HandshakePhase::AwaitingDisplayExpand(class.to_string()),
        )
    }

    /// Suspends until the driver reports the display for `class` as expanded.
    pub async fn wait_display_expanded(&self, class: &str) -> Result<()> {
        let phase = self
            .wait_until(|p| !matches!(p, HandshakePhase::AwaitingDisplayExpand(c) if c == class))
            .await?;
        match phase {
            HandshakePhase::Arranging(c) if c == class => Ok(()),
            other => Err(SnapError::HandshakeOutOfOrder {
                class: class.to_string(),
                expected: format!("Arranging({class})"),
                actual: other.to_string(),
            }),
        }
    }

    /// Reports that every item of `class` reached its slot.
    pub fn arrangement_complete(&self, class: &str) -> Result<()> {
        self.transition(
            class,
            &format!("Arranging({class})"),
            |p| matches!(p, HandshakePhase::Arranging(c) if c == class),
            HandshakePhase::ArrangementComplete(class.to_string()),
        )
    }

    /// Suspends until the driver collapsed the display for `class`.
    pub async fn wait_collapsed(&self, class: &str) -> Result<()> {
        self.tx.send_if_modified(|phase| match phase {
            HandshakePhase::ArrangementComplete(c) if c == class => {
                *phase = HandshakePhase::AwaitingCollapse(class.to_string());
                true
            }
            _ => false,
        });
        self.wait_until(|p| !is_done_with(p, class))
            .await
            .map(|_| ())
    }

    /// Marks the end of a run; a waiting driver returns.
    pub fn finish(&self) {
        self.tx.send_replace(HandshakePhase::Finished);
    }

    /// Wakes every waiter with [`SnapError::Cancelled`].
    pub fn abort(&self) {
        self.tx.send_replace(HandshakePhase::Aborted);
    }

    // Driver side

    /// Waits for the next class request. `None` once the run has finished.
    pub async fn wait_ready(&self) -> Result<Option<String>> {
        let phase = self
            .wait_until(|p| {
                matches!(
                    p,
                    HandshakePhase::AwaitingDisplayExpand(_) | HandshakePhase::Finished
                )
            })
            .await?;
        match phase {
            HandshakePhase::AwaitingDisplayExpand(class) => Ok(Some(class)),
            _ => Ok(None),
        }
    }

    /// Reports the display for `class` as expanded; arranging may begin.
    pub fn display_expanded(&self, class: &str) -> Result<()> {
        self.transition(
            class,
            &format!("AwaitingDisplayExpand({class})"),
            |p| matches!(p, HandshakePhase::AwaitingDisplayExpand(c) if c == class),
            HandshakePhase::Arranging(class.to_string()),
        )
    }

    /// Waits until the arranger is done with `class`.
    pub async fn wait_arrangement_complete(&self, class: &str) -> Result<()> {
        self.wait_until(|p| is_done_with(p, class))
            .await
            .map(|_| ())
    }

    /// Reports the display for `class` as collapsed; the next class may start.
    pub fn display_collapsed(&self, class: &str) -> Result<()> {
        self.transition(
            class,
            &format!("ArrangementComplete({class})"),
            |p| is_done_with(p, class),
            HandshakePhase::Idle,
        )
    }
}

/// True once the arranger has finished `class` and the display has not
/// collapsed yet.
fn is_done_with(phase: &HandshakePhase, class: &str) -> bool {
    match phase {
        HandshakePhase::ArrangementComplete(c) | HandshakePhase::AwaitingCollapse(c) => c == class,
        _ => false,
    }
}

/// Display driver that expands and collapses on cue, after `animation_time`
/// for each step.
///
/// # Returns
///
/// The classes visited, in order, once the run finishes.
pub async fn drive_display(
    rendezvous: Rendezvous,
    animation_time: Duration,
) -> Result<Vec<String>> {
    let mut visited = Vec::new();
    while let Some(class) = rendezvous.wait_ready().await? {
        if !animation_time.is_zero() {
            tokio::time::sleep(animation_time).await;
        }
        rendezvous.display_expanded(&class)?;
        rendezvous.wait_arrangement_complete(&class).await?;
        if !animation_time.is_zero() {
            tokio::time::sleep(animation_time).await;
        }
        rendezvous.display_collapsed(&class)?;
        log::debug!("display cycled through class {class}");
        visited.push(class);
    }
    Ok(visited)
}
