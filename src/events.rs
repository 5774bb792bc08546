//! Notifications sent to the display and camera collaborators.

use tokio::sync::mpsc;

/// Something the arranger wants the outside world to know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrangeEvent {
    /// The arranger is about to process `class` and waits for its display.
    ReadyForNextClass(String),
    /// `class` now owns at least one non-empty group.
    GroupFormed(String),
    /// The last group of `class` lost its final member.
    GroupEmptied(String),
    /// Every item of `class` reached its slot; the display may collapse.
    ArrangementComplete(String),
    /// A run finished, successfully or not.
    RunFinished { run: u32 },
}

pub type EventReceiver = mpsc::UnboundedReceiver<ArrangeEvent>;

/// Sending half of the event channel. Cloning is cheap.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<ArrangeEvent>>,
}

impl EventSink {
    /// Creates a connected sink and its receiver.
    pub fn channel() -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink nobody listens to.
    pub fn disconnected() -> Self {
        Self { tx: None }
    }

    /// Sends an event. A closed receiver is not an error; events are advisory.
    pub fn emit(&self, event: ArrangeEvent) {
        log::debug!("event: {event:?}");
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}
