//! Polls the group registry and reports classes whose groups appear or empty.

use crate::events::{ArrangeEvent, EventSink};
use crate::layout::{lock_registry, SharedRegistry};
use crate::types::{lock_scene, SharedScene};
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Watches group containers for newly formed or emptied classes.
pub struct ContainerMonitor {
    scene: SharedScene,
    registry: SharedRegistry,
    events: EventSink,
    /// Classes reported as formed and not yet emptied
    known: BTreeSet<String>,
}

impl ContainerMonitor {
    pub fn new(scene: SharedScene, registry: SharedRegistry, events: EventSink) -> Self {
        Self {
            scene,
            registry,
            events,
            known: BTreeSet::new(),
        }
    }

    /// Drops deactivated members from their groups and emits one event per
    /// class whose non-empty state changed since the last check.
    ///
    /// Released items lose their `grouped` flag, so a reactivated item is
    /// arranged again by the next run.
    pub fn check_once(&mut self) -> Vec<ArrangeEvent> {
        let current = {
            let mut scene = lock_scene(&self.scene);
            let mut registry = lock_registry(&self.registry);
            let released = registry.prune(&scene);
            if !released.is_empty() {
                log::debug!("released {} inactive item(s) from groups", released.len());
            }
            for id in &released {
                if let Some(item) = scene.get_mut(id) {
                    item.grouped = false;
                }
            }
            registry.non_empty_classes()
        };

        let mut events = Vec::new();
        for class in current.difference(&self.known) {
            log::info!("group formed for class {class}");
            events.push(ArrangeEvent::GroupFormed(class.clone()));
        }
        for class in self.known.difference(&current) {
            log::info!("groups emptied for class {class}");
            events.push(ArrangeEvent::GroupEmptied(class.clone()));
        }
        for event in &events {
            self.events.emit(event.clone());
        }
        self.known = current;
        events
    }

    /// Runs [`Self::check_once`] every `interval` until the task is aborted.
    /// Intervals below one millisecond are raised to one.
    pub fn spawn(mut self, interval: Duration) -> JoinHandle<()> {
        let interval = interval.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.check_once();
            }
        })
    }
}
