//! Error taxonomy for the placement engine.
//!
//! Most variants describe conditions the engine recovers from locally; those are
//! collected into a run's warnings instead of being returned. Only configuration
//! problems, handshake protocol violations, rejected triggers and cancellation
//! surface as `Err`.

use crate::types::ItemId;

/// Every failure mode the engine knows about.
#[derive(Debug, thiserror::Error)]
pub enum SnapError {
    /// No free position was found within the search budget; the item stays put.
    #[error("no free position for {item} within {steps} search steps")]
    SearchExhausted { item: ItemId, steps: u32 },

    /// The item has no geometry; a unit box was used instead.
    #[error("{item} has no geometry, using unit bounds")]
    MissingGeometry { item: ItemId },

    /// A container referenced by name did not exist and was created.
    #[error("container {name} not found")]
    ContainerNotFound { name: String },

    /// The item's class is not part of the configured class sequence.
    #[error("unknown class {class}, skipping its items")]
    UnknownClass { class: String },

    /// The stabilization loop hit its pass ceiling with overlaps left.
    #[error("convergence budget exhausted with {} item(s) still overlapping", unresolved.len())]
    ConvergenceBudgetExhausted { unresolved: Vec<ItemId> },

    /// A run was requested while another one is active.
    #[error("an arrangement run is already in progress")]
    ReentrantTriggerRejected,

    /// The display driver and the arranger disagreed about the handshake phase.
    #[error("handshake for class {class} out of order: expected {expected}, found {actual}")]
    HandshakeOutOfOrder {
        class: String,
        expected: String,
        actual: String,
    },

    /// The run or animation was cancelled before it finished.
    #[error("arrangement cancelled")]
    Cancelled,

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SnapError {
    /// True for conditions that are reported but never abort a run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SnapError::SearchExhausted { .. }
                | SnapError::MissingGeometry { .. }
                | SnapError::ContainerNotFound { .. }
                | SnapError::UnknownClass { .. }
                | SnapError::ConvergenceBudgetExhausted { .. }
        )
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, SnapError>;
