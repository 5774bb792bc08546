//! # Circuit Snap
//!
//! Placement engine for a circuit-diagram editor. Items placed on a 2D board are
//! packed into tidy per-class layouts and freed from overlaps:
//! - **Spatial queries** over axis-aligned bounds with a broad-phase spatial hash
//! - **Free-position search** on a discrete grid (spiral or priority scored)
//! - **Grouping** by class or by transitive proximity, split into capped sub-groups
//! - **Layout** of vertical stacks and side-by-side groups
//! - **Animation** of every move over time, one item after another
//! - **Stabilization** passes with a hard pass ceiling
//!
//! ## Collaborators
//! The display driver takes part in a two-phase handshake per class (see
//! [`rendezvous`]); other collaborators receive [`ArrangeEvent`]s.

#![deny(unsafe_code)]

pub mod animation;
pub mod arranger;
pub mod config;
pub mod constants;
pub mod demo;
pub mod error;
pub mod events;
pub mod grouping;
pub mod history;
pub mod layout;
pub mod monitor;
pub mod rendezvous;
pub mod search;
pub mod spatial;
pub mod stabilize;
pub mod types;

// Re-export the main entry points
pub use animation::{AnimationHandle, AnimationSequencer};
pub use arranger::{run_headless, Arranger, RunReport};
pub use config::{Easing, GroupingStrategy, SearchStrategy, SnapConfig};
pub use error::{Result, SnapError};
pub use events::{ArrangeEvent, EventReceiver, EventSink};
pub use layout::{Group, GroupRegistry, SubGroup};
pub use monitor::ContainerMonitor;
pub use rendezvous::{drive_display, HandshakePhase, Rendezvous};
pub use search::FreePositionSearch;
pub use spatial::{snap_to_grid, SpatialIndex};
pub use stabilize::{StabilizationLoop, StabilizeReport};
pub use types::*;
