//! Shared placement-wide constants.
//! Centralizes tweakable defaults used by the search, layout and animation stages.

// Grid
/// Lattice cell size in world units.
pub const GRID_SIZE: f32 = 1.0;
/// Radius steps tried by the free-position search before giving up.
pub const MAX_SEARCH_STEPS: u32 = 15;
/// Angular step of the spiral search, in degrees.
pub const SPIRAL_ANGLE_STEP_DEG: u32 = 45;

// Stabilization
/// Moves an item may make before it is considered settled.
pub const MAX_PASSES_PER_ITEM: u32 = 3;
/// Minimum Y delta for the vertical sort post-pass to bother moving an item.
pub const VERTICAL_SORT_EPSILON: f32 = 0.01;

// Layout
/// Maximum number of items in one sub-group column.
pub const SUB_GROUP_SIZE: usize = 5;
/// Gap between stacked items inside a sub-group.
pub const VERTICAL_SPACING: f32 = 2.0;
/// Extra gap between proximity clusters laid out in one group.
pub const HORIZONTAL_SPACING: f32 = 2.0;
/// Horizontal distance between sub-group columns of one group.
pub const SUB_GROUP_SPACING: f32 = 3.0;
/// Gap between the rightmost sub-group of a group and the next group.
pub const GROUP_SPACING: f32 = 15.0;
/// Items closer than this end up in the same proximity cluster.
pub const DISTANCE_THRESHOLD: f32 = 3.0;

// Animation
/// Duration of a single item move.
pub const MOVE_DURATION_MS: u64 = 500;
/// Pause between consecutive item moves in a sub-group.
pub const INTER_ITEM_DELAY_MS: u64 = 200;
/// Pause between finishing one class and collapsing its display.
pub const INTER_CLASS_DELAY_MS: u64 = 1000;
/// Tick length used when sampling the easing curve.
pub const FRAME_INTERVAL_MS: u64 = 16;
/// Poll interval of the container monitor.
pub const MONITOR_INTERVAL_MS: u64 = 500;

// History
/// Maximum number of arrangement runs kept for undo.
pub const MAX_UNDO_HISTORY: usize = 100;

/// Classes in the order the display driver cycles through them.
pub const DEFAULT_CLASS_SEQUENCE: &[&str] = &[
    "R", "C", "D", "L", "U", "G", "Q", "J", "K", "S", "Z", "O", "X", "A", "P", "M",
];

/// Tag assigned to items whose name carries no recognisable type prefix.
pub const FALLBACK_TAG: &str = "C";
