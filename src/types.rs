//! Core data types for the placement engine.
//!
//! This module defines the fundamental data structures shared by every stage:
//! item identifiers, 2D points and bounding boxes, placed items, and the
//! [`Scene`] arena that owns them.

use crate::constants::FALLBACK_TAG;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, Sub};
use std::sync::{Arc, Mutex, MutexGuard};

/// Identifier of a placed circuit element: a type tag plus a sequence number (`"R3"`).
///
/// Ordering compares the tag first and the number second, so a sorted list of ids
/// groups items by type with ascending numbering inside each type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct ItemId {
    /// Type tag, e.g. `"R"` for resistors
    pub tag: String,
    /// Sequence number within the tag
    pub number: u32,
}

impl ItemId {
    /// Creates an identifier from its parts.
    pub fn new(tag: impl Into<String>, number: u32) -> Self {
        Self {
            tag: tag.into(),
            number,
        }
    }

    /// Parses a display name such as `"R12"` into tag and number.
    ///
    /// Everything before the first digit is the tag and the trailing digits are
    /// the number. A name that does not start with a tag followed by digits falls
    /// back to tag `"C"` and number `0`.
    pub fn parse(name: &str) -> Self {
        let trimmed = name.trim();
        match trimmed.find(|c: char| c.is_ascii_digit()) {
            Some(idx) if idx > 0 => {
                let number = trimmed[idx..].parse().unwrap_or(0);
                Self::new(&trimmed[..idx], number)
            }
            _ => Self::new(FALLBACK_TAG, 0),
        }
    }

    /// Key used wherever items must be visited "by sequence number ascending".
    pub fn sequence_key(&self) -> (u32, &str) {
        (self.number, self.tag.as_str())
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.tag, self.number)
    }
}

impl From<String> for ItemId {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<ItemId> for String {
    fn from(value: ItemId) -> Self {
        value.to_string()
    }
}

/// A point (or vector) in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    /// The origin.
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance(self, other: Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Linear interpolation towards `other`; `t` is not clamped.
    pub fn lerp(self, other: Point, t: f32) -> Point {
        Point::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
        )
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2})", self.x, self.y)
    }
}

/// Axis-aligned bounding box stored as center and full size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub center: Point,
    pub size: Point,
}

impl Bounds {
    pub fn new(center: Point, size: Point) -> Self {
        Self { center, size }
    }

    /// A 1x1 box centered on `center`, used when an item has no geometry.
    pub fn unit_at(center: Point) -> Self {
        Self::new(center, Point::new(1.0, 1.0))
    }

    pub fn min(&self) -> Point {
        Point::new(
            self.center.x - self.size.x / 2.0,
            self.center.y - self.size.y / 2.0,
        )
    }

    pub fn max(&self) -> Point {
        Point::new(
            self.center.x + self.size.x / 2.0,
            self.center.y + self.size.y / 2.0,
        )
    }

    pub fn width(&self) -> f32 {
        self.size.x
    }

    pub fn height(&self) -> f32 {
        self.size.y
    }

    /// Strict intersection test: boxes that only share an edge do not intersect.
    pub fn intersects(&self, other: &Bounds) -> bool {
        let (a_min, a_max) = (self.min(), self.max());
        let (b_min, b_max) = (other.min(), other.max());
        a_min.x < b_max.x && a_max.x > b_min.x && a_min.y < b_max.y && a_max.y > b_min.y
    }

    /// Same box moved so that its center sits at `center`.
    pub fn recentered(&self, center: Point) -> Bounds {
        Bounds::new(center, self.size)
    }
}

/// Rendered or collidable extent of an item, relative to its position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    /// Offset of the extent's center from the item position
    #[serde(default)]
    pub offset: Point,
    /// Full width and height
    pub size: Point,
}

impl Extent {
    pub fn sized(width: f32, height: f32) -> Self {
        Self {
            offset: Point::ZERO,
            size: Point::new(width, height),
        }
    }
}

/// Whether an item takes part in overlap detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCategory {
    /// A physical component that must not overlap others
    #[default]
    Component,
    /// Pins, wires and other markers that never collide
    Decoration,
}

/// A placed circuit element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Unique identifier, e.g. `R3`
    pub id: ItemId,
    /// Position of the item's origin in world space
    pub position: Point,
    /// Geometry relative to `position`; `None` when the item has no renderable proxy
    #[serde(default)]
    pub extent: Option<Extent>,
    /// Collision category
    #[serde(default)]
    pub category: ItemCategory,
    /// Whether the item is live in the scene
    #[serde(default = "default_true")]
    pub active: bool,
    /// Whether the item has already been claimed by a group container
    #[serde(default)]
    pub grouped: bool,
}

fn default_true() -> bool {
    true
}

impl Item {
    /// Creates an active, ungrouped component at `position`.
    pub fn new(id: ItemId, position: Point, extent: Option<Extent>) -> Self {
        Self {
            id,
            position,
            extent,
            category: ItemCategory::Component,
            active: true,
            grouped: false,
        }
    }

    /// Convenience constructor for a component with a centered `width` x `height` box.
    pub fn sized(name: &str, position: Point, width: f32, height: f32) -> Self {
        Self::new(
            ItemId::parse(name),
            position,
            Some(Extent::sized(width, height)),
        )
    }

    /// Current bounds, always derived from the current position.
    ///
    /// Items without geometry get a unit box centered on their position.
    pub fn bounds(&self) -> Bounds {
        match self.extent {
            Some(extent) => Bounds::new(self.position + extent.offset, extent.size),
            None => Bounds::unit_at(self.position),
        }
    }

    pub fn has_geometry(&self) -> bool {
        self.extent.is_some()
    }

    /// True when position and extent hold only finite numbers.
    pub fn is_finite(&self) -> bool {
        let point_ok = |p: Point| p.x.is_finite() && p.y.is_finite();
        point_ok(self.position)
            && self
                .extent
                .map_or(true, |e| point_ok(e.offset) && point_ok(e.size))
    }

    /// True for items that take part in collision checks.
    pub fn collides(&self) -> bool {
        self.active && self.category == ItemCategory::Component
    }
}

/// Arena of all items known to the placement engine, keyed by id.
///
/// Iteration order is the id order, which keeps every stage deterministic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scene {
    /// All items, active or not
    pub items: BTreeMap<ItemId, Item>,
    /// Last number handed out per tag by [`Scene::place`]
    #[serde(default)]
    counters: BTreeMap<String, u32>,
}

/// Scene shared between the placement engine and its collaborators.
pub type SharedScene = Arc<Mutex<Scene>>;

/// Locks a shared scene, recovering the data if a previous holder panicked.
pub fn lock_scene(scene: &SharedScene) -> MutexGuard<'_, Scene> {
    scene.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps the scene for sharing with the arranger and collaborators.
    pub fn into_shared(self) -> SharedScene {
        Arc::new(Mutex::new(self))
    }

    /// Serialize the scene to a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize a scene from a JSON string.
    ///
    /// Items with a non-finite position or extent are rejected.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut scene: Scene = serde_json::from_str(json)?;
        if let Some(item) = scene.items.values().find(|item| !item.is_finite()) {
            return Err(serde::de::Error::custom(format!(
                "{} has a non-finite position or extent",
                item.id
            )));
        }
        scene.sync_counters();
        Ok(scene)
    }

    /// Adds (or replaces) an item and returns its id.
    pub fn add_item(&mut self, item: Item) -> ItemId {
        let id = item.id.clone();
        let counter = self.counters.entry(id.tag.clone()).or_insert(0);
        *counter = (*counter).max(id.number);
        self.items.insert(id.clone(), item);
        id
    }

    /// Places a new component of type `tag`, numbering it after the last one of that tag.
    pub fn place(&mut self, tag: &str, position: Point, extent: Option<Extent>) -> ItemId {
        let counter = self.counters.entry(tag.to_string()).or_insert(0);
        *counter += 1;
        let id = ItemId::new(tag, *counter);
        self.items
            .insert(id.clone(), Item::new(id.clone(), position, extent));
        id
    }

    pub fn get(&self, id: &ItemId) -> Option<&Item> {
        self.items.get(id)
    }

    pub fn get_mut(&mut self, id: &ItemId) -> Option<&mut Item> {
        self.items.get_mut(id)
    }

    /// Moves an item. Returns `false` when the id is unknown.
    pub fn set_position(&mut self, id: &ItemId, position: Point) -> bool {
        match self.items.get_mut(id) {
            Some(item) => {
                item.position = position;
                true
            }
            None => false,
        }
    }

    /// Takes an item out of consideration without destroying it.
    pub fn deactivate(&mut self, id: &ItemId) -> bool {
        match self.items.get_mut(id) {
            Some(item) => {
                item.active = false;
                true
            }
            None => false,
        }
    }

    /// Removes an item entirely. Only external collaborators do this.
    pub fn remove_item(&mut self, id: &ItemId) -> Option<Item> {
        self.items.remove(id)
    }

    /// Snapshot of all active items in id order.
    pub fn active_items(&self) -> Vec<Item> {
        self.items.values().filter(|i| i.active).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn sync_counters(&mut self) {
        for id in self.items.keys() {
            let counter = self.counters.entry(id.tag.clone()).or_insert(0);
            *counter = (*counter).max(id.number);
        }
    }
}
