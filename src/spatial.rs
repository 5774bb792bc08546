//! Spatial queries over the items of a scene.
//!
//! [`SpatialIndex`] keeps the current bounds of every colliding item in a spatial
//! hash so that "does this overlap anything?" only inspects nearby items. The
//! index is a snapshot: whoever moves an item must call [`SpatialIndex::update`]
//! before the next query.

use crate::types::{Bounds, Item, ItemId, Point, Scene};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Rounds a position to the nearest lattice point.
pub fn snap_to_grid(position: Point, grid_size: f32) -> Point {
    Point::new(
        (position.x / grid_size).round() * grid_size,
        (position.y / grid_size).round() * grid_size,
    )
}

type Cell = (i32, i32);

/// Bounds covering more cells than this are kept out of the hash and checked
/// on every query instead.
const MAX_CELLS_PER_ENTRY: f32 = 4096.0;

/// Broad-phase index of colliding item bounds.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    /// Edge length of one hash cell
    cell_size: f32,
    /// Current bounds per item
    entries: BTreeMap<ItemId, Bounds>,
    /// Items whose bounds touch each cell
    cells: HashMap<Cell, Vec<ItemId>>,
    /// Items too large (or too far out) to hash
    oversized: BTreeSet<ItemId>,
}

impl SpatialIndex {
    /// Creates an empty index. Non-positive cell sizes are clamped to 1.
    pub fn new(cell_size: f32) -> Self {
        let cell_size = if cell_size.is_finite() && cell_size > 0.0 {
            cell_size
        } else {
            1.0
        };
        Self {
            cell_size,
            entries: BTreeMap::new(),
            cells: HashMap::new(),
            oversized: BTreeSet::new(),
        }
    }

    /// Indexes every active, colliding item in `items`.
    pub fn from_items<'a>(items: impl IntoIterator<Item = &'a Item>, cell_size: f32) -> Self {
        let mut index = Self::new(cell_size);
        for item in items {
            if item.collides() {
                index.insert(item.id.clone(), item.bounds());
            }
        }
        index
    }

    /// Indexes the colliding items of a scene.
    pub fn from_scene(scene: &Scene, cell_size: f32) -> Self {
        Self::from_items(scene.items.values(), cell_size)
    }

    /// Cells touched by `bounds`, or `None` when they are too many to list or
    /// the bounds are not finite.
    fn cell_range(&self, bounds: &Bounds) -> Option<Vec<Cell>> {
        let min = bounds.min();
        let max = bounds.max();
        let min_x = (min.x / self.cell_size).floor();
        let max_x = (max.x / self.cell_size).floor();
        let min_y = (min.y / self.cell_size).floor();
        let max_y = (max.y / self.cell_size).floor();

        let limit = (i32::MAX / 2) as f32;
        if [min_x, max_x, min_y, max_y]
            .iter()
            .any(|v| !v.is_finite() || v.abs() > limit)
        {
            return None;
        }
        let span = (max_x - min_x + 1.0) * (max_y - min_y + 1.0);
        if !(1.0..=MAX_CELLS_PER_ENTRY).contains(&span) {
            return None;
        }

        let mut cells = Vec::with_capacity(span as usize);
        for cx in min_x as i32..=max_x as i32 {
            for cy in min_y as i32..=max_y as i32 {
                cells.push((cx, cy));
            }
        }
        Some(cells)
    }

    /// Adds an item, replacing any previous entry for the same id.
    pub fn insert(&mut self, id: ItemId, bounds: Bounds) {
        self.remove(&id);
        match self.cell_range(&bounds) {
            Some(cells) => {
                for cell in cells {
                    self.cells.entry(cell).or_default().push(id.clone());
                }
            }
            None => {
                log::debug!("{id} spans too many cells, checking it on every query");
                self.oversized.insert(id.clone());
            }
        }
        self.entries.insert(id, bounds);
    }

    /// Drops an item from the index.
    pub fn remove(&mut self, id: &ItemId) -> Option<Bounds> {
        let bounds = self.entries.remove(id)?;
        if self.oversized.remove(id) {
            return Some(bounds);
        }
        for cell in self.cell_range(&bounds).unwrap_or_default() {
            if let Some(ids) = self.cells.get_mut(&cell) {
                ids.retain(|other| other != id);
                if ids.is_empty() {
                    self.cells.remove(&cell);
                }
            }
        }
        Some(bounds)
    }

    /// Re-syncs an item after it moved.
    pub fn update(&mut self, item: &Item) {
        if item.collides() {
            self.insert(item.id.clone(), item.bounds());
        } else {
            self.remove(&item.id);
        }
    }

    pub fn bounds_of(&self, id: &ItemId) -> Option<Bounds> {
        self.entries.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Items whose bounds strictly intersect `bounds`, in id order.
    ///
    /// A query box too large to hash scans every entry.
    pub fn intersecting(&self, bounds: &Bounds) -> Vec<ItemId> {
        let Some(cells) = self.cell_range(bounds) else {
            return self
                .entries
                .iter()
                .filter(|(_, other)| other.intersects(bounds))
                .map(|(id, _)| id.clone())
                .collect();
        };
        let mut candidates = self.oversized.clone();
        for cell in cells {
            if let Some(ids) = self.cells.get(&cell) {
                candidates.extend(ids.iter().cloned());
            }
        }
        candidates
            .into_iter()
            .filter(|id| {
                self.entries
                    .get(id)
                    .is_some_and(|other| other.intersects(bounds))
            })
            .collect()
    }

    /// Items overlapping `item` other than itself and anything in `exclude`.
    pub fn overlapping(&self, item: &Item, exclude: &HashSet<ItemId>) -> Vec<ItemId> {
        if !item.collides() {
            return Vec::new();
        }
        self.intersecting(&item.bounds())
            .into_iter()
            .filter(|id| *id != item.id && !exclude.contains(id))
            .collect()
    }

    /// True when `item` overlaps another colliding item not in `exclude`.
    pub fn has_overlap(&self, item: &Item, exclude: &HashSet<ItemId>) -> bool {
        !self.overlapping(item, exclude).is_empty()
    }

    /// True when a box of `size` centered on `center` touches nothing but `exclude_item`.
    pub fn is_position_free(&self, center: Point, size: Point, exclude_item: &ItemId) -> bool {
        let candidate = Bounds::new(center, size);
        self.intersecting(&candidate)
            .iter()
            .all(|id| id == exclude_item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ItemCategory;

    fn unit(name: &str, x: f32, y: f32) -> Item {
        Item::sized(name, Point::new(x, y), 1.0, 1.0)
    }

    #[test]
    fn test_snap_to_grid() {
        assert_eq!(snap_to_grid(Point::new(0.4, 0.6), 1.0), Point::new(0.0, 1.0));
        assert_eq!(snap_to_grid(Point::new(1.26, -0.74), 0.5), Point::new(1.5, -0.5));
    }

    #[test]
    fn test_snap_is_idempotent() {
        for grid in [0.1_f32, 0.25, 1.0, 3.0] {
            for i in -50..50 {
                let p = Point::new(i as f32 * 0.37, i as f32 * -1.13);
                let once = snap_to_grid(p, grid);
                assert_eq!(snap_to_grid(once, grid), once);
            }
        }
    }

    #[test]
    fn test_has_overlap_excludes_self_and_exclusions() {
        let a = unit("R1", 0.0, 0.0);
        let b = unit("R2", 0.5, 0.0);
        let c = unit("R3", 5.0, 5.0);
        let index = SpatialIndex::from_items([&a, &b, &c], 1.0);

        assert!(index.has_overlap(&a, &HashSet::new()));
        assert!(!index.has_overlap(&c, &HashSet::new()));

        let exclude: HashSet<ItemId> = [b.id.clone()].into_iter().collect();
        assert!(!index.has_overlap(&a, &exclude));
    }

    #[test]
    fn test_decorations_never_collide() {
        let a = unit("R1", 0.0, 0.0);
        let mut pin = unit("P1", 0.0, 0.0);
        pin.category = ItemCategory::Decoration;
        let index = SpatialIndex::from_items([&a, &pin], 1.0);

        assert_eq!(index.len(), 1);
        assert!(!index.has_overlap(&a, &HashSet::new()));
        assert!(!index.has_overlap(&pin, &HashSet::new()));
    }

    #[test]
    fn test_inactive_items_are_not_indexed() {
        let a = unit("R1", 0.0, 0.0);
        let mut b = unit("R2", 0.0, 0.0);
        b.active = false;
        let index = SpatialIndex::from_items([&a, &b], 1.0);
        assert!(!index.has_overlap(&a, &HashSet::new()));
    }

    #[test]
    fn test_is_position_free() {
        let a = unit("R1", 0.0, 0.0);
        let b = unit("R2", 3.0, 0.0);
        let index = SpatialIndex::from_items([&a, &b], 1.0);
        let size = Point::new(1.0, 1.0);

        assert!(!index.is_position_free(Point::new(0.5, 0.0), size, &b.id));
        assert!(index.is_position_free(Point::new(0.5, 0.0), size, &a.id));
        assert!(index.is_position_free(Point::new(1.0, 0.0), size, &b.id));
        assert!(index.is_position_free(Point::new(1.5, 1.5), size, &b.id));
    }

    #[test]
    fn test_update_resyncs_moved_item() {
        let a = unit("R1", 0.0, 0.0);
        let mut b = unit("R2", 0.0, 0.0);
        let mut index = SpatialIndex::from_items([&a, &b], 1.0);
        assert!(index.has_overlap(&a, &HashSet::new()));

        b.position = Point::new(10.0, 10.0);
        index.update(&b);

        assert!(!index.has_overlap(&a, &HashSet::new()));
        assert_eq!(index.bounds_of(&b.id).unwrap().center, Point::new(10.0, 10.0));
        assert!(index.intersecting(&Bounds::unit_at(Point::ZERO)) == vec![a.id.clone()]);
    }

    #[test]
    fn test_huge_and_non_finite_bounds_stay_queryable() {
        let plane = Item::sized("G1", Point::ZERO, 1.0e9, 1.0e9);
        let lost = Item::sized("U1", Point::new(f32::NAN, 0.0), 1.0, 1.0);
        let small = unit("R1", 500.0, -200.0);
        let mut index = SpatialIndex::from_items([&plane, &lost, &small], 1.0);

        assert_eq!(index.len(), 3);
        assert!(index.has_overlap(&small, &HashSet::new()));
        assert!(index.has_overlap(&plane, &HashSet::new()));
        assert!(!index.has_overlap(&lost, &HashSet::new()));

        index.remove(&plane.id);
        assert!(!index.has_overlap(&small, &HashSet::new()));
    }

    #[test]
    fn test_large_items_found_from_distant_cells() {
        let wide = Item::sized("U1", Point::new(0.0, 0.0), 20.0, 1.0);
        let small = unit("R1", 9.0, 0.0);
        let index = SpatialIndex::from_items([&wide, &small], 1.0);
        assert!(index.has_overlap(&small, &HashSet::new()));
    }
}
