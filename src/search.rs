//! Free-position search on the discrete grid.
//!
//! Two strategies are available (see [`SearchStrategy`]):
//!
//! - **Spiral**: for every radius step, sample fixed angles, snap each sample to
//!   the grid and keep the free candidate nearest to the start. All steps are
//!   scanned; the nearest candidate wins.
//! - **Priority**: scan a growing square around the start, score free candidates
//!   by a left/top bias, and stop at the first step that produced any candidate.
//!
//! Both are deterministic: sampling order is fixed and ties keep the first
//! candidate seen.

use crate::config::{SearchStrategy, SnapConfig};
use crate::spatial::{snap_to_grid, SpatialIndex};
use crate::types::{Item, Point};

/// Searches the grid around an item for a spot where it overlaps nothing.
pub struct FreePositionSearch<'a> {
    index: &'a SpatialIndex,
    config: &'a SnapConfig,
}

impl<'a> FreePositionSearch<'a> {
    pub fn new(index: &'a SpatialIndex, config: &'a SnapConfig) -> Self {
        Self { index, config }
    }

    /// Nearest acceptable position for `item`, or its current position when the
    /// search budget is exhausted. Callers must read "unchanged" as "not found".
    pub fn find_free_position(&self, item: &Item) -> Point {
        self.search(item).unwrap_or(item.position)
    }

    /// Runs the configured strategy; `None` means nothing free within budget.
    pub fn search(&self, item: &Item) -> Option<Point> {
        let found = match self.config.search_strategy {
            SearchStrategy::Spiral => self.spiral(item),
            SearchStrategy::Priority => self.priority(item),
        };
        // A candidate equal to the start is not a move.
        found.filter(|p| *p != item.position)
    }

    fn is_free(&self, item: &Item, candidate: Point) -> bool {
        let bounds = item.bounds();
        let offset = bounds.center - item.position;
        self.index
            .is_position_free(candidate + offset, bounds.size, &item.id)
    }

    fn spiral(&self, item: &Item) -> Option<Point> {
        let origin = item.position;
        let grid = self.config.grid_size;
        let angle_step = self.config.spiral_angle_step_deg.max(1) as usize;

        let mut best: Option<(Point, f32)> = None;
        for radius in 1..=self.config.max_search_steps {
            for angle in (0..360).step_by(angle_step) {
                let rad = (angle as f32).to_radians();
                let reach = radius as f32 * grid;
                let sample = origin + Point::new(rad.cos() * reach, rad.sin() * reach);
                let candidate = snap_to_grid(sample, grid);
                if candidate == origin || !self.is_free(item, candidate) {
                    continue;
                }

                let distance = origin.distance(candidate);
                if best.map_or(true, |(_, d)| distance < d) {
                    best = Some((candidate, distance));
                }
            }
        }

        if let Some((pos, distance)) = best {
            log::debug!("spiral search for {} found {} at {:.2}", item.id, pos, distance);
        }
        best.map(|(pos, _)| pos)
    }

    fn score(&self, candidate: Point) -> f32 {
        -candidate.x * self.config.priority_x_weight + candidate.y * self.config.priority_y_weight
    }

    fn priority(&self, item: &Item) -> Option<Point> {
        let origin = item.position;
        let grid = self.config.grid_size;

        let mut best: Option<(Point, f32)> = None;
        for step in 1..=self.config.max_search_steps as i32 {
            for x in 0..=step {
                for y in 0..=step {
                    if x == 0 && y == 0 {
                        continue;
                    }
                    for x_dir in [-1, 1] {
                        for y_dir in [-1, 1] {
                            let offset =
                                Point::new((x * x_dir) as f32 * grid, (y * y_dir) as f32 * grid);
                            let candidate = snap_to_grid(origin + offset, grid);
                            if candidate == origin || !self.is_free(item, candidate) {
                                continue;
                            }

                            let score = self.score(candidate);
                            if best.map_or(true, |(_, s)| score > s) {
                                best = Some((candidate, score));
                            }
                        }
                    }
                }
            }

            if best.is_some() {
                log::debug!("priority search for {} settled at step {}", item.id, step);
                break;
            }
        }

        best.map(|(pos, _)| pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(name: &str, x: f32, y: f32) -> Item {
        Item::sized(name, Point::new(x, y), 1.0, 1.0)
    }

    #[test]
    fn test_spiral_finds_nearest_neighbour_cell() {
        let a = unit("R1", 0.0, 0.0);
        let b = unit("R2", 0.0, 0.0);
        let index = SpatialIndex::from_items([&a, &b], 1.0);
        let config = SnapConfig::default();

        let pos = FreePositionSearch::new(&index, &config).find_free_position(&b);
        assert_eq!(pos, Point::new(1.0, 0.0));
    }

    #[test]
    fn test_spiral_prefers_nearest_over_first_found() {
        // With the 0 degree sample blocked, 45 degrees is the first free sample
        // but 90 degrees is nearer.
        let a = unit("R1", 0.0, 0.0);
        let b = unit("R2", 0.0, 0.0);
        let right = unit("R3", 1.0, 0.0);
        let index = SpatialIndex::from_items([&a, &b, &right], 1.0);
        let config = SnapConfig::default();

        let pos = FreePositionSearch::new(&index, &config).find_free_position(&b);
        // 90 degrees at radius 1 is the nearest free sample.
        assert_eq!(pos, Point::new(0.0, 1.0));
    }

    #[test]
    fn test_priority_prefers_left_and_up() {
        let a = unit("R1", 0.0, 0.0);
        let b = unit("R2", 0.0, 0.0);
        let index = SpatialIndex::from_items([&a, &b], 1.0);
        let config = SnapConfig {
            search_strategy: SearchStrategy::Priority,
            ..SnapConfig::default()
        };

        let pos = FreePositionSearch::new(&index, &config).find_free_position(&b);
        assert_eq!(pos, Point::new(-1.0, 1.0));
    }

    #[test]
    fn test_priority_stops_at_first_step_with_candidate() {
        // Everything at step 1 is blocked except the lower-right corner; a
        // better-scored spot exists at step 2 but must not be chosen.
        let blocker = Item::sized("U1", Point::new(-1.0, 0.5), 3.0, 4.0);
        let right = Item::sized("U2", Point::new(1.0, 0.5), 1.0, 2.0);
        let a = unit("R1", 0.0, 0.0);
        let index = SpatialIndex::from_items([&blocker, &right, &a], 1.0);
        let config = SnapConfig {
            search_strategy: SearchStrategy::Priority,
            ..SnapConfig::default()
        };

        let pos = FreePositionSearch::new(&index, &config).find_free_position(&a);
        assert_eq!(pos, Point::new(1.0, -1.0));
    }

    #[test]
    fn test_exhausted_search_returns_original_position() {
        let blocker = Item::sized("U1", Point::ZERO, 20.0, 20.0);
        let a = unit("R1", 0.0, 0.0);
        let index = SpatialIndex::from_items([&blocker, &a], 1.0);

        for strategy in [SearchStrategy::Spiral, SearchStrategy::Priority] {
            let config = SnapConfig {
                search_strategy: strategy,
                max_search_steps: 2,
                ..SnapConfig::default()
            };
            let search = FreePositionSearch::new(&index, &config);
            assert_eq!(search.search(&a), None);
            assert_eq!(search.find_free_position(&a), a.position);
        }
    }

    #[test]
    fn test_search_is_deterministic() {
        let items: Vec<Item> = (0..6)
            .map(|i| unit(&format!("R{}", i + 1), (i % 2) as f32 * 0.5, 0.0))
            .collect();
        let index = SpatialIndex::from_items(&items, 1.0);

        for strategy in [SearchStrategy::Spiral, SearchStrategy::Priority] {
            let config = SnapConfig {
                search_strategy: strategy,
                ..SnapConfig::default()
            };
            let first = FreePositionSearch::new(&index, &config).find_free_position(&items[3]);
            let second = FreePositionSearch::new(&index, &config).find_free_position(&items[3]);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_candidates_are_snapped() {
        let a = unit("R1", 0.3, 0.2);
        let b = unit("R2", 0.3, 0.2);
        let index = SpatialIndex::from_items([&a, &b], 1.0);
        let config = SnapConfig::default();

        let pos = FreePositionSearch::new(&index, &config).find_free_position(&b);
        assert_eq!(snap_to_grid(pos, 1.0), pos);
    }
}
