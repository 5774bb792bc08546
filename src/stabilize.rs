//! Bounded overlap resolution over every item in the scene.
//!
//! Each pass visits the unresolved items in ascending sequence order. An item
//! that overlaps something is moved to the nearest free grid position and its
//! pass counter goes up; an item that overlaps nothing, or for which no free
//! position exists, is saturated and never visited again. The loop stops after a
//! pass without moves or after `item_count * max_passes_per_item` passes,
//! whichever comes first, so it always terminates.

use crate::animation::AnimationSequencer;
use crate::config::SnapConfig;
use crate::constants::VERTICAL_SORT_EPSILON;
use crate::error::{Result, SnapError};
use crate::history::ItemMove;
use crate::layout::SlotAssignment;
use crate::search::FreePositionSearch;
use crate::spatial::SpatialIndex;
use crate::types::{lock_scene, Item, ItemId, Point};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Outcome of one stabilization run.
#[derive(Debug, Default)]
pub struct StabilizeReport {
    /// Passes executed
    pub passes: u32,
    pub moves: Vec<ItemMove>,
    /// Items still overlapping when the loop ended
    pub unresolved: Vec<ItemId>,
    pub converged: bool,
    /// Recovered problems met along the way
    pub warnings: Vec<SnapError>,
}

/// Runs stabilization against the scene a sequencer animates.
pub struct StabilizationLoop<'a> {
    sequencer: &'a AnimationSequencer,
    config: &'a SnapConfig,
}

impl<'a> StabilizationLoop<'a> {
    pub fn new(sequencer: &'a AnimationSequencer, config: &'a SnapConfig) -> Self {
        Self { sequencer, config }
    }

    fn current(&self, id: &ItemId) -> Option<Item> {
        lock_scene(self.sequencer.scene()).get(id).cloned()
    }

    /// Resolves overlaps until nothing moves or the pass budget runs out.
    pub async fn run(&self) -> Result<StabilizeReport> {
        let mut report = StabilizeReport::default();
        self.run_into(&mut report).await?;
        Ok(report)
    }

    /// Same as [`Self::run`], filling a report the caller owns. When the run
    /// is cancelled the report still holds the moves finished before that.
    pub async fn run_into(&self, report: &mut StabilizeReport) -> Result<()> {
        let mut items: Vec<Item> = lock_scene(self.sequencer.scene())
            .active_items()
            .into_iter()
            .filter(Item::collides)
            .collect();
        items.sort_by(|a, b| a.id.sequence_key().cmp(&b.id.sequence_key()));

        for item in items.iter().filter(|i| !i.has_geometry()) {
            log::debug!("{} has no geometry, using unit bounds", item.id);
            report.warnings.push(SnapError::MissingGeometry {
                item: item.id.clone(),
            });
        }

        let max_passes = self.config.max_passes_per_item;
        let mut index = SpatialIndex::from_items(&items, self.config.grid_size);
        let no_exclusions = HashSet::new();

        // Items that start out clear are done before the first pass.
        let mut pass_count: HashMap<ItemId, u32> = items
            .iter()
            .map(|item| {
                let count = if index.has_overlap(item, &no_exclusions) {
                    0
                } else {
                    max_passes
                };
                (item.id.clone(), count)
            })
            .collect();

        let budget = items.len() as u32 * max_passes;
        let mut global_pass = 0;
        while global_pass < budget && pass_count.values().any(|count| *count < max_passes) {
            let mut moved = 0;
            for id in items.iter().map(|item| &item.id) {
                let count = pass_count.get(id).copied().unwrap_or(max_passes);
                if count >= max_passes {
                    continue;
                }
                let Some(mut item) = self.current(id).filter(Item::collides) else {
                    pass_count.insert(id.clone(), max_passes);
                    index.remove(id);
                    continue;
                };
                // Pick up drags made since the last query.
                index.update(&item);

                if !index.has_overlap(&item, &no_exclusions) {
                    pass_count.insert(id.clone(), max_passes);
                    continue;
                }

                let found = FreePositionSearch::new(&index, self.config).search(&item);
                let Some(target) = found else {
                    log::warn!(
                        "no free position for {} within {} steps",
                        id,
                        self.config.max_search_steps
                    );
                    report.warnings.push(SnapError::SearchExhausted {
                        item: id.clone(),
                        steps: self.config.max_search_steps,
                    });
                    pass_count.insert(id.clone(), max_passes);
                    continue;
                };

                let from = item.position;
                self.sequencer.move_item(id, target).finished().await?;
                item.position = target;
                index.update(&item);
                pass_count.insert(id.clone(), count + 1);
                report.moves.push(ItemMove {
                    id: id.clone(),
                    from,
                    to: target,
                });
                moved += 1;
            }
            global_pass += 1;
            log::debug!("stabilization pass {global_pass}: {moved} move(s)");
            if moved == 0 {
                break;
            }
        }

        report.passes = global_pass;
        report.unresolved = items
            .iter()
            .filter_map(|item| self.current(&item.id))
            .filter(|item| item.collides() && index.has_overlap(item, &no_exclusions))
            .map(|item| item.id)
            .collect();
        report.converged = report.unresolved.is_empty();

        if report.converged {
            log::info!(
                "stabilization converged after {} pass(es), {} move(s)",
                report.passes,
                report.moves.len()
            );
        } else {
            let err = SnapError::ConvergenceBudgetExhausted {
                unresolved: report.unresolved.clone(),
            };
            log::warn!("{err}");
            report.warnings.push(err);
        }

        if self.config.vertical_sort {
            self.apply_vertical_sort(&mut report.moves).await?;
        }

        Ok(())
    }

    /// Lines up the items of each type vertically and animates the moves.
    async fn apply_vertical_sort(&self, moves: &mut Vec<ItemMove>) -> Result<()> {
        let items = lock_scene(self.sequencer.scene()).active_items();
        let plan = plan_vertical_sort(
            &items,
            self.config.vertical_spacing,
            self.config.vertical_sort_descending,
        );
        log::debug!("vertical sort moves {} item(s)", plan.len());
        self.sequencer
            .animate_sub_group_sequentially(&plan, std::time::Duration::ZERO, moves)
            .await
    }
}

/// Target slots that stack every type's items in sequence order.
///
/// Each type starts at its top-most Y (or bottom-most when not `descending`)
/// and continues `spacing` apart, keeping each item's X. Moves shorter than
/// [`VERTICAL_SORT_EPSILON`] are left out.
pub fn plan_vertical_sort(items: &[Item], spacing: f32, descending: bool) -> Vec<SlotAssignment> {
    let mut by_type: BTreeMap<&str, Vec<&Item>> = BTreeMap::new();
    for item in items.iter().filter(|i| i.collides()) {
        by_type.entry(item.id.tag.as_str()).or_default().push(item);
    }

    let mut plan = Vec::new();
    for (_, mut members) in by_type {
        members.sort_by_key(|item| item.id.number);
        let ys = members.iter().map(|item| item.position.y);
        let (start, step) = if descending {
            (ys.fold(f32::NEG_INFINITY, f32::max), -spacing)
        } else {
            (ys.fold(f32::INFINITY, f32::min), spacing)
        };

        for (i, item) in members.iter().enumerate() {
            let y = start + i as f32 * step;
            if (item.position.y - y).abs() < VERTICAL_SORT_EPSILON {
                continue;
            }
            plan.push(SlotAssignment {
                id: item.id.clone(),
                target: Point::new(item.position.x, y),
            });
        }
    }
    plan
}
