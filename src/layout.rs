//! Target slot computation and the group/sub-group arena.
//!
//! Layout never moves anything. It answers "where should each item go" and
//! records which container owns which item; the animation stage performs the
//! moves. Group membership lives in [`GroupRegistry`], which is the single
//! source of truth for "already grouped".

use crate::config::SnapConfig;
use crate::error::{Result, SnapError};
use crate::grouping::split_into_sub_groups;
use crate::types::{Item, ItemId, Point, Scene};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// Unique identifier of a group container.
pub type GroupId = Uuid;

/// Registry shared between the arranger and the container monitor.
pub type SharedRegistry = Arc<Mutex<GroupRegistry>>;

/// Locks a shared registry, recovering the data if a previous holder panicked.
pub fn lock_registry(registry: &SharedRegistry) -> MutexGuard<'_, GroupRegistry> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Local positions of a vertical stack.
///
/// The first item sits at `reference_y`; each following item sits below the
/// previous one by that item's height plus `spacing`. X is the container's
/// local origin for every item.
///
/// # Arguments
///
/// * `sub_group` - Items in stacking order
/// * `reference_y` - Y of the first item
/// * `spacing` - Gap between consecutive items
///
/// # Returns
///
/// One position per item, in the same order.
pub fn compute_sub_group_positions(
    sub_group: &[Item],
    reference_y: f32,
    spacing: f32,
) -> Vec<Point> {
    let mut positions = Vec::with_capacity(sub_group.len());
    let mut y = reference_y;
    for (i, item) in sub_group.iter().enumerate() {
        if i > 0 {
            y -= sub_group[i - 1].bounds().height() + spacing;
        }
        positions.push(Point::new(0.0, y));
    }
    positions
}

/// X offset of a new group placed after `prior_groups`.
///
/// The prior group's width is approximated by its sub-group count rather than
/// measured, so wide items can make neighbouring groups touch.
pub fn compute_group_x_offset(
    prior_groups: &[Group],
    group_spacing: f32,
    sub_group_spacing: f32,
) -> f32 {
    match prior_groups.last() {
        None => 0.0,
        Some(last) => {
            let extra_columns = last.sub_groups.len().saturating_sub(1) as f32;
            last.x_offset + extra_columns * sub_group_spacing + group_spacing
        }
    }
}

/// A bounded vertical column of items inside a group.
#[derive(Debug, Clone, PartialEq)]
pub struct SubGroup {
    /// Container name, `Sub-group_{n}` with `n` starting at 1
    pub name: String,
    /// Offset from the group origin along X
    pub local_x: f32,
    /// Member ids sorted by sequence number
    pub items: Vec<ItemId>,
}

/// A set of items of one class laid out as side-by-side sub-groups.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub id: GroupId,
    /// Type tag shared by the members
    pub class: String,
    /// Container name, `{class}_Subgroups_{run}`
    pub name: String,
    /// Arrangement run that created the group
    pub run: u32,
    /// Offset from the class origin along X
    pub x_offset: f32,
    pub sub_groups: Vec<SubGroup>,
}

impl Group {
    pub fn item_count(&self) -> usize {
        self.sub_groups.iter().map(|s| s.items.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sub_groups.iter().all(|s| s.items.is_empty())
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.sub_groups.iter().any(|s| s.items.contains(id))
    }
}

/// Container name used for the groups of one run.
pub fn group_name(class: &str, run: u32) -> String {
    format!("{class}_Subgroups_{run}")
}

/// Container name of the `index`-th (zero based) sub-group.
pub fn sub_group_name(index: usize) -> String {
    format!("Sub-group_{}", index + 1)
}

/// Target of one item inside a planned sub-group.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotAssignment {
    pub id: ItemId,
    pub target: Point,
}

/// Arena of every group formed in this session.
#[derive(Debug, Clone, Default)]
pub struct GroupRegistry {
    /// Groups per class in creation order
    groups: BTreeMap<String, Vec<Group>>,
    /// World position each class's groups are laid out from
    origins: BTreeMap<String, Point>,
    /// Items owned by some sub-group
    grouped: HashSet<ItemId>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_shared(self) -> SharedRegistry {
        Arc::new(Mutex::new(self))
    }

    pub fn is_grouped(&self, id: &ItemId) -> bool {
        self.grouped.contains(id)
    }

    /// The "already grouped" set.
    pub fn grouped_ids(&self) -> &HashSet<ItemId> {
        &self.grouped
    }

    pub fn groups_for(&self, class: &str) -> &[Group] {
        self.groups.get(class).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values().flatten()
    }

    pub fn group_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    /// Origin of a class's layout, once its first group exists.
    pub fn origin_of(&self, class: &str) -> Option<Point> {
        self.origins.get(class).copied()
    }

    /// Classes that currently own at least one non-empty group.
    pub fn non_empty_classes(&self) -> BTreeSet<String> {
        self.groups
            .iter()
            .filter(|(_, groups)| groups.iter().any(|g| !g.is_empty()))
            .map(|(class, _)| class.clone())
            .collect()
    }

    /// Looks a group container up by name.
    pub fn find_group(&self, class: &str, name: &str) -> Result<&Group> {
        self.groups_for(class)
            .iter()
            .find(|g| g.name == name)
            .ok_or_else(|| SnapError::ContainerNotFound {
                name: name.to_string(),
            })
    }

    /// Returns the index of the named group, creating it when missing.
    fn find_or_create_group(&mut self, class: &str, run: u32, config: &SnapConfig) -> usize {
        let name = group_name(class, run);
        let missing = self.find_group(class, &name).err();
        if let Some(err) = missing {
            log::debug!("{err}, creating it");
            let prior = self.groups_for(class);
            let x_offset =
                compute_group_x_offset(prior, config.group_spacing, config.sub_group_spacing);
            self.groups.entry(class.to_string()).or_default().push(Group {
                id: Uuid::new_v4(),
                class: class.to_string(),
                name: name.clone(),
                run,
                x_offset,
                sub_groups: Vec::new(),
            });
        }
        self.groups_for(class)
            .iter()
            .position(|g| g.name == name)
            .unwrap_or(0)
    }

    /// Lays out one batch of a class and records the new membership.
    ///
    /// Membership is planned here, before anything moves. A run that fails
    /// part way hands it back with [`Self::release_uncommitted`].
    ///
    /// Items already owned by a group are skipped. A batch whose items were all
    /// grouped before yields no sub-groups and no container. Repeated batches in
    /// the same run append new sub-groups to the run's group so that proximity
    /// clusters of one class sit side by side.
    ///
    /// Sub-groups of one batch sit `sub_group_spacing` apart; a later batch adds
    /// `horizontal_spacing` before its first column.
    ///
    /// The class origin is fixed by the first batch: the anchor when one is
    /// configured, otherwise the batch's left-most X and top-most Y.
    ///
    /// # Returns
    ///
    /// The planned slots, one list per new sub-group in animation order.
    pub fn assign(
        &mut self,
        class: &str,
        run: u32,
        batch: &[Item],
        anchor: Option<Point>,
        config: &SnapConfig,
    ) -> Vec<Vec<SlotAssignment>> {
        let fresh: Vec<Item> = batch
            .iter()
            .filter(|item| !self.grouped.contains(&item.id))
            .cloned()
            .collect();
        if fresh.is_empty() {
            return Vec::new();
        }

        let origin = *self
            .origins
            .entry(class.to_string())
            .or_insert_with(|| anchor.unwrap_or_else(|| batch_top_left(&fresh)));

        let group_index = self.find_or_create_group(class, run, config);
        let mut planned = Vec::new();
        let Some(group) = self
            .groups
            .get_mut(class)
            .and_then(|groups| groups.get_mut(group_index))
        else {
            return planned;
        };

        // A later batch of the same run starts its columns a cluster gap further right.
        let mut gap = if group.sub_groups.is_empty() {
            0.0
        } else {
            config.horizontal_spacing
        };
        for chunk in split_into_sub_groups(&fresh, config.sub_group_size) {
            let index = group.sub_groups.len();
            let local_x = match group.sub_groups.last() {
                Some(last) => last.local_x + config.sub_group_spacing + gap,
                None => 0.0,
            };
            gap = 0.0;
            let base = Point::new(origin.x + group.x_offset + local_x, origin.y);
            let slots: Vec<SlotAssignment> =
                compute_sub_group_positions(&chunk, 0.0, config.vertical_spacing)
                    .into_iter()
                    .zip(&chunk)
                    .map(|(local, item)| SlotAssignment {
                        id: item.id.clone(),
                        target: base + local,
                    })
                    .collect();

            let ids: Vec<ItemId> = chunk.iter().map(|item| item.id.clone()).collect();
            self.grouped.extend(ids.iter().cloned());
            group.sub_groups.push(SubGroup {
                name: sub_group_name(index),
                local_x,
                items: ids,
            });
            planned.push(slots);
        }

        planned
    }

    /// Drops members that are gone or inactive in `scene`, then removes groups
    /// left with no items.
    ///
    /// # Returns
    ///
    /// Ids released from their groups.
    pub fn prune(&mut self, scene: &Scene) -> Vec<ItemId> {
        self.release_where(|_, id| !scene.get(id).is_some_and(|item| item.active))
    }

    /// Undoes the membership a failed run planned but never carried out.
    ///
    /// Members of `run`'s groups that are not in `committed` go back to being
    /// ungrouped, so a later run arranges them again.
    ///
    /// # Returns
    ///
    /// Ids released from their groups.
    pub fn release_uncommitted(&mut self, run: u32, committed: &HashSet<ItemId>) -> Vec<ItemId> {
        self.release_where(|group, id| group.run == run && !committed.contains(id))
    }

    fn release_where(&mut self, mut release: impl FnMut(&Group, &ItemId) -> bool) -> Vec<ItemId> {
        let mut released = Vec::new();
        for groups in self.groups.values_mut() {
            for group in groups.iter_mut() {
                let mut subs = std::mem::take(&mut group.sub_groups);
                for sub in subs.iter_mut() {
                    sub.items.retain(|id| {
                        let drop = release(group, id);
                        if drop {
                            released.push(id.clone());
                        }
                        !drop
                    });
                }
                subs.retain(|sub| !sub.items.is_empty());
                group.sub_groups = subs;
            }
            groups.retain(|group| !group.is_empty());
        }
        self.groups.retain(|_, groups| !groups.is_empty());
        for id in &released {
            self.grouped.remove(id);
        }
        released
    }

    /// Multi-line description of every group, for logging.
    pub fn summary(&self) -> String {
        let mut out = format!("{} group(s)", self.group_count());
        for (class, groups) in &self.groups {
            out.push_str(&format!("\n{class}: {} group(s)", groups.len()));
            for group in groups {
                out.push_str(&format!(
                    "\n  {} at x+{:.1}: {} sub-group(s), {} item(s)",
                    group.name,
                    group.x_offset,
                    group.sub_groups.len(),
                    group.item_count()
                ));
                for sub in &group.sub_groups {
                    let names: Vec<String> = sub.items.iter().map(ItemId::to_string).collect();
                    out.push_str(&format!("\n    {}: {}", sub.name, names.join(", ")));
                }
            }
        }
        out
    }
}

fn batch_top_left(items: &[Item]) -> Point {
    let min_x = items
        .iter()
        .map(|i| i.position.x)
        .fold(f32::INFINITY, f32::min);
    let max_y = items
        .iter()
        .map(|i| i.position.y)
        .fold(f32::NEG_INFINITY, f32::max);
    if min_x.is_finite() && max_y.is_finite() {
        Point::new(min_x, max_y)
    } else {
        Point::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(tag: &str, numbers: impl IntoIterator<Item = u32>) -> Vec<Item> {
        numbers
            .into_iter()
            .map(|n| Item::sized(&format!("{tag}{n}"), Point::new(n as f32 * 4.0, 0.0), 1.0, 1.0))
            .collect()
    }

    #[test]
    fn test_vertical_stack_uses_previous_height() {
        let stack = vec![
            Item::sized("R1", Point::ZERO, 1.0, 1.0),
            Item::sized("R2", Point::ZERO, 1.0, 3.0),
            Item::sized("R3", Point::ZERO, 1.0, 1.0),
        ];
        let ys: Vec<f32> = compute_sub_group_positions(&stack, 10.0, 2.0)
            .iter()
            .map(|p| p.y)
            .collect();
        assert_eq!(ys, vec![10.0, 7.0, 2.0]);
    }

    #[test]
    fn test_group_x_offset() {
        let config = SnapConfig::default();
        assert_eq!(compute_group_x_offset(&[], 15.0, 3.0), 0.0);

        let mut registry = GroupRegistry::new();
        registry.assign("R", 1, &items("R", 1..=7), Some(Point::ZERO), &config);
        let prior = registry.groups_for("R");
        assert_eq!(prior[0].sub_groups.len(), 2);
        assert_eq!(compute_group_x_offset(prior, 15.0, 3.0), 18.0);
    }

    #[test]
    fn test_assign_seven_items_into_two_columns() {
        let config = SnapConfig::default();
        let mut registry = GroupRegistry::new();
        let batch = items("R", (1..=7).rev());
        let planned = registry.assign("R", 1, &batch, Some(Point::ZERO), &config);

        assert_eq!(planned.len(), 2);
        let first: Vec<(String, Point)> = planned[0]
            .iter()
            .map(|s| (s.id.to_string(), s.target))
            .collect();
        assert_eq!(
            first,
            vec![
                ("R1".to_string(), Point::new(0.0, 0.0)),
                ("R2".to_string(), Point::new(0.0, -3.0)),
                ("R3".to_string(), Point::new(0.0, -6.0)),
                ("R4".to_string(), Point::new(0.0, -9.0)),
                ("R5".to_string(), Point::new(0.0, -12.0)),
            ]
        );
        let second: Vec<Point> = planned[1].iter().map(|s| s.target).collect();
        assert_eq!(second, vec![Point::new(3.0, 0.0), Point::new(3.0, -3.0)]);

        let group = &registry.groups_for("R")[0];
        assert_eq!(group.name, "R_Subgroups_1");
        assert_eq!(group.sub_groups[0].name, "Sub-group_1");
        assert_eq!(group.sub_groups[1].name, "Sub-group_2");
        assert_eq!(group.sub_groups[1].local_x, 3.0);
        assert_eq!(group.item_count(), 7);
    }

    #[test]
    fn test_assign_never_regroups() {
        let config = SnapConfig::default();
        let mut registry = GroupRegistry::new();
        let batch = items("C", 1..=3);
        registry.assign("C", 1, &batch, None, &config);

        let again = registry.assign("C", 2, &batch, None, &config);
        assert!(again.is_empty());
        assert_eq!(registry.groups_for("C").len(), 1);
        assert!(registry.find_group("C", "C_Subgroups_2").is_err());
    }

    #[test]
    fn test_second_run_appends_after_previous_group() {
        let config = SnapConfig::default();
        let mut registry = GroupRegistry::new();
        registry.assign("R", 1, &items("R", 1..=7), Some(Point::new(-20.0, 5.0)), &config);
        let planned = registry.assign("R", 2, &items("R", 8..=9), Some(Point::ZERO), &config);

        let groups = registry.groups_for("R");
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[1].x_offset, 18.0);
        // The class origin stays where the first run put it.
        assert_eq!(planned[0][0].target, Point::new(-2.0, 5.0));
    }

    #[test]
    fn test_later_batch_of_same_run_keeps_a_gap() {
        let config = SnapConfig::default();
        let mut registry = GroupRegistry::new();
        registry.assign("C", 1, &items("C", 1..=2), Some(Point::ZERO), &config);
        let planned = registry.assign("C", 1, &items("C", 3..=4), Some(Point::ZERO), &config);

        let group = &registry.groups_for("C")[0];
        assert_eq!(group.sub_groups.len(), 2);
        let expected = config.sub_group_spacing + config.horizontal_spacing;
        assert_eq!(group.sub_groups[1].local_x, expected);
        assert_eq!(planned[0][0].target, Point::new(expected, 0.0));
    }

    #[test]
    fn test_origin_defaults_to_batch_top_left() {
        let config = SnapConfig::default();
        let mut registry = GroupRegistry::new();
        let batch = vec![
            Item::sized("L1", Point::new(3.0, -1.0), 1.0, 1.0),
            Item::sized("L2", Point::new(-2.0, 4.0), 1.0, 1.0),
        ];
        let planned = registry.assign("L", 1, &batch, None, &config);

        assert_eq!(registry.origin_of("L"), Some(Point::new(-2.0, 4.0)));
        assert_eq!(planned[0][0].target, Point::new(-2.0, 4.0));
    }

    #[test]
    fn test_find_group_reports_missing_container() {
        let registry = GroupRegistry::new();
        match registry.find_group("R", "R_Subgroups_1") {
            Err(SnapError::ContainerNotFound { name }) => assert_eq!(name, "R_Subgroups_1"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_prune_releases_inactive_members() {
        let config = SnapConfig::default();
        let mut scene = Scene::new();
        let batch = items("R", 1..=2);
        for item in &batch {
            scene.add_item(item.clone());
        }
        let mut registry = GroupRegistry::new();
        registry.assign("R", 1, &batch, None, &config);

        scene.deactivate(&ItemId::new("R", 1));
        assert_eq!(registry.prune(&scene), vec![ItemId::new("R", 1)]);
        assert!(!registry.is_grouped(&ItemId::new("R", 1)));
        assert!(registry.non_empty_classes().contains("R"));

        scene.deactivate(&ItemId::new("R", 2));
        registry.prune(&scene);
        assert!(registry.non_empty_classes().is_empty());
        assert_eq!(registry.group_count(), 0);
    }

    #[test]
    fn test_release_uncommitted_frees_unmoved_members() {
        let config = SnapConfig::default();
        let mut registry = GroupRegistry::new();
        registry.assign("R", 1, &items("R", 1..=2), None, &config);
        registry.assign("C", 2, &items("C", 1..=2), None, &config);
        registry.assign("R", 2, &items("R", 3..=4), None, &config);

        let committed: HashSet<ItemId> = [ItemId::new("C", 1)].into_iter().collect();
        let mut released = registry.release_uncommitted(2, &committed);
        released.sort();

        assert_eq!(
            released,
            vec![ItemId::new("C", 2), ItemId::new("R", 3), ItemId::new("R", 4)]
        );
        assert!(registry.is_grouped(&ItemId::new("R", 1)));
        assert!(registry.is_grouped(&ItemId::new("C", 1)));
        assert!(!registry.is_grouped(&ItemId::new("R", 3)));
        assert!(registry.find_group("R", "R_Subgroups_2").is_err());
        assert_eq!(registry.find_group("C", "C_Subgroups_2").unwrap().item_count(), 1);
    }

    #[test]
    fn test_summary_lists_members() {
        let config = SnapConfig::default();
        let mut registry = GroupRegistry::new();
        registry.assign("R", 1, &items("R", 1..=2), None, &config);
        let summary = registry.summary();
        assert!(summary.contains("R_Subgroups_1"));
        assert!(summary.contains("Sub-group_1: R1, R2"));
    }
}
