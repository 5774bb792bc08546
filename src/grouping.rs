//! Partitioning items into groups and bounded-size sub-groups.

use crate::types::{Item, ItemId};
use std::collections::{BTreeMap, HashSet, VecDeque};

/// Keeps the first occurrence of every id.
pub fn dedupe_by_id(items: Vec<Item>) -> Vec<Item> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.id.clone()))
        .collect()
}

/// Active items that no group has claimed yet.
///
/// Only `already_grouped` decides membership; an item's own `grouped` flag is a
/// projection of it and may lag behind a release.
pub fn ungrouped(items: Vec<Item>, already_grouped: &HashSet<ItemId>) -> Vec<Item> {
    items
        .into_iter()
        .filter(|item| item.active && !already_grouped.contains(&item.id))
        .collect()
}

/// Buckets items by type tag. Order inside each bucket is the input order.
pub fn group_by_type(items: &[Item]) -> BTreeMap<String, Vec<Item>> {
    let mut groups: BTreeMap<String, Vec<Item>> = BTreeMap::new();
    for item in items {
        groups
            .entry(item.id.tag.clone())
            .or_default()
            .push(item.clone());
    }
    groups
}

/// Clusters items transitively: an item joins a cluster when it lies within
/// `threshold` of *any* member already in it, so chains of close items form one
/// cluster even when its ends are far apart.
///
/// Seeds are taken in input order and candidates are scanned in input order,
/// which keeps the result deterministic.
pub fn group_by_distance(items: &[Item], threshold: f32) -> Vec<Vec<Item>> {
    let mut visited = vec![false; items.len()];
    let mut clusters = Vec::new();

    for seed in 0..items.len() {
        if visited[seed] {
            continue;
        }
        visited[seed] = true;

        let mut cluster = Vec::new();
        let mut queue = VecDeque::new();
        queue.push_back(seed);
        while let Some(current) = queue.pop_front() {
            cluster.push(items[current].clone());
            for (other, item) in items.iter().enumerate() {
                if !visited[other]
                    && items[current].position.distance(item.position) <= threshold
                {
                    visited[other] = true;
                    queue.push_back(other);
                }
            }
        }
        clusters.push(cluster);
    }

    clusters
}

/// Sorts a group by sequence number and cuts it into consecutive chunks of at
/// most `max_size` items. Empty groups produce no sub-groups.
pub fn split_into_sub_groups(group: &[Item], max_size: usize) -> Vec<Vec<Item>> {
    let mut sorted = group.to_vec();
    sorted.sort_by(|a, b| a.id.sequence_key().cmp(&b.id.sequence_key()));
    sorted
        .chunks(max_size.max(1))
        .map(|chunk| chunk.to_vec())
        .collect()
}
