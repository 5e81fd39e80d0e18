//! Item centrality derived from the current edge set.
//!
//! Centrality is always recomputed from edges; the value stored on an item is
//! never read back as input.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::model::{Edge, Item};

/// Sum of incident edge strengths per item, divided by the maximum sum.
///
/// Every item gets an entry; items without edges score 0. Edges that reference
/// unknown items are ignored.
pub fn strength_centrality(items: &[Item], edges: &[Edge]) -> BTreeMap<String, f64> {
    let mut sums: BTreeMap<String, f64> = items.iter().map(|i| (i.id.clone(), 0.0)).collect();
    for edge in edges {
        if !sums.contains_key(&edge.source) || !sums.contains_key(&edge.target) {
            continue;
        }
        for id in [&edge.source, &edge.target] {
            if let Some(sum) = sums.get_mut(id) {
                *sum += edge.strength;
            }
        }
    }
    let max = sums.values().copied().fold(0.0_f64, f64::max);
    if max > 0.0 {
        for value in sums.values_mut() {
            *value /= max;
        }
    }
    sums
}

/// Raw incident-edge count per known item.
pub fn degree_counts(items: &[Item], edges: &[Edge]) -> HashMap<String, usize> {
    let mut degree: HashMap<String, usize> = items.iter().map(|i| (i.id.clone(), 0)).collect();
    for edge in edges {
        if !degree.contains_key(&edge.source) || !degree.contains_key(&edge.target) {
            continue;
        }
        for id in [&edge.source, &edge.target] {
            if let Some(d) = degree.get_mut(id) {
                *d += 1;
            }
        }
    }
    degree
}

/// Items whose incident-edge count ranks in the top `fraction` of all items.
///
/// The cut-off is the degree of the item at rank `ceil(fraction * n)`; every
/// item with at least that degree is central, so tied items always share a
/// bucket. Items without edges are never central.
pub fn top_by_degree(items: &[Item], edges: &[Edge], fraction: f64) -> HashSet<String> {
    let degree = degree_counts(items, edges);
    let take = (fraction.clamp(0.0, 1.0) * items.len() as f64).ceil() as usize;
    if take == 0 {
        return HashSet::new();
    }
    let mut ranked: Vec<usize> = degree.values().copied().filter(|d| *d > 0).collect();
    ranked.sort_unstable_by(|a, b| b.cmp(a));
    let Some(cutoff) = ranked.get(take - 1).or(ranked.last()).copied() else {
        return HashSet::new();
    };
    degree
        .into_iter()
        .filter(|(_, d)| *d > 0 && *d >= cutoff)
        .map(|(id, _)| id)
        .collect()
}
