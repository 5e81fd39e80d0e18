//! Density reduction that keeps the graph's backbone.
//!
//! Ground-truth and contradiction edges are always kept. The rest of the budget
//! goes to strong edges around central items first, then to a split between
//! medium central edges and strong peripheral ones.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::centrality::top_by_degree;
use crate::config::GraphConfig;
use crate::model::{density, max_pairs, Edge, Item, RelationType};
use crate::records::{sanitize_edges, EdgeRepairs};

/// Selection bucket, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    GroundTruth,
    Contradiction,
    HighCentral,
    MediumCentral,
    HighPeripheral,
    MediumPeripheral,
    Low,
}

impl Bucket {
    /// Kept regardless of the target.
    pub fn is_mandatory(self) -> bool {
        matches!(self, Self::GroundTruth | Self::Contradiction)
    }
}

pub fn bucket_of(edge: &Edge, central: &HashSet<String>, cfg: &GraphConfig) -> Bucket {
    let r = &cfg.readability;
    if edge.provenance.is_ground_truth() {
        return Bucket::GroundTruth;
    }
    if edge.relation == RelationType::Contradicts {
        return Bucket::Contradiction;
    }
    let is_central = central.contains(&edge.source) || central.contains(&edge.target);
    match (edge.strength >= r.high_strength, edge.strength >= r.medium_strength, is_central) {
        (true, _, true) => Bucket::HighCentral,
        (true, _, false) => Bucket::HighPeripheral,
        (false, true, true) => Bucket::MediumCentral,
        (false, true, false) => Bucket::MediumPeripheral,
        (false, false, _) => Bucket::Low,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadabilityReport {
    pub original_edges: usize,
    pub final_edges: usize,
    pub target_edges: usize,
    pub item_count: usize,
    pub density: f64,
    pub avg_degree: f64,
    pub density_goal_met: bool,
    pub degree_goal_met: bool,
    /// Mandatory edges alone exceeded the target.
    pub over_target: bool,
    pub bucket_counts: BTreeMap<Bucket, usize>,
    pub noop: bool,
    /// Invalid input edges dropped or clamped before selection.
    #[serde(default)]
    pub repairs: EdgeRepairs,
}

#[derive(Debug, Clone)]
pub struct ReadabilityOutput {
    pub edges: Vec<Edge>,
    pub report: ReadabilityReport,
}

/// Prune `edges` toward `target_density`. Never adds an edge; edges keep
/// their original relative order.
///
/// Edges that break the collection invariants (unknown endpoint, self-loop,
/// repeated pair, non-finite strength) are dropped first and never count as
/// mandatory.
pub fn optimize(
    items: &[Item],
    edges: Vec<Edge>,
    target_density: f64,
    cfg: &GraphConfig,
) -> ReadabilityOutput {
    let n = items.len();
    let received = edges.len();
    let (edges, repairs) = sanitize_edges(items, edges);
    if repairs.dropped() > 0 || repairs.clamped > 0 {
        warn!(
            dropped = repairs.dropped(),
            clamped = repairs.clamped,
            "invalid edges repaired before pruning"
        );
    }
    let original = edges.len();
    let target = (target_density.max(0.0) * max_pairs(n) as f64).round() as usize;

    let central = top_by_degree(items, &edges, cfg.readability.central_fraction);
    let buckets: Vec<Bucket> = edges.iter().map(|e| bucket_of(e, &central, cfg)).collect();
    let mut bucket_counts = BTreeMap::new();
    for bucket in &buckets {
        *bucket_counts.entry(*bucket).or_insert(0) += 1;
    }

    if n < 2 || target >= original {
        let mut report = build_report(received, &edges, target, n, bucket_counts, false, true, cfg);
        report.repairs = repairs;
        info!(edges = original, target, "density already within target; pruning skipped");
        return ReadabilityOutput { edges, report };
    }

    let mut keep = vec![false; original];
    let mut kept = 0;
    for (i, bucket) in buckets.iter().enumerate() {
        if bucket.is_mandatory() {
            keep[i] = true;
            kept += 1;
        }
    }
    let over_target = kept > target;

    let ranked = |wanted: Bucket| -> Vec<usize> {
        let mut idx: Vec<usize> = (0..original).filter(|i| buckets[*i] == wanted).collect();
        idx.sort_by(|a, b| {
            edges[*b]
                .strength
                .partial_cmp(&edges[*a].strength)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.cmp(b))
        });
        idx
    };

    let mut budget = target.saturating_sub(kept);
    let high_central = ranked(Bucket::HighCentral);
    for i in high_central.iter().take(budget) {
        keep[*i] = true;
    }
    budget -= budget.min(high_central.len());

    if budget > 0 {
        let medium_central = ranked(Bucket::MediumCentral);
        let high_peripheral = ranked(Bucket::HighPeripheral);
        let medium_quota = (budget as f64 * cfg.readability.medium_central_share).round() as usize;
        let peripheral_quota = budget - medium_quota.min(budget);
        let mut take_medium = medium_quota.min(medium_central.len());
        let mut take_peripheral = peripheral_quota.min(high_peripheral.len());
        // An unfilled quota spills over to the other bucket.
        let spare = budget - take_medium - take_peripheral;
        let extra_medium = spare.min(medium_central.len() - take_medium);
        take_medium += extra_medium;
        take_peripheral += (spare - extra_medium).min(high_peripheral.len() - take_peripheral);

        for i in medium_central
            .iter()
            .take(take_medium)
            .chain(high_peripheral.iter().take(take_peripheral))
        {
            keep[*i] = true;
        }
    }

    let pruned: Vec<Edge> = edges
        .into_iter()
        .zip(keep)
        .filter_map(|(edge, k)| k.then_some(edge))
        .collect();
    let mut report = build_report(received, &pruned, target, n, bucket_counts, over_target, false, cfg);
    report.repairs = repairs;
    info!(
        original = report.original_edges,
        kept = report.final_edges,
        target = report.target_edges,
        density = report.density,
        avg_degree = report.avg_degree,
        density_goal_met = report.density_goal_met,
        degree_goal_met = report.degree_goal_met,
        "edges pruned for readability"
    );
    ReadabilityOutput {
        edges: pruned,
        report,
    }
}

#[allow(clippy::too_many_arguments)]
fn build_report(
    original: usize,
    edges: &[Edge],
    target: usize,
    n: usize,
    bucket_counts: BTreeMap<Bucket, usize>,
    over_target: bool,
    noop: bool,
    cfg: &GraphConfig,
) -> ReadabilityReport {
    let r = &cfg.readability;
    let final_density = density(edges.len(), n);
    let avg_degree = if n == 0 {
        0.0
    } else {
        2.0 * edges.len() as f64 / n as f64
    };
    ReadabilityReport {
        original_edges: original,
        final_edges: edges.len(),
        target_edges: target,
        item_count: n,
        density: final_density,
        avg_degree,
        density_goal_met: final_density < r.max_density,
        degree_goal_met: avg_degree < r.max_avg_degree,
        over_target,
        bucket_counts,
        noop,
        repairs: EdgeRepairs::default(),
    }
}
