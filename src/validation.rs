//! Graph validation and the composite quality score.
//!
//! Scores exactly the edge set it is given. Edges are put in canonical order
//! before anything is summed or sampled, so the score does not depend on the
//! order of the input array.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::calibration::SemanticCalibration;
use crate::config::GraphConfig;
use crate::model::{Edge, Item, ItemIndex, PairKey, RelationType, SuggestionRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    /// Below the acceptance bar. Not an error.
    Perfectible,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => f.write_str("pass"),
            Self::Perfectible => f.write_str("perfectible"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coverage {
    pub expected: usize,
    pub covered: usize,
    pub ratio: f64,
}

impl Coverage {
    fn of(expected: &HashSet<PairKey>, present: &HashSet<PairKey>) -> Self {
        let covered = expected.intersection(present).count();
        Self {
            expected: expected.len(),
            covered,
            ratio: ratio_or_one(covered, expected.len()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TypeStats {
    pub count: usize,
    pub share: f64,
    pub avg_strength: f64,
    pub min_strength: f64,
    pub max_strength: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBand {
    pub label: String,
    pub min: f64,
    pub max: f64,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrecisionEstimate {
    pub sampled: usize,
    pub coherent: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Each weighted input of the composite, in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreComponents {
    pub curated_coverage: f64,
    pub suggestion_coverage: f64,
    pub inferred_quality: f64,
    pub diversity: f64,
    pub bridge_coverage: f64,
    pub connectivity: f64,
    pub f1: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub item_count: usize,
    pub edge_count: usize,
    /// Edges whose endpoints are missing; excluded from every metric.
    pub dangling_edges: usize,
    pub curated_coverage: Coverage,
    pub suggestion_coverage: Coverage,
    pub inferred_edges: usize,
    pub inferred_quality: f64,
    pub type_stats: BTreeMap<RelationType, TypeStats>,
    pub bridge_coverage: f64,
    pub controversial_connectivity: f64,
    pub well_connected_ratio: f64,
    pub strength_histogram: Vec<HistogramBand>,
    pub diversity: f64,
    /// Agreement between the type mix and the calibrated diversity targets.
    pub target_alignment: f64,
    pub precision: PrecisionEstimate,
    pub components: ScoreComponents,
    pub composite_score: f64,
    pub verdict: Verdict,
}

const HISTOGRAM_BANDS: [(f64, f64); 5] = [(0.0, 0.3), (0.3, 0.5), (0.5, 0.7), (0.7, 0.9), (0.9, 1.0)];

fn ratio_or_one(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        1.0
    } else {
        part as f64 / whole as f64
    }
}

fn canonical_order(a: &Edge, b: &Edge) -> std::cmp::Ordering {
    a.pair_key()
        .cmp(&b.pair_key())
        .then_with(|| a.relation.cmp(&b.relation))
        .then_with(|| a.provenance.cmp(&b.provenance))
        .then_with(|| a.strength.total_cmp(&b.strength))
        .then_with(|| a.source.cmp(&b.source))
        .then_with(|| a.reasoning.cmp(&b.reasoning))
}

pub fn validate(
    items: &[Item],
    batch: &[SuggestionRecord],
    edges: &[Edge],
    calibration: &SemanticCalibration,
    cfg: &GraphConfig,
) -> ValidationReport {
    let index = ItemIndex::new(items);
    let mut sorted: Vec<&Edge> = Vec::with_capacity(edges.len());
    let mut dangling = 0;
    for edge in edges {
        if index.endpoints(edge).is_some() {
            sorted.push(edge);
        } else {
            dangling += 1;
        }
    }
    if dangling > 0 {
        warn!(dangling, "edges with unknown endpoints ignored by validation");
    }
    sorted.sort_by(|a, b| canonical_order(a, b));

    let present: HashSet<PairKey> = sorted.iter().map(|e| e.pair_key()).collect();

    let mut curated_expected = HashSet::new();
    for item in items {
        for target in &item.related {
            if target != &item.id && index.contains(target) {
                curated_expected.insert(PairKey::new(&item.id, target));
            }
        }
    }
    let mut suggestion_expected = HashSet::new();
    for record in batch {
        if !index.contains(&record.item_id) {
            continue;
        }
        for s in &record.suggestions {
            if s.target != record.item_id && index.contains(&s.target) {
                suggestion_expected.insert(PairKey::new(&record.item_id, &s.target));
            }
        }
    }
    let curated_coverage = Coverage::of(&curated_expected, &present);
    let suggestion_coverage = Coverage::of(&suggestion_expected, &present);

    // Inferred quality: mean strength scaled by a type-diversity bonus.
    let inferred: Vec<&&Edge> = sorted.iter().filter(|e| e.inferred).collect();
    let inferred_quality = if inferred.is_empty() {
        0.0
    } else {
        let mean = inferred.iter().map(|e| e.strength).sum::<f64>() / inferred.len() as f64;
        let distinct = inferred.iter().map(|e| e.relation).collect::<HashSet<_>>().len();
        mean * (0.8 + 0.2 * distinct as f64 / RelationType::ALL.len() as f64)
    };

    let type_stats = type_stats(&sorted);
    let diversity = diversity_score(&type_stats, cfg.validation.even_share);
    let target_alignment = if sorted.is_empty() {
        0.0
    } else {
        let deviation: f64 = RelationType::ALL
            .iter()
            .map(|r| {
                let share = type_stats.get(r).map(|s| s.share).unwrap_or(0.0);
                let target = calibration.config.diversity_targets.get(r).copied().unwrap_or(0.0);
                (share - target).abs()
            })
            .sum();
        (1.0 - deviation / 2.0).clamp(0.0, 1.0)
    };

    let mut degree: HashMap<&str, usize> = HashMap::new();
    let mut bridged: HashSet<&str> = HashSet::new();
    for edge in &sorted {
        *degree.entry(edge.source.as_str()).or_insert(0) += 1;
        *degree.entry(edge.target.as_str()).or_insert(0) += 1;
        if let Some((a, b)) = index.endpoints(edge) {
            if cfg.categories.is_domain_bridge(a.category, b.category) {
                bridged.insert(a.id.as_str());
                bridged.insert(b.id.as_str());
            }
        }
    }
    let groups = &cfg.categories;
    let bridgeable: Vec<&Item> = if items.iter().any(|i| groups.technical.contains(&i.category))
        && items.iter().any(|i| groups.conceptual.contains(&i.category))
    {
        items
            .iter()
            .filter(|i| groups.technical.contains(&i.category) || groups.conceptual.contains(&i.category))
            .collect()
    } else {
        Vec::new()
    };
    let bridge_coverage = ratio_or_one(
        bridgeable.iter().filter(|i| bridged.contains(i.id.as_str())).count(),
        bridgeable.len(),
    );

    let controversial: Vec<&Item> = items.iter().filter(|i| i.max_controversy() >= 2).collect();
    let controversial_connectivity = ratio_or_one(
        controversial
            .iter()
            .filter(|i| degree.get(i.id.as_str()).copied().unwrap_or(0) > 0)
            .count(),
        controversial.len(),
    );
    let well_connected_ratio = if items.is_empty() {
        0.0
    } else {
        items
            .iter()
            .filter(|i| degree.get(i.id.as_str()).copied().unwrap_or(0) >= 2)
            .count() as f64
            / items.len() as f64
    };

    let strength_histogram = HISTOGRAM_BANDS
        .iter()
        .enumerate()
        .map(|(k, (min, max))| {
            let last = k == HISTOGRAM_BANDS.len() - 1;
            let count = sorted
                .iter()
                .filter(|e| e.strength >= *min && (e.strength < *max || (last && e.strength <= *max)))
                .count();
            HistogramBand {
                label: format!("{min:.1}-{max:.1}"),
                min: *min,
                max: *max,
                count,
            }
        })
        .collect();

    let precision = estimate_precision(
        &sorted,
        &index,
        &curated_expected,
        &suggestion_expected,
        &present,
        calibration,
        cfg,
    );

    let components = ScoreComponents {
        curated_coverage: curated_coverage.ratio,
        suggestion_coverage: suggestion_coverage.ratio,
        inferred_quality,
        diversity,
        bridge_coverage,
        connectivity: (controversial_connectivity + well_connected_ratio) / 2.0,
        f1: precision.f1,
    };
    let composite_score = composite(&components, cfg);
    let verdict = if composite_score >= cfg.validation.pass_score {
        Verdict::Pass
    } else {
        Verdict::Perfectible
    };

    info!(
        edges = sorted.len(),
        curated_coverage = curated_coverage.ratio,
        suggestion_coverage = suggestion_coverage.ratio,
        diversity,
        f1 = precision.f1,
        score = composite_score,
        verdict = %verdict,
        "graph validated"
    );

    ValidationReport {
        item_count: items.len(),
        edge_count: sorted.len(),
        dangling_edges: dangling,
        curated_coverage,
        suggestion_coverage,
        inferred_edges: inferred.len(),
        inferred_quality,
        type_stats,
        bridge_coverage,
        controversial_connectivity,
        well_connected_ratio,
        strength_histogram,
        diversity,
        target_alignment,
        precision,
        components,
        composite_score,
        verdict,
    }
}

fn type_stats(edges: &[&Edge]) -> BTreeMap<RelationType, TypeStats> {
    let mut grouped: BTreeMap<RelationType, Vec<f64>> = BTreeMap::new();
    for edge in edges {
        grouped.entry(edge.relation).or_default().push(edge.strength);
    }
    grouped
        .into_iter()
        .map(|(relation, strengths)| {
            let count = strengths.len();
            let stats = TypeStats {
                count,
                share: count as f64 / edges.len() as f64,
                avg_strength: strengths.iter().sum::<f64>() / count as f64,
                min_strength: strengths.iter().copied().fold(f64::INFINITY, f64::min),
                max_strength: strengths.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            };
            (relation, stats)
        })
        .collect()
}

/// `1 - sum(|share - even|) / max_deviation`, where the maximum deviation is
/// reached when every edge has one type.
pub fn diversity_score(type_stats: &BTreeMap<RelationType, TypeStats>, even_share: f64) -> f64 {
    if type_stats.is_empty() {
        return 0.0;
    }
    let types = RelationType::ALL.len() as f64;
    let max_deviation = (1.0 - even_share) + (types - 1.0) * even_share;
    let deviation: f64 = RelationType::ALL
        .iter()
        .map(|r| (type_stats.get(r).map(|s| s.share).unwrap_or(0.0) - even_share).abs())
        .sum();
    if max_deviation <= 0.0 {
        return 1.0;
    }
    (1.0 - deviation / max_deviation).clamp(0.0, 1.0)
}

/// Cheap plausibility checks applied to sampled edges.
fn is_coherent(edge: &Edge, a: &Item, b: &Item, calibration: &SemanticCalibration) -> bool {
    if edge.provenance.is_ground_truth() {
        return true;
    }
    let strong_enough = calibration
        .adjustment(edge.relation)
        .map(|adj| edge.strength >= adj.min_threshold)
        .unwrap_or(true);
    let plausible = match edge.relation {
        RelationType::Contradicts => {
            a.max_controversy().max(b.max_controversy()) > 0
                || a.concepts
                    .iter()
                    .any(|c| b.concepts.iter().any(|d| d.name.eq_ignore_ascii_case(&c.name)))
        }
        RelationType::Implements => a.category != b.category,
        RelationType::BuildsOn | RelationType::Questions | RelationType::SimilarTo => true,
    };
    strong_enough && plausible
}

fn estimate_precision(
    sorted: &[&Edge],
    index: &ItemIndex<'_>,
    curated_expected: &HashSet<PairKey>,
    suggestion_expected: &HashSet<PairKey>,
    present: &HashSet<PairKey>,
    calibration: &SemanticCalibration,
    cfg: &GraphConfig,
) -> PrecisionEstimate {
    let amount = cfg.validation.sample_size.min(sorted.len());
    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let mut picks = rand::seq::index::sample(&mut rng, sorted.len(), amount).into_vec();
    picks.sort_unstable();

    let coherent = picks
        .iter()
        .filter(|i| {
            let edge = sorted[**i];
            index
                .endpoints(edge)
                .map(|(a, b)| is_coherent(edge, a, b, calibration))
                .unwrap_or(false)
        })
        .count();
    let precision = if amount == 0 {
        0.0
    } else {
        coherent as f64 / amount as f64
    };

    let expected: HashSet<&PairKey> = curated_expected.union(suggestion_expected).collect();
    let recall = ratio_or_one(expected.iter().filter(|k| present.contains(**k)).count(), expected.len());
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };
    PrecisionEstimate {
        sampled: amount,
        coherent,
        precision,
        recall,
        f1,
    }
}

fn composite(c: &ScoreComponents, cfg: &GraphConfig) -> f64 {
    let w = &cfg.validation.weights;
    let total = w.total();
    if total <= 0.0 {
        return 0.0;
    }
    let weighted = w.curated_coverage * c.curated_coverage
        + w.suggestion_coverage * c.suggestion_coverage
        + w.inferred_quality * c.inferred_quality
        + w.diversity * c.diversity
        + w.bridge_coverage * c.bridge_coverage
        + w.connectivity * c.connectivity
        + w.f1 * c.f1;
    (100.0 * weighted / total).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::calibrate;
    use crate::ground_truth::GroundTruthPatterns;
    use crate::config::ValidationWeights;
    use crate::model::{Category, Concept, Provenance, RelationHint, SuggestedEdge};

    fn stats_with(shares: &[(RelationType, usize)]) -> BTreeMap<RelationType, TypeStats> {
        let edges: Vec<Edge> = shares
            .iter()
            .flat_map(|(r, n)| {
                (0..*n).map(move |k| Edge::new(format!("a{k}"), format!("b{k}"), *r, 0.5, Provenance::Inferred, ""))
            })
            .collect();
        let refs: Vec<&Edge> = edges.iter().collect();
        type_stats(&refs)
    }

    #[test]
    fn diversity_is_one_when_even_and_zero_when_single_type() {
        let even = stats_with(&RelationType::ALL.map(|r| (r, 2)));
        assert!((diversity_score(&even, 0.2) - 1.0).abs() < 1e-12);
        let single = stats_with(&[(RelationType::SimilarTo, 7)]);
        assert!(diversity_score(&single, 0.2).abs() < 1e-12);
        assert_eq!(diversity_score(&BTreeMap::new(), 0.2), 0.0);
    }

    #[test]
    fn empty_graph_is_perfectible_not_an_error() {
        let cfg = GraphConfig::default();
        let cal = calibrate(&GroundTruthPatterns::default(), &cfg);
        let mut a = Item::new("a", Category::Technique);
        a.related = vec!["b".into()];
        let items = vec![a, Item::new("b", Category::Ethique)];
        let report = validate(&items, &[], &[], &cal, &cfg);
        assert_eq!(report.verdict, Verdict::Perfectible);
        assert_eq!(report.curated_coverage.expected, 1);
        assert_eq!(report.curated_coverage.covered, 0);
        assert_eq!(report.precision.sampled, 0);
    }

    #[test]
    fn dangling_edges_are_counted_and_ignored() {
        let cfg = GraphConfig::default();
        let cal = calibrate(&GroundTruthPatterns::default(), &cfg);
        let items = vec![Item::new("a", Category::Technique), Item::new("b", Category::Ethique)];
        let edges = vec![
            Edge::new("a", "b", RelationType::Implements, 0.6, Provenance::Inferred, ""),
            Edge::new("a", "ghost", RelationType::Implements, 0.6, Provenance::Inferred, ""),
        ];
        let report = validate(&items, &[], &edges, &cal, &cfg);
        assert_eq!(report.dangling_edges, 1);
        assert_eq!(report.edge_count, 1);
        assert_eq!(report.bridge_coverage, 1.0);
    }

    #[test]
    fn histogram_puts_full_strength_in_last_band() {
        let cfg = GraphConfig::default();
        let cal = calibrate(&GroundTruthPatterns::default(), &cfg);
        let items = vec![Item::new("a", Category::Technique), Item::new("b", Category::Technique)];
        let edges = vec![Edge::new("a", "b", RelationType::SimilarTo, 1.0, Provenance::Curated, "")];
        let report = validate(&items, &[], &edges, &cal, &cfg);
        assert_eq!(report.strength_histogram.len(), 5);
        assert_eq!(report.strength_histogram[4].count, 1);
        assert_eq!(report.strength_histogram.iter().map(|b| b.count).sum::<usize>(), 1);
    }

    #[test]
    fn weak_inferred_edges_count_as_incoherent() {
        let cfg = GraphConfig::default();
        let cal = calibrate(&GroundTruthPatterns::default(), &cfg);
        let items = vec![Item::new("a", Category::Technique), Item::new("b", Category::Technique)];
        let weak = vec![Edge::new("a", "b", RelationType::BuildsOn, 0.2, Provenance::Inferred, "")];
        let report = validate(&items, &[], &weak, &cal, &cfg);
        assert_eq!(report.precision.sampled, 1);
        assert_eq!(report.precision.coherent, 0);
        assert_eq!(report.precision.f1, 0.0);
        // no ground truth expected, so recall is vacuously complete
        assert_eq!(report.precision.recall, 1.0);
    }

    #[test]
    fn covered_diverse_graph_passes() {
        let cfg = GraphConfig::default();
        let cal = calibrate(&GroundTruthPatterns::default(), &cfg);
        let mut a = Item::new("a", Category::Technique);
        a.related = vec!["b".into()];
        let b = Item::new("b", Category::Ethique);
        let c = Item::new("c", Category::Philosophie);
        let d = Item::new("d", Category::Recherche);
        let mut e = Item::new("e", Category::Societe);
        e.concepts = vec![Concept {
            name: "surveillance".into(),
            kind: "theme".into(),
            controversy: 2,
        }];
        let items = vec![a, b, c, d, e];
        let batch = vec![SuggestionRecord {
            item_id: "c".into(),
            category: None,
            suggestions: vec![SuggestedEdge {
                target: "d".into(),
                relation: RelationHint::Questions,
                strength: 0.7,
                confidence: 0.9,
                reasoning: "questions the method".into(),
            }],
        }];
        let edges = vec![
            Edge::new("a", "b", RelationType::BuildsOn, 0.9, Provenance::Curated, ""),
            Edge::new("c", "d", RelationType::Questions, 0.7, Provenance::Suggested, ""),
            Edge::new("a", "c", RelationType::Implements, 0.8, Provenance::Inferred, ""),
            Edge::new("d", "e", RelationType::Contradicts, 0.7, Provenance::Inferred, ""),
            Edge::new("b", "e", RelationType::SimilarTo, 0.75, Provenance::Inferred, ""),
        ];

        let report = validate(&items, &batch, &edges, &cal, &cfg);
        assert_eq!(report.components.curated_coverage, 1.0);
        assert_eq!(report.components.suggestion_coverage, 1.0);
        assert!((report.components.diversity - 1.0).abs() < 1e-12);
        assert_eq!(report.components.bridge_coverage, 1.0);
        assert_eq!(report.components.connectivity, 1.0);
        assert_eq!(report.precision.coherent, 5);
        assert!((report.components.f1 - 1.0).abs() < 1e-12);
        // mean 0.75 over three inferred types -> 0.75 * (0.8 + 0.2 * 3 / 5)
        assert!((report.components.inferred_quality - 0.69).abs() < 1e-12);
        assert!((report.composite_score - 95.35).abs() < 1e-9);
        assert!(report.composite_score >= cfg.validation.pass_score);
        assert_eq!(report.verdict, Verdict::Pass);
    }

    #[test]
    fn composite_is_the_normalized_weighted_sum() {
        let components = ScoreComponents {
            curated_coverage: 1.0,
            suggestion_coverage: 0.5,
            inferred_quality: 0.6,
            diversity: 0.8,
            bridge_coverage: 0.0,
            connectivity: 0.75,
            f1: 0.9,
        };
        let mut cfg = GraphConfig::default();
        // 0.20 + 0.075 + 0.09 + 0.08 + 0 + 0.075 + 0.18 = 0.70
        assert!((composite(&components, &cfg) - 70.0).abs() < 1e-9);

        cfg.validation.weights = ValidationWeights {
            curated_coverage: 0.0,
            suggestion_coverage: 0.0,
            inferred_quality: 1.0,
            diversity: 0.0,
            bridge_coverage: 0.0,
            connectivity: 0.0,
            f1: 3.0,
        };
        // (0.6 + 2.7) / 4
        assert!((composite(&components, &cfg) - 82.5).abs() < 1e-9);

        cfg.validation.weights.inferred_quality = 0.0;
        cfg.validation.weights.f1 = 0.0;
        assert_eq!(composite(&components, &cfg), 0.0);
    }
}
