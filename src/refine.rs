//! Second pass over interdisciplinary pairs the synthesizer left uncovered.
//!
//! Bridge thresholds are recomputed from the accepted cross-category edges on
//! every run ([`dynamic_bridge_thresholds`] is a pure function of the edge
//! snapshot), so nothing carries over between runs.

use std::collections::{BTreeMap, HashMap, HashSet};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::calibration::SemanticCalibration;
use crate::config::GraphConfig;
use crate::model::{clamp_unit, Category, CategoryPair, Edge, Item, ItemIndex, Provenance, RelationType};
use crate::similarity::{cosine_similarity, item_similarity, item_text, keyword_hits, tokenize};
use crate::synthesis::EdgeSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeThresholds {
    pub per_pair: BTreeMap<CategoryPair, f64>,
    pub fallback: f64,
}

impl BridgeThresholds {
    pub fn for_pair(&self, a: Category, b: Category) -> f64 {
        self.per_pair
            .get(&CategoryPair::new(a, b))
            .copied()
            .unwrap_or(self.fallback)
    }
}

/// Per cross-category pair: `max(floor, factor * min observed similarity)`
/// over accepted edges, when the pair has enough observations.
pub fn dynamic_bridge_thresholds(
    edges: &[Edge],
    index: &ItemIndex<'_>,
    cfg: &GraphConfig,
) -> BridgeThresholds {
    let r = &cfg.refine;
    let mut observed: BTreeMap<CategoryPair, Vec<f64>> = BTreeMap::new();
    for edge in edges {
        let Some((a, b)) = index.endpoints(edge) else {
            continue;
        };
        if a.category == b.category {
            continue;
        }
        if let Some(similarity) = item_similarity(a, b) {
            observed
                .entry(CategoryPair::new(a.category, b.category))
                .or_default()
                .push(similarity);
        }
    }
    let per_pair = observed
        .into_iter()
        .filter(|(_, sims)| sims.len() >= r.min_observations.max(1))
        .map(|(pair, sims)| {
            let min = sims.iter().copied().fold(f64::INFINITY, f64::min);
            (pair, r.threshold_floor.max(r.threshold_factor * min))
        })
        .collect();
    BridgeThresholds {
        per_pair,
        fallback: r.fallback_threshold,
    }
}

/// Opposition evidence found in the text of two items.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LexicalSignal {
    pub opposition_hits: usize,
    pub negation_hits: usize,
    /// Concept-name tokens the two items share.
    pub concept_overlap: usize,
    pub strength: f64,
}

impl LexicalSignal {
    pub fn clears(&self, cfg: &GraphConfig) -> bool {
        self.strength >= cfg.refine.min_lexical_strength
            && self.concept_overlap >= cfg.refine.min_concept_overlap
    }
}

pub fn lexical_contradiction(
    a: &Item,
    b: &Item,
    calibration: &SemanticCalibration,
    cfg: &GraphConfig,
) -> LexicalSignal {
    let tokens: HashSet<String> = tokenize(&item_text(a))
        .into_iter()
        .chain(tokenize(&item_text(b)))
        .collect();
    let opposition_hits = keyword_hits(&tokens, &calibration.indicators.conflict);
    let negation_hits = keyword_hits(&tokens, &calibration.indicators.negation);

    let concept_tokens = |item: &Item| -> HashSet<String> {
        item.concepts
            .iter()
            .flat_map(|c| tokenize(&c.name))
            .filter(|t| t.chars().count() > 2)
            .collect()
    };
    let concept_overlap = concept_tokens(a).intersection(&concept_tokens(b)).count();

    LexicalSignal {
        opposition_hits,
        negation_hits,
        concept_overlap,
        strength: clamp_unit(cfg.refine.lexical_hit_weight * (opposition_hits + negation_hits) as f64),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefineSummary {
    pub thresholds: BridgeThresholds,
    /// Uncovered cross-category pairs with embeddings on both sides.
    pub candidates: usize,
    pub examined: usize,
    pub bridges: usize,
    pub contradictions: usize,
    /// Pairs skipped because an endpoint hit the per-item cap.
    pub capped: usize,
}

#[derive(Debug, Clone)]
pub struct RefineOutput {
    pub edges: Vec<Edge>,
    pub summary: RefineSummary,
}

pub fn refine(
    items: &[Item],
    edges: Vec<Edge>,
    calibration: &SemanticCalibration,
    cfg: &GraphConfig,
) -> RefineOutput {
    let r = &cfg.refine;
    let index = ItemIndex::new(items);
    let thresholds = dynamic_bridge_thresholds(&edges, &index, cfg);
    let mut set = EdgeSet::from_edges(edges);

    let eligible: Vec<(&Item, &[f64])> = items
        .iter()
        .filter_map(|item| item.embedding().map(|e| (item, e)))
        .collect();
    let mut pairs: Vec<(usize, usize)> = Vec::new();
    for i in 0..eligible.len() {
        for j in (i + 1)..eligible.len() {
            let (a, b) = (eligible[i].0, eligible[j].0);
            if a.category != b.category && !set.covers(&a.id, &b.id) {
                pairs.push((i, j));
            }
        }
    }
    let candidates = pairs.len();
    if pairs.len() > r.sample_size {
        let mut rng = StdRng::seed_from_u64(cfg.seed);
        pairs.shuffle(&mut rng);
        pairs.truncate(r.sample_size);
        pairs.sort_unstable();
        debug!(candidates, sampled = pairs.len(), "sampling interdisciplinary pairs");
    }

    let mut added: HashMap<&str, usize> = HashMap::new();
    let mut summary = RefineSummary {
        thresholds: thresholds.clone(),
        candidates,
        examined: 0,
        bridges: 0,
        contradictions: 0,
        capped: 0,
    };

    for (i, j) in pairs {
        let (a, a_vec) = eligible[i];
        let (b, b_vec) = eligible[j];
        let at_cap = |id: &str| added.get(id).copied().unwrap_or(0) >= r.max_new_per_item;
        if at_cap(&a.id) || at_cap(&b.id) {
            summary.capped += 1;
            continue;
        }
        summary.examined += 1;

        let similarity = cosine_similarity(a_vec, b_vec);
        let threshold = thresholds.for_pair(a.category, b.category);
        let edge = if similarity >= threshold {
            Some(Edge::new(
                a.id.as_str(),
                b.id.as_str(),
                r.bridge_relation,
                (similarity + r.bridge_bonus).min(r.bridge_cap),
                Provenance::Inferred,
                format!("interdisciplinary bridge: similarity {similarity:.3} >= {threshold:.3}"),
            ))
        } else if (r.contradiction_band_low..=r.contradiction_band_high).contains(&similarity) {
            let signal = lexical_contradiction(a, b, calibration, cfg);
            signal.clears(cfg).then(|| {
                Edge::new(
                    a.id.as_str(),
                    b.id.as_str(),
                    RelationType::Contradicts,
                    signal.strength.min(r.contradiction_cap),
                    Provenance::Inferred,
                    format!(
                        "lexical opposition: {} opposition, {} negation, {} shared concept tokens",
                        signal.opposition_hits, signal.negation_hits, signal.concept_overlap
                    ),
                )
            })
        } else {
            None
        };

        let Some(edge) = edge else {
            continue;
        };
        let relation = edge.relation;
        if set.try_insert(edge) {
            if relation == RelationType::Contradicts {
                summary.contradictions += 1;
            } else {
                summary.bridges += 1;
            }
            *added.entry(a.id.as_str()).or_insert(0) += 1;
            *added.entry(b.id.as_str()).or_insert(0) += 1;
        }
    }

    info!(
        calibrated_bridges = summary.thresholds.per_pair.len(),
        candidates = summary.candidates,
        examined = summary.examined,
        bridges = summary.bridges,
        contradictions = summary.contradictions,
        "interdisciplinary pairs refined"
    );

    RefineOutput {
        edges: set.into_edges(),
        summary,
    }
}
