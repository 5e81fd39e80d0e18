//! Triple edge synthesis.
//!
//! Builds the working edge set in three tiers: curated links, then suggested
//! edges, then similarity-inferred edges for pairs neither tier covered. The
//! pair-coverage set is updated as each edge is accepted, so a lower tier can
//! never re-derive a pair a higher tier already owns.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::calibration::SemanticCalibration;
use crate::cascade::Cascade;
use crate::config::{BoostCondition, GraphConfig};
use crate::ground_truth::{resolution_cascade, resolve_relation, ReasoningContext};
use crate::model::{clamp_unit, Edge, Item, ItemIndex, PairKey, Provenance, RelationType, SuggestionRecord};
use crate::similarity::cosine_similarity;

// =============================================================================
// Working edge set
// =============================================================================

/// Edges plus the pair-coverage and degree bookkeeping that keeps them unique.
#[derive(Debug, Clone, Default)]
pub struct EdgeSet {
    edges: Vec<Edge>,
    covered: HashSet<PairKey>,
    degree: HashMap<String, usize>,
}

impl EdgeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild bookkeeping from existing edges; later duplicates are dropped.
    pub fn from_edges(edges: impl IntoIterator<Item = Edge>) -> Self {
        let mut set = Self::new();
        for edge in edges {
            set.try_insert(edge);
        }
        set
    }

    /// Accept the edge unless it is a self-loop or its pair is covered.
    pub fn try_insert(&mut self, edge: Edge) -> bool {
        if edge.source == edge.target {
            return false;
        }
        if !self.covered.insert(edge.pair_key()) {
            return false;
        }
        *self.degree.entry(edge.source.clone()).or_insert(0) += 1;
        *self.degree.entry(edge.target.clone()).or_insert(0) += 1;
        self.edges.push(edge);
        true
    }

    pub fn covers(&self, a: &str, b: &str) -> bool {
        self.covered.contains(&PairKey::new(a, b))
    }

    pub fn degree(&self, id: &str) -> usize {
        self.degree.get(id).copied().unwrap_or(0)
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn into_edges(self) -> Vec<Edge> {
        self.edges
    }
}

// =============================================================================
// Pair classification
// =============================================================================

/// Structural signals between two items that drive inferred typing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairFeatures {
    pub similarity: f64,
    pub controversy_gap: u8,
    pub domain_bridge: bool,
    pub complexity_gap: u8,
    pub shared_author: bool,
    pub shared_tools: usize,
    pub cross_category: bool,
    pub shared_concepts: usize,
}

impl PairFeatures {
    pub fn between(a: &Item, b: &Item, similarity: f64, cfg: &GraphConfig) -> Self {
        let shared_author = match (&a.author, &b.author) {
            (Some(x), Some(y)) => !x.trim().is_empty() && x.trim().eq_ignore_ascii_case(y.trim()),
            _ => false,
        };
        let tools: HashSet<String> = a.tools.iter().map(|t| t.to_lowercase()).collect();
        let shared_tools = b
            .tools
            .iter()
            .map(|t| t.to_lowercase())
            .collect::<HashSet<_>>()
            .intersection(&tools)
            .count();
        let concepts: HashSet<String> = a.concepts.iter().map(|c| c.name.to_lowercase()).collect();
        let shared_concepts = b
            .concepts
            .iter()
            .map(|c| c.name.to_lowercase())
            .collect::<HashSet<_>>()
            .intersection(&concepts)
            .count();
        Self {
            similarity,
            controversy_gap: a.max_controversy().abs_diff(b.max_controversy()),
            domain_bridge: cfg.categories.is_domain_bridge(a.category, b.category),
            complexity_gap: a.complexity.gap(b.complexity),
            shared_author,
            shared_tools,
            cross_category: a.category != b.category,
            shared_concepts,
        }
    }

    /// Shared author or at least one shared tool.
    pub fn citation_pattern(&self) -> bool {
        self.shared_author || self.shared_tools > 0
    }

    pub fn satisfies(&self, condition: BoostCondition, cfg: &GraphConfig) -> bool {
        match condition {
            BoostCondition::ComplexityGap => self.complexity_gap == 1,
            BoostCondition::ControversyGap => {
                self.controversy_gap >= cfg.inference.contradiction_gap
            }
            BoostCondition::DomainBridge => self.domain_bridge,
            BoostCondition::CrossCategory => self.cross_category,
            BoostCondition::SharedTools => self.citation_pattern(),
        }
    }
}

/// The fixed inferred-type cascade, first match wins.
pub fn type_cascade(cfg: &GraphConfig) -> Cascade<PairFeatures, RelationType> {
    let gap = cfg.inference.contradiction_gap;
    Cascade::new("similarity", RelationType::SimilarTo)
        .rule("contradiction", RelationType::Contradicts, move |f: &PairFeatures| {
            f.controversy_gap >= gap
        })
        .rule("domain_bridge", RelationType::Implements, |f: &PairFeatures| {
            f.domain_bridge
        })
        .rule("complexity_gap", RelationType::BuildsOn, |f: &PairFeatures| {
            f.complexity_gap == 1
        })
        .rule("citation_pattern", RelationType::BuildsOn, |f: &PairFeatures| {
            f.citation_pattern()
        })
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub relation: RelationType,
    pub rule: String,
    pub strength: f64,
    pub features: PairFeatures,
}

/// Similarity scaled by the type multiplier, plus the type's boost when its
/// condition holds, clamped into the type's band.
pub fn inferred_strength(
    relation: RelationType,
    features: &PairFeatures,
    calibration: &SemanticCalibration,
    cfg: &GraphConfig,
) -> f64 {
    let Some(adjustment) = calibration.adjustment(relation) else {
        return clamp_unit(features.similarity);
    };
    let mut strength = features.similarity * adjustment.base_multiplier;
    if let Some(boost) = adjustment.boost {
        if features.satisfies(boost.condition, cfg) {
            strength += boost.amount;
        }
    }
    clamp_unit(adjustment.band.clamp(strength))
}

// =============================================================================
// Synthesizer
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SynthesisSummary {
    pub curated: usize,
    pub suggested: usize,
    pub inferred: usize,
    /// Links or suggestions whose endpoints are not in the item set.
    pub dropped_references: usize,
    /// Edges for a pair a higher tier (or an earlier edge) already covered.
    pub duplicates: usize,
    pub skipped_no_embedding: usize,
    /// Items whose existing degree already used up the inference budget.
    pub items_at_budget: usize,
    pub by_type: BTreeMap<RelationType, usize>,
}

#[derive(Debug, Clone)]
pub struct SynthesisOutput {
    pub edges: Vec<Edge>,
    pub summary: SynthesisSummary,
}

pub struct Synthesizer<'a> {
    cfg: &'a GraphConfig,
    calibration: &'a SemanticCalibration,
    types: Cascade<PairFeatures, RelationType>,
    hints: Cascade<ReasoningContext, RelationType>,
}

impl<'a> Synthesizer<'a> {
    pub fn new(cfg: &'a GraphConfig, calibration: &'a SemanticCalibration) -> Self {
        Self {
            cfg,
            calibration,
            types: type_cascade(cfg),
            hints: resolution_cascade(cfg, true),
        }
    }

    pub fn type_cascade(&self) -> &Cascade<PairFeatures, RelationType> {
        &self.types
    }

    pub fn classify_pair(&self, a: &Item, b: &Item, similarity: f64) -> Classification {
        let features = PairFeatures::between(a, b, similarity, self.cfg);
        let decision = self.types.evaluate(&features);
        Classification {
            relation: decision.outcome,
            rule: decision.rule.to_string(),
            strength: inferred_strength(decision.outcome, &features, self.calibration, self.cfg),
            features,
        }
    }

    pub fn synthesize(&self, items: &[Item], batch: &[SuggestionRecord]) -> SynthesisOutput {
        let index = ItemIndex::new(items);
        let mut set = EdgeSet::new();
        let mut summary = SynthesisSummary::default();

        self.curated_tier(items, &index, &mut set, &mut summary);
        self.suggested_tier(batch, &index, &mut set, &mut summary);
        self.inferred_tier(items, &mut set, &mut summary);

        for edge in set.edges() {
            *summary.by_type.entry(edge.relation).or_insert(0) += 1;
        }
        info!(
            curated = summary.curated,
            suggested = summary.suggested,
            inferred = summary.inferred,
            dropped_references = summary.dropped_references,
            duplicates = summary.duplicates,
            skipped_no_embedding = summary.skipped_no_embedding,
            total = set.len(),
            "edges synthesized"
        );
        SynthesisOutput {
            edges: set.into_edges(),
            summary,
        }
    }

    fn curated_tier(
        &self,
        items: &[Item],
        index: &ItemIndex<'_>,
        set: &mut EdgeSet,
        summary: &mut SynthesisSummary,
    ) {
        let curated = &self.cfg.curated;
        for item in items {
            for target in &item.related {
                if target == &item.id {
                    debug!(item = %item.id, "ignoring curated self-link");
                    continue;
                }
                if !index.contains(target) {
                    warn!(source = %item.id, target = %target, "curated link to unknown item dropped");
                    summary.dropped_references += 1;
                    continue;
                }
                let edge = Edge::new(
                    item.id.as_str(),
                    target.as_str(),
                    curated.relation,
                    curated.strength,
                    Provenance::Curated,
                    "curated link",
                );
                if set.try_insert(edge) {
                    summary.curated += 1;
                } else {
                    summary.duplicates += 1;
                }
            }
        }
    }

    fn suggested_tier(
        &self,
        batch: &[SuggestionRecord],
        index: &ItemIndex<'_>,
        set: &mut EdgeSet,
        summary: &mut SynthesisSummary,
    ) {
        for record in batch {
            let Some(source) = index.get(&record.item_id) else {
                if !record.suggestions.is_empty() {
                    warn!(
                        source = %record.item_id,
                        dropped = record.suggestions.len(),
                        "suggestions for an item outside the item set dropped"
                    );
                    summary.dropped_references += record.suggestions.len();
                }
                continue;
            };
            for suggestion in &record.suggestions {
                let Some(target) = index.get(&suggestion.target) else {
                    warn!(
                        source = %source.id,
                        target = %suggestion.target,
                        "suggestion target not in item set dropped"
                    );
                    summary.dropped_references += 1;
                    continue;
                };
                let bridge = self
                    .cfg
                    .categories
                    .is_domain_bridge(source.category, target.category);
                let relation =
                    resolve_relation(&self.hints, suggestion.relation, &suggestion.reasoning, bridge);
                let edge = Edge::new(
                    source.id.as_str(),
                    target.id.as_str(),
                    relation,
                    suggestion.strength,
                    Provenance::Suggested,
                    suggestion.reasoning.as_str(),
                );
                if set.try_insert(edge) {
                    summary.suggested += 1;
                } else {
                    summary.duplicates += 1;
                }
            }
        }
    }

    fn inferred_tier(&self, items: &[Item], set: &mut EdgeSet, summary: &mut SynthesisSummary) {
        let eligible: Vec<(&Item, &[f64])> = items
            .iter()
            .filter_map(|item| item.embedding().map(|e| (item, e)))
            .collect();
        summary.skipped_no_embedding = items.len() - eligible.len();
        if summary.skipped_no_embedding > 0 {
            debug!(
                skipped = summary.skipped_no_embedding,
                "items without embeddings excluded from inference"
            );
        }
        let max_new = self.calibration.config.max_new_connections_per_item;

        for (source, source_vec) in &eligible {
            let budget = max_new.saturating_sub(set.degree(&source.id));
            if budget == 0 {
                summary.items_at_budget += 1;
                continue;
            }

            let mut candidates: Vec<(&Item, f64)> = eligible
                .iter()
                .filter(|(other, _)| other.id != source.id && !set.covers(&source.id, &other.id))
                .filter_map(|(other, other_vec)| {
                    let similarity = cosine_similarity(source_vec, other_vec);
                    let threshold = self.calibration.pair_threshold(source.category, other.category);
                    (similarity >= threshold).then_some((*other, similarity))
                })
                .collect();
            candidates.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.0.id.cmp(&b.0.id))
            });

            for (target, similarity) in candidates.into_iter().take(budget) {
                let class = self.classify_pair(source, target, similarity);
                let edge = Edge::new(
                    source.id.as_str(),
                    target.id.as_str(),
                    class.relation,
                    class.strength,
                    Provenance::Inferred,
                    format!("{}: similarity {:.3}", class.rule, similarity),
                );
                if set.try_insert(edge) {
                    summary.inferred += 1;
                }
            }
        }
    }
}
