//! Ground-truth analysis.
//!
//! Mines the curated links and the suggestion batch for the statistics the
//! calibrator needs: link volume, per-type strength/confidence ranges,
//! frequent reasoning keywords, and per-category-pair strength percentiles.
//!
//! A suggestion target may exist only in the batch (not in the live item set);
//! such targets still count here, while synthesis later drops them.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, OrderStatistics};
use tracing::{debug, info, warn};

use crate::cascade::Cascade;
use crate::config::GraphConfig;
use crate::model::{
    clamp_unit, Category, CategoryPair, Item, ItemIndex, RelationHint, RelationType,
    SuggestionRecord,
};
use crate::similarity::{mentions_any, tokenize};

// =============================================================================
// Relation hint resolution
// =============================================================================

/// What the `relates_to` resolver looks at.
#[derive(Debug, Clone)]
pub struct ReasoningContext {
    /// Lowercased reasoning tokens.
    pub tokens: Vec<String>,
    /// Whether the pair links a technical item to a conceptual one.
    pub domain_bridge: bool,
}

impl ReasoningContext {
    pub fn new(reasoning: &str, domain_bridge: bool) -> Self {
        Self {
            tokens: tokenize(reasoning),
            domain_bridge,
        }
    }
}

/// Keyword families in configured priority order, then the fallback.
///
/// With `consult_bridge`, a domain-bridge rule is inserted just before the
/// fallback: keyword evidence still wins, but an otherwise unexplained
/// technical/conceptual pair resolves to `implements`.
pub fn resolution_cascade(
    cfg: &GraphConfig,
    consult_bridge: bool,
) -> Cascade<ReasoningContext, RelationType> {
    let mut cascade = Cascade::new("fallback", cfg.resolution.fallback);
    for family in &cfg.resolution.families {
        let keywords: Vec<String> = family.keywords.iter().map(|k| k.to_lowercase()).collect();
        cascade = cascade.rule(
            family.name.clone(),
            family.relation,
            move |ctx: &ReasoningContext| mentions_any(&ctx.tokens, &keywords),
        );
    }
    if consult_bridge {
        cascade = cascade.rule(
            "domain_bridge",
            RelationType::Implements,
            |ctx: &ReasoningContext| ctx.domain_bridge,
        );
    }
    cascade
}

/// Explicit hints pass through; `relates_to` goes through the cascade.
pub fn resolve_relation(
    cascade: &Cascade<ReasoningContext, RelationType>,
    hint: RelationHint,
    reasoning: &str,
    domain_bridge: bool,
) -> RelationType {
    match hint.explicit() {
        Some(relation) => relation,
        None => {
            cascade
                .evaluate(&ReasoningContext::new(reasoning, domain_bridge))
                .outcome
        }
    }
}

// =============================================================================
// Patterns
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HardLinkStats {
    pub total: usize,
    pub valid: usize,
    pub dangling: usize,
    pub self_links: usize,
    pub items_with_links: usize,
    /// Valid links counted by the linking item's primary category.
    pub by_category: BTreeMap<Category, usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeStats {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

impl RangeStats {
    fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let avg = values.iter().sum::<f64>() / values.len() as f64;
        Some(Self { min, max, avg })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordCount {
    pub word: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypePattern {
    pub count: usize,
    pub strength: RangeStats,
    pub confidence: RangeStats,
    /// Most frequent reasoning words, most frequent first.
    pub keywords: Vec<KeywordCount>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuggestionStats {
    pub records: usize,
    pub total: usize,
    /// Suggestions whose open `relates_to` hint was resolved from reasoning.
    pub resolved_from_hint: usize,
    /// Suggestions dropped because the target exists nowhere.
    pub unresolvable: usize,
    pub by_type: BTreeMap<RelationType, TypePattern>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairObservation {
    pub threshold: f64,
    pub observations: usize,
}

/// Exploratory type-prediction rule. Reported, not used downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRule {
    pub name: String,
    pub condition: String,
    pub predicted: RelationType,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthPatterns {
    pub hard_links: HardLinkStats,
    pub suggestions: SuggestionStats,
    pub category_thresholds: BTreeMap<CategoryPair, PairObservation>,
    pub prediction_rules: Vec<PredictionRule>,
}

impl GroundTruthPatterns {
    /// Share of each observed suggestion type; empty without suggestions.
    pub fn type_shares(&self) -> BTreeMap<RelationType, f64> {
        let total: usize = self.suggestions.by_type.values().map(|p| p.count).sum();
        if total == 0 {
            return BTreeMap::new();
        }
        self.suggestions
            .by_type
            .iter()
            .map(|(t, p)| (*t, p.count as f64 / total as f64))
            .collect()
    }

    pub fn avg_strength(&self, relation: RelationType) -> Option<f64> {
        self.suggestions
            .by_type
            .get(&relation)
            .map(|p| p.strength.avg)
    }

    pub fn keywords(&self, relation: RelationType) -> Vec<&str> {
        self.suggestions
            .by_type
            .get(&relation)
            .map(|p| p.keywords.iter().map(|k| k.word.as_str()).collect())
            .unwrap_or_default()
    }
}

#[derive(Default)]
struct TypeAccumulator {
    strengths: Vec<f64>,
    confidences: Vec<f64>,
    word_counts: HashMap<String, usize>,
}

// =============================================================================
// Analysis
// =============================================================================

pub fn analyze(
    items: &[Item],
    batch: &[SuggestionRecord],
    cfg: &GraphConfig,
) -> GroundTruthPatterns {
    let index = ItemIndex::new(items);
    let hard_links = hard_link_stats(items, &index);

    let batch_categories: HashMap<&str, Option<Category>> = batch
        .iter()
        .map(|r| (r.item_id.as_str(), r.category))
        .collect();
    let category_of = |id: &str| -> Option<Category> {
        index
            .get(id)
            .map(|item| item.category)
            .or_else(|| batch_categories.get(id).copied().flatten())
    };

    let cascade = resolution_cascade(cfg, false);
    let stopwords: HashSet<&str> = cfg.keywords.stopwords.iter().map(|s| s.as_str()).collect();
    let mut stats = SuggestionStats {
        records: batch.len(),
        ..SuggestionStats::default()
    };
    let mut per_type: BTreeMap<RelationType, TypeAccumulator> = BTreeMap::new();
    let mut pair_strengths: BTreeMap<CategoryPair, Vec<f64>> = BTreeMap::new();

    for record in batch {
        for suggestion in &record.suggestions {
            stats.total += 1;
            let target = suggestion.target.as_str();
            if !index.contains(target) && !batch_categories.contains_key(target) {
                stats.unresolvable += 1;
                warn!(
                    source = %record.item_id,
                    target,
                    "suggestion target not found in items or batch; skipped"
                );
                continue;
            }
            if suggestion.relation.explicit().is_none() {
                stats.resolved_from_hint += 1;
            }
            let relation =
                resolve_relation(&cascade, suggestion.relation, &suggestion.reasoning, false);
            let strength = clamp_unit(suggestion.strength);
            let acc = per_type.entry(relation).or_default();
            acc.strengths.push(strength);
            acc.confidences.push(clamp_unit(suggestion.confidence));
            for word in tokenize(&suggestion.reasoning) {
                if word.chars().count() > cfg.keywords.min_word_len
                    && !stopwords.contains(word.as_str())
                    && !word.chars().all(|c| c.is_numeric())
                {
                    *acc.word_counts.entry(word).or_insert(0) += 1;
                }
            }

            if let (Some(a), Some(b)) = (category_of(&record.item_id), category_of(target)) {
                pair_strengths
                    .entry(CategoryPair::new(a, b))
                    .or_default()
                    .push(strength);
            }
        }
    }

    for (relation, acc) in per_type {
        let (Some(strength), Some(confidence)) = (
            RangeStats::from_values(&acc.strengths),
            RangeStats::from_values(&acc.confidences),
        ) else {
            continue;
        };
        stats.by_type.insert(
            relation,
            TypePattern {
                count: acc.strengths.len(),
                strength,
                confidence,
                keywords: top_keywords(acc.word_counts, cfg),
            },
        );
    }

    let category_thresholds = pair_thresholds(pair_strengths, cfg);

    info!(
        hard_links = hard_links.valid,
        dangling_links = hard_links.dangling,
        suggestions = stats.total,
        unresolvable = stats.unresolvable,
        relates_to_resolved = stats.resolved_from_hint,
        calibrated_pairs = category_thresholds.len(),
        "ground truth analyzed"
    );

    GroundTruthPatterns {
        hard_links,
        suggestions: stats,
        category_thresholds,
        prediction_rules: prediction_rules(),
    }
}

fn hard_link_stats(items: &[Item], index: &ItemIndex<'_>) -> HardLinkStats {
    let mut stats = HardLinkStats::default();
    for item in items {
        if !item.related.is_empty() {
            stats.items_with_links += 1;
        }
        for target in &item.related {
            stats.total += 1;
            if target == &item.id {
                stats.self_links += 1;
            } else if index.contains(target) {
                stats.valid += 1;
                *stats.by_category.entry(item.category).or_insert(0) += 1;
            } else {
                stats.dangling += 1;
                debug!(source = %item.id, target = %target, "hard link to unknown item");
            }
        }
    }
    stats
}

fn top_keywords(counts: HashMap<String, usize>, cfg: &GraphConfig) -> Vec<KeywordCount> {
    let mut words: Vec<KeywordCount> = counts
        .into_iter()
        .filter(|(_, count)| *count >= cfg.keywords.min_occurrences)
        .map(|(word, count)| KeywordCount { word, count })
        .collect();
    words.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.word.cmp(&b.word)));
    words.truncate(cfg.keywords.max_per_type);
    words
}

fn pair_thresholds(
    pair_strengths: BTreeMap<CategoryPair, Vec<f64>>,
    cfg: &GraphConfig,
) -> BTreeMap<CategoryPair, PairObservation> {
    let t = &cfg.thresholds;
    pair_strengths
        .into_iter()
        .filter(|(_, values)| values.len() >= t.min_pair_observations.max(1))
        .map(|(pair, values)| {
            let observations = values.len();
            let mut data = Data::new(values);
            let percentile = data.percentile(t.ground_truth_percentile);
            (
                pair,
                PairObservation {
                    threshold: percentile.max(t.ground_truth_floor),
                    observations,
                },
            )
        })
        .collect()
}

fn prediction_rules() -> Vec<PredictionRule> {
    let rule = |name: &str, condition: &str, predicted, confidence| PredictionRule {
        name: name.to_string(),
        condition: condition.to_string(),
        predicted,
        confidence,
    };
    vec![
        rule(
            "controversy_gap",
            "max concept controversy differs by 2 or more",
            RelationType::Contradicts,
            0.75,
        ),
        rule(
            "domain_bridge",
            "technical item paired with a conceptual item",
            RelationType::Implements,
            0.7,
        ),
        rule(
            "complexity_gap",
            "complexity levels differ by exactly one",
            RelationType::BuildsOn,
            0.65,
        ),
        rule(
            "shared_tools",
            "shared author or at least one shared tool",
            RelationType::BuildsOn,
            0.6,
        ),
        rule(
            "same_category",
            "same primary category, no other signal",
            RelationType::SimilarTo,
            0.55,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SuggestedEdge;

    fn suggestion(target: &str, hint: RelationHint, strength: f64, reasoning: &str) -> SuggestedEdge {
        SuggestedEdge {
            target: target.to_string(),
            relation: hint,
            strength,
            confidence: 0.8,
            reasoning: reasoning.to_string(),
        }
    }

    fn record(id: &str, category: Option<Category>, s: Vec<SuggestedEdge>) -> SuggestionRecord {
        SuggestionRecord {
            item_id: id.to_string(),
            category,
            suggestions: s,
        }
    }

    #[test]
    fn keyword_families_resolve_in_priority_order() {
        let cfg = GraphConfig::default();
        let cascade = resolution_cascade(&cfg, false);
        let resolve = |text: &str| resolve_relation(&cascade, RelationHint::RelatesTo, text, false);

        assert_eq!(resolve("Cite et prolonge ce travail"), RelationType::BuildsOn);
        assert_eq!(resolve("Une tension forte"), RelationType::Contradicts);
        assert_eq!(resolve("Application concrete"), RelationType::Implements);
        assert_eq!(resolve("Interroge les limites"), RelationType::Questions);
        assert_eq!(resolve("Sujet voisin"), RelationType::SimilarTo);
        // citation outranks tension when both appear
        assert_eq!(resolve("tension, mais cite"), RelationType::BuildsOn);
        // "cite" inside a longer word is not a citation
        assert_eq!(resolve("Capacite en tension"), RelationType::Contradicts);
        assert_eq!(resolve("Une mise en oeuvre"), RelationType::Implements);
    }

    #[test]
    fn explicit_hints_bypass_keywords() {
        let cfg = GraphConfig::default();
        let cascade = resolution_cascade(&cfg, true);
        let r = resolve_relation(&cascade, RelationHint::Questions, "tension", true);
        assert_eq!(r, RelationType::Questions);
    }

    #[test]
    fn bridge_rule_only_applies_without_keyword_evidence() {
        let cfg = GraphConfig::default();
        let cascade = resolution_cascade(&cfg, true);
        assert_eq!(
            resolve_relation(&cascade, RelationHint::RelatesTo, "voisin", true),
            RelationType::Implements
        );
        assert_eq!(
            resolve_relation(&cascade, RelationHint::RelatesTo, "une tension", true),
            RelationType::Contradicts
        );
        assert_eq!(cascade.rule_names().last(), Some(&"fallback"));
    }

    #[test]
    fn analyze_counts_links_and_drops_unresolvable_targets() {
        let cfg = GraphConfig::default();
        let mut a = Item::new("a", Category::Technique);
        a.related = vec!["b".into(), "ghost".into(), "a".into()];
        let b = Item::new("b", Category::Ethique);
        let batch = vec![record(
            "a",
            None,
            vec![
                suggestion("b", RelationHint::BuildsOn, 0.7, "extends"),
                suggestion("batch_only", RelationHint::RelatesTo, 0.6, "tension"),
                suggestion("nowhere", RelationHint::SimilarTo, 0.5, ""),
            ],
        ), record("batch_only", Some(Category::Philosophie), vec![])];

        let p = analyze(&[a, b], &batch, &cfg);
        assert_eq!(p.hard_links.total, 3);
        assert_eq!(p.hard_links.valid, 1);
        assert_eq!(p.hard_links.dangling, 1);
        assert_eq!(p.hard_links.self_links, 1);
        assert_eq!(p.hard_links.by_category[&Category::Technique], 1);

        assert_eq!(p.suggestions.total, 3);
        assert_eq!(p.suggestions.unresolvable, 1);
        assert_eq!(p.suggestions.resolved_from_hint, 1);
        assert_eq!(p.suggestions.by_type[&RelationType::Contradicts].count, 1);
        assert_eq!(p.prediction_rules.len(), 5);
    }

    #[test]
    fn pair_thresholds_need_two_observations_and_respect_floor() {
        let cfg = GraphConfig::default();
        let items = vec![
            Item::new("t1", Category::Technique),
            Item::new("t2", Category::Technique),
            Item::new("e1", Category::Ethique),
        ];
        let batch = vec![record(
            "t1",
            None,
            vec![
                suggestion("t2", RelationHint::SimilarTo, 0.2, ""),
                suggestion("t2", RelationHint::SimilarTo, 0.25, ""),
                suggestion("e1", RelationHint::Implements, 0.9, ""),
            ],
        )];
        let p = analyze(&items, &batch, &cfg);
        let intra = CategoryPair::new(Category::Technique, Category::Technique);
        let bridge = CategoryPair::new(Category::Technique, Category::Ethique);
        assert_eq!(p.category_thresholds[&intra].threshold, 0.3);
        assert_eq!(p.category_thresholds[&intra].observations, 2);
        assert!(!p.category_thresholds.contains_key(&bridge));
    }

    #[test]
    fn percentile_sits_in_the_lower_quarter() {
        let cfg = GraphConfig::default();
        let items = vec![
            Item::new("t1", Category::Technique),
            Item::new("e1", Category::Ethique),
        ];
        let strengths = [0.6, 0.7, 0.8, 0.9];
        let batch = vec![record(
            "t1",
            None,
            strengths
                .iter()
                .map(|s| suggestion("e1", RelationHint::Implements, *s, ""))
                .collect(),
        )];
        let p = analyze(&items, &batch, &cfg);
        let t = p.category_thresholds[&CategoryPair::new(Category::Technique, Category::Ethique)]
            .threshold;
        assert!((0.6..=0.7).contains(&t), "threshold {t}");
    }

    #[test]
    fn mines_frequent_long_words_only() {
        let cfg = GraphConfig::default();
        let items = vec![
            Item::new("a", Category::Technique),
            Item::new("b", Category::Technique),
        ];
        let batch = vec![record(
            "a",
            None,
            vec![
                suggestion("b", RelationHint::SimilarTo, 0.5, "robotique et robotique avec les"),
                suggestion("b", RelationHint::SimilarTo, 0.5, "robotique sur les capteurs"),
            ],
        )];
        let p = analyze(&items, &batch, &cfg);
        let words = p.keywords(RelationType::SimilarTo);
        assert_eq!(words, vec!["robotique"]);
        assert_eq!(p.suggestions.by_type[&RelationType::SimilarTo].keywords[0].count, 3);
    }

    #[test]
    fn type_shares_sum_to_one() {
        let cfg = GraphConfig::default();
        let items = vec![Item::new("a", Category::Technique), Item::new("b", Category::Ethique)];
        let batch = vec![record(
            "a",
            None,
            vec![
                suggestion("b", RelationHint::Implements, 0.5, ""),
                suggestion("b", RelationHint::Questions, 0.5, ""),
                suggestion("b", RelationHint::Questions, 0.5, ""),
            ],
        )];
        let shares = analyze(&items, &batch, &cfg).type_shares();
        let total: f64 = shares.values().sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert!((shares[&RelationType::Questions] - 2.0 / 3.0).abs() < 1e-12);
    }
}
