//! Threshold calibration.
//!
//! Turns [`GroundTruthPatterns`] into the parameters the synthesizer and the
//! refiner run with. Calibration is a pure function of the patterns and the
//! config, so regenerating it from a fresh analysis gives the same result as
//! loading a persisted one.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{Boost, GraphConfig, StrengthBand};
use crate::ground_truth::GroundTruthPatterns;
use crate::model::{Category, CategoryPair, RelationType};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TypeAdjustment {
    pub base_multiplier: f64,
    /// Strength an edge of this type should reach to count as coherent.
    pub min_threshold: f64,
    #[serde(default)]
    pub boost: Option<Boost>,
    pub band: StrengthBand,
}

/// Seed keyword lists merged with keywords mined from suggestion reasoning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeywordIndicators {
    pub conflict: Vec<String>,
    pub citation: Vec<String>,
    pub bridge: Vec<String>,
    pub questioning: Vec<String>,
    pub similarity: Vec<String>,
    pub negation: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiversitySource {
    Observed,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    pub target_precision: f64,
    pub target_recall: f64,
    pub max_new_connections_per_item: usize,
    pub diversity_targets: BTreeMap<RelationType, f64>,
    pub diversity_source: DiversitySource,
}

/// Internal consistency checks on the calibration itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationValidation {
    pub calibrated_pairs: usize,
    pub ground_truth_pairs: usize,
    pub thresholds_in_range: bool,
    pub mean_intra_threshold: f64,
    pub mean_inter_threshold: f64,
    /// Intra-category pairs stay stricter than bridges on average.
    pub asymmetry_preserved: bool,
    pub diversity_sum: f64,
    pub all_types_adjusted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticCalibration {
    pub category_thresholds: BTreeMap<CategoryPair, f64>,
    pub default_threshold: f64,
    pub type_adjustments: BTreeMap<RelationType, TypeAdjustment>,
    pub indicators: KeywordIndicators,
    pub config: CalibrationConfig,
    pub validation: CalibrationValidation,
}

impl SemanticCalibration {
    /// Similarity threshold for a pair of categories, or the default when the
    /// pair is uncalibrated.
    pub fn pair_threshold(&self, a: Category, b: Category) -> f64 {
        self.category_thresholds
            .get(&CategoryPair::new(a, b))
            .copied()
            .unwrap_or(self.default_threshold)
    }

    pub fn adjustment(&self, relation: RelationType) -> Option<&TypeAdjustment> {
        self.type_adjustments.get(&relation)
    }
}

pub fn calibrate(patterns: &GroundTruthPatterns, cfg: &GraphConfig) -> SemanticCalibration {
    let t = &cfg.thresholds;
    let clamp = |v: f64| v.clamp(t.min_pair_threshold, t.max_pair_threshold);

    let mut category_thresholds: BTreeMap<CategoryPair, f64> = t
        .baselines
        .iter()
        .map(|(pair, baseline)| {
            let value = match patterns.category_thresholds.get(pair) {
                Some(gt) => blend(*baseline, gt.threshold, t.baseline_weight),
                None => *baseline,
            };
            (*pair, clamp(value))
        })
        .collect();
    // Ground truth for a pair without a baseline blends against the default.
    for (pair, gt) in &patterns.category_thresholds {
        category_thresholds.entry(*pair).or_insert_with(|| {
            clamp(blend(t.default_pair_threshold, gt.threshold, t.baseline_weight))
        });
    }

    let type_adjustments: BTreeMap<RelationType, TypeAdjustment> = cfg
        .types
        .iter()
        .map(|(relation, profile)| {
            let observed = patterns
                .avg_strength(*relation)
                .map(|avg| profile.ground_truth_factor * avg)
                .unwrap_or(0.0);
            (
                *relation,
                TypeAdjustment {
                    base_multiplier: profile.multiplier,
                    min_threshold: profile.floor.max(observed),
                    boost: profile.boost,
                    band: profile.band,
                },
            )
        })
        .collect();

    let seeds = &cfg.indicators;
    let mined = |relation: RelationType| merge_keywords(&[], &patterns.keywords(relation), seeds.mined_per_family);
    let indicators = KeywordIndicators {
        conflict: merge_keywords(&seeds.conflict, &mined(RelationType::Contradicts), usize::MAX),
        citation: merge_keywords(&seeds.citation, &mined(RelationType::BuildsOn), usize::MAX),
        bridge: merge_keywords(&seeds.bridge, &mined(RelationType::Implements), usize::MAX),
        questioning: merge_keywords(&seeds.questioning, &mined(RelationType::Questions), usize::MAX),
        similarity: merge_keywords(&seeds.similarity, &mined(RelationType::SimilarTo), usize::MAX),
        negation: seeds.negation.clone(),
    };

    let observed_shares = patterns.type_shares();
    let (diversity_targets, diversity_source) = if observed_shares.is_empty() {
        (cfg.inference.fallback_diversity.clone(), DiversitySource::Fallback)
    } else {
        let targets = RelationType::ALL
            .into_iter()
            .map(|r| (r, observed_shares.get(&r).copied().unwrap_or(0.0)))
            .collect();
        (targets, DiversitySource::Observed)
    };

    let validation = self_check(
        &category_thresholds,
        &type_adjustments,
        &diversity_targets,
        patterns.category_thresholds.len(),
        cfg,
    );

    info!(
        calibrated_pairs = validation.calibrated_pairs,
        ground_truth_pairs = validation.ground_truth_pairs,
        mean_intra = validation.mean_intra_threshold,
        mean_inter = validation.mean_inter_threshold,
        diversity = ?diversity_source,
        "thresholds calibrated"
    );

    SemanticCalibration {
        category_thresholds,
        default_threshold: t.default_pair_threshold,
        type_adjustments,
        indicators,
        config: CalibrationConfig {
            target_precision: cfg.inference.target_precision,
            target_recall: cfg.inference.target_recall,
            max_new_connections_per_item: cfg.inference.max_new_connections_per_item,
            diversity_targets,
            diversity_source,
        },
        validation,
    }
}

fn blend(baseline: f64, observed: f64, baseline_weight: f64) -> f64 {
    baseline_weight * baseline + (1.0 - baseline_weight) * observed
}

/// Seeds first, then up to `limit` extra words not already present.
fn merge_keywords<S: AsRef<str>>(seeds: &[String], extra: &[S], limit: usize) -> Vec<String> {
    let mut merged: Vec<String> = seeds.to_vec();
    let mut added = 0;
    for word in extra {
        if added >= limit {
            break;
        }
        let word = word.as_ref();
        if !merged.iter().any(|w| w == word) {
            merged.push(word.to_string());
            added += 1;
        }
    }
    merged
}

fn self_check(
    thresholds: &BTreeMap<CategoryPair, f64>,
    adjustments: &BTreeMap<RelationType, TypeAdjustment>,
    diversity: &BTreeMap<RelationType, f64>,
    ground_truth_pairs: usize,
    cfg: &GraphConfig,
) -> CalibrationValidation {
    let t = &cfg.thresholds;
    let mean = |intra: bool| {
        let values: Vec<f64> = thresholds
            .iter()
            .filter(|(pair, _)| pair.is_intra() == intra)
            .map(|(_, v)| *v)
            .collect();
        if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        }
    };
    let mean_intra = mean(true);
    let mean_inter = mean(false);
    CalibrationValidation {
        calibrated_pairs: thresholds.len(),
        ground_truth_pairs,
        thresholds_in_range: thresholds
            .values()
            .all(|v| (t.min_pair_threshold..=t.max_pair_threshold).contains(v)),
        mean_intra_threshold: mean_intra,
        mean_inter_threshold: mean_inter,
        asymmetry_preserved: mean_intra > mean_inter,
        diversity_sum: diversity.values().sum(),
        all_types_adjusted: RelationType::ALL
            .iter()
            .all(|r| adjustments.contains_key(r)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ground_truth::{
        KeywordCount, PairObservation, RangeStats, SuggestionStats, TypePattern,
    };

    fn pattern(count: usize, avg: f64, words: &[&str]) -> TypePattern {
        TypePattern {
            count,
            strength: RangeStats { min: avg, max: avg, avg },
            confidence: RangeStats { min: 0.5, max: 0.5, avg: 0.5 },
            keywords: words
                .iter()
                .map(|w| KeywordCount { word: w.to_string(), count: 2 })
                .collect(),
        }
    }

    #[test]
    fn empty_ground_truth_falls_back_to_baselines_and_fallback_split() {
        let cfg = GraphConfig::default();
        let cal = calibrate(&GroundTruthPatterns::default(), &cfg);
        assert_eq!(cal.category_thresholds, cfg.thresholds.baselines);
        assert_eq!(cal.config.diversity_source, DiversitySource::Fallback);
        assert_eq!(cal.config.diversity_targets, cfg.inference.fallback_diversity);
        assert!(cal.validation.asymmetry_preserved);
        assert!(cal.validation.thresholds_in_range);
        assert_eq!(cal.adjustment(RelationType::BuildsOn).unwrap().min_threshold, 0.35);
    }

    #[test]
    fn blends_baseline_with_ground_truth_and_clamps() {
        let cfg = GraphConfig::default();
        let mut patterns = GroundTruthPatterns::default();
        let te = CategoryPair::new(Category::Technique, Category::Ethique);
        let pp = CategoryPair::new(Category::Pedagogie, Category::Pedagogie);
        patterns
            .category_thresholds
            .insert(te, PairObservation { threshold: 0.5, observations: 3 });
        patterns
            .category_thresholds
            .insert(pp, PairObservation { threshold: 1.0, observations: 4 });

        let cal = calibrate(&patterns, &cfg);
        // 0.7 * 0.30 + 0.3 * 0.5
        assert!((cal.category_thresholds[&te] - 0.36).abs() < 1e-12);
        // 0.7 * 0.48 + 0.3 * 1.0 = 0.636 -> clamped
        assert_eq!(cal.category_thresholds[&pp], 0.55);
        for value in cal.category_thresholds.values() {
            assert!((0.25..=0.55).contains(value));
        }
    }

    #[test]
    fn uncalibrated_pairs_use_the_default_threshold() {
        let mut cfg = GraphConfig::default();
        cfg.thresholds.baselines.clear();
        let cal = calibrate(&GroundTruthPatterns::default(), &cfg);
        assert_eq!(cal.pair_threshold(Category::Technique, Category::Societe), 0.35);
    }

    #[test]
    fn min_threshold_never_drops_below_the_floor() {
        let cfg = GraphConfig::default();
        let mut patterns = GroundTruthPatterns::default();
        let mut by_type = BTreeMap::new();
        by_type.insert(RelationType::BuildsOn, pattern(3, 0.9, &[]));
        by_type.insert(RelationType::SimilarTo, pattern(3, 0.1, &[]));
        patterns.suggestions = SuggestionStats { by_type, ..SuggestionStats::default() };

        let cal = calibrate(&patterns, &cfg);
        assert!((cal.adjustment(RelationType::BuildsOn).unwrap().min_threshold - 0.72).abs() < 1e-12);
        assert_eq!(cal.adjustment(RelationType::SimilarTo).unwrap().min_threshold, 0.2);
    }

    #[test]
    fn observed_types_drive_diversity_targets() {
        let cfg = GraphConfig::default();
        let mut patterns = GroundTruthPatterns::default();
        patterns
            .suggestions
            .by_type
            .insert(RelationType::Implements, pattern(3, 0.6, &[]));
        patterns
            .suggestions
            .by_type
            .insert(RelationType::Questions, pattern(1, 0.6, &[]));
        let cal = calibrate(&patterns, &cfg);
        assert_eq!(cal.config.diversity_source, DiversitySource::Observed);
        assert_eq!(cal.config.diversity_targets.len(), 5);
        assert!((cal.config.diversity_targets[&RelationType::Implements] - 0.75).abs() < 1e-12);
        assert_eq!(cal.config.diversity_targets[&RelationType::SimilarTo], 0.0);
        assert!((cal.validation.diversity_sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn indicators_take_at_most_five_new_mined_words() {
        let cfg = GraphConfig::default();
        let mut patterns = GroundTruthPatterns::default();
        patterns.suggestions.by_type.insert(
            RelationType::Contradicts,
            pattern(2, 0.5, &["tension", "rupture", "menace", "refus", "biais", "surveillance", "pouvoir"]),
        );
        let cal = calibrate(&patterns, &cfg);
        let seeds = cfg.indicators.conflict.len();
        // "tension" is already a seed and still uses one of the five mined slots.
        assert_eq!(cal.indicators.conflict.len(), seeds + 4);
        assert!(cal.indicators.conflict.contains(&"biais".to_string()));
        assert!(!cal.indicators.conflict.contains(&"surveillance".to_string()));
        assert_eq!(cal.indicators.negation, cfg.indicators.negation);
    }

    #[test]
    fn calibration_survives_json() {
        let cal = calibrate(&GroundTruthPatterns::default(), &GraphConfig::default());
        let json = serde_json::to_string(&cal).unwrap();
        let back: SemanticCalibration = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cal);
    }
}
