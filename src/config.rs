//! Immutable pipeline configuration.
//!
//! Every hand-authored constant (baseline thresholds, keyword seeds, type
//! profiles, budgets) lives here and is passed into each stage, so a run can be
//! reproduced or varied by swapping the config.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::model::{Category, CategoryPair, RelationType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub categories: CategoryGroups,
    pub thresholds: ThresholdConfig,
    pub resolution: ResolutionConfig,
    pub indicators: IndicatorSeeds,
    pub keywords: KeywordMining,
    pub types: BTreeMap<RelationType, TypeProfile>,
    pub curated: CuratedConfig,
    pub inference: InferenceConfig,
    pub refine: RefineConfig,
    pub readability: ReadabilityConfig,
    pub validation: ValidationConfig,
    /// Seed for every sampled step (refiner sample, validator sample).
    pub seed: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            categories: CategoryGroups::default(),
            thresholds: ThresholdConfig::default(),
            resolution: ResolutionConfig::default(),
            indicators: IndicatorSeeds::default(),
            keywords: KeywordMining::default(),
            types: default_type_profiles(),
            curated: CuratedConfig::default(),
            inference: InferenceConfig::default(),
            refine: RefineConfig::default(),
            readability: ReadabilityConfig::default(),
            validation: ValidationConfig::default(),
            seed: 1337,
        }
    }
}

// -----------------------------------------------------------------------------
// Category groups
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryGroups {
    pub technical: Vec<Category>,
    pub conceptual: Vec<Category>,
}

impl Default for CategoryGroups {
    fn default() -> Self {
        Self {
            technical: vec![Category::Technique, Category::Recherche],
            conceptual: vec![Category::Ethique, Category::Philosophie, Category::Societe],
        }
    }
}

impl CategoryGroups {
    /// One side technical, the other conceptual.
    pub fn is_domain_bridge(&self, a: Category, b: Category) -> bool {
        (self.technical.contains(&a) && self.conceptual.contains(&b))
            || (self.technical.contains(&b) && self.conceptual.contains(&a))
    }
}

// -----------------------------------------------------------------------------
// Pair thresholds
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Hand-authored similarity thresholds. Intra-category pairs are stricter
    /// than cross-category bridges.
    pub baselines: BTreeMap<CategoryPair, f64>,
    /// Used when a pair has neither a baseline nor a calibrated value.
    pub default_pair_threshold: f64,
    /// Weight of the baseline in the blend; ground truth gets the rest.
    pub baseline_weight: f64,
    pub min_pair_threshold: f64,
    pub max_pair_threshold: f64,
    /// Percentile of observed suggestion strengths used per category pair.
    pub ground_truth_percentile: usize,
    pub ground_truth_floor: f64,
    pub min_pair_observations: usize,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            baselines: default_baselines(),
            default_pair_threshold: 0.35,
            baseline_weight: 0.7,
            min_pair_threshold: 0.25,
            max_pair_threshold: 0.55,
            ground_truth_percentile: 25,
            ground_truth_floor: 0.3,
            min_pair_observations: 2,
        }
    }
}

fn default_baselines() -> BTreeMap<CategoryPair, f64> {
    use Category::*;
    let table = [
        (Technique, Technique, 0.45),
        (Recherche, Recherche, 0.44),
        (Pedagogie, Pedagogie, 0.48),
        (Ethique, Ethique, 0.42),
        (Philosophie, Philosophie, 0.40),
        (Societe, Societe, 0.43),
        (Technique, Recherche, 0.35),
        (Technique, Pedagogie, 0.33),
        (Technique, Ethique, 0.30),
        (Technique, Philosophie, 0.32),
        (Technique, Societe, 0.30),
        (Recherche, Pedagogie, 0.34),
        (Recherche, Ethique, 0.29),
        (Recherche, Philosophie, 0.28),
        (Recherche, Societe, 0.31),
        (Pedagogie, Ethique, 0.33),
        (Pedagogie, Philosophie, 0.34),
        (Pedagogie, Societe, 0.32),
        (Ethique, Philosophie, 0.35),
        (Ethique, Societe, 0.33),
        (Philosophie, Societe, 0.34),
    ];
    table
        .into_iter()
        .map(|(a, b, t)| (CategoryPair::new(a, b), t))
        .collect()
}

// -----------------------------------------------------------------------------
// Keyword lists
// -----------------------------------------------------------------------------

/// One keyword family of the `relates_to` resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordFamily {
    pub name: String,
    pub relation: RelationType,
    pub keywords: Vec<String>,
}

/// Families are checked in order; the first family with a hit wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionConfig {
    pub families: Vec<KeywordFamily>,
    pub fallback: RelationType,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            families: vec![
                family(
                    "citation",
                    RelationType::BuildsOn,
                    &[
                        "cite", "citation", "appui", "appuie", "fonde", "based on", "builds on",
                        "extends", "prolonge", "reference",
                    ],
                ),
                family(
                    "tension",
                    RelationType::Contradicts,
                    &[
                        "tension", "conflit", "conflict", "contradict", "contredit", "oppose",
                        "desaccord", "disagree",
                    ],
                ),
                family(
                    "application",
                    RelationType::Implements,
                    &[
                        "application", "applique", "implement", "mise en oeuvre",
                        "technical bridge", "pont technique", "concret", "practical",
                    ],
                ),
                family(
                    "questioning",
                    RelationType::Questions,
                    &[
                        "question", "interroge", "remet en cause", "doute", "challenge",
                        "critique", "why",
                    ],
                ),
            ],
            fallback: RelationType::SimilarTo,
        }
    }
}

fn family(name: &str, relation: RelationType, keywords: &[&str]) -> KeywordFamily {
    KeywordFamily {
        name: name.to_string(),
        relation,
        keywords: strings(keywords),
    }
}

fn strings(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

/// Editorial seed lists for the five indicator families.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorSeeds {
    pub conflict: Vec<String>,
    pub citation: Vec<String>,
    pub bridge: Vec<String>,
    pub questioning: Vec<String>,
    pub similarity: Vec<String>,
    pub negation: Vec<String>,
    /// Mined ground-truth keywords merged into each seed list.
    pub mined_per_family: usize,
}

impl Default for IndicatorSeeds {
    fn default() -> Self {
        Self {
            conflict: strings(&[
                "tension", "conflit", "conflict", "contradiction", "oppose", "risque", "danger",
                "debat", "controverse", "against",
            ]),
            citation: strings(&[
                "cite", "appui", "fonde", "reference", "based", "source", "extends", "prolonge",
            ]),
            bridge: strings(&[
                "application", "implementation", "outil", "pratique", "technique", "concret",
                "deploiement", "practical",
            ]),
            questioning: strings(&[
                "question", "interroge", "doute", "limite", "challenge", "critique", "pourquoi",
                "why",
            ]),
            similarity: strings(&[
                "similaire", "similar", "proche", "comparable", "analogue", "related", "meme",
            ]),
            negation: strings(&[
                "not", "no", "never", "without", "ne", "pas", "sans", "contre", "jamais", "non",
            ]),
            mined_per_family: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordMining {
    /// Words must be strictly longer than this.
    pub min_word_len: usize,
    pub min_occurrences: usize,
    pub max_per_type: usize,
    pub stopwords: Vec<String>,
}

impl Default for KeywordMining {
    fn default() -> Self {
        Self {
            min_word_len: 3,
            min_occurrences: 2,
            max_per_type: 10,
            stopwords: strings(&[
                "dans", "pour", "avec", "sont", "plus", "cette", "leur", "entre", "comme", "mais",
                "this", "that", "with", "from", "which", "have", "their", "also", "more", "very",
                "tres", "aussi", "deux", "both", "item", "items",
            ]),
        }
    }
}

// -----------------------------------------------------------------------------
// Relation type profiles
// -----------------------------------------------------------------------------

/// Pair condition under which a type's boost applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoostCondition {
    ComplexityGap,
    ControversyGap,
    DomainBridge,
    CrossCategory,
    SharedTools,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Boost {
    pub amount: f64,
    pub condition: BoostCondition,
}

/// Inclusive strength band for one relation type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrengthBand {
    pub min: f64,
    pub max: f64,
}

impl StrengthBand {
    pub fn clamp(self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TypeProfile {
    pub multiplier: f64,
    /// Editorial floor for the calibrated minimum strength.
    pub floor: f64,
    /// Share of the observed ground-truth mean used as minimum strength.
    pub ground_truth_factor: f64,
    #[serde(default)]
    pub boost: Option<Boost>,
    pub band: StrengthBand,
}

fn default_type_profiles() -> BTreeMap<RelationType, TypeProfile> {
    let profile = |multiplier, floor, factor, boost: Option<(f64, BoostCondition)>, min, max| {
        TypeProfile {
            multiplier,
            floor,
            ground_truth_factor: factor,
            boost: boost.map(|(amount, condition)| Boost { amount, condition }),
            band: StrengthBand { min, max },
        }
    };
    BTreeMap::from([
        (
            RelationType::BuildsOn,
            profile(1.0, 0.35, 0.8, Some((0.05, BoostCondition::ComplexityGap)), 0.0, 0.95),
        ),
        (
            RelationType::Contradicts,
            profile(0.9, 0.3, 0.75, Some((0.05, BoostCondition::ControversyGap)), 0.0, 0.8),
        ),
        (
            RelationType::Implements,
            profile(1.05, 0.3, 0.8, Some((0.1, BoostCondition::DomainBridge)), 0.0, 0.9),
        ),
        (
            RelationType::Questions,
            profile(0.95, 0.3, 0.75, None, 0.0, 0.85),
        ),
        (
            RelationType::SimilarTo,
            profile(0.9, 0.2, 0.75, Some((0.05, BoostCondition::CrossCategory)), 0.1, 0.85),
        ),
    ])
}

// -----------------------------------------------------------------------------
// Stage settings
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CuratedConfig {
    pub relation: RelationType,
    pub strength: f64,
}

impl Default for CuratedConfig {
    fn default() -> Self {
        Self {
            relation: RelationType::BuildsOn,
            strength: 0.9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub max_new_connections_per_item: usize,
    pub target_precision: f64,
    pub target_recall: f64,
    /// Controversy difference that marks a contradiction.
    pub contradiction_gap: u8,
    /// Type split used when no suggestion types were observed.
    pub fallback_diversity: BTreeMap<RelationType, f64>,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            max_new_connections_per_item: 5,
            target_precision: 0.8,
            target_recall: 0.7,
            contradiction_gap: 2,
            fallback_diversity: BTreeMap::from([
                (RelationType::BuildsOn, 0.25),
                (RelationType::Contradicts, 0.15),
                (RelationType::Implements, 0.2),
                (RelationType::Questions, 0.15),
                (RelationType::SimilarTo, 0.25),
            ]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefineConfig {
    pub threshold_floor: f64,
    pub threshold_factor: f64,
    pub min_observations: usize,
    pub fallback_threshold: f64,
    pub bridge_relation: RelationType,
    pub bridge_bonus: f64,
    pub bridge_cap: f64,
    pub contradiction_band_low: f64,
    pub contradiction_band_high: f64,
    pub contradiction_cap: f64,
    /// Lexical strength contributed by each opposition or negation hit.
    pub lexical_hit_weight: f64,
    pub min_lexical_strength: f64,
    pub min_concept_overlap: usize,
    /// Uncovered pairs examined per run.
    pub sample_size: usize,
    pub max_new_per_item: usize,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            threshold_floor: 0.15,
            threshold_factor: 0.85,
            min_observations: 2,
            fallback_threshold: 0.18,
            bridge_relation: RelationType::Questions,
            bridge_bonus: 0.1,
            bridge_cap: 0.9,
            contradiction_band_low: 0.25,
            contradiction_band_high: 0.65,
            contradiction_cap: 0.8,
            lexical_hit_weight: 0.15,
            min_lexical_strength: 0.3,
            min_concept_overlap: 1,
            sample_size: 5_000,
            max_new_per_item: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadabilityConfig {
    pub target_density: f64,
    pub high_strength: f64,
    pub medium_strength: f64,
    /// Fraction of items, by incident-edge count, considered central.
    pub central_fraction: f64,
    /// Share of the leftover budget given to medium-strength central edges.
    pub medium_central_share: f64,
    pub max_density: f64,
    pub max_avg_degree: f64,
}

impl Default for ReadabilityConfig {
    fn default() -> Self {
        Self {
            target_density: 0.08,
            high_strength: 0.7,
            medium_strength: 0.5,
            central_fraction: 0.3,
            medium_central_share: 0.6,
            max_density: 0.15,
            max_avg_degree: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationWeights {
    pub curated_coverage: f64,
    pub suggestion_coverage: f64,
    pub inferred_quality: f64,
    pub diversity: f64,
    pub bridge_coverage: f64,
    pub connectivity: f64,
    pub f1: f64,
}

impl Default for ValidationWeights {
    fn default() -> Self {
        Self {
            curated_coverage: 0.20,
            suggestion_coverage: 0.15,
            inferred_quality: 0.15,
            diversity: 0.10,
            bridge_coverage: 0.10,
            connectivity: 0.10,
            f1: 0.20,
        }
    }
}

impl ValidationWeights {
    pub fn total(&self) -> f64 {
        self.curated_coverage
            + self.suggestion_coverage
            + self.inferred_quality
            + self.diversity
            + self.bridge_coverage
            + self.connectivity
            + self.f1
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub sample_size: usize,
    pub pass_score: f64,
    pub even_share: f64,
    pub weights: ValidationWeights,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            sample_size: 50,
            pass_score: 70.0,
            even_share: 0.2,
            weights: ValidationWeights::default(),
        }
    }
}

// -----------------------------------------------------------------------------
// Loading and validation
// -----------------------------------------------------------------------------

impl GraphConfig {
    /// Load a JSON config; missing fields keep their defaults.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| PipelineError::read(path, e))?;
        let config: GraphConfig =
            serde_json::from_str(&raw).map_err(|e| PipelineError::parse(path, e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn profile(&self, relation: RelationType) -> Option<&TypeProfile> {
        self.types.get(&relation)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        let t = &self.thresholds;
        if !(0.0..=1.0).contains(&t.min_pair_threshold)
            || !(0.0..=1.0).contains(&t.max_pair_threshold)
            || t.min_pair_threshold > t.max_pair_threshold
        {
            return Err(config_err("pair threshold range must satisfy 0 <= min <= max <= 1"));
        }
        check_unit("thresholds.baseline_weight", t.baseline_weight)?;
        check_unit("thresholds.default_pair_threshold", t.default_pair_threshold)?;
        check_unit("thresholds.ground_truth_floor", t.ground_truth_floor)?;
        if t.ground_truth_percentile > 100 {
            return Err(config_err("thresholds.ground_truth_percentile must be <= 100"));
        }
        for (pair, value) in &t.baselines {
            check_unit(&format!("thresholds.baselines[{pair}]"), *value)?;
        }

        for relation in RelationType::ALL {
            let Some(profile) = self.types.get(&relation) else {
                return Err(config_err(&format!("types is missing a profile for {relation}")));
            };
            if profile.multiplier < 0.0 || !profile.multiplier.is_finite() {
                return Err(config_err(&format!("types[{relation}].multiplier must be >= 0")));
            }
            check_unit(&format!("types[{relation}].floor"), profile.floor)?;
            check_unit(
                &format!("types[{relation}].ground_truth_factor"),
                profile.ground_truth_factor,
            )?;
            let band = profile.band;
            if !(0.0..=1.0).contains(&band.min) || !(0.0..=1.0).contains(&band.max) || band.min > band.max
            {
                return Err(config_err(&format!("types[{relation}].band must lie within [0,1]")));
            }
            if let Some(boost) = profile.boost {
                check_unit(&format!("types[{relation}].boost.amount"), boost.amount)?;
            }
        }

        if self.resolution.families.is_empty() {
            return Err(config_err("resolution.families must not be empty"));
        }
        check_unit("curated.strength", self.curated.strength)?;
        check_unit("inference.target_precision", self.inference.target_precision)?;
        check_unit("inference.target_recall", self.inference.target_recall)?;

        let r = &self.refine;
        check_unit("refine.threshold_floor", r.threshold_floor)?;
        check_unit("refine.fallback_threshold", r.fallback_threshold)?;
        check_unit("refine.bridge_cap", r.bridge_cap)?;
        check_unit("refine.contradiction_cap", r.contradiction_cap)?;
        if r.contradiction_band_low > r.contradiction_band_high {
            return Err(config_err("refine contradiction band must satisfy low <= high"));
        }

        let d = &self.readability;
        if !(d.target_density > 0.0 && d.target_density <= 1.0) {
            return Err(config_err("readability.target_density must be in (0,1]"));
        }
        check_unit("readability.central_fraction", d.central_fraction)?;
        check_unit("readability.medium_central_share", d.medium_central_share)?;
        if d.medium_strength > d.high_strength {
            return Err(config_err("readability.medium_strength must not exceed high_strength"));
        }

        if self.validation.weights.total() <= 0.0 {
            return Err(config_err("validation.weights must sum to a positive value"));
        }
        Ok(())
    }
}

fn check_unit(name: &str, value: f64) -> Result<(), PipelineError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(config_err(&format!("{name} must be in [0,1], got {value}")))
    }
}

fn config_err(message: &str) -> PipelineError {
    PipelineError::Config(message.to_string())
}
