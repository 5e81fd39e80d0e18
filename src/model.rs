//! Items, suggestion records and synthesized edges.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::validation::Verdict;

// =============================================================================
// Categories and levels
// =============================================================================

/// Primary editorial category of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Technique,
    Recherche,
    Pedagogie,
    Ethique,
    Philosophie,
    Societe,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Self::Technique,
        Self::Recherche,
        Self::Pedagogie,
        Self::Ethique,
        Self::Philosophie,
        Self::Societe,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Technique => "technique",
            Self::Recherche => "recherche",
            Self::Pedagogie => "pedagogie",
            Self::Ethique => "ethique",
            Self::Philosophie => "philosophie",
            Self::Societe => "societe",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown category: {s}"))
    }
}

/// Unordered pair of categories, stored low-high.
///
/// Serialized as `"low-high"` so it can key JSON maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CategoryPair {
    low: Category,
    high: Category,
}

impl CategoryPair {
    pub fn new(a: Category, b: Category) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    pub fn low(self) -> Category {
        self.low
    }

    pub fn high(self) -> Category {
        self.high
    }

    /// Same category on both sides.
    pub fn is_intra(self) -> bool {
        self.low == self.high
    }
}

impl fmt::Display for CategoryPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.low, self.high)
    }
}

impl FromStr for CategoryPair {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (a, b) = s
            .split_once('-')
            .ok_or_else(|| format!("category pair must look like `a-b`: {s}"))?;
        Ok(Self::new(a.parse()?, b.parse()?))
    }
}

impl Serialize for CategoryPair {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CategoryPair {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Ordered complexity level: beginner < intermediate < advanced.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
}

impl Complexity {
    pub fn rank(self) -> u8 {
        match self {
            Self::Beginner => 0,
            Self::Intermediate => 1,
            Self::Advanced => 2,
        }
    }

    /// Number of levels between two items.
    pub fn gap(self, other: Complexity) -> u8 {
        self.rank().abs_diff(other.rank())
    }
}

// =============================================================================
// Items
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub name: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    /// 0 (consensual) to 3 (highly contested).
    #[serde(default)]
    pub controversy: u8,
}

/// A curated content record. Read-only for the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub summary: String,
    pub category: Category,
    #[serde(default)]
    pub secondary_categories: Vec<Category>,
    #[serde(default)]
    pub concepts: Vec<Concept>,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub complexity: Complexity,
    #[serde(default)]
    pub interest: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f64>>,
    /// Derived from the edge set; never trusted as input.
    #[serde(default)]
    pub centrality: f64,
    /// Curator-asserted related item ids.
    #[serde(default)]
    pub related: Vec<String>,
}

impl Item {
    pub fn new(id: impl Into<String>, category: Category) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            summary: String::new(),
            category,
            secondary_categories: Vec::new(),
            concepts: Vec::new(),
            tools: Vec::new(),
            author: None,
            complexity: Complexity::default(),
            interest: 0.0,
            embedding: None,
            centrality: 0.0,
            related: Vec::new(),
        }
    }

    /// Highest controversy level among the item's concepts (0 without concepts).
    pub fn max_controversy(&self) -> u8 {
        self.concepts
            .iter()
            .map(|c| c.controversy)
            .max()
            .unwrap_or(0)
    }

    pub fn embedding(&self) -> Option<&[f64]> {
        self.embedding.as_deref().filter(|v| !v.is_empty())
    }
}

/// Id lookup over the live item set.
pub struct ItemIndex<'a> {
    by_id: HashMap<&'a str, &'a Item>,
}

impl<'a> ItemIndex<'a> {
    pub fn new(items: &'a [Item]) -> Self {
        Self {
            by_id: items.iter().map(|item| (item.id.as_str(), item)).collect(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&'a Item> {
        self.by_id.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Both endpoints of an edge, if both exist.
    pub fn endpoints(&self, edge: &Edge) -> Option<(&'a Item, &'a Item)> {
        Some((self.get(&edge.source)?, self.get(&edge.target)?))
    }
}

// =============================================================================
// Suggestions
// =============================================================================

/// Relation type named by a suggestion. `relates_to` must be resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationHint {
    #[default]
    RelatesTo,
    BuildsOn,
    Contradicts,
    Implements,
    Questions,
    SimilarTo,
}

impl RelationHint {
    /// The concrete relation type, or `None` when the hint is open.
    pub fn explicit(self) -> Option<RelationType> {
        match self {
            Self::RelatesTo => None,
            Self::BuildsOn => Some(RelationType::BuildsOn),
            Self::Contradicts => Some(RelationType::Contradicts),
            Self::Implements => Some(RelationType::Implements),
            Self::Questions => Some(RelationType::Questions),
            Self::SimilarTo => Some(RelationType::SimilarTo),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedEdge {
    pub target: String,
    #[serde(default, rename = "type")]
    pub relation: RelationHint,
    pub strength: f64,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
}

fn default_confidence() -> f64 {
    0.5
}

/// Suggestions attached to one source item.
///
/// The record may describe an item that is absent from the live item set, so
/// it carries its own category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionRecord {
    pub item_id: String,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub suggestions: Vec<SuggestedEdge>,
}

// =============================================================================
// Edges
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    BuildsOn,
    Contradicts,
    Implements,
    Questions,
    SimilarTo,
}

impl RelationType {
    pub const ALL: [RelationType; 5] = [
        Self::BuildsOn,
        Self::Contradicts,
        Self::Implements,
        Self::Questions,
        Self::SimilarTo,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::BuildsOn => "builds_on",
            Self::Contradicts => "contradicts",
            Self::Implements => "implements",
            Self::Questions => "questions",
            Self::SimilarTo => "similar_to",
        }
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an edge came from. Declaration order is merge priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Curated,
    Suggested,
    Inferred,
}

impl Provenance {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Curated => "curated",
            Self::Suggested => "suggested",
            Self::Inferred => "inferred",
        }
    }

    /// Curated and suggested edges are the ground truth.
    pub fn is_ground_truth(self) -> bool {
        !matches!(self, Self::Inferred)
    }
}

/// Clamp into [0, 1]; NaN becomes 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub relation: RelationType,
    pub strength: f64,
    pub provenance: Provenance,
    pub inferred: bool,
    #[serde(default)]
    pub reasoning: String,
}

impl Edge {
    /// Builds an edge, clamping strength into [0, 1].
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        relation: RelationType,
        strength: f64,
        provenance: Provenance,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            relation,
            strength: clamp_unit(strength),
            provenance,
            inferred: provenance == Provenance::Inferred,
            reasoning: reasoning.into(),
        }
    }

    pub fn pair_key(&self) -> PairKey {
        PairKey::new(&self.source, &self.target)
    }

    pub fn touches(&self, id: &str) -> bool {
        self.source == id || self.target == id
    }
}

/// Deduplication key: the sorted pair of item ids.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PairKey {
    low: String,
    high: String,
}

impl PairKey {
    pub fn new(a: &str, b: &str) -> Self {
        if a <= b {
            Self {
                low: a.to_string(),
                high: b.to_string(),
            }
        } else {
            Self {
                low: b.to_string(),
                high: a.to_string(),
            }
        }
    }

    pub fn low(&self) -> &str {
        &self.low
    }

    pub fn high(&self) -> &str {
        &self.high
    }
}

/// Maximum number of unordered pairs over `n` items.
pub fn max_pairs(n: usize) -> usize {
    n.saturating_mul(n.saturating_sub(1)) / 2
}

/// Edge count over the maximum pair count (0 for fewer than two items).
pub fn density(edge_count: usize, item_count: usize) -> f64 {
    let pairs = max_pairs(item_count);
    if pairs == 0 {
        0.0
    } else {
        edge_count as f64 / pairs as f64
    }
}

// =============================================================================
// Output collection
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionMetadata {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub total_edges: usize,
    pub item_count: usize,
    pub by_provenance: BTreeMap<Provenance, usize>,
    pub by_type: BTreeMap<RelationType, usize>,
    pub density: f64,
    #[serde(default)]
    pub validation_score: Option<f64>,
    #[serde(default)]
    pub verdict: Option<Verdict>,
}

/// The pipeline's durable output: a full replacement of the stored edge set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeCollection {
    pub metadata: CollectionMetadata,
    pub edges: Vec<Edge>,
    /// Normalized centrality per item, derived from `edges`.
    #[serde(default)]
    pub centrality: BTreeMap<String, f64>,
}

impl EdgeCollection {
    pub fn new(item_count: usize, edges: Vec<Edge>, centrality: BTreeMap<String, f64>) -> Self {
        let mut by_provenance = BTreeMap::new();
        let mut by_type = BTreeMap::new();
        for edge in &edges {
            *by_provenance.entry(edge.provenance).or_insert(0) += 1;
            *by_type.entry(edge.relation).or_insert(0) += 1;
        }
        let metadata = CollectionMetadata {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            total_edges: edges.len(),
            item_count,
            by_provenance,
            by_type,
            density: density(edges.len(), item_count),
            validation_score: None,
            verdict: None,
        };
        Self {
            metadata,
            edges,
            centrality,
        }
    }
}
