//! Precondition checks on loaded records.
//!
//! Runs once before the first stage. Every violation is collected so a bad
//! input file can be fixed in one pass. Stored edge collections are repaired
//! instead: bad edges are dropped with a warning.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::model::{clamp_unit, Edge, Item, SuggestionRecord};
use crate::synthesis::EdgeSet;

pub const MAX_CONTROVERSY: u8 = 3;

/// Check item and suggestion records; `Err` lists every violation found.
pub fn validate_inputs(items: &[Item], batch: &[SuggestionRecord]) -> Result<(), PipelineError> {
    let mut violations = item_violations(items);
    violations.extend(suggestion_violations(batch));
    if violations.is_empty() {
        debug!(items = items.len(), records = batch.len(), "input records valid");
        Ok(())
    } else {
        Err(PipelineError::InvalidRecords { violations })
    }
}

pub fn item_violations(items: &[Item]) -> Vec<String> {
    let mut violations = Vec::new();
    let mut seen = HashSet::new();
    let mut dimension: Option<(usize, &str)> = None;

    for (pos, item) in items.iter().enumerate() {
        let at = format!("items[{pos}]");
        if item.id.trim().is_empty() {
            violations.push(format!("{at}: id must not be empty"));
        } else if !seen.insert(item.id.as_str()) {
            violations.push(format!("{at}: duplicate id `{}`", item.id));
        }
        for concept in &item.concepts {
            if concept.controversy > MAX_CONTROVERSY {
                violations.push(format!(
                    "{at}: concept `{}` controversy {} exceeds {MAX_CONTROVERSY}",
                    concept.name, concept.controversy
                ));
            }
        }
        if !item.interest.is_finite() {
            violations.push(format!("{at}: interest must be finite"));
        }
        if let Some(vector) = item.embedding() {
            if vector.iter().any(|v| !v.is_finite()) {
                violations.push(format!("{at}: embedding contains non-finite values"));
            }
            match dimension {
                None => dimension = Some((vector.len(), item.id.as_str())),
                Some((dim, first)) if dim != vector.len() => violations.push(format!(
                    "{at}: embedding has {} dimensions, `{first}` has {dim}",
                    vector.len()
                )),
                Some(_) => {}
            }
        }
    }
    violations
}

pub fn suggestion_violations(batch: &[SuggestionRecord]) -> Vec<String> {
    let mut violations = Vec::new();
    for (pos, record) in batch.iter().enumerate() {
        let at = format!("suggestions[{pos}]");
        if record.item_id.trim().is_empty() {
            violations.push(format!("{at}: item_id must not be empty"));
        }
        for (k, s) in record.suggestions.iter().enumerate() {
            let at = format!("{at}.suggestions[{k}]");
            if s.target.trim().is_empty() {
                violations.push(format!("{at}: target must not be empty"));
            }
            if !(0.0..=1.0).contains(&s.strength) {
                violations.push(format!("{at}: strength {} outside [0,1]", s.strength));
            }
            if !(0.0..=1.0).contains(&s.confidence) {
                violations.push(format!("{at}: confidence {} outside [0,1]", s.confidence));
            }
        }
    }
    violations
}

/// What [`sanitize_edges`] had to repair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRepairs {
    pub dangling: usize,
    pub self_loops: usize,
    pub non_finite: usize,
    pub duplicates: usize,
    /// Kept, with strength clamped into [0, 1].
    pub clamped: usize,
}

impl EdgeRepairs {
    pub fn dropped(&self) -> usize {
        self.dangling + self.self_loops + self.non_finite + self.duplicates
    }
}

/// Bring edges read from disk back to the collection invariants.
///
/// Self-loops, edges with an endpoint missing from `items` and edges with a
/// non-finite strength are dropped. Out-of-range strengths are clamped. The
/// first edge of each unordered pair wins.
pub fn sanitize_edges(items: &[Item], edges: Vec<Edge>) -> (Vec<Edge>, EdgeRepairs) {
    let ids: HashSet<&str> = items.iter().map(|i| i.id.as_str()).collect();
    let mut repairs = EdgeRepairs::default();
    let mut valid = Vec::with_capacity(edges.len());

    for mut edge in edges {
        if edge.source == edge.target {
            warn!(item = %edge.source, "self-loop edge dropped");
            repairs.self_loops += 1;
            continue;
        }
        if !ids.contains(edge.source.as_str()) || !ids.contains(edge.target.as_str()) {
            warn!(source = %edge.source, target = %edge.target, "edge to unknown item dropped");
            repairs.dangling += 1;
            continue;
        }
        if !edge.strength.is_finite() {
            warn!(source = %edge.source, target = %edge.target, "edge with non-finite strength dropped");
            repairs.non_finite += 1;
            continue;
        }
        if !(0.0..=1.0).contains(&edge.strength) {
            warn!(
                source = %edge.source,
                target = %edge.target,
                strength = edge.strength,
                "edge strength clamped into [0, 1]"
            );
            edge.strength = clamp_unit(edge.strength);
            repairs.clamped += 1;
        }
        valid.push(edge);
    }

    let before = valid.len();
    let unique = EdgeSet::from_edges(valid).into_edges();
    repairs.duplicates = before - unique.len();
    if repairs.duplicates > 0 {
        warn!(duplicates = repairs.duplicates, "duplicate pair edges dropped");
    }
    (unique, repairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Category, Concept, Provenance, RelationHint, RelationType, SuggestedEdge};

    #[test]
    fn valid_records_pass() {
        let items = vec![Item::new("a", Category::Technique), Item::new("b", Category::Ethique)];
        assert!(validate_inputs(&items, &[]).is_ok());
    }

    #[test]
    fn collects_every_violation() {
        let mut a = Item::new("a", Category::Technique);
        a.concepts = vec![Concept {
            name: "x".into(),
            kind: String::new(),
            controversy: 5,
        }];
        a.embedding = Some(vec![1.0, 0.0]);
        let mut dup = Item::new("a", Category::Societe);
        dup.embedding = Some(vec![1.0, 0.0, 0.0]);
        dup.interest = f64::NAN;
        let batch = vec![SuggestionRecord {
            item_id: "a".into(),
            category: None,
            suggestions: vec![SuggestedEdge {
                target: "".into(),
                relation: RelationHint::SimilarTo,
                strength: 1.5,
                confidence: -0.1,
                reasoning: String::new(),
            }],
        }];

        let Err(PipelineError::InvalidRecords { violations }) = validate_inputs(&[a, dup], &batch)
        else {
            panic!("expected invalid records");
        };
        assert_eq!(violations.len(), 7, "{violations:#?}");
        assert!(violations.iter().any(|v| v.contains("duplicate id `a`")));
        assert!(violations.iter().any(|v| v.contains("3 dimensions")));
        assert!(violations.iter().any(|v| v.contains("strength 1.5")));
    }

    #[test]
    fn stored_edges_are_repaired() {
        let items = vec![Item::new("a", Category::Technique), Item::new("b", Category::Ethique)];
        let edge = |a: &str, b: &str| {
            Edge::new(a, b, RelationType::SimilarTo, 0.5, Provenance::Curated, "")
        };
        let mut loud = edge("a", "b");
        loud.strength = 1.7;
        let mut broken = edge("b", "a");
        broken.strength = f64::NAN;
        let edges = vec![
            edge("a", "ghost"),
            edge("a", "a"),
            broken,
            loud,
            edge("b", "a"),
        ];

        let (kept, repairs) = sanitize_edges(&items, edges);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].strength, 1.0);
        assert_eq!(
            repairs,
            EdgeRepairs {
                dangling: 1,
                self_loops: 1,
                non_finite: 1,
                duplicates: 1,
                clamped: 1,
            }
        );
        assert_eq!(repairs.dropped(), 4);
    }
}
