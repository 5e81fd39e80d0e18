use std::collections::HashSet;

use linkweave::model::{
    Category, Complexity, Concept, Item, PairKey, Provenance, RelationHint, RelationType,
    SuggestedEdge, SuggestionRecord,
};
use linkweave::store::load_artifacts;
use linkweave::{
    analyze, calibrate, optimize, validate, ArtifactPaths, GraphConfig, Pipeline, PipelineInputs,
};
use tempfile::tempdir;

const CATEGORIES: [Category; 6] = [
    Category::Technique,
    Category::Recherche,
    Category::Pedagogie,
    Category::Ethique,
    Category::Philosophie,
    Category::Societe,
];

fn corpus(n: usize) -> Vec<Item> {
    (0..n)
        .map(|k| {
            let mut item = Item::new(format!("item-{k:02}"), CATEGORIES[k % CATEGORIES.len()]);
            item.title = format!("Item {k}");
            item.complexity = match k % 3 {
                0 => Complexity::Beginner,
                1 => Complexity::Intermediate,
                _ => Complexity::Advanced,
            };
            if k % 4 == 0 {
                item.concepts = vec![Concept {
                    name: "surveillance".into(),
                    kind: "theme".into(),
                    controversy: (k / 4 % 4) as u8,
                }];
            }
            let angle = k as f64 * 0.35;
            item.embedding = Some(vec![angle.cos(), angle.sin(), 0.3]);
            item
        })
        .collect()
}

fn suggestions() -> Vec<SuggestionRecord> {
    let edge = |target: &str, relation, strength, reasoning: &str| SuggestedEdge {
        target: target.to_string(),
        relation,
        strength,
        confidence: 0.8,
        reasoning: reasoning.to_string(),
    };
    vec![
        SuggestionRecord {
            item_id: "item-00".into(),
            category: Some(Category::Technique),
            suggestions: vec![
                edge("item-09", RelationHint::RelatesTo, 0.6, "practical application of the idea"),
                edge("item-05", RelationHint::Questions, 0.4, "questions the premise"),
            ],
        },
        SuggestionRecord {
            item_id: "item-03".into(),
            category: Some(Category::Ethique),
            suggestions: vec![edge("item-10", RelationHint::RelatesTo, 0.5, "in tension with")],
        },
    ]
}

fn inputs() -> PipelineInputs {
    let mut items = corpus(18);
    items[1].related = vec!["item-07".into(), "item-13".into()];
    items[2].related = vec!["item-14".into()];
    PipelineInputs::new(items, suggestions())
}

fn sparse_config() -> GraphConfig {
    let mut cfg = GraphConfig::default();
    cfg.readability.target_density = 0.05;
    cfg
}

#[test]
fn pipeline_output_is_well_formed_and_keeps_ground_truth() {
    let inputs = inputs();
    let outcome = Pipeline::new(sparse_config()).run(&inputs).unwrap();
    let edges = &outcome.collection.edges;

    let ids: HashSet<&str> = inputs.items.iter().map(|i| i.id.as_str()).collect();
    let mut pairs = HashSet::new();
    for edge in edges {
        assert!(ids.contains(edge.source.as_str()) && ids.contains(edge.target.as_str()));
        assert_ne!(edge.source, edge.target);
        assert!((0.0..=1.0).contains(&edge.strength));
        assert!(pairs.insert(edge.pair_key()));
    }

    let expected = [
        ("item-01", "item-07"),
        ("item-01", "item-13"),
        ("item-02", "item-14"),
        ("item-00", "item-09"),
        ("item-00", "item-05"),
        ("item-03", "item-10"),
    ];
    for (a, b) in expected {
        let edge = edges
            .iter()
            .find(|e| e.pair_key() == PairKey::new(a, b))
            .unwrap_or_else(|| panic!("ground truth {a}-{b} was pruned"));
        assert!(edge.provenance.is_ground_truth());
    }

    assert!(outcome.readability.final_edges <= outcome.readability.original_edges);
    assert_eq!(outcome.collection.metadata.total_edges, edges.len());
    assert_eq!(outcome.validation.edge_count, edges.len());
    let curated = outcome
        .collection
        .metadata
        .by_provenance
        .get(&Provenance::Curated)
        .copied()
        .unwrap_or(0);
    assert_eq!(curated, 3);
}

#[test]
fn pipeline_is_deterministic() {
    let inputs = inputs();
    let a = Pipeline::new(sparse_config()).run(&inputs).unwrap();
    let b = Pipeline::new(sparse_config()).run(&inputs).unwrap();

    assert_eq!(a.collection.edges, b.collection.edges);
    assert_eq!(a.collection.centrality, b.collection.centrality);
    assert_eq!(a.validation, b.validation);
    assert_eq!(a.refine, b.refine);
    // Run ids are unique per run.
    assert_ne!(a.collection.metadata.run_id, b.collection.metadata.run_id);
}

#[test]
fn pruning_is_a_noop_below_target() {
    let inputs = inputs();
    let cfg = GraphConfig::default();
    let outcome = Pipeline::new(sparse_config()).run(&inputs).unwrap();
    let edges = outcome.collection.edges.clone();

    let out = optimize(&inputs.items, edges.clone(), 1.0, &cfg);
    assert!(out.report.noop);
    assert_eq!(out.edges, edges);

    let tighter = optimize(&inputs.items, edges.clone(), 0.0, &cfg);
    assert!(tighter.edges.len() <= edges.len());
    assert!(tighter.edges.iter().all(|e| edges.contains(e)));
    assert!(tighter
        .edges
        .iter()
        .all(|e| e.provenance.is_ground_truth() || e.relation == RelationType::Contradicts));
}

#[test]
fn validation_does_not_depend_on_edge_order() {
    let inputs = inputs();
    let cfg = GraphConfig::default();
    let outcome = Pipeline::new(cfg.clone()).run(&inputs).unwrap();

    let mut reversed = outcome.collection.edges.clone();
    reversed.reverse();
    let again = validate(
        &inputs.items,
        &inputs.suggestions,
        &reversed,
        &outcome.calibration,
        &cfg,
    );
    assert_eq!(again, outcome.validation);
}

#[test]
fn missing_ground_truth_artifact_yields_the_same_calibration() {
    let inputs = inputs();
    let cfg = GraphConfig::default();
    let expected = calibrate(&analyze(&inputs.items, &inputs.suggestions, &cfg), &cfg);

    // Nothing on disk: both artifacts are regenerated.
    let cold = tempdir().unwrap();
    let cold_paths = ArtifactPaths::in_dir(cold.path());
    let loaded = load_artifacts(&cold_paths, &inputs.items, &inputs.suggestions, &cfg).unwrap();
    assert!(loaded.regenerated_ground_truth);
    assert_eq!(loaded.calibration, expected);

    // Ground truth already persisted: only the calibration is derived.
    let warm = tempdir().unwrap();
    let warm_paths = ArtifactPaths::in_dir(warm.path());
    std::fs::copy(&cold_paths.ground_truth, &warm_paths.ground_truth).unwrap();
    let reloaded = load_artifacts(&warm_paths, &inputs.items, &inputs.suggestions, &cfg).unwrap();
    assert!(!reloaded.regenerated_ground_truth);
    assert!(reloaded.regenerated_calibration);
    assert_eq!(reloaded.calibration, expected);

    let rerun = Pipeline::new(cfg)
        .run_with_artifacts(&inputs, &warm_paths)
        .unwrap();
    assert_eq!(rerun.calibration, expected);
}
