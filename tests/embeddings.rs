use std::collections::HashMap;

use linkweave::embedding::{attach_embeddings, HashingEmbedder, PrecomputedEmbeddings};
use linkweave::model::{Category, Item};
use linkweave::{Pipeline, PipelineInputs};

fn item(id: &str, title: &str) -> Item {
    let mut item = Item::new(id, Category::Technique);
    item.title = title.to_string();
    item
}

#[tokio::test]
async fn precomputed_vectors_skip_unknown_and_mismatched_items() {
    let mut items = vec![item("a", "alpha"), item("b", "beta"), item("c", "gamma"), item("d", "delta")];
    items[3].embedding = Some(vec![0.0, 1.0]);

    let provider = PrecomputedEmbeddings::new(HashMap::from([
        ("a".to_string(), vec![1.0, 0.0]),
        ("c".to_string(), vec![1.0, 0.0, 0.0]),
    ]));
    let report = attach_embeddings(&mut items, &provider).await;

    assert_eq!(report.reused, 1);
    assert_eq!(report.embedded, 1);
    assert_eq!(report.dimensions, Some(2));
    assert_eq!(report.failed, vec!["b".to_string(), "c".to_string()]);
    assert_eq!(items[0].embedding.as_deref(), Some(&[1.0, 0.0][..]));
    assert!(items[1].embedding.is_none());
    assert!(items[2].embedding.is_none());
}

#[tokio::test]
async fn hashed_vectors_feed_inference() {
    let mut items = vec![
        item("a", "graph neural networks for molecules"),
        item("b", "graph neural networks for proteins"),
        item("c", "medieval poetry and courtly love"),
    ];
    let embedder = HashingEmbedder::new(64);
    let report = attach_embeddings(&mut items, &embedder).await;
    assert_eq!(report.embedded, 3);
    assert!(report.failed.is_empty());
    assert!(items.iter().all(|i| i.embedding().map(<[f64]>::len) == Some(64)));

    let outcome = Pipeline::default()
        .run(&PipelineInputs::new(items, Vec::new()))
        .unwrap();
    assert_eq!(outcome.synthesis.skipped_no_embedding, 0);
}
