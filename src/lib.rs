#![forbid(unsafe_code)]

//! # linkweave
//!
//! Builds a typed, weighted relationship graph over a closed set of curated
//! items by reconciling three sources of links: curator-asserted links,
//! agent-suggested edges, and edges inferred from embedding similarity.
//!
//! Curated and suggested edges are treated as ground truth. They calibrate
//! the per-category-pair similarity thresholds used for inference, and they
//! are never pruned. Inferred edges are typed by an ordered rule cascade,
//! refined for interdisciplinary bridges, pruned to a readable density, and
//! the result is scored by a validator that gates acceptance.
//!
//! The entry point is [`Pipeline`]; each stage is also usable on its own.

pub mod calibration;
pub mod cascade;
pub mod centrality;
pub mod config;
pub mod embedding;
pub mod error;
pub mod ground_truth;
pub mod model;
pub mod pipeline;
pub mod readability;
pub mod records;
pub mod refine;
pub mod report;
pub mod similarity;
pub mod store;
pub mod synthesis;
pub mod validation;

pub use calibration::{calibrate, SemanticCalibration};
pub use cascade::{Cascade, Decision};
pub use config::GraphConfig;
pub use embedding::{
    attach_embeddings, EmbeddingError, EmbeddingProvider, HashingEmbedder, PrecomputedEmbeddings,
};
pub use error::PipelineError;
pub use ground_truth::{analyze, GroundTruthPatterns};
pub use model::{
    Category, Complexity, Edge, EdgeCollection, Item, Provenance, RelationType, SuggestedEdge,
    SuggestionRecord,
};
pub use pipeline::{Pipeline, PipelineInputs, PipelineOutcome};
pub use readability::optimize;
pub use refine::refine;
pub use report::render_markdown;
pub use store::{write_json_atomic, ArtifactPaths};
pub use synthesis::Synthesizer;
pub use validation::{validate, ValidationReport, Verdict};
