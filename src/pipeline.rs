//! Stage orchestration.
//!
//! The stages run strictly in order, each consuming the full output of the
//! previous one:
//! 1. **Analyze** ground truth from curated links and suggestions
//! 2. **Calibrate** pair thresholds and type adjustments
//! 3. **Synthesize** curated, suggested and inferred edges
//! 4. **Refine** uncovered interdisciplinary pairs
//! 5. **Prune** toward the target density
//! 6. **Validate** the pruned graph, which is exactly what gets persisted
//!
//! Usage:
//! ```bash
//! linkweave run --items items.json --suggestions suggestions.json --out edges.json
//! ```

use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::calibration::{calibrate, SemanticCalibration};
use crate::centrality::strength_centrality;
use crate::config::GraphConfig;
use crate::error::PipelineError;
use crate::ground_truth::{analyze, GroundTruthPatterns};
use crate::model::{EdgeCollection, Item, SuggestionRecord};
use crate::readability::{optimize, ReadabilityReport};
use crate::records::validate_inputs;
use crate::refine::{refine, RefineSummary};
use crate::store::{load_artifacts, load_items, load_suggestions, ArtifactPaths};
use crate::synthesis::{SynthesisSummary, Synthesizer};
use crate::validation::{validate, ValidationReport};

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct PipelineInputs {
    pub items: Vec<Item>,
    pub suggestions: Vec<SuggestionRecord>,
}

impl PipelineInputs {
    pub fn new(items: Vec<Item>, suggestions: Vec<SuggestionRecord>) -> Self {
        Self { items, suggestions }
    }

    /// Load both required inputs; either one missing or malformed is fatal.
    pub fn load(items: &Path, suggestions: &Path) -> Result<Self, PipelineError> {
        Ok(Self {
            items: load_items(items)?,
            suggestions: load_suggestions(suggestions)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: String,
    pub elapsed_ms: u64,
}

/// Everything a run produced. Only `collection` is meant for the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutcome {
    pub patterns: GroundTruthPatterns,
    pub calibration: SemanticCalibration,
    pub synthesis: SynthesisSummary,
    pub refine: RefineSummary,
    pub readability: ReadabilityReport,
    pub validation: ValidationReport,
    pub collection: EdgeCollection,
    pub timings: Vec<StageTiming>,
}

struct Timer {
    timings: Vec<StageTiming>,
}

impl Timer {
    fn new() -> Self {
        Self {
            timings: Vec::new(),
        }
    }

    fn stage<R>(&mut self, name: &str, f: impl FnOnce() -> R) -> R {
        let start = Instant::now();
        let out = f();
        let elapsed_ms = start.elapsed().as_millis() as u64;
        debug!(stage = name, elapsed_ms, "stage finished");
        self.timings.push(StageTiming {
            stage: name.to_string(),
            elapsed_ms,
        });
        out
    }
}

// =============================================================================
// Pipeline
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: GraphConfig,
}

impl Pipeline {
    pub fn new(config: GraphConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Full run with ground truth analyzed and calibrated in memory.
    pub fn run(&self, inputs: &PipelineInputs) -> Result<PipelineOutcome, PipelineError> {
        validate_inputs(&inputs.items, &inputs.suggestions)?;
        let mut timer = Timer::new();
        let patterns = timer.stage("analyze", || {
            analyze(&inputs.items, &inputs.suggestions, &self.config)
        });
        let calibration = timer.stage("calibrate", || calibrate(&patterns, &self.config));
        Ok(self.finish(inputs, patterns, calibration, timer))
    }

    /// Full run reusing persisted artifacts, regenerating whichever is missing.
    pub fn run_with_artifacts(
        &self,
        inputs: &PipelineInputs,
        paths: &ArtifactPaths,
    ) -> Result<PipelineOutcome, PipelineError> {
        validate_inputs(&inputs.items, &inputs.suggestions)?;
        let mut timer = Timer::new();
        let loaded = timer.stage("artifacts", || {
            load_artifacts(paths, &inputs.items, &inputs.suggestions, &self.config)
        })?;
        info!(
            regenerated_ground_truth = loaded.regenerated_ground_truth,
            regenerated_calibration = loaded.regenerated_calibration,
            "artifacts ready"
        );
        Ok(self.finish(inputs, loaded.patterns, loaded.calibration, timer))
    }

    /// Stages 3 to 6 over an existing calibration.
    pub fn run_calibrated(
        &self,
        inputs: &PipelineInputs,
        patterns: GroundTruthPatterns,
        calibration: SemanticCalibration,
    ) -> PipelineOutcome {
        self.finish(inputs, patterns, calibration, Timer::new())
    }

    fn finish(
        &self,
        inputs: &PipelineInputs,
        patterns: GroundTruthPatterns,
        calibration: SemanticCalibration,
        mut timer: Timer,
    ) -> PipelineOutcome {
        let cfg = &self.config;
        let items = &inputs.items;

        let synthesized = timer.stage("synthesize", || {
            Synthesizer::new(cfg, &calibration).synthesize(items, &inputs.suggestions)
        });
        log_centrality("synthesis", items, &synthesized.edges);

        let refined = timer.stage("refine", || refine(items, synthesized.edges, &calibration, cfg));
        log_centrality("refinement", items, &refined.edges);

        let pruned = timer.stage("prune", || {
            optimize(items, refined.edges, cfg.readability.target_density, cfg)
        });
        let centrality = strength_centrality(items, &pruned.edges);

        let validation = timer.stage("validate", || {
            validate(items, &inputs.suggestions, &pruned.edges, &calibration, cfg)
        });

        let mut collection = EdgeCollection::new(items.len(), pruned.edges, centrality);
        collection.metadata.validation_score = Some(validation.composite_score);
        collection.metadata.verdict = Some(validation.verdict);

        info!(
            run_id = %collection.metadata.run_id,
            edges = collection.metadata.total_edges,
            density = collection.metadata.density,
            score = validation.composite_score,
            verdict = %validation.verdict,
            "pipeline finished"
        );

        PipelineOutcome {
            patterns,
            calibration,
            synthesis: synthesized.summary,
            refine: refined.summary,
            readability: pruned.report,
            validation,
            collection,
            timings: timer.timings,
        }
    }
}

fn log_centrality(after: &str, items: &[Item], edges: &[crate::model::Edge]) {
    let centrality = strength_centrality(items, edges);
    let top = centrality
        .iter()
        .max_by(|a, b| a.1.total_cmp(b.1).then_with(|| b.0.cmp(a.0)));
    if let Some((id, _)) = top {
        debug!(after, edges = edges.len(), most_central = %id, "centrality recomputed");
    }
}
