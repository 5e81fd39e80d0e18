#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use linkweave::centrality::strength_centrality;
use linkweave::embedding::{
    attach_embeddings, EmbeddingProvider, HashingEmbedder, PrecomputedEmbeddings,
};
use linkweave::ground_truth::GroundTruthPatterns;
use linkweave::records::{item_violations, sanitize_edges, validate_inputs};
use linkweave::store::{
    load_collection, load_embeddings, load_items, load_or_analyze, write_json_atomic,
    write_text_atomic, Artifact, ArtifactPaths,
};
use linkweave::{
    analyze, calibrate, optimize, render_markdown, validate, EdgeCollection, GraphConfig,
    Pipeline, PipelineError, PipelineInputs,
};

#[derive(Parser)]
#[command(name = "linkweave", version, about = "Typed link graph synthesis")]
struct Cli {
    /// JSON config; missing fields keep their defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze ground truth and write the patterns artifact
    Analyze {
        #[arg(long)]
        items: PathBuf,
        #[arg(long)]
        suggestions: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
    /// Calibrate thresholds, analyzing ground truth first when needed
    Calibrate {
        #[arg(long)]
        items: PathBuf,
        #[arg(long)]
        suggestions: PathBuf,
        /// Ground-truth artifact to reuse (regenerated here when missing)
        #[arg(long)]
        ground_truth: Option<PathBuf>,
        #[arg(long)]
        out: PathBuf,
    },
    /// Run the full pipeline and write the edge collection
    Run {
        #[arg(long)]
        items: PathBuf,
        #[arg(long)]
        suggestions: PathBuf,
        /// Precomputed `{item_id: [f64]}` vectors
        #[arg(long, conflicts_with = "hash_embeddings")]
        embeddings: Option<PathBuf>,
        /// Embed items lacking vectors with the offline hashing embedder
        #[arg(long)]
        hash_embeddings: bool,
        /// Reuse or persist ground-truth and calibration artifacts here
        #[arg(long)]
        artifacts_dir: Option<PathBuf>,
        #[arg(long)]
        out: PathBuf,
        /// Also write a markdown report
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Score a persisted edge collection
    Validate {
        #[arg(long)]
        items: PathBuf,
        #[arg(long)]
        suggestions: PathBuf,
        #[arg(long)]
        edges: PathBuf,
    },
    /// Prune a persisted edge collection to a target density
    Prune {
        #[arg(long)]
        items: PathBuf,
        #[arg(long)]
        edges: PathBuf,
        #[arg(long)]
        density: f64,
        #[arg(long)]
        out: PathBuf,
    },
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("linkweave=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<GraphConfig, PipelineError> {
    match path {
        Some(path) => GraphConfig::load_from_path(path),
        None => Ok(GraphConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Analyze {
            items,
            suggestions,
            out,
        } => {
            let inputs = PipelineInputs::load(&items, &suggestions)?;
            validate_inputs(&inputs.items, &inputs.suggestions)?;
            let patterns = analyze(&inputs.items, &inputs.suggestions, &cfg);
            write_json_atomic(&out, &Artifact::new(&patterns))?;
            println!(
                "analyzed {} suggestions ({} unresolvable), {} calibrated pairs",
                patterns.suggestions.total,
                patterns.suggestions.unresolvable,
                patterns.category_thresholds.len()
            );
        }
        Commands::Calibrate {
            items,
            suggestions,
            ground_truth,
            out,
        } => {
            let inputs = PipelineInputs::load(&items, &suggestions)?;
            validate_inputs(&inputs.items, &inputs.suggestions)?;
            let patterns: GroundTruthPatterns = match &ground_truth {
                Some(path) => load_or_analyze(path, &inputs.items, &inputs.suggestions, &cfg)?.0,
                None => analyze(&inputs.items, &inputs.suggestions, &cfg),
            };
            let calibration = calibrate(&patterns, &cfg);
            write_json_atomic(&out, &Artifact::new(&calibration))?;
            println!(
                "calibrated {} category pairs (asymmetry preserved: {})",
                calibration.validation.calibrated_pairs, calibration.validation.asymmetry_preserved
            );
        }
        Commands::Run {
            items,
            suggestions,
            embeddings,
            hash_embeddings,
            artifacts_dir,
            out,
            report,
        } => {
            let mut inputs = PipelineInputs::load(&items, &suggestions)?;
            let provider: Option<Box<dyn EmbeddingProvider>> = match embeddings {
                Some(path) => Some(Box::new(PrecomputedEmbeddings::new(load_embeddings(&path)?))),
                None if hash_embeddings => Some(Box::new(HashingEmbedder::default())),
                None => None,
            };
            if let Some(provider) = provider {
                let attached = attach_embeddings(&mut inputs.items, provider.as_ref()).await;
                eprintln!(
                    "embeddings: {} attached, {} reused, {} missing",
                    attached.embedded,
                    attached.reused,
                    attached.failed.len()
                );
            }

            let pipeline = Pipeline::new(cfg);
            let outcome = match &artifacts_dir {
                Some(dir) => pipeline.run_with_artifacts(&inputs, &ArtifactPaths::in_dir(dir))?,
                None => pipeline.run(&inputs)?,
            };
            write_json_atomic(&out, &outcome.collection)?;
            if let Some(path) = report {
                write_text_atomic(&path, &render_markdown(&outcome))?;
            }
            println!(
                "{} edges written to {} (score {:.1}, {})",
                outcome.collection.metadata.total_edges,
                out.display(),
                outcome.validation.composite_score,
                outcome.validation.verdict
            );
        }
        Commands::Validate {
            items,
            suggestions,
            edges,
        } => {
            let inputs = PipelineInputs::load(&items, &suggestions)?;
            validate_inputs(&inputs.items, &inputs.suggestions)?;
            let collection = load_collection(&edges)?;
            let (edges, repairs) = sanitize_edges(&inputs.items, collection.edges);
            if repairs.dropped() > 0 || repairs.clamped > 0 {
                warn!(
                    dropped = repairs.dropped(),
                    clamped = repairs.clamped,
                    "stored collection repaired before validation"
                );
            }
            let patterns = analyze(&inputs.items, &inputs.suggestions, &cfg);
            let calibration = calibrate(&patterns, &cfg);
            let report = validate(
                &inputs.items,
                &inputs.suggestions,
                &edges,
                &calibration,
                &cfg,
            );
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Prune {
            items,
            edges,
            density,
            out,
        } => {
            if !(0.0..=1.0).contains(&density) {
                return Err("--density must be in [0, 1]".into());
            }
            let items = load_items(&items)?;
            let violations = item_violations(&items);
            if !violations.is_empty() {
                return Err(PipelineError::InvalidRecords { violations }.into());
            }
            let collection = load_collection(&edges)?;
            let pruned = optimize(&items, collection.edges, density, &cfg);
            let centrality = strength_centrality(&items, &pruned.edges);
            let next = EdgeCollection::new(items.len(), pruned.edges, centrality);
            write_json_atomic(&out, &next)?;
            println!(
                "pruned {} -> {} edges (density {:.4}, {} invalid dropped)",
                pruned.report.original_edges,
                pruned.report.final_edges,
                pruned.report.density,
                pruned.report.repairs.dropped()
            );
        }
    }

    Ok(())
}
