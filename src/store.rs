//! JSON persistence: input loading, locked atomic writes and cached artifacts.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::calibration::{calibrate, SemanticCalibration};
use crate::config::GraphConfig;
use crate::error::PipelineError;
use crate::ground_truth::{analyze, GroundTruthPatterns};
use crate::model::{EdgeCollection, Item, SuggestionRecord};

// =============================================================================
// Reading
// =============================================================================

pub fn read_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, PipelineError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|e| PipelineError::read(path, e))?;
    serde_json::from_str(&raw).map_err(|e| PipelineError::parse(path, e))
}

pub fn load_items(path: impl AsRef<Path>) -> Result<Vec<Item>, PipelineError> {
    read_json(path)
}

pub fn load_suggestions(path: impl AsRef<Path>) -> Result<Vec<SuggestionRecord>, PipelineError> {
    read_json(path)
}

/// `{item_id: [f64, ...]}`.
pub fn load_embeddings(path: impl AsRef<Path>) -> Result<HashMap<String, Vec<f64>>, PipelineError> {
    read_json(path)
}

pub fn load_collection(path: impl AsRef<Path>) -> Result<EdgeCollection, PipelineError> {
    read_json(path)
}

// =============================================================================
// Writing
// =============================================================================

/// Exclusive advisory lock on `<path>.lock`, released on drop.
pub struct StoreLock {
    _file: File,
}

impl StoreLock {
    pub fn acquire(path: &Path) -> Result<Self, PipelineError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(sidecar(path, "lock"))?;
        file.lock_exclusive()?;
        Ok(Self { _file: file })
    }
}

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

/// Write pretty JSON so readers see either the old file or the complete new
/// one. The previous version is copied to `<path>.bak` first, best effort.
pub fn write_json_atomic<T: Serialize + ?Sized>(
    path: impl AsRef<Path>,
    value: &T,
) -> Result<(), PipelineError> {
    let mut body = serde_json::to_vec_pretty(value)?;
    body.push(b'\n');
    write_atomic(path.as_ref(), &body)
}

/// Same locking and backup as [`write_json_atomic`], for rendered text.
pub fn write_text_atomic(path: impl AsRef<Path>, text: &str) -> Result<(), PipelineError> {
    write_atomic(path.as_ref(), text.as_bytes())
}

fn write_atomic(path: &Path, body: &[u8]) -> Result<(), PipelineError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;
    let _lock = StoreLock::acquire(path)?;

    if path.exists() {
        let backup = sidecar(path, "bak");
        if let Err(err) = std::fs::copy(path, &backup) {
            warn!(path = %path.display(), error = %err, "backup before overwrite failed");
        }
    }

    let mut tmp = NamedTempFile::new_in(&dir)?;
    tmp.write_all(body)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| PipelineError::Io(e.error))?;
    debug!(path = %path.display(), "file written");
    Ok(())
}

// =============================================================================
// Artifacts
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact<T> {
    pub generated_at: DateTime<Utc>,
    pub data: T,
}

impl<T> Artifact<T> {
    pub fn new(data: T) -> Self {
        Self {
            generated_at: Utc::now(),
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub ground_truth: PathBuf,
    pub calibration: PathBuf,
}

impl ArtifactPaths {
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            ground_truth: dir.join("ground_truth.json"),
            calibration: dir.join("calibration.json"),
        }
    }
}

/// `None` when the artifact is missing or unreadable; both are resource gaps.
pub fn load_artifact<T: DeserializeOwned>(path: &Path) -> Option<Artifact<T>> {
    if !path.exists() {
        info!(path = %path.display(), "artifact missing; regenerating");
        return None;
    }
    match read_json::<Artifact<T>>(path) {
        Ok(artifact) => {
            debug!(path = %path.display(), generated_at = %artifact.generated_at, "artifact loaded");
            Some(artifact)
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "artifact unreadable; regenerating");
            None
        }
    }
}

/// Ground-truth patterns from `path`, or a fresh analysis persisted there.
/// The flag is true when the patterns were regenerated.
pub fn load_or_analyze(
    path: &Path,
    items: &[Item],
    batch: &[SuggestionRecord],
    cfg: &GraphConfig,
) -> Result<(GroundTruthPatterns, bool), PipelineError> {
    if let Some(artifact) = load_artifact::<GroundTruthPatterns>(path) {
        return Ok((artifact.data, false));
    }
    let patterns = analyze(items, batch, cfg);
    write_json_atomic(path, &Artifact::new(&patterns))?;
    Ok((patterns, true))
}

/// Calibration from `path`, or one derived from `patterns` and persisted.
pub fn load_or_calibrate(
    path: &Path,
    patterns: &GroundTruthPatterns,
    cfg: &GraphConfig,
) -> Result<(SemanticCalibration, bool), PipelineError> {
    if let Some(artifact) = load_artifact::<SemanticCalibration>(path) {
        return Ok((artifact.data, false));
    }
    let calibration = calibrate(patterns, cfg);
    write_json_atomic(path, &Artifact::new(&calibration))?;
    Ok((calibration, true))
}

#[derive(Debug, Clone)]
pub struct LoadedArtifacts {
    pub patterns: GroundTruthPatterns,
    pub calibration: SemanticCalibration,
    pub regenerated_ground_truth: bool,
    pub regenerated_calibration: bool,
}

/// Both artifacts, regenerating as needed. A regenerated ground truth also
/// invalidates any stored calibration.
pub fn load_artifacts(
    paths: &ArtifactPaths,
    items: &[Item],
    batch: &[SuggestionRecord],
    cfg: &GraphConfig,
) -> Result<LoadedArtifacts, PipelineError> {
    let (patterns, regenerated_ground_truth) =
        load_or_analyze(&paths.ground_truth, items, batch, cfg)?;
    let (calibration, regenerated_calibration) = if regenerated_ground_truth {
        let calibration = calibrate(&patterns, cfg);
        write_json_atomic(&paths.calibration, &Artifact::new(&calibration))?;
        (calibration, true)
    } else {
        load_or_calibrate(&paths.calibration, &patterns, cfg)?
    };
    Ok(LoadedArtifacts {
        patterns,
        calibration,
        regenerated_ground_truth,
        regenerated_calibration,
    })
}
