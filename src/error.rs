//! Error types for pipeline runs.
//!
//! Only input defects and persistence failures are errors. Dangling references,
//! missing embeddings and low validation scores are handled inside the stages.

use std::path::PathBuf;

use thiserror::Error;

/// Fatal failures that abort a pipeline run before any output is written.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A required input file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A required input file is not valid JSON for the expected shape.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Records failed the precondition checks; every violation is listed.
    #[error("{} invalid record field(s): {}", .violations.len(), .violations.join("; "))]
    InvalidRecords { violations: Vec<String> },

    /// Configuration values are out of range or inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    pub fn parse(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Parse {
            path: path.into(),
            source,
        }
    }

    /// True for defects in the caller's inputs (as opposed to local I/O trouble).
    pub fn is_input_defect(&self) -> bool {
        matches!(
            self,
            Self::Read { .. } | Self::Parse { .. } | Self::InvalidRecords { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_records_lists_every_violation() {
        let err = PipelineError::InvalidRecords {
            violations: vec!["a: bad".to_string(), "b: worse".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("2 invalid"));
        assert!(msg.contains("a: bad"));
        assert!(msg.contains("b: worse"));
        assert!(err.is_input_defect());
    }

    #[test]
    fn config_errors_are_not_input_defects() {
        assert!(!PipelineError::Config("x".into()).is_input_defect());
    }
}
