use std::fmt;

use thiserror::Error;

use crate::table::TableError;

/// The pipeline step an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Resample,
    GapFill,
    Merge,
    DateFeatures,
    NumericalFeatures,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Resample => "resample",
            Self::GapFill => "gap_fill",
            Self::Merge => "merge",
            Self::DateFeatures => "date_features",
            Self::NumericalFeatures => "numerical_features",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures of a single pipeline run.
///
/// None of these are fatal to the process. A run that fails commits nothing,
/// so the previously stored artifact stays live.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{stage}: failed to read source: {message}")]
    SourceRead { stage: Stage, message: String },

    #[error("{stage}: invalid configuration: {message}")]
    Config { stage: Stage, message: String },

    #[error("{stage}: {message}")]
    Computation { stage: Stage, message: String },

    #[error("project {0} not found")]
    ProjectNotFound(uuid::Uuid),

    #[error("failed to persist artifact: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn source_read(stage: Stage, message: impl fmt::Display) -> Self {
        Self::SourceRead {
            stage,
            message: message.to_string(),
        }
    }

    pub fn config(stage: Stage, message: impl fmt::Display) -> Self {
        Self::Config {
            stage,
            message: message.to_string(),
        }
    }

    pub fn computation(stage: Stage, message: impl fmt::Display) -> Self {
        Self::Computation {
            stage,
            message: message.to_string(),
        }
    }

    /// The stage that failed, when the failure came from the pipeline itself.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::SourceRead { stage, .. }
            | Self::Config { stage, .. }
            | Self::Computation { stage, .. } => Some(*stage),
            Self::ProjectNotFound(_) | Self::Store(_) => None,
        }
    }
}

/// Attach a stage to table-level errors, which are all configuration problems
/// (a referenced column is absent, mistyped or collides).
pub(crate) trait AtStage<T> {
    fn at(self, stage: Stage) -> Result<T, PipelineError>;
}

impl<T> AtStage<T> for Result<T, TableError> {
    fn at(self, stage: Stage) -> Result<T, PipelineError> {
        self.map_err(|e| PipelineError::config(stage, e))
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
