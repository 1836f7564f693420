//! Error taxonomy for the review pipeline.
//!
//! Per-review problems ([`ReviewError`]) are collected and never abort a run.
//! Only [`PipelineError`] is surfaced to the caller as fatal.

use std::path::PathBuf;

use thiserror::Error;

/// Failure of a backing model service (classifier, embedder, zero-shot, translator).
#[derive(Debug, Error)]
pub enum ModelError {
    /// The service could not be reached or refused the request.
    #[error("{service} unavailable: {reason}")]
    Unavailable {
        service: &'static str,
        reason: String,
    },

    /// The service answered, but with something we cannot use.
    #[error("{service} returned invalid output: {reason}")]
    InvalidOutput {
        service: &'static str,
        reason: String,
    },
}

impl ModelError {
    pub fn unavailable(service: &'static str, reason: impl Into<String>) -> Self {
        ModelError::Unavailable {
            service,
            reason: reason.into(),
        }
    }

    pub fn invalid_output(service: &'static str, reason: impl Into<String>) -> Self {
        ModelError::InvalidOutput {
            service,
            reason: reason.into(),
        }
    }
}

/// Why a single review was skipped.
#[derive(Debug, Error)]
pub enum ReviewError {
    /// Bad date, rating outside 1..=5, empty text, unreadable row.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// A backing model could not be reached for this review.
    #[error("model unavailable: {0}")]
    ModelUnavailable(ModelError),

    /// A backing model answered, but with output outside its contract.
    #[error("unusable model output: {0}")]
    ModelOutput(ModelError),
}

impl From<ModelError> for ReviewError {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::Unavailable { .. } => ReviewError::ModelUnavailable(e),
            ModelError::InvalidOutput { .. } => ReviewError::ModelOutput(e),
        }
    }
}

impl ReviewError {
    pub fn is_model_unavailable(&self) -> bool {
        matches!(self, ReviewError::ModelUnavailable(_))
    }
}

/// A review that contributed nothing to the run, and why.
#[derive(Debug)]
pub struct ReviewFailure {
    /// Review id, i.e. position in the input batch.
    pub review_id: usize,
    pub restaurant: String,
    pub error: ReviewError,
}

/// Translation problems never leave the tagger; they degrade to the original text.
#[derive(Debug, Error)]
#[error("translation failed: {0}")]
pub struct TranslationFailure(pub String);

/// Errors that end a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("no input files found under {0}")]
    NoInput(PathBuf),

    /// Every review that reached a model failed with `ModelUnavailable`.
    #[error("no backing model could be reached: {0}")]
    ModelsUnreachable(String),

    /// A model client could not be built.
    #[error("model setup failed: {0}")]
    ModelSetup(#[from] ModelError),
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
