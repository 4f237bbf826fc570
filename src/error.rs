//! Error kinds surfaced by the analytical core

use thiserror::Error;

/// Failures of a single profile build, normalization, query or clustering run
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AnalysisError {
    /// A referenced identity does not exist
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    /// A parameter or the input data is outside the valid domain
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl AnalysisError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { kind, id: id.into() }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

pub type AnalysisResult<T> = std::result::Result<T, AnalysisError>;
