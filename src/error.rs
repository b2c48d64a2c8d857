//! Error types for trazar

use thiserror::Error;

/// Result type alias using trazar's Error
pub type Result<T> = std::result::Result<T, TrazarError>;

/// Main error type for trazar operations
#[derive(Error, Debug)]
pub enum TrazarError {
    /// No model session is loaded; no partial trace is produced.
    #[error("Model session not loaded")]
    ModelNotLoaded,

    /// The model collaborator failed while a trace was being recorded.
    /// Carries the step index at which generation stopped.
    #[error("Generation failed at step {step}")]
    Generation {
        /// Step index at which the failure occurred
        step: usize,
        /// Underlying failure
        #[source]
        source: Box<TrazarError>,
    },

    /// The tokenizer collaborator misbehaved.
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// The model collaborator misbehaved.
    #[error("Model error: {0}")]
    Model(String),

    /// An argument supplied to an operation was invalid.
    #[error("Invalid argument `{argument}`: {reason}")]
    InvalidArgument {
        /// Name of the offending argument
        argument: &'static str,
        /// Why the value was rejected
        reason: String,
    },

    /// Filesystem failure while reading or writing trace documents.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Transport failure talking to the trace service.
    #[error("HTTP error: {0}")]
    Http(String),
}

impl TrazarError {
    /// Wrap an error as a generation failure at the given step.
    #[must_use]
    pub fn at_step(self, step: usize) -> Self {
        Self::Generation {
            step,
            source: Box::new(self),
        }
    }
}
