//! Error types for trajectory propagation.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FsshError>;

/// Everything that can go wrong while building or stepping an ensemble.
///
/// NaN couplings from vanishing gaps and frustrated hops are *not* errors;
/// they are ordinary outcomes of a step.
#[derive(Debug, Error)]
pub enum FsshError {
    /// Invalid or inconsistent configuration values.
    #[error("configuration error: {0}")]
    Config(String),

    /// Oracle output or sample state with the wrong dimensions or a
    /// non-zero coupling diagonal.
    #[error("shape mismatch in {what}: {detail}")]
    Shape { what: &'static str, detail: String },

    /// A numerically diverging propagation for one sample.
    #[error("numerical instability in sample {sample}: {reason}")]
    Instability { sample: usize, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl FsshError {
    pub(crate) fn shape(what: &'static str, detail: impl Into<String>) -> Self {
        FsshError::Shape { what, detail: detail.into() }
    }

    /// Instability errors may be handled per sample; everything else
    /// aborts the step.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FsshError::Instability { .. })
    }

    /// Attach the sample index to an instability raised deep inside a
    /// propagator that does not know which sample it is working on.
    pub(crate) fn for_sample(self, index: usize) -> Self {
        match self {
            FsshError::Instability { reason, .. } => FsshError::Instability { sample: index, reason },
            other => other,
        }
    }
}
