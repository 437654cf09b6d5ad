use fxrt_files::ParserError;
use thiserror::Error;

use crate::device::DeviceError;

#[derive(Error, Debug)]
pub enum EffectError {
    /// The buffer is truncated, carries an unknown version tag or violates one of the format's
    /// invariants. Loading stops at the first such error.
    #[error("The effect binary is malformed: {source}")]
    MalformedInput {
        #[source]
        source: ParserError,
    },

    /// The buffer is well-formed but relies on a feature this runtime does not support.
    #[error("The effect uses an unsupported feature: {reason}")]
    NotImplemented { reason: &'static str },

    #[error("The device failed to create {what}: {source}")]
    ResourceCreationFailed {
        what: &'static str,
        #[source]
        source: DeviceError,
    },

    #[error("Invalid call: {reason}")]
    InvalidCall { reason: String },

    #[error("There is no {kind} called {name:?}")]
    NotFound { kind: &'static str, name: String },

    /// An exactly reserved arena was not filled exactly, the size computation and the copy
    /// disagree.
    #[error("Arena layout mismatch: reserved {reserved} bytes but filled {filled}")]
    LayoutMismatch { reserved: usize, filled: usize },
}

impl From<ParserError> for EffectError {
    fn from(value: ParserError) -> Self {
        match value {
            ParserError::NotImplemented { reason } => EffectError::NotImplemented { reason },
            source => EffectError::MalformedInput { source },
        }
    }
}

/// Shorthand for invariant violations found while building the graph.
pub(crate) fn malformed(reason: &'static str) -> EffectError {
    EffectError::MalformedInput {
        source: ParserError::FormatError { reason },
    }
}

pub(crate) fn invalid_call(reason: impl Into<String>) -> EffectError {
    EffectError::InvalidCall { reason: reason.into() }
}

pub(crate) fn not_found(kind: &'static str, name: impl Into<String>) -> EffectError {
    EffectError::NotFound {
        kind,
        name: name.into(),
    }
}
