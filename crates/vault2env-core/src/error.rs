//! Error types for the redaction core

use thiserror::Error;

use crate::process::StreamKind;

/// Errors raised by a [`crate::RedactingWriter`]
#[derive(Error, Debug)]
pub enum RedactError {
    /// Write or close attempted after the writer was closed
    #[error("write on closed writer")]
    Closed,

    /// The destination rejected sanitized data
    #[error("writing sanitized data to destination: {0}")]
    Io(#[from] std::io::Error),
}

impl RedactError {
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Errors raised while pumping one child output stream
#[derive(Error, Debug)]
pub enum PumpError {
    #[error("redacting {stream}: {source}")]
    Redact {
        stream: StreamKind,
        #[source]
        source: RedactError,
    },

    #[error("{stream} pump task aborted: {reason}")]
    Aborted { stream: StreamKind, reason: String },
}

impl PumpError {
    /// The stream this failure belongs to
    pub fn stream(&self) -> StreamKind {
        match self {
            Self::Redact { stream, .. } | Self::Aborted { stream, .. } => *stream,
        }
    }
}
