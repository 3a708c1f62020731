//! Error types for sqltpl.

use thiserror::Error;

use crate::fmt::FormatError;

/// The main error type for sqltpl operations.
///
/// Everything except [`SqltplError::Scan`], [`SqltplError::Grammar`],
/// [`SqltplError::Config`] and [`SqltplError::Io`] is scoped to a single literal: the engine turns it
/// into a diagnostic and moves on to the next literal.
#[derive(Debug, Error)]
pub enum SqltplError {
    /// A static segment already contains the slot sentinel.
    #[error("Literal segment {segment} contains the reserved slot marker")]
    SentinelCollision { segment: usize },

    /// The formatter dropped or duplicated slot sentinels.
    #[error("Formatter changed the expression slots: expected {expected}, found {found}")]
    SentinelCountMismatch { expected: usize, found: usize },

    /// The query formatter rejected the text.
    #[error(transparent)]
    Format(#[from] FormatError),

    /// Failed to scan the source file.
    #[error("Scan error at {line}:{column}: {message}")]
    Scan {
        line: usize,
        column: usize,
        message: String,
    },

    /// Formatting kept changing the literal on every `fix` pass.
    #[error("Literal did not settle after {passes} formatting passes")]
    NotConverged { passes: usize },

    /// The host-language grammar could not be loaded.
    #[error("Grammar error: {0}")]
    Grammar(String),

    /// A literal descriptor broke the segment/slot invariant.
    #[error("Invalid literal: {0}")]
    InvalidLiteral(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SqltplError {
    /// Create a scan error at the given position.
    pub fn scan(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self::Scan {
            line,
            column,
            message: message.into(),
        }
    }

    /// Whether the error only concerns one literal.
    pub fn is_literal_scoped(&self) -> bool {
        matches!(
            self,
            Self::SentinelCollision { .. }
                | Self::SentinelCountMismatch { .. }
                | Self::Format(_)
                | Self::NotConverged { .. }
                | Self::InvalidLiteral(_)
        )
    }
}

/// Result type alias for sqltpl operations.
pub type SqltplResult<T> = Result<T, SqltplError>;
