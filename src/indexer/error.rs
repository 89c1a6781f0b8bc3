//! Error taxonomy for definition loading, fetching and searching
//!
//! Template gaps and filter failures never surface here: they are logged and
//! degrade to an empty string or an identity transform.

use std::time::Duration;

use thiserror::Error;

/// A definition document could not be turned into an active definition.
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse definition: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("definition '{id}' is invalid: {}", reasons.join("; "))]
    Invalid { id: String, reasons: Vec<String> },
}

/// One HTTP attempt against one link failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("challenge page returned by {0}")]
    Challenge(String),

    #[error("challenge solver failed: {0}")]
    Solver(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0}")]
    Other(String),
}

impl FetchError {
    /// Failures that justify moving on to the next mirror link
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout(_)
            | FetchError::Connect(_)
            | FetchError::Challenge(_)
            | FetchError::Solver(_) => true,
            FetchError::Status(code) => *code == 404 || *code >= 500,
            FetchError::InvalidRequest(_) | FetchError::Other(_) => false,
        }
    }
}

/// A field could not be extracted from a row.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtractionError {
    #[error("field '{field}' matched nothing")]
    Miss { field: String },

    #[error("invalid selector '{selector}': {reason}")]
    Selector { selector: String, reason: String },
}

/// One indexer's contribution to a search failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SearchError {
    #[error("all {attempts} link(s) failed, last error: {last}")]
    LinksExhausted { attempts: usize, last: FetchError },

    #[error("definition declares no links")]
    NoLinks,

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("malformed {kind} response: {reason}")]
    Malformed { kind: &'static str, reason: String },

    #[error("search timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Other(String),
}

/// The aggregate search request itself was unusable.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AggregateError {
    #[error("search query text is required")]
    EmptyQuery,
}
