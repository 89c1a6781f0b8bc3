//! Indexer abstraction and the search pipeline around it
//!
//! An [`Indexer`] answers a [`TorznabQuery`] with normalized releases. The
//! declarative engine in [`cardigann`] implements it for every loaded
//! definition; the [`manager::IndexerManager`] fans queries out across all
//! of them and does not care which implementation it is talking to.

pub mod cardigann;
pub mod categories;
pub mod error;
pub mod http;
pub mod manager;
pub mod types;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use error::{AggregateError, DefinitionError, ExtractionError, FetchError, SearchError};
pub use types::*;

/// Privacy class of a tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TrackerType {
    #[default]
    Public,
    SemiPrivate,
    Private,
}

impl TrackerType {
    /// Private trackers never get synthesized magnets
    pub fn is_private(&self) -> bool {
        matches!(self, TrackerType::Private)
    }
}

impl std::str::FromStr for TrackerType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" => Ok(TrackerType::Public),
            "semi-private" | "semiprivate" | "semi-public" => Ok(TrackerType::SemiPrivate),
            "private" => Ok(TrackerType::Private),
            _ => Err(anyhow::anyhow!("Unknown tracker type: {}", s)),
        }
    }
}

impl std::fmt::Display for TrackerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackerType::Public => write!(f, "public"),
            TrackerType::SemiPrivate => write!(f, "semi-private"),
            TrackerType::Private => write!(f, "private"),
        }
    }
}

/// A searchable indexer instance
#[async_trait]
pub trait Indexer: Send + Sync {
    /// Instance id (unique among configured indexers)
    fn id(&self) -> &str;

    /// Display name
    fn name(&self) -> &str;

    /// Implementation style
    fn indexer_type(&self) -> IndexerType;

    /// Privacy class
    fn tracker_type(&self) -> TrackerType;

    /// Sort priority, lower sorts first
    fn priority(&self) -> i32 {
        DEFAULT_PRIORITY
    }

    /// Declared capabilities and category table
    fn capabilities(&self) -> &TorznabCapabilities;

    /// Run one query against the site
    async fn search(&self, query: &TorznabQuery) -> Result<Vec<ReleaseInfo>, SearchError>;

    /// Check the site answers a blank query
    async fn test_connection(&self) -> Result<bool, SearchError> {
        self.search(&TorznabQuery::search("")).await.map(|_| true)
    }
}
