//! Cardigann-style indexer definitions and a multi-indexer torrent search
//! aggregator.
//!
//! Sites are described by YAML definitions loaded into a
//! [`DefinitionStore`]; each configured site becomes a
//! [`CardigannIndexer`], and the [`IndexerManager`] runs one query across
//! all of them and returns a merged, sorted, paginated result list.

pub mod cli;
pub mod config;
pub mod indexer;

pub use config::{Config, IndexerInstanceConfig};
pub use indexer::cardigann::CardigannIndexer;
pub use indexer::cardigann::store::DefinitionStore;
pub use indexer::manager::{IndexerManager, ManagerOptions, sort_releases};
pub use indexer::{
    AggregateError, Indexer, ReleaseInfo, SearchError, SearchRequest, SearchResponse, SortField,
    SortOrder, TorznabQuery,
};
