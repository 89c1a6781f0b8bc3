//! Core types for the indexer system
//!
//! These types are modeled after the Torznab specification: a query goes in,
//! a list of [`ReleaseInfo`] comes out.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::categories::CategoryMapping;

/// Default priority for indexers that do not declare one
pub const DEFAULT_PRIORITY: i32 = 25;

/// The type of indexer implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IndexerType {
    /// Declarative Cardigann-style definition
    #[default]
    Cardigann,
    /// Hand written integration
    Native,
}

impl std::fmt::Display for IndexerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexerType::Cardigann => write!(f, "cardigann"),
            IndexerType::Native => write!(f, "native"),
        }
    }
}

/// Type of search query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    #[default]
    Search,
    TvSearch,
    MovieSearch,
}

impl std::fmt::Display for QueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryType::Search => write!(f, "search"),
            QueryType::TvSearch => write!(f, "tv-search"),
            QueryType::MovieSearch => write!(f, "movie-search"),
        }
    }
}

/// What an indexer can do, as declared by its definition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TorznabCapabilities {
    /// Search modes and their supported parameters (e.g. `tv-search: [q, season, ep]`)
    pub modes: Vec<(String, Vec<String>)>,

    /// Whether the site accepts raw query text
    pub supports_raw_search: bool,

    /// Category mappings (site category -> Torznab category)
    pub categories: Vec<CategoryMapping>,
}

impl TorznabCapabilities {
    pub fn new() -> Self {
        Self {
            modes: vec![("search".to_string(), vec!["q".to_string()])],
            ..Default::default()
        }
    }

    pub fn add_category(&mut self, tracker_id: &str, torznab_cat: i32, desc: &str) {
        self.categories
            .push(CategoryMapping::new(tracker_id, torznab_cat, desc));
    }

    /// Whether a search mode is declared
    pub fn supports_mode(&self, mode: &str) -> bool {
        self.modes.iter().any(|(m, _)| m == mode)
    }

    /// Map a site category id to Torznab categories
    pub fn map_tracker_to_torznab(&self, tracker_id: &str) -> Vec<i32> {
        let tracker_id = tracker_id.trim();
        self.categories
            .iter()
            .filter(|c| c.tracker_id.eq_ignore_ascii_case(tracker_id))
            .map(|c| c.torznab_cat)
            .collect()
    }

    /// Map Torznab categories to site category ids
    pub fn map_torznab_to_tracker(&self, cats: &[i32]) -> Vec<String> {
        if cats.is_empty() {
            return vec![];
        }

        // First-seen order; one site id can back several Torznab codes
        let mut seen = HashSet::new();
        self.categories
            .iter()
            .filter(|c| {
                cats.contains(&c.torznab_cat)
                    || cats
                        .iter()
                        .any(|cat| cat % 1000 == 0 && c.torznab_cat / 1000 == cat / 1000)
            })
            .map(|c| c.tracker_id.as_str())
            .filter(|id| seen.insert(*id))
            .map(str::to_string)
            .collect()
    }
}

/// A search query in Torznab format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TorznabQuery {
    /// The type of search
    pub query_type: QueryType,

    /// Free-text search term
    pub search_term: Option<String>,

    /// Categories to search in (Torznab category IDs)
    pub categories: Vec<i32>,

    /// Maximum number of results requested from the site
    pub limit: Option<i32>,

    /// Offset requested from the site
    pub offset: Option<i32>,

    /// Season number
    pub season: Option<i32>,
    /// Episode number/identifier
    pub episode: Option<String>,
    /// IMDB ID (e.g., "tt1234567")
    pub imdb_id: Option<String>,
    /// Release year
    pub year: Option<i32>,
}

impl TorznabQuery {
    /// Create a new search query
    pub fn search(term: &str) -> Self {
        Self {
            query_type: QueryType::Search,
            search_term: Some(term.to_string()),
            ..Default::default()
        }
    }

    /// Add categories to the query
    pub fn with_categories(mut self, cats: Vec<i32>) -> Self {
        self.categories = cats;
        self
    }

    /// Add season/episode to a TV search
    pub fn with_season_episode(mut self, season: i32, episode: Option<&str>) -> Self {
        self.query_type = QueryType::TvSearch;
        self.season = Some(season);
        self.episode = episode.map(|s| s.to_string());
        self
    }

    /// Add IMDB ID to the query
    pub fn with_imdb(mut self, imdb_id: &str) -> Self {
        self.imdb_id = Some(imdb_id.to_string());
        self
    }

    /// The keyword string sent to sites: search term plus episode marker
    pub fn keywords(&self) -> String {
        let mut parts = vec![];

        if let Some(ref term) = self.search_term {
            let term = term.trim();
            if !term.is_empty() {
                parts.push(term.to_string());
            }
        }

        if let Some(ep) = self.get_episode_string() {
            parts.push(ep);
        }

        parts.join(" ")
    }

    /// Get the episode search string (e.g., "S01E05")
    pub fn get_episode_string(&self) -> Option<String> {
        self.season.map(|s| {
            if let Some(ref ep) = self.episode {
                format!("S{:02}E{}", s, ep)
            } else {
                format!("S{:02}", s)
            }
        })
    }

    /// Get IMDB ID without the "tt" prefix
    pub fn imdb_id_short(&self) -> Option<String> {
        self.imdb_id
            .as_ref()
            .map(|id| id.trim_start_matches("tt").to_string())
    }
}

/// One normalized search result
///
/// Produced by the result normalizer and never mutated afterwards, except
/// for the indexer attribution the aggregator stamps on before caching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    /// Release title
    pub title: String,

    /// Unique identifier (details URL, falling back to the download link)
    pub guid: String,

    /// Direct download link (torrent/nzb file)
    pub link: Option<String>,

    /// Magnet URI, given by the site or synthesized from the info hash
    pub magnet_uri: Option<String>,

    /// InfoHash
    pub info_hash: Option<String>,

    /// Details page URL
    pub details: Option<String>,

    /// Preferred download reference: magnet first, then the direct link
    pub download_url: String,

    /// Publication date
    pub publish_date: DateTime<Utc>,

    /// Whole days since publication
    pub age_days: i64,

    /// Canonical Torznab category codes (specific code plus its parent)
    pub categories: Vec<i32>,

    /// File size in bytes
    pub size: u64,

    /// Human readable size ("1.50 GB")
    pub size_formatted: String,

    pub seeders: u32,
    pub leechers: u32,
    pub grabs: u32,

    pub description: Option<String>,

    /// IMDB ID as given by the site
    pub imdb: Option<String>,

    /// Internal release of the site's own group
    pub internal: bool,

    /// Download volume factor (0 = freeleech, 1 = normal)
    pub download_volume_factor: f64,
    /// Upload volume factor (usually 1, can be 2 for double upload)
    pub upload_volume_factor: f64,

    /// The indexer that found this release
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexer_name: Option<String>,
    pub indexer_priority: i32,
}

impl ReleaseInfo {
    /// Create a new release with minimal info
    pub fn new(title: String, guid: String, publish_date: DateTime<Utc>) -> Self {
        Self {
            title,
            guid,
            publish_date,
            link: None,
            magnet_uri: None,
            info_hash: None,
            details: None,
            download_url: String::new(),
            age_days: 0,
            categories: vec![],
            size: 0,
            size_formatted: "0 B".to_string(),
            seeders: 0,
            leechers: 0,
            grabs: 0,
            description: None,
            imdb: None,
            internal: false,
            download_volume_factor: 1.0,
            upload_volume_factor: 1.0,
            indexer_id: None,
            indexer_name: None,
            indexer_priority: DEFAULT_PRIORITY,
        }
    }

    /// Check if this is a freeleech release
    pub fn is_freeleech(&self) -> bool {
        self.download_volume_factor == 0.0
    }

    /// Seeders plus leechers
    pub fn peers(&self) -> u32 {
        self.seeders.saturating_add(self.leechers)
    }

    /// First (most specific) category code, `8000` when uncategorized
    pub fn primary_category(&self) -> i32 {
        self.categories.first().copied().unwrap_or(8000)
    }
}

impl Default for ReleaseInfo {
    fn default() -> Self {
        Self::new(String::new(), String::new(), Utc::now())
    }
}

/// Field a result list can be sorted by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    Age,
    Title,
    Size,
    #[default]
    Seeders,
    Leechers,
    Grabs,
    Category,
    Indexer,
}

impl std::str::FromStr for SortField {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "age" | "date" | "publishdate" => Ok(SortField::Age),
            "title" | "name" => Ok(SortField::Title),
            "size" => Ok(SortField::Size),
            "seeders" | "seeds" => Ok(SortField::Seeders),
            "leechers" | "peers" => Ok(SortField::Leechers),
            "grabs" => Ok(SortField::Grabs),
            "category" => Ok(SortField::Category),
            "indexer" => Ok(SortField::Indexer),
            _ => Err(anyhow::anyhow!("Unknown sort field: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl std::str::FromStr for SortOrder {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortOrder::Asc),
            "desc" | "descending" => Ok(SortOrder::Desc),
            _ => Err(anyhow::anyhow!("Unknown sort order: {}", s)),
        }
    }
}

/// An aggregate search request as received from the API layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    /// Indexer ids to search; empty means every enabled indexer
    #[serde(default)]
    pub indexer_ids: Vec<String>,
    /// Torznab category filter; empty means no filter
    #[serde(default)]
    pub category_ids: Vec<i32>,
    #[serde(default)]
    pub sort_by: SortField,
    #[serde(default)]
    pub sort_order: SortOrder,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
    /// Bypass the result cache for this call
    #[serde(default)]
    pub fresh: bool,
}

fn default_limit() -> usize {
    100
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            indexer_ids: vec![],
            category_ids: vec![],
            sort_by: SortField::default(),
            sort_order: SortOrder::default(),
            limit: default_limit(),
            offset: 0,
            fresh: false,
        }
    }

    pub fn with_indexers(mut self, ids: &[&str]) -> Self {
        self.indexer_ids = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_categories(mut self, cats: Vec<i32>) -> Self {
        self.category_ids = cats;
        self
    }

    pub fn sorted_by(mut self, field: SortField, order: SortOrder) -> Self {
        self.sort_by = field;
        self.sort_order = order;
        self
    }
}

/// Per-indexer outcome of one aggregate search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerSummary {
    pub indexer_id: String,
    pub indexer_name: String,
    pub result_count: usize,
    pub elapsed_ms: u64,
    pub from_cache: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A per-indexer failure surfaced to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerFailure {
    pub indexer_id: String,
    pub indexer_name: String,
    pub message: String,
}

/// Paginated, filtered and sorted response for one aggregate search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<ReleaseInfo>,
    /// Result count after category filtering, before pagination
    pub total: usize,
    pub indexers: Vec<IndexerSummary>,
    pub errors: Vec<IndexerFailure>,
    pub elapsed_ms: u64,
    pub cached: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords_include_episode() {
        let q = TorznabQuery::search("The Expanse").with_season_episode(2, Some("05"));
        assert_eq!(q.keywords(), "The Expanse S02E05");
        assert_eq!(q.query_type, QueryType::TvSearch);
    }

    #[test]
    fn test_map_torznab_to_tracker_expands_parents() {
        let mut caps = TorznabCapabilities::new();
        caps.add_category("1", 2040, "Movies HD");
        caps.add_category("2", 5040, "TV HD");
        caps.add_category("3", 2030, "Movies SD");

        assert_eq!(caps.map_torznab_to_tracker(&[2000]), vec!["1", "3"]);
        assert_eq!(caps.map_torznab_to_tracker(&[5040]), vec!["2"]);
        assert!(caps.map_torznab_to_tracker(&[]).is_empty());
    }

    #[test]
    fn test_map_torznab_to_tracker_dedupes_non_adjacent_ids() {
        let mut caps = TorznabCapabilities::new();
        caps.add_category("1", 2040, "Movies HD");
        caps.add_category("2", 5040, "TV HD");
        caps.add_category("1", 2045, "Movies UHD");
        caps.add_category("3", 2030, "Movies SD");

        assert_eq!(caps.map_torznab_to_tracker(&[2000, 5000]), vec!["1", "2", "3"]);
        assert_eq!(caps.map_torznab_to_tracker(&[2040, 2045]), vec!["1"]);
    }

    #[test]
    fn test_sort_field_parsing() {
        assert_eq!("Seeders".parse::<SortField>().unwrap(), SortField::Seeders);
        assert_eq!("date".parse::<SortField>().unwrap(), SortField::Age);
        assert!("bogus".parse::<SortField>().is_err());
        assert_eq!("ASC".parse::<SortOrder>().unwrap(), SortOrder::Asc);
    }
}
