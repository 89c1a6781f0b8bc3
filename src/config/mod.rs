//! Application configuration management

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};

use crate::indexer::DEFAULT_PRIORITY;
use crate::indexer::http::DEFAULT_USER_AGENT;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the definition tree
    pub definitions_path: PathBuf,

    /// Optional YAML file listing configured indexer instances
    pub indexers_path: Option<PathBuf>,

    /// Per-indexer deadline within one aggregate search
    pub search_timeout: Duration,

    /// Per-link HTTP attempt timeout
    pub request_timeout: Duration,

    /// Search cache time-to-live
    pub cache_ttl: Duration,

    /// Max cache entries before the oldest is evicted
    pub cache_capacity: usize,

    /// FlareSolverr endpoint
    pub flaresolverr_url: String,

    /// Whether challenged links are handed to FlareSolverr
    pub flaresolverr_enabled: bool,

    /// Browser user agent sent with every fetch
    pub user_agent: String,

    /// `json` for JSON log lines, anything else for plain text
    pub log_format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            definitions_path: PathBuf::from("./definitions"),
            indexers_path: None,
            search_timeout: Duration::from_secs(45),
            request_timeout: Duration::from_secs(20),
            cache_ttl: Duration::from_secs(120),
            cache_capacity: 100,
            flaresolverr_url: "http://localhost:8191".to_string(),
            flaresolverr_enabled: false,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            log_format: "text".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();

        Ok(Self {
            definitions_path: env::var("DEFINITIONS_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.definitions_path),

            indexers_path: env::var("INDEXERS_PATH")
                .ok()
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),

            search_timeout: secs_var("SEARCH_TIMEOUT_SECS", defaults.search_timeout)?,

            request_timeout: secs_var("REQUEST_TIMEOUT_SECS", defaults.request_timeout)?,

            cache_ttl: secs_var("CACHE_TTL_SECS", defaults.cache_ttl)?,

            cache_capacity: match env::var("CACHE_CAPACITY") {
                Ok(v) => v.trim().parse().context("Invalid CACHE_CAPACITY")?,
                Err(_) => defaults.cache_capacity,
            },

            flaresolverr_url: env::var("FLARESOLVERR_URL").unwrap_or(defaults.flaresolverr_url),

            flaresolverr_enabled: env::var("FLARESOLVERR_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),

            user_agent: env::var("USER_AGENT")
                .ok()
                .filter(|ua| !ua.trim().is_empty())
                .unwrap_or(defaults.user_agent),

            log_format: env::var("LOG_FORMAT").unwrap_or(defaults.log_format),
        })
    }

    /// Configured indexer instances, or `None` when no file is set
    pub fn load_instances(&self) -> Result<Option<Vec<IndexerInstanceConfig>>> {
        match &self.indexers_path {
            Some(path) => load_instances(path).map(Some),
            None => Ok(None),
        }
    }
}

fn secs_var(name: &str, default: Duration) -> Result<Duration> {
    match env::var(name) {
        Ok(v) => {
            let secs: u64 = v.trim().parse().with_context(|| format!("Invalid {}", name))?;
            Ok(Duration::from_secs(secs))
        }
        Err(_) => Ok(default),
    }
}

/// One configured indexer: a definition plus user overrides
#[derive(Debug, Clone, Deserialize)]
pub struct IndexerInstanceConfig {
    pub id: String,
    /// Definition id; defaults to the instance id
    #[serde(default)]
    pub definition: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default, deserialize_with = "scalar_settings")]
    pub settings: BTreeMap<String, String>,
}

impl IndexerInstanceConfig {
    /// An enabled instance of `definition` with default settings
    pub fn for_definition(definition: &str) -> Self {
        Self {
            id: definition.to_string(),
            definition: None,
            name: None,
            enabled: true,
            priority: DEFAULT_PRIORITY,
            settings: BTreeMap::new(),
        }
    }

    pub fn definition_id(&self) -> &str {
        self.definition.as_deref().unwrap_or(&self.id)
    }

    pub fn settings_list(&self) -> Vec<(String, String)> {
        self.settings
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

fn default_enabled() -> bool {
    true
}

fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

/// Settings may be written as YAML booleans or numbers; keep them as text
fn scalar_settings<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<BTreeMap<String, serde_yaml::Value>>::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| {
            let text = match v {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Bool(b) => b.to_string(),
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Null => String::new(),
                other => serde_yaml::to_string(&other).unwrap_or_default().trim().to_string(),
            };
            (k, text)
        })
        .collect())
}

#[derive(Debug, Deserialize)]
struct InstancesFile {
    #[serde(default)]
    indexers: Vec<IndexerInstanceConfig>,
}

/// Read an instance file: either a top-level list or an `indexers:` key
pub fn load_instances(path: &Path) -> Result<Vec<IndexerInstanceConfig>> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read indexer config {}", path.display()))?;
    parse_instances(&source).with_context(|| format!("Invalid indexer config {}", path.display()))
}

pub fn parse_instances(source: &str) -> Result<Vec<IndexerInstanceConfig>> {
    if let Ok(list) = serde_yaml::from_str::<Vec<IndexerInstanceConfig>>(source) {
        return Ok(list);
    }
    let file: InstancesFile = serde_yaml::from_str(source)?;
    Ok(file.indexers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_instances_list() {
        let yaml = r#"
- id: linux
  definition: linuxtracker
  priority: 10
  settings:
    freeleech: true
    sort: seeders
    pages: 2
- id: yts
  enabled: false
"#;
        let instances = parse_instances(yaml).unwrap();
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[0].definition_id(), "linuxtracker");
        assert_eq!(instances[0].priority, 10);
        assert_eq!(instances[0].settings.get("freeleech").map(String::as_str), Some("true"));
        assert_eq!(instances[0].settings.get("pages").map(String::as_str), Some("2"));
        assert_eq!(instances[1].definition_id(), "yts");
        assert_eq!(instances[1].priority, DEFAULT_PRIORITY);
        assert!(!instances[1].enabled);
    }

    #[test]
    fn test_parse_instances_keyed() {
        let yaml = "indexers:\n  - id: eztv\n    name: EZTV Mirror\n";
        let instances = parse_instances(yaml).unwrap();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].name.as_deref(), Some("EZTV Mirror"));
        assert!(instances[0].enabled);
    }

    #[test]
    fn test_load_instances_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("indexers.yml");
        std::fs::write(&path, "- id: one\n").unwrap();

        let config = Config {
            indexers_path: Some(path),
            ..Config::default()
        };
        let instances = config.load_instances().unwrap().unwrap();
        assert_eq!(instances[0].id, "one");

        let none = Config::default().load_instances().unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.search_timeout, Duration::from_secs(45));
        assert_eq!(config.cache_ttl, Duration::from_secs(120));
        assert_eq!(config.cache_capacity, 100);
        assert!(!config.flaresolverr_enabled);
    }
}
