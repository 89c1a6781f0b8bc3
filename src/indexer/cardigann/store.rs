//! On-disk definition store
//!
//! Every `.yml`/`.yaml` file under the root is loaded and validated. Bad
//! files are counted and logged, never fatal. The active set is replaced as
//! a whole on [`DefinitionStore::reload`]; searches that already hold the
//! previous set keep using it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use walkdir::WalkDir;

use super::definition::{self, Definition};
use crate::indexer::TrackerType;
use crate::indexer::error::DefinitionError;

/// A file that did not make it into the active set
#[derive(Debug, Clone, Serialize)]
pub struct LoadFailure {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DefinitionStats {
    pub total: usize,
    pub public: usize,
    pub semi_private: usize,
    pub private: usize,
    pub failed: usize,
}

/// One immutable generation of loaded definitions
#[derive(Debug, Default)]
pub struct DefinitionSet {
    definitions: Vec<Arc<Definition>>,
    failures: Vec<LoadFailure>,
    loaded_at: Option<DateTime<Utc>>,
}

impl DefinitionSet {
    /// Build a set from already parsed definitions. Invalid ones and
    /// duplicate ids are recorded as failures.
    pub fn from_definitions(definitions: Vec<Definition>) -> Self {
        let mut set = DefinitionSet {
            loaded_at: Some(Utc::now()),
            ..Default::default()
        };
        for def in definitions {
            let origin = format!("<memory:{}>", def.id);
            match definition::validate(&def) {
                Ok(()) => set.insert(def, &origin),
                Err(reasons) => set.failures.push(LoadFailure {
                    path: origin,
                    reason: reasons.join("; "),
                }),
            }
        }
        set.definitions.sort_by(|a, b| a.id.cmp(&b.id));
        set
    }

    /// Load every definition file below `root`
    pub fn load_dir(root: &Path) -> Self {
        let mut set = DefinitionSet {
            loaded_at: Some(Utc::now()),
            ..Default::default()
        };

        if !root.is_dir() {
            tracing::warn!(path = %root.display(), "Definitions directory does not exist");
            return set;
        }

        let mut files: Vec<PathBuf> = WalkDir::new(root)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| {
                p.is_file()
                    && p.extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|e| matches!(e.to_lowercase().as_str(), "yml" | "yaml"))
            })
            .collect();
        files.sort();

        for path in files {
            let path_display = path.display().to_string();
            match load_file(&path) {
                Ok(def) => set.insert(def, &path_display),
                Err(e) => {
                    tracing::warn!(path = %path_display, error = %e, "Skipping invalid definition");
                    set.failures.push(LoadFailure {
                        path: path_display,
                        reason: e.to_string(),
                    });
                }
            }
        }

        set.definitions.sort_by(|a, b| a.id.cmp(&b.id));
        tracing::info!(
            path = %root.display(),
            loaded = set.definitions.len(),
            failed = set.failures.len(),
            "Loaded indexer definitions"
        );
        set
    }

    fn insert(&mut self, def: Definition, origin: &str) {
        if self.definitions.iter().any(|d| d.id == def.id) {
            tracing::warn!(id = %def.id, path = %origin, "Duplicate definition id, keeping the first");
            self.failures.push(LoadFailure {
                path: origin.to_string(),
                reason: format!("duplicate definition id '{}'", def.id),
            });
            return;
        }
        self.definitions.push(Arc::new(def));
    }

    pub fn definitions(&self) -> &[Arc<Definition>] {
        &self.definitions
    }

    pub fn failures(&self) -> &[LoadFailure] {
        &self.failures
    }

    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.loaded_at
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Definition>> {
        self.definitions
            .iter()
            .find(|d| d.id.eq_ignore_ascii_case(id))
            .cloned()
    }
}

fn load_file(path: &Path) -> Result<Definition, DefinitionError> {
    let source = std::fs::read_to_string(path).map_err(|source| DefinitionError::Io {
        path: path.display().to_string(),
        source,
    })?;
    definition::load(&source)
}

/// Shared handle to the active definition set
pub struct DefinitionStore {
    root: Option<PathBuf>,
    active: RwLock<Arc<DefinitionSet>>,
}

impl DefinitionStore {
    /// Load `root` and make it the active set
    pub fn open(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let set = DefinitionSet::load_dir(&root);
        Self {
            root: Some(root),
            active: RwLock::new(Arc::new(set)),
        }
    }

    /// A store with no backing directory
    pub fn in_memory(definitions: Vec<Definition>) -> Self {
        Self {
            root: None,
            active: RwLock::new(Arc::new(DefinitionSet::from_definitions(definitions))),
        }
    }

    /// The current generation; cheap, the lock is held only to clone the Arc
    pub fn snapshot(&self) -> Arc<DefinitionSet> {
        self.active.read().clone()
    }

    /// Re-read the directory and swap the whole set in
    pub fn reload(&self) -> Arc<DefinitionSet> {
        let Some(root) = &self.root else {
            return self.snapshot();
        };
        let set = Arc::new(DefinitionSet::load_dir(root));
        *self.active.write() = set.clone();
        set
    }

    /// Replace the active set directly
    pub fn replace(&self, set: DefinitionSet) {
        *self.active.write() = Arc::new(set);
    }

    pub fn get(&self, id: &str) -> Option<Arc<Definition>> {
        self.snapshot().get(id)
    }

    /// Case-insensitive match on id, name or description
    pub fn search(&self, text: &str) -> Vec<Arc<Definition>> {
        let needle = text.trim().to_lowercase();
        self.snapshot()
            .definitions()
            .iter()
            .filter(|d| {
                needle.is_empty()
                    || d.id.to_lowercase().contains(&needle)
                    || d.name.to_lowercase().contains(&needle)
                    || d.description
                        .as_deref()
                        .is_some_and(|desc| desc.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> DefinitionStats {
        let set = self.snapshot();
        let mut stats = DefinitionStats {
            total: set.len(),
            failed: set.failures().len(),
            ..Default::default()
        };
        for def in set.definitions() {
            match def.tracker_type() {
                TrackerType::Public => stats.public += 1,
                TrackerType::SemiPrivate => stats.semi_private += 1,
                TrackerType::Private => stats.private += 1,
            }
        }
        stats
    }
}

impl std::fmt::Debug for DefinitionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefinitionStore")
            .field("root", &self.root)
            .field("definitions", &self.snapshot().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn definition_yaml(id: &str, kind: &str) -> String {
        format!(
            "id: {id}\nname: {id} site\ndescription: test site {id}\ntype: {kind}\nlinks: [https://{id}.example/]\nsearch:\n  path: /search\n  rows: {{selector: tr}}\n  fields: {{title: a}}\n"
        )
    }

    #[test]
    fn test_load_dir_counts_failures() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("alpha.yml"), definition_yaml("alpha", "public")).unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested/beta.yaml"), definition_yaml("beta", "private")).unwrap();
        fs::write(dir.path().join("broken.yml"), "id: [unclosed").unwrap();
        fs::write(dir.path().join("nolinks.yml"), "id: nolinks\nname: No links\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let set = DefinitionSet::load_dir(dir.path());
        let ids: Vec<_> = set.definitions().iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "beta"]);
        assert_eq!(set.failures().len(), 2);
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let set = DefinitionSet::load_dir(Path::new("/definitely/not/here"));
        assert!(set.is_empty());
        assert!(set.failures().is_empty());
    }

    #[test]
    fn test_duplicate_ids_keep_first() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.yml"), definition_yaml("same", "public")).unwrap();
        fs::write(dir.path().join("b.yml"), definition_yaml("same", "private")).unwrap();

        let set = DefinitionSet::load_dir(dir.path());
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("same").unwrap().tracker_type(), TrackerType::Public);
        assert_eq!(set.failures().len(), 1);
    }

    #[test]
    fn test_reload_swaps_whole_set() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("alpha.yml"), definition_yaml("alpha", "public")).unwrap();

        let store = DefinitionStore::open(dir.path());
        let before = store.snapshot();
        assert_eq!(before.len(), 1);

        fs::write(dir.path().join("beta.yml"), definition_yaml("beta", "semi-private")).unwrap();
        store.reload();

        assert_eq!(before.len(), 1);
        assert_eq!(store.snapshot().len(), 2);
        assert!(store.get("BETA").is_some());

        let stats = store.stats();
        assert_eq!(stats.public, 1);
        assert_eq!(stats.semi_private, 1);
    }

    #[test]
    fn test_search_by_text() {
        let defs = vec![
            definition::load(&definition_yaml("linuxtracker", "public")).unwrap(),
            definition::load(&definition_yaml("moviesite", "private")).unwrap(),
        ];
        let store = DefinitionStore::in_memory(defs);
        assert_eq!(store.search("linux").len(), 1);
        assert_eq!(store.search("site").len(), 2);
        assert_eq!(store.search("").len(), 2);
    }
}
