//! Hierarchical configuration resolution
//!
//! Maps a proto file to the nearest enclosing configuration whose scope
//! contains it, walking candidate files from the file's directory up to the
//! filesystem root and finally the global fallback in the store home.

use crate::config::{candidate_paths, load_config_items, ConfigItem};
use crate::error::{ProtopinError, ProtopinResult};
use crate::fsx;
use crate::store::ArtifactStore;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Resolves proto files to their governing configuration
pub struct ConfigResolver {
    global_config: PathBuf,
    cache: RwLock<HashMap<PathBuf, Arc<Vec<ConfigItem>>>>,
}

impl ConfigResolver {
    /// Create a resolver whose global fallback lives in `store`
    pub fn new(store: &ArtifactStore) -> Self {
        Self {
            global_config: store.global_config_path(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Find the nearest configuration whose scope contains `source`.
    ///
    /// Candidates are checked nearest-to-farthest; within one file,
    /// documents are checked in declaration order. A scope matches when the
    /// cleaned join of the candidate's directory and the scope is a
    /// component-wise prefix of `source`.
    pub fn resolve(&self, source: &Path) -> ProtopinResult<ConfigItem> {
        let source_dir = source.parent().unwrap_or_else(|| Path::new("."));
        for candidate in candidate_paths(source_dir, &self.global_config) {
            let items = self.load_cached(&candidate)?;
            let candidate_dir = candidate.parent().unwrap_or_else(|| Path::new("."));
            for item in items.iter() {
                for scope in &item.config().scopes {
                    let prefix = fsx::clean_path(&candidate_dir.join(scope));
                    if source.starts_with(&prefix) {
                        debug!(source = %source.display(), config = %item.id(), "resolved configuration");
                        return Ok(item.clone());
                    }
                }
            }
        }
        Err(ProtopinError::ConfigNotFound(source.to_path_buf()))
    }

    /// Load a candidate file once, caching the parsed documents.
    ///
    /// Missing files and directories cache to an empty list so repeated
    /// lookups do not stat them again. Parse failures propagate and are not
    /// cached. The whole map is locked across a miss so concurrent
    /// resolution parses each file at most once.
    fn load_cached(&self, path: &Path) -> ProtopinResult<Arc<Vec<ConfigItem>>> {
        {
            let map = self.cache.read().unwrap_or_else(|p| p.into_inner());
            if let Some(hit) = map.get(path) {
                return Ok(Arc::clone(hit));
            }
        }

        let mut map = self.cache.write().unwrap_or_else(|p| p.into_inner());
        if let Some(hit) = map.get(path) {
            return Ok(Arc::clone(hit));
        }
        let items = if fsx::is_file(path) {
            load_config_items(path)?
        } else {
            Vec::new()
        };
        let items = Arc::new(items);
        map.insert(path.to_path_buf(), Arc::clone(&items));
        Ok(items)
    }
}
