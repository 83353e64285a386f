//! Configuration files: loading, saving, candidate lookup order

pub mod resolver;
pub mod schema;

pub use resolver::ConfigResolver;
pub use schema::{Config, PostAction};

use crate::error::{ProtopinError, ProtopinResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// File name searched for at every directory level
pub const CONFIG_FILE_NAME: &str = "protopin.yaml";

/// A configuration plus its originating file and document index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigItem {
    config: Config,
    path: PathBuf,
    index: usize,
}

impl ConfigItem {
    /// Wrap a loaded document
    pub fn new(config: Config, path: PathBuf, index: usize) -> Self {
        Self {
            config,
            path,
            index,
        }
    }

    /// Unique id of this document: `<path>#<index>`
    pub fn id(&self) -> String {
        format!("{}#{}", self.path.display(), self.index)
    }

    /// The configuration file this document came from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The directory scopes and relative paths resolve against
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Position of this document within its file
    pub fn index(&self) -> usize {
        self.index
    }

    /// The configuration itself
    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Load every document in a configuration file, in declaration order
pub fn load_configs(path: &Path) -> ProtopinResult<Vec<Config>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ProtopinError::io(format!("reading config {}", path.display()), e))?;
    parse_documents(&content).map_err(|e| ProtopinError::ConfigInvalid {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Load a configuration file into [`ConfigItem`]s with positional indices
pub fn load_config_items(path: &Path) -> ProtopinResult<Vec<ConfigItem>> {
    Ok(load_configs(path)?
        .into_iter()
        .enumerate()
        .map(|(index, config)| ConfigItem::new(config, path.to_path_buf(), index))
        .collect())
}

/// Save documents back to a configuration file, `---`-separated
pub fn save_configs(path: &Path, configs: &[Config]) -> ProtopinResult<()> {
    let mut parts = Vec::with_capacity(configs.len());
    for config in configs {
        parts.push(serde_yaml::to_string(config)?);
    }
    std::fs::write(path, parts.join("---\n"))
        .map_err(|e| ProtopinError::io(format!("writing config {}", path.display()), e))
}

/// Candidate configuration paths for a source directory: one per directory
/// from `source_dir` up to the filesystem root, then the global fallback.
pub fn candidate_paths(source_dir: &Path, global_config: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = source_dir
        .ancestors()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .collect();
    paths.push(global_config.to_path_buf());
    paths
}

fn parse_documents(content: &str) -> Result<Vec<Config>, serde_yaml::Error> {
    let mut configs = Vec::new();
    for document in serde_yaml::Deserializer::from_str(content) {
        let value = serde_yaml::Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }
        configs.push(serde_yaml::from_value(value)?);
    }
    Ok(configs)
}
