//! Configuration schema for protopin.yaml
//!
//! One YAML document per configuration; a file may hold several documents
//! separated by `---`. Field names are camelCase on disk.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One configuration document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Path globs, relative to this file's directory, selecting the proto
    /// files this configuration governs
    pub scopes: Vec<String>,

    /// protoc version: `v3.21.12`-style or `latest`
    pub protoc: String,

    /// Working directory override for protoc; empty means the config dir
    pub protoc_work_dir: String,

    /// Logical plugin name → `path@version` binding
    pub plugins: BTreeMap<String, String>,

    /// Logical repository name → `uri@commit` binding
    pub repositories: BTreeMap<String, String>,

    /// Raw protoc options; may embed `$NAME` tokens
    pub options: Vec<String>,

    /// Import path entries: literal paths, `$NAME` tokens, or the reserved
    /// `$PROTOPIN_INCLUDE` / `$SOURCE_RELATIVE` tokens
    pub import_paths: Vec<String>,

    /// Actions executed after a successful compile
    pub post_actions: Vec<PostAction>,

    /// Shell script executed after the post actions
    pub post_shell: String,
}

/// A single post-build action
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostAction {
    pub name: String,
    pub args: Vec<String>,
}

impl Config {
    /// Whether any post step (action or shell) is declared
    pub fn has_post_steps(&self) -> bool {
        !self.post_actions.is_empty() || !self.post_shell.is_empty()
    }
}
