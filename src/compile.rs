//! Compile-argument synthesis
//!
//! Turns a resolved configuration into a protoc invocation: resolves the
//! compiler and plugin versions, substitutes `$NAME` tokens in options and
//! import paths, and deduplicates the argument list while preserving
//! first-occurrence order. Entries referencing `$SOURCE_RELATIVE` stay
//! symbolic until a concrete target file is known.

use crate::config::ConfigItem;
use crate::error::{ProtopinError, ProtopinResult};
use crate::fsx;
use crate::install::Installer;
use crate::store::ArtifactStore;
use crate::versions::{is_symbolic, split_binding, VersionResolver};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Variable naming the shared include directory in import paths
pub const KEY_INCLUDE: &str = "PROTOPIN_INCLUDE";

/// Variable naming the directory of the proto file being compiled
pub const KEY_SOURCE_RELATIVE: &str = "SOURCE_RELATIVE";

/// A synthesized protoc invocation for one configuration.
///
/// `args` may still contain `$SOURCE_RELATIVE`; [`Invocation::args_for`]
/// renders the final argument list for a concrete target.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Directory protoc runs in
    pub work_dir: PathBuf,
    /// The protoc binary
    pub program: PathBuf,
    /// Argument list, pre-target
    pub args: Vec<String>,
    config_dir: PathBuf,
}

impl Invocation {
    /// Render the argument list for one target file: substitute
    /// `$SOURCE_RELATIVE`, absolutize deferred import paths, dedup stably,
    /// and append the target itself.
    pub fn args_for(&self, target: &Path) -> Vec<String> {
        let mut vars = HashMap::new();
        vars.insert(
            KEY_SOURCE_RELATIVE.to_string(),
            target
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .display()
                .to_string(),
        );

        let mut rendered = Vec::with_capacity(self.args.len() + 1);
        for arg in &self.args {
            if !arg.contains('$') {
                rendered.push(arg.clone());
                continue;
            }
            let substituted = substitute_tokens(arg, &vars);
            match substituted.strip_prefix("--proto_path=") {
                Some(path) => {
                    let path = absolutize(Path::new(path), &self.config_dir);
                    rendered.push(format!("--proto_path={}", path.display()));
                }
                None => rendered.push(substituted),
            }
        }
        let mut args = dedup_stable(rendered);
        args.push(target.display().to_string());
        args
    }
}

/// Builds invocations from resolved configurations
pub struct CompilerBuilder {
    store: ArtifactStore,
    resolver: Arc<VersionResolver>,
    installer: Arc<Installer>,
}

impl CompilerBuilder {
    /// Create a builder using `resolver` and `installer` for artifacts
    pub fn new(
        store: ArtifactStore,
        resolver: Arc<VersionResolver>,
        installer: Arc<Installer>,
    ) -> Self {
        Self {
            store,
            resolver,
            installer,
        }
    }

    /// Synthesize the invocation for one configuration.
    ///
    /// Emits import paths, then plugin bindings, then options; installs the
    /// compiler and plugins on demand. The working directory is the
    /// configured override or the configuration's own directory.
    pub async fn build(&self, item: &ConfigItem) -> ProtopinResult<Invocation> {
        let config = item.config();
        if config.protoc.is_empty() {
            return Err(ProtopinError::MissingCompilerVersion(
                item.path().to_path_buf(),
            ));
        }
        let version = if is_symbolic(&config.protoc) {
            self.resolver.latest_compiler_version().await?
        } else {
            config.protoc.clone()
        };
        let program = self.installer.ensure_compiler(&version).await?;

        let vars = self.variables(item).await?;
        let config_dir = item.dir().to_path_buf();
        let mut args = Vec::new();

        let source_relative_token = format!("${KEY_SOURCE_RELATIVE}");
        for entry in &config.import_paths {
            let substituted = substitute_tokens(entry, &vars);
            if substituted.contains(&source_relative_token) {
                // deferred to per-target rendering
                args.push(format!("--proto_path={substituted}"));
            } else {
                let path = absolutize(Path::new(&substituted), &config_dir);
                args.push(format!("--proto_path={}", path.display()));
            }
        }

        for (name, binding) in &config.plugins {
            let (package, version) = split_binding(binding)?;
            let version = if is_symbolic(&version) {
                self.resolver.latest_plugin_version(&package).await?
            } else {
                version
            };
            let local = self.installer.ensure_plugin(&package, &version).await?;
            args.push(format!("--plugin={}={}", name, local.display()));
        }

        for option in &config.options {
            args.push(substitute_tokens(option, &vars));
        }

        let args = dedup_stable(args);
        let work_dir = self.work_dir(item, &vars);
        Ok(Invocation {
            work_dir,
            program,
            args,
            config_dir,
        })
    }

    /// Substitution variables for one configuration: the include directory
    /// and one entry per repository binding, pointing at the `gits` root of
    /// its resolved commit.
    async fn variables(&self, item: &ConfigItem) -> ProtopinResult<HashMap<String, String>> {
        let mut vars = HashMap::new();
        for (name, binding) in &item.config().repositories {
            let (uri, version) = split_binding(binding)?;
            let commit = if is_symbolic(&version) {
                self.resolver.latest_repository_commit(&uri).await?
            } else {
                version
            };
            vars.insert(
                name.clone(),
                self.store.git_repo_root(&commit).display().to_string(),
            );
        }
        vars.insert(
            KEY_INCLUDE.to_string(),
            self.store.include_dir().display().to_string(),
        );
        Ok(vars)
    }

    fn work_dir(&self, item: &ConfigItem, vars: &HashMap<String, String>) -> PathBuf {
        let declared = &item.config().protoc_work_dir;
        if declared.is_empty() {
            return item.dir().to_path_buf();
        }
        absolutize(Path::new(&substitute_tokens(declared, vars)), item.dir())
    }
}

/// Substitute `$NAME` tokens (letters and underscores) from `vars`, falling
/// back to the process environment. Unknown tokens are left literal.
pub fn substitute_tokens(input: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let name_len = after
            .chars()
            .take_while(|c| c.is_ascii_alphabetic() || *c == '_')
            .count();
        if name_len == 0 {
            out.push('$');
            rest = after;
            continue;
        }
        let name = &after[..name_len];
        let value = vars
            .get(name)
            .cloned()
            .filter(|v| !v.is_empty())
            .or_else(|| std::env::var(name).ok().filter(|v| !v.is_empty()));
        match value {
            Some(value) => out.push_str(&value),
            None => {
                out.push('$');
                out.push_str(name);
            }
        }
        rest = &after[name_len..];
    }
    out.push_str(rest);
    out
}

/// Clean a path and make it absolute relative to `base` when it is not
pub fn absolutize(path: &Path, base: &Path) -> PathBuf {
    let cleaned = fsx::clean_path(path);
    if cleaned.is_absolute() {
        cleaned
    } else {
        fsx::clean_path(&base.join(cleaned))
    }
}

/// Deduplicate while preserving first-occurrence order
pub fn dedup_stable(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_keeps_first_occurrence_order() {
        let input = vec![
            "--proto_path=X".to_string(),
            "--opt=1".to_string(),
            "--proto_path=X".to_string(),
        ];
        assert_eq!(dedup_stable(input), vec!["--proto_path=X", "--opt=1"]);
    }

    #[test]
    fn substitution_prefers_vars_and_cleans() {
        let mut vars = HashMap::new();
        vars.insert("HOME".to_string(), "/mnt/x".to_string());
        let rendered = substitute_tokens("$HOME/protobuf", &vars);
        assert_eq!(
            fsx::clean_path(Path::new(&rendered)),
            PathBuf::from("/mnt/x/protobuf")
        );
    }

    #[test]
    fn substitution_leaves_unknown_tokens_literal() {
        let rendered = substitute_tokens("$PROTOPIN_TEST_UNSET_VAR/protobuf", &HashMap::new());
        assert_eq!(
            fsx::clean_path(Path::new(&rendered)),
            PathBuf::from("$PROTOPIN_TEST_UNSET_VAR/protobuf")
        );
    }

    #[test]
    fn substitution_handles_multiple_and_bare_dollar() {
        let mut vars = HashMap::new();
        vars.insert("A".to_string(), "1".to_string());
        vars.insert("B_C".to_string(), "2".to_string());
        assert_eq!(substitute_tokens("$A/$B_C/$", &vars), "1/2/$");
    }

    #[test]
    fn absolutize_relative_against_base() {
        assert_eq!(
            absolutize(Path::new("./gen/../proto"), Path::new("/work")),
            PathBuf::from("/work/proto")
        );
        assert_eq!(
            absolutize(Path::new("/abs/dir"), Path::new("/work")),
            PathBuf::from("/abs/dir")
        );
    }

    #[test]
    fn args_for_substitutes_source_relative_and_dedups() {
        let inv = Invocation {
            work_dir: PathBuf::from("/work"),
            program: PathBuf::from("/store/protoc/3.0.0/protoc"),
            args: vec![
                "--proto_path=/store/include".to_string(),
                "--proto_path=$SOURCE_RELATIVE".to_string(),
                "--proto_path=/store/include".to_string(),
            ],
            config_dir: PathBuf::from("/work"),
        };
        let args = inv.args_for(Path::new("/work/api/v1/x.proto"));
        assert_eq!(
            args,
            vec![
                "--proto_path=/store/include",
                "--proto_path=/work/api/v1",
                "/work/api/v1/x.proto",
            ]
        );
    }

    #[test]
    fn args_for_keeps_options_and_appends_target() {
        let inv = Invocation {
            work_dir: PathBuf::from("/work"),
            program: PathBuf::from("protoc"),
            args: vec![
                "--go_out=paths=source_relative:.".to_string(),
                "--proto_path=/work".to_string(),
            ],
            config_dir: PathBuf::from("/work"),
        };
        let args = inv.args_for(Path::new("/work/x.proto"));
        assert_eq!(args.last().unwrap(), "/work/x.proto");
        assert_eq!(args[0], "--go_out=paths=source_relative:.");
    }
}
