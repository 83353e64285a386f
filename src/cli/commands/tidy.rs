//! The tidy command: pin symbolic versions to concrete ones
//!
//! For every configuration governing the targets, each `latest` specifier
//! (protoc, plugins, repositories) is replaced with the concrete latest
//! version and the file is rewritten in place, preserving its
//! multi-document structure. Everything else round-trips unchanged.

use crate::cli::args::TidyArgs;
use crate::cli::commands::build::discover_targets;
use crate::config::{load_configs, save_configs, ConfigResolver};
use crate::error::ProtopinResult;
use crate::exec::{Executor, SystemExecutor};
use crate::store::ArtifactStore;
use crate::ui::StepProgress;
use crate::versions::{is_symbolic, join_binding, split_binding, VersionResolver};
use console::style;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Execute the tidy command
pub async fn execute(args: TidyArgs, store: ArtifactStore) -> ProtopinResult<()> {
    let targets = discover_targets(&args.target, args.recursive)?;
    let resolver = ConfigResolver::new(&store);
    let versions = VersionResolver::new(Arc::new(SystemExecutor::new()) as Arc<dyn Executor>);

    let mut seen = HashSet::new();
    let mut paths: Vec<PathBuf> = Vec::new();
    for target in &targets {
        let item = resolver.resolve(target)?;
        if seen.insert(item.path().to_path_buf()) {
            paths.push(item.path().to_path_buf());
        }
    }

    let progress = StepProgress::start("Tidy configurations", paths.len());
    for path in &paths {
        progress.note(&path.display().to_string());
        if let Err(e) = pin_file(path, &versions).await {
            progress.abandon();
            return Err(e);
        }
        progress.inc();
    }
    progress.finish();

    println!("{} pinned {} configuration file(s)", style("✓").green(), paths.len());
    Ok(())
}

/// Rewrite every `latest` in `path` to the concrete latest version
pub(crate) async fn pin_file(path: &Path, versions: &VersionResolver) -> ProtopinResult<()> {
    let mut configs = load_configs(path)?;
    let mut changed = false;

    for config in &mut configs {
        if is_symbolic(&config.protoc) {
            config.protoc = versions.latest_compiler_version().await?;
            changed = true;
        }
        for binding in config.plugins.values_mut() {
            let (package, version) = split_binding(binding)?;
            if is_symbolic(&version) {
                let latest = versions.latest_plugin_version(&package).await?;
                *binding = join_binding(&package, &latest);
                changed = true;
            }
        }
        for binding in config.repositories.values_mut() {
            let (uri, version) = split_binding(binding)?;
            if is_symbolic(&version) {
                let head = versions.latest_repository_commit(&uri).await?;
                *binding = join_binding(&uri, &head);
                changed = true;
            }
        }
    }

    if changed {
        info!(path = %path.display(), "pinning versions");
        save_configs(path, &configs)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtopinError;
    use crate::exec::{CommandOutput, CommandRequest};
    use crate::versions::resolver::PROTOBUF_REPOSITORY;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tempfile::TempDir;

    struct ScriptedExecutor {
        replies: HashMap<String, String>,
    }

    #[async_trait]
    impl Executor for ScriptedExecutor {
        async fn execute(&self, req: CommandRequest) -> ProtopinResult<CommandOutput> {
            match self.replies.get(&req.rendered()) {
                Some(stdout) => Ok(CommandOutput {
                    stdout: stdout.clone(),
                    stderr: String::new(),
                }),
                None => Err(ProtopinError::Internal(format!(
                    "unexpected command: {}",
                    req.rendered()
                ))),
            }
        }
    }

    fn scripted() -> VersionResolver {
        let mut replies = HashMap::new();
        replies.insert(
            format!("git ls-remote --tags --refs {PROTOBUF_REPOSITORY}"),
            "a\trefs/tags/v3.17.3\nb\trefs/tags/v3.19.1\n".to_string(),
        );
        replies.insert(
            "go list -m -json -versions google.golang.org/protobuf@latest".to_string(),
            r#"{"Path":"google.golang.org/protobuf","Version":"v1.28.1","Versions":["v1.27.0","v1.28.1"]}"#
                .to_string(),
        );
        replies.insert(
            "git ls-remote https://github.com/googleapis/googleapis HEAD".to_string(),
            "75e9812\tHEAD\n".to_string(),
        );
        VersionResolver::new(Arc::new(ScriptedExecutor { replies }) as Arc<dyn Executor>)
    }

    const UNPINNED: &str = "scopes:
- ./
protoc: latest
plugins:
  protoc-gen-go: google.golang.org/protobuf/cmd/protoc-gen-go@latest
repositories:
  GOOGLEAPIS: https://github.com/googleapis/googleapis@latest
options:
- --go_out=.
---
scopes:
- ./legacy
protoc: v3.6.1
";

    #[tokio::test]
    async fn pins_only_symbolic_versions_and_round_trips_the_rest() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("protopin.yaml");
        std::fs::write(&path, UNPINNED).unwrap();
        let originals = load_configs(&path).unwrap();

        pin_file(&path, &scripted()).await.unwrap();

        let pinned = load_configs(&path).unwrap();
        assert_eq!(pinned.len(), 2);
        assert_eq!(pinned[0].protoc, "v3.19.1");
        assert_eq!(
            pinned[0].plugins.get("protoc-gen-go").unwrap(),
            "google.golang.org/protobuf/cmd/protoc-gen-go@v1.28.1"
        );
        assert_eq!(
            pinned[0].repositories.get("GOOGLEAPIS").unwrap(),
            "https://github.com/googleapis/googleapis@75e9812"
        );

        // every field the pin pass does not rewrite survives unchanged
        assert_eq!(pinned[0].scopes, originals[0].scopes);
        assert_eq!(pinned[0].options, originals[0].options);
        assert_eq!(pinned[1], originals[1]);
    }

    #[tokio::test]
    async fn already_pinned_file_is_left_untouched() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("protopin.yaml");
        std::fs::write(&path, "scopes:\n- ./\nprotoc: v3.17.3\n").unwrap();
        let before = std::fs::read_to_string(&path).unwrap();

        // resolver would fail on any lookup; none must happen
        let versions = VersionResolver::new(Arc::new(ScriptedExecutor {
            replies: HashMap::new(),
        }) as Arc<dyn Executor>);
        pin_file(&path, &versions).await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
    }
}
