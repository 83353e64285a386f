//! Remote version resolution with an instance-owned cache
//!
//! Each artifact kind has its own listing mechanism: protoc versions come
//! from the protobuf repository's tag listing, plugin versions from the
//! module proxy (`go list`), repository versions from `git ls-remote`.
//! Successful lookups are cached for the resolver's lifetime; failures are
//! never cached.

use crate::error::{ProtopinError, ProtopinResult};
use crate::exec::{CommandRequest, Executor};
use crate::versions::{join_binding, order_versions, LATEST};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Upstream repository whose tags define protoc versions
pub const PROTOBUF_REPOSITORY: &str = "https://github.com/protocolbuffers/protobuf";

const COMPILER_CACHE_KEY: &str = "protoc";

/// Resolves symbolic versions against remote sources
pub struct VersionResolver {
    executor: Arc<dyn Executor>,
    cache: RwLock<HashMap<String, Vec<String>>>,
}

impl VersionResolver {
    /// Create a resolver that queries through `executor`
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self {
            executor,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// List known protoc versions, malformed tags first, ascending after
    pub async fn list_compiler_versions(&self) -> ProtopinResult<Vec<String>> {
        if let Some(hit) = self.cached(COMPILER_CACHE_KEY) {
            return Ok(hit);
        }
        let out = self
            .executor
            .execute(CommandRequest::new(
                "git",
                ["ls-remote", "--tags", "--refs", PROTOBUF_REPOSITORY],
            ))
            .await?;
        let ordered = order_versions(&parse_ls_remote_tags(&out.stdout));
        debug!(count = ordered.len(), "listed protoc versions");
        self.fill(COMPILER_CACHE_KEY, &ordered);
        Ok(ordered)
    }

    /// The latest protoc version; fails when the tag listing is empty
    pub async fn latest_compiler_version(&self) -> ProtopinResult<String> {
        self.list_compiler_versions()
            .await?
            .last()
            .cloned()
            .ok_or_else(|| ProtopinError::EmptyVersionList(COMPILER_CACHE_KEY.to_string()))
    }

    /// List versions of a plugin package.
    ///
    /// Package paths are ambiguous: the importable module may sit at any
    /// prefix. All candidate prefixes (longest first, down to two segments)
    /// are queried concurrently; the longest prefix that yields a listing
    /// wins and the remaining lookups are aborted. When every prefix fails,
    /// the combined errors are returned.
    pub async fn list_plugin_versions(&self, package: &str) -> ProtopinResult<Vec<String>> {
        if let Some(hit) = self.cached(package) {
            return Ok(hit);
        }
        let versions = self.list_module_versions_ambiguous(package).await?;
        self.fill(package, &versions);
        Ok(versions)
    }

    /// The latest version of a plugin package
    pub async fn latest_plugin_version(&self, package: &str) -> ProtopinResult<String> {
        self.list_plugin_versions(package)
            .await?
            .last()
            .cloned()
            .ok_or_else(|| ProtopinError::EmptyVersionList(package.to_string()))
    }

    /// List commit ids advertised by a repository (full ref listing)
    pub async fn list_repository_refs(&self, uri: &str) -> ProtopinResult<Vec<String>> {
        if let Some(hit) = self.cached(uri) {
            return Ok(hit);
        }
        let out = self
            .executor
            .execute(CommandRequest::new("git", ["ls-remote", uri]))
            .await?;
        let commits = parse_ls_remote_commits(&out.stdout);
        self.fill(uri, &commits);
        Ok(commits)
    }

    /// The commit a repository's HEAD points at (single remote lookup)
    pub async fn latest_repository_commit(&self, uri: &str) -> ProtopinResult<String> {
        let key = format!("{uri}#HEAD");
        if let Some(hit) = self.cached(&key) {
            if let Some(commit) = hit.first() {
                return Ok(commit.clone());
            }
        }
        let out = self
            .executor
            .execute(CommandRequest::new("git", ["ls-remote", uri, "HEAD"]))
            .await?;
        let commit = out
            .stdout
            .split_whitespace()
            .next()
            .map(str::to_string)
            .ok_or_else(|| ProtopinError::EmptyVersionList(uri.to_string()))?;
        self.fill(&key, std::slice::from_ref(&commit));
        Ok(commit)
    }

    async fn list_module_versions_ambiguous(&self, package: &str) -> ProtopinResult<Vec<String>> {
        let segments: Vec<&str> = package.split('/').collect();
        if segments.len() < 2 {
            return list_module_versions(Arc::clone(&self.executor), package.to_string()).await;
        }

        // Launch every candidate prefix at once; award by priority order.
        let mut lookups = Vec::with_capacity(segments.len() - 1);
        for end in (2..=segments.len()).rev() {
            let prefix = segments[..end].join("/");
            let executor = Arc::clone(&self.executor);
            let handle = tokio::spawn(list_module_versions(executor, prefix.clone()));
            lookups.push((prefix, handle));
        }

        let mut errors = Vec::new();
        let mut lookups = lookups.into_iter();
        while let Some((prefix, handle)) = lookups.next() {
            match handle.await {
                Ok(Ok(versions)) => {
                    for (_, rest) in lookups {
                        rest.abort();
                    }
                    debug!(package, winner = %prefix, "module prefix race settled");
                    return Ok(versions);
                }
                Ok(Err(e)) => errors.push(format!("{prefix}: {e}")),
                Err(e) => errors.push(format!("{prefix}: {e}")),
            }
        }
        Err(ProtopinError::ModuleLookup {
            package: package.to_string(),
            details: errors.join("; "),
        })
    }

    fn cached(&self, key: &str) -> Option<Vec<String>> {
        let map = self.cache.read().unwrap_or_else(|p| p.into_inner());
        map.get(key).cloned()
    }

    fn fill(&self, key: &str, versions: &[String]) {
        let mut map = self.cache.write().unwrap_or_else(|p| p.into_inner());
        map.insert(key.to_string(), versions.to_vec());
    }
}

/// JSON shape of a `go list -m -json -versions` record
#[derive(Debug, Deserialize)]
struct ModuleListing {
    #[serde(rename = "Version", default)]
    version: String,
    #[serde(rename = "Versions", default)]
    versions: Vec<String>,
}

async fn list_module_versions(
    executor: Arc<dyn Executor>,
    package: String,
) -> ProtopinResult<Vec<String>> {
    // Query at `latest` so the answer is not constrained by whatever module
    // graph happens to surround the working directory.
    let query = join_binding(&package, LATEST);
    let out = executor
        .execute(
            CommandRequest::new("go", ["list", "-m", "-json", "-versions", query.as_str()])
                .env("GO111MODULE", "on"),
        )
        .await?;
    let listing: ModuleListing = serde_json::from_str(&out.stdout)?;
    if !listing.versions.is_empty() {
        return Ok(listing.versions);
    }
    if listing.version.is_empty() {
        return Err(ProtopinError::EmptyVersionList(package));
    }
    Ok(vec![listing.version])
}

fn parse_ls_remote_tags(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let _commit = fields.next()?;
            let reference = fields.next()?;
            reference.strip_prefix("refs/tags/").map(str::to_string)
        })
        .collect()
}

fn parse_ls_remote_commits(output: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .filter(|commit| seen.insert(commit.to_string()))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::CommandOutput;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replies keyed by rendered command line; unknown commands error.
    struct ScriptedExecutor {
        replies: HashMap<String, Result<String, String>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedExecutor {
        fn new(replies: &[(&str, Result<&str, &str>)]) -> Self {
            Self {
                replies: replies
                    .iter()
                    .map(|(cmd, reply)| {
                        (
                            cmd.to_string(),
                            reply.map(str::to_string).map_err(str::to_string),
                        )
                    })
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Executor for ScriptedExecutor {
        async fn execute(&self, req: CommandRequest) -> ProtopinResult<CommandOutput> {
            let rendered = req.rendered();
            self.calls.lock().unwrap().push(rendered.clone());
            match self.replies.get(&rendered) {
                Some(Ok(stdout)) => Ok(CommandOutput {
                    stdout: stdout.clone(),
                    stderr: String::new(),
                }),
                Some(Err(message)) => Err(ProtopinError::Internal(message.clone())),
                None => Err(ProtopinError::Internal(format!(
                    "unexpected command: {rendered}"
                ))),
            }
        }
    }

    fn tags_cmd() -> String {
        format!("git ls-remote --tags --refs {PROTOBUF_REPOSITORY}")
    }

    #[tokio::test]
    async fn compiler_versions_ordered_and_latest_is_last_well_formed() {
        let listing = "\
aaaa\trefs/tags/v3.0.0-beta-3.1\n\
bbbb\trefs/tags/conformance-build-tag\n\
cccc\trefs/tags/v2.4.1\n\
dddd\trefs/tags/3.15.0-rc1\n\
eeee\trefs/tags/v3.0.0-alpha-2\n";
        let tags = tags_cmd();
        let exec = Arc::new(ScriptedExecutor::new(&[(tags.as_str(), Ok(listing))]));
        let resolver = VersionResolver::new(exec);

        let versions = resolver.list_compiler_versions().await.unwrap();
        assert_eq!(
            versions,
            vec![
                "conformance-build-tag",
                "v2.4.1",
                "v3.0.0-alpha-2",
                "v3.0.0-beta-3.1",
                "3.15.0-rc1",
            ]
        );
        assert_eq!(
            resolver.latest_compiler_version().await.unwrap(),
            "3.15.0-rc1"
        );
    }

    #[tokio::test]
    async fn compiler_versions_cached_after_first_call() {
        let tags = tags_cmd();
        let exec = Arc::new(ScriptedExecutor::new(&[(
            tags.as_str(),
            Ok("aaaa\trefs/tags/v1.0.0\n"),
        )]));
        let resolver = VersionResolver::new(Arc::clone(&exec) as Arc<dyn Executor>);

        resolver.list_compiler_versions().await.unwrap();
        resolver.list_compiler_versions().await.unwrap();
        assert_eq!(exec.call_count(), 1);
    }

    #[tokio::test]
    async fn failed_listing_is_not_cached() {
        struct FailOnce {
            calls: AtomicUsize,
        }

        #[async_trait]
        impl Executor for FailOnce {
            async fn execute(&self, _req: CommandRequest) -> ProtopinResult<CommandOutput> {
                if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ProtopinError::Internal("network down".into()))
                } else {
                    Ok(CommandOutput {
                        stdout: "aaaa\trefs/tags/v1.0.0\n".into(),
                        stderr: String::new(),
                    })
                }
            }
        }

        let exec = Arc::new(FailOnce {
            calls: AtomicUsize::new(0),
        });
        let resolver = VersionResolver::new(Arc::clone(&exec) as Arc<dyn Executor>);

        assert!(resolver.list_compiler_versions().await.is_err());
        let versions = resolver.list_compiler_versions().await.unwrap();
        assert_eq!(versions, vec!["v1.0.0"]);
        assert_eq!(exec.calls.load(Ordering::SeqCst), 2);
    }

    fn go_list_cmd(prefix: &str) -> String {
        format!("go list -m -json -versions {prefix}@latest")
    }

    #[tokio::test]
    async fn plugin_race_longest_prefix_wins() {
        let cmds = [
            go_list_cmd("example.com/org/tool/cmd"),
            go_list_cmd("example.com/org/tool"),
            go_list_cmd("example.com/org"),
        ];
        let exec = Arc::new(ScriptedExecutor::new(&[
            (cmds[0].as_str(), Err("no module at path")),
            (
                cmds[1].as_str(),
                Ok(r#"{"Path":"example.com/org/tool","Version":"v1.2.0","Versions":["v1.0.0","v1.2.0"]}"#),
            ),
            (
                cmds[2].as_str(),
                Ok(r#"{"Path":"example.com/org","Version":"v0.1.0"}"#),
            ),
        ]));
        let resolver = VersionResolver::new(exec);

        let versions = resolver
            .list_plugin_versions("example.com/org/tool/cmd")
            .await
            .unwrap();
        assert_eq!(versions, vec!["v1.0.0", "v1.2.0"]);
        assert_eq!(
            resolver
                .latest_plugin_version("example.com/org/tool/cmd")
                .await
                .unwrap(),
            "v1.2.0"
        );
    }

    #[tokio::test]
    async fn plugin_race_combines_all_errors() {
        let cmds = [go_list_cmd("example.com/a/b"), go_list_cmd("example.com/a")];
        let exec = Arc::new(ScriptedExecutor::new(&[
            (cmds[0].as_str(), Err("not found b")),
            (cmds[1].as_str(), Err("not found a")),
        ]));
        let resolver = VersionResolver::new(exec);

        let err = resolver
            .list_plugin_versions("example.com/a/b")
            .await
            .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("example.com/a/b"));
        assert!(text.contains("not found b"));
        assert!(text.contains("not found a"));
    }

    #[tokio::test]
    async fn repository_head_lookup() {
        let exec = Arc::new(ScriptedExecutor::new(&[(
            "git ls-remote https://github.com/googleapis/googleapis HEAD",
            Ok("424242\tHEAD\n"),
        )]));
        let resolver = VersionResolver::new(Arc::clone(&exec) as Arc<dyn Executor>);

        let commit = resolver
            .latest_repository_commit("https://github.com/googleapis/googleapis")
            .await
            .unwrap();
        assert_eq!(commit, "424242");

        // cached: a second lookup does not hit the remote again
        resolver
            .latest_repository_commit("https://github.com/googleapis/googleapis")
            .await
            .unwrap();
        assert_eq!(exec.call_count(), 1);
    }

    #[tokio::test]
    async fn repository_ref_listing_collects_commits() {
        let exec = Arc::new(ScriptedExecutor::new(&[(
            "git ls-remote https://github.com/a/b",
            Ok("c1\tHEAD\nc1\trefs/heads/main\nc2\trefs/tags/v1.0.0\n"),
        )]));
        let resolver = VersionResolver::new(exec);

        let refs = resolver
            .list_repository_refs("https://github.com/a/b")
            .await
            .unwrap();
        assert_eq!(refs, vec!["c1", "c2"]);
    }
}
