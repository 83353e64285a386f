//! Artifact installation into the durable store
//!
//! Each install is idempotent: the check consults the filesystem, the work
//! happens in a temporary workspace, and publication into the store is the
//! final step (a same-filesystem rename), so a partially assembled artifact
//! is never observable as installed.

mod release;

pub use release::{ProtocRelease, RepoArchive, TempWorkspace};

use crate::error::{ProtopinError, ProtopinResult};
use crate::exec::{CommandRequest, Executor};
use crate::fsx;
use crate::store::ArtifactStore;
use crate::versions::join_binding;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Installs compiler, plugin and repository artifacts
pub struct Installer {
    store: ArtifactStore,
    executor: Arc<dyn Executor>,
}

impl Installer {
    /// Create an installer writing into `store`
    pub fn new(store: ArtifactStore, executor: Arc<dyn Executor>) -> Self {
        Self { store, executor }
    }

    /// The store this installer publishes into
    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    // ---- protoc ----

    /// Whether protoc `version` is installed, and where it lives
    pub fn is_compiler_installed(&self, version: &str) -> (bool, PathBuf) {
        let local = self.store.protoc_path(version);
        (fsx::is_file(&local), local)
    }

    /// Install protoc `version` unless it is already present
    pub async fn ensure_compiler(&self, version: &str) -> ProtopinResult<PathBuf> {
        let (installed, local) = self.is_compiler_installed(version);
        if installed {
            debug!(version, path = %local.display(), "protoc already installed");
            return Ok(local);
        }
        info!(version, "installing protoc");
        let release = ProtocRelease::fetch(version).await?;
        // merge include files into the shared tree: overwrite, never remove
        fsx::copy_dir_merge(&release.include_dir(), &self.store.include_dir())?;
        publish_file(&release.binary_path(), &local)?;
        set_executable(&local)?;
        Ok(local)
    }

    // ---- plugins ----

    /// Whether the plugin binary is installed, and where it lives
    pub fn is_plugin_installed(
        &self,
        package: &str,
        version: &str,
    ) -> ProtopinResult<(bool, PathBuf)> {
        let local = self.store.plugin_path(package, version)?;
        Ok((fsx::is_file(&local), local))
    }

    /// Install a plugin binary unless it is already present.
    ///
    /// Uses the host toolchain's remote install with an isolated output
    /// directory; the staged directory becomes the plugin directory in one
    /// rename.
    pub async fn ensure_plugin(&self, package: &str, version: &str) -> ProtopinResult<PathBuf> {
        let (installed, local) = self.is_plugin_installed(package, version)?;
        if installed {
            debug!(package, version, path = %local.display(), "plugin already installed");
            return Ok(local);
        }
        info!(package, version, "installing plugin");
        let staging = TempWorkspace::create_in(&self.store.root().join("tmp"))?;
        let spec = join_binding(package, version);
        self.executor
            .execute(
                CommandRequest::new("go", ["install", spec.as_str()])
                    .env("GOBIN", staging.path().display().to_string())
                    .env("GO111MODULE", "on"),
            )
            .await?;
        publish_dir(staging.path(), &self.store.plugin_dir(package, version)?)?;
        Ok(local)
    }

    // ---- repositories ----

    /// Whether the repository snapshot is installed; returns the `gits`
    /// root shared by all repositories at that commit
    pub fn is_repository_installed(
        &self,
        uri: &str,
        commit: &str,
    ) -> ProtopinResult<(bool, PathBuf)> {
        let code = self.store.git_repo_code_path(uri, commit)?;
        Ok((fsx::is_dir(&code), self.store.git_repo_root(commit)))
    }

    /// Install a repository snapshot unless it is already present
    pub async fn ensure_repository(&self, uri: &str, commit: &str) -> ProtopinResult<PathBuf> {
        let (installed, root) = self.is_repository_installed(uri, commit)?;
        if installed {
            debug!(uri, commit, "repository already installed");
            return Ok(root);
        }
        info!(uri, commit, "installing repository");
        let code_path = self.store.git_repo_code_path(uri, commit)?;
        match RepoArchive::fetch(uri, commit).await {
            Ok(archive) => self.publish_repository(&archive.code_dir(), &code_path)?,
            Err(e) => {
                warn!(uri, commit, error = %e, "snapshot download failed, cloning instead");
                let workspace = TempWorkspace::create()?;
                let checkout = self.clone_at_commit(uri, commit, &workspace).await?;
                self.publish_repository(&checkout, &code_path)?;
            }
        }
        Ok(root)
    }

    /// Clone `uri` into the workspace and hard-reset to `commit`
    async fn clone_at_commit(
        &self,
        uri: &str,
        commit: &str,
        workspace: &TempWorkspace,
    ) -> ProtopinResult<PathBuf> {
        let checkout = workspace.path().join("repo");
        let checkout_arg = checkout.display().to_string();
        self.executor
            .execute(CommandRequest::new(
                "git",
                ["clone", uri, checkout_arg.as_str()],
            ))
            .await?;
        self.executor
            .execute(CommandRequest::new("git", ["reset", "--hard", commit]).dir(&checkout))
            .await?;
        Ok(checkout)
    }

    fn publish_repository(&self, source: &Path, code_path: &Path) -> ProtopinResult<()> {
        let staging = TempWorkspace::create_in(&self.store.root().join("tmp"))?;
        let staged = staging.path().join("code");
        fsx::copy_dir_merge(source, &staged)?;
        publish_dir(&staged, code_path)
    }
}

/// Publish a staged directory into its final path with one rename.
///
/// When the destination already exists a concurrent install won the race;
/// the staged copy is discarded and the existing artifact stands.
fn publish_dir(staged: &Path, dst: &Path) -> ProtopinResult<()> {
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ProtopinError::io(format!("creating directory {}", parent.display()), e))?;
    }
    match std::fs::rename(staged, dst) {
        Ok(()) => Ok(()),
        Err(_) if dst.exists() => Ok(()),
        Err(e) => Err(ProtopinError::io(format!("publishing {}", dst.display()), e)),
    }
}

/// Publish a file into its final path via a staged sibling and rename
fn publish_file(src: &Path, dst: &Path) -> ProtopinResult<()> {
    let parent = dst
        .parent()
        .ok_or_else(|| ProtopinError::Internal(format!("no parent for {}", dst.display())))?;
    std::fs::create_dir_all(parent)
        .map_err(|e| ProtopinError::io(format!("creating directory {}", parent.display()), e))?;
    let staged = parent.join(format!(".stage-{}", std::process::id()));
    fsx::copy_file(src, &staged)?;
    match std::fs::rename(&staged, dst) {
        Ok(()) => Ok(()),
        Err(_) if dst.exists() => {
            let _ = std::fs::remove_file(&staged);
            Ok(())
        }
        Err(e) => Err(ProtopinError::io(format!("publishing {}", dst.display()), e)),
    }
}

#[cfg(unix)]
fn set_executable(path: &Path) -> ProtopinResult<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .map_err(|e| ProtopinError::io(format!("chmod {}", path.display()), e))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> ProtopinResult<()> {
    Ok(())
}
