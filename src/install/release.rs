//! Release archives and temporary workspaces
//!
//! Downloads land in a temporary workspace that is removed when the value
//! drops, success or failure. Nothing here touches the durable store; the
//! installer publishes out of these workspaces as its final step.

use crate::error::{ProtopinError, ProtopinResult};
use crate::store::{binary_name, normalize_version, repository_name};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static WORKSPACE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A directory removed on drop
#[derive(Debug)]
pub struct TempWorkspace {
    path: PathBuf,
}

impl TempWorkspace {
    /// Create a workspace under the system temp directory
    pub fn create() -> ProtopinResult<Self> {
        Self::create_in(&std::env::temp_dir())
    }

    /// Create a workspace under `parent` (used for staging inside the store
    /// so the final publish is a same-filesystem rename)
    pub fn create_in(parent: &Path) -> ProtopinResult<Self> {
        let serial = WORKSPACE_COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = parent.join(format!("protopin-{}-{serial}", std::process::id()));
        std::fs::create_dir_all(&path)
            .map_err(|e| ProtopinError::io(format!("creating workspace {}", path.display()), e))?;
        Ok(Self { path })
    }

    /// The workspace directory
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempWorkspace {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

/// Release suffix protoc publishes for the current platform
pub(crate) fn protoc_release_suffix() -> ProtopinResult<&'static str> {
    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    let suffix = match (os, arch) {
        ("linux", "aarch64") => "linux-aarch_64",
        ("linux", "powerpc64") => "linux-ppcle_64",
        ("linux", "s390x") => "linux-s390_64",
        ("linux", "x86") => "linux-x86_32",
        ("linux", "x86_64") => "linux-x86_64",
        ("macos", "aarch64") => "osx-aarch_64",
        ("macos", "x86_64") => "osx-x86_64",
        ("windows", "x86") => "win32",
        ("windows", "x86_64") => "win64",
        _ => {
            return Err(ProtopinError::UnsupportedPlatform {
                os: os.to_string(),
                arch: arch.to_string(),
            })
        }
    };
    Ok(suffix)
}

/// URL of the protoc release archive for `version` on this platform
pub(crate) fn protoc_release_url(version: &str) -> ProtopinResult<(String, String)> {
    let version = normalize_version(version);
    let suffix = protoc_release_suffix()?;
    let filename = format!("protoc-{version}-{suffix}.zip");
    let url = format!(
        "https://github.com/protocolbuffers/protobuf/releases/download/v{version}/{filename}"
    );
    Ok((url, filename))
}

/// URL of the source snapshot of `uri` at `commit`
pub(crate) fn archive_url(uri: &str, commit: &str) -> (String, String) {
    let filename = format!("{commit}.zip");
    let url = format!("{}/archive/{filename}", uri.trim_end_matches('/'));
    (url, filename)
}

/// Download `url` into `dest`, streaming the body to disk.
///
/// Blocking; call from `spawn_blocking`. Errors carry the URL and, when the
/// server answered, the HTTP status.
pub(crate) fn download_to(url: &str, dest: &Path) -> ProtopinResult<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ProtopinError::io(format!("creating directory {}", parent.display()), e))?;
    }
    let mut response = ureq::get(url).call().map_err(|e| match e {
        ureq::Error::StatusCode(code) => {
            ProtopinError::download(url, Some(code), "unexpected status")
        }
        other => ProtopinError::download(url, None, other.to_string()),
    })?;
    let mut file = std::fs::File::create(dest)
        .map_err(|e| ProtopinError::io(format!("creating {}", dest.display()), e))?;
    let mut body = response.body_mut().as_reader();
    std::io::copy(&mut body, &mut file)
        .map_err(|e| ProtopinError::download(url, None, e.to_string()))?;
    Ok(())
}

/// Unpack a zip archive into `dest`
pub(crate) fn unpack_zip(archive: &Path, dest: &Path) -> ProtopinResult<()> {
    let file = std::fs::File::open(archive)
        .map_err(|e| ProtopinError::io(format!("opening {}", archive.display()), e))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| ProtopinError::Archive {
        path: archive.to_path_buf(),
        reason: e.to_string(),
    })?;
    zip.extract(dest).map_err(|e| ProtopinError::Archive {
        path: archive.to_path_buf(),
        reason: e.to_string(),
    })
}

/// An unpacked protoc release in a temporary workspace
#[derive(Debug)]
pub struct ProtocRelease {
    workspace: TempWorkspace,
}

impl ProtocRelease {
    /// Download and unpack the release archive for `version`
    pub async fn fetch(version: &str) -> ProtopinResult<Self> {
        let (url, filename) = protoc_release_url(version)?;
        let workspace = TempWorkspace::create()?;
        let archive = workspace.path().join(filename);
        let dest = workspace.path().to_path_buf();
        tokio::task::spawn_blocking(move || -> ProtopinResult<()> {
            download_to(&url, &archive)?;
            unpack_zip(&archive, &dest)
        })
        .await
        .map_err(|e| ProtopinError::Internal(e.to_string()))??;
        Ok(Self { workspace })
    }

    /// The release's include subtree
    pub fn include_dir(&self) -> PathBuf {
        self.workspace.path().join("include")
    }

    /// The release's protoc binary
    pub fn binary_path(&self) -> PathBuf {
        self.workspace.path().join("bin").join(binary_name("protoc"))
    }
}

/// An unpacked repository snapshot in a temporary workspace
#[derive(Debug)]
pub struct RepoArchive {
    workspace: TempWorkspace,
    uri: String,
    commit: String,
}

impl RepoArchive {
    /// Download and unpack the snapshot of `uri` at `commit`
    pub async fn fetch(uri: &str, commit: &str) -> ProtopinResult<Self> {
        let (url, filename) = archive_url(uri, commit);
        let workspace = TempWorkspace::create()?;
        let archive = workspace.path().join(filename);
        let dest = workspace.path().to_path_buf();
        tokio::task::spawn_blocking(move || -> ProtopinResult<()> {
            download_to(&url, &archive)?;
            unpack_zip(&archive, &dest)
        })
        .await
        .map_err(|e| ProtopinError::Internal(e.to_string()))??;
        Ok(Self {
            workspace,
            uri: uri.to_string(),
            commit: commit.to_string(),
        })
    }

    /// Directory the snapshot unpacked into (`<name>-<commit>`)
    pub fn code_dir(&self) -> PathBuf {
        self.workspace
            .path()
            .join(format!("{}-{}", repository_name(&self.uri), self.commit))
    }
}
