//! On-disk artifact store layout
//!
//! Pure path derivation for everything protopin installs: protoc binaries,
//! plugin binaries, cloned repositories and the shared include tree. The
//! layout is deterministic; the filesystem itself is the source of truth for
//! what is installed.
//!
//! Layout, rooted at `$PROTOPIN_HOME` (default `~/.protopin`):
//!
//! ```text
//! protoc/<version>/protoc[.exe]
//! include/
//! plugins/<escaped-path>@<escaped-version>/<binary>
//! gits/<commit>/<host><uri-path>/...
//! protopin.yaml
//! ```

use crate::config::CONFIG_FILE_NAME;
use crate::error::{ProtopinError, ProtopinResult};
use std::path::{Path, PathBuf};

/// Environment variable overriding the store root
pub const ENV_HOME: &str = "PROTOPIN_HOME";

/// Durable store of installed artifacts
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Create a store rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create a store at `$PROTOPIN_HOME`, or `~/.protopin` when unset
    pub fn from_env() -> Self {
        if let Ok(root) = std::env::var(ENV_HOME) {
            if !root.is_empty() {
                return Self::new(root);
            }
        }
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::new(home.join(".protopin"))
    }

    /// The store root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The shared include directory merged from protoc releases
    pub fn include_dir(&self) -> PathBuf {
        self.root.join("include")
    }

    /// The global fallback configuration path
    pub fn global_config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE_NAME)
    }

    /// Local path of the protoc binary for `version`
    pub fn protoc_path(&self, version: &str) -> PathBuf {
        self.root
            .join("protoc")
            .join(normalize_version(version))
            .join(binary_name("protoc"))
    }

    /// Local directory a plugin binary is installed into
    pub fn plugin_dir(&self, package: &str, version: &str) -> ProtopinResult<PathBuf> {
        let path = escape_module_component(package)?;
        let version = escape_module_component(version)?;
        Ok(self.root.join("plugins").join(format!("{path}@{version}")))
    }

    /// Local path of a plugin binary
    pub fn plugin_path(&self, package: &str, version: &str) -> ProtopinResult<PathBuf> {
        Ok(self
            .plugin_dir(package, version)?
            .join(binary_name(&exec_name(package))))
    }

    /// Root directory shared by all repositories at `commit`
    pub fn git_repo_root(&self, commit: &str) -> PathBuf {
        self.root.join("gits").join(commit)
    }

    /// Code directory of the repository `uri` at `commit`
    pub fn git_repo_code_path(&self, uri: &str, commit: &str) -> ProtopinResult<PathBuf> {
        let (host, path) = split_repository_uri(uri)?;
        let mut dir = self.git_repo_root(commit).join(host);
        for part in path.split('/').filter(|p| !p.is_empty()) {
            dir.push(part);
        }
        Ok(dir)
    }
}

/// Strip a single leading `v` so versions can be used as path and URL
/// components. Configuration round-trips keep the prefix.
pub fn normalize_version(version: &str) -> &str {
    version.strip_prefix('v').unwrap_or(version)
}

/// Platform binary file name: appends `.exe` on Windows
pub fn binary_name(name: &str) -> String {
    if cfg!(windows) && !name.ends_with(".exe") {
        format!("{name}.exe")
    } else {
        name.to_string()
    }
}

/// Escape a module path or version for use as a single on-disk component,
/// module-proxy style: uppercase letters become `!` + lowercase.
pub fn escape_module_component(s: &str) -> ProtopinResult<String> {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if ch == '!' {
            return Err(ProtopinError::InvalidModulePath {
                path: s.to_string(),
                reason: "'!' is reserved".to_string(),
            });
        }
        if !ch.is_ascii() || ch.is_ascii_control() {
            return Err(ProtopinError::InvalidModulePath {
                path: s.to_string(),
                reason: format!("unsupported character {ch:?}"),
            });
        }
        if ch.is_ascii_uppercase() {
            out.push('!');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    Ok(out)
}

/// Whether a path segment is a major-version element: `v2`..`v9`, `v10`+,
/// but not `v0`, `v1` or zero-padded digits.
fn is_version_element(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.len() < 2 || bytes[0] != b'v' || bytes[1] == b'0' {
        return false;
    }
    if bytes[1] == b'1' && bytes.len() == 2 {
        return false;
    }
    bytes[1..].iter().all(u8::is_ascii_digit)
}

/// Executable name for a package path: the last segment, skipping a trailing
/// major-version element (`.../protoc-gen-go/v2` installs `protoc-gen-go`).
pub fn exec_name(package: &str) -> String {
    let mut parts = package.rsplit('/');
    let last = parts.next().unwrap_or(package);
    if last != package && is_version_element(last) {
        if let Some(prev) = parts.next() {
            return prev.to_string();
        }
    }
    last.to_string()
}

/// Split a repository URI into host and path, dropping the scheme
pub fn split_repository_uri(uri: &str) -> ProtopinResult<(String, String)> {
    let rest = uri.split_once("://").map_or(uri, |(_, r)| r);
    let (host, path) = match rest.split_once('/') {
        Some((host, path)) => (host, format!("/{path}")),
        None => (rest, String::new()),
    };
    if host.is_empty() {
        return Err(ProtopinError::InvalidRepositoryUri(uri.to_string()));
    }
    Ok((host.to_string(), path))
}

/// Last path segment of a repository URI, used to locate archive contents
pub fn repository_name(uri: &str) -> &str {
    uri.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(uri)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn store() -> ArtifactStore {
        ArtifactStore::new("/store")
    }

    #[test]
    fn protoc_path_normalizes_version() {
        assert_eq!(
            store().protoc_path("v3.17.3"),
            PathBuf::from("/store/protoc/3.17.3").join(binary_name("protoc"))
        );
        assert_eq!(
            store().protoc_path("3.17.3"),
            store().protoc_path("v3.17.3")
        );
    }

    #[test]
    fn plugin_path_escapes_and_names() {
        let path = store()
            .plugin_path("github.com/Example/protoc-gen-x", "v1.2.3")
            .unwrap();
        assert_eq!(
            path,
            PathBuf::from("/store/plugins/github.com/!example/protoc-gen-x@v1.2.3")
                .join(binary_name("protoc-gen-x"))
        );
    }

    #[test]
    fn git_repo_code_path_uses_host_and_path() {
        let path = store()
            .git_repo_code_path("https://github.com/googleapis/googleapis", "abc123")
            .unwrap();
        assert_eq!(
            path,
            PathBuf::from("/store/gits/abc123/github.com/googleapis/googleapis")
        );
    }

    #[test]
    fn escape_rejects_bang() {
        assert!(escape_module_component("a!b").is_err());
    }

    #[test]
    fn version_elements() {
        assert!(is_version_element("v2"));
        assert!(is_version_element("v10"));
        assert!(is_version_element("v12"));
        assert!(!is_version_element("v0"));
        assert!(!is_version_element("v1"));
        assert!(!is_version_element("v05"));
        assert!(!is_version_element("v1x"));
        assert!(!is_version_element("x2"));
    }

    #[test]
    fn exec_name_skips_version_element() {
        assert_eq!(
            exec_name("google.golang.org/protobuf/cmd/protoc-gen-go"),
            "protoc-gen-go"
        );
        assert_eq!(exec_name("github.com/foo/bar/v2"), "bar");
        assert_eq!(exec_name("github.com/foo/bar/v1"), "v1");
        assert_eq!(exec_name("v2"), "v2");
    }

    #[test]
    fn repository_names() {
        assert_eq!(
            repository_name("https://github.com/googleapis/googleapis"),
            "googleapis"
        );
        assert_eq!(repository_name("https://github.com/a/b/"), "b");
    }

    #[test]
    #[serial]
    fn from_env_honors_override() {
        std::env::set_var(ENV_HOME, "/custom/home");
        let store = ArtifactStore::from_env();
        std::env::remove_var(ENV_HOME);
        assert_eq!(store.root(), Path::new("/custom/home"));
    }

    #[test]
    #[serial]
    fn from_env_defaults_to_dotdir() {
        std::env::remove_var(ENV_HOME);
        let store = ArtifactStore::from_env();
        assert!(store.root().ends_with(".protopin"));
    }
}
