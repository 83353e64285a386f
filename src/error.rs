//! Error types for protopin
//!
//! All modules use `ProtopinResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for protopin operations
pub type ProtopinResult<T> = Result<T, ProtopinError>;

/// All errors that can occur in protopin
#[derive(Error, Debug)]
pub enum ProtopinError {
    // Configuration errors
    #[error("no configuration governs {0}")]
    ConfigNotFound(PathBuf),

    #[error("invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("invalid binding '{0}', expected <identity>@<version>")]
    InvalidBinding(String),

    #[error("protoc version is required: {0}")]
    MissingCompilerVersion(PathBuf),

    // Resolution errors
    #[error("no versions published for {0}")]
    EmptyVersionList(String),

    #[error("unable to resolve module versions for {package}: {details}")]
    ModuleLookup { package: String, details: String },

    #[error("invalid module path '{path}': {reason}")]
    InvalidModulePath { path: String, reason: String },

    #[error("invalid repository uri: {0}")]
    InvalidRepositoryUri(String),

    // Installation errors
    #[error("failed to download {url}{}: {reason}", .status.map(|c| format!(" (status {c})")).unwrap_or_default())]
    Download {
        url: String,
        status: Option<u16>,
        reason: String,
    },

    #[error("protoc has no published release for {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("failed to unpack archive {path}: {reason}")]
    Archive { path: PathBuf, reason: String },

    // Process errors
    #[error("failed to spawn {command}")]
    CommandSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command failed: {command} (in {dir}), exit code {code}, stderr: {stderr}")]
    CommandFailed {
        command: String,
        dir: String,
        code: i32,
        stdout: String,
        stderr: String,
    },

    // Post-step errors
    #[error("unknown post action: {0}")]
    UnknownAction(String),

    #[error("post action {name} failed for {config}: {reason}")]
    ActionFailed {
        name: String,
        config: PathBuf,
        reason: String,
    },

    #[error("absolute path {path} is not allowed in action {action}")]
    AbsoluteActionPath { action: String, path: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // General errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl ProtopinError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a download error for a URL, optionally with the HTTP status
    pub fn download(url: impl Into<String>, status: Option<u16>, reason: impl Into<String>) -> Self {
        Self::Download {
            url: url.into(),
            status,
            reason: reason.into(),
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ConfigNotFound(_) => {
                Some("create a protopin.yaml whose scopes cover this file, or check the scopes of an existing one")
            }
            Self::InvalidBinding(_) => {
                Some("bindings must look like google.golang.org/protobuf/cmd/protoc-gen-go@v1.28.1")
            }
            Self::MissingCompilerVersion(_) => Some("set 'protoc' to a version like v3.21.12, or 'latest'"),
            _ => None,
        }
    }
}
