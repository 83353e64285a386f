//! Version handling: binding strings and semantic-version ordering

pub mod resolver;

pub use resolver::VersionResolver;

use crate::error::{ProtopinError, ProtopinResult};
use crate::store::normalize_version;

/// Symbolic version resolved to a concrete one before use
pub const LATEST: &str = "latest";

/// Whether a version specifier is symbolic
pub fn is_symbolic(version: &str) -> bool {
    version == LATEST
}

/// Split a binding string on its first `@` into identity and version.
///
/// Every plugin/repository binding must have both halves; violation is a
/// fatal configuration error.
pub fn split_binding(binding: &str) -> ProtopinResult<(String, String)> {
    match binding.split_once('@') {
        Some((identity, version)) if !identity.is_empty() && !version.is_empty() => {
            Ok((identity.to_string(), version.to_string()))
        }
        _ => Err(ProtopinError::InvalidBinding(binding.to_string())),
    }
}

/// Join identity and version back into a binding string
pub fn join_binding(identity: &str, version: &str) -> String {
    format!("{identity}@{version}")
}

/// Split tags into (malformed, well-formed-ascending).
///
/// A tag is well-formed when it parses as a semantic version after the
/// optional leading `v` is stripped. Well-formed tags sort ascending by
/// semantic-version order; malformed tags sort lexically and come first in
/// the combined ordering, so "latest" is always the last well-formed tag.
pub fn sort_versions(tags: &[String]) -> (Vec<String>, Vec<String>) {
    let mut malformed = Vec::new();
    let mut parsed: Vec<(semver::Version, String)> = Vec::new();
    for tag in tags {
        match semver::Version::parse(normalize_version(tag)) {
            Ok(version) => parsed.push((version, tag.clone())),
            Err(_) => malformed.push(tag.clone()),
        }
    }
    malformed.sort();
    parsed.sort_by(|a, b| a.0.cmp(&b.0));
    (malformed, parsed.into_iter().map(|(_, tag)| tag).collect())
}

/// Full ordering: malformed tags first, then well-formed ascending
pub fn order_versions(tags: &[String]) -> Vec<String> {
    let (malformed, well_formed) = sort_versions(tags);
    malformed.into_iter().chain(well_formed).collect()
}
