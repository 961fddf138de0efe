//! Model version label bookkeeping.
//!
//! `FullTrain` auto-increments the `major.minor` version; `IncrementalTrain`
//! never changes the label's lineage, it appends a patch counter onto the
//! parent it fine-tuned from. Kept as a standalone, easily-tested module
//! rather than inlined string formatting in `controller.rs`.

use thiserror::Error;

#[derive(Debug, Error)]
#[error("not a major.minor[.patch] version label: {0:?}")]
pub struct VersionParseError(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ParsedVersion {
    major: u32,
    minor: u32,
    patch: u32,
}

fn parse(label: &str) -> Result<ParsedVersion, VersionParseError> {
    let trimmed = label.strip_prefix('v').unwrap_or(label);
    let mut parts = trimmed.split('.');
    let major = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| VersionParseError(label.to_string()))?;
    let minor = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| VersionParseError(label.to_string()))?;
    let patch = match parts.next() {
        Some(p) => p.parse().map_err(|_| VersionParseError(label.to_string()))?,
        None => 0,
    };
    Ok(ParsedVersion { major, minor, patch })
}

/// `v3.2` -> `v3.3`. Used by the weekly full-retrain to mint the challenger
/// version label before it registers the `ModelVersion` row.
pub fn bump_minor(current: &str) -> Result<String, VersionParseError> {
    let v = parse(current)?;
    Ok(format!("v{}.{}", v.major, v.minor + 1))
}

/// `v3.3` -> `v3.3.1` -> `v3.3.2` ..., derived from how many incremental
/// children `parent` already has. Keeps the parent's `major.minor` lineage
/// visible in the label rather than minting an unrelated version number.
pub fn next_incremental_label(parent: &str, existing_children: u32) -> Result<String, VersionParseError> {
    let v = parse(parent)?;
    Ok(format!("v{}.{}.{}", v.major, v.minor, existing_children + 1))
}
