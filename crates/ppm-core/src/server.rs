//! Server version probe
//!
//! PaperMC writes a `version_history.json` into the server directory. The
//! `currentVersion` field looks like "1.21.4-123-abcdef"; the part before
//! the first dash is the game version every compatibility check uses.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{PpmError, Result};

pub const VERSION_HISTORY_FILE: &str = "version_history.json";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionHistory {
    current_version: String,
}

/// Read the game version from `version_history.json` under `dir`.
///
/// A missing or unparsable file is `ServerVersionUnknown` - commands that
/// need the version fail fast instead of guessing.
pub fn game_version(dir: &Path) -> Result<String> {
    let path = dir.join(VERSION_HISTORY_FILE);
    let content = fs::read_to_string(&path).map_err(|_| PpmError::ServerVersionUnknown)?;
    let history: VersionHistory =
        serde_json::from_str(&content).map_err(|_| PpmError::ServerVersionUnknown)?;
    let version = history
        .current_version
        .split('-')
        .next()
        .unwrap_or_default();
    if version.is_empty() {
        return Err(PpmError::ServerVersionUnknown);
    }
    Ok(version.to_string())
}
