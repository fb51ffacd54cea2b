//! Plugin catalog types
//!
//! Records exchanged between the local store, the registries and the CLI.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PpmError;

/// Release channel of a published version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Release,
    Beta,
    Alpha,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Release => "release",
            Self::Beta => "beta",
            Self::Alpha => "alpha",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = PpmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "release" => Ok(Self::Release),
            "beta" => Ok(Self::Beta),
            "alpha" => Ok(Self::Alpha),
            _ => Err(PpmError::InvalidChannel {
                value: s.to_string(),
            }),
        }
    }
}

/// A single published version of a plugin project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionRecord {
    /// Registry-assigned version id (unique within the project)
    pub id: String,
    /// Owning project id
    pub project_id: String,
    /// Display name, e.g. "1.21.4-build2"
    pub name: String,
    pub channel: Channel,
    pub published_at: DateTime<Utc>,
    /// Game versions this build declares compatibility with
    pub game_versions: Vec<String>,
    /// Download URL of the primary artifact
    pub url: String,
    /// SHA-1 of the primary artifact - the join key to installations
    pub sha1: String,
    #[serde(default)]
    pub description: String,
}

impl VersionRecord {
    /// Prefix match against the declared game versions.
    pub fn supports(&self, game_version: &str) -> bool {
        self.game_versions
            .iter()
            .any(|g| g == game_version || g.starts_with(game_version))
    }
}

/// A plugin project as known by a registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRecord {
    /// Which registry this record came from
    pub source: String,
    /// Registry-assigned project id
    pub id: String,
    pub name: String,
    pub author: String,
    pub description: Option<String>,
    pub downloads: u64,
    /// Full version catalog, keyed by version id
    #[serde(default)]
    pub versions: HashMap<String, VersionRecord>,
}

impl ProjectRecord {
    /// Look up a version by id first, then by display name.
    pub fn version(&self, id_or_name: &str) -> Option<&VersionRecord> {
        self.versions
            .get(id_or_name)
            .or_else(|| self.versions.values().find(|v| v.name == id_or_name))
    }
}

/// A file observed in the plugin directory, keyed by content hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationRecord {
    /// Filename as currently present on disk
    pub filename: String,
    pub sha1: String,
    pub size: u64,
    /// Channel the user chose to receive upgrades from
    pub tracked: Channel,
}

/// A project joined with its currently installed version
#[derive(Debug, Clone)]
pub struct ResolvedProject {
    pub project: ProjectRecord,
    pub installed: VersionRecord,
    pub filename: String,
    pub tracked: Channel,
}

/// Partial project record returned by registry search
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub source: String,
    pub id: String,
    pub name: String,
    pub author: String,
    pub description: Option<String>,
    pub downloads: u64,
    pub game_versions: Vec<String>,
}
