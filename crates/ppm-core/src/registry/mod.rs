//! Remote plugin registries
//!
//! A registry indexes plugin projects and serves their downloadable
//! versions. The core only relies on the capability contract below; wire
//! formats live in the per-source adapters.

mod modrinth;

use std::path::Path;

pub use modrinth::Modrinth;

use crate::error::{PpmError, Result};
use crate::types::{ProjectRecord, SearchHit, VersionRecord};

/// Byte-progress observer for downloads: (bytes so far, total if known).
pub type DownloadProgress<'a> = &'a mut dyn FnMut(u64, Option<u64>);

/// Capability contract every registry adapter implements.
///
/// "Not found" is the typed `PpmError::NotFound`, so callers can tell a
/// missing record from a transport failure without sniffing status codes.
pub trait Registry {
    /// Source name as stored on project records.
    fn name(&self) -> &'static str;

    /// Resolve a content hash to the version whose primary artifact has
    /// that hash.
    fn resolve_by_hash(&self, sha1: &str) -> Result<VersionRecord>;

    /// Fetch a project with its full version catalog.
    fn resolve_project(&self, project_id: &str) -> Result<ProjectRecord>;

    /// Fuzzy project discovery. Returns partial records only.
    fn search(
        &self,
        query: &str,
        game_version: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SearchHit>>;

    /// Stream a version's primary artifact to `dest`.
    fn download(
        &self,
        version: &VersionRecord,
        dest: &Path,
        progress: DownloadProgress<'_>,
    ) -> Result<()>;
}

// The set of supported sources is fixed at build time; a name-to-constructor
// table replaces runtime discovery.
type Constructor = fn() -> Result<Box<dyn Registry>>;

const REGISTRIES: &[(&str, Constructor)] =
    &[("modrinth", || Ok(Box::new(Modrinth::new()?)))];

/// Names of all supported registry sources.
pub fn registry_names() -> Vec<&'static str> {
    REGISTRIES.iter().map(|(name, _)| *name).collect()
}

/// Construct the registry adapter for `source` (case-insensitive).
pub fn connect(source: &str) -> Result<Box<dyn Registry>> {
    let wanted = source.to_ascii_lowercase();
    match REGISTRIES.iter().find(|(name, _)| *name == wanted) {
        Some((_, build)) => build(),
        None => Err(PpmError::UnknownRegistry {
            name: source.to_string(),
        }),
    }
}
