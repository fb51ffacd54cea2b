//! Shared test fixtures: an in-memory registry double and record builders.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use chrono::{TimeZone, Utc};

use crate::error::{PpmError, Result};
use crate::registry::{DownloadProgress, Registry};
use crate::types::{Channel, ProjectRecord, SearchHit, VersionRecord};

pub fn version(project_id: &str, id: &str, sha1: &str, channel: Channel, t: i64) -> VersionRecord {
    VersionRecord {
        id: id.to_string(),
        project_id: project_id.to_string(),
        name: format!("v-{id}"),
        channel,
        published_at: Utc.timestamp_opt(t, 0).unwrap(),
        game_versions: vec!["1.21".to_string()],
        url: format!("https://example.invalid/{id}.jar"),
        sha1: sha1.to_string(),
        description: String::new(),
    }
}

pub fn project(id: &str, name: &str, versions: Vec<VersionRecord>) -> ProjectRecord {
    ProjectRecord {
        source: "mock".to_string(),
        id: id.to_string(),
        name: name.to_string(),
        author: "author".to_string(),
        description: Some("test plugin".to_string()),
        downloads: 7,
        versions: versions.into_iter().map(|v| (v.id.clone(), v)).collect(),
    }
}

/// Registry double backed by plain maps. Hash and project lookups miss
/// with the same typed NotFound the real adapters produce; `fail_transport`
/// turns every call into a transport error instead.
#[derive(Default)]
pub struct MockRegistry {
    pub projects: HashMap<String, ProjectRecord>,
    /// Artifact bytes per version id, served by `download`.
    pub artifacts: HashMap<String, Vec<u8>>,
    pub fail_transport: bool,
}

impl MockRegistry {
    pub fn with_project(mut self, project: ProjectRecord) -> Self {
        self.projects.insert(project.id.clone(), project);
        self
    }

    pub fn with_artifact(mut self, version_id: &str, bytes: &[u8]) -> Self {
        self.artifacts.insert(version_id.to_string(), bytes.to_vec());
        self
    }

    fn check_transport(&self) -> Result<()> {
        if self.fail_transport {
            return Err(PpmError::MalformedResponse {
                registry: "mock".to_string(),
                message: "simulated transport failure".to_string(),
            });
        }
        Ok(())
    }
}

impl Registry for MockRegistry {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn resolve_by_hash(&self, sha1: &str) -> Result<VersionRecord> {
        self.check_transport()?;
        self.projects
            .values()
            .flat_map(|p| p.versions.values())
            .find(|v| v.sha1 == sha1)
            .cloned()
            .ok_or_else(|| PpmError::NotFound {
                what: sha1.to_string(),
            })
    }

    fn resolve_project(&self, project_id: &str) -> Result<ProjectRecord> {
        self.check_transport()?;
        self.projects
            .get(project_id)
            .cloned()
            .ok_or_else(|| PpmError::NotFound {
                what: project_id.to_string(),
            })
    }

    fn search(
        &self,
        query: &str,
        _game_version: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        self.check_transport()?;
        let needle = query.to_ascii_lowercase();
        Ok(self
            .projects
            .values()
            .filter(|p| p.name.to_ascii_lowercase().contains(&needle))
            .take(limit)
            .map(|p| SearchHit {
                source: "mock".to_string(),
                id: p.id.clone(),
                name: p.name.clone(),
                author: p.author.clone(),
                description: p.description.clone(),
                downloads: p.downloads,
                game_versions: vec![],
            })
            .collect())
    }

    fn download(
        &self,
        version: &VersionRecord,
        dest: &Path,
        progress: DownloadProgress<'_>,
    ) -> Result<()> {
        self.check_transport()?;
        let bytes = self
            .artifacts
            .get(&version.id)
            .ok_or_else(|| PpmError::DownloadFailed {
                url: version.url.clone(),
                message: "no artifact registered".to_string(),
            })?;
        fs::write(dest, bytes)?;
        progress(bytes.len() as u64, Some(bytes.len() as u64));
        Ok(())
    }
}
