//! Modrinth v2 adapter
//!
//! Hash lookups go through `/version_file/{sha1}`, project metadata through
//! `/project/{id}` plus its members and version listing, discovery through
//! the faceted `/search` endpoint. Version listings are filtered to the
//! `paper` loader.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::debug;
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{PpmError, Result};
use crate::registry::{DownloadProgress, Registry};
use crate::types::{Channel, ProjectRecord, SearchHit, VersionRecord};

const API_BASE: &str = "https://api.modrinth.com/v2";
// Modrinth requires a uniquely identifying User-Agent.
const USER_AGENT: &str = concat!("ynishi/ppm/", env!("CARGO_PKG_VERSION"));
const SOURCE: &str = "modrinth";

pub struct Modrinth {
    client: Client,
}

// ========== Wire format ==========

#[derive(Debug, Deserialize)]
struct ApiVersion {
    id: String,
    project_id: String,
    version_number: String,
    version_type: String,
    date_published: DateTime<Utc>,
    game_versions: Vec<String>,
    files: Vec<ApiFile>,
    #[serde(default)]
    changelog: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiFile {
    url: String,
    #[serde(default)]
    primary: bool,
    hashes: ApiHashes,
}

#[derive(Debug, Deserialize)]
struct ApiHashes {
    sha1: String,
}

#[derive(Debug, Deserialize)]
struct ApiProject {
    id: String,
    title: String,
    #[serde(default)]
    description: Option<String>,
    downloads: u64,
}

#[derive(Debug, Deserialize)]
struct ApiMember {
    role: String,
    user: ApiUser,
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    username: String,
}

#[derive(Debug, Deserialize)]
struct ApiSearch {
    hits: Vec<ApiHit>,
}

#[derive(Debug, Deserialize)]
struct ApiHit {
    project_id: String,
    title: String,
    author: String,
    #[serde(default)]
    description: Option<String>,
    downloads: u64,
    #[serde(default)]
    versions: Vec<String>,
}

impl ApiVersion {
    fn into_record(self) -> Result<VersionRecord> {
        let channel: Channel =
            self.version_type
                .parse()
                .map_err(|_| PpmError::MalformedResponse {
                    registry: SOURCE.to_string(),
                    message: format!("unknown version type '{}'", self.version_type),
                })?;
        let file = self
            .files
            .iter()
            .find(|f| f.primary)
            .or_else(|| self.files.first())
            .ok_or_else(|| PpmError::MalformedResponse {
                registry: SOURCE.to_string(),
                message: format!("version {} has no downloadable files", self.id),
            })?;
        Ok(VersionRecord {
            id: self.id,
            project_id: self.project_id,
            name: self.version_number,
            channel,
            published_at: self.date_published,
            game_versions: self.game_versions,
            url: file.url.clone(),
            sha1: file.hashes.sha1.to_ascii_lowercase(),
            description: self.changelog.unwrap_or_default(),
        })
    }
}

impl Modrinth {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }

    fn get(&self, path: &str, params: &[(&str, String)]) -> Result<Response> {
        let url = format!("{API_BASE}{path}");
        debug!("GET {url}");
        let resp = self.client.get(&url).query(params).send()?;
        check_status(resp, path)
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str, params: &[(&str, String)]) -> Result<T> {
        self.get(path, params)?
            .json()
            .map_err(|e| PpmError::MalformedResponse {
                registry: SOURCE.to_string(),
                message: e.to_string(),
            })
    }

    fn project_versions(&self, project_id: &str) -> Result<Vec<VersionRecord>> {
        let versions: Vec<ApiVersion> = self.get_json(
            &format!("/project/{project_id}/version"),
            &[("loaders", r#"["paper"]"#.to_string())],
        )?;
        versions.into_iter().map(ApiVersion::into_record).collect()
    }

    fn project_author(&self, project_id: &str) -> Result<String> {
        let members: Vec<ApiMember> =
            self.get_json(&format!("/project/{project_id}/members"), &[])?;
        Ok(members
            .into_iter()
            .find(|m| m.role == "Owner")
            .map(|m| m.user.username)
            .unwrap_or_else(|| "Unknown".to_string()))
    }
}

impl Registry for Modrinth {
    fn name(&self) -> &'static str {
        SOURCE
    }

    fn resolve_by_hash(&self, sha1: &str) -> Result<VersionRecord> {
        let version: ApiVersion = self.get_json(&format!("/version_file/{sha1}"), &[])?;
        version.into_record()
    }

    fn resolve_project(&self, project_id: &str) -> Result<ProjectRecord> {
        let project: ApiProject = self.get_json(&format!("/project/{project_id}"), &[])?;
        let author = self.project_author(&project.id)?;
        let versions = self.project_versions(&project.id)?;
        Ok(ProjectRecord {
            source: SOURCE.to_string(),
            id: project.id,
            name: project.title,
            author,
            description: project.description,
            downloads: project.downloads,
            versions: versions.into_iter().map(|v| (v.id.clone(), v)).collect(),
        })
    }

    fn search(
        &self,
        query: &str,
        game_version: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        // "categories" covers loaders in search facets.
        let mut facets = vec![
            vec!["categories:paper".to_string()],
            vec!["project_type:plugin".to_string()],
        ];
        if let Some(gv) = game_version {
            facets.push(vec![format!("versions:{gv}")]);
        }
        let result: ApiSearch = self.get_json(
            "/search",
            &[
                ("query", query.to_string()),
                ("limit", limit.to_string()),
                ("index", "relevance".to_string()),
                ("facets", serde_json::to_string(&facets).unwrap_or_default()),
            ],
        )?;
        Ok(result
            .hits
            .into_iter()
            .map(|hit| SearchHit {
                source: SOURCE.to_string(),
                id: hit.project_id,
                name: hit.title,
                author: hit.author,
                description: hit.description,
                downloads: hit.downloads,
                game_versions: hit.versions,
            })
            .collect())
    }

    fn download(
        &self,
        version: &VersionRecord,
        dest: &Path,
        progress: DownloadProgress<'_>,
    ) -> Result<()> {
        debug!("downloading {} to {}", version.url, dest.display());
        let resp = self.client.get(&version.url).send()?;
        if !resp.status().is_success() {
            return Err(PpmError::DownloadFailed {
                url: version.url.clone(),
                message: format!("HTTP {}", resp.status()),
            });
        }
        let total = resp.content_length();
        let mut reader = resp;
        let mut file = File::create(dest)?;
        let mut buf = vec![0u8; 256 * 1024];
        let mut done: u64 = 0;
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n])?;
            done += n as u64;
            progress(done, total);
        }
        file.flush()?;
        Ok(())
    }
}

fn check_status(resp: Response, what: &str) -> Result<Response> {
    match resp.status() {
        StatusCode::NOT_FOUND => Err(PpmError::NotFound {
            what: what.to_string(),
        }),
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = resp
                .headers()
                .get("X-Ratelimit-Reset")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("?")
                .to_string();
            Err(PpmError::RateLimited {
                registry: SOURCE.to_string(),
                retry_after,
            })
        }
        _ => Ok(resp.error_for_status()?),
    }
}
