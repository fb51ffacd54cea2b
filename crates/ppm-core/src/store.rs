//! Local plugin catalog
//!
//! SQLite-backed record of every project and version we have resolved, and
//! of every file currently sitting in the plugin directory. Installations
//! are keyed by content hash so renames never create duplicates; the hash
//! is also the join key from an installation to its version record.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use log::debug;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::Result;
use crate::types::{Channel, InstallationRecord, ProjectRecord, ResolvedProject, VersionRecord};

/// Schema DDL, replayed with `CREATE … IF NOT EXISTS` on every open so it
/// is safe against an already-initialised database.
const SCHEMA_STATEMENTS: &[&str] = &[
    // project_id is the global key: it backs the versions FK and the upsert
    // conflict target, so one registry id maps to one row even if a second
    // source later claims it (the re-resolve takes the row over).
    "CREATE TABLE IF NOT EXISTS projects (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        source TEXT NOT NULL,
        project_id TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        author TEXT NOT NULL,
        description TEXT,
        downloads INTEGER NOT NULL DEFAULT 0
    );",
    "CREATE TABLE IF NOT EXISTS versions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        project_id TEXT NOT NULL REFERENCES projects(project_id) ON DELETE CASCADE,
        version_id TEXT NOT NULL,
        name TEXT NOT NULL,
        channel TEXT NOT NULL,
        published_at TEXT NOT NULL,
        game_versions TEXT NOT NULL DEFAULT '[]',
        url TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        sha1 TEXT NOT NULL UNIQUE,
        UNIQUE(project_id, version_id)
    );",
    "CREATE TABLE IF NOT EXISTS installations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        filename TEXT NOT NULL,
        sha1 TEXT NOT NULL UNIQUE,
        size INTEGER NOT NULL,
        tracked_channel TEXT NOT NULL DEFAULT 'release'
    );",
    "CREATE INDEX IF NOT EXISTS idx_projects_name ON projects(name);",
    "CREATE INDEX IF NOT EXISTS idx_versions_project ON versions(project_id);",
    "CREATE INDEX IF NOT EXISTS idx_versions_sha1 ON versions(sha1);",
    "CREATE INDEX IF NOT EXISTS idx_installations_sha1 ON installations(sha1);",
];

/// SQLite catalog store. Single connection, single process; every logical
/// upsert is one autocommitted statement so a crash mid-pass leaves only
/// per-row consistent state behind.
pub struct LocalStore {
    conn: Connection,
}

impl LocalStore {
    /// Open (and initialise if needed) the store at `path`. Parent
    /// directories are created if missing.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        for stmt in SCHEMA_STATEMENTS {
            conn.execute_batch(stmt)?;
        }
        Ok(Self { conn })
    }

    // ========== Installations ==========

    pub fn installation(&self, sha1: &str) -> Result<Option<InstallationRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT filename, sha1, size, tracked_channel FROM installations WHERE sha1 = ?1",
                params![sha1],
                row_to_installation,
            )
            .optional()?;
        Ok(record)
    }

    pub fn installations(&self) -> Result<Vec<InstallationRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT filename, sha1, size, tracked_channel FROM installations ORDER BY filename",
        )?;
        let rows = stmt.query_map([], row_to_installation)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Record a file observed in the plugin directory. New hashes are
    /// inserted; a known hash with a different filename is a rename and
    /// only the filename/size are refreshed, keeping the tracked channel.
    /// Safe to call repeatedly with identical arguments.
    pub fn upsert_installation(&self, filename: &str, sha1: &str, size: u64) -> Result<()> {
        match self.installation(sha1)? {
            None => {
                debug!("found new installation: {filename} ({sha1})");
                self.conn.execute(
                    "INSERT INTO installations (filename, sha1, size) VALUES (?1, ?2, ?3)",
                    params![filename, sha1, size],
                )?;
            }
            Some(existing) => {
                if existing.filename != filename {
                    debug!(
                        "installation renamed: {} -> {filename}",
                        existing.filename
                    );
                }
                self.conn.execute(
                    "UPDATE installations SET filename = ?1, size = ?2 WHERE sha1 = ?3",
                    params![filename, size, sha1],
                )?;
            }
        }
        Ok(())
    }

    /// Drop every installation whose hash is not in `valid` - files deleted
    /// from disk since the last scan. Version and project rows stay.
    pub fn prune_installations(&self, valid: &HashSet<String>) -> Result<()> {
        for record in self.installations()? {
            if !valid.contains(&record.sha1) {
                debug!(
                    "removing stale installation: {} ({})",
                    record.filename, record.sha1
                );
                self.remove_installation(&record.sha1)?;
            }
        }
        Ok(())
    }

    pub fn remove_installation(&self, sha1: &str) -> Result<()> {
        self.conn.execute(
            "DELETE FROM installations WHERE sha1 = ?1",
            params![sha1],
        )?;
        Ok(())
    }

    pub fn set_tracked_channel(&self, sha1: &str, channel: Channel) -> Result<()> {
        self.conn.execute(
            "UPDATE installations SET tracked_channel = ?1 WHERE sha1 = ?2",
            params![channel.as_str(), sha1],
        )?;
        Ok(())
    }

    // ========== Versions ==========

    pub fn version_by_hash(&self, sha1: &str) -> Result<Option<VersionRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT project_id, version_id, name, channel, published_at, game_versions, \
                        url, sha1, description \
                 FROM versions WHERE sha1 = ?1",
                params![sha1],
                row_to_version,
            )
            .optional()?;
        Ok(record)
    }

    fn versions_of(&self, project_id: &str) -> Result<HashMap<String, VersionRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT project_id, version_id, name, channel, published_at, game_versions, \
                    url, sha1, description \
             FROM versions WHERE project_id = ?1",
        )?;
        let rows = stmt.query_map(params![project_id], row_to_version)?;
        let mut versions = HashMap::new();
        for row in rows {
            let version = row?;
            versions.insert(version.id.clone(), version);
        }
        Ok(versions)
    }

    // ========== Projects ==========

    pub fn project_by_id(&self, project_id: &str) -> Result<Option<ProjectRecord>> {
        let head = self
            .conn
            .query_row(
                "SELECT source, project_id, name, author, description, downloads \
                 FROM projects WHERE project_id = ?1",
                params![project_id],
                row_to_project_head,
            )
            .optional()?;
        self.attach_versions(head)
    }

    /// Case-sensitive exact name match. Fuzzy matching belongs to callers.
    pub fn project_by_name(&self, name: &str) -> Result<Option<ProjectRecord>> {
        let head = self
            .conn
            .query_row(
                "SELECT source, project_id, name, author, description, downloads \
                 FROM projects WHERE name = ?1",
                params![name],
                row_to_project_head,
            )
            .optional()?;
        self.attach_versions(head)
    }

    /// Convenience lookup: id first, then exact name.
    pub fn project(&self, id_or_name: &str) -> Result<Option<ProjectRecord>> {
        if let Some(project) = self.project_by_id(id_or_name)? {
            return Ok(Some(project));
        }
        self.project_by_name(id_or_name)
    }

    /// Join installation -> version -> project. None when the hash is
    /// unrecognized or recognized but never resolved.
    pub fn project_by_hash(&self, sha1: &str) -> Result<Option<ProjectRecord>> {
        let Some(version) = self.version_by_hash(sha1)? else {
            return Ok(None);
        };
        self.project_by_id(&version.project_id)
    }

    fn attach_versions(&self, head: Option<ProjectRecord>) -> Result<Option<ProjectRecord>> {
        match head {
            None => Ok(None),
            Some(mut project) => {
                project.versions = self.versions_of(&project.id)?;
                Ok(Some(project))
            }
        }
    }

    /// Upsert the project row and every contained version row. Each row is
    /// its own atomic statement. A version hash that already belongs to a
    /// different version row is reassigned to the newest writer.
    pub fn save_project(&self, project: &ProjectRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO projects (source, project_id, name, author, description, downloads) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT(project_id) DO UPDATE SET \
                source = excluded.source, name = excluded.name, author = excluded.author, \
                description = excluded.description, downloads = excluded.downloads",
            params![
                project.source,
                project.id,
                project.name,
                project.author,
                project.description,
                project.downloads,
            ],
        )?;
        for version in project.versions.values() {
            // Content hashes are globally unique; the most recent write wins.
            self.conn.execute(
                "DELETE FROM versions WHERE sha1 = ?1 \
                 AND NOT (project_id = ?2 AND version_id = ?3)",
                params![version.sha1, version.project_id, version.id],
            )?;
            self.conn.execute(
                "INSERT INTO versions (project_id, version_id, name, channel, published_at, \
                                       game_versions, url, description, sha1) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
                 ON CONFLICT(project_id, version_id) DO UPDATE SET \
                    name = excluded.name, channel = excluded.channel, \
                    published_at = excluded.published_at, \
                    game_versions = excluded.game_versions, url = excluded.url, \
                    description = excluded.description, sha1 = excluded.sha1",
                params![
                    version.project_id,
                    version.id,
                    version.name,
                    version.channel.as_str(),
                    version.published_at,
                    serde_json::to_string(&version.game_versions).unwrap_or_default(),
                    version.url,
                    version.description,
                    version.sha1,
                ],
            )?;
        }
        Ok(())
    }

    // ========== Joined views ==========

    /// The installation (if any) whose hash belongs to one of the project's
    /// versions - "the currently installed version of this project".
    pub fn installed_version(
        &self,
        project_id: &str,
    ) -> Result<Option<(VersionRecord, InstallationRecord)>> {
        for installation in self.installations()? {
            if let Some(version) = self.version_by_hash(&installation.sha1)? {
                if version.project_id == project_id {
                    return Ok(Some((version, installation)));
                }
            }
        }
        Ok(None)
    }

    /// Split the installation table into resolved project views and
    /// unrecognized leftovers.
    pub fn resolved_projects(
        &self,
    ) -> Result<(Vec<ResolvedProject>, Vec<InstallationRecord>)> {
        let mut resolved = Vec::new();
        let mut unrecognized = Vec::new();
        for installation in self.installations()? {
            let version = self.version_by_hash(&installation.sha1)?;
            let project = match &version {
                Some(v) => self.project_by_id(&v.project_id)?,
                None => None,
            };
            match (version, project) {
                (Some(installed), Some(project)) => resolved.push(ResolvedProject {
                    project,
                    installed,
                    filename: installation.filename.clone(),
                    tracked: installation.tracked,
                }),
                _ => unrecognized.push(installation),
            }
        }
        Ok((resolved, unrecognized))
    }
}

// ========== Row mappers ==========

fn row_to_installation(row: &Row<'_>) -> rusqlite::Result<InstallationRecord> {
    let tracked: String = row.get(3)?;
    Ok(InstallationRecord {
        filename: row.get(0)?,
        sha1: row.get(1)?,
        size: row.get(2)?,
        tracked: tracked
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?,
    })
}

fn row_to_version(row: &Row<'_>) -> rusqlite::Result<VersionRecord> {
    let channel: String = row.get(3)?;
    let published_at: DateTime<Utc> = row.get(4)?;
    let game_versions: String = row.get(5)?;
    Ok(VersionRecord {
        project_id: row.get(0)?,
        id: row.get(1)?,
        name: row.get(2)?,
        channel: channel
            .parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?,
        published_at,
        game_versions: serde_json::from_str(&game_versions)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?,
        url: row.get(6)?,
        sha1: row.get(7)?,
        description: row.get(8)?,
    })
}

fn row_to_project_head(row: &Row<'_>) -> rusqlite::Result<ProjectRecord> {
    Ok(ProjectRecord {
        source: row.get(0)?,
        id: row.get(1)?,
        name: row.get(2)?,
        author: row.get(3)?,
        description: row.get(4)?,
        downloads: row.get(5)?,
        versions: HashMap::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn version(project_id: &str, id: &str, sha1: &str, channel: Channel) -> VersionRecord {
        VersionRecord {
            id: id.to_string(),
            project_id: project_id.to_string(),
            name: format!("name-{id}"),
            channel,
            published_at: Utc.timestamp_opt(100, 0).unwrap(),
            game_versions: vec!["1.21".to_string()],
            url: format!("https://example.invalid/{id}.jar"),
            sha1: sha1.to_string(),
            description: String::new(),
        }
    }

    fn project(id: &str, name: &str, versions: Vec<VersionRecord>) -> ProjectRecord {
        ProjectRecord {
            source: "modrinth".to_string(),
            id: id.to_string(),
            name: name.to_string(),
            author: "author".to_string(),
            description: Some("a plugin".to_string()),
            downloads: 42,
            versions: versions.into_iter().map(|v| (v.id.clone(), v)).collect(),
        }
    }

    #[test]
    fn upsert_installation_is_idempotent() {
        let store = LocalStore::open_in_memory().unwrap();
        store.upsert_installation("a.jar", "h1", 10).unwrap();
        store.upsert_installation("a.jar", "h1", 10).unwrap();
        let all = store.installations().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].filename, "a.jar");
        assert_eq!(all[0].size, 10);
    }

    #[test]
    fn rename_updates_in_place() {
        let store = LocalStore::open_in_memory().unwrap();
        store.upsert_installation("a.jar", "h1", 10).unwrap();
        store.set_tracked_channel("h1", Channel::Beta).unwrap();
        store.upsert_installation("b.jar", "h1", 10).unwrap();
        let all = store.installations().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].filename, "b.jar");
        // rename must not reset the tracked channel
        assert_eq!(all[0].tracked, Channel::Beta);
    }

    #[test]
    fn prune_keeps_only_valid_hashes() {
        let store = LocalStore::open_in_memory().unwrap();
        store.upsert_installation("a.jar", "h1", 1).unwrap();
        store.upsert_installation("b.jar", "h2", 2).unwrap();
        let valid = HashSet::from(["h2".to_string()]);
        store.prune_installations(&valid).unwrap();
        assert!(store.installation("h1").unwrap().is_none());
        assert!(store.installation("h2").unwrap().is_some());
    }

    #[test]
    fn prune_leaves_version_catalog_alone() {
        let store = LocalStore::open_in_memory().unwrap();
        let p = project("p1", "Example", vec![version("p1", "v1", "h1", Channel::Release)]);
        store.save_project(&p).unwrap();
        store.upsert_installation("a.jar", "h1", 1).unwrap();
        store.prune_installations(&HashSet::new()).unwrap();
        assert!(store.installation("h1").unwrap().is_none());
        assert!(store.version_by_hash("h1").unwrap().is_some());
    }

    #[test]
    fn save_project_upserts_and_refreshes() {
        let store = LocalStore::open_in_memory().unwrap();
        let mut p = project("p1", "Example", vec![version("p1", "v1", "h1", Channel::Release)]);
        store.save_project(&p).unwrap();
        p.name = "Renamed".to_string();
        p.downloads = 100;
        store.save_project(&p).unwrap();
        let loaded = store.project_by_id("p1").unwrap().unwrap();
        assert_eq!(loaded.name, "Renamed");
        assert_eq!(loaded.downloads, 100);
        assert_eq!(loaded.versions.len(), 1);
        assert!(store.project_by_name("Renamed").unwrap().is_some());
        assert!(store.project_by_name("renamed").unwrap().is_none());
    }

    #[test]
    fn project_id_is_one_row_across_sources() {
        let store = LocalStore::open_in_memory().unwrap();
        let mut p = project("p1", "Example", vec![version("p1", "v1", "h1", Channel::Release)]);
        store.save_project(&p).unwrap();
        p.source = "other".to_string();
        store.save_project(&p).unwrap();

        let loaded = store.project_by_id("p1").unwrap().unwrap();
        assert_eq!(loaded.source, "other");
        // takeover, not a duplicate: the versions still join to one project
        assert_eq!(loaded.versions.len(), 1);
    }

    #[test]
    fn colliding_hash_belongs_to_last_writer() {
        let store = LocalStore::open_in_memory().unwrap();
        let a = project("p1", "A", vec![version("p1", "v1", "shared", Channel::Release)]);
        let b = project("p2", "B", vec![version("p2", "v9", "shared", Channel::Release)]);
        store.save_project(&a).unwrap();
        store.save_project(&b).unwrap();
        let owner = store.version_by_hash("shared").unwrap().unwrap();
        assert_eq!(owner.project_id, "p2");
        assert!(store.project_by_id("p1").unwrap().unwrap().versions.is_empty());
    }

    #[test]
    fn project_by_hash_joins_through_version() {
        let store = LocalStore::open_in_memory().unwrap();
        let p = project("p1", "Example", vec![version("p1", "v1", "h1", Channel::Release)]);
        store.save_project(&p).unwrap();
        store.upsert_installation("a.jar", "h1", 1).unwrap();
        store.upsert_installation("x.jar", "h-unknown", 1).unwrap();
        assert_eq!(store.project_by_hash("h1").unwrap().unwrap().id, "p1");
        assert!(store.project_by_hash("h-unknown").unwrap().is_none());
    }

    #[test]
    fn resolved_projects_splits_unrecognized() {
        let store = LocalStore::open_in_memory().unwrap();
        let p = project("p1", "Example", vec![version("p1", "v1", "h1", Channel::Release)]);
        store.save_project(&p).unwrap();
        store.upsert_installation("a.jar", "h1", 1).unwrap();
        store.upsert_installation("x.jar", "h2", 1).unwrap();
        let (resolved, unrecognized) = store.resolved_projects().unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].project.id, "p1");
        assert_eq!(resolved[0].installed.id, "v1");
        assert_eq!(unrecognized.len(), 1);
        assert_eq!(unrecognized[0].sha1, "h2");
    }

    #[test]
    fn installed_version_matches_project() {
        let store = LocalStore::open_in_memory().unwrap();
        let p = project(
            "p1",
            "Example",
            vec![
                version("p1", "v1", "h1", Channel::Release),
                version("p1", "v2", "h2", Channel::Beta),
            ],
        );
        store.save_project(&p).unwrap();
        store.upsert_installation("a.jar", "h2", 1).unwrap();
        let (installed, record) = store.installed_version("p1").unwrap().unwrap();
        assert_eq!(installed.id, "v2");
        assert_eq!(record.filename, "a.jar");
        assert!(store.installed_version("p9").unwrap().is_none());
    }
}
