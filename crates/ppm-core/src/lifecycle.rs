//! Plugin lifecycle operations
//!
//! Install, remove and upgrade, composed from the store, the fingerprinter
//! and a registry. One `PluginManager` is constructed per command
//! invocation and owns the registry connection for that run.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::{PpmError, Result};
use crate::hash::sha1_file;
use crate::registry::{DownloadProgress, Registry};
use crate::select;
use crate::store::LocalStore;
use crate::types::{
    Channel, InstallationRecord, ProjectRecord, ResolvedProject, SearchHit, VersionRecord,
};

/// Per-file report for the status command.
#[derive(Debug)]
pub struct FileStatus {
    pub filename: String,
    pub sha1: String,
    pub size: u64,
    /// Project and version names when the hash is recognized.
    pub resolved: Option<(String, String)>,
}

pub struct PluginManager<'a> {
    store: &'a LocalStore,
    plugin_dir: PathBuf,
    registry: Box<dyn Registry>,
}

impl<'a> PluginManager<'a> {
    pub fn new(store: &'a LocalStore, plugin_dir: PathBuf, registry: Box<dyn Registry>) -> Self {
        Self {
            store,
            plugin_dir,
            registry,
        }
    }

    pub fn plugin_dir(&self) -> &Path {
        &self.plugin_dir
    }

    pub fn registry(&self) -> &dyn Registry {
        self.registry.as_ref()
    }

    // ========== Matching ==========

    /// Exact id first (local catalog, then registry), then the first search
    /// hit. The flag is true only for exact matches; callers confirm the
    /// rest with the user.
    pub fn fuzzy_find(
        &self,
        query: &str,
        game_version: Option<&str>,
    ) -> Result<(bool, ProjectRecord)> {
        if let Some(local) = self.store.project(query)? {
            // Refresh from the registry when possible, but a stale local
            // record is still an exact match.
            return match self.registry.resolve_project(&local.id) {
                Ok(fresh) => Ok((true, fresh)),
                Err(e) if e.is_not_found() => Ok((true, local)),
                Err(e) => Err(e),
            };
        }
        match self.registry.resolve_project(query) {
            Ok(project) => return Ok((true, project)),
            Err(e) if e.is_not_found() => {
                debug!("no project with id '{query}', searching by name");
            }
            Err(e) => return Err(e),
        }
        let hits = self.registry.search(query, game_version, 1)?;
        match hits.into_iter().next() {
            Some(hit) => Ok((false, self.registry.resolve_project(&hit.id)?)),
            None => Err(PpmError::NoMatch {
                query: query.to_string(),
            }),
        }
    }

    pub fn search(
        &self,
        query: &str,
        game_version: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        self.registry.search(query, game_version, limit)
    }

    // ========== Version policy ==========

    /// Default install target: the latest release, or the overall latest
    /// when no release exists. The flag is true when the fallback was taken
    /// without `allow_snapshot`, so the caller can warn.
    pub fn pick_install_version<'p>(
        &self,
        project: &'p ProjectRecord,
        allow_snapshot: bool,
    ) -> Option<(&'p VersionRecord, bool)> {
        if let Some(release) = select::latest_of_channel(project, Channel::Release) {
            if !allow_snapshot {
                return Some((release, false));
            }
        }
        match select::latest(project) {
            Some(latest) => Some((latest, latest.channel != Channel::Release && !allow_snapshot)),
            None => None,
        }
    }

    // ========== Lifecycle ==========

    /// Download `version` into the plugin directory and register it.
    ///
    /// The artifact is streamed to a `.part` path and only moved into place
    /// once it downloaded completely and its hash matches the registry's
    /// claim; a failure leaves neither a partial file nor a store mutation.
    /// A prior installation of the same project at a different version is
    /// removed first so two builds never coexist on disk.
    pub fn install(
        &self,
        project: &ProjectRecord,
        version: &VersionRecord,
        tracked: Channel,
        progress: DownloadProgress<'_>,
    ) -> Result<PathBuf> {
        fs::create_dir_all(&self.plugin_dir)?;
        let filename = install_filename(project, version);
        let dest = self.plugin_dir.join(&filename);
        let part = self.plugin_dir.join(format!(".{filename}.part"));

        if let Err(e) = self.registry.download(version, &part, progress) {
            let _ = fs::remove_file(&part);
            return Err(e);
        }
        let actual = sha1_file(&part)?;
        if actual != version.sha1 {
            let _ = fs::remove_file(&part);
            return Err(PpmError::HashMismatch {
                filename,
                expected: version.sha1.clone(),
                actual,
            });
        }

        if let Some((old_version, old_install)) = self.store.installed_version(&project.id)? {
            if old_install.sha1 != version.sha1 {
                debug!(
                    "removing superseded {} ({})",
                    old_install.filename, old_version.name
                );
                let old_path = self.plugin_dir.join(&old_install.filename);
                if old_path.exists() {
                    fs::remove_file(&old_path)?;
                }
                self.store.remove_installation(&old_install.sha1)?;
            }
        }

        fs::rename(&part, &dest)?;
        let size = fs::metadata(&dest)?.len();
        self.store.save_project(project)?;
        self.store.upsert_installation(&filename, &version.sha1, size)?;
        self.store.set_tracked_channel(&version.sha1, tracked)?;
        Ok(dest)
    }

    /// Delete the installed file (no-op if already gone) and its record.
    pub fn remove(&self, project: &ProjectRecord) -> Result<String> {
        let (_, installation) = self.require_installed(project)?;
        let path = self.plugin_dir.join(&installation.filename);
        if path.exists() {
            fs::remove_file(&path)?;
        } else {
            warn!("{} already absent from disk", installation.filename);
        }
        self.store.remove_installation(&installation.sha1)?;
        Ok(installation.filename)
    }

    /// Reinstall at the tracked channel's latest, or do nothing when the
    /// installation is already current.
    pub fn upgrade(
        &self,
        project: &ProjectRecord,
        progress: DownloadProgress<'_>,
    ) -> Result<Option<(VersionRecord, PathBuf)>> {
        let (installed, installation) = self.require_installed(project)?;
        let Some(candidate) = select::is_outdated(project, &installed, installation.tracked)
        else {
            return Ok(None);
        };
        let candidate = candidate.clone();
        let path = self.install(project, &candidate, installation.tracked, progress)?;
        Ok(Some((candidate, path)))
    }

    /// Every resolved installation with an upgrade available on its
    /// tracked channel.
    pub fn outdated_installations(&self) -> Result<Vec<(ResolvedProject, VersionRecord)>> {
        let (resolved, _) = self.store.resolved_projects()?;
        let mut outdated = Vec::new();
        for view in resolved {
            if let Some(candidate) =
                select::is_outdated(&view.project, &view.installed, view.tracked)
            {
                let candidate = candidate.clone();
                outdated.push((view, candidate));
            }
        }
        Ok(outdated)
    }

    /// Persist the tracked channel of a project's current installation.
    pub fn set_tracked_channel(&self, project: &ProjectRecord, channel: Channel) -> Result<()> {
        let (_, installation) = self.require_installed(project)?;
        self.store.set_tracked_channel(&installation.sha1, channel)
    }

    fn require_installed(
        &self,
        project: &ProjectRecord,
    ) -> Result<(VersionRecord, InstallationRecord)> {
        self.store
            .installed_version(&project.id)?
            .ok_or_else(|| PpmError::NotInstalled {
                name: project.name.clone(),
            })
    }

    // ========== Status ==========

    /// Fingerprint one file and report what the catalog knows about it.
    pub fn file_status(&self, path: &Path) -> Result<FileStatus> {
        let sha1 = sha1_file(path)?;
        let size = fs::metadata(path)?.len();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let resolved = match self.store.version_by_hash(&sha1)? {
            Some(version) => self
                .store
                .project_by_id(&version.project_id)?
                .map(|p| (p.name, version.name)),
            None => None,
        };
        Ok(FileStatus {
            filename,
            sha1,
            size,
            resolved,
        })
    }
}

/// Deterministic on-disk name: spaces become underscores, suffixed with the
/// version name.
fn install_filename(project: &ProjectRecord, version: &VersionRecord) -> String {
    format!("{}-{}.jar", project.name.replace(' ', "_"), version.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{project, version, MockRegistry};
    use sha1::{Digest, Sha1};
    use tempfile::TempDir;

    fn sha1_of(bytes: &[u8]) -> String {
        hex::encode(Sha1::digest(bytes))
    }

    fn no_progress() -> impl FnMut(u64, Option<u64>) {
        |_, _| {}
    }

    /// Project with a release at t=100 and a newer release at t=300, with
    /// artifacts registered for both.
    fn fixture() -> (ProjectRecord, MockRegistry) {
        let v1 = version("p1", "v1", &sha1_of(b"build one"), Channel::Release, 100);
        let v3 = version("p1", "v3", &sha1_of(b"build three"), Channel::Release, 300);
        let p = project("p1", "Example Plugin", vec![v1, v3]);
        let registry = MockRegistry::default()
            .with_project(p.clone())
            .with_artifact("v1", b"build one")
            .with_artifact("v3", b"build three");
        (p, registry)
    }

    fn manager<'a>(store: &'a LocalStore, dir: &Path, registry: MockRegistry) -> PluginManager<'a> {
        PluginManager::new(store, dir.to_path_buf(), Box::new(registry))
    }

    #[test]
    fn install_writes_file_and_records() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::open_in_memory().unwrap();
        let (p, registry) = fixture();
        let pm = manager(&store, tmp.path(), registry);

        let dest = pm
            .install(&p, &p.versions["v1"], Channel::Release, &mut no_progress())
            .unwrap();
        assert_eq!(
            dest.file_name().unwrap().to_str().unwrap(),
            "Example_Plugin-v-v1.jar"
        );
        assert!(dest.exists());
        let record = store.installation(&sha1_of(b"build one")).unwrap().unwrap();
        assert_eq!(record.size, 9);
        assert_eq!(record.tracked, Channel::Release);
        assert_eq!(store.project_by_id("p1").unwrap().unwrap().versions.len(), 2);
    }

    #[test]
    fn install_replaces_prior_version_of_same_project() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::open_in_memory().unwrap();
        let (p, registry) = fixture();
        let pm = manager(&store, tmp.path(), registry);

        let old = pm
            .install(&p, &p.versions["v1"], Channel::Release, &mut no_progress())
            .unwrap();
        let new = pm
            .install(&p, &p.versions["v3"], Channel::Release, &mut no_progress())
            .unwrap();

        assert!(!old.exists());
        assert!(new.exists());
        assert!(store.installation(&sha1_of(b"build one")).unwrap().is_none());
        assert!(store.installation(&sha1_of(b"build three")).unwrap().is_some());
        assert_eq!(store.installations().unwrap().len(), 1);
    }

    #[test]
    fn failed_download_leaves_nothing_behind() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::open_in_memory().unwrap();
        let (p, _) = fixture();
        // registry with no artifacts: every download fails
        let pm = manager(&store, tmp.path(), MockRegistry::default().with_project(p.clone()));

        let err = pm
            .install(&p, &p.versions["v1"], Channel::Release, &mut no_progress())
            .unwrap_err();
        assert!(matches!(err, PpmError::DownloadFailed { .. }));
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
        assert!(store.installations().unwrap().is_empty());
        assert!(store.project_by_id("p1").unwrap().is_none());
    }

    #[test]
    fn corrupt_download_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::open_in_memory().unwrap();
        let (p, _) = fixture();
        let registry = MockRegistry::default()
            .with_project(p.clone())
            .with_artifact("v1", b"tampered bytes");
        let pm = manager(&store, tmp.path(), registry);

        let err = pm
            .install(&p, &p.versions["v1"], Channel::Release, &mut no_progress())
            .unwrap_err();
        assert!(matches!(err, PpmError::HashMismatch { .. }));
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
        assert!(store.installations().unwrap().is_empty());
    }

    #[test]
    fn remove_deletes_file_and_record() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::open_in_memory().unwrap();
        let (p, registry) = fixture();
        let pm = manager(&store, tmp.path(), registry);

        let dest = pm
            .install(&p, &p.versions["v1"], Channel::Release, &mut no_progress())
            .unwrap();
        let filename = pm.remove(&p).unwrap();
        assert_eq!(filename, "Example_Plugin-v-v1.jar");
        assert!(!dest.exists());
        assert!(store.installations().unwrap().is_empty());
        // removing an already-deleted file is a no-op for the next install
        assert!(matches!(
            pm.remove(&p),
            Err(PpmError::NotInstalled { .. })
        ));
    }

    #[test]
    fn remove_without_installation_is_typed_error() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::open_in_memory().unwrap();
        let (p, registry) = fixture();
        let pm = manager(&store, tmp.path(), registry);
        assert!(matches!(
            pm.remove(&p),
            Err(PpmError::NotInstalled { .. })
        ));
    }

    #[test]
    fn upgrade_installs_tracked_candidate() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::open_in_memory().unwrap();
        let (p, registry) = fixture();
        let pm = manager(&store, tmp.path(), registry);

        pm.install(&p, &p.versions["v1"], Channel::Release, &mut no_progress())
            .unwrap();
        let (candidate, path) = pm.upgrade(&p, &mut no_progress()).unwrap().unwrap();
        assert_eq!(candidate.id, "v3");
        assert!(path.exists());
        assert_eq!(store.installations().unwrap().len(), 1);

        // second upgrade is a no-op
        assert!(pm.upgrade(&p, &mut no_progress()).unwrap().is_none());
    }

    #[test]
    fn upgrade_respects_tracked_channel() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::open_in_memory().unwrap();
        let beta = version("p2", "b2", &sha1_of(b"beta build"), Channel::Beta, 200);
        let stable = version("p2", "r1", &sha1_of(b"stable build"), Channel::Release, 100);
        let p = project("p2", "Channelled", vec![beta, stable]);
        let registry = MockRegistry::default()
            .with_project(p.clone())
            .with_artifact("b2", b"beta build")
            .with_artifact("r1", b"stable build");
        let pm = manager(&store, tmp.path(), registry);

        pm.install(&p, &p.versions["r1"], Channel::Release, &mut no_progress())
            .unwrap();
        // tracking release: the newer beta is not a candidate
        assert!(pm.upgrade(&p, &mut no_progress()).unwrap().is_none());

        pm.set_tracked_channel(&p, Channel::Beta).unwrap();
        let (candidate, _) = pm.upgrade(&p, &mut no_progress()).unwrap().unwrap();
        assert_eq!(candidate.id, "b2");
    }

    #[test]
    fn outdated_installations_lists_candidates() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::open_in_memory().unwrap();
        let (p, registry) = fixture();
        let pm = manager(&store, tmp.path(), registry);

        pm.install(&p, &p.versions["v1"], Channel::Release, &mut no_progress())
            .unwrap();
        let outdated = pm.outdated_installations().unwrap();
        assert_eq!(outdated.len(), 1);
        assert_eq!(outdated[0].0.project.id, "p1");
        assert_eq!(outdated[0].1.id, "v3");
    }

    #[test]
    fn fuzzy_find_prefers_exact_id() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::open_in_memory().unwrap();
        let (p, registry) = fixture();
        let pm = manager(&store, tmp.path(), registry);

        let (exact, found) = pm.fuzzy_find("p1", None).unwrap();
        assert!(exact);
        assert_eq!(found.id, "p1");

        let (exact, found) = pm.fuzzy_find("example", None).unwrap();
        assert!(!exact);
        assert_eq!(found.id, "p1");

        assert!(matches!(
            pm.fuzzy_find("nothing-here", None),
            Err(PpmError::NoMatch { .. })
        ));
    }

    #[test]
    fn pick_install_version_prefers_release() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::open_in_memory().unwrap();
        let newer_beta = version("p3", "b9", "sha-b9", Channel::Beta, 900);
        let release = version("p3", "r5", "sha-r5", Channel::Release, 500);
        let p = project("p3", "Mixed", vec![newer_beta, release]);
        let pm = manager(&store, tmp.path(), MockRegistry::default());

        let (picked, warned) = pm.pick_install_version(&p, false).unwrap();
        assert_eq!(picked.id, "r5");
        assert!(!warned);

        let (picked, _) = pm.pick_install_version(&p, true).unwrap();
        assert_eq!(picked.id, "b9");

        let beta_only = project("p4", "BetaOnly", vec![version(
            "p4",
            "b1",
            "sha-b1",
            Channel::Beta,
            100,
        )]);
        let (picked, warned) = pm.pick_install_version(&beta_only, false).unwrap();
        assert_eq!(picked.id, "b1");
        assert!(warned);

        assert!(pm.pick_install_version(&project("p5", "Empty", vec![]), false).is_none());
    }

    #[test]
    fn file_status_reports_recognition() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStore::open_in_memory().unwrap();
        let (p, registry) = fixture();
        let pm = manager(&store, tmp.path(), registry);

        let dest = pm
            .install(&p, &p.versions["v1"], Channel::Release, &mut no_progress())
            .unwrap();
        let status = pm.file_status(&dest).unwrap();
        assert_eq!(status.sha1, sha1_of(b"build one"));
        assert_eq!(
            status.resolved,
            Some(("Example Plugin".to_string(), "v-v1".to_string()))
        );

        std::fs::write(tmp.path().join("stray.jar"), b"stray").unwrap();
        let status = pm.file_status(&tmp.path().join("stray.jar")).unwrap();
        assert!(status.resolved.is_none());
    }
}
