//! Reconciliation
//!
//! Brings the installation table into agreement with the plugin directory,
//! then resolves every file the catalog does not recognize yet. The whole
//! pass is idempotent: a partial run (aborted by a transport error) is safe
//! to re-run.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use log::{debug, info};

use crate::error::Result;
use crate::hash::sha1_file;
use crate::registry::{self, Registry};
use crate::store::LocalStore;

/// Progress observer, invoked once per installation in processing order.
pub type ProgressFn<'a> = &'a mut dyn FnMut(&str);

pub struct ReconciliationEngine<'a> {
    store: &'a LocalStore,
    plugin_dir: &'a Path,
    default_source: String,
    registries: HashMap<String, Box<dyn Registry>>,
}

impl<'a> ReconciliationEngine<'a> {
    /// `default` is the registry consulted for files no resolved project
    /// claims yet; already-resolved installations stay with their source.
    pub fn new(store: &'a LocalStore, plugin_dir: &'a Path, default: Box<dyn Registry>) -> Self {
        let default_source = default.name().to_string();
        let mut registries: HashMap<String, Box<dyn Registry>> = HashMap::new();
        registries.insert(default_source.clone(), default);
        Self {
            store,
            plugin_dir,
            default_source,
            registries,
        }
    }

    fn ensure_registry(&mut self, source: &str) -> Result<()> {
        if !self.registries.contains_key(source) {
            self.registries
                .insert(source.to_string(), registry::connect(source)?);
        }
        Ok(())
    }

    /// Scan, fingerprint, sync the installation table, then resolve.
    ///
    /// Hash misses in the registry leave the file "unrecognized" and never
    /// abort the pass; transport and storage errors do.
    pub fn update(&mut self, progress: ProgressFn<'_>) -> Result<()> {
        let seen = self.scan()?;
        // Prune only after every file has been hashed - never on a
        // partial scan.
        self.store.prune_installations(&seen)?;
        self.resolve_all(progress)
    }

    /// Hash every regular file in the plugin directory (non-recursive) and
    /// upsert its installation record. A missing directory is an empty one.
    fn scan(&self) -> Result<HashSet<String>> {
        let mut seen = HashSet::new();
        let entries = match fs::read_dir(self.plugin_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("plugin directory {} not found", self.plugin_dir.display());
                return Ok(seen);
            }
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            let filename = entry.file_name().to_string_lossy().into_owned();
            let sha1 = sha1_file(&path)?;
            let size = entry.metadata()?.len();
            self.store.upsert_installation(&filename, &sha1, size)?;
            seen.insert(sha1);
        }
        Ok(seen)
    }

    fn resolve_all(&mut self, progress: ProgressFn<'_>) -> Result<()> {
        for installation in self.store.installations()? {
            progress(&format!("Resolving {}", installation.filename));

            // A project resolved in an earlier run owns its installation;
            // everything else goes to the default source.
            let source = match self.store.project_by_hash(&installation.sha1)? {
                Some(project) => project.source,
                None => self.default_source.clone(),
            };
            self.ensure_registry(&source)?;
            let registry = self.registries[&source].as_ref();

            let (project_id, fresh) = match self.store.version_by_hash(&installation.sha1)? {
                Some(known) => (known.project_id, None),
                None => match registry.resolve_by_hash(&installation.sha1) {
                    Ok(version) => (version.project_id.clone(), Some(version)),
                    Err(e) if e.is_not_found() => {
                        info!(
                            "{} is not known to {source}, skipping",
                            installation.filename
                        );
                        continue;
                    }
                    Err(e) => return Err(e),
                },
            };

            // Always re-fetch the full project: keeps metadata fresh and
            // fills the version catalog upgrade detection needs.
            let mut project = match registry.resolve_project(&project_id) {
                Ok(project) => project,
                Err(e) if e.is_not_found() => {
                    info!("project {project_id} vanished from {source}, skipping");
                    continue;
                }
                Err(e) => return Err(e),
            };
            // The hash-resolved version may be filtered out of the listing;
            // keep it so the installation stays resolved.
            if let Some(version) = fresh {
                project.versions.entry(version.id.clone()).or_insert(version);
            }
            self.store.save_project(&project)?;
        }
        Ok(())
    }
}
