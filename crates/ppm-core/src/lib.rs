pub mod error;
pub mod hash;
pub mod lifecycle;
pub mod reconcile;
pub mod registry;
pub mod select;
pub mod server;
pub mod store;
pub mod types;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::{PpmError, Result};
pub use hash::sha1_file;
pub use lifecycle::{FileStatus, PluginManager};
pub use reconcile::ReconciliationEngine;
pub use registry::{connect, registry_names, DownloadProgress, Modrinth, Registry};
pub use server::game_version;
pub use store::LocalStore;
pub use types::{
    Channel, InstallationRecord, ProjectRecord, ResolvedProject, SearchHit, VersionRecord,
};
