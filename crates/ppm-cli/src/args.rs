use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ppm")]
#[command(about = "PaperMC plugin manager - track, install and upgrade server plugins")]
#[command(version)]
pub struct Cli {
    /// Increase verbosity (-v: info, -vv: debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Default registry source
    #[arg(short, long, global = true, default_value = "modrinth")]
    pub source: String,

    /// Path of the local plugin database
    #[arg(long, global = true, default_value = "ppm.db")]
    pub db: PathBuf,

    /// Plugin directory
    #[arg(long, global = true, default_value = "plugins")]
    pub dir: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List available registry sources
    Registries,

    /// Scan the plugin directory and refresh plugin information
    Update,

    /// List installed plugins with their update status
    List,

    /// Show a plugin's details and version history
    Show {
        /// Name or id of the plugin
        name: String,

        /// Specific version to show details for
        #[arg(short = 'V', long)]
        version: Option<String>,

        /// Limit the number of versions displayed
        #[arg(short, long, default_value = "5")]
        limit: usize,

        /// Only list release versions
        #[arg(long)]
        releases_only: bool,

        /// Skip confirmation prompts
        #[arg(short, long)]
        yes: bool,
    },

    /// Search the registry for plugins
    Search {
        /// Search query
        query: String,

        /// Limit the number of results
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Install or update a plugin
    Install {
        /// Name or id of the plugin
        name: String,

        /// Specific version to install (default: latest compatible)
        #[arg(short = 'V', long)]
        version: Option<String>,

        /// Accept alpha/beta versions when no release exists
        #[arg(long)]
        snapshot: bool,

        /// Skip confirmation prompts
        #[arg(short, long)]
        yes: bool,
    },

    /// Remove an installed plugin
    Remove {
        /// Name or id of the plugin
        name: String,

        /// Skip confirmation prompts
        #[arg(short, long)]
        yes: bool,
    },

    /// Upgrade every installed plugin with an update available
    Upgrade {
        /// Skip confirmation prompts
        #[arg(short, long)]
        yes: bool,
    },

    /// Show or set the tracked release channel of an installed plugin
    Track {
        /// Name or id of the plugin
        name: String,

        /// Channel to track: release, beta or alpha
        channel: Option<String>,
    },

    /// Report what the catalog knows about plugin files
    Status {
        /// Files to inspect (default: every file in the plugin directory)
        files: Vec<PathBuf>,
    },

    /// Delete the local plugin database
    Clean,
}
