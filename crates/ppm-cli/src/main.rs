use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use log::LevelFilter;

use ppm_core::select;
use ppm_core::{
    connect, game_version, registry_names, Channel, LocalStore, PluginManager, PpmError,
    ReconciliationEngine, Result, VersionRecord,
};

mod args;
mod display;

use args::{Cli, Commands};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "[ERROR]".red().bold(), e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    env_logger::Builder::new().filter_level(level).init();
}

fn run(cli: Cli) -> Result<()> {
    // Commands that never touch the store; clean must not re-create the
    // database by opening it first.
    match &cli.command {
        Commands::Registries => {
            for name in registry_names() {
                println!("{name}");
            }
            return Ok(());
        }
        Commands::Clean => return handle_clean(&cli.db),
        _ => {}
    }

    let store = LocalStore::open(&cli.db)?;
    match &cli.command {
        Commands::Update => handle_update(&store, &cli.dir, &cli.source),
        Commands::List => handle_list(&store),
        Commands::Show {
            name,
            version,
            limit,
            releases_only,
            yes,
        } => handle_show(
            &store,
            &cli,
            name,
            version.as_deref(),
            *limit,
            *releases_only,
            *yes,
        ),
        Commands::Search { query, limit } => handle_search(&store, &cli, query, *limit),
        Commands::Install {
            name,
            version,
            snapshot,
            yes,
        } => handle_install(&store, &cli, name, version.as_deref(), *snapshot, *yes),
        Commands::Remove { name, yes } => handle_remove(&store, &cli, name, *yes),
        Commands::Upgrade { yes } => handle_upgrade(&store, &cli, *yes),
        Commands::Track { name, channel } => handle_track(&store, name, channel.as_deref()),
        Commands::Status { files } => handle_status(&store, &cli, files),
        Commands::Registries | Commands::Clean => unreachable!(),
    }
}

fn manager<'a>(store: &'a LocalStore, cli: &Cli) -> Result<PluginManager<'a>> {
    Ok(PluginManager::new(
        store,
        cli.dir.clone(),
        connect(&cli.source)?,
    ))
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N]: ");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

fn progress_printer(label: String) -> impl FnMut(u64, Option<u64>) {
    move |done, total| {
        match total {
            Some(total) if total > 0 => eprint!(
                "\rDownloading {label}: {} / {}",
                display::format_size(done),
                display::format_size(total)
            ),
            _ => eprint!("\rDownloading {label}: {}", display::format_size(done)),
        }
        let _ = io::stderr().flush();
    }
}

fn handle_clean(db: &Path) -> Result<()> {
    if db.exists() {
        fs::remove_file(db)?;
        display::success("Database cleaned.");
    } else {
        display::warning("No database found to clean.");
    }
    Ok(())
}

fn handle_update(store: &LocalStore, dir: &Path, source: &str) -> Result<()> {
    let mut engine = ReconciliationEngine::new(store, dir, connect(source)?);
    engine.update(&mut |msg| println!("{}", msg.dimmed()))?;
    display::success("done");
    Ok(())
}

fn handle_list(store: &LocalStore) -> Result<()> {
    let gv = game_version(Path::new("."))?;
    display::info(&format!("PaperMC version: {gv}"));

    let (resolved, unrecognized) = store.resolved_projects()?;
    if resolved.is_empty() && unrecognized.is_empty() {
        display::warning("No installed plugins found.");
        println!("Run {} to scan for installed plugins.", "ppm update".green());
        return Ok(());
    }

    if !resolved.is_empty() {
        display::installed_table(&resolved, &gv);
    }
    if !unrecognized.is_empty() {
        println!();
        println!("{}", format!("Unrecognized files: {}", unrecognized.len()).bold());
        display::unrecognized_table(&unrecognized);
        println!("Run {} to identify them.", "ppm update".green());
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn handle_show(
    store: &LocalStore,
    cli: &Cli,
    name: &str,
    version: Option<&str>,
    limit: usize,
    releases_only: bool,
    yes: bool,
) -> Result<()> {
    let gv = game_version(Path::new("."))?;
    let pm = manager(store, cli)?;

    let (exact, project) = pm.fuzzy_find(name, Some(&gv))?;
    if !exact
        && !yes
        && !confirm(&format!(
            "Did you mean plugin '{}' (id {})?",
            project.name, project.id
        ))?
    {
        println!("Aborted.");
        return Ok(());
    }

    let installed = store.installed_version(&project.id)?;
    println!();
    display::project_panel(
        &project,
        installed.as_ref().map(|(_, i)| i.filename.as_str()),
        &gv,
    );

    if let Some(wanted) = version {
        let Some(detail) = project.version(wanted) else {
            return Err(PpmError::VersionNotFound {
                project: project.name.clone(),
                version: wanted.to_string(),
            });
        };
        println!();
        display::version_detail(detail);
    } else if let Some((installed_version, _)) = &installed {
        println!();
        println!("{}", "Installed version:".bold());
        display::version_detail(installed_version);
    }

    let mut versions: Vec<&VersionRecord> = project
        .versions
        .values()
        .filter(|v| !releases_only || v.channel == Channel::Release)
        .collect();
    versions.sort_by(|a, b| b.published_at.cmp(&a.published_at).then(a.id.cmp(&b.id)));
    versions.truncate(limit);

    println!();
    if versions.is_empty() {
        display::warning("No versions available");
    } else {
        display::version_table(&versions, &gv);
    }
    Ok(())
}

fn handle_search(store: &LocalStore, cli: &Cli, query: &str, limit: usize) -> Result<()> {
    let gv = game_version(Path::new("."))?;
    let pm = manager(store, cli)?;
    let hits = pm.search(query, Some(&gv), limit)?;
    if hits.is_empty() {
        display::warning("No plugins found matching the query.");
    } else {
        display::search_table(&hits);
    }
    Ok(())
}

fn handle_install(
    store: &LocalStore,
    cli: &Cli,
    name: &str,
    version: Option<&str>,
    snapshot: bool,
    yes: bool,
) -> Result<()> {
    let gv = game_version(Path::new("."))?;
    let pm = manager(store, cli)?;

    let (exact, project) = pm.fuzzy_find(name, Some(&gv))?;
    if !exact
        && !yes
        && !confirm(&format!(
            "Did you mean plugin '{}' (id {})?",
            project.name, project.id
        ))?
    {
        println!("Aborted.");
        return Ok(());
    }

    let (target, tracked) = if let Some(wanted) = version {
        let target = project
            .version(wanted)
            .ok_or_else(|| PpmError::VersionNotFound {
                project: project.name.clone(),
                version: wanted.to_string(),
            })?
            .clone();
        let tracked = target.channel;
        (target, tracked)
    } else if let Some((installed, installation)) = store.installed_version(&project.id)? {
        match select::is_outdated(&project, &installed, installation.tracked) {
            Some(candidate) => {
                println!(
                    "Updating {} from {} to {}...",
                    project.name, installed.name, candidate.name
                );
                (candidate.clone(), installation.tracked)
            }
            None => {
                display::success(&format!(
                    "{} is already up to date ({})",
                    project.name, installed.name
                ));
                return Ok(());
            }
        }
    } else {
        let (picked, fell_back) =
            pm.pick_install_version(&project, snapshot)
                .ok_or_else(|| PpmError::NoMatch {
                    query: name.to_string(),
                })?;
        if fell_back {
            display::warning(&format!(
                "No release version found for '{}', using latest {} version",
                project.name, picked.channel
            ));
        }
        let tracked = picked.channel;
        (picked.clone(), tracked)
    };

    display::info(&format!(
        "{} is tracking {} versions",
        project.name, tracked
    ));
    let mut progress = progress_printer(target.name.clone());
    pm.install(&project, &target, tracked, &mut progress)?;
    eprintln!();
    display::success(&format!("{} installed!", project.name));
    Ok(())
}

fn handle_remove(store: &LocalStore, cli: &Cli, name: &str, yes: bool) -> Result<()> {
    let project = store.project(name)?.ok_or_else(|| PpmError::NoMatch {
        query: name.to_string(),
    })?;
    if !yes
        && !confirm(&format!(
            "Remove plugin '{}' (id {})?",
            project.name, project.id
        ))?
    {
        println!("Aborted.");
        return Ok(());
    }
    let pm = manager(store, cli)?;
    let filename = pm.remove(&project)?;
    display::success(&format!("{} removed ({filename})", project.name));
    Ok(())
}

fn handle_upgrade(store: &LocalStore, cli: &Cli, yes: bool) -> Result<()> {
    let gv = game_version(Path::new("."))?;
    let pm = manager(store, cli)?;

    let outdated = pm.outdated_installations()?;
    if outdated.is_empty() {
        println!("All installed plugins are up to date.");
        return Ok(());
    }

    println!("The following plugins have updates available:");
    display::upgrade_table(&outdated, &gv);
    if !yes && !confirm("Proceed with the upgrade?")? {
        println!("Aborted.");
        return Ok(());
    }

    // Per-plugin failures are reported and the rest continue.
    for (view, candidate) in outdated {
        let mut progress = progress_printer(candidate.name.clone());
        match pm.upgrade(&view.project, &mut progress) {
            Ok(Some((installed, _))) => {
                eprintln!();
                display::success(&format!("{} -> {}", view.project.name, installed.name));
            }
            Ok(None) => {}
            Err(e) => {
                eprintln!();
                eprintln!(
                    "{} failed to upgrade '{}': {e}",
                    "[ERROR]".red().bold(),
                    view.project.name
                );
            }
        }
    }
    Ok(())
}

fn handle_track(store: &LocalStore, name: &str, channel: Option<&str>) -> Result<()> {
    let project = store.project(name)?.ok_or_else(|| PpmError::NoMatch {
        query: name.to_string(),
    })?;
    let (_, installation) =
        store
            .installed_version(&project.id)?
            .ok_or_else(|| PpmError::NotInstalled {
                name: project.name.clone(),
            })?;

    match channel {
        None => {
            display::info(&format!(
                "'{}' is tracking {} versions",
                project.name, installation.tracked
            ));
        }
        Some(value) => {
            let channel: Channel = value.parse()?;
            store.set_tracked_channel(&installation.sha1, channel)?;
            display::success(&format!(
                "'{}' is now tracking {channel} versions",
                project.name
            ));
        }
    }
    Ok(())
}

fn handle_status(store: &LocalStore, cli: &Cli, files: &[PathBuf]) -> Result<()> {
    let pm = manager(store, cli)?;
    let files = if files.is_empty() {
        plugin_files(&cli.dir)?
    } else {
        files.to_vec()
    };
    if files.is_empty() {
        display::warning("No plugin files found.");
        return Ok(());
    }

    for path in files {
        match pm.file_status(&path) {
            Ok(status) => {
                let resolved = match &status.resolved {
                    Some((project, version)) => format!("{project} {version}").green(),
                    None => "unrecognized".yellow(),
                };
                println!(
                    "{:<36} {:>10}  {}  {}",
                    status.filename,
                    display::format_size(status.size),
                    status.sha1.dimmed(),
                    resolved
                );
            }
            Err(e) => display::warning(&format!("{}: {e}", path.display())),
        }
    }
    Ok(())
}

fn plugin_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Ok(files),
    };
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}
