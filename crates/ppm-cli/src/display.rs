//! Terminal rendering for catalog records.
//!
//! Plain aligned columns with `colored` accents; the core never prints.

use colored::Colorize;

use ppm_core::select;
use ppm_core::{InstallationRecord, ProjectRecord, ResolvedProject, SearchHit, VersionRecord};

pub fn info(msg: &str) {
    println!("{} {msg}", "[INFO]".cyan());
}

pub fn warning(msg: &str) {
    println!("{} {msg}", "[WARN]".yellow());
}

pub fn success(msg: &str) {
    println!("{} {msg}", "✓".green());
}

pub fn format_size(bytes: u64) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.1} MiB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} KiB", bytes as f64 / 1024.0)
    }
}

pub fn installed_table(resolved: &[ResolvedProject], game_version: &str) {
    println!(
        "{:<28} {:<18} {:<9} {:<14} {}",
        "Plugin".bold(),
        "Installed".bold(),
        "Tracked".bold(),
        "Status".bold(),
        "Compatible".bold()
    );
    for view in resolved {
        let status = match select::is_outdated(&view.project, &view.installed, view.tracked) {
            Some(candidate) => format!("-> {}", candidate.name).yellow(),
            None => match select::latest_of_channel(&view.project, view.tracked) {
                Some(_) => "up to date".green(),
                None => "no upgrade".dimmed(),
            },
        };
        let compatible = if view.installed.supports(game_version) {
            "yes".green()
        } else {
            "no".red()
        };
        println!(
            "{:<28} {:<18} {:<9} {:<14} {}",
            view.project.name,
            view.installed.name,
            view.tracked.as_str(),
            status,
            compatible
        );
    }
}

pub fn unrecognized_table(records: &[InstallationRecord]) {
    println!(
        "{:<36} {:>10}  {}",
        "File".bold(),
        "Size".bold(),
        "SHA-1".bold()
    );
    for record in records {
        println!(
            "{:<36} {:>10}  {}",
            record.filename,
            format_size(record.size),
            record.sha1.dimmed()
        );
    }
}

pub fn search_table(hits: &[SearchHit]) {
    println!(
        "{:<28} {:<18} {:>10}  {}",
        "Plugin".bold(),
        "Author".bold(),
        "Downloads".bold(),
        "Id".bold()
    );
    for hit in hits {
        println!(
            "{:<28} {:<18} {:>10}  {}",
            hit.name,
            hit.author,
            hit.downloads,
            hit.id.dimmed()
        );
    }
}

pub fn project_panel(project: &ProjectRecord, filename: Option<&str>, game_version: &str) {
    println!("{}", project.name.green().bold());
    println!("{:<12} {}", "Id:".yellow(), project.id);
    println!("{:<12} {}", "Source:".yellow(), project.source);
    println!("{:<12} {}", "Author:".yellow(), project.author);
    println!("{:<12} {}", "Downloads:".yellow(), project.downloads);
    if let Some(filename) = filename {
        println!("{:<12} {}", "Installed:".yellow(), filename);
    }
    println!("{:<12} {}", "Server:".yellow(), game_version);
    if let Some(description) = &project.description {
        println!("{}", description.dimmed());
    }
}

pub fn version_detail(version: &VersionRecord) {
    println!("{}", version.name.bold());
    println!("{:<12} {}", "Channel:".yellow(), version.channel);
    println!(
        "{:<12} {}",
        "Published:".yellow(),
        version.published_at.format("%Y-%m-%d %H:%M")
    );
    println!(
        "{:<12} {}",
        "Game:".yellow(),
        version.game_versions.join(", ")
    );
    if !version.description.is_empty() {
        println!("{}", version.description.dimmed());
    }
}

pub fn version_table(versions: &[&VersionRecord], game_version: &str) {
    println!(
        "{:<22} {:<9} {:<12} {}",
        "Version".bold(),
        "Channel".bold(),
        "Published".bold(),
        "Compatible".bold()
    );
    for version in versions {
        let compatible = if version.supports(game_version) {
            "yes".green()
        } else {
            "no".red()
        };
        println!(
            "{:<22} {:<9} {:<12} {}",
            version.name,
            version.channel.as_str(),
            version.published_at.format("%Y-%m-%d"),
            compatible
        );
    }
}

pub fn upgrade_table(outdated: &[(ResolvedProject, VersionRecord)], game_version: &str) {
    println!(
        "{:<28} {:<18} {:<18} {}",
        "Plugin".bold(),
        "Current".bold(),
        "New".bold(),
        "Compatible".bold()
    );
    for (view, candidate) in outdated {
        let compatible = if candidate.supports(game_version) {
            "yes".green()
        } else {
            "no".red()
        };
        println!(
            "{:<28} {:<18} {:<18} {}",
            view.project.name, view.installed.name, candidate.name, compatible
        );
    }
}
