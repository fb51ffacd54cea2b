//! Version selection
//!
//! Pure functions over a project's version catalog. Publish timestamps are
//! compared as instants, never as strings; ties are broken by ascending
//! version id so repeated calls pick the same winner.

use crate::types::{Channel, ProjectRecord, VersionRecord};

fn newest<'a, I>(versions: I) -> Option<&'a VersionRecord>
where
    I: Iterator<Item = &'a VersionRecord>,
{
    versions.fold(None, |best, candidate| match best {
        None => Some(candidate),
        Some(current) => {
            if candidate.published_at > current.published_at
                || (candidate.published_at == current.published_at
                    && candidate.id < current.id)
            {
                Some(candidate)
            } else {
                Some(current)
            }
        }
    })
}

/// Most recently published version across all channels.
pub fn latest(project: &ProjectRecord) -> Option<&VersionRecord> {
    newest(project.versions.values())
}

/// Most recently published version of one channel.
pub fn latest_of_channel(project: &ProjectRecord, channel: Channel) -> Option<&VersionRecord> {
    newest(project.versions.values().filter(|v| v.channel == channel))
}

/// The version an installation tracking `channel` should be running.
///
/// No cross-channel fallback: an empty channel means "no upgrade
/// available", which is distinct from "already up to date".
pub fn latest_channel_weighted(
    project: &ProjectRecord,
    channel: Channel,
) -> Option<&VersionRecord> {
    latest_of_channel(project, channel)
}

/// Upgrade candidate for an installation at `installed` tracking `channel`,
/// or None when the installation is current (or the channel is empty).
pub fn is_outdated<'a>(
    project: &'a ProjectRecord,
    installed: &VersionRecord,
    channel: Channel,
) -> Option<&'a VersionRecord> {
    let candidate = latest_channel_weighted(project, channel)?;
    if candidate.id != installed.id {
        Some(candidate)
    } else {
        None
    }
}
