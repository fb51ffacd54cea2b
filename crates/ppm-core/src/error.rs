use thiserror::Error;

#[derive(Debug, Error)]
pub enum PpmError {
    #[error("Not found in registry: {what}")]
    NotFound { what: String },

    #[error("Plugin is not installed: {name}")]
    NotInstalled { name: String },

    #[error("No plugin matches '{query}'")]
    NoMatch { query: String },

    #[error("No version '{version}' for plugin {project}")]
    VersionNotFound { project: String, version: String },

    #[error("Unknown registry source: {name}")]
    UnknownRegistry { name: String },

    #[error("Invalid release channel: '{value}' - expected release, beta or alpha")]
    InvalidChannel { value: String },

    #[error(
        "Could not determine PaperMC version from version_history.json - \
         run ppm from your server directory"
    )]
    ServerVersionUnknown,

    // "registry" rather than "source": thiserror reserves a field named
    // `source` for the error cause.
    #[error("Rate limited by {registry}, retry after ~{retry_after} seconds")]
    RateLimited {
        registry: String,
        retry_after: String,
    },

    #[error("Unexpected response from {registry}: {message}")]
    MalformedResponse { registry: String, message: String },

    #[error("Download failed for {url}: {message}")]
    DownloadFailed { url: String, message: String },

    #[error("Hash mismatch for {filename}: expected {expected}, got {actual}")]
    HashMismatch {
        filename: String,
        expected: String,
        actual: String,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PpmError>;

impl PpmError {
    /// True for "the registry has no record of this" as opposed to a
    /// transport or storage failure. Reconciliation skips these per item.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound { .. } | Self::NoMatch { .. } | Self::VersionNotFound { .. } => 2,
            Self::NotInstalled { .. } => 3,
            Self::ServerVersionUnknown => 4,
            Self::RateLimited { .. } => 5,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_variants_name_their_registry() {
        let unknown = PpmError::UnknownRegistry {
            name: "spigot".to_string(),
        };
        assert_eq!(unknown.to_string(), "Unknown registry source: spigot");

        let limited = PpmError::RateLimited {
            registry: "modrinth".to_string(),
            retry_after: "42".to_string(),
        };
        assert_eq!(
            limited.to_string(),
            "Rate limited by modrinth, retry after ~42 seconds"
        );

        let malformed = PpmError::MalformedResponse {
            registry: "modrinth".to_string(),
            message: "truncated body".to_string(),
        };
        assert_eq!(
            malformed.to_string(),
            "Unexpected response from modrinth: truncated body"
        );
    }

    #[test]
    fn wrapped_errors_expose_their_cause() {
        use std::error::Error;

        let err = PpmError::from(std::io::Error::other("disk gone"));
        assert!(err.source().is_some());
        // Registry names are display data, not a cause chain.
        let unknown = PpmError::UnknownRegistry {
            name: "spigot".to_string(),
        };
        assert!(unknown.source().is_none());
    }
}
