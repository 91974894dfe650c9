use thiserror::Error;

/// The error taxonomy of the harvester. Configuration problems are fatal for
/// the affected config (and abort folder builds); store and discovery
/// failures carry their own recovery policies at the call sites.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid subject '{0}'")]
    InvalidSubject(String),
    #[error(transparent)]
    Store(#[from] graphstore::StoreError),
    #[error(transparent)]
    Discovery(#[from] discovery::DiscoveryError),
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl HarvestError {
    pub fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
