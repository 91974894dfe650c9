pub mod client;
pub mod formats;
pub mod html;

pub use client::{DescriptionSource, LodClient};
pub use formats::{parse_rdf, rdf_format_for, strip_parameters};
pub use html::{extract_lod_hints, LodHints};

use thiserror::Error;

/// Errors raised while dereferencing and parsing linked-data descriptions.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("invalid URL '{0}'")]
    InvalidUrl(String),
    #[error("could not parse {media_type} description from {url}: {message}")]
    Parse {
        url: String,
        media_type: String,
        message: String,
    },
    #[error("HTTP transport failure for {url}: {message}")]
    Transport { url: String, message: String },
}
