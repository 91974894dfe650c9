pub mod nsm;
pub mod path;
pub mod uri;

pub use nsm::{inject_prefixes, NamespaceManager};
pub use path::{resolve_path, split_path};
pub use uri::{is_uri, resolve_uri};

use thiserror::Error;

/// Errors raised while resolving URIs, CURIEs and property paths.
#[derive(Debug, Error)]
pub enum UriError {
    #[error("unknown prefix '{0}'")]
    UnknownPrefix(String),
    #[error("not a valid absolute URI: '{0}'")]
    InvalidUri(String),
    #[error("empty step in property path '{0}'")]
    EmptyPathStep(String),
    #[error("unterminated '<' in property path '{0}'")]
    UnclosedIri(String),
}
