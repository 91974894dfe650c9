use thiserror::Error;

/// Errors surfaced by the store facade and its backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SPARQL query failed: {0}")]
    Query(String),
    #[error("HTTP transport failure: {0}")]
    Transport(String),
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("invalid named graph IRI '{0}'")]
    InvalidGraphName(String),
    /// A single N-Triples statement that can never fit in an insert batch is
    /// a configuration problem, not a retryable condition.
    #[error("statement of {size} chars exceeds the insert batch limit of {max}")]
    OversizedStatement { size: usize, max: usize },
}
