pub mod access;
pub mod backend;
pub mod error;
pub mod mapper;
pub mod memory;
pub mod remote;

pub use access::StoreAccess;
pub use backend::StoreBackend;
pub use error::StoreError;
pub use mapper::{GraphNameMapper, DEFAULT_URN_BASE};

/// One SELECT solution: `(variable, N-Triples-encoded term)` pairs in
/// projection order.
pub type Row = Vec<(String, String)>;

/// Strip N-Triples encoding from a term string to get the raw value.
///
/// - IRI `<http://example.org/foo>` → `http://example.org/foo`
/// - Literal `"hello"` or `"hello"^^<…>` → `hello`
/// - Blank node `_:b0` → `_:b0` (returned as-is)
pub fn term_value(s: &str) -> String {
    if s.starts_with('"') {
        if let Some(end) = s[1..].find('"') {
            return s[1..end + 1].to_string();
        }
    } else if s.starts_with('<') && s.ends_with('>') {
        return s[1..s.len() - 1].to_string();
    }
    s.to_string()
}
