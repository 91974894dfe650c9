use chrono::{DateTime, Utc};
use oxigraph::model::{Graph, NamedNode};

use crate::error::StoreError;
use crate::memory::MemoryBackend;
use crate::remote::RemoteBackend;
use crate::Row;

/// The two store flavours behind the facade. Dispatch is by variant; both
/// honour the same contract.
pub enum StoreBackend {
    Memory(MemoryBackend),
    Remote(RemoteBackend),
}

impl StoreBackend {
    pub fn memory() -> Result<Self, StoreError> {
        Ok(Self::Memory(MemoryBackend::new()?))
    }

    pub fn remote(read_uri: &str, write_uri: &str, admin_ng: &str) -> Self {
        Self::Remote(RemoteBackend::new(read_uri, write_uri, admin_ng))
    }

    pub fn select(&self, sparql: &str) -> Result<Vec<Row>, StoreError> {
        match self {
            Self::Memory(backend) => backend.select(sparql),
            Self::Remote(backend) => backend.select(sparql),
        }
    }

    pub fn insert(&self, graph: &Graph, named_graph: &NamedNode) -> Result<(), StoreError> {
        match self {
            Self::Memory(backend) => backend.insert(graph, named_graph),
            Self::Remote(backend) => backend.insert(graph, named_graph),
        }
    }

    pub fn lastmod_ts(&self, named_graph: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        match self {
            Self::Memory(backend) => backend.lastmod_ts(named_graph),
            Self::Remote(backend) => backend.lastmod_ts(named_graph),
        }
    }

    pub fn drop_graph(&self, named_graph: &NamedNode) -> Result<(), StoreError> {
        match self {
            Self::Memory(backend) => backend.drop_graph(named_graph),
            Self::Remote(backend) => backend.drop_graph(named_graph),
        }
    }

    pub fn forget_graph(&self, named_graph: &NamedNode) -> Result<(), StoreError> {
        match self {
            Self::Memory(backend) => backend.forget_graph(named_graph),
            Self::Remote(backend) => backend.forget_graph(named_graph),
        }
    }

    pub fn named_graphs(&self) -> Result<Vec<String>, StoreError> {
        match self {
            Self::Memory(backend) => backend.named_graphs(),
            Self::Remote(backend) => backend.named_graphs(),
        }
    }
}
