use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use oxigraph::model::{Graph, GraphName, GraphNameRef, NamedNode, Quad};
use oxigraph::sparql::QueryResults;
use oxigraph::store::Store;
use tracing::debug;

use crate::error::StoreError;
use crate::Row;

/// In-process backend: one Oxigraph store holding the combined default graph
/// plus a copy of every triple under its named graph, and a lastmod register
/// keyed by named-graph URI.
pub struct MemoryBackend {
    store: Store,
    lastmod: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl MemoryBackend {
    pub fn new() -> Result<Self, StoreError> {
        let store = Store::new().map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self {
            store,
            lastmod: Mutex::new(HashMap::new()),
        })
    }

    pub fn select(&self, sparql: &str) -> Result<Vec<Row>, StoreError> {
        let results = self
            .store
            .query(sparql)
            .map_err(|e| StoreError::Query(e.to_string()))?;
        match results {
            QueryResults::Solutions(solutions) => {
                let names = solutions.variables().to_vec();
                let mut rows = Vec::new();
                for solution in solutions {
                    let solution = solution.map_err(|e| StoreError::Query(e.to_string()))?;
                    let row: Row = names
                        .iter()
                        .filter_map(|v| {
                            solution
                                .get(v)
                                .map(|term| (v.as_str().to_string(), term.to_string()))
                        })
                        .collect();
                    rows.push(row);
                }
                Ok(rows)
            }
            QueryResults::Boolean(b) => {
                if b {
                    Ok(vec![vec![("result".to_string(), "true".to_string())]])
                } else {
                    Ok(Vec::new())
                }
            }
            QueryResults::Graph(_) => Err(StoreError::Query(
                "expected SELECT solutions, got a graph".to_string(),
            )),
        }
    }

    /// Append the triples to both the combined default graph and the named
    /// graph, then stamp the named graph's lastmod.
    pub fn insert(&self, graph: &Graph, named_graph: &NamedNode) -> Result<(), StoreError> {
        for triple in graph.iter() {
            self.store
                .insert(triple.in_graph(GraphNameRef::DefaultGraph))
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            self.store
                .insert(triple.in_graph(named_graph.as_ref().into()))
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        let mut lastmod = self.lastmod.lock().expect("lastmod lock poisoned");
        lastmod.insert(named_graph.as_str().to_string(), Utc::now());
        debug!(named_graph = named_graph.as_str(), triples = graph.len(), "inserted");
        Ok(())
    }

    pub fn lastmod_ts(&self, named_graph: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        let lastmod = self.lastmod.lock().expect("lastmod lock poisoned");
        Ok(lastmod.get(named_graph).copied())
    }

    /// Remove the named graph's triples. The combined default graph holds a
    /// single copy shared by every named graph, so that copy only goes when
    /// no surviving named graph still asserts the triple.
    pub fn drop_graph(&self, named_graph: &NamedNode) -> Result<(), StoreError> {
        let quads: Vec<Quad> = self
            .store
            .quads_for_pattern(None, None, None, Some(named_graph.as_ref().into()))
            .collect::<Result<_, _>>()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        for quad in quads {
            self.store
                .remove(&quad)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            if !self.triple_held_in_named_graph(&quad)? {
                let default_copy = Quad::new(
                    quad.subject.clone(),
                    quad.predicate.clone(),
                    quad.object.clone(),
                    GraphName::DefaultGraph,
                );
                self.store
                    .remove(&default_copy)
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
            }
        }
        Ok(())
    }

    /// Whether any named graph still contains the quad's triple.
    fn triple_held_in_named_graph(&self, quad: &Quad) -> Result<bool, StoreError> {
        for other in self.store.quads_for_pattern(
            Some(quad.subject.as_ref()),
            Some(quad.predicate.as_ref()),
            Some(quad.object.as_ref()),
            None,
        ) {
            let other = other.map_err(|e| StoreError::Backend(e.to_string()))?;
            if other.graph_name != GraphName::DefaultGraph {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Stop tracking the named graph: drop its lastmod entry and its (empty)
    /// graph name from the store.
    pub fn forget_graph(&self, named_graph: &NamedNode) -> Result<(), StoreError> {
        let mut lastmod = self.lastmod.lock().expect("lastmod lock poisoned");
        lastmod.remove(named_graph.as_str());
        drop(lastmod);
        self.store
            .remove_named_graph(named_graph.as_ref())
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }

    pub fn named_graphs(&self) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        for name in self.store.named_graphs() {
            let name = name.map_err(|e| StoreError::Backend(e.to_string()))?;
            if let oxigraph::model::NamedOrBlankNode::NamedNode(n) = name {
                names.push(n.as_str().to_string());
            }
        }
        Ok(names)
    }
}
