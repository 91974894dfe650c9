use std::path::{Path, PathBuf};

use oxigraph::io::{RdfFormat, RdfSerializer};
use oxigraph::model::Graph;
use tracing::{debug, error, info, warn};
use url::Url;

use discovery::formats::{JSON_LD, TURTLE};
use discovery::{parse_rdf, DescriptionSource, LodClient};
use graphstore::{GraphNameMapper, StoreAccess, StoreBackend};
use urikit::is_uri;

use crate::config::ConfigBuilder;
use crate::error::HarvestError;
use crate::executor::Executor;

/// Name of the pseudo-config whose graph receives initial-context triples.
const CONTEXT_NAME: &str = "context";

/// Accept preference when dereferencing context URLs.
const CONTEXT_ACCEPT: [&str; 2] = [TURTLE, JSON_LD];

/// Top-level orchestration: build the store, preload context, build configs,
/// run the executor per config, dump the result.
pub struct Service {
    store: StoreAccess,
    client: LodClient,
    config_path: PathBuf,
    init_resources: Vec<String>,
    dump: Option<String>,
}

impl Service {
    /// `target_store` absent selects the in-memory backend; a
    /// `(read_uri, write_uri)` pair selects the remote SPARQL backend.
    pub fn new(
        config_path: PathBuf,
        target_store: Option<(String, String)>,
        init_resources: Vec<String>,
        dump: Option<String>,
    ) -> Result<Self, HarvestError> {
        let mapper = GraphNameMapper::default();
        let backend = match &target_store {
            None => StoreBackend::memory()?,
            Some((read_uri, write_uri)) => {
                StoreBackend::remote(read_uri, write_uri, &mapper.admin_ng())
            }
        };
        Ok(Self {
            store: StoreAccess::with_mapper(backend, mapper),
            client: LodClient::new(),
            config_path,
            init_resources,
            dump,
        })
    }

    pub fn store(&self) -> &StoreAccess {
        &self.store
    }

    pub fn process(&self) -> Result<(), HarvestError> {
        self.load_initial_context()?;

        let builder = ConfigBuilder::new(&self.store);
        let configs = if self.config_path.is_dir() {
            builder.build_from_folder(&self.config_path)?
        } else {
            builder
                .build_from_config(&self.config_path)?
                .into_iter()
                .collect()
        };
        info!(configs = configs.len(), "configs ready to run");

        for config in &configs {
            if let Err(e) = Executor::new(config, &self.store, &self.client).run() {
                // one config failing does not stop the others
                error!(config = config.name.as_str(), error = %e, "config execution failed");
            }
        }

        self.dump_output()
    }

    /// Load every `--init` resource (file, folder or URL) into one graph and
    /// insert it under the context named graph.
    fn load_initial_context(&self) -> Result<(), HarvestError> {
        if self.init_resources.is_empty() {
            return Ok(());
        }
        let mut graph = Graph::new();
        for resource in &self.init_resources {
            load_resource_into_graph(&mut graph, resource, &self.client)?;
        }
        info!(triples = graph.len(), "loaded initial context");
        self.store.insert_for_config(&graph, CONTEXT_NAME)?;
        Ok(())
    }

    fn dump_output(&self) -> Result<(), HarvestError> {
        let Some(dest) = &self.dump else {
            return Ok(());
        };
        let rows = self.store.all_triples()?;
        if rows.is_empty() {
            debug!("nothing to dump");
            return Ok(());
        }
        // rebuild a graph from the row encoding so any serialiser can run
        let ntriples: String = rows
            .iter()
            .filter_map(|row| match row.as_slice() {
                [(_, s), (_, p), (_, o)] => Some(format!("{s} {p} {o} .\n")),
                _ => None,
            })
            .collect();
        let graph = parse_rdf(&ntriples, TURTLE, "urn:x-dump:")
            .map_err(|e| HarvestError::Config(format!("could not rebuild dump graph: {e}")))?;

        if dest == "-" {
            let serialised = serialize_graph(&graph, RdfFormat::Turtle)?;
            println!("{serialised}");
            return Ok(());
        }
        let path = Path::new(dest);
        let format = format_for_extension(path);
        let serialised = serialize_graph(&graph, format)?;
        std::fs::write(path, serialised).map_err(|e| HarvestError::io(path, e))?;
        info!(dest = dest.as_str(), triples = graph.len(), "dumped harvested graph");
        Ok(())
    }
}

/// Output format by file suffix; Turtle when in doubt.
fn format_for_extension(path: &Path) -> RdfFormat {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jsonld") | Some("json") => {
            RdfFormat::from_media_type(JSON_LD).unwrap_or(RdfFormat::Turtle)
        }
        _ => RdfFormat::Turtle,
    }
}

/// Media type for parsing a context file, by suffix; Turtle when in doubt
/// (N-Triples parses as Turtle).
fn media_type_for_file(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jsonld") | Some("json-ld") | Some("json") => JSON_LD,
        _ => TURTLE,
    }
}

fn serialize_graph(graph: &Graph, format: RdfFormat) -> Result<String, HarvestError> {
    let mut serializer = RdfSerializer::from_format(format).for_writer(Vec::new());
    for triple in graph.iter() {
        serializer
            .serialize_triple(triple)
            .map_err(|e| HarvestError::Config(format!("serialisation failed: {e}")))?;
    }
    let bytes = serializer
        .finish()
        .map_err(|e| HarvestError::Config(format!("serialisation failed: {e}")))?;
    String::from_utf8(bytes).map_err(|e| HarvestError::Config(format!("non-UTF8 output: {e}")))
}

/// Union a context resource into the graph. URLs are dereferenced through
/// the LOD client; files parse by suffix; folders recurse.
fn load_resource_into_graph(
    graph: &mut Graph,
    resource: &str,
    client: &LodClient,
) -> Result<(), HarvestError> {
    if is_uri(resource) {
        match client.get_graph_for_format(resource, &CONTEXT_ACCEPT)? {
            Some(fetched) => {
                for triple in fetched.iter() {
                    graph.insert(triple);
                }
            }
            None => warn!(resource, "context URL yielded no description"),
        }
        return Ok(());
    }

    let path = Path::new(resource);
    if path.is_file() {
        let text = std::fs::read_to_string(path).map_err(|e| HarvestError::io(path, e))?;
        let base = file_base_iri(path);
        let parsed = parse_rdf(&text, media_type_for_file(path), &base)
            .map_err(|e| HarvestError::Config(format!("context file '{resource}': {e}")))?;
        for triple in parsed.iter() {
            graph.insert(triple);
        }
        return Ok(());
    }
    if path.is_dir() {
        let mut entries: Vec<_> = std::fs::read_dir(path)
            .map_err(|e| HarvestError::io(path, e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| HarvestError::io(path, e))?
            .into_iter()
            .map(|entry| entry.path())
            .collect();
        entries.sort();
        for entry in entries {
            load_resource_into_graph(graph, &entry.display().to_string(), client)?;
        }
        return Ok(());
    }
    Err(HarvestError::Config(format!(
        "context resource '{resource}' is neither a URL, a file nor a folder"
    )))
}

/// Base IRI for parsing a local file, falling back to a URN when the path
/// cannot be expressed as a file URL.
fn file_base_iri(path: &Path) -> String {
    std::fs::canonicalize(path)
        .ok()
        .and_then(|abs| Url::from_file_path(abs).ok())
        .map(String::from)
        .unwrap_or_else(|| "urn:x-context:".to_string())
}
