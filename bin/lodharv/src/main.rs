use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use harvest::Service;

/// lodharv — configuration-driven linked-data traversal harvester.
///
/// Loads one or more job configs, asserts every property path for every
/// subject by iteratively dereferencing linked-data descriptions into the
/// target store, and records an execution report next to the harvested
/// triples.
///
/// Exit codes:
///   0  Success
///   1  Fatal configuration or I/O error
#[derive(Parser)]
#[command(name = "lodharv", version, about)]
struct Cli {
    /// Path to a config file or a folder of config files
    #[arg(short, long)]
    config: PathBuf,

    /// Where to dump the harvested graph; use '-' for stdout
    #[arg(short, long)]
    dump: Option<String>,

    /// Initial-context files, folders or URLs loaded into the store first
    #[arg(short, long, num_args = 1..)]
    init: Vec<String>,

    /// Read and write URIs of a SPARQL 1.1 endpoint; memory store when absent
    #[arg(short = 's', long = "target-store", num_args = 2, value_names = ["READ_URI", "WRITE_URI"])]
    target_store: Option<Vec<String>>,

    /// File holding a tracing filter directive (e.g. "harvest=debug")
    #[arg(short, long)]
    logconf: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.logconf.as_deref()) {
        eprintln!("[lodharv] ERROR: {e:?}");
        std::process::exit(1);
    }

    if let Err(e) = run(cli) {
        eprintln!("[lodharv] ERROR: {e:?}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let target_store = match cli.target_store.as_deref() {
        Some([read_uri, write_uri]) => Some((read_uri.clone(), write_uri.clone())),
        Some(_) => anyhow::bail!("--target-store expects exactly READ_URI and WRITE_URI"),
        None => None,
    };

    let service = Service::new(cli.config, target_store, cli.init, cli.dump)
        .context("Failed to construct the harvesting service")?;
    service.process().context("Harvest run failed")?;
    Ok(())
}

fn init_logging(logconf: Option<&std::path::Path>) -> anyhow::Result<()> {
    let filter = match logconf {
        Some(path) => {
            let directives = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read logconf {}", path.display()))?;
            EnvFilter::try_new(directives.trim())
                .with_context(|| format!("Invalid logconf directives in {}", path.display()))?
        }
        None => EnvFilter::from_default_env(),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}
