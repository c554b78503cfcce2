//! fraudgraph CLI: score transactions against the shared graph.
//!
//! Usage:
//!   fraudgraph infer --event event.json [--db path] [--config path]
//!   fraudgraph subgraph --transaction <id> [--db path]
//!   fraudgraph init-model --etypes target:card1,target:addr1 --out model.json
//!   fraudgraph inspect-model model.json

use clap::{ArgAction, Parser, Subcommand};
use fraudgraph::inference::{SubgraphExtractor, TargetContext};
use fraudgraph::model::GraphMetadata;
use fraudgraph::{
    DecisionSink, HttpEndpoint, InferenceEvent, InferencePipeline, JsonLinesSink, LocalEndpoint,
    LocalId, ModelArtifact, ModelContext, NodeId, OpenStore, PipelineConfig, ScoringEndpoint,
    SqliteConnector, SqliteStore,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Level;

#[derive(Parser)]
#[command(name = "fraudgraph", version, about = "Real-time graph fraud scoring")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Path to the YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Path to SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Score one transaction event and publish the decision
    Infer {
        /// JSON file holding `transaction_data` and optional `identity_data`
        #[arg(long)]
        event: PathBuf,
    },
    /// Print the extracted neighborhood of a stored transaction
    Subgraph {
        /// TransactionID of a transaction already in the graph
        #[arg(long)]
        transaction: String,
    },
    /// Write a randomly initialized model artifact
    InitModel {
        /// Comma-separated `src:dst` type pairs, e.g. target:card1
        #[arg(long, value_delimiter = ',', required = true)]
        etypes: Vec<String>,
        /// Output file
        #[arg(long)]
        out: PathBuf,
        /// Input feature width (defaults to embedding_width)
        #[arg(long)]
        input_size: Option<usize>,
        /// Seed for reproducible weights
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Validate a model artifact and print its shape
    InspectModel {
        /// Model artifact file
        path: PathBuf,
    },
}

fn data_dir() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    let dir = data_dir.join("fraudgraph");
    std::fs::create_dir_all(&dir).ok();
    dir
}

/// Get the default database path (~/.local/share/fraudgraph/graph.db)
fn default_db_path() -> PathBuf {
    data_dir().join("graph.db")
}

fn default_config_path() -> PathBuf {
    data_dir().join("config.yaml")
}

fn default_model_path() -> PathBuf {
    data_dir().join("model.json")
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<PathBuf>) -> Result<PipelineConfig, String> {
    let path = path.unwrap_or_else(default_config_path);
    PipelineConfig::load(&path).map_err(|e| format!("Failed to load {}: {}", path.display(), e))
}

fn store_path(config: &PipelineConfig, db: Option<PathBuf>) -> PathBuf {
    db.or_else(|| config.store_path.clone())
        .unwrap_or_else(default_db_path)
}

fn open_endpoint(config: &PipelineConfig) -> Result<Arc<dyn ScoringEndpoint>, String> {
    if let Some(url) = &config.endpoint_url {
        let endpoint = HttpEndpoint::new(url.clone(), config.scoring_timeout())
            .map_err(|e| format!("Failed to build HTTP client: {}", e))?;
        return Ok(Arc::new(endpoint));
    }
    let path = config.model_path.clone().unwrap_or_else(default_model_path);
    let context = ModelContext::load(&path)
        .map_err(|e| format!("Failed to load model {}: {}", path.display(), e))?;
    Ok(Arc::new(LocalEndpoint::new(Arc::new(context))))
}

fn read_event(path: &Path) -> Result<InferenceEvent, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read '{}': {}", path.display(), e))?;
    serde_json::from_str(&text).map_err(|e| format!("invalid event '{}': {}", path.display(), e))
}

fn cmd_infer(config: PipelineConfig, db: PathBuf, event_path: &Path) -> i32 {
    let event = match read_event(event_path) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let endpoint = match open_endpoint(&config) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let sink: Arc<dyn DecisionSink> = match &config.queue_path {
        Some(path) => Arc::new(JsonLinesSink::file(path)),
        None => Arc::new(JsonLinesSink::stdout()),
    };
    let pipeline = InferencePipeline::new(config, Arc::new(SqliteConnector::new(db)), endpoint, sink);

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {}", e);
            return 1;
        }
    };
    match runtime.block_on(pipeline.handle_event(&event)) {
        Ok(outcome) => match serde_json::to_string_pretty(&outcome) {
            Ok(json) => {
                println!("{}", json);
                0
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                1
            }
        },
        Err(e) => {
            eprintln!("Error: {}", e);
            if e.is_client_error() {
                2
            } else {
                1
            }
        }
    }
}

fn cmd_subgraph(config: &PipelineConfig, db: &Path, transaction: &str) -> i32 {
    let store = match SqliteStore::open(db) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: Failed to open database: {}", e);
            return 1;
        }
    };
    let node_id = NodeId::target(LocalId::parse(transaction));
    let result = TargetContext::load(&store, &node_id, &config.identifier_columns).and_then(|target| {
        SubgraphExtractor::from_config(config).extract(&store, &target, config.max_fanout)
    });
    match result {
        Ok(subgraph) => match serde_json::to_string_pretty(&subgraph) {
            Ok(json) => {
                println!("{}", json);
                0
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                1
            }
        },
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn parse_pairs(etypes: &[String]) -> Result<Vec<(String, String)>, String> {
    etypes
        .iter()
        .map(|pair| match pair.split_once(':') {
            Some((src, dst)) if !src.is_empty() && !dst.is_empty() => {
                Ok((src.to_string(), dst.to_string()))
            }
            _ => Err(format!("expected src:dst, got '{}'", pair)),
        })
        .collect()
}

fn cmd_init_model(
    config: &PipelineConfig,
    etypes: &[String],
    out: &Path,
    input_size: Option<usize>,
    seed: Option<u64>,
) -> i32 {
    let pairs = match parse_pairs(etypes) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let input_size = input_size.unwrap_or(config.embedding_width);
    let metadata = GraphMetadata::for_relations(&pairs, input_size);
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let artifact = ModelArtifact::initialize(
        metadata,
        input_size,
        config.hidden_size,
        config.layers,
        &mut rng,
    );
    match artifact.save(out) {
        Ok(()) => {
            println!(
                "Wrote model with {} relations to {}",
                artifact.metadata.etypes.len(),
                out.display()
            );
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_inspect_model(path: &Path) -> i32 {
    let artifact = match ModelArtifact::load(path) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    println!("input size:  {}", artifact.input_size);
    println!("hidden size: {}", artifact.hidden_size);
    println!("layers:      {}", artifact.layers.len());
    println!("{:<32}  {:>8}", "RELATION", "WEIGHTS");
    println!("{}", "-".repeat(42));
    for name in &artifact.metadata.etypes {
        let params: usize = artifact
            .layers
            .iter()
            .filter_map(|layer| layer.get(name))
            .map(|linear| linear.weight.len() + linear.bias.len())
            .sum();
        println!("{:<32}  {:>8}", name, params);
    }
    0
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match load_config(cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let code = match cli.command {
        Commands::Infer { event } => {
            let db = store_path(&config, cli.db);
            cmd_infer(config, db, &event)
        }
        Commands::Subgraph { transaction } => {
            let db = store_path(&config, cli.db);
            cmd_subgraph(&config, &db, &transaction)
        }
        Commands::InitModel {
            etypes,
            out,
            input_size,
            seed,
        } => cmd_init_model(&config, &etypes, &out, input_size, seed),
        Commands::InspectModel { path } => cmd_inspect_model(&path),
    };
    std::process::exit(code);
}
