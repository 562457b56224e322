mod doctor;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use casegraph_core::config::{AppConfig, ModelConfig};
use casegraph_core::event::EventBus;
use casegraph_core::types::WorkflowEvent;
use casegraph_engine::Workflow;
use casegraph_memory::{EmbeddingRetriever, HttpEmbeddingProvider, IndexStore, VectorIndex};
use casegraph_services::{create_reader, create_search, create_translator};
use casegraph_stages::keys::DOCUMENT_BYTES;
use casegraph_stages::{build_case_graph, initial_state, Services};

#[derive(Parser)]
#[command(name = "casegraph", version, about = "FIR analysis workflow engine")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "casegraph.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway
    Serve,
    /// Analyze one document and print the final state as JSON
    Run {
        /// A .pdf or .txt file
        file: PathBuf,
    },
    /// Print the validated workflow graph
    Graph,
    /// Show current configuration
    Config,
    /// Check configuration and retrieval indexes
    Doctor,
    /// Embed a JSONL file of chunks into a corpus index
    Index {
        /// Corpus name (e.g. ndps, bns, forensic)
        corpus: String,
        /// One JSON object per line, each with a `content` field
        chunks: PathBuf,
        /// Chunks per embedding request
        #[arg(long, default_value = "64")]
        batch_size: usize,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("casegraph=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "casegraph", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Doctor => {
            println!("casegraph doctor");
            println!("================");
            doctor::run_doctor(&config);
        }
        Commands::Graph => {
            let graph = build_case_graph(Arc::new(build_services(&config)?))?;
            for id in graph.order() {
                let roles: Vec<String> = graph.roles(id).iter().map(|r| format!("{:?}", r)).collect();
                println!("{:<36} {}", id, roles.join(", "));
            }
            for join in graph.joins() {
                println!("join {} <- {}", join.node, join.predecessors.join(", "));
            }
        }
        Commands::Index {
            corpus,
            chunks,
            batch_size,
        } => {
            index_corpus(&config, &corpus, &chunks, batch_size).await?;
        }
        Commands::Run { file } => {
            let bytes = std::fs::read(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let filename = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if !casegraph_services::is_accepted(&filename) {
                anyhow::bail!("only .pdf and .txt files are supported: {}", filename);
            }

            let event_bus = Arc::new(EventBus::default());
            spawn_progress_logger(&event_bus);
            let workflow = Workflow::new(build_case_graph(Arc::new(build_services(&config)?))?)
                .with_events(event_bus);

            let mut state = workflow.invoke(initial_state(&filename, &bytes)).await?;
            state.remove(DOCUMENT_BYTES);
            println!("{}", serde_json::to_string_pretty(state.data())?);
        }
        Commands::Serve => {
            let event_bus = Arc::new(EventBus::default());
            spawn_progress_logger(&event_bus);
            let workflow = Workflow::new(build_case_graph(Arc::new(build_services(&config)?))?)
                .with_events(event_bus);

            info!(bind = %config.gateway.bind, "Starting HTTP gateway");
            let server = casegraph_gateway::GatewayServer::new(
                config.gateway.clone(),
                workflow,
                Arc::new(casegraph_gateway::InMemoryResultStore::new()),
            );
            let cancel = tokio_util::sync::CancellationToken::new();
            let cancel_clone = cancel.clone();

            // Graceful shutdown on Ctrl-C
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                info!("Shutting down gateway...");
                cancel_clone.cancel();
            });

            server.run(cancel).await?;
        }
        // Handled before config loading
        Commands::Completions { .. } => {}
    }

    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        return Ok(AppConfig::load(path)?);
    }
    let home_config = dirs_home().map(|h| h.join(".casegraph").join("config.toml"));
    if let Some(path) = home_config.filter(|p| p.exists()) {
        info!(path = %path.display(), "Loading config from home directory");
        return Ok(AppConfig::load(&path)?);
    }
    eprintln!("Warning: No config file found. Set OPENAI_API_KEY or create casegraph.toml");
    create_env_config()
}

/// Minimal config from the environment: an OpenAI key drives both inference
/// and embeddings.
fn create_env_config() -> anyhow::Result<AppConfig> {
    let Some(key) = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()) else {
        anyhow::bail!("No config file and OPENAI_API_KEY is not set");
    };
    let model = ModelConfig {
        provider: "openai".into(),
        model_id: "gpt-4o-mini".into(),
        api_key: Some(key.clone()),
        base_url: None,
        max_tokens: 4096,
        temperature: 0.0,
        timeout_secs: 120,
    };
    let config = serde_json::json!({
        "model": model,
        "embedding": { "model": "text-embedding-3-small", "api_key": key },
    });
    Ok(serde_json::from_value(config)?)
}

/// Wire the configured collaborators into the stage services.
fn build_services(config: &AppConfig) -> anyhow::Result<Services> {
    let inference = casegraph_llm::create_client(&config.model)?;
    let embedding = config
        .embedding
        .as_ref()
        .context("an [embedding] section is required for retrieval")?;
    let embedder = Arc::new(HttpEmbeddingProvider::from_config(embedding)?);
    let retrieval = Arc::new(EmbeddingRetriever::new(
        embedder,
        IndexStore::new(config.index_dir()),
    ));

    let mut services = Services::new(
        inference,
        retrieval,
        create_translator(config.translation.as_ref()),
        create_reader(&config.ingestion),
    )
    .with_retry(config.retry.clone())
    .with_top_k(config.retrieval.top_k);

    if let Some(search) = create_search(config.web_search.as_ref())? {
        let max_results = config.web_search.as_ref().map_or(5, |w| w.max_results);
        services = services.with_search(search).with_search_results(max_results);
    }
    if config.translation.is_none() {
        warn!("No [translation] section; documents are analyzed untranslated");
    }
    Ok(services)
}

async fn index_corpus(
    config: &AppConfig,
    corpus: &str,
    chunks_path: &Path,
    batch_size: usize,
) -> anyhow::Result<()> {
    let embedding = config
        .embedding
        .as_ref()
        .context("an [embedding] section is required to build indexes")?;
    let embedder = HttpEmbeddingProvider::from_config(embedding)?;
    let store = IndexStore::new(config.index_dir());
    let out = store.path_for(corpus)?;

    let content = std::fs::read_to_string(chunks_path)
        .with_context(|| format!("reading {}", chunks_path.display()))?;
    let chunks = content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("{}:{}", chunks_path.display(), i + 1))
        })
        .collect::<anyhow::Result<Vec<serde_json::Value>>>()?;

    info!(corpus, chunks = chunks.len(), "Embedding corpus");
    let index = VectorIndex::build(&embedder, chunks, batch_size).await?;
    index.save(&out)?;
    println!("Wrote {} entries to {}", index.len(), out.display());
    Ok(())
}

fn spawn_progress_logger(bus: &EventBus) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match event {
                WorkflowEvent::NodeStarted { node_id } => info!(node = %node_id, "Node started"),
                WorkflowEvent::NodeCompleted {
                    node_id, elapsed_ms, ..
                } => info!(node = %node_id, elapsed_ms, "Node completed"),
                WorkflowEvent::NodeFailed { node_id, error } => {
                    warn!(node = %node_id, error = %error, "Node failed")
                }
                WorkflowEvent::RunFinished {
                    succeeded,
                    elapsed_ms,
                } => info!(succeeded, elapsed_ms, "Run finished"),
            }
        }
    });
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
