//! relcheck - LLM relevance checking of candidate articles against seed articles
//!
//! ## Usage
//!
//! ### CLI Mode
//! ```bash
//! GPT_SECRET=sk-... relcheck check --seeds seeds.json --candidates candidates.json \
//!     --store-endpoint https://storage.example.com --output results.csv
//! ```
//!
//! ### HTTP Server Mode
//! ```bash
//! GPT_SECRET=sk-... relcheck serve --store-dir ./templates --port 3000
//! ```

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use relcheck::{
    article::articles_from_json,
    checker::DEFAULT_SEED_CAPACITY,
    completion::{DEFAULT_BASE_URL, DEFAULT_MODEL},
    storage::{DEFAULT_BUCKET, DEFAULT_KEY},
    Article, CheckerConfig, Completion, CompletionConfig, HttpObjectStore, LocalObjectStore,
    ObjectStore, OpenAiClient, RelcheckError, RelevanceChecker, RelevanceResult, StorageLocation,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Judge candidate articles against seed articles with a hosted LLM
#[derive(Parser)]
#[command(name = "relcheck")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one relevancy batch from JSON files
    Check {
        /// JSON array of seed articles ({"analyzed_text", "url"})
        #[arg(long)]
        seeds: PathBuf,

        /// JSON array of candidate articles
        #[arg(long)]
        candidates: PathBuf,

        /// Bucket holding the format prompt
        #[arg(long, default_value = DEFAULT_BUCKET)]
        bucket: String,

        /// Key of the format prompt
        #[arg(long, default_value = DEFAULT_KEY)]
        key: String,

        /// Maximum number of seed articles used
        #[arg(long, default_value_t = DEFAULT_SEED_CAPACITY)]
        seed_capacity: usize,

        /// Candidate requests in flight at once
        #[arg(long, default_value = "1")]
        concurrency: usize,

        /// Output file (.json or .csv); stdout JSON when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Append a token usage line to this file
        #[arg(long)]
        usage_log: Option<PathBuf>,

        #[command(flatten)]
        store: StoreArgs,

        #[command(flatten)]
        llm: LlmArgs,
    },

    /// Run as HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[command(flatten)]
        store: StoreArgs,

        #[command(flatten)]
        llm: LlmArgs,
    },
}

/// Where format prompts are read from
#[derive(Args)]
struct StoreArgs {
    /// Object store base URL (objects at {endpoint}/{bucket}/{key})
    #[arg(long, env = "RELCHECK_STORE_ENDPOINT")]
    store_endpoint: Option<String>,

    /// Local directory standing in for the object store ({dir}/{bucket}/{key})
    #[arg(long, env = "RELCHECK_STORE_DIR", conflicts_with = "store_endpoint")]
    store_dir: Option<PathBuf>,

    /// Bearer token for the object store
    #[arg(long, env = "RELCHECK_STORE_TOKEN", hide_env_values = true)]
    store_token: Option<String>,
}

/// Completion API settings
#[derive(Args)]
struct LlmArgs {
    /// LLM API base URL
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    llm_base_url: String,

    /// LLM API key
    #[arg(long, env = "GPT_SECRET", hide_env_values = true)]
    llm_key: String,

    /// LLM model name
    #[arg(long, default_value = DEFAULT_MODEL)]
    llm_model: String,
}

impl StoreArgs {
    fn build(self) -> Result<Arc<dyn ObjectStore>> {
        if let Some(dir) = self.store_dir {
            info!(root = ?dir, "Using local object store");
            return Ok(Arc::new(LocalObjectStore::new(dir)));
        }
        let endpoint = self
            .store_endpoint
            .context("either --store-endpoint or --store-dir is required")?;
        info!(endpoint = %endpoint, "Using HTTP object store");
        Ok(Arc::new(HttpObjectStore::new(&endpoint, self.store_token)?))
    }
}

impl LlmArgs {
    fn build(self) -> Result<Arc<OpenAiClient>> {
        let client = OpenAiClient::new(CompletionConfig {
            base_url: self.llm_base_url,
            api_key: self.llm_key,
            model: self.llm_model,
        })?;
        Ok(Arc::new(client))
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Check {
            seeds,
            candidates,
            bucket,
            key,
            seed_capacity,
            concurrency,
            output,
            usage_log,
            store,
            llm,
        } => {
            let config = CheckerConfig {
                format_prompt_location: StorageLocation::new(bucket, key),
                seed_capacity,
                max_concurrent_requests: concurrency,
            };
            run_check(seeds, candidates, config, output, usage_log, store, llm).await
        }
        Commands::Serve {
            port,
            host,
            store,
            llm,
        } => run_server(host, port, store, llm).await,
    }
}

// ============================================================================
// Check Command
// ============================================================================

async fn run_check(
    seeds_path: PathBuf,
    candidates_path: PathBuf,
    config: CheckerConfig,
    output: Option<PathBuf>,
    usage_log: Option<PathBuf>,
    store: StoreArgs,
    llm: LlmArgs,
) -> Result<()> {
    let seeds = read_articles(&seeds_path).context("Failed to load seed articles")?;
    let candidates = read_articles(&candidates_path).context("Failed to load candidate articles")?;

    let store = store.build()?;
    let client = llm.build()?;

    let checker = RelevanceChecker::new(client.clone(), store.as_ref(), seeds, config)
        .await
        .context("Failed to prepare relevance checker")?;

    let results = checker
        .check_relevancy(&candidates)
        .await
        .context("Relevancy check failed")?;

    match output {
        Some(path) if has_extension(&path, "csv") => save_csv(&path, &results)?,
        Some(path) => {
            let content = serde_json::to_string_pretty(&results)?;
            std::fs::write(&path, content).with_context(|| format!("Failed to write {:?}", path))?;
            info!(path = ?path, count = results.len(), "Saved results");
        }
        None => println!("{}", serde_json::to_string_pretty(&results)?),
    }

    let usage = client.usage();
    info!(
        prompt_tokens = usage.prompt_tokens,
        completion_tokens = usage.completion_tokens,
        total_tokens = usage.total_tokens,
        "Token usage"
    );

    if let Some(path) = usage_log {
        let usage_line = format!(
            "{},{},{},{}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            usage.prompt_tokens,
            usage.completion_tokens,
            usage.total_tokens
        );
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut f| f.write_all(usage_line.as_bytes()))
            .context("Failed to write token usage log")?;
    }

    Ok(())
}

fn read_articles(path: &Path) -> Result<Vec<Article>> {
    let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    Ok(articles_from_json(&content)?)
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// Save results to CSV: `url` first, then the sorted union of other keys
fn save_csv(path: &Path, results: &[RelevanceResult]) -> Result<()> {
    if results.is_empty() {
        info!(path = ?path, "No data to save");
        return Ok(());
    }

    let columns: BTreeSet<&str> = results
        .iter()
        .flat_map(|r| r.keys().map(String::as_str))
        .filter(|k| *k != "url")
        .collect();
    let header: Vec<&str> = std::iter::once("url").chain(columns).collect();

    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .context("Failed to create CSV writer")?;

    wtr.write_record(&header).context("Failed to write CSV header")?;
    for result in results {
        let record: Vec<String> = header.iter().map(|c| csv_cell(result.get(*c))).collect();
        wtr.write_record(&record).context("Failed to write CSV record")?;
    }

    wtr.flush().context("Failed to flush CSV")?;
    info!(path = ?path, count = results.len(), "Saved results");
    Ok(())
}

fn csv_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

async fn run_server(host: String, port: u16, store: StoreArgs, llm: LlmArgs) -> Result<()> {
    info!(host = %host, port = port, "Starting HTTP server");

    let app_state = Arc::new(AppState {
        completion: llm.build()?,
        store: store.build()?,
    });

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/relevance", post(relevance_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .context("Invalid host:port")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Listening");

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}

struct AppState {
    completion: Arc<dyn Completion>,
    store: Arc<dyn ObjectStore>,
}

/// Health check endpoint
async fn health_handler() -> &'static str {
    "OK"
}

/// Relevance request body
#[derive(Debug, Deserialize)]
struct RelevanceRequest {
    seeds: Vec<Article>,
    candidates: Vec<Article>,
    bucket: Option<String>,
    key: Option<String>,
    seed_capacity: Option<usize>,
}

/// Relevance response
#[derive(Debug, Serialize)]
struct RelevanceResponse {
    status: String,
    count: usize,
    results: Vec<RelevanceResult>,
}

/// Relevance endpoint handler
async fn relevance_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RelevanceRequest>,
) -> (StatusCode, Json<RelevanceResponse>) {
    let RelevanceRequest {
        seeds,
        candidates,
        bucket,
        key,
        seed_capacity,
    } = req;
    info!(seeds = seeds.len(), candidates = candidates.len(), "Relevance request");

    let defaults = CheckerConfig::default();
    let config = CheckerConfig {
        format_prompt_location: StorageLocation::new(
            bucket.unwrap_or(defaults.format_prompt_location.bucket),
            key.unwrap_or(defaults.format_prompt_location.key),
        ),
        seed_capacity: seed_capacity.unwrap_or(defaults.seed_capacity),
        max_concurrent_requests: defaults.max_concurrent_requests,
    };

    let outcome = async {
        let checker =
            RelevanceChecker::new(state.completion.clone(), state.store.as_ref(), seeds, config).await?;
        checker.check_relevancy(&candidates).await
    }
    .await;

    match outcome {
        Ok(results) => (
            StatusCode::OK,
            Json(RelevanceResponse {
                status: "success".to_string(),
                count: results.len(),
                results,
            }),
        ),
        Err(e) => {
            error!(error = %e, "Relevance check failed");
            (
                status_for(&e),
                Json(RelevanceResponse {
                    status: format!("error: {}", e),
                    count: 0,
                    results: vec![],
                }),
            )
        }
    }
}

fn status_for(err: &RelcheckError) -> StatusCode {
    match err {
        RelcheckError::NotFound { .. } => StatusCode::NOT_FOUND,
        RelcheckError::Validation(_) => StatusCode::BAD_REQUEST,
        RelcheckError::ContextLengthExceeded(_) | RelcheckError::SummaryTooLarge { .. } => {
            StatusCode::PAYLOAD_TOO_LARGE
        }
        RelcheckError::MalformedResponse { .. }
        | RelcheckError::Api { .. }
        | RelcheckError::Network(_)
        | RelcheckError::Storage { .. }
        | RelcheckError::Encoding { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
