//! # aconex-rag
//!
//! CLI entry point for the retrieval-augmented question-answering service:
//! schema initialization, batch ingestion from a file or stdin, one-shot
//! search/chat against the indexed store, and the HTTP server.

mod chunk;
mod config;
mod db;
mod embedder;
mod embedding;
mod error;
mod extract;
mod ingest;
mod llm;
mod migrate;
mod models;
mod normalize;
mod query_clean;
mod rag;
mod retrieve;
mod server;
mod sqlite_store;
mod store;
mod threshold;
mod upload;

use std::io::Read as _;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use embedder::Embedder;
use rag::HistoryTurn;
use sqlite_store::SqliteStore;

#[derive(Parser)]
#[command(
    name = "aconex-rag",
    about = "Retrieval-augmented question answering over construction documents",
    version
)]
struct Cli {
    /// Path to configuration file
    #[arg(long, global = true, default_value = "./config/aconex-rag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    Init,

    /// Ingest a batch of records from a file (or stdin if --input is omitted)
    Ingest {
        /// Path to a JSON array, single JSON object, or NDJSON file
        #[arg(long)]
        input: Option<PathBuf>,

        /// Project id applied to records with none of their own
        #[arg(long)]
        project_id: Option<String>,

        /// Records per ingest batch
        #[arg(long, default_value_t = 100)]
        batch_size: usize,
    },

    /// Run a one-shot hybrid search against the indexed store
    Search {
        /// Search query
        query: String,

        /// Scope the search to one project
        #[arg(long)]
        project_id: Option<String>,

        /// Maximum number of results
        #[arg(long, default_value_t = 8)]
        top_k: i64,
    },

    /// Ask a grounded question over the indexed store
    Chat {
        /// Question text
        question: String,

        /// Scope retrieval to one project
        #[arg(long)]
        project_id: Option<String>,

        /// Maximum number of context documents
        #[arg(long, default_value_t = 5)]
        max_context_docs: i64,
    },

    /// Start the HTTP API server
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("database initialized");
        }
        Commands::Ingest {
            input,
            project_id,
            batch_size,
        } => {
            migrate::run_migrations(&cfg).await?;
            let pool = db::connect(&cfg).await?;
            let store = SqliteStore::new(pool);
            let embedder = Embedder::new(cfg.embedding.clone());

            let raw_input = match input {
                Some(path) => std::fs::read_to_string(&path)?,
                None => {
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf)?;
                    buf
                }
            };

            let records = ingest::parse_records(&raw_input)?;
            let default_project_id = project_id.unwrap_or_else(|| cfg.server.default_project_id.clone());

            let report = ingest::run_ingest(&store, &embedder, &cfg, records, &default_project_id, batch_size).await?;

            println!("documents upserted: {}", report.documents.len());
            println!("chunks written: {}", report.chunks_written);
            println!("embeddings written: {}", report.embeddings_written);
            if !report.skipped.is_empty() {
                println!("skipped: {}", report.skipped.len());
                for reason in &report.skipped {
                    println!("  - {}", reason);
                }
            }
        }
        Commands::Search {
            query,
            project_id,
            top_k,
        } => {
            let pool = db::connect(&cfg).await?;
            let store = SqliteStore::new(pool);
            let embedder = Embedder::new(cfg.embedding.clone());

            let outcome = retrieve::retrieve(
                &store,
                &embedder,
                &cfg,
                &query,
                project_id.as_deref(),
                top_k,
                cfg.retrieval.ann_probes,
            )
            .await?;

            if outcome.rows.is_empty() {
                println!("no results.");
                return Ok(());
            }

            for (i, row) in outcome.rows.iter().enumerate() {
                println!(
                    "{}. [{:.3}] {} ({})",
                    i + 1,
                    row.score,
                    row.title,
                    if row.number.is_empty() { "N/A" } else { &row.number }
                );
                println!("   document: {}", row.document_id);
                println!("   snippet: {}", row.snippet.replace('\n', " ").trim());
            }
        }
        Commands::Chat {
            question,
            project_id,
            max_context_docs,
        } => {
            let pool = db::connect(&cfg).await?;
            let store = SqliteStore::new(pool);
            let embedder = Embedder::new(cfg.embedding.clone());

            let answer = rag::answer(
                &store,
                &embedder,
                &cfg,
                &question,
                &[] as &[HistoryTurn],
                max_context_docs,
                project_id.as_deref(),
            )
            .await?;

            println!("{}", answer.answer);
            if !answer.sources.is_empty() {
                println!("\nsources:");
                for row in &answer.sources {
                    println!("  - {} ({})", row.title, row.document_id);
                }
            }
        }
        Commands::Serve => {
            migrate::run_migrations(&cfg).await?;
            let pool = db::connect(&cfg).await?;
            let store = SqliteStore::new(pool.clone());
            let embedder = Embedder::new(cfg.embedding.clone());
            server::run_server(&cfg, store, embedder, pool).await?;
        }
    }

    Ok(())
}
