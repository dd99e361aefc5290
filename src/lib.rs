//! # aconex-rag
//!
//! **Retrieval-augmented question answering over construction documents.**
//!
//! Records are normalized into a common [`models::Document`] shape regardless
//! of which upstream export produced them, chunked and embedded by the
//! [`ingest`] pipeline, and indexed in SQLite for both lexical (FTS5/BM25) and
//! vector (cosine) retrieval. [`retrieve`] merges the two signals into one
//! hybrid score and walks a ladder of relevance tiers ([`threshold`]) until
//! enough results clear the bar. [`rag`] wraps that retrieval in a
//! grounded-answer contract: it calls an external chat model over the
//! retrieved context, or falls back to an extractive answer when the model
//! is unavailable or the evidence doesn't clear a confidence floor.
//!
//! ## Data flow
//!
//! 1. Records arrive as a batch file/stream ([`ingest::parse_records`]) or a
//!    single uploaded file ([`upload`]).
//! 2. [`normalize`] maps each record's raw shape onto [`models::Document`].
//! 3. [`chunk`] splits the body into overlapping, content-addressed pieces.
//! 4. [`embedder`] (backed by one of the [`embedding`] providers) encodes
//!    each chunk; [`sqlite_store`] persists documents, chunks, embeddings,
//!    and the FTS5 index.
//! 5. [`retrieve`] and [`rag`] serve queries over that store via [`server`]'s
//!    HTTP API.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML + env configuration, validation |
//! | [`models`] | `Document`, `Chunk`, `SearchRow`, and the raw record shapes |
//! | [`normalize`] | Raw record → `Document` normalization |
//! | [`chunk`] | Sliding-window chunker with deterministic chunk ids |
//! | [`embedder`] | Process-wide embedding singleton (lazy init, serialized access) |
//! | [`embedding`] | Embedding provider implementations (OpenAI, Ollama, local) |
//! | [`ingest`] | Batch ingestion: normalize → chunk → embed → store |
//! | [`upload`] | Single-file upload adapter (PDF/DOCX/TXT/JSON) |
//! | [`store`] | Storage trait shared by retrieval and ingestion |
//! | [`sqlite_store`] | SQLite-backed `Store` implementation (FTS5 + brute-force cosine) |
//! | [`retrieve`] | Hybrid retrieval plus adaptive threshold tiering |
//! | [`threshold`] | Relevance tier ladder and the `/search` secondary cutoff |
//! | [`rag`] | Grounded chat-answer orchestration with extractive fallback |
//! | [`llm`] | OpenAI-chat-completions-compatible client |
//! | [`extract`] | PDF/DOCX text extraction for uploads |
//! | [`query_clean`] | Strips conversational filler from natural-language queries |
//! | [`server`] | Axum HTTP API with CORS |
//! | [`db`] | SQLite connection pool (WAL mode) |
//! | [`migrate`] | Database schema migrations (idempotent) |
//! | [`error`] | Service-wide error taxonomy and HTTP status mapping |

pub mod chunk;
pub mod config;
pub mod db;
pub mod embedder;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod query_clean;
pub mod rag;
pub mod retrieve;
pub mod server;
pub mod sqlite_store;
pub mod store;
pub mod threshold;
pub mod upload;
