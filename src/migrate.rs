//! Database schema migrations (§6.2's portable schema sketch, realized over
//! SQLite). Creates `documents`, `document_chunks`, the FTS5 lexical index
//! that backs `Store::lexical_rank`, and the `chat_feedback` write-only
//! table. Idempotent; safe to run against an already-initialized database.

use anyhow::Result;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            document_id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            title TEXT NOT NULL DEFAULT '',
            number TEXT NOT NULL DEFAULT '',
            category TEXT NOT NULL DEFAULT '',
            doc_type TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT '',
            review_status TEXT NOT NULL DEFAULT '',
            revision TEXT NOT NULL DEFAULT '',
            filename TEXT NOT NULL DEFAULT '',
            file_type TEXT NOT NULL DEFAULT '',
            file_size INTEGER,
            date_modified TEXT,
            raw TEXT NOT NULL DEFAULT '{}',
            file_content BLOB
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // embedding stored as a little-endian f32 blob; NULL means lexical-only
    // (4.1 invariant: a chunk without an embedding is invisible to vector
    // retrieval but still searchable lexically).
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document_chunks (
            chunk_id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            project_id TEXT NOT NULL,
            title TEXT NOT NULL DEFAULT '',
            date_modified TEXT,
            content TEXT NOT NULL,
            embedding BLOB,
            FOREIGN KEY (document_id) REFERENCES documents(document_id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // FTS5 virtual tables aren't created idempotently by IF NOT EXISTS in
    // older SQLite builds; check first, as the teacher's chunks_fts setup
    // does.
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='document_chunks_fts'",
    )
    .fetch_one(&pool)
    .await?;

    if !fts_exists {
        // title/number/content carry independent bm25 column weights
        // (2x/1x/1x) so the hybrid retriever's lexical rank reproduces
        // spec §4.7's `text_rank` formula in one FTS5 query instead of three
        // separate rank computations.
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE document_chunks_fts USING fts5(
                chunk_id UNINDEXED,
                document_id UNINDEXED,
                project_id UNINDEXED,
                title,
                number,
                content
            )
            "#,
        )
        .execute(&pool)
        .await?;
    }

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chat_feedback (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL,
            rating INTEGER NOT NULL,
            comment TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_document_chunks_document_id ON document_chunks(document_id)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_document_chunks_project_id ON document_chunks(project_id)")
        .execute(&pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_project_id ON documents(project_id)")
        .execute(&pool)
        .await?;

    pool.close().await;
    Ok(())
}
