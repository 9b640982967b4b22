//! SQLite article store with migrations
//!
//! Every search call borrows one pooled connection for its duration; the
//! guard returns it to the pool on drop, including on error paths.

use crate::config::DatabaseConfig;
use crate::error::{Result, ThemisError};
use crate::storage::{decode_embedding, encode_embedding};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// A stored statute excerpt
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleRecord {
    pub id: i64,
    pub code_source: String,
    pub article_number: String,
    pub content: String,
    /// Raw JSON metadata, if any
    pub metadata: Option<String>,
}

/// Article to insert or update
#[derive(Debug, Clone)]
pub struct NewArticle<'a> {
    pub code_source: &'a str,
    pub article_number: &'a str,
    pub content: &'a str,
    pub metadata: Option<&'a str>,
    pub embedding: Option<&'a [f32]>,
}

/// Database manager with migration support
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open (or create) the article store
    pub fn new(db_path: &Path, config: &DatabaseConfig) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ThemisError::Io {
                source: e,
                context: format!("Failed to create database directory: {:?}", parent),
            })?;
        }

        let busy_timeout = config.busy_timeout_ms;
        let manager = SqliteConnectionManager::file(db_path).with_init(move |conn| {
            conn.busy_timeout(Duration::from_millis(busy_timeout))?;
            conn.execute_batch(
                "
                PRAGMA synchronous = NORMAL;
                PRAGMA foreign_keys = ON;
                ",
            )
        });

        let pool = Pool::builder()
            .min_idle(Some(config.min_idle))
            .max_size(config.max_size)
            .build(manager)?;

        {
            let conn = pool.get()?;
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }

        let db = Self { pool };
        db.migrate()?;

        Ok(db)
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM _migrations",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                tracing::info!("Applying migration {}", version);
                conn.execute_batch(migration)?;
                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }

    /// Insert an article, or replace the row holding the same article number
    ///
    /// Article numbers are unique across codes; a re-ingested number moves to
    /// the latest `code_source`.
    pub fn upsert_article(&self, article: &NewArticle<'_>) -> Result<i64> {
        let conn = self.get_conn()?;
        let embedding = article.embedding.map(encode_embedding);

        let id: i64 = conn.query_row(
            "INSERT INTO legal_articles (code_source, article_number, content, metadata, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (article_number) DO UPDATE SET
                code_source = excluded.code_source,
                content = excluded.content,
                metadata = excluded.metadata,
                embedding = excluded.embedding
             RETURNING id",
            params![
                article.code_source,
                article.article_number,
                article.content,
                article.metadata,
                embedding
            ],
            |row| row.get(0),
        )?;

        Ok(id)
    }

    /// Fetch one article by its canonical number (case-insensitive)
    pub fn find_by_number(&self, article_number: &str) -> Result<Option<ArticleRecord>> {
        let conn = self.get_conn()?;
        let record = conn
            .query_row(
                "SELECT id, code_source, article_number, content, metadata
                 FROM legal_articles WHERE article_number = ?1 COLLATE NOCASE
                 ORDER BY id LIMIT 1",
                params![article_number],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Fetch articles by id, in the order the ids were given; unknown ids are skipped
    pub fn get_articles(&self, ids: &[i64]) -> Result<Vec<ArticleRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.get_conn()?;
        let placeholders = vec!["?"; ids.len()].join(",");
        let sql = format!(
            "SELECT id, code_source, article_number, content, metadata
             FROM legal_articles WHERE id IN ({})",
            placeholders
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(ids.iter()), row_to_record)?;

        let mut by_id = HashMap::with_capacity(ids.len());
        for row in rows {
            let record = row?;
            by_id.insert(record.id, record);
        }

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    /// All stored embeddings as `(id, vector)`; rows without an embedding are excluded
    pub fn embeddings(&self) -> Result<Vec<(i64, Vec<f32>)>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, embedding FROM legal_articles WHERE embedding IS NOT NULL ORDER BY id",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, bytes) = row?;
            match decode_embedding(&bytes) {
                Some(vector) => out.push((id, vector)),
                None => tracing::warn!("Skipping malformed embedding for article row {}", id),
            }
        }
        Ok(out)
    }

    /// Every stored article, ordered by id
    pub fn all_articles(&self) -> Result<Vec<ArticleRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, code_source, article_number, content, metadata
             FROM legal_articles ORDER BY id",
        )?;
        let rows = stmt.query_map([], row_to_record)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(ThemisError::from)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        let conn = self.get_conn()?;

        let article_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM legal_articles", [], |row| row.get(0))?;

        let embedded_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM legal_articles WHERE embedding IS NOT NULL",
            [],
            |row| row.get(0),
        )?;

        let code_count: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT code_source) FROM legal_articles",
            [],
            |row| row.get(0),
        )?;

        Ok(DbStats {
            article_count: article_count as usize,
            embedded_count: embedded_count as usize,
            code_count: code_count as usize,
        })
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ArticleRecord> {
    Ok(ArticleRecord {
        id: row.get(0)?,
        code_source: row.get(1)?,
        article_number: row.get(2)?,
        content: row.get(3)?,
        metadata: row.get(4)?,
    })
}

/// Database statistics
#[derive(Debug)]
pub struct DbStats {
    pub article_count: usize,
    pub embedded_count: usize,
    pub code_count: usize,
}

/// Database migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: article store
    r#"
    CREATE TABLE legal_articles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        code_source TEXT NOT NULL,
        article_number TEXT NOT NULL,
        content TEXT NOT NULL,
        metadata TEXT,  -- JSON {theme, type}
        embedding BLOB, -- little-endian f32, NULL until embedded
        UNIQUE (article_number)
    );

    CREATE INDEX idx_articles_number ON legal_articles(article_number COLLATE NOCASE);
    "#,
];
