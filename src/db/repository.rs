use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::{Result, StorageError};
use crate::models::{Article, ArticleId};

use super::schema::{MIGRATIONS, SCHEMA_VERSION};

const ARTICLE_COLUMNS: &str = "id, title, author, body, body_html, preview, cover_image, \
                               published_at, updated_at, cached_at, has_full_content";

/// Local article store backed by a single SQLite connection.
///
/// All calls are executed in submission order on the connection thread, so an
/// awaited write is visible to every read issued after it.
#[derive(Clone)]
pub struct ArticleRepository {
    conn: Connection,
}

impl ArticleRepository {
    pub async fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref()).await?;
        Self::from_connection(conn).await
    }

    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::from_connection(conn).await
    }

    async fn from_connection(conn: Connection) -> Result<Self> {
        let repository = Self { conn };
        repository.migrate().await?;
        Ok(repository)
    }

    async fn migrate(&self) -> Result<()> {
        let current = self.schema_version().await?;
        if current > SCHEMA_VERSION {
            return Err(StorageError::UnsupportedVersion {
                found: current,
                supported: SCHEMA_VERSION,
            }
            .into());
        }
        if current == SCHEMA_VERSION {
            return Ok(());
        }

        self.conn
            .call(move |conn| {
                for (version, sql) in MIGRATIONS.iter().filter(|(v, _)| *v > current) {
                    let tx = conn.transaction()?;
                    tx.execute_batch(sql)?;
                    tx.pragma_update(None, "user_version", *version)?;
                    tx.commit()?;
                }
                Ok(())
            })
            .await?;

        tracing::debug!("Migrated article store from v{} to v{}", current, SCHEMA_VERSION);
        Ok(())
    }

    pub async fn schema_version(&self) -> Result<u32> {
        let version = self
            .conn
            .call(|conn| {
                let version: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
                Ok(version)
            })
            .await?;
        Ok(version)
    }

    pub async fn read_all(&self) -> Result<Vec<Article>> {
        let articles = self
            .conn
            .call(|conn| {
                let mut stmt =
                    conn.prepare(&format!("SELECT {} FROM articles ORDER BY id", ARTICLE_COLUMNS))?;
                let articles = stmt
                    .query_map([], article_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }

    pub async fn get(&self, id: ArticleId) -> Result<Option<Article>> {
        let article = self
            .conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare(&format!("SELECT {} FROM articles WHERE id = ?1", ARTICLE_COLUMNS))?;
                let article = stmt.query_row(params![id], article_from_row).optional()?;
                Ok(article)
            })
            .await?;
        Ok(article)
    }

    pub async fn count(&self) -> Result<usize> {
        let count = self
            .conn
            .call(|conn| {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM articles", [], |row| row.get(0))?;
                Ok(count)
            })
            .await?;
        Ok(count as usize)
    }

    /// Insert or overwrite each article by id inside one transaction.
    ///
    /// Every record is stamped with the write time. Later entries in the
    /// batch win over earlier ones with the same id. A preview never replaces
    /// stored full content; only its metadata is applied. Returns the records
    /// as stored after the merge. If the transaction fails nothing is applied.
    pub async fn upsert_many(&self, articles: &[Article]) -> Result<Vec<Article>> {
        for article in articles {
            article.validate()?;
        }

        let now = Utc::now();
        let batch: Vec<Article> = articles.iter().cloned().map(|a| a.stamped(now)).collect();

        let stored = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare(
                        r#"INSERT INTO articles (id, title, author, body, body_html, preview, cover_image,
                                                 published_at, updated_at, cached_at, has_full_content)
                           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                           ON CONFLICT(id) DO UPDATE SET
                               title = excluded.title,
                               author = excluded.author,
                               body = CASE WHEN articles.has_full_content AND NOT excluded.has_full_content
                                           THEN articles.body ELSE excluded.body END,
                               body_html = CASE WHEN articles.has_full_content AND NOT excluded.has_full_content
                                                THEN articles.body_html ELSE excluded.body_html END,
                               preview = excluded.preview,
                               cover_image = excluded.cover_image,
                               published_at = excluded.published_at,
                               updated_at = excluded.updated_at,
                               cached_at = excluded.cached_at,
                               has_full_content = MAX(articles.has_full_content, excluded.has_full_content)"#,
                    )?;
                    for article in &batch {
                        stmt.execute(params![
                            article.id,
                            article.title,
                            article.author,
                            article.body,
                            article.body_html,
                            article.preview,
                            article.cover_image,
                            article.published_at.map(|dt| dt.to_rfc3339()),
                            article.updated_at.map(|dt| dt.to_rfc3339()),
                            article.cached_at.timestamp_millis(),
                            article.has_full_content,
                        ])?;
                    }
                }

                let mut stored = Vec::with_capacity(batch.len());
                {
                    let mut stmt = tx.prepare(&format!(
                        "SELECT {} FROM articles WHERE id = ?1",
                        ARTICLE_COLUMNS
                    ))?;
                    for article in &batch {
                        stored.push(stmt.query_row(params![article.id], article_from_row)?);
                    }
                }
                tx.commit()?;
                Ok(stored)
            })
            .await?;

        Ok(stored)
    }

    pub async fn clear(&self) -> Result<()> {
        self.conn
            .call(|conn| {
                conn.execute("DELETE FROM articles", [])?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Scan the title index and keep records whose title contains `fragment`.
    pub async fn find_by_title_contains(
        &self,
        fragment: &str,
        case_insensitive: bool,
    ) -> Result<Vec<Article>> {
        let needle = if case_insensitive {
            fragment.to_lowercase()
        } else {
            fragment.to_string()
        };

        let articles = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM articles ORDER BY title COLLATE NOCASE, id",
                    ARTICLE_COLUMNS
                ))?;
                let articles = stmt
                    .query_map([], article_from_row)?
                    .filter(|row| match row {
                        Ok(article) if case_insensitive => {
                            article.title.to_lowercase().contains(&needle)
                        }
                        Ok(article) => article.title.contains(&needle),
                        Err(_) => true,
                    })
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }

    pub async fn find_by_author(&self, author: &str) -> Result<Vec<Article>> {
        let author = author.to_string();
        let articles = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM articles WHERE author = ?1 ORDER BY id",
                    ARTICLE_COLUMNS
                ))?;
                let articles = stmt
                    .query_map(params![author], article_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Rows written before timestamps were normalized
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn article_from_row(row: &Row) -> rusqlite::Result<Article> {
    let timestamp = |idx: usize| -> rusqlite::Result<Option<DateTime<Utc>>> {
        Ok(row
            .get::<_, Option<String>>(idx)?
            .and_then(|s| parse_datetime(&s)))
    };

    Ok(Article {
        id: row.get(0)?,
        title: row.get(1)?,
        author: row.get(2)?,
        body: row.get(3)?,
        body_html: row.get(4)?,
        preview: row.get(5)?,
        cover_image: row.get(6)?,
        published_at: timestamp(7)?,
        updated_at: timestamp(8)?,
        cached_at: DateTime::from_timestamp_millis(row.get(9)?).unwrap_or_default(),
        has_full_content: row.get(10)?,
    })
}
