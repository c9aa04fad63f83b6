/// Latest schema version understood by this build.
pub const SCHEMA_VERSION: u32 = 2;

/// Additive migrations, applied in order to bring a database from the version
/// recorded in `PRAGMA user_version` up to `SCHEMA_VERSION`. Steps only add
/// tables, columns, and indexes.
pub const MIGRATIONS: &[(u32, &str)] = &[(1, V1_ARTICLES), (2, V2_FULL_CONTENT_AND_SEARCH)];

const V1_ARTICLES: &str = r#"
CREATE TABLE IF NOT EXISTS articles (
    id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    body TEXT,
    author TEXT NOT NULL,
    updated_at TEXT,
    cached_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_articles_updated_at ON articles(updated_at);
CREATE INDEX IF NOT EXISTS idx_articles_cached_at ON articles(cached_at);
"#;

const V2_FULL_CONTENT_AND_SEARCH: &str = r#"
ALTER TABLE articles ADD COLUMN body_html TEXT;
ALTER TABLE articles ADD COLUMN preview TEXT;
ALTER TABLE articles ADD COLUMN cover_image TEXT;
ALTER TABLE articles ADD COLUMN published_at TEXT;
ALTER TABLE articles ADD COLUMN has_full_content INTEGER NOT NULL DEFAULT 0;

CREATE INDEX IF NOT EXISTS idx_articles_title ON articles(title COLLATE NOCASE);
CREATE INDEX IF NOT EXISTS idx_articles_author ON articles(author);
"#;
