//! Serde types matching the remote feed payloads.
//!
//! Upstream feeds disagree on field names (dev.to style `description` /
//! `user.name` / `body_html` versus JSONPlaceholder style `body` / `userId`),
//! so every field is optional here and `into_preview` / `into_full` decide what
//! a usable record needs.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{Article, ArticleId};

/// Characters of plain body kept when a feed has no summary field.
const PREVIEW_CHARS: usize = 200;

#[derive(Debug, Deserialize)]
pub struct WireUser {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WireArticle {
    /// Numeric ids arrive as numbers or numeric strings depending on the feed
    pub id: Option<Value>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub body: Option<String>,
    pub body_markdown: Option<String>,
    pub body_html: Option<String>,
    pub user: Option<WireUser>,
    #[serde(rename = "userId")]
    pub user_id: Option<i64>,
    pub author: Option<String>,
    pub cover_image: Option<String>,
    pub published_at: Option<String>,
    pub edited_at: Option<String>,
    pub updated_at: Option<String>,
}

impl WireArticle {
    fn id(&self) -> Option<ArticleId> {
        match self.id.as_ref()? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn author(&self) -> String {
        self.user
            .as_ref()
            .and_then(|u| non_empty(u.name.as_deref()))
            .or_else(|| non_empty(self.author.as_deref()))
            .map(String::from)
            .or_else(|| self.user_id.map(|id| format!("User {}", id)))
            .unwrap_or_else(|| "Unknown".to_string())
    }

    fn plain_body(&self) -> Option<String> {
        non_empty(self.body.as_deref())
            .or_else(|| non_empty(self.body_markdown.as_deref()))
            .map(String::from)
    }

    /// Fields shared by list and detail records. Fails when `id` or `title`
    /// is missing.
    fn into_article(self, now: DateTime<Utc>) -> Result<Article> {
        let id = self
            .id()
            .ok_or_else(|| AppError::Validation("feed item has no usable id".to_string()))?;
        let title = non_empty(self.title.as_deref())
            .map(String::from)
            .ok_or_else(|| AppError::Validation(format!("feed item {} has no title", id)))?;

        let preview = non_empty(self.description.as_deref())
            .map(String::from)
            .or_else(|| self.plain_body().map(|body| truncate_chars(&body, PREVIEW_CHARS)));

        Ok(Article {
            id,
            title,
            author: self.author(),
            body: self.plain_body(),
            body_html: None,
            preview,
            cover_image: non_empty(self.cover_image.as_deref()).map(String::from),
            published_at: self.published_at.as_deref().and_then(parse_timestamp),
            updated_at: self
                .edited_at
                .as_deref()
                .or(self.updated_at.as_deref())
                .and_then(parse_timestamp),
            cached_at: now,
            has_full_content: false,
        })
    }

    pub fn into_preview(self, now: DateTime<Utc>) -> Result<Article> {
        self.into_article(now)
    }

    pub fn into_full(self, now: DateTime<Utc>) -> Result<Article> {
        let body_html = non_empty(self.body_html.as_deref()).map(String::from);
        let mut article = self.into_article(now)?;

        if article.body.is_none() {
            article.body = body_html
                .as_deref()
                .and_then(|html| html2text::from_read(html.as_bytes(), 80).ok())
                .filter(|text| !text.trim().is_empty());
        }
        article.body_html = body_html;
        article.has_full_content = true;

        if !article.has_body() {
            return Err(AppError::Validation(format!(
                "detail for article {} has no body",
                article.id
            )));
        }
        Ok(article)
    }
}

/// Normalize one list page. Malformed items are dropped; a page where every
/// item is malformed is an error.
pub fn parse_page(items: Vec<Value>, now: DateTime<Utc>) -> Result<Vec<Article>> {
    let total = items.len();
    let mut last_error = None;

    let articles: Vec<Article> = items
        .into_iter()
        .filter_map(|item| {
            let parsed = serde_json::from_value::<WireArticle>(item)
                .map_err(|e| AppError::Validation(format!("malformed feed item: {}", e)))
                .and_then(|wire| wire.into_preview(now));
            match parsed {
                Ok(article) => Some(article),
                Err(e) => {
                    tracing::debug!("Skipping feed item: {}", e);
                    last_error = Some(e);
                    None
                }
            }
        })
        .collect();

    if total > 0 && articles.is_empty() {
        return Err(last_error
            .unwrap_or_else(|| AppError::Validation("every feed item was malformed".to_string())));
    }
    Ok(articles)
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.trim().is_empty())
}

fn truncate_chars(s: &str, max: usize) -> String {
    let trimmed = s.trim();
    match trimmed.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", trimmed[..idx].trim_end()),
        None => trimmed.to_string(),
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
