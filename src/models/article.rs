use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

pub type ArticleId = i64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: ArticleId,
    pub title: String,
    pub author: String,
    pub body: Option<String>,
    pub body_html: Option<String>,
    pub preview: Option<String>,
    pub cover_image: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    /// Modification time reported by the origin. Informational only.
    pub updated_at: Option<DateTime<Utc>>,
    /// When this record was last written to the local store.
    pub cached_at: DateTime<Utc>,
    pub has_full_content: bool,
}

impl Article {
    /// Checks the full-content invariant: a record claiming full content must
    /// carry a non-empty body.
    pub fn validate(&self) -> Result<()> {
        if self.has_full_content && !self.has_body() {
            return Err(AppError::Validation(format!(
                "article {} is marked as full content but has no body",
                self.id
            )));
        }
        Ok(())
    }

    pub fn has_body(&self) -> bool {
        let non_empty = |s: &Option<String>| s.as_deref().is_some_and(|s| !s.trim().is_empty());
        non_empty(&self.body_html) || non_empty(&self.body)
    }

    /// Best text to show in a list view.
    pub fn summary_text(&self) -> &str {
        self.preview
            .as_deref()
            .or(self.body.as_deref())
            .unwrap_or("")
    }

    pub fn stamped(mut self, now: DateTime<Utc>) -> Self {
        self.cached_at = now;
        self
    }
}

#[cfg(test)]
pub(crate) fn sample(id: ArticleId, title: &str) -> Article {
    Article {
        id,
        title: title.to_string(),
        author: "Ada".to_string(),
        body: None,
        body_html: None,
        preview: Some(format!("Preview of {}", title)),
        cover_image: None,
        published_at: None,
        updated_at: None,
        cached_at: Utc::now(),
        has_full_content: false,
    }
}
