use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use serde_json::Value;
use url::Url;

use crate::error::{AppError, NetworkError, Result};
use crate::models::{Article, ArticleId};

use super::wire::{parse_page, WireArticle};

/// Anything that can produce canonical articles from a remote origin.
///
/// Implementations do not retry; retry and fallback policy live in the cache
/// layer.
pub trait ArticleSource: Send + Sync {
    /// One page of preview records.
    fn fetch_list(&self, page: u32) -> impl Future<Output = Result<Vec<Article>>> + Send;

    /// A single record with full content.
    fn fetch_detail(&self, id: ArticleId) -> impl Future<Output = Result<Article>> + Send;
}

pub struct RemoteFetcher {
    client: Client,
    base_url: Url,
    page_size: u32,
}

impl RemoteFetcher {
    pub fn new(base_url: &str, page_size: u32, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AppError::Config(format!("invalid base url {:?}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::Config(format!("base url {} cannot hold a path", base_url)));
        }

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .user_agent(concat!("offline-reader/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url,
            page_size: page_size.max(1),
        })
    }

    fn list_url(&self, page: u32) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("page", &page.max(1).to_string())
            .append_pair("per_page", &self.page_size.to_string());
        url
    }

    fn detail_url(&self, id: ArticleId) -> Url {
        let mut url = self.base_url.clone();
        // Checked in `new`
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(&id.to_string());
        }
        url
    }

    async fn get_json(&self, url: Url) -> Result<Value> {
        tracing::debug!("GET {}", url);
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NetworkError::from_status(status, &body).into());
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| AppError::Validation(format!("response is not valid JSON: {}", e)))
    }
}

impl ArticleSource for RemoteFetcher {
    async fn fetch_list(&self, page: u32) -> Result<Vec<Article>> {
        let items = match self.get_json(self.list_url(page)).await? {
            Value::Array(items) => items,
            // Some feeds wrap the list in an envelope
            Value::Object(mut envelope) => match ["articles", "data", "items"]
                .iter()
                .find_map(|key| envelope.remove(*key))
            {
                Some(Value::Array(items)) => items,
                _ => {
                    return Err(AppError::Validation(
                        "list response has no article array".to_string(),
                    ))
                }
            },
            _ => {
                return Err(AppError::Validation(
                    "list response is not an array".to_string(),
                ))
            }
        };

        let articles = parse_page(items, Utc::now())?;
        tracing::debug!("Fetched {} articles from page {}", articles.len(), page);
        Ok(articles)
    }

    async fn fetch_detail(&self, id: ArticleId) -> Result<Article> {
        let value = self.get_json(self.detail_url(id)).await?;
        let wire: WireArticle = serde_json::from_value(value)
            .map_err(|e| AppError::Validation(format!("malformed article {}: {}", id, e)))?;

        let article = wire.into_full(Utc::now())?;
        if article.id != id {
            return Err(AppError::Validation(format!(
                "requested article {} but received {}",
                id, article.id
            )));
        }
        Ok(article)
    }
}
