//! Offline-first read policy over the local store and a remote source.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};

use crate::db::SharedStore;
use crate::error::{AppError, Result};
use crate::feed::ArticleSource;
use crate::models::{Article, ArticleId};

use super::freshness::{is_stale_at, last_updated_time};
use super::result::{CacheResult, CacheSource};
use super::search::SearchGuard;

/// Detail fetches in flight during a bulk prefetch.
const PREFETCH_CONCURRENCY: usize = 4;

/// Decides on every read whether to trust the local store or go to the
/// origin, and merges fetched records back into the store.
///
/// Read paths never fail because of the store: a store that cannot be opened
/// or read is treated as empty. Write paths propagate storage errors.
pub struct CachePolicy<S: ArticleSource> {
    store: Arc<SharedStore>,
    source: S,
    /// How long before cached data is considered stale
    ttl: Duration,
    searches: SearchGuard,
}

impl<S: ArticleSource> CachePolicy<S> {
    pub fn new(store: Arc<SharedStore>, source: S, ttl: Duration) -> Self {
        Self {
            store,
            source,
            ttl,
            searches: SearchGuard::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn store(&self) -> &Arc<SharedStore> {
        &self.store
    }

    pub fn is_stale(&self, articles: &[Article]) -> bool {
        is_stale_at(articles, self.ttl, Utc::now())
    }

    pub fn last_updated_time(&self, articles: &[Article]) -> Option<DateTime<Utc>> {
        last_updated_time(articles)
    }

    /// Everything in the store, or nothing if the store is unavailable.
    pub async fn cached_articles(&self) -> Vec<Article> {
        let repository = match self.store.get().await {
            Ok(repository) => repository,
            Err(e) => {
                tracing::warn!("Article store unavailable, treating as empty: {}", e);
                return Vec::new();
            }
        };
        repository.read_all().await.unwrap_or_else(|e| {
            tracing::warn!("Failed to read article store, treating as empty: {}", e);
            Vec::new()
        })
    }

    async fn write(&self, articles: &[Article]) -> Result<Vec<Article>> {
        self.store.get().await?.upsert_many(articles).await
    }

    /// Offline-first read.
    ///
    /// Offline: the store contents, stale or not. Online: fetch the first
    /// page, write it to the store, and return it. A failed fetch falls back
    /// to the store contents and is only logged.
    pub async fn load_offline_first(&self, online: bool) -> Result<CacheResult<Vec<Article>>> {
        let cached = self.cached_articles().await;
        self.load_over(cached, online).await
    }

    async fn load_over(
        &self,
        cached: Vec<Article>,
        online: bool,
    ) -> Result<CacheResult<Vec<Article>>> {
        if !online {
            tracing::debug!("Offline, serving {} cached articles", cached.len());
            return Ok(CacheResult::new(cached, CacheSource::Offline));
        }

        match self.source.fetch_list(1).await {
            Ok(fetched) => {
                let written = self.write(&fetched).await?;
                tracing::info!("Synced {} articles from origin", written.len());
                Ok(CacheResult::new(written, CacheSource::Network))
            }
            Err(e) if e.is_fetch_failure() => {
                tracing::warn!(
                    "Refresh failed, serving {} cached articles: {}",
                    cached.len(),
                    e
                );
                Ok(CacheResult::new(cached, CacheSource::Fallback))
            }
            Err(e) => Err(e),
        }
    }

    /// Serve a fresh, non-empty cache without contacting the origin;
    /// otherwise behave like `load_offline_first`.
    pub async fn refresh_if_stale(&self, online: bool) -> Result<CacheResult<Vec<Article>>> {
        let cached = self.cached_articles().await;
        if !self.is_stale(&cached) {
            return Ok(CacheResult::new(cached, CacheSource::CacheFresh));
        }
        self.load_over(cached, online).await
    }

    /// User-initiated refresh. Failures are returned to the caller.
    pub async fn refresh_now(&self) -> Result<Vec<Article>> {
        let fetched = self.source.fetch_list(1).await?;
        let written = self.write(&fetched).await?;
        tracing::info!("Refreshed {} articles", written.len());
        Ok(written)
    }

    /// Case-insensitive title search served from the store. A blank query
    /// means no filter.
    pub async fn search_by_title(&self, query: &str) -> Vec<Article> {
        let query = query.trim();
        if query.is_empty() {
            return self.cached_articles().await;
        }

        let result = match self.store.get().await {
            Ok(repository) => repository.find_by_title_contains(query, true).await,
            Err(e) => Err(e),
        };
        result.unwrap_or_else(|e| {
            tracing::warn!("Search for {:?} failed, returning no results: {}", query, e);
            Vec::new()
        })
    }

    /// Entry point for search input: a blank query goes back to the
    /// offline-first listing, anything else hits the title index.
    pub async fn search(&self, query: &str, online: bool) -> Result<Vec<Article>> {
        if query.trim().is_empty() {
            return Ok(self.load_offline_first(online).await?.data);
        }
        Ok(self.search_by_title(query).await)
    }

    /// Like `search`, but resolves to `None` when another search was issued
    /// after this one, so late results never replace newer ones.
    ///
    /// The ticket is taken when this is called, not when the future is first
    /// polled.
    pub fn search_latest<'a>(
        &'a self,
        query: &'a str,
        online: bool,
    ) -> impl Future<Output = Result<Option<Vec<Article>>>> + 'a {
        let ticket = self.searches.issue();
        async move {
            let results = self.search(query, online).await?;
            if self.searches.is_latest(ticket) {
                Ok(Some(results))
            } else {
                tracing::debug!("Discarding results for superseded search {:?}", query);
                Ok(None)
            }
        }
    }

    pub async fn articles_by_author(&self, author: &str) -> Vec<Article> {
        let result = match self.store.get().await {
            Ok(repository) => repository.find_by_author(author).await,
            Err(e) => Err(e),
        };
        result.unwrap_or_else(|e| {
            tracing::warn!("Author lookup for {:?} failed: {}", author, e);
            Vec::new()
        })
    }

    async fn cached_article(&self, id: ArticleId) -> Option<Article> {
        let result = match self.store.get().await {
            Ok(repository) => repository.get(id).await,
            Err(e) => Err(e),
        };
        result.unwrap_or_else(|e| {
            tracing::warn!("Failed to read article {} from store: {}", id, e);
            None
        })
    }

    /// Return the full-content version of an article, fetching and storing
    /// it when only a preview is cached.
    ///
    /// Offline, whatever is cached is returned without contacting the origin.
    /// If the fetch fails the cached preview is returned unchanged; the error
    /// only surfaces when nothing is cached for `id`.
    pub async fn promote(&self, id: ArticleId, online: bool) -> Result<Article> {
        let existing = self.cached_article(id).await;
        if let Some(article) = existing.as_ref().filter(|a| a.has_full_content || !online) {
            return Ok(article.clone());
        }
        if !online {
            return Err(AppError::NotCached(id));
        }

        match self.source.fetch_detail(id).await {
            Ok(full) => {
                let written = self.write(std::slice::from_ref(&full)).await?;
                Ok(written.into_iter().next().unwrap_or(full))
            }
            Err(e) if e.is_fetch_failure() => match existing {
                Some(preview) => {
                    tracing::warn!("Could not load full content for {}: {}", id, e);
                    Ok(preview)
                }
                None => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    /// Promote up to `limit` cached previews so they can be read offline.
    /// Returns how many now have full content.
    pub async fn prefetch_full_content(&self, limit: usize) -> usize {
        let pending: Vec<ArticleId> = self
            .cached_articles()
            .await
            .into_iter()
            .filter(|a| !a.has_full_content)
            .map(|a| a.id)
            .take(limit)
            .collect();

        stream::iter(pending)
            .map(|id| async move {
                match self.promote(id, true).await {
                    Ok(article) => article.has_full_content,
                    Err(e) => {
                        tracing::debug!("Prefetch of {} failed: {}", id, e);
                        false
                    }
                }
            })
            .buffer_unordered(PREFETCH_CONCURRENCY)
            .filter(|promoted| futures::future::ready(*promoted))
            .count()
            .await
    }

    /// Remove every cached article.
    pub async fn clear_cache(&self) -> Result<()> {
        self.store.get().await?.clear().await?;
        tracing::info!("Cleared article cache");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetworkError;
    use crate::models::sample;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Source with scripted responses that counts calls.
    #[derive(Default)]
    struct ScriptedSource {
        /// `None` makes list fetches time out
        list: Mutex<Option<Vec<Article>>>,
        details: Mutex<HashMap<ArticleId, Article>>,
        list_calls: AtomicUsize,
        detail_calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn listing(articles: Vec<Article>) -> Self {
            Self {
                list: Mutex::new(Some(articles)),
                ..Self::default()
            }
        }

        fn unreachable() -> Self {
            Self::default()
        }

        fn with_detail(self, article: Article) -> Self {
            self.details.lock().unwrap().insert(article.id, article);
            self
        }

        fn list_calls(&self) -> usize {
            self.list_calls.load(Ordering::SeqCst)
        }

        fn detail_calls(&self) -> usize {
            self.detail_calls.load(Ordering::SeqCst)
        }
    }

    impl ArticleSource for ScriptedSource {
        async fn fetch_list(&self, _page: u32) -> Result<Vec<Article>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            let list = self.list.lock().unwrap().clone();
            list.ok_or(AppError::Network(NetworkError::Timeout))
        }

        async fn fetch_detail(&self, id: ArticleId) -> Result<Article> {
            self.detail_calls.fetch_add(1, Ordering::SeqCst);
            let detail = self.details.lock().unwrap().get(&id).cloned();
            detail.ok_or_else(|| {
                AppError::Network(NetworkError::from_status(
                    reqwest::StatusCode::NOT_FOUND,
                    "not found",
                ))
            })
        }
    }

    fn full(id: ArticleId, title: &str) -> Article {
        let mut article = sample(id, title);
        article.body_html = Some(format!("<p>{}</p>", title));
        article.body = Some(title.to_string());
        article.has_full_content = true;
        article
    }

    fn policy(source: ScriptedSource) -> CachePolicy<ScriptedSource> {
        CachePolicy::new(Arc::new(SharedStore::in_memory()), source, Duration::hours(1))
    }

    async fn seed(policy: &CachePolicy<ScriptedSource>, articles: &[Article]) {
        policy
            .store()
            .get()
            .await
            .unwrap()
            .upsert_many(articles)
            .await
            .unwrap();
    }

    fn ids(articles: &[Article]) -> Vec<ArticleId> {
        let mut ids: Vec<_> = articles.iter().map(|a| a.id).collect();
        ids.sort();
        ids
    }

    #[tokio::test]
    async fn offline_serves_store_without_fetching() {
        let policy = policy(ScriptedSource::listing(vec![sample(99, "Remote")]));
        seed(&policy, &[sample(1, "Local one"), sample(2, "Local two")]).await;

        let result = policy.load_offline_first(false).await.unwrap();
        assert_eq!(result.source, CacheSource::Offline);
        assert_eq!(ids(&result.data), vec![1, 2]);
        assert_eq!(policy.source().list_calls(), 0);
    }

    #[tokio::test]
    async fn offline_with_empty_store_returns_nothing() {
        let policy = policy(ScriptedSource::unreachable());
        let result = policy.load_offline_first(false).await.unwrap();
        assert!(result.data.is_empty());
        assert_eq!(result.last_updated(), None);
    }

    #[tokio::test]
    async fn online_success_returns_fetched_and_merges_by_id() {
        let policy = policy(ScriptedSource::listing(vec![
            sample(1, "Updated one"),
            sample(3, "Brand new"),
        ]));
        seed(&policy, &[sample(1, "Old one"), sample(2, "Untouched")]).await;

        let result = policy.load_offline_first(true).await.unwrap();
        assert_eq!(result.source, CacheSource::Network);
        assert_eq!(ids(&result.data), vec![1, 3]);

        let stored = policy.cached_articles().await;
        assert_eq!(ids(&stored), vec![1, 2, 3]);
        let one = stored.iter().find(|a| a.id == 1).unwrap();
        assert_eq!(one.title, "Updated one");
    }

    #[tokio::test]
    async fn online_failure_falls_back_to_store() {
        let policy = policy(ScriptedSource::unreachable());
        seed(&policy, &[sample(1, "Cached")]).await;
        let before = policy.cached_articles().await;

        let result = policy.load_offline_first(true).await.unwrap();
        assert_eq!(result.source, CacheSource::Fallback);
        assert_eq!(result.data, before);
        assert_eq!(policy.source().list_calls(), 1);
        // Failed refresh leaves cached_at alone
        assert_eq!(policy.cached_articles().await, before);
    }

    #[tokio::test]
    async fn unreadable_store_degrades_to_empty_but_write_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"file").unwrap();
        let store = Arc::new(SharedStore::new(blocker.join("articles.db")));

        let policy = CachePolicy::new(
            store,
            ScriptedSource::listing(vec![sample(1, "Remote")]),
            Duration::hours(1),
        );

        let offline = policy.load_offline_first(false).await.unwrap();
        assert!(offline.data.is_empty());
        assert!(policy.search_by_title("remote").await.is_empty());

        let online = policy.load_offline_first(true).await;
        assert!(matches!(online, Err(AppError::Storage(_))));
    }

    #[tokio::test]
    async fn refresh_now_propagates_failures() {
        let policy = policy(ScriptedSource::unreachable());
        seed(&policy, &[sample(1, "Cached")]).await;

        let result = policy.refresh_now().await;
        assert!(matches!(result, Err(AppError::Network(NetworkError::Timeout))));
    }

    #[tokio::test]
    async fn refresh_now_writes_fetched_records() {
        let policy = policy(ScriptedSource::listing(vec![sample(4, "Fresh")]));
        let refreshed = policy.refresh_now().await.unwrap();
        assert_eq!(ids(&refreshed), vec![4]);
        assert_eq!(ids(&policy.cached_articles().await), vec![4]);
    }

    #[tokio::test]
    async fn fresh_cache_skips_the_origin() {
        let policy = policy(ScriptedSource::listing(vec![sample(9, "Remote")]));
        seed(&policy, &[sample(1, "Fresh enough")]).await;

        let result = policy.refresh_if_stale(true).await.unwrap();
        assert_eq!(result.source, CacheSource::CacheFresh);
        assert_eq!(ids(&result.data), vec![1]);
        assert_eq!(policy.source().list_calls(), 0);
    }

    #[tokio::test]
    async fn stale_or_empty_cache_goes_to_origin() {
        let empty = policy(ScriptedSource::listing(vec![sample(9, "Remote")]));
        let result = empty.refresh_if_stale(true).await.unwrap();
        assert_eq!(result.source, CacheSource::Network);

        let stale = CachePolicy::new(
            Arc::new(SharedStore::in_memory()),
            ScriptedSource::listing(vec![sample(9, "Remote")]),
            Duration::zero(),
        );
        seed(&stale, &[sample(1, "Old")]).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let result = stale.refresh_if_stale(true).await.unwrap();
        assert_eq!(result.source, CacheSource::Network);
        assert_eq!(stale.source().list_calls(), 1);
    }

    #[tokio::test]
    async fn search_round_trip() {
        let policy = policy(ScriptedSource::unreachable());
        seed(&policy, &[sample(1, "Offline First"), sample(2, "Async Rust")]).await;

        let found = policy.search_by_title("offline").await;
        assert_eq!(ids(&found), vec![1]);
        assert!(policy.search_by_title("zzz").await.is_empty());
        assert_eq!(ids(&policy.search_by_title("  ").await), vec![1, 2]);
        assert_eq!(policy.source().list_calls(), 0);
    }

    #[tokio::test]
    async fn blank_search_routes_to_offline_first_load() {
        let policy = policy(ScriptedSource::listing(vec![sample(3, "Remote")]));
        seed(&policy, &[sample(1, "Offline First")]).await;

        let offline = policy.search("", false).await.unwrap();
        assert_eq!(ids(&offline), vec![1]);
        assert_eq!(policy.source().list_calls(), 0);

        let online = policy.search("", true).await.unwrap();
        assert_eq!(ids(&online), vec![3]);
        assert_eq!(policy.source().list_calls(), 1);

        policy.search("offline", true).await.unwrap();
        assert_eq!(policy.source().list_calls(), 1);
    }

    #[tokio::test]
    async fn superseded_search_is_discarded() {
        let policy = policy(ScriptedSource::unreachable());
        seed(&policy, &[sample(1, "Offline First")]).await;

        let older = policy.search_latest("off", false);
        let newer = policy.search_latest("offline", false);

        assert_eq!(older.await.unwrap(), None);
        let latest = newer.await.unwrap().unwrap();
        assert_eq!(ids(&latest), vec![1]);
    }

    #[tokio::test]
    async fn author_lookup_uses_store() {
        let policy = policy(ScriptedSource::unreachable());
        let mut grace = sample(2, "Compilers");
        grace.author = "Grace".to_string();
        seed(&policy, &[sample(1, "Engines"), grace]).await;

        assert_eq!(ids(&policy.articles_by_author("Grace").await), vec![2]);
    }

    #[tokio::test]
    async fn promotion_replaces_preview_in_place() {
        let policy = policy(ScriptedSource::unreachable().with_detail(full(5, "Deep dive")));
        seed(&policy, &[sample(5, "Deep dive")]).await;

        let promoted = policy.promote(5, true).await.unwrap();
        assert!(promoted.has_full_content);

        let stored = policy.cached_articles().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, 5);
        assert!(stored[0].has_full_content);
        assert_eq!(stored[0].body_html.as_deref(), Some("<p>Deep dive</p>"));
    }

    #[tokio::test]
    async fn promotion_failure_returns_preview() {
        let policy = policy(ScriptedSource::unreachable());
        seed(&policy, &[sample(5, "Preview only")]).await;

        let article = policy.promote(5, true).await.unwrap();
        assert_eq!(article.id, 5);
        assert!(!article.has_full_content);
    }

    #[tokio::test]
    async fn promotion_without_preview_propagates() {
        let policy = policy(ScriptedSource::unreachable());
        let result = policy.promote(42, true).await;
        assert!(matches!(result, Err(AppError::Network(NetworkError::Status { .. }))));
    }

    #[tokio::test]
    async fn offline_promotion_serves_cache_without_fetching() {
        let policy = policy(ScriptedSource::unreachable().with_detail(full(5, "Deep dive")));
        seed(&policy, &[sample(5, "Deep dive")]).await;

        let article = policy.promote(5, false).await.unwrap();
        assert!(!article.has_full_content);
        assert!(matches!(
            policy.promote(6, false).await,
            Err(AppError::NotCached(6))
        ));
        assert_eq!(policy.source().detail_calls(), 0);
    }

    #[tokio::test]
    async fn list_refresh_keeps_downloaded_content() {
        let source = ScriptedSource::listing(vec![sample(5, "Deep dive"), sample(6, "Other")])
            .with_detail(full(5, "Deep dive"));
        let policy = policy(source);
        seed(&policy, &[sample(5, "Deep dive")]).await;
        assert_eq!(policy.prefetch_full_content(10).await, 1);

        let result = policy.load_offline_first(true).await.unwrap();
        assert_eq!(result.source, CacheSource::Network);
        let five = result.data.iter().find(|a| a.id == 5).unwrap();
        assert!(five.has_full_content);

        let stored = policy.cached_articles().await;
        let five = stored.iter().find(|a| a.id == 5).unwrap();
        assert!(five.has_full_content);
        assert_eq!(five.body_html.as_deref(), Some("<p>Deep dive</p>"));
        assert!(!stored.iter().find(|a| a.id == 6).unwrap().has_full_content);
    }

    #[tokio::test]
    async fn stale_check_reuses_cached_read_for_fallback() {
        let policy = CachePolicy::new(
            Arc::new(SharedStore::in_memory()),
            ScriptedSource::unreachable(),
            Duration::zero(),
        );
        seed(&policy, &[sample(1, "Old")]).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let offline = policy.refresh_if_stale(false).await.unwrap();
        assert_eq!(offline.source, CacheSource::Offline);
        assert_eq!(ids(&offline.data), vec![1]);

        let fallback = policy.refresh_if_stale(true).await.unwrap();
        assert_eq!(fallback.source, CacheSource::Fallback);
        assert_eq!(ids(&fallback.data), vec![1]);
    }

    #[tokio::test]
    async fn full_record_is_not_refetched() {
        let policy = policy(ScriptedSource::unreachable().with_detail(full(5, "Newer")));
        seed(&policy, &[full(5, "Already full")]).await;

        let article = policy.promote(5, true).await.unwrap();
        assert_eq!(article.title, "Already full");
        assert_eq!(policy.source().detail_calls(), 0);
    }

    #[tokio::test]
    async fn prefetch_promotes_available_previews() {
        let source = ScriptedSource::unreachable()
            .with_detail(full(1, "One"))
            .with_detail(full(2, "Two"));
        let policy = policy(source);
        seed(
            &policy,
            &[sample(1, "One"), sample(2, "Two"), sample(3, "Three"), full(4, "Four")],
        )
        .await;

        assert_eq!(policy.prefetch_full_content(10).await, 2);
        assert_eq!(policy.source().detail_calls(), 3);

        let full_ids: Vec<_> = policy
            .cached_articles()
            .await
            .into_iter()
            .filter(|a| a.has_full_content)
            .map(|a| a.id)
            .collect();
        assert_eq!(full_ids, vec![1, 2, 4]);
    }

    #[tokio::test]
    async fn prefetch_respects_limit() {
        let source = ScriptedSource::unreachable()
            .with_detail(full(1, "One"))
            .with_detail(full(2, "Two"));
        let policy = policy(source);
        seed(&policy, &[sample(1, "One"), sample(2, "Two")]).await;

        assert_eq!(policy.prefetch_full_content(1).await, 1);
        assert_eq!(policy.source().detail_calls(), 1);
    }

    #[tokio::test]
    async fn clear_cache_empties_store() {
        let policy = policy(ScriptedSource::unreachable());
        seed(&policy, &[sample(1, "Gone")]).await;
        policy.clear_cache().await.unwrap();
        assert!(policy.cached_articles().await.is_empty());
    }

    #[test]
    fn staleness_uses_configured_ttl() {
        let policy = policy(ScriptedSource::unreachable());
        assert_eq!(policy.ttl(), Duration::hours(1));
        assert!(policy.is_stale(&[]));
        assert!(!policy.is_stale(&[sample(1, "Now")]));
        let old = sample(2, "Old").stamped(Utc::now() - Duration::hours(2));
        assert!(policy.is_stale(&[old]));
    }
}
