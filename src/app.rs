use std::sync::Arc;

use chrono::Utc;

use crate::cache::{age_display, CachePolicy, CacheResult};
use crate::config::Config;
use crate::connectivity::{ConnectivityMonitor, ConnectivitySignal, HttpProbe};
use crate::db::SharedStore;
use crate::error::Result;
use crate::feed::RemoteFetcher;
use crate::models::{Article, ArticleId};

/// Upper bound on a single prefetch run.
pub const DEFAULT_PREFETCH_LIMIT: usize = 50;

pub struct App {
    policy: CachePolicy<RemoteFetcher>,
    monitor: Arc<ConnectivityMonitor<HttpProbe>>,
    signal: ConnectivitySignal,
    force_offline: bool,
}

impl App {
    pub fn new(config: &Config, force_offline: bool) -> Result<Self> {
        let store = Arc::new(SharedStore::new(&config.db_path));
        let fetcher = RemoteFetcher::new(&config.base_url, config.page_size, config.request_timeout())?;
        let policy = CachePolicy::new(store, fetcher, config.cache_ttl());

        let probe = HttpProbe::new(&config.probe_url, config.request_timeout())?;
        let (monitor, signal) = ConnectivityMonitor::new(probe, config.probe_interval());

        Ok(Self {
            policy,
            monitor,
            signal,
            force_offline,
        })
    }

    /// Run one probe check so commands see a resolved status.
    async fn online(&self) -> bool {
        if self.force_offline {
            return false;
        }
        self.monitor.check_now().await
    }

    pub async fn list(&self) -> Result<()> {
        let online = self.online().await;
        let result = self.policy.refresh_if_stale(online).await?;
        self.print_result(&result);
        Ok(())
    }

    pub async fn refresh(&self) -> Result<()> {
        if self.force_offline {
            println!("Offline, nothing refreshed");
            return Ok(());
        }
        let articles = self.policy.refresh_now().await?;
        println!("Refreshed {} articles", articles.len());
        print_articles(&articles);
        Ok(())
    }

    pub async fn search(&self, query: &str) -> Result<()> {
        let online = self.online().await;
        let articles = self.policy.search(query, online).await?;
        if articles.is_empty() {
            println!("No cached articles match {:?}", query);
        }
        print_articles(&articles);
        Ok(())
    }

    pub async fn author(&self, name: &str) -> Result<()> {
        let articles = self.policy.articles_by_author(name).await;
        if articles.is_empty() {
            println!("No cached articles by {}", name);
        }
        print_articles(&articles);
        Ok(())
    }

    pub async fn show(&self, id: ArticleId) -> Result<()> {
        let online = self.online().await;
        let article = self.policy.promote(id, online).await?;
        println!("{}", format_article_detail(&article));
        Ok(())
    }

    pub async fn prefetch(&self, limit: usize) -> Result<()> {
        if !self.online().await {
            println!("Offline, nothing prefetched");
            return Ok(());
        }
        let promoted = self.policy.prefetch_full_content(limit).await;
        println!("Downloaded full content for {} articles", promoted);
        Ok(())
    }

    pub async fn status(&self) -> Result<()> {
        let online = self.online().await;
        let cached = self.policy.cached_articles().await;
        let full = cached.iter().filter(|a| a.has_full_content).count();

        println!("Connectivity: {}", if online { "online" } else { "offline" });
        println!("Cached articles: {} ({} with full content)", cached.len(), full);
        match self.policy.last_updated_time(&cached) {
            Some(at) => println!("Last updated: {}", age_display(at, Utc::now())),
            None => println!("Last updated: never"),
        }
        println!(
            "Cache is {} (TTL {} minutes)",
            if self.policy.is_stale(&cached) { "stale" } else { "fresh" },
            self.policy.ttl().num_minutes()
        );
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        self.policy.clear_cache().await?;
        println!("Cache cleared");
        Ok(())
    }

    /// Reload whenever connectivity changes, until Ctrl-C.
    pub async fn watch(&self) -> Result<()> {
        let mut signal = self.signal.clone();
        let poller = Arc::clone(&self.monitor).spawn();

        let online = self.online().await;
        self.print_result(&self.policy.load_offline_first(online).await?);

        loop {
            tokio::select! {
                changed = signal.changed() => {
                    let Some(online) = changed else { break };
                    let online = online && !self.force_offline;
                    println!("-- now {} --", if online { "online" } else { "offline" });
                    self.print_result(&self.policy.load_offline_first(online).await?);
                }
                _ = tokio::signal::ctrl_c() => break,
            }
        }

        poller.abort();
        Ok(())
    }

    fn print_result(&self, result: &CacheResult<Vec<Article>>) {
        let updated = result
            .last_updated()
            .map(|at| age_display(at, Utc::now()))
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{} articles from {} (updated {})",
            result.data.len(),
            result.source.label(),
            updated
        );
        print_articles(&result.data);
    }
}

fn print_articles(articles: &[Article]) {
    for article in articles {
        println!("{}", format_article_line(article));
    }
}

pub fn format_article_line(article: &Article) -> String {
    let marker = if article.has_full_content { '*' } else { ' ' };
    format!("{}{:>8}  {}  ({})", marker, article.id, article.title, article.author)
}

pub fn format_article_detail(article: &Article) -> String {
    let mut out = format!("{}\nby {}", article.title, article.author);
    if let Some(published) = article.published_at {
        out.push_str(&format!(" on {}", published.format("%Y-%m-%d")));
    }
    out.push_str("\n\n");

    match article.body.as_deref() {
        Some(body) if article.has_full_content => out.push_str(body),
        _ => {
            out.push_str(article.summary_text());
            out.push_str("\n\n(preview only, full content unavailable offline)");
        }
    }
    out
}
