//! Online/offline signal consumed by the cache layer.
//!
//! The monitor polls a probe on a fixed interval and also accepts pushed
//! transition events; subscribers read the current value or wait for changes.
//! Until the first check resolves the signal reports online.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use url::Url;

use crate::error::{AppError, Result};

pub trait ConnectivityProbe: Send + Sync + 'static {
    fn check(&self) -> impl Future<Output = bool> + Send;
}

/// Probe that counts any HTTP response from `url` as being online.
pub struct HttpProbe {
    client: Client,
    url: Url,
}

impl HttpProbe {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| AppError::Config(format!("invalid probe url {:?}: {}", url, e)))?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }
}

impl ConnectivityProbe for HttpProbe {
    async fn check(&self) -> bool {
        match self.client.head(self.url.clone()).send().await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("Connectivity probe failed: {}", e);
                false
            }
        }
    }
}

/// Read side of the connectivity status.
#[derive(Clone)]
pub struct ConnectivitySignal {
    rx: watch::Receiver<bool>,
}

impl ConnectivitySignal {
    pub fn is_online(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait for the next transition. `None` once the monitor is gone.
    pub async fn changed(&mut self) -> Option<bool> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }
}

pub struct ConnectivityMonitor<P: ConnectivityProbe> {
    probe: P,
    tx: watch::Sender<bool>,
    interval: Duration,
}

impl<P: ConnectivityProbe> ConnectivityMonitor<P> {
    pub fn new(probe: P, interval: Duration) -> (Arc<Self>, ConnectivitySignal) {
        let (tx, rx) = watch::channel(true);
        let monitor = Arc::new(Self {
            probe,
            tx,
            interval,
        });
        (monitor, ConnectivitySignal { rx })
    }

    /// Publish a status; subscribers are only woken on transitions.
    pub fn report(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            tracing::info!("Connectivity changed: {}", if online { "online" } else { "offline" });
        }
    }

    pub async fn check_now(&self) -> bool {
        let online = self.probe.check().await;
        self.report(online);
        online
    }

    /// Poll the probe every interval, starting immediately, until every
    /// signal has been dropped.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if self.tx.is_closed() {
                    break;
                }
                self.check_now().await;
            }
        })
    }
}
