//! App discovery — keeps the set of running watchers in line with the app
//! list.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

use paasmon_core::App;
use paasmon_events::{AppWatcher, MetricsRegistry, StreamProvider};

use crate::source::AppSource;

/// What one reconciliation pass changed, by app guid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub started: Vec<String>,
    pub resized: Vec<String>,
    pub recreated: Vec<String>,
    pub stopped: Vec<String>,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        self.started.is_empty()
            && self.resized.is_empty()
            && self.recreated.is_empty()
            && self.stopped.is_empty()
    }
}

/// Owns one [`AppWatcher`] per started application.
pub struct AppDiscovery {
    source: Arc<dyn AppSource>,
    registry: Arc<dyn MetricsRegistry>,
    provider: Arc<dyn StreamProvider>,
    /// Active watchers: app guid → watcher.
    watchers: RwLock<HashMap<String, AppWatcher>>,
}

impl AppDiscovery {
    pub fn new(
        source: Arc<dyn AppSource>,
        registry: Arc<dyn MetricsRegistry>,
        provider: Arc<dyn StreamProvider>,
    ) -> Self {
        Self {
            source,
            registry,
            provider,
            watchers: RwLock::new(HashMap::new()),
        }
    }

    /// Run one reconciliation pass.
    ///
    /// Fails only if the app list cannot be fetched. Watchers that fail to
    /// start are logged and retried on the next pass.
    pub async fn sync_once(&self) -> anyhow::Result<SyncReport> {
        let apps = self.source.list_apps().await?;
        let wanted: HashSet<&str> = apps
            .iter()
            .filter(|a| a.is_started())
            .map(|a| a.guid.as_str())
            .collect();

        let mut watchers = self.watchers.write().await;
        let mut report = SyncReport::default();

        let gone: Vec<String> = watchers
            .keys()
            .filter(|guid| !wanted.contains(guid.as_str()))
            .cloned()
            .collect();
        for guid in gone {
            if let Some(watcher) = watchers.remove(&guid) {
                watcher.close().await;
                info!(app = %guid, "stopped watching app");
                report.stopped.push(guid);
            }
        }

        for app in apps.iter().filter(|a| a.is_started()) {
            let Some(watcher) = watchers.remove(&app.guid) else {
                if let Some(watcher) = self.start_watcher(app).await {
                    watchers.insert(app.guid.clone(), watcher);
                    report.started.push(app.guid.clone());
                }
                continue;
            };

            if watcher.app().labels_differ(app) || !watcher.is_running().await {
                debug!(app = %app.guid, "recreating app watcher");
                watcher.close().await;
                if let Some(watcher) = self.start_watcher(app).await {
                    watchers.insert(app.guid.clone(), watcher);
                    report.recreated.push(app.guid.clone());
                }
                continue;
            }

            if watcher.instance_count().await != app.instances {
                match watcher.update_instance_count(app.instances).await {
                    Ok(()) => report.resized.push(app.guid.clone()),
                    Err(e) => warn!(app = %app.guid, error = %e, "failed to resize app watcher"),
                }
            }
            watchers.insert(app.guid.clone(), watcher);
        }

        Ok(report)
    }

    async fn start_watcher(&self, app: &App) -> Option<AppWatcher> {
        match AppWatcher::new(app.clone(), self.registry.clone(), self.provider.as_ref()).await {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!(app = %app.guid, name = %app.name, error = %e, "failed to start app watcher");
                None
            }
        }
    }

    /// Run the discovery loop until shutdown, then close every watcher.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = interval.as_secs(), "app discovery started");

        loop {
            match self.sync_once().await {
                Ok(report) if !report.is_empty() => info!(
                    started = report.started.len(),
                    resized = report.resized.len(),
                    recreated = report.recreated.len(),
                    stopped = report.stopped.len(),
                    "app discovery pass applied changes"
                ),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "app discovery pass failed"),
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {
                    info!("app discovery shutting down");
                    break;
                }
            }
        }

        self.close_all().await;
    }

    /// Close every watcher (for graceful shutdown).
    pub async fn close_all(&self) {
        let mut watchers = self.watchers.write().await;
        for (guid, watcher) in watchers.drain() {
            watcher.close().await;
            debug!(app = %guid, "app watcher closed");
        }
    }

    /// Guids of watched apps, sorted.
    pub async fn watched_apps(&self) -> Vec<String> {
        let watchers = self.watchers.read().await;
        let mut guids: Vec<String> = watchers.keys().cloned().collect();
        guids.sort();
        guids
    }

    /// Live instance count of a watched app.
    pub async fn instance_count(&self, guid: &str) -> Option<u32> {
        let watchers = self.watchers.read().await;
        match watchers.get(guid) {
            Some(watcher) => Some(watcher.instance_count().await),
            None => None,
        }
    }
}
