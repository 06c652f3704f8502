//! App watcher — turns one application's envelope stream into live
//! per-instance metrics.
//!
//! The watcher owns the [`InstanceTable`] behind a mutex shared with a
//! background consumption task. Resizing and envelope application both take
//! the lock, so an index is never observed half-registered and an envelope
//! racing with the teardown of its index is simply dropped.
//!
//! The table lock is a `std::sync::Mutex`: it is never held across an
//! `.await`, and `Drop` must be able to take it to unregister instruments.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use paasmon_core::App;

use crate::classifier::classify_and_apply;
use crate::error::WatcherError;
use crate::instance_table::InstanceTable;
use crate::metric_set::MetricSet;
use crate::registry::MetricsRegistry;
use crate::stream::{EnvelopeStream, StreamProvider};

/// Watches a single application.
pub struct AppWatcher {
    app: App,
    table: Arc<Mutex<InstanceTable>>,
    registry: Arc<dyn MetricsRegistry>,
    /// Set under the table lock by `close()` and `drop`.
    closed: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl AppWatcher {
    /// Open the envelope stream for `app`, register metrics for its
    /// instances and start consuming.
    ///
    /// Nothing is registered if the stream cannot be opened.
    pub async fn new(
        app: App,
        registry: Arc<dyn MetricsRegistry>,
        provider: &dyn StreamProvider,
    ) -> Result<Self, WatcherError> {
        let stream = provider.open_stream_for(&app).await?;

        let mut table = InstanceTable::new(app.clone());
        if let Err(e) = table.resize(app.instances, registry.as_ref()) {
            table.clear(registry.as_ref());
            return Err(e.into());
        }
        let table = Arc::new(Mutex::new(table));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(consume(
            app.guid.clone(),
            stream,
            table.clone(),
            shutdown_rx,
        ));

        info!(app = %app.guid, name = %app.name, instances = app.instances, "app watcher started");

        Ok(Self {
            app,
            table,
            registry,
            closed: AtomicBool::new(false),
            shutdown_tx,
            handle: tokio::sync::Mutex::new(Some(handle)),
        })
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    fn lock_table(&self) -> MutexGuard<'_, InstanceTable> {
        lock(&self.table)
    }

    /// Resize the live instance range to `[0, count)`.
    pub async fn update_instance_count(&self, count: u32) -> Result<(), WatcherError> {
        let mut table = self.lock_table();
        if self.closed.load(Ordering::Acquire) {
            return Err(WatcherError::Closed);
        }

        let previous = table.len();
        table.resize(count, self.registry.as_ref())?;
        if previous != count {
            info!(app = %self.app.guid, from = previous, to = count, "instance count updated");
        }
        Ok(())
    }

    /// Unregister every live instance and stop consuming.
    ///
    /// Returns once the consumption task has released the stream. Calling it
    /// again is a no-op.
    pub async fn close(&self) {
        {
            let mut table = self.lock_table();
            self.closed.store(true, Ordering::Release);
            table.clear(self.registry.as_ref());
        }

        let _ = self.shutdown_tx.send(true);
        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(app = %self.app.guid, error = %e, "consumption task failed");
            }
            info!(app = %self.app.guid, "app watcher closed");
        }
    }

    /// Whether the consumption task is still reading envelopes.
    ///
    /// Turns `false` once the provider ends the stream or after `close()`.
    pub async fn is_running(&self) -> bool {
        self.handle
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    pub async fn instance_count(&self) -> u32 {
        self.lock_table().len()
    }

    /// Handle to the metrics of one live instance.
    pub async fn metrics_for_instance(&self, index: u32) -> Option<MetricSet> {
        self.lock_table().get(index).cloned()
    }

    /// Handles to the metrics of every live instance.
    pub async fn instances(&self) -> BTreeMap<u32, MetricSet> {
        self.lock_table().snapshot()
    }
}

impl Drop for AppWatcher {
    fn drop(&mut self) {
        {
            let mut table = lock(&self.table);
            if !self.closed.swap(true, Ordering::AcqRel) {
                table.clear(self.registry.as_ref());
                debug!(app = %self.app.guid, "app watcher dropped without close");
            }
        }
        let _ = self.shutdown_tx.send(true);
    }
}

fn lock(table: &Mutex<InstanceTable>) -> MutexGuard<'_, InstanceTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The consumption loop. Exits when the stream ends or shutdown is signalled.
async fn consume(
    app: String,
    mut stream: EnvelopeStream,
    table: Arc<Mutex<InstanceTable>>,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(%app, "consumption loop starting");

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                stream.close();
                debug!(%app, "consumption loop shutting down");
                break;
            }
            next = stream.recv() => match next {
                Some(envelope) => {
                    let table = lock(&table);
                    if !classify_and_apply(&envelope, &table) {
                        trace!(%app, kind = envelope.kind(), "envelope dropped");
                    }
                }
                None => {
                    debug!(%app, "envelope stream ended");
                    break;
                }
            },
        }
    }
}
