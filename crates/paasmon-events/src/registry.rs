//! The registry capability the watcher exports instruments through.

use prometheus::core::Collector;
use prometheus::Registry;

/// Accepts and revokes instruments for export.
///
/// Implementations must be safe to share between watchers. `register`
/// only fails on programming errors such as a duplicate identity.
pub trait MetricsRegistry: Send + Sync {
    fn register(&self, collector: Box<dyn Collector>) -> prometheus::Result<()>;

    /// Returns whether the instrument was known to the registry.
    fn unregister(&self, collector: Box<dyn Collector>) -> bool;
}

impl MetricsRegistry for Registry {
    fn register(&self, collector: Box<dyn Collector>) -> prometheus::Result<()> {
        Registry::register(self, collector)
    }

    fn unregister(&self, collector: Box<dyn Collector>) -> bool {
        Registry::unregister(self, collector).is_ok()
    }
}
