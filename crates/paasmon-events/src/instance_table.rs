//! Live mapping from instance index to [`MetricSet`].
//!
//! The table always holds exactly the indices `[0, len)`. Growing creates
//! and registers new sets in ascending order; shrinking unregisters and
//! drops them in descending order.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use paasmon_core::App;

use crate::metric_set::MetricSet;
use crate::registry::MetricsRegistry;

pub struct InstanceTable {
    app: App,
    sets: BTreeMap<u32, MetricSet>,
}

impl InstanceTable {
    /// An empty table for `app`. Call [`resize`](Self::resize) to populate.
    pub fn new(app: App) -> Self {
        Self {
            app,
            sets: BTreeMap::new(),
        }
    }

    pub fn get(&self, index: u32) -> Option<&MetricSet> {
        self.sets.get(&index)
    }

    pub fn len(&self) -> u32 {
        self.sets.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn indices(&self) -> Vec<u32> {
        self.sets.keys().copied().collect()
    }

    /// Handles to every live set, keyed by index.
    pub fn snapshot(&self) -> BTreeMap<u32, MetricSet> {
        self.sets.clone()
    }

    /// Make `[0, count)` the live index range.
    ///
    /// On a registration error the table keeps every index that was fully
    /// registered before the failure.
    pub fn resize(&mut self, count: u32, registry: &dyn MetricsRegistry) -> prometheus::Result<()> {
        let current = self.len();

        for index in current..count {
            let set = MetricSet::new(&self.app, index)?;
            register_group(&set, registry)?;
            self.sets.insert(index, set);
            debug!(app = %self.app.guid, index, "instance metrics registered");
        }

        for index in (count..current).rev() {
            if let Some(set) = self.sets.remove(&index) {
                unregister_group(&self.app.guid, index, &set, registry);
                debug!(app = %self.app.guid, index, "instance metrics unregistered");
            }
        }

        Ok(())
    }

    /// Unregister and drop every set.
    pub fn clear(&mut self, registry: &dyn MetricsRegistry) {
        while let Some((index, set)) = self.sets.pop_last() {
            unregister_group(&self.app.guid, index, &set, registry);
        }
    }
}

/// Register all instruments of `set`, or none of them.
fn register_group(set: &MetricSet, registry: &dyn MetricsRegistry) -> prometheus::Result<()> {
    for (registered, collector) in set.collectors().into_iter().enumerate() {
        if let Err(e) = registry.register(collector) {
            for collector in set.collectors().into_iter().take(registered) {
                registry.unregister(collector);
            }
            return Err(e);
        }
    }
    Ok(())
}

fn unregister_group(app: &str, index: u32, set: &MetricSet, registry: &dyn MetricsRegistry) {
    for collector in set.collectors() {
        if !registry.unregister(collector) {
            warn!(%app, index, "instrument was not registered");
        }
    }
}
