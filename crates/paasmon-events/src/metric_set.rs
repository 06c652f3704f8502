//! The bundle of instruments exported for one application instance.

use std::collections::HashMap;

use prometheus::core::Collector;
use prometheus::{Gauge, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts};

use paasmon_core::App;

/// Number of instruments in a [`MetricSet`].
pub const METRICS_PER_INSTANCE: usize = 8;

/// Label on the `requests` counter vector.
pub const STATUS_RANGE_LABEL: &str = "status_range";

/// Per-instance instruments.
///
/// Cloning is cheap and yields handles to the same underlying instruments,
/// so a clone held outside the watcher keeps observing updates.
#[derive(Clone)]
pub struct MetricSet {
    pub cpu: Gauge,
    pub disk_bytes: Gauge,
    pub disk_utilization: Gauge,
    pub memory_bytes: Gauge,
    pub memory_utilization: Gauge,
    pub crashes: IntCounter,
    pub requests: IntCounterVec,
    pub response_time: Histogram,
}

impl MetricSet {
    /// Build the instruments for instance `index` of `app`.
    ///
    /// Every instrument carries `guid`, `app`, `space` and `instance` as
    /// constant labels so sets from different instances never collide in a
    /// registry.
    pub fn new(app: &App, index: u32) -> prometheus::Result<Self> {
        let labels = const_labels(app, index);
        let opts = |name: &str, help: &str| Opts::new(name, help).const_labels(labels.clone());

        Ok(Self {
            cpu: Gauge::with_opts(opts("cpu", "CPU utilisation in percent (0-100)"))?,
            disk_bytes: Gauge::with_opts(opts("disk_bytes", "Disk usage in bytes"))?,
            disk_utilization: Gauge::with_opts(opts(
                "disk_utilization",
                "Disk utilisation in percent of quota (0-100)",
            ))?,
            memory_bytes: Gauge::with_opts(opts("memory_bytes", "Memory usage in bytes"))?,
            memory_utilization: Gauge::with_opts(opts(
                "memory_utilization",
                "Memory utilisation in percent of quota (0-100)",
            ))?,
            crashes: IntCounter::with_opts(opts("crashes", "Number of app instance crashes"))?,
            requests: IntCounterVec::new(
                opts("requests", "Number of completed HTTP requests by status range"),
                &[STATUS_RANGE_LABEL],
            )?,
            response_time: Histogram::with_opts(
                HistogramOpts::new("response_time", "HTTP response time in seconds")
                    .const_labels(labels),
            )?,
        })
    }

    /// Boxed handles for (un)registration, one per instrument.
    pub fn collectors(&self) -> Vec<Box<dyn Collector>> {
        vec![
            Box::new(self.cpu.clone()),
            Box::new(self.disk_bytes.clone()),
            Box::new(self.disk_utilization.clone()),
            Box::new(self.memory_bytes.clone()),
            Box::new(self.memory_utilization.clone()),
            Box::new(self.crashes.clone()),
            Box::new(self.requests.clone()),
            Box::new(self.response_time.clone()),
        ]
    }

    /// Current count for one status range, e.g. `"2xx"`.
    pub fn request_count(&self, status_range: &str) -> u64 {
        self.requests
            .get_metric_with_label_values(&[status_range])
            .map(|c| c.get())
            .unwrap_or(0)
    }
}

fn const_labels(app: &App, index: u32) -> HashMap<String, String> {
    HashMap::from([
        ("guid".to_string(), app.guid.clone()),
        ("app".to_string(), app.name.clone()),
        ("space".to_string(), app.space_url.clone()),
        ("instance".to_string(), index.to_string()),
    ])
}
