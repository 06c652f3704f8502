//! Envelope classification.
//!
//! [`classify`] is pure: it decides which instance an envelope addresses and
//! what it means for that instance's metrics. [`Update::apply`] performs the
//! mutation against an [`InstanceTable`], dropping updates for indices that
//! are not live.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::envelope::{ContainerMetric, Envelope, HttpStartStop, LogMessage, MessageType};
use crate::instance_table::InstanceTable;

const CRASH_SOURCE_TYPE: &str = "API";
const CRASH_PREFIX: &str = "App instance exited with guid ";
const CRASH_REASON: &str = r#""reason"=>"CRASHED""#;

static CRASH_INDEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""index"=>(\d+)"#).expect("static regex"));

/// The effect of one envelope on one instance.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    Container {
        index: u32,
        cpu: Option<f64>,
        disk_bytes: Option<u64>,
        disk_utilization: Option<f64>,
        memory_bytes: Option<u64>,
        memory_utilization: Option<f64>,
    },
    Crash {
        index: u32,
    },
    Request {
        index: u32,
        status_range: Option<&'static str>,
        duration: Duration,
    },
}

impl Update {
    pub fn index(&self) -> u32 {
        match self {
            Update::Container { index, .. }
            | Update::Crash { index }
            | Update::Request { index, .. } => *index,
        }
    }

    /// Apply to the addressed instance. Returns `false` if it is not live.
    pub fn apply(&self, table: &InstanceTable) -> bool {
        let Some(set) = table.get(self.index()) else {
            return false;
        };

        match self {
            Update::Container {
                cpu,
                disk_bytes,
                disk_utilization,
                memory_bytes,
                memory_utilization,
                ..
            } => {
                if let Some(v) = cpu {
                    set.cpu.set(*v);
                }
                if let Some(v) = disk_bytes {
                    set.disk_bytes.set(*v as f64);
                }
                if let Some(v) = disk_utilization {
                    set.disk_utilization.set(*v);
                }
                if let Some(v) = memory_bytes {
                    set.memory_bytes.set(*v as f64);
                }
                if let Some(v) = memory_utilization {
                    set.memory_utilization.set(*v);
                }
            }
            Update::Crash { .. } => set.crashes.inc(),
            Update::Request {
                status_range,
                duration,
                ..
            } => {
                set.response_time.observe(duration.as_secs_f64());
                if let Some(range) = status_range {
                    set.requests.with_label_values(&[*range]).inc();
                }
            }
        }
        true
    }
}

/// Decide what `envelope` means, if anything.
pub fn classify(envelope: &Envelope) -> Option<Update> {
    match envelope {
        Envelope::ContainerMetric(metric) => classify_container(metric),
        Envelope::LogMessage(log) => classify_log(log),
        Envelope::HttpStartStop(event) => classify_http(event),
        Envelope::Other => None,
    }
}

/// Classify and apply in one step. Returns whether any metric changed.
pub fn classify_and_apply(envelope: &Envelope, table: &InstanceTable) -> bool {
    classify(envelope).is_some_and(|update| update.apply(table))
}

fn classify_container(metric: &ContainerMetric) -> Option<Update> {
    let index = instance_index(metric.instance_index)?;
    Some(Update::Container {
        index,
        cpu: metric.cpu_percentage,
        disk_bytes: metric.disk_bytes,
        disk_utilization: utilization(metric.disk_bytes, metric.disk_bytes_quota),
        memory_bytes: metric.memory_bytes,
        memory_utilization: utilization(metric.memory_bytes, metric.memory_bytes_quota),
    })
}

fn classify_log(log: &LogMessage) -> Option<Update> {
    if log.message_type != MessageType::Out || log.source_type != CRASH_SOURCE_TYPE {
        return None;
    }

    let text = std::str::from_utf8(&log.message).ok()?;
    let payload = text.strip_prefix(CRASH_PREFIX)?;
    if !payload.contains(CRASH_REASON) {
        return None;
    }

    let index = CRASH_INDEX.captures(payload)?.get(1)?.as_str().parse().ok()?;
    Some(Update::Crash { index })
}

fn classify_http(event: &HttpStartStop) -> Option<Update> {
    let index = instance_index(event.instance_index)?;
    let nanos = event.stop_timestamp.saturating_sub(event.start_timestamp).max(0);

    Some(Update::Request {
        index,
        status_range: status_range(event.status_code),
        duration: Duration::from_nanos(nanos as u64),
    })
}

fn instance_index(raw: Option<i32>) -> Option<u32> {
    raw.and_then(|i| u32::try_from(i).ok())
}

/// `used / quota * 100`, or `None` when either side is unknown or the quota is zero.
fn utilization(used: Option<u64>, quota: Option<u64>) -> Option<f64> {
    match (used, quota) {
        (Some(used), Some(quota)) if quota > 0 => Some(used as f64 / quota as f64 * 100.0),
        _ => None,
    }
}

fn status_range(code: i32) -> Option<&'static str> {
    match code {
        100..=199 => Some("1xx"),
        200..=299 => Some("2xx"),
        300..=399 => Some("3xx"),
        400..=499 => Some("4xx"),
        500..=599 => Some("5xx"),
        _ => None,
    }
}
