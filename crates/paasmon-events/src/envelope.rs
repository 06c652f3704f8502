//! Telemetry envelopes emitted by the platform firehose.
//!
//! Only the three event kinds the watcher turns into metrics are modelled;
//! everything else decodes to [`Envelope::Other`] and is ignored. Payload
//! fields are optional because upstream emitters routinely leave them out.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum Envelope {
    ContainerMetric(ContainerMetric),
    LogMessage(LogMessage),
    HttpStartStop(HttpStartStop),
    #[serde(other)]
    Other,
}

/// Resource usage sample for one container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerMetric {
    pub instance_index: Option<i32>,
    pub cpu_percentage: Option<f64>,
    pub disk_bytes: Option<u64>,
    pub disk_bytes_quota: Option<u64>,
    pub memory_bytes: Option<u64>,
    pub memory_bytes_quota: Option<u64>,
}

/// Log channel a line was written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    Out,
    Err,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMessage {
    /// Raw message bytes; not guaranteed to be UTF-8.
    pub message: Vec<u8>,
    pub message_type: MessageType,
    #[serde(default)]
    pub source_type: String,
    #[serde(default)]
    pub source_instance: String,
    #[serde(default)]
    pub app_id: String,
    /// Nanoseconds since the epoch.
    #[serde(default)]
    pub timestamp: i64,
}

/// One completed HTTP request as observed by the router.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpStartStop {
    /// Nanoseconds since the epoch.
    pub start_timestamp: i64,
    /// Nanoseconds since the epoch.
    pub stop_timestamp: i64,
    pub status_code: i32,
    pub instance_index: Option<i32>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
}

impl Envelope {
    /// Short kind name, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::ContainerMetric(_) => "container_metric",
            Envelope::LogMessage(_) => "log_message",
            Envelope::HttpStartStop(_) => "http_start_stop",
            Envelope::Other => "other",
        }
    }
}
