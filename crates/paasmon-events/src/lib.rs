//! paasmon-events — per-application telemetry watcher.
//!
//! Consumes the envelope stream of one application and maintains one
//! [`MetricSet`] per running instance, registered with a Prometheus
//! registry for as long as the instance index is live.
//!
//! # Architecture
//!
//! ```text
//! AppWatcher
//!   ├── StreamProvider::open_stream_for() → EnvelopeStream
//!   ├── consumption task
//!   │   └── classify() → Update::apply(&InstanceTable)
//!   └── update_instance_count() / close()
//!       └── InstanceTable::resize() → MetricsRegistry (un)register
//! ```

pub mod classifier;
pub mod envelope;
pub mod error;
pub mod instance_table;
pub mod metric_set;
pub mod registry;
pub mod stream;
pub mod watcher;

pub use classifier::{classify, classify_and_apply, Update};
pub use envelope::{ContainerMetric, Envelope, HttpStartStop, LogMessage, MessageType};
pub use error::{StreamError, WatcherError};
pub use instance_table::InstanceTable;
pub use metric_set::{MetricSet, METRICS_PER_INSTANCE};
pub use registry::MetricsRegistry;
pub use stream::{BoxFuture, EnvelopeStream, StreamProvider};
pub use watcher::AppWatcher;
