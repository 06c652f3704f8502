//! paasmond — the paasmon exporter daemon.
//!
//! Wires the app watchers to the outside world: a TCP firehose relay
//! supplies envelopes, the exporter config supplies the app list, and an
//! axum router serves the Prometheus registry.

pub mod api;
pub mod firehose;

pub use api::build_router;
pub use firehose::TcpStreamProvider;
