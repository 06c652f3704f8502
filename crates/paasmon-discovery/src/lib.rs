//! paasmon-discovery — reconciles watched apps with the platform.
//!
//! Periodically lists applications from an [`AppSource`] and keeps exactly
//! one [`AppWatcher`](paasmon_events::AppWatcher) per started app.
//!
//! # Architecture
//!
//! ```text
//! AppDiscovery
//!   ├── AppSource::list_apps()
//!   ├── sync_once()
//!   │   ├── new app          → AppWatcher::new()
//!   │   ├── instances change → update_instance_count()
//!   │   ├── rename / dead    → close() + AppWatcher::new()
//!   │   └── gone / stopped   → close()
//!   └── run() → periodic sync until shutdown, then close all
//! ```
//!
//! A watcher whose stream ended is recreated on the next pass; this is the
//! only place streams are re-established.

pub mod discovery;
pub mod source;

pub use discovery::{AppDiscovery, SyncReport};
pub use source::{AppSource, ConfigFileAppSource, StaticAppSource};
