//! Where the list of applications comes from.

use std::path::PathBuf;

use tokio::sync::RwLock;

use paasmon_core::{App, ExporterConfig};
use paasmon_events::BoxFuture;

/// Lists the applications that should currently be watched.
pub trait AppSource: Send + Sync {
    fn list_apps(&self) -> BoxFuture<'_, anyhow::Result<Vec<App>>>;
}

/// A fixed list, replaceable at runtime.
#[derive(Default)]
pub struct StaticAppSource {
    apps: RwLock<Vec<App>>,
}

impl StaticAppSource {
    pub fn new(apps: Vec<App>) -> Self {
        Self {
            apps: RwLock::new(apps),
        }
    }

    pub async fn set_apps(&self, apps: Vec<App>) {
        *self.apps.write().await = apps;
    }
}

impl AppSource for StaticAppSource {
    fn list_apps(&self) -> BoxFuture<'_, anyhow::Result<Vec<App>>> {
        Box::pin(async move { Ok(self.apps.read().await.clone()) })
    }
}

/// Re-reads `[[apps]]` from the exporter config file on every call, so
/// edits to the file take effect on the next discovery pass.
pub struct ConfigFileAppSource {
    path: PathBuf,
}

impl ConfigFileAppSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl AppSource for ConfigFileAppSource {
    fn list_apps(&self) -> BoxFuture<'_, anyhow::Result<Vec<App>>> {
        Box::pin(async move { Ok(ExporterConfig::from_file(&self.path)?.apps) })
    }
}
