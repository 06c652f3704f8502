//! paasmon.toml configuration parser.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::types::App;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Address the `/metrics` endpoint listens on.
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    /// Seconds between app discovery passes.
    #[serde(default = "default_discovery_interval")]
    pub discovery_interval_secs: u64,
    pub firehose: FirehoseConfig,
    #[serde(default)]
    pub apps: Vec<App>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirehoseConfig {
    /// `host:port` of the envelope relay.
    pub address: String,
    /// Per-app channel capacity between the socket reader and the watcher.
    #[serde(default = "default_buffer")]
    pub buffer: usize,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9090))
}

fn default_discovery_interval() -> u64 {
    30
}

fn default_buffer() -> usize {
    1024
}

impl ExporterConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: ExporterConfig = toml::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.firehose.address.trim().is_empty() {
            bail!("firehose.address must not be empty");
        }
        if self.firehose.buffer == 0 {
            bail!("firehose.buffer must be at least 1");
        }
        if self.discovery_interval_secs == 0 {
            bail!("discovery_interval_secs must be at least 1");
        }

        let mut seen = HashSet::new();
        for app in &self.apps {
            if !seen.insert(app.guid.as_str()) {
                bail!("app guid {} is listed more than once", app.guid);
            }
        }
        Ok(())
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
[firehose]
address = "127.0.0.1:8081"
"#;

    #[test]
    fn test_parse_minimal() {
        let config: ExporterConfig = toml::from_str(MINIMAL).unwrap();
        assert_eq!(config.listen, default_listen());
        assert_eq!(config.discovery_interval_secs, 30);
        assert_eq!(config.firehose.buffer, 1024);
        assert!(config.apps.is_empty());
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_apps() {
        let toml_str = r#"
listen = "127.0.0.1:9100"

[firehose]
address = "relay:8081"
buffer = 16

[[apps]]
guid = "33333333-3333-3333-3333-333333333333"
name = "foo"
instances = 2
space_url = "/v2/spaces/123"

[[apps]]
guid = "44444444-4444-4444-4444-444444444444"
name = "bar"
instances = 1
space_url = "/v2/spaces/123"
state = "STOPPED"
"#;
        let config: ExporterConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.apps.len(), 2);
        assert_eq!(config.apps[0].instances, 2);
        assert!(!config.apps[1].is_started());
        config.validate().unwrap();
    }

    #[test]
    fn test_rejects_duplicate_guids() {
        let mut config: ExporterConfig = toml::from_str(MINIMAL).unwrap();
        let app = App {
            guid: "dup".to_string(),
            name: "foo".to_string(),
            instances: 1,
            space_url: "/v2/spaces/1".to_string(),
            state: Default::default(),
        };
        config.apps = vec![app.clone(), app];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_rejects_zero_interval() {
        let mut config: ExporterConfig = toml::from_str(MINIMAL).unwrap();
        config.discovery_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = ExporterConfig::from_file(file.path()).unwrap();
        assert_eq!(config.firehose.address, "127.0.0.1:8081");

        let rendered = config.to_toml_string().unwrap();
        assert!(rendered.contains("127.0.0.1:8081"));
    }

    #[test]
    fn test_resolved_config_spells_out_defaults() {
        let config: ExporterConfig = toml::from_str(MINIMAL).unwrap();
        let rendered = config.to_toml_string().unwrap();
        assert!(rendered.contains("discovery_interval_secs = 30"));
        assert!(rendered.contains("buffer = 1024"));

        let reparsed: ExporterConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(reparsed.listen, config.listen);
        assert_eq!(reparsed.firehose.address, config.firehose.address);
    }

    #[test]
    fn test_from_missing_file() {
        let err = ExporterConfig::from_file(Path::new("/nonexistent/paasmon.toml")).unwrap_err();
        assert!(err.to_string().contains("reading"));
    }
}
