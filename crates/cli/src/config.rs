use brokergate_brokers_rest::RestBrokerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Top-level configuration, loadable from a TOML file.
///
/// Every section has working defaults so the binary runs without a config
/// file at all.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub broker: RestBrokerConfig,
    pub files: FilesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the API server binds to.
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    /// Credential file (a JSON array of tokens).
    pub tokens: PathBuf,
    /// Directory completed broker reports are cached in.
    pub broker_report_dir: PathBuf,
    /// Order-book tick log consumed by `compact` when no --input is given.
    pub order_book_log: PathBuf,
    /// Compacted output written by `compact` when no --output is given.
    pub compacted_order_book: PathBuf,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            tokens: PathBuf::from("data/tokens/data.json"),
            broker_report_dir: PathBuf::from("data/brokerreports"),
            order_book_log: PathBuf::from("data/orderbooks/ticks.log"),
            compacted_order_book: PathBuf::from("data/orderbooks/compacted.json"),
        }
    }
}

impl AppConfig {
    /// Load configuration from `path`. A missing file is not an error:
    /// defaults apply.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(raw) => {
                let config = toml::from_str(&raw)?;
                debug!(path = %path.display(), "Loaded configuration");
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file; using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }
}
