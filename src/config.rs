use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::BatcherError;
use crate::scheduler::DEFAULT_INTERVAL;
use crate::store::LEDGER_FILE_NAME;

pub const CONFIG_FILE_NAME: &str = "image-batcher.json";
pub const DEFAULT_IMAGES_ROOT: &str = "static/images";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub images_root: Option<String>,
    #[serde(default)]
    pub ledger_path: Option<String>,
    #[serde(default)]
    pub interval_secs: Option<u64>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

/// Values given on the command line; each one wins over the file.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub endpoint: Option<String>,
    pub images_root: Option<String>,
    pub interval_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub endpoint: Option<String>,
    pub images_root: Utf8PathBuf,
    pub ledger_path: Utf8PathBuf,
    pub interval: Duration,
    pub request_timeout: Duration,
}

impl ResolvedConfig {
    /// The listing endpoint; only commands that ingest need one.
    pub fn endpoint(&self) -> Result<&str, BatcherError> {
        self.endpoint
            .as_deref()
            .ok_or(BatcherError::MissingEndpoint)
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `image-batcher.json` in the working directory when no
    /// path is given. A missing default file means defaults plus overrides.
    pub fn resolve(
        path: Option<&str>,
        overrides: ConfigOverrides,
    ) -> Result<ResolvedConfig, BatcherError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(CONFIG_FILE_NAME),
        };

        let config = if path.is_none() && !config_path.exists() {
            Config::default()
        } else {
            let content = fs::read_to_string(&config_path)
                .map_err(|_| BatcherError::ConfigRead(config_path.clone()))?;
            serde_json::from_str(&content)
                .map_err(|err| BatcherError::ConfigParse(err.to_string()))?
        };

        Self::resolve_config(config, overrides)
    }

    pub fn resolve_config(
        config: Config,
        overrides: ConfigOverrides,
    ) -> Result<ResolvedConfig, BatcherError> {
        let endpoint = overrides
            .endpoint
            .or(config.endpoint)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        let images_root = Utf8PathBuf::from(
            overrides
                .images_root
                .or(config.images_root)
                .unwrap_or_else(|| DEFAULT_IMAGES_ROOT.to_string()),
        );
        let ledger_path = config
            .ledger_path
            .map(Utf8PathBuf::from)
            .unwrap_or_else(|| images_root.join(LEDGER_FILE_NAME));

        let interval = overrides
            .interval_secs
            .or(config.interval_secs)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_INTERVAL);
        let request_timeout = config
            .request_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        Ok(ResolvedConfig {
            endpoint,
            images_root,
            ledger_path,
            interval,
            request_timeout,
        })
    }
}
