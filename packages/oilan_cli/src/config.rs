use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

use oilan_client::{ClientConfig, FileConfig, load_config};

/// Local directories used by the CLI.
pub struct OilanConfig {
    pub data_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl OilanConfig {
    pub fn new(custom_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = match custom_dir {
            Some(dir) => dir,
            None => dirs::home_dir()
                .context("Could not find home directory")?
                .join(".oilan"),
        };

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

        let logs_dir = data_dir.join("logs");
        std::fs::create_dir_all(&logs_dir)
            .with_context(|| format!("Failed to create logs directory: {:?}", logs_dir))?;

        Ok(Self { data_dir, logs_dir })
    }

    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }

    pub fn log_path(&self) -> PathBuf {
        self.logs_dir.join("oilan.log")
    }

    /// Resolve defaults, `config.toml`, and `OILAN_*` env vars into a client config.
    pub fn client_config(&self) -> Result<ClientConfig> {
        let file_config: FileConfig = load_config(&self.data_dir)
            .extract()
            .with_context(|| format!("Failed to read {:?}", self.config_path()))?;
        let client = ClientConfig::from_file(&file_config)?;
        info!(
            base_url = %client.base_url,
            has_token = client.session_token.is_some(),
            "client configured"
        );
        Ok(client)
    }
}
