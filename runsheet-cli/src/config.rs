use anyhow::{Context, Result};
use runsheet_core::{ApiClient, RunsheetConfig};
use std::path::PathBuf;
use std::time::Duration;

/// Settings for one CLI invocation: the shared config files and environment,
/// plus the global `--server` flag.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub core: RunsheetConfig,
}

impl CliConfig {
    pub fn load(server_url: Option<String>) -> Result<Self> {
        let mut core = RunsheetConfig::load().context(
            "Failed to load configuration. \n\
             Check config/default.toml, runsheet.toml and RUNSHEET_* environment variables",
        )?;

        if let Some(url) = server_url {
            core.client.base_url = url;
            core.validate()
                .context("Invalid --server value, expected an http:// or https:// URL")?;
        }

        Ok(Self { core })
    }

    pub fn api_client(&self) -> Result<ApiClient> {
        ApiClient::from_config(&self.core.client).context("Failed to build HTTP client")
    }

    pub fn server_url(&self) -> &str {
        &self.core.client.base_url
    }

    pub fn debounce(&self) -> Duration {
        self.core.debounce()
    }

    pub fn database_url(&self) -> &str {
        self.core.database_url()
    }

    pub fn upload_dir(&self) -> &PathBuf {
        &self.core.server.upload_dir
    }

    pub fn log_level(&self) -> &str {
        self.core.log_level()
    }

    pub fn json_logs(&self) -> bool {
        self.core.logging.json_format
    }
}
