//! 🔧 Configuration loading.
//!
//! Figment merges two providers: `ESBULK_*` environment variables as the
//! base layer, then an optional TOML file on top. The file wins on
//! conflicts. No file is assumed when none is given; the environment has
//! to carry the whole config on its own in that case.

use std::path::Path;

use anyhow::Context;
use esbulk::ConnectionConfig;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

/// What to do with the documents once connected.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Target index for every document.
    pub index: String,
    /// Legacy document type, only meaningful against pre-7 servers.
    pub doc_type: Option<String>,
    /// Ingest pipeline stamped on each action meta line.
    pub pipeline: Option<String>,
    /// Documents per bulk request.
    pub batch_size: usize,
    /// Attempts per batch when the server answers 429.
    pub max_retries: usize,
    /// Always use the create action instead of picking by server version.
    pub force_create: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            index: "esbulk".to_string(),
            doc_type: None,
            pipeline: None,
            batch_size: 1_000,
            max_retries: 3,
            force_create: false,
        }
    }
}

pub fn load_config(config_file: Option<&Path>) -> anyhow::Result<AppConfig> {
    if let Some(path) = config_file {
        info!(path = %path.display(), "loading configuration");
    } else {
        info!("loading configuration from environment only");
    }

    let figment = Figment::new().merge(Env::prefixed("ESBULK_").split("__"));
    let figment = match config_file {
        Some(path) => figment.merge(Toml::file(path)),
        None => figment,
    };

    let context_msg = match config_file {
        Some(path) => format!(
            "failed to parse configuration from '{}' and ESBULK_* environment variables",
            path.display()
        ),
        None => "failed to parse configuration from ESBULK_* environment variables".to_string(),
    };

    figment.extract().context(context_msg)
}
