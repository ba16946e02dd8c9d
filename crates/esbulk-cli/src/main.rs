//! 🚪 esbulk-cli — the thin front door: parse args, set up logging,
//! load config, hand off to the run module.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

mod app_config;
mod run;

/// Bulk-load an NDJSON file into an Elasticsearch-compatible server.
#[derive(Debug, Parser)]
#[command(name = "esbulk", version)]
struct Cli {
    /// NDJSON file to ingest, one JSON document per line.
    input: PathBuf,

    /// TOML config file. ESBULK_* environment variables are read either
    /// way; the file wins on conflicts.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Target index, overriding the config file.
    #[arg(short, long)]
    index: Option<String>,

    /// Ingest pipeline, overriding the config file.
    #[arg(long)]
    pipeline: Option<String>,

    /// Documents per bulk request, overriding the config file.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Always use the create action instead of picking by server version.
    #[arg(long)]
    create: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        let exists = path
            .try_exists()
            .with_context(|| format!("cannot check config file '{}'", path.display()))?;
        if !exists {
            anyhow::bail!(
                "config file '{}' not found; check the path (relative paths resolve \
                 against the current directory)",
                path.display()
            );
        }
    }

    let mut config = app_config::load_config(cli.config.as_deref())?;
    if let Some(index) = cli.index {
        config.ingest.index = index;
    }
    if let Some(pipeline) = cli.pipeline {
        config.ingest.pipeline = Some(pipeline);
    }
    if let Some(batch_size) = cli.batch_size {
        config.ingest.batch_size = batch_size;
    }
    if cli.create {
        config.ingest.force_create = true;
    }

    if let Err(err) = run::run(config, &cli.input).await {
        error!("error: {err}");
        let mut looks_like_connectivity = false;
        for cause in err.chain().skip(1) {
            error!("cause: {cause}");
            let cause = cause.to_string();
            if cause.contains("error sending request")
                || cause.contains("Connection refused")
                || cause.contains("connection refused")
                || cause.contains("tcp connect error")
                || cause.contains("dns error")
            {
                looks_like_connectivity = true;
            }
        }
        if looks_like_connectivity {
            error!(
                "hint: the server looks unreachable. Check that it is running and that \
                 the configured URL is correct; with Docker, `docker ps` shows whether \
                 the container is up."
            );
        }
        std::process::exit(1);
    }

    Ok(())
}
