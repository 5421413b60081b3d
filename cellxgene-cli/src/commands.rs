use anyhow::{Context, Result};
use cellxgene_config::{AppConfig, ConfigLoader};
use cellxgene_storage::{create_db, DatabaseConfig, DbSessionMaker};
use std::path::Path;
use tracing::{error, info};

use crate::cli::OutputFormat;

fn load_config(config_file: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = config_file {
        if !path.exists() {
            return Err(anyhow::anyhow!("Configuration file not found: {:?}", path));
        }
    }
    ConfigLoader::new()
        .load(config_file)
        .context("Failed to load configuration")
}

/// Load and complete the configuration; returns the completion messages
pub fn handle_validate(config_file: Option<&Path>) -> Result<Vec<String>> {
    let mut config = load_config(config_file)?;

    let mut messages = Vec::new();
    match config.complete_config_with(|message| messages.push(message.to_string())) {
        Ok(_) => {
            info!("Configuration validation passed");
            Ok(messages)
        }
        Err(e) => {
            error!("Configuration validation failed: {}", e);
            Err(e).context("Configuration validation failed")
        }
    }
}

pub fn handle_write(config_file: Option<&Path>, output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        return Err(anyhow::anyhow!(
            "Output file already exists: {:?}. Use --force to overwrite.",
            output
        ));
    }

    let config = load_config(config_file)?;
    config
        .write_config(output)
        .with_context(|| format!("Failed to write configuration to {:?}", output))?;
    info!("Configuration written to {:?}", output);
    Ok(())
}

/// Options that differ from the default config, rendered in `format`
pub fn handle_diff(config_file: Option<&Path>, format: OutputFormat) -> Result<String> {
    let config = load_config(config_file)?;
    let changes = config.changes_from_default()?;
    let rendered = match format {
        OutputFormat::Yaml => serde_yaml::to_string(&changes)?,
        OutputFormat::Json => serde_json::to_string_pretty(&changes)?,
    };
    Ok(rendered)
}

pub async fn handle_create_db(config_file: Option<&Path>, database_url: Option<&str>) -> Result<DatabaseConfig> {
    let db_config = match database_url {
        Some(url) => DatabaseConfig::new(url),
        None => {
            let mut config = load_config(config_file)?;
            let completed = config
                .complete_config()
                .context("Configuration validation failed")?;
            let hosted = &completed
                .default_dataset_config()
                .settings()
                .user_annotations
                .hosted_tiledb_array;
            DatabaseConfig::try_from(hosted)?
        }
    };

    let sessions = DbSessionMaker::connect(db_config.clone())
        .await
        .context("Failed to connect to the annotation database")?;
    create_db(&sessions).await?;
    sessions.close().await?;
    info!("Annotation database tables recreated");
    Ok(db_config)
}
