//! `init` and `config` commands.

use anyhow::{Context, Result};
use std::path::Path;
use tracboard::config::{CONFIG_DIR, CONFIG_FILE, TracboardConfig};

use super::{open_db, print_json};
use crate::ConfigCommands;

pub fn cmd_init(project_dir: &Path, config: &TracboardConfig, force: bool) -> Result<()> {
    let config_dir = project_dir.join(CONFIG_DIR);
    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("Failed to create {}", config_dir.display()))?;

    let config_path = config_dir.join(CONFIG_FILE);
    let wrote_config = force || !config_path.exists();
    if wrote_config {
        TracboardConfig::default().save(&config_path)?;
    }

    open_db(config)?;
    tracing::info!(db = %config.database.path.display(), "database ready");

    print_json(&serde_json::json!({
        "config": config_path,
        "config_written": wrote_config,
        "database": config.database.path,
    }))
}

pub fn cmd_config(config: &TracboardConfig, command: Option<ConfigCommands>) -> Result<()> {
    match command.unwrap_or(ConfigCommands::Show) {
        ConfigCommands::Show => print_json(config),
        ConfigCommands::Validate => {
            let errors = config.validate();
            print_json(&serde_json::json!({
                "valid": errors.is_empty(),
                "errors": errors,
            }))?;
            if !errors.is_empty() {
                anyhow::bail!("configuration has {} problem(s)", errors.len());
            }
            Ok(())
        }
    }
}
