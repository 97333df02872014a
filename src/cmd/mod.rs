//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module    | Commands handled                         |
//! |-----------|------------------------------------------|
//! | `init`    | `Init`, `Config`                         |
//! | `serve`   | `Serve`                                  |
//! | `card`    | `Card`                                   |
//! | `project` | `Project`, `Group`, `Permission`         |
//! | `check`   | `Check`                                  |
//!
//! Results are printed to stdout as JSON; logs go to stderr.

pub mod card;
pub mod check;
pub mod init;
pub mod project;
pub mod serve;

pub use card::cmd_card;
pub use check::cmd_check;
pub use init::{cmd_config, cmd_init};
pub use project::{cmd_group, cmd_permission, cmd_project};
pub use serve::cmd_serve;

use anyhow::{Context, Result};
use serde::Serialize;
use tracboard::config::TracboardConfig;
use tracboard::db::Db;
use tracboard::errors::ScopeError;
use tracboard::scope::Project;

pub fn open_db(config: &TracboardConfig) -> Result<Db> {
    let path = &config.database.path;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    Db::open(path)
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize output")?
    );
    Ok(())
}

/// Look a project up by numeric id, falling back to its name.
pub fn resolve_project(db: &Db, key: &str) -> Result<Project, ScopeError> {
    if let Ok(id) = key.parse::<i64>() {
        if let Some(project) = db.get_project(id)? {
            return Ok(project);
        }
    }
    db.get_project_by_name(key)?
        .ok_or_else(|| ScopeError::ProjectNameNotFound {
            name: key.to_string(),
        })
}
