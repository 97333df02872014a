//! Configuration for tracboard, read from `.tracboard/tracboard.toml`.
//!
//! Values are layered file → environment → CLI. The CLI layer is applied
//! by `main` after `TracboardConfig::resolve`.
//!
//! # Configuration File Format
//!
//! ```toml
//! [database]
//! path = ".tracboard/tracboard.db"
//!
//! [board]
//! rank_policy = "reject"
//! required_permission = "CARDS_ADMIN"
//!
//! [scope]
//! max_closure_depth = 16
//!
//! [server]
//! host = "127.0.0.1"
//! port = 3142
//!
//! [groups]
//! dev = ["alice", "bob"]
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::board::RankPolicy;
use crate::scope::DEFAULT_MAX_CLOSURE_DEPTH;

pub const CONFIG_DIR: &str = ".tracboard";
pub const CONFIG_FILE: &str = "tracboard.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSection {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    Path::new(CONFIG_DIR).join("tracboard.db")
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardSection {
    /// What to do with an out-of-range move rank
    #[serde(default)]
    pub rank_policy: RankPolicy,
    /// Permission card mutations require; empty disables the check
    #[serde(default = "default_required_permission")]
    pub required_permission: String,
}

fn default_required_permission() -> String {
    "CARDS_ADMIN".to_string()
}

impl Default for BoardSection {
    fn default() -> Self {
        Self {
            rank_policy: RankPolicy::default(),
            required_permission: default_required_permission(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeSection {
    #[serde(default = "default_max_closure_depth")]
    pub max_closure_depth: usize,
}

fn default_max_closure_depth() -> usize {
    DEFAULT_MAX_CLOSURE_DEPTH
}

impl Default for ScopeSection {
    fn default() -> Self {
        Self {
            max_closure_depth: default_max_closure_depth(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3142
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Root of `tracboard.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TracboardConfig {
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub board: BoardSection,
    #[serde(default)]
    pub scope: ScopeSection,
    #[serde(default)]
    pub server: ServerSection,
    /// group -> members
    #[serde(default)]
    pub groups: BTreeMap<String, Vec<String>>,
}

impl TracboardConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse tracboard.toml")
    }

    /// Load `<dir>/tracboard.toml`, or defaults when it doesn't exist.
    pub fn load_or_default(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize tracboard.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// File layer (explicit path, else `.tracboard/` under `project_dir`)
    /// followed by the environment layer.
    pub fn resolve(project_dir: &Path, explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => Self::load_or_default(&project_dir.join(CONFIG_DIR))?,
        };
        config.apply_env()?;
        if config.database.path.is_relative() {
            config.database.path = project_dir.join(&config.database.path);
        }
        Ok(config)
    }

    /// Apply `TRACBOARD_DB`, `TRACBOARD_RANK_POLICY` and `TRACBOARD_PORT`.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("TRACBOARD_DB") {
            self.database.path = PathBuf::from(path);
        }
        if let Ok(policy) = std::env::var("TRACBOARD_RANK_POLICY") {
            self.board.rank_policy = policy
                .parse::<RankPolicy>()
                .map_err(|e: String| anyhow::anyhow!(e))
                .context("TRACBOARD_RANK_POLICY")?;
        }
        if let Ok(port) = std::env::var("TRACBOARD_PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid TRACBOARD_PORT '{}'", port))?;
        }
        Ok(())
    }

    /// Human-readable problems with the configuration.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.scope.max_closure_depth == 0 {
            errors.push("scope.max_closure_depth must be at least 1".to_string());
        }
        let perm = &self.board.required_permission;
        if !perm.is_empty() && !crate::scope::models::is_permission_token(perm) {
            errors.push(format!(
                "board.required_permission '{}' must be an uppercase permission name",
                perm
            ));
        }
        for group in self.groups.keys() {
            if crate::scope::models::is_permission_token(group) {
                errors.push(format!("group '{}' looks like a permission name", group));
            }
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::tempdir;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const ENV_VARS: [&str; 3] = ["TRACBOARD_DB", "TRACBOARD_RANK_POLICY", "TRACBOARD_PORT"];

    fn clear_env() -> Vec<(&'static str, Option<String>)> {
        ENV_VARS
            .iter()
            .map(|name| {
                let saved = std::env::var(name).ok();
                unsafe { std::env::remove_var(name) };
                (*name, saved)
            })
            .collect()
    }

    fn restore_env(saved: Vec<(&'static str, Option<String>)>) {
        for (name, value) in saved {
            match value {
                Some(v) => unsafe { std::env::set_var(name, v) },
                None => unsafe { std::env::remove_var(name) },
            }
        }
    }

    #[test]
    fn test_parse_empty_uses_defaults() {
        let config = TracboardConfig::parse("").unwrap();
        assert_eq!(config.database.path, Path::new(".tracboard/tracboard.db"));
        assert_eq!(config.board.rank_policy, RankPolicy::Reject);
        assert_eq!(config.board.required_permission, "CARDS_ADMIN");
        assert_eq!(config.scope.max_closure_depth, 16);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3142);
        assert!(config.groups.is_empty());
    }

    #[test]
    fn test_parse_all_sections() {
        let content = r#"
[database]
path = "/tmp/board.db"

[board]
rank_policy = "clamp"
required_permission = ""

[scope]
max_closure_depth = 4

[server]
port = 8080

[groups]
dev = ["alice", "bob"]
"#;
        let config = TracboardConfig::parse(content).unwrap();
        assert_eq!(config.database.path, Path::new("/tmp/board.db"));
        assert_eq!(config.board.rank_policy, RankPolicy::Clamp);
        assert!(config.board.required_permission.is_empty());
        assert_eq!(config.scope.max_closure_depth, 4);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.groups["dev"], vec!["alice", "bob"]);
    }

    #[test]
    fn test_parse_rejects_unknown_policy() {
        assert!(TracboardConfig::parse("[board]\nrank_policy = \"wrap\"\n").is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempdir().unwrap();
        let config = TracboardConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(config.server.port, 3142);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let mut config = TracboardConfig::default();
        config.board.rank_policy = RankPolicy::Clamp;
        config
            .groups
            .insert("qa".to_string(), vec!["carol".to_string()]);
        config.save(&path).unwrap();

        let loaded = TracboardConfig::load(&path).unwrap();
        assert_eq!(loaded.board.rank_policy, RankPolicy::Clamp);
        assert_eq!(loaded.groups["qa"], vec!["carol"]);
    }

    #[test]
    fn test_resolve_layers_env_over_file() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let saved = clear_env();

        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(CONFIG_DIR)).unwrap();
        std::fs::write(
            dir.path().join(CONFIG_DIR).join(CONFIG_FILE),
            "[server]\nport = 9000\n[board]\nrank_policy = \"reject\"\n",
        )
        .unwrap();

        let config = TracboardConfig::resolve(dir.path(), None).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(
            config.database.path,
            dir.path().join(".tracboard/tracboard.db")
        );

        unsafe {
            std::env::set_var("TRACBOARD_PORT", "9100");
            std::env::set_var("TRACBOARD_RANK_POLICY", "clamp");
            std::env::set_var("TRACBOARD_DB", "/var/tmp/other.db");
        }
        let config = TracboardConfig::resolve(dir.path(), None).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.board.rank_policy, RankPolicy::Clamp);
        assert_eq!(config.database.path, Path::new("/var/tmp/other.db"));

        unsafe { std::env::set_var("TRACBOARD_PORT", "not-a-port") };
        assert!(TracboardConfig::resolve(dir.path(), None).is_err());

        restore_env(saved);
    }

    #[test]
    fn test_validate() {
        let mut config = TracboardConfig::default();
        assert!(config.validate().is_empty());

        config.scope.max_closure_depth = 0;
        config.board.required_permission = "cards".to_string();
        config
            .groups
            .insert("ADMINS".to_string(), vec!["root".to_string()]);
        assert_eq!(config.validate().len(), 3);
    }
}
