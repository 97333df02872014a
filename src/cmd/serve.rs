use anyhow::Result;
use tracboard::config::TracboardConfig;
use tracboard::server::{ServerConfig, start_server};

/// CLI flags win over `[server]` in the config.
pub async fn cmd_serve(
    config: &TracboardConfig,
    port: Option<u16>,
    host: Option<String>,
    dev: bool,
) -> Result<()> {
    let server_config = ServerConfig {
        host: host.unwrap_or_else(|| config.server.host.clone()),
        port: port.unwrap_or(config.server.port),
        dev_mode: dev,
    };
    start_server(server_config, config).await
}
