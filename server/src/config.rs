//! Environment-backed server configuration. Invalid configuration is a
//! distinct failure class so the launcher can exit with code 2.

use std::env;
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("invalid configuration: {0}")]
pub struct ConfigError(pub String);

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// path of the SQLite database file
    pub database_path: String,
    /// bind address of the HTTP listener
    pub listen_addr: SocketAddr,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_path = env::var("DATABASE_PATH")
            .map_err(|_| ConfigError("DATABASE_PATH must be set".into()))?;
        if database_path.trim().is_empty() {
            return Err(ConfigError("DATABASE_PATH must not be empty".into()));
        }

        let listen_addr = env::var("LISTEN_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".into());
        let listen_addr: SocketAddr = listen_addr
            .parse()
            .map_err(|e| ConfigError(format!("LISTEN_ADDR is not a socket address: {e}")))?;

        Ok(ServerConfig {
            database_path,
            listen_addr,
        })
    }
}
