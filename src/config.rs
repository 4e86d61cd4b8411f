use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

/// Server configuration. Loadable from a TOML file; environment variables
/// (`HOST`, `PORT`, `DATA_DIR`, `EPHEMERAL_DB`) override file values.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Explicit database path. Defaults to `<data_dir>/ephemeral.db`.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    /// Public base URL for external access (e.g. "https://git.example.com").
    /// Used for LFS action URLs. When unset, URLs derive from request headers.
    #[serde(default)]
    pub public_base_url: Option<String>,
    /// Per-object LFS size cap in bytes. NULL = unlimited.
    #[serde(default)]
    pub lfs_max_file_size: Option<i64>,
}

impl ServerConfig {
    const SEARCH_PATHS: &'static [&'static str] = &["./ephemeral.toml", "/etc/ephemeral/server.toml"];

    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("ephemeral.db"))
    }

    pub fn load_file(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    fn load_from_search_paths() -> Option<Self> {
        Self::SEARCH_PATHS
            .iter()
            .map(Path::new)
            .filter(|p| p.exists())
            .find_map(|p| Self::load_file(p).ok())
    }

    /// File (if any) layered under environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::load_from_search_paths().unwrap_or_default();

        if let Ok(host) = env::var("HOST") {
            config.host = host;
        }
        if let Ok(port) = env::var("PORT") {
            config.port = port
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid PORT: {port}"))?;
        }
        if let Ok(data_dir) = env::var("DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }
        if let Ok(db) = env::var("EPHEMERAL_DB") {
            config.db_path = Some(PathBuf::from(db));
        }

        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            db_path: None,
            public_base_url: None,
            lfs_max_file_size: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.db_path(), PathBuf::from("./data/ephemeral.db"));
    }

    #[test]
    fn toml_overrides_defaults() {
        let config: ServerConfig =
            toml::from_str("host = \"0.0.0.0\"\nport = 9000\nlfs_max_file_size = 1024").unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.lfs_max_file_size, Some(1024));
        assert_eq!(config.data_dir, PathBuf::from("./data"));
    }
}
