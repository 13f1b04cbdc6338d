//! Server configuration.
//!
//! Defaults come from [`constants`](crate::constants). A TOML file can
//! override any subset of fields:
//!
//! ```toml
//! bind_address = "0.0.0.0"
//! port = 5099
//! service_name = "fileService"
//! push_queue_depth = 256
//! reply_queue_depth = 256
//! ```

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::constants::{
    DEFAULT_BIND_ADDRESS, DEFAULT_MAX_FRAME_LENGTH, DEFAULT_PORT, DEFAULT_PUSH_QUEUE_DEPTH,
    DEFAULT_REPLY_QUEUE_DEPTH,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read { path: String, source: io::Error },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("invalid bind address {0:?}")]
    BindAddress(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Name clients must look up before making file calls.
    pub service_name: String,
    pub push_queue_depth: usize,
    pub reply_queue_depth: usize,
    pub max_frame_length: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            port: DEFAULT_PORT,
            service_name: shoko_types::SERVICE_NAME.to_string(),
            push_queue_depth: DEFAULT_PUSH_QUEUE_DEPTH,
            reply_queue_depth: DEFAULT_REPLY_QUEUE_DEPTH,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
        }
    }
}

impl ServerConfig {
    /// Config for tests: localhost, OS-assigned port.
    pub fn ephemeral() -> Self {
        Self {
            port: 0,
            ..Self::default()
        }
    }

    /// Load a TOML file; fields it omits keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;
        if self.push_queue_depth == 0 {
            return Err(ConfigError::Zero("push_queue_depth"));
        }
        if self.reply_queue_depth == 0 {
            return Err(ConfigError::Zero("reply_queue_depth"));
        }
        if self.max_frame_length == 0 {
            return Err(ConfigError::Zero("max_frame_length"));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .bind_address
            .parse()
            .map_err(|_| ConfigError::BindAddress(self.bind_address.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 5099);
        assert_eq!(config.service_name, "fileService");
        assert_eq!(config.socket_addr().unwrap().to_string(), "127.0.0.1:5099");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port = 6000\nbind_address = \"0.0.0.0\"").unwrap();

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.port, 6000);
        assert_eq!(config.bind_address, "0.0.0.0");
        assert_eq!(config.service_name, "fileService");
        assert_eq!(config.push_queue_depth, DEFAULT_PUSH_QUEUE_DEPTH);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "prot = 6000").unwrap();
        assert!(matches!(
            ServerConfig::from_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            ServerConfig::from_file("/nonexistent/shoko.toml"),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_validation() {
        let config = ServerConfig {
            bind_address: "localhost".into(),
            ..ServerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::BindAddress(_))));

        let config = ServerConfig {
            push_queue_depth: 0,
            ..ServerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Zero("push_queue_depth"))));

        let config = ServerConfig {
            reply_queue_depth: 0,
            ..ServerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Zero("reply_queue_depth"))));
    }
}
