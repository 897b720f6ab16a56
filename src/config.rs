use std::{net::SocketAddr, path::PathBuf};

use crate::error::{Error, Result};

/// Runtime configuration of the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// SQLite file holding the roster, the ledger and past rounds
    pub database_path: PathBuf,
    /// Address the HTTP server listens on
    pub bind_addr: SocketAddr,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("donuts.sqlite"),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
        }
    }
}

impl Config {
    /// Defaults overridden by `DONUTS_DATABASE` and `DONUTS_ADDR`.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Config::default();
        if let Some(path) = var("DONUTS_DATABASE") {
            config.database_path = PathBuf::from(path);
        }
        if let Some(addr) = var("DONUTS_ADDR") {
            config.bind_addr = addr
                .parse()
                .map_err(|e| Error::Config(format!("DONUTS_ADDR={addr:?}: {e}")))?;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_variables() {
        let config = Config::from_vars(|_| None).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn variables_override_defaults() {
        let config = Config::from_vars(|key| match key {
            "DONUTS_DATABASE" => Some("/tmp/rounds.sqlite".to_owned()),
            "DONUTS_ADDR" => Some("127.0.0.1:8080".to_owned()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.database_path, PathBuf::from("/tmp/rounds.sqlite"));
        assert_eq!(config.bind_addr.port(), 8080);
    }

    #[test]
    fn bad_address_is_a_config_error() {
        let err = Config::from_vars(|key| (key == "DONUTS_ADDR").then(|| "nowhere".to_owned()))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
