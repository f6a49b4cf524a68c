// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment once at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `DATA_DIR` | Directory holding the identity database | `./data` |
//! | `AUTH_PRIVATE_KEY_PATH` | PEM P-256 private key used to sign tokens | `private.pem` |
//! | `AUTH_KEY_ALLOWED_DIRS` | Comma-separated directories the key may live in | current directory |
//! | `LINE_CLIENT_ID` | LINE channel ID | Optional |
//! | `LINE_CLIENT_SECRET` | LINE channel secret | Optional |
//! | `LINE_CALLBACK_URL` | Redirect URI registered with LINE | Optional |
//! | `LINE_FE_CALLBACK_URL` | Front-end URL receiving `?token=` after login | Optional |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::path::PathBuf;

use crate::oauth::LineConfig;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const PRIVATE_KEY_PATH_ENV: &str = "AUTH_PRIVATE_KEY_PATH";
pub const KEY_ALLOWED_DIRS_ENV: &str = "AUTH_KEY_ALLOWED_DIRS";
pub const LINE_CLIENT_ID_ENV: &str = "LINE_CLIENT_ID";
pub const LINE_CLIENT_SECRET_ENV: &str = "LINE_CLIENT_SECRET";
pub const LINE_CALLBACK_URL_ENV: &str = "LINE_CALLBACK_URL";
pub const LINE_FE_CALLBACK_URL_ENV: &str = "LINE_FE_CALLBACK_URL";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_PRIVATE_KEY_PATH: &str = "private.pem";

/// Default `RUST_LOG` filter.
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("PORT must be a port number, got '{0}'")]
    InvalidPort(String),

    #[error("failed to determine current directory: {0}")]
    CurrentDir(#[source] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    /// `json` selects JSON lines; anything else is pretty.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }

    /// Read `LOG_FORMAT` alone, before the rest of the configuration.
    pub fn from_env() -> Self {
        Self::parse(std::env::var(LOG_FORMAT_ENV).ok().as_deref())
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub private_key_path: PathBuf,
    pub key_allowed_dirs: Vec<PathBuf>,
    /// Set only when all three LINE variables are present
    pub line: Option<LineConfig>,
    /// Callback redirects here with `?token=`; JSON response when unset
    pub frontend_callback_url: Option<String>,
    pub log_format: LogFormat,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match get(PORT_ENV) {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidPort(raw))?,
            None => DEFAULT_PORT,
        };

        let key_allowed_dirs = match get(KEY_ALLOWED_DIRS_ENV) {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from)
                .collect(),
            None => vec![std::env::current_dir().map_err(ConfigError::CurrentDir)?],
        };

        let line = match (
            get(LINE_CLIENT_ID_ENV),
            get(LINE_CLIENT_SECRET_ENV),
            get(LINE_CALLBACK_URL_ENV),
        ) {
            (Some(client_id), Some(client_secret), Some(callback_url)) => Some(LineConfig {
                client_id,
                client_secret,
                callback_url,
            }),
            (None, None, None) => None,
            _ => {
                tracing::warn!("LINE login is partially configured and stays disabled");
                None
            }
        };

        let log_format = LogFormat::parse(get(LOG_FORMAT_ENV).as_deref());

        Ok(Self {
            host: get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            data_dir: PathBuf::from(get(DATA_DIR_ENV).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string())),
            private_key_path: PathBuf::from(
                get(PRIVATE_KEY_PATH_ENV).unwrap_or_else(|| DEFAULT_PRIVATE_KEY_PATH.to_string()),
            ),
            key_allowed_dirs,
            line,
            frontend_callback_url: get(LINE_FE_CALLBACK_URL_ENV),
            log_format,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.private_key_path, PathBuf::from("private.pem"));
        assert_eq!(config.key_allowed_dirs.len(), 1);
        assert!(config.line.is_none());
        assert!(config.frontend_callback_url.is_none());
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn reads_overrides() {
        let config = config_from(&[
            ("PORT", "9000"),
            ("AUTH_KEY_ALLOWED_DIRS", "/etc/keys, /run/secrets,"),
            ("LOG_FORMAT", "json"),
            ("LINE_FE_CALLBACK_URL", "https://app.example.com/callback"),
        ])
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(
            config.key_allowed_dirs,
            vec![PathBuf::from("/etc/keys"), PathBuf::from("/run/secrets")]
        );
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.frontend_callback_url.as_deref(),
            Some("https://app.example.com/callback")
        );
    }

    #[test]
    fn line_requires_all_three_variables() {
        let partial = config_from(&[("LINE_CLIENT_ID", "id"), ("LINE_CLIENT_SECRET", "secret")]).unwrap();
        assert!(partial.line.is_none());

        let full = config_from(&[
            ("LINE_CLIENT_ID", "id"),
            ("LINE_CLIENT_SECRET", "secret"),
            ("LINE_CALLBACK_URL", "http://localhost:8080/auth/line/callback"),
        ])
        .unwrap();
        assert_eq!(full.line.unwrap().client_id, "id");
    }

    #[test]
    fn invalid_port_is_an_error() {
        assert!(matches!(
            config_from(&[("PORT", "eighty")]),
            Err(ConfigError::InvalidPort(_))
        ));
    }
}
