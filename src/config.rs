//! Startup configuration from environment variables
//!
//! Anything required that is missing or malformed is a [`ConfigError`] and
//! aborts startup; there is no degraded mode.

use crate::bot::BotSettings;
use std::path::PathBuf;
use thiserror::Error;

const DEFAULT_PORT: u16 = 3978;
const DEFAULT_BOT_NAME: &str = "Niles";
const DEFAULT_TRUSTED_SENDERS: &str = "probot";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Which recognizer backs intent classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizerConfig {
    /// Built-in regex rules
    Keywords,
    /// External NLU endpoint
    Http {
        endpoint: String,
        api_key: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotConfig {
    pub db_path: PathBuf,
    pub port: u16,
    pub bot_name: String,
    pub issue_webhook_url: String,
    pub trusted_senders: Vec<String>,
    pub recognizer: RecognizerConfig,
    /// Bearer token for proactive delivery
    pub connector_token: Option<String>,
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; blank values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let db_path = var("NILES_DB_PATH").map_or_else(
            || {
                let home = var("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".niles").join("niles.db")
            },
            PathBuf::from,
        );

        let port = match var("NILES_PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                name: "NILES_PORT",
                value: raw,
                reason: "expected a port number",
            })?,
            None => DEFAULT_PORT,
        };

        let issue_webhook_url =
            var("NILES_ISSUE_WEBHOOK_URL").ok_or(ConfigError::Missing("NILES_ISSUE_WEBHOOK_URL"))?;
        if !(issue_webhook_url.starts_with("https://") || issue_webhook_url.starts_with("http://"))
        {
            return Err(ConfigError::Invalid {
                name: "NILES_ISSUE_WEBHOOK_URL",
                value: issue_webhook_url,
                reason: "expected an http(s) URL",
            });
        }

        let trusted_senders: Vec<String> = var("NILES_TRUSTED_SENDERS")
            .unwrap_or_else(|| DEFAULT_TRUSTED_SENDERS.to_string())
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        let recognizer = match var("NILES_RECOGNIZER").as_deref() {
            None | Some("keywords") => RecognizerConfig::Keywords,
            Some("http") => RecognizerConfig::Http {
                endpoint: var("NILES_RECOGNIZER_URL")
                    .ok_or(ConfigError::Missing("NILES_RECOGNIZER_URL"))?,
                api_key: var("NILES_RECOGNIZER_KEY"),
            },
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "NILES_RECOGNIZER",
                    value: other.to_string(),
                    reason: "expected \"keywords\" or \"http\"",
                })
            }
        };

        Ok(Self {
            db_path,
            port,
            bot_name: var("NILES_BOT_NAME").unwrap_or_else(|| DEFAULT_BOT_NAME.to_string()),
            issue_webhook_url,
            trusted_senders,
            recognizer,
            connector_token: var("NILES_CONNECTOR_TOKEN"),
        })
    }

    pub fn bot_settings(&self) -> BotSettings {
        BotSettings {
            bot_name: self.bot_name.clone(),
            trusted_senders: self.trusted_senders.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<BotConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        BotConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[
            ("HOME", "/home/niles"),
            ("NILES_ISSUE_WEBHOOK_URL", "https://hooks.example/issues"),
        ])
        .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/home/niles/.niles/niles.db"));
        assert_eq!(config.port, 3978);
        assert_eq!(config.bot_name, "Niles");
        assert_eq!(config.trusted_senders, vec!["probot"]);
        assert_eq!(config.recognizer, RecognizerConfig::Keywords);
        assert_eq!(config.connector_token, None);
    }

    #[test]
    fn test_webhook_is_required() {
        assert_eq!(
            config(&[]).unwrap_err(),
            ConfigError::Missing("NILES_ISSUE_WEBHOOK_URL")
        );
        assert_eq!(
            config(&[("NILES_ISSUE_WEBHOOK_URL", "   ")]).unwrap_err(),
            ConfigError::Missing("NILES_ISSUE_WEBHOOK_URL")
        );
        assert!(matches!(
            config(&[("NILES_ISSUE_WEBHOOK_URL", "ftp://nope")]),
            Err(ConfigError::Invalid {
                name: "NILES_ISSUE_WEBHOOK_URL",
                ..
            })
        ));
    }

    #[test]
    fn test_http_recognizer_requires_endpoint() {
        let base = ("NILES_ISSUE_WEBHOOK_URL", "http://localhost:9000/hook");
        assert_eq!(
            config(&[base, ("NILES_RECOGNIZER", "http")]).unwrap_err(),
            ConfigError::Missing("NILES_RECOGNIZER_URL")
        );

        let config = config(&[
            base,
            ("NILES_RECOGNIZER", "http"),
            ("NILES_RECOGNIZER_URL", "https://nlu.example/apps/1"),
            ("NILES_RECOGNIZER_KEY", "secret"),
        ])
        .unwrap();
        assert_eq!(
            config.recognizer,
            RecognizerConfig::Http {
                endpoint: "https://nlu.example/apps/1".into(),
                api_key: Some("secret".into()),
            }
        );
    }

    #[test]
    fn test_invalid_values() {
        let base = ("NILES_ISSUE_WEBHOOK_URL", "https://hooks.example/issues");
        assert!(matches!(
            config(&[base, ("NILES_PORT", "eighty")]),
            Err(ConfigError::Invalid {
                name: "NILES_PORT",
                ..
            })
        ));
        assert!(matches!(
            config(&[base, ("NILES_RECOGNIZER", "magic")]),
            Err(ConfigError::Invalid {
                name: "NILES_RECOGNIZER",
                ..
            })
        ));
    }

    #[test]
    fn test_trusted_senders_list() {
        let config = config(&[
            ("NILES_ISSUE_WEBHOOK_URL", "https://hooks.example/issues"),
            ("NILES_TRUSTED_SENDERS", "probot, ci-bot ,,"),
            ("NILES_PORT", "8080"),
        ])
        .unwrap();
        assert_eq!(config.trusted_senders, vec!["probot", "ci-bot"]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.bot_settings().trusted_senders.len(), 2);
    }
}
