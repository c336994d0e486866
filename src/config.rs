use std::{path::PathBuf, str::FromStr};

use anyhow::Context;
use serde::Deserialize;

pub const DEFAULT_MAX_PHOTO_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Tabular file holding one row per user.
    pub data_file: PathBuf,
    /// Directory holding profile photos.
    pub upload_dir: PathBuf,
    pub max_photo_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Unset keys take their default;
    /// a set but malformed number is an error.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        Ok(Self {
            host: var("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&var, "APP_PORT", 8080)?,
            data_file: var("DATA_FILE")
                .unwrap_or_else(|| "data/users.csv".into())
                .into(),
            upload_dir: var("UPLOAD_DIR").unwrap_or_else(|| "uploads".into()).into(),
            max_photo_bytes: parse_or(&var, "MAX_PHOTO_BYTES", DEFAULT_MAX_PHOTO_BYTES)?,
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid {key}: {raw:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod config_tests {
    use std::collections::HashMap;

    use super::*;

    fn config(pairs: &[(&str, &str)]) -> anyhow::Result<AppConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.listen_addr(), "0.0.0.0:8080");
        assert_eq!(cfg.data_file, PathBuf::from("data/users.csv"));
        assert_eq!(cfg.upload_dir, PathBuf::from("uploads"));
        assert_eq!(cfg.max_photo_bytes, DEFAULT_MAX_PHOTO_BYTES);
    }

    #[test]
    fn explicit_values_are_used() {
        let cfg = config(&[("APP_PORT", "9000"), ("MAX_PHOTO_BYTES", "1024")]).unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.max_photo_bytes, 1024);
    }

    #[test]
    fn malformed_numbers_are_errors() {
        let err = config(&[("APP_PORT", "http")]).unwrap_err();
        assert!(err.to_string().contains("APP_PORT"), "{err}");

        let err = config(&[("MAX_PHOTO_BYTES", "5MB")]).unwrap_err();
        assert!(err.to_string().contains("MAX_PHOTO_BYTES"), "{err}");
    }
}
