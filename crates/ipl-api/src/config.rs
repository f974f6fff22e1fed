//! Service configuration from environment key/values
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use ipl_core::DEFAULT_MAX_WARNINGS;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8787;
pub const DEFAULT_SHARE_ROOT: &str = "/mnt/smb";
pub const DEFAULT_PLATFORM_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub bind_addr: SocketAddr,
    /// Where `<server>/<share>` mounts live
    pub share_root: PathBuf,
    pub platform_timeout_ms: u64,
    pub max_warnings: usize,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct StartupError {
    pub code: &'static str,
    pub message: String,
}

impl StartupError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            code: "ERR_INVALID_CONFIG",
            message: message.into(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            share_root: PathBuf::from(DEFAULT_SHARE_ROOT),
            platform_timeout_ms: DEFAULT_PLATFORM_TIMEOUT_MS,
            max_warnings: DEFAULT_MAX_WARNINGS,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, StartupError> {
        let kv: HashMap<String, String> = std::env::vars().collect();
        Self::from_kv(&kv)
    }

    pub fn from_kv(kv: &HashMap<String, String>) -> Result<Self, StartupError> {
        let defaults = Self::default();

        let bind_addr = match non_empty(kv, "IPL_BIND_ADDR") {
            None => defaults.bind_addr,
            Some(v) => v.parse::<SocketAddr>().map_err(|_| {
                StartupError::invalid("IPL_BIND_ADDR must be a valid host:port socket address")
            })?,
        };

        let share_root = non_empty(kv, "IPL_SHARE_ROOT")
            .map(PathBuf::from)
            .unwrap_or(defaults.share_root);

        let platform_timeout_ms = parse_number(
            kv,
            "IPL_PLATFORM_TIMEOUT_MS",
            defaults.platform_timeout_ms,
        )?;
        if platform_timeout_ms == 0 {
            return Err(StartupError::invalid("IPL_PLATFORM_TIMEOUT_MS must be >= 1"));
        }

        let max_warnings = parse_number(kv, "IPL_MAX_WARNINGS", defaults.max_warnings)?;
        if max_warnings == 0 {
            return Err(StartupError::invalid("IPL_MAX_WARNINGS must be >= 1"));
        }

        Ok(Self {
            bind_addr,
            share_root,
            platform_timeout_ms,
            max_warnings,
        })
    }

    pub fn platform_timeout(&self) -> Duration {
        Duration::from_millis(self.platform_timeout_ms)
    }
}

fn non_empty<'a>(kv: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    kv.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn parse_number<T: std::str::FromStr>(
    kv: &HashMap<String, String>,
    key: &'static str,
    default: T,
) -> Result<T, StartupError> {
    match non_empty(kv, key) {
        None => Ok(default),
        Some(v) => v
            .parse::<T>()
            .map_err(|_| StartupError::invalid(format!("{} must be an integer", key))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::from_kv(&HashMap::new()).unwrap();
        assert_eq!(config, ServiceConfig::default());
        assert_eq!(config.bind_addr.to_string(), "0.0.0.0:8787");
        assert_eq!(config.platform_timeout(), Duration::from_secs(30));
        assert_eq!(config.max_warnings, 100);
    }

    #[test]
    fn test_overrides() {
        let config = ServiceConfig::from_kv(&env(&[
            ("IPL_BIND_ADDR", "127.0.0.1:9000"),
            ("IPL_SHARE_ROOT", "/srv/shares"),
            ("IPL_PLATFORM_TIMEOUT_MS", "500"),
            ("IPL_MAX_WARNINGS", " 7 "),
        ]))
        .unwrap();

        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.share_root, PathBuf::from("/srv/shares"));
        assert_eq!(config.platform_timeout_ms, 500);
        assert_eq!(config.max_warnings, 7);
    }

    #[test]
    fn test_invalid_values_fail() {
        let err = ServiceConfig::from_kv(&env(&[("IPL_BIND_ADDR", "nowhere")])).unwrap_err();
        assert_eq!(err.code, "ERR_INVALID_CONFIG");

        let err = ServiceConfig::from_kv(&env(&[("IPL_MAX_WARNINGS", "0")])).unwrap_err();
        assert!(err.message.contains("IPL_MAX_WARNINGS"));

        let err = ServiceConfig::from_kv(&env(&[("IPL_PLATFORM_TIMEOUT_MS", "soon")])).unwrap_err();
        assert_eq!(err.to_string(), "ERR_INVALID_CONFIG: IPL_PLATFORM_TIMEOUT_MS must be an integer");
    }
}
