//! Runtime settings from the environment.

use crate::config::validate_identifier;
use crate::error::ConfigError;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Storage {
    Postgres,
    Memory,
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub database_url: Option<String>,
    pub bind_addr: SocketAddr,
    /// Overrides the schema named in the entity model.
    pub schema: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub storage: Storage,
    pub entity_config: Option<PathBuf>,
    pub max_body_bytes: usize,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let storage = match var("STORAGE").as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("postgres") => Storage::Postgres,
            Some("memory") => Storage::Memory,
            Some(other) => {
                return Err(ConfigError::Env {
                    name: "STORAGE",
                    reason: format!("expected 'postgres' or 'memory', got '{}'", other),
                })
            }
        };
        let database_url = var("DATABASE_URL");
        if storage == Storage::Postgres && database_url.is_none() {
            return Err(ConfigError::Env {
                name: "DATABASE_URL",
                reason: "required when STORAGE=postgres".into(),
            });
        }

        let schema = var("DB_SCHEMA");
        if let Some(name) = &schema {
            validate_identifier(name).map_err(|e| ConfigError::Env {
                name: "DB_SCHEMA",
                reason: e.to_string(),
            })?;
        }

        Ok(Settings {
            database_url,
            bind_addr: parsed(&lookup, "BIND_ADDR", "0.0.0.0:3000".parse().ok())?,
            schema,
            max_connections: parsed(&lookup, "DB_MAX_CONNECTIONS", Some(5))?,
            acquire_timeout: Duration::from_secs(parsed(&lookup, "DB_ACQUIRE_TIMEOUT_SECS", Some(5))?),
            storage,
            entity_config: var("ENTITY_CONFIG").map(PathBuf::from),
            max_body_bytes: parsed(&lookup, "MAX_BODY_BYTES", Some(1024 * 1024))?,
        })
    }
}

fn parsed<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: Option<T>,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Env {
            name,
            reason: e.to_string(),
        }),
        None => default.ok_or_else(|| ConfigError::Env {
            name,
            reason: "not set".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let env: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Settings::from_lookup(|name| env.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let s = settings(&[("DATABASE_URL", "postgres://localhost/assets")]).unwrap();
        assert_eq!(s.storage, Storage::Postgres);
        assert_eq!(s.bind_addr.port(), 3000);
        assert_eq!(s.max_connections, 5);
        assert_eq!(s.acquire_timeout, Duration::from_secs(5));
        assert_eq!(s.max_body_bytes, 1024 * 1024);
        assert!(s.schema.is_none());
    }

    #[test]
    fn memory_needs_no_database() {
        let s = settings(&[("STORAGE", "memory"), ("DB_SCHEMA", "inventory")]).unwrap();
        assert_eq!(s.storage, Storage::Memory);
        assert_eq!(s.schema.as_deref(), Some("inventory"));
    }

    #[test]
    fn invalid_values() {
        assert!(settings(&[]).is_err());
        assert!(settings(&[("STORAGE", "redis")]).is_err());
        let err = settings(&[("STORAGE", "memory"), ("DB_SCHEMA", "Asset Data")]).unwrap_err();
        assert!(err.to_string().contains("DB_SCHEMA"));
        let err = settings(&[("STORAGE", "memory"), ("DB_MAX_CONNECTIONS", "many")]).unwrap_err();
        assert!(err.to_string().contains("DB_MAX_CONNECTIONS"));
    }
}
