//! Process configuration read from the environment at startup.
//!
//! The auth secret and database credentials are collaborator-level inputs:
//! a missing value does not stop the server, it deterministically fails
//! every tool call that depends on it, with a message naming the missing
//! variable(s).

use crate::error::ToolError;

/// Variables the database gateway requires.
const REQUIRED_DB_VARS: [&str; 5] = ["DB_HOST", "DB_PORT", "DB_USERNAME", "DB_PASSWORD", "DB_NAME"];

/// Shared secret expected by `auth_login`.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub secret: Option<String>,
}

impl AuthConfig {
    pub fn from_env() -> Self {
        Self {
            secret: std::env::var("AUTH_SECRET").ok().filter(|s| !s.is_empty()),
        }
    }
}

/// PostgreSQL connection settings.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
}

impl DbConfig {
    pub fn from_env() -> Result<Self, ToolError> {
        Self::from_lookup(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
    }

    /// Build from an arbitrary lookup. Missing variables are reported
    /// together in one message rather than one at a time.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ToolError> {
        let missing: Vec<&str> = REQUIRED_DB_VARS
            .iter()
            .copied()
            .filter(|var| lookup(var).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(ToolError::MissingConfig(format!(
                "environment variables not set: {}",
                missing.join(", ")
            )));
        }

        let port_raw = lookup("DB_PORT").unwrap_or_default();
        let port: u16 = port_raw
            .parse()
            .map_err(|_| ToolError::MissingConfig(format!("DB_PORT is not a valid port: {port_raw}")))?;

        Ok(Self {
            host: lookup("DB_HOST").unwrap_or_default(),
            port,
            user: lookup("DB_USERNAME").unwrap_or_default(),
            password: lookup("DB_PASSWORD").unwrap_or_default(),
            dbname: lookup("DB_NAME").unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn full_vars() -> HashMap<String, String> {
        vars(&[
            ("DB_HOST", "db.example.com"),
            ("DB_PORT", "5432"),
            ("DB_USERNAME", "app"),
            ("DB_PASSWORD", "secret"),
            ("DB_NAME", "homologacion"),
        ])
    }

    #[test]
    fn complete_config_parses() {
        let env = full_vars();
        let config = DbConfig::from_lookup(|k| env.get(k).cloned()).expect("should parse");
        assert_eq!(config.host, "db.example.com");
        assert_eq!(config.port, 5432);
        assert_eq!(config.dbname, "homologacion");
    }

    #[test]
    fn missing_variables_are_reported_together() {
        let mut env = full_vars();
        env.remove("DB_HOST");
        env.remove("DB_PASSWORD");
        let err = DbConfig::from_lookup(|k| env.get(k).cloned()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("DB_HOST"));
        assert!(message.contains("DB_PASSWORD"));
        assert!(!message.contains("DB_NAME"));
    }

    #[test]
    fn non_numeric_port_is_rejected() {
        let mut env = full_vars();
        env.insert("DB_PORT".to_string(), "not-a-port".to_string());
        let err = DbConfig::from_lookup(|k| env.get(k).cloned()).unwrap_err();
        assert!(err.to_string().contains("DB_PORT"));
    }
}
