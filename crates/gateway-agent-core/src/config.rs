//! Process-wide configuration, loaded once at startup and read-only afterwards.

use std::{fmt, time::Duration};

use thiserror::Error;

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),
    #[error("Invalid {name} format: only alphanumerics, '-' and '_' are allowed")]
    InvalidName { name: &'static str },
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
    #[error("Parameter {0} could not be resolved: {1}")]
    Parameter(String, String),
}

fn is_safe_name(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

macro_rules! safe_name {
    ($ty:ident, $label:literal) => {
        #[doc = concat!("Validated ", $label, " (`[A-Za-z0-9_-]+`).")]
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $ty(String);

        impl $ty {
            /// Validate and wrap a name.
            ///
            /// # Errors
            /// Returns [`ConfigError::InvalidName`] if the name contains any
            /// other character or is empty.
            pub fn parse(value: impl Into<String>) -> Result<Self, ConfigError> {
                let value = value.into();
                if is_safe_name(&value) {
                    Ok(Self(value))
                } else {
                    Err(ConfigError::InvalidName { name: $label })
                }
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

safe_name!(StackName, "STACK_NAME");
safe_name!(ProviderName, "GATEWAY_CREDENTIAL_PROVIDER_NAME");

impl StackName {
    /// Configuration-store key holding the gateway URL.
    #[must_use]
    pub fn gateway_url_key(&self) -> String {
        format!("/{}/gateway_url", self.0)
    }

    /// Credential provider name used when none is configured.
    #[must_use]
    pub fn default_provider(&self) -> ProviderName {
        ProviderName(format!("{}-runtime-gateway-auth", self.0))
    }
}

/// Runtime configuration shared by every session in the process.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub stack_name: StackName,
    pub memory_id: String,
    pub region: String,
    pub provider_name: ProviderName,
    pub max_attempts: u32,
    pub token_timeout: Duration,
    pub connect_timeout: Duration,
}

impl RuntimeConfig {
    /// Load from process environment.
    ///
    /// # Errors
    /// Returns error if a required variable is missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup.
    ///
    /// # Errors
    /// Returns error if a required variable is missing or invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let stack_name = StackName::parse(get("STACK_NAME").ok_or(ConfigError::Missing("STACK_NAME"))?)?;
        let memory_id = get("MEMORY_ID").ok_or(ConfigError::Missing("MEMORY_ID"))?;
        let region = get("AWS_REGION")
            .or_else(|| get("AWS_DEFAULT_REGION"))
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        let provider_name = match get("GATEWAY_CREDENTIAL_PROVIDER_NAME") {
            Some(name) => ProviderName::parse(name)?,
            None => stack_name.default_provider(),
        };

        let max_attempts = match get("GATEWAY_MAX_ATTEMPTS") {
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|n| *n >= 1)
                .ok_or(ConfigError::InvalidValue {
                    name: "GATEWAY_MAX_ATTEMPTS",
                    value: raw,
                })?,
            None => DEFAULT_MAX_ATTEMPTS,
        };

        Ok(Self {
            stack_name,
            memory_id,
            region,
            provider_name,
            max_attempts,
            token_timeout: millis(get("GATEWAY_TOKEN_TIMEOUT_MS"), "GATEWAY_TOKEN_TIMEOUT_MS")?,
            connect_timeout: millis(get("GATEWAY_CONNECT_TIMEOUT_MS"), "GATEWAY_CONNECT_TIMEOUT_MS")?,
        })
    }
}

fn millis(raw: Option<String>, name: &'static str) -> Result<Duration, ConfigError> {
    raw.map_or(Ok(DEFAULT_TIMEOUT), |raw| {
        raw.parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::InvalidValue { name, value: raw })
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<RuntimeConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        RuntimeConfig::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = load(&[("STACK_NAME", "demo-stack_1"), ("MEMORY_ID", "mem-1")]).unwrap();
        assert_eq!(cfg.region, "us-east-1");
        assert_eq!(cfg.provider_name.as_str(), "demo-stack_1-runtime-gateway-auth");
        assert_eq!(cfg.max_attempts, 2);
        assert_eq!(cfg.token_timeout, DEFAULT_TIMEOUT);
        assert_eq!(cfg.stack_name.gateway_url_key(), "/demo-stack_1/gateway_url");
    }

    #[test]
    fn test_region_precedence() {
        let cfg = load(&[
            ("STACK_NAME", "s"),
            ("MEMORY_ID", "m"),
            ("AWS_DEFAULT_REGION", "eu-west-1"),
            ("AWS_REGION", "ap-south-1"),
        ])
        .unwrap();
        assert_eq!(cfg.region, "ap-south-1");
    }

    #[test]
    fn test_rejects_injection_in_stack_name() {
        let err = load(&[("STACK_NAME", "demo/../x"), ("MEMORY_ID", "m")]).unwrap_err();
        assert_eq!(err, ConfigError::InvalidName { name: "STACK_NAME" });

        let err = load(&[("STACK_NAME", "demo stack"), ("MEMORY_ID", "m")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidName { .. }));
    }

    #[test]
    fn test_missing_required() {
        assert_eq!(load(&[("MEMORY_ID", "m")]).unwrap_err(), ConfigError::Missing("STACK_NAME"));
        assert_eq!(load(&[("STACK_NAME", "s")]).unwrap_err(), ConfigError::Missing("MEMORY_ID"));
    }

    #[test]
    fn test_invalid_attempts() {
        let err = load(&[("STACK_NAME", "s"), ("MEMORY_ID", "m"), ("GATEWAY_MAX_ATTEMPTS", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { name: "GATEWAY_MAX_ATTEMPTS", .. }));
    }

    #[test]
    fn test_explicit_provider_validated() {
        let err = load(&[
            ("STACK_NAME", "s"),
            ("MEMORY_ID", "m"),
            ("GATEWAY_CREDENTIAL_PROVIDER_NAME", "bad;name"),
        ])
        .unwrap_err();
        assert_eq!(err, ConfigError::InvalidName { name: "GATEWAY_CREDENTIAL_PROVIDER_NAME" });
    }
}
