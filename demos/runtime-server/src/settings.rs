//! Gateway client settings read from the environment.

use std::time::Duration;

use anyhow::{Context, anyhow};
use secrecy::SecretString;
use url::Url;

/// Where and how to reach the gateway and its token endpoint.
pub struct GatewaySettings {
    /// Published gateway URL. Sessions fail with a configuration error when absent.
    pub gateway_url: Option<String>,
    pub token_url: Url,
    pub client_id: String,
    pub client_secret: SecretString,
    pub scopes: Vec<String>,
    pub request_timeout: Option<Duration>,
}

impl GatewaySettings {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let require = |key: &'static str| get(key).ok_or_else(|| anyhow!("{key} is not set"));

        let token_url = require("GATEWAY_TOKEN_URL")?;
        let token_url = Url::parse(&token_url).with_context(|| format!("invalid GATEWAY_TOKEN_URL: {token_url}"))?;

        let scopes = get("GATEWAY_SCOPES")
            .map(|raw| {
                raw.split([',', ' '])
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let request_timeout = get("GATEWAY_REQUEST_TIMEOUT_MS")
            .map(|raw| {
                raw.parse::<u64>()
                    .map(Duration::from_millis)
                    .with_context(|| format!("invalid GATEWAY_REQUEST_TIMEOUT_MS: {raw}"))
            })
            .transpose()?;

        Ok(Self {
            gateway_url: get("GATEWAY_URL"),
            token_url,
            client_id: require("GATEWAY_CLIENT_ID")?,
            client_secret: SecretString::from(require("GATEWAY_CLIENT_SECRET")?),
            scopes,
            request_timeout,
        })
    }
}
