//! Short-lived gateway credentials and the gateway location.

use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::OnceCell;
use url::Url;

use crate::{
    ConfigError, ProviderName, StackName,
    traits::{ParameterStore, StoreError, TokenError, TokenExchange},
};

/// Short-lived bearer token for the tool gateway.
///
/// Not `Clone`: one credential per connection attempt.
pub struct Credential(SecretString);

impl Credential {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    /// The raw token, for building the Authorization header.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential([REDACTED])")
    }
}

/// Supplies a fresh credential on every call. Never caches.
#[derive(Clone)]
pub struct TokenSupplier {
    exchange: Arc<dyn TokenExchange>,
    provider: ProviderName,
    timeout: Duration,
}

impl TokenSupplier {
    #[must_use]
    pub fn new(exchange: Arc<dyn TokenExchange>, provider: ProviderName, timeout: Duration) -> Self {
        Self {
            exchange,
            provider,
            timeout,
        }
    }

    /// Provider the tokens are fetched for.
    #[must_use]
    pub const fn provider(&self) -> &ProviderName {
        &self.provider
    }

    /// Fetch a credential for immediate use.
    ///
    /// # Errors
    /// Returns [`TokenError`] if the exchange fails or exceeds the timeout.
    pub async fn fetch(&self) -> Result<Credential, TokenError> {
        tracing::debug!(provider = %self.provider, "Fetching gateway access token");
        tokio::time::timeout(self.timeout, self.exchange.fetch_token(&self.provider))
            .await
            .map_err(|_| TokenError::TimedOut(self.timeout))?
    }
}

/// Network location of the tool gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayLocation(Url);

impl GatewayLocation {
    /// Parse a gateway URL.
    ///
    /// # Errors
    /// Returns error if the value is not an absolute http(s) URL.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidValue {
            name: "gateway_url",
            value: raw.to_string(),
        };
        let url = Url::parse(raw.trim()).map_err(|_| invalid())?;
        if matches!(url.scheme(), "http" | "https") {
            Ok(Self(url))
        } else {
            Err(invalid())
        }
    }

    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.0
    }
}

impl fmt::Display for GatewayLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Resolves the gateway URL once per process; the location is stable across reconnects.
pub struct GatewayLocator {
    store: Arc<dyn ParameterStore>,
    stack: StackName,
    resolved: OnceCell<GatewayLocation>,
}

impl GatewayLocator {
    #[must_use]
    pub fn new(store: Arc<dyn ParameterStore>, stack: StackName) -> Self {
        Self {
            store,
            stack,
            resolved: OnceCell::new(),
        }
    }

    /// Resolve `/<stack>/gateway_url`, hitting the store only on first success.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the parameter is missing or not a URL.
    pub async fn resolve(&self) -> Result<&GatewayLocation, ConfigError> {
        self.resolved
            .get_or_try_init(|| async {
                let key = self.stack.gateway_url_key();
                let raw = self
                    .store
                    .get_parameter(&key)
                    .await
                    .map_err(|e| ConfigError::Parameter(key.clone(), e.to_string()))?;
                let location = GatewayLocation::parse(&raw)?;
                tracing::info!(stack = %self.stack, gateway_url = %location, "Resolved gateway URL");
                Ok::<_, ConfigError>(location)
            })
            .await
    }
}

/// In-memory parameter store.
#[derive(Debug, Clone, Default)]
pub struct StaticParameterStore {
    values: HashMap<String, String>,
}

impl StaticParameterStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

#[async_trait]
impl ParameterStore for StaticParameterStore {
    async fn get_parameter(&self, key: &str) -> Result<String, StoreError> {
        self.values
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }
}
