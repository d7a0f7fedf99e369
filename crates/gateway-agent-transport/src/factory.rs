//! Per-attempt transport construction.

use std::{sync::Arc, time::Duration};

use gateway_agent_core::{
    Credential, GatewayLocation,
    traits::{ToolTransport, TransportError, TransportFactory},
};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};

use crate::StreamableHttpTransport;

/// Builds a fresh [`StreamableHttpTransport`] for every connection attempt.
///
/// Each transport gets its own `reqwest::Client`, so no pooled connection or
/// credential survives from one attempt to the next.
#[derive(Debug, Clone, Default)]
pub struct HttpTransportFactory {
    request_timeout: Option<Duration>,
}

impl HttpTransportFactory {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            request_timeout: None,
        }
    }

    /// Bound every individual gateway request.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}

impl TransportFactory for HttpTransportFactory {
    fn create(
        &self,
        location: &GatewayLocation,
        credential: Credential,
    ) -> Result<Arc<dyn ToolTransport>, TransportError> {
        let mut auth = HeaderValue::try_from(format!("Bearer {}", credential.expose()))
            .map_err(|_| TransportError::Config("credential is not a valid header value".to_string()))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| TransportError::Config(e.to_string()))?;

        Ok(Arc::new(StreamableHttpTransport::new(http, location.url().clone())))
    }
}
