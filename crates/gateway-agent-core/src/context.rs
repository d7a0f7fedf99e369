//! Request context and invocation payload supplied by the hosting runtime.

use http::HeaderMap;
use serde::{Deserialize, Serialize};

/// Message emitted when the payload lacks a prompt or session id.
pub const MISSING_FIELDS_MESSAGE: &str = "Missing required fields: prompt or runtimeSessionId";

/// Immutable per-request context handed over by the hosting runtime.
///
/// `headers` is `None` when the runtime forwarded no headers at all, which is
/// distinct from forwarding headers that happen to lack `Authorization`.
/// Payload fields are not carried here; identity comes only from headers.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    headers: Option<HeaderMap>,
}

impl RequestContext {
    /// Create a context from forwarded headers.
    #[must_use]
    pub fn new(headers: HeaderMap) -> Self {
        Self { headers: Some(headers) }
    }

    /// A context with no forwarded headers.
    #[must_use]
    pub fn without_headers() -> Self {
        Self::default()
    }

    /// Forwarded headers, if any.
    #[must_use]
    pub const fn headers(&self) -> Option<&HeaderMap> {
        self.headers.as_ref()
    }
}

/// Inbound payload as it arrives on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvocationPayload {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default, rename = "runtimeSessionId")]
    pub runtime_session_id: Option<String>,
}

/// A payload that passed field validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationRequest {
    pub prompt: String,
    pub session_id: String,
}

impl InvocationPayload {
    /// Require both fields to be present and non-empty.
    ///
    /// # Errors
    /// Returns [`MISSING_FIELDS_MESSAGE`] if either field is missing or empty.
    pub fn validate(&self) -> Result<InvocationRequest, &'static str> {
        let non_empty = |v: &Option<String>| v.as_deref().filter(|s| !s.is_empty()).map(str::to_owned);
        match (non_empty(&self.prompt), non_empty(&self.runtime_session_id)) {
            (Some(prompt), Some(session_id)) => Ok(InvocationRequest { prompt, session_id }),
            _ => Err(MISSING_FIELDS_MESSAGE),
        }
    }
}
