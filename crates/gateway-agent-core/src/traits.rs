//! Collaborator traits for token exchange, configuration lookup, transports and agents.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use thiserror::Error;

pub use rmcp::model::{CallToolResult, Tool};

use crate::{Credential, GatewayLocation, Identity, ProviderName};

/// Token exchange error.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Token request failed: {0}")]
    Request(String),
    #[error("Token endpoint returned {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("Token response missing access_token")]
    MissingAccessToken,
    #[error("Token request timed out after {0:?}")]
    TimedOut(std::time::Duration),
}

/// Machine-to-machine token exchange keyed by credential provider.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    /// Fetch a fresh access token for the provider.
    async fn fetch_token(&self, provider: &ProviderName) -> Result<Credential, TokenError>;
}

/// Configuration store error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Parameter not found: {0}")]
    NotFound(String),
    #[error("Parameter store error: {0}")]
    Internal(String),
}

/// Key-value configuration store (for the gateway URL).
#[async_trait]
pub trait ParameterStore: Send + Sync {
    async fn get_parameter(&self, key: &str) -> Result<String, StoreError>;
}

/// Transport error.
///
/// `SessionNotRunning` carries the session-loss signature in its message; see
/// [`crate::is_session_lost`].
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("client session is not running: {0}")]
    SessionNotRunning(String),
    #[error("Gateway request failed: {0}")]
    Request(String),
    #[error("Gateway returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Gateway protocol error: {0}")]
    Protocol(String),
    #[error("Tool call failed ({code}): {message}")]
    Rpc { code: i64, message: String },
    #[error("Invalid transport configuration: {0}")]
    Config(String),
}

/// Streaming transport to the remote tool gateway.
///
/// Implementations connect lazily; `connect` is idempotent and is also
/// performed implicitly by the first tool operation.
#[async_trait]
pub trait ToolTransport: Send + Sync {
    /// Establish the session (handshake) if not already done.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Enumerate remote tools.
    async fn list_tools(&self) -> Result<Vec<Tool>, TransportError>;

    /// Invoke a remote tool. `arguments` should be a JSON object.
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, TransportError>;

    /// Close the session. Further use fails with `SessionNotRunning`.
    async fn close(&self);
}

/// Builds one transport per connection attempt.
pub trait TransportFactory: Send + Sync {
    /// Construct a transport bound to `credential`. Must not perform I/O.
    ///
    /// # Errors
    /// Returns error if the transport cannot be configured.
    fn create(
        &self,
        location: &GatewayLocation,
        credential: Credential,
    ) -> Result<Arc<dyn ToolTransport>, TransportError>;
}

/// Agent error.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("Agent assembly failed: {0}")]
    Assembly(String),
    #[error("{0}")]
    Other(String),
}

/// Everything an agent needs for one attempt.
pub struct AgentSpec {
    pub identity: Identity,
    pub session_id: String,
    /// Context lines contributed by pre-invocation observers, in observer order.
    pub context: Vec<String>,
    pub tools: Arc<dyn ToolTransport>,
}

/// A tool-using agent assembled for a single attempt.
pub trait Agent: Send {
    /// Stream events in response to `prompt`. Each item is an opaque content record.
    fn stream(self: Box<Self>, prompt: String) -> BoxStream<'static, Result<Value, AgentError>>;
}

/// Assembles agents around a fresh tool transport.
#[async_trait]
pub trait AgentFactory: Send + Sync {
    async fn assemble(&self, spec: AgentSpec) -> Result<Box<dyn Agent>, AgentError>;
}
