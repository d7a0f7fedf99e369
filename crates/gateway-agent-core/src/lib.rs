//! Core abstractions for identity-bound tool gateway sessions.
//!
//! This crate provides the fundamental building blocks:
//! - `RequestContext` / `InvocationPayload` - What the hosting runtime hands us
//! - `IdentityExtractor` - Caller identity from a pre-validated bearer token
//! - `TokenSupplier` / `GatewayLocator` - Fresh credentials and the gateway URL
//! - `EventSink` - Ordered, append-only outbound event channel
//! - `SessionError` - Failure taxonomy and retry classification
//! - Collaborator traits for token exchange, transports and agents

pub mod config;
pub mod context;
pub mod credential;
pub mod error;
pub mod events;
pub mod identity;
pub mod traits;

pub use config::{ConfigError, ProviderName, RuntimeConfig, StackName};
pub use context::{InvocationPayload, InvocationRequest, MISSING_FIELDS_MESSAGE, RequestContext};
pub use credential::{Credential, GatewayLocation, GatewayLocator, StaticParameterStore, TokenSupplier};
pub use error::{SESSION_NOT_RUNNING, SessionError, is_session_lost};
pub use events::{EventSink, EventStream, SinkClosed, StreamEvent, event_channel};
pub use identity::{Identity, IdentityError, IdentityExtractor};
pub use traits::{Agent, AgentFactory, AgentSpec, ParameterStore, TokenExchange, ToolTransport, TransportFactory};
