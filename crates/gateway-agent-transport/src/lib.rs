//! Transport layer towards the remote tool gateway.
//!
//! Provides:
//! - `StreamableHttpTransport` - one MCP client session per connection attempt
//! - `HttpTransportFactory` - builds a transport bound to a single credential
//! - `ClientCredentialsExchange` - OAuth2 client-credentials token exchange

pub mod client;
pub mod factory;
pub mod oauth;

pub use client::StreamableHttpTransport;
pub use factory::HttpTransportFactory;
pub use oauth::ClientCredentialsExchange;
