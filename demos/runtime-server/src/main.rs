//! Agent runtime host that streams gateway-backed sessions over SSE.
//!
//! Run with: cargo run -p runtime-server
//!
//! `POST /invocations` takes `{"prompt": ..., "runtimeSessionId": ...}` with the
//! caller's bearer token in `Authorization`. `GET /ping` reports health.

mod settings;

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
};
use futures::Stream;
use gateway_agent_core::{InvocationPayload, RequestContext, RuntimeConfig, StaticParameterStore};
use gateway_agent_executor::DirectToolAgentFactory;
use gateway_agent_session::{Observers, SessionController, SessionObserver, TracingObserver};
use gateway_agent_transport::{ClientCredentialsExchange, HttpTransportFactory};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use crate::settings::GatewaySettings;

const DEFAULT_ADDR: &str = "0.0.0.0:8080";

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    controller: Arc<SessionController>,
    shutdown: CancellationToken,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = RuntimeConfig::from_env().context("invalid runtime configuration")?;
    let settings = GatewaySettings::from_env()?;
    tracing::info!(
        stack = %config.stack_name,
        provider = %config.provider_name,
        region = %config.region,
        max_attempts = config.max_attempts,
        "Runtime configured"
    );

    let state = AppState {
        controller: Arc::new(build_controller(&config, settings)),
        shutdown: CancellationToken::new(),
    };
    let shutdown = state.shutdown.clone();

    let addr: SocketAddr = std::env::var("AGENT_RUNTIME_ADDR")
        .unwrap_or_else(|_| DEFAULT_ADDR.to_string())
        .parse()
        .context("invalid AGENT_RUNTIME_ADDR")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("Runtime listening on http://{addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;
    Ok(())
}

fn build_controller(config: &RuntimeConfig, settings: GatewaySettings) -> SessionController {
    let mut store = StaticParameterStore::new();
    if let Some(url) = settings.gateway_url {
        store = store.with(config.stack_name.gateway_url_key(), url);
    } else {
        tracing::warn!("GATEWAY_URL is not set; invocations will fail until it is");
    }

    let exchange = ClientCredentialsExchange::new(settings.token_url, settings.client_id, settings.client_secret)
        .with_scopes(settings.scopes);
    let transports = match settings.request_timeout {
        Some(timeout) => HttpTransportFactory::new().with_request_timeout(timeout),
        None => HttpTransportFactory::new(),
    };

    SessionController::from_config(
        config,
        Arc::new(exchange),
        Arc::new(store),
        Arc::new(transports),
        Arc::new(DirectToolAgentFactory),
    )
    .with_observers(Observers::new(vec![Arc::new(TracingObserver) as Arc<dyn SessionObserver>]))
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/invocations", post(invocations))
        .route("/ping", get(ping))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn ping() -> Json<Value> {
    Json(json!({"status": "Healthy"}))
}

async fn invocations(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let invocation_id = Uuid::new_v4();
    // Non-object bodies and unusable field types are treated like missing fields.
    let payload: InvocationPayload = serde_json::from_slice::<Value>(&body)
        .ok()
        .filter(Value::is_object)
        .and_then(|body| serde_json::from_value(body).ok())
        .unwrap_or_default();
    tracing::info!(%invocation_id, bytes = body.len(), "Invocation received");

    let events = state
        .controller
        .spawn(payload, RequestContext::new(headers), state.shutdown.child_token());
    Sse::new(events.sse_stream()).keep_alive(KeepAlive::default())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down, cancelling active sessions");
    shutdown.cancel();
}
