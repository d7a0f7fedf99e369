//! Session controller: one identity, fresh credentials per attempt, bounded reconnects.

use std::{future::Future, sync::Arc, time::Duration};

use futures::StreamExt;
use gateway_agent_core::{
    EventSink, EventStream, GatewayLocator, Identity, IdentityExtractor, InvocationPayload,
    InvocationRequest, RequestContext, RuntimeConfig, SessionError, TokenSupplier, event_channel,
    traits::{AgentFactory, AgentSpec, ParameterStore, TokenExchange, ToolTransport, TransportFactory},
};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::observer::{AttemptOutcome, InvocationContext, Observers};

/// Lifecycle states of a session, as reported in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Identified,
    Attempting,
    Streaming,
    SessionLost,
    Done,
    Fatal,
    Cancelled,
}

/// Retry budget and per-stage timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub connect_timeout: Duration,
}

impl Default for AttemptPolicy {
    fn default() -> Self {
        Self {
            max_attempts: gateway_agent_core::config::DEFAULT_MAX_ATTEMPTS,
            connect_timeout: gateway_agent_core::config::DEFAULT_TIMEOUT,
        }
    }
}

impl From<&RuntimeConfig> for AttemptPolicy {
    fn from(config: &RuntimeConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            connect_timeout: config.connect_timeout,
        }
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The agent stream finished; `events` content events were delivered.
    Completed { attempts: u32, events: usize },
    /// A terminal error event carrying `error` was emitted.
    Failed { attempts: u32, error: String },
    /// The caller went away or the session was cancelled.
    Cancelled { attempts: u32 },
}

enum Step {
    Completed,
    Cancelled,
}

/// Drives one invocation from request context to a closed event stream.
///
/// Long-lived and shared across requests; only the resolved gateway location
/// is cached between sessions.
pub struct SessionController {
    identity: IdentityExtractor,
    tokens: TokenSupplier,
    locator: GatewayLocator,
    transports: Arc<dyn TransportFactory>,
    agents: Arc<dyn AgentFactory>,
    observers: Observers,
    policy: AttemptPolicy,
    memory_id: String,
}

impl SessionController {
    #[must_use]
    pub fn new(
        tokens: TokenSupplier,
        locator: GatewayLocator,
        transports: Arc<dyn TransportFactory>,
        agents: Arc<dyn AgentFactory>,
    ) -> Self {
        Self {
            identity: IdentityExtractor,
            tokens,
            locator,
            transports,
            agents,
            observers: Observers::default(),
            policy: AttemptPolicy::default(),
            memory_id: String::new(),
        }
    }

    /// Wire a controller from runtime configuration.
    #[must_use]
    pub fn from_config(
        config: &RuntimeConfig,
        exchange: Arc<dyn TokenExchange>,
        store: Arc<dyn ParameterStore>,
        transports: Arc<dyn TransportFactory>,
        agents: Arc<dyn AgentFactory>,
    ) -> Self {
        let tokens = TokenSupplier::new(exchange, config.provider_name.clone(), config.token_timeout);
        let locator = GatewayLocator::new(store, config.stack_name.clone());
        Self::new(tokens, locator, transports, agents)
            .with_policy(AttemptPolicy::from(config))
            .with_memory_id(config.memory_id.clone())
    }

    #[must_use]
    pub const fn with_policy(mut self, policy: AttemptPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_observers(mut self, observers: Observers) -> Self {
        if !observers.is_empty() {
            tracing::debug!(count = observers.len(), "Session observers registered");
        }
        self.observers = observers;
        self
    }

    #[must_use]
    pub fn with_memory_id(mut self, memory_id: impl Into<String>) -> Self {
        self.memory_id = memory_id.into();
        self
    }

    #[must_use]
    pub const fn policy(&self) -> AttemptPolicy {
        self.policy
    }

    /// Run the session on a background task and return its event stream.
    ///
    /// Dropping the stream cancels the session.
    #[must_use]
    pub fn spawn(
        self: &Arc<Self>,
        payload: InvocationPayload,
        ctx: RequestContext,
        cancel: CancellationToken,
    ) -> EventStream {
        let (sink, stream) = event_channel();
        let controller = Arc::clone(self);
        let span = tracing::info_span!(
            "session",
            session_id = payload.runtime_session_id.as_deref().unwrap_or_default()
        );
        tokio::spawn(
            async move {
                let outcome = controller.run(&payload, &ctx, sink, cancel).await;
                tracing::debug!(?outcome, "Session finished");
            }
            .instrument(span),
        );
        stream
    }

    /// Run one session to completion, writing every event to `sink`.
    ///
    /// Emits either the agent's events followed by end-of-stream, or exactly
    /// one terminal error event. Nothing is emitted after cancellation.
    pub async fn run(
        &self,
        payload: &InvocationPayload,
        ctx: &RequestContext,
        mut sink: EventSink,
        cancel: CancellationToken,
    ) -> SessionOutcome {
        tracing::debug!(state = ?SessionState::Init, "Session received");

        let request = match payload.validate() {
            Ok(request) => request,
            Err(message) => {
                tracing::warn!(state = ?SessionState::Fatal, "{message}");
                sink.fail(message).await;
                return SessionOutcome::Failed {
                    attempts: 0,
                    error: message.to_string(),
                };
            }
        };

        let identity = match self.identity.extract(ctx) {
            Ok(identity) => identity,
            Err(e) => return Self::fatal(sink, 0, e.into()).await,
        };
        tracing::info!(
            state = ?SessionState::Identified,
            user_id = %identity,
            session_id = %request.session_id,
            "Session identified"
        );

        let mut attempt = 0;
        loop {
            attempt += 1;
            tracing::info!(
                state = ?SessionState::Attempting,
                attempt,
                max_attempts = self.policy.max_attempts,
                "Starting gateway attempt"
            );

            let before = sink.sent();
            match self.attempt(attempt, &identity, &request, &mut sink, &cancel).await {
                Ok(Step::Completed) => {
                    tracing::info!(state = ?SessionState::Done, attempt, events = sink.sent(), "Session complete");
                    return SessionOutcome::Completed {
                        attempts: attempt,
                        events: sink.sent(),
                    };
                }
                Ok(Step::Cancelled) => {
                    tracing::info!(state = ?SessionState::Cancelled, attempt, "Session cancelled");
                    return SessionOutcome::Cancelled { attempts: attempt };
                }
                Err(err) if err.is_retryable() => {
                    tracing::warn!(state = ?SessionState::SessionLost, attempt, error = %err, "Gateway attempt failed");
                    if sink.sent() > before {
                        tracing::warn!(
                            delivered = sink.sent() - before,
                            "Events from the failed attempt were already delivered and may repeat"
                        );
                    }
                    if attempt >= self.policy.max_attempts {
                        let exhausted = SessionError::SessionExhausted {
                            attempts: attempt,
                            last: Box::new(err),
                        };
                        return Self::fatal(sink, attempt, exhausted).await;
                    }
                }
                Err(err) => return Self::fatal(sink, attempt, err).await,
            }
        }
    }

    async fn fatal(sink: EventSink, attempts: u32, err: SessionError) -> SessionOutcome {
        let error = err.to_string();
        tracing::error!(state = ?SessionState::Fatal, attempts, %error, "Session failed");
        sink.fail(error.clone()).await;
        SessionOutcome::Failed { attempts, error }
    }

    /// One connection attempt: fresh credential, fresh transport, fresh agent.
    async fn attempt(
        &self,
        number: u32,
        identity: &Identity,
        request: &InvocationRequest,
        sink: &mut EventSink,
        cancel: &CancellationToken,
    ) -> Result<Step, SessionError> {
        let Some(credential) = interruptible(self.tokens.fetch(), cancel, sink).await else {
            return Ok(Step::Cancelled);
        };
        let credential = credential?;
        let location = self.locator.resolve().await?;
        let transport = self
            .transports
            .create(location, credential)
            .map_err(|e| SessionError::from_stream_failure(&e))?;

        let ctx = InvocationContext {
            identity: identity.clone(),
            session_id: request.session_id.clone(),
            memory_id: self.memory_id.clone(),
            attempt: number,
        };
        let before = sink.sent();
        let result = self.stream(&ctx, &transport, &request.prompt, sink, cancel).await;
        transport.close().await;

        if !matches!(result, Ok(Step::Cancelled)) {
            let outcome = AttemptOutcome {
                attempt: number,
                events_emitted: sink.sent() - before,
                error: result.as_ref().err().map(ToString::to_string),
            };
            self.observers.after(&ctx, &outcome).await;
        }
        result
    }

    async fn stream(
        &self,
        ctx: &InvocationContext,
        transport: &Arc<dyn ToolTransport>,
        prompt: &str,
        sink: &mut EventSink,
        cancel: &CancellationToken,
    ) -> Result<Step, SessionError> {
        let after = self.policy.connect_timeout;
        let connect = tokio::time::timeout(after, transport.connect());
        let Some(connected) = interruptible(connect, cancel, sink).await else {
            return Ok(Step::Cancelled);
        };
        connected
            .map_err(|_| SessionError::Timeout { stage: "connect", after })?
            .map_err(|e| SessionError::from_stream_failure(&e))?;

        let context = self.observers.before(ctx).await;
        let spec = AgentSpec {
            identity: ctx.identity.clone(),
            session_id: ctx.session_id.clone(),
            context,
            tools: Arc::clone(transport),
        };
        let Some(agent) = interruptible(self.agents.assemble(spec), cancel, sink).await else {
            return Ok(Step::Cancelled);
        };
        let agent = agent.map_err(|e| SessionError::from_stream_failure(&e))?;

        tracing::debug!(state = ?SessionState::Streaming, attempt = ctx.attempt, "Streaming agent events");
        let mut events = agent.stream(prompt.to_string());
        loop {
            let Some(next) = interruptible(events.next(), cancel, sink).await else {
                return Ok(Step::Cancelled);
            };
            match next {
                Some(Ok(event)) => {
                    if sink.emit(event).await.is_err() {
                        return Ok(Step::Cancelled);
                    }
                }
                Some(Err(e)) => return Err(SessionError::from_stream_failure(&e)),
                None => return Ok(Step::Completed),
            }
        }
    }
}

/// Await `fut` unless the session is cancelled or the caller goes away first.
async fn interruptible<F: Future>(fut: F, cancel: &CancellationToken, sink: &EventSink) -> Option<F::Output> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        () = sink.closed() => None,
        out = fut => Some(out),
    }
}
