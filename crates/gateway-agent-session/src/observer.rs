//! Explicit pre- and post-invocation hooks.
//!
//! Observers run in list order, once before and once after each attempt's
//! streaming phase. A failing observer is logged and skipped; it never fails
//! the session.

use std::sync::Arc;

use async_trait::async_trait;
use gateway_agent_core::Identity;
use thiserror::Error;

/// What an observer sees about the current attempt.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub identity: Identity,
    pub session_id: String,
    pub memory_id: String,
    pub attempt: u32,
}

/// How an attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptOutcome {
    pub attempt: u32,
    pub events_emitted: usize,
    pub error: Option<String>,
}

/// Observer error.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ObserverError(pub String);

/// Lifecycle hook around the streaming phase.
#[async_trait]
pub trait SessionObserver: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Called before the agent is assembled. Returned text is handed to the agent as context.
    async fn before_invocation(&self, _ctx: &InvocationContext) -> Result<Option<String>, ObserverError> {
        Ok(None)
    }

    /// Called after the attempt's stream ends, successfully or not.
    async fn after_invocation(
        &self,
        _ctx: &InvocationContext,
        _outcome: &AttemptOutcome,
    ) -> Result<(), ObserverError> {
        Ok(())
    }
}

/// Ordered observer list, built once and handed to the controller.
#[derive(Clone, Default)]
pub struct Observers(Vec<Arc<dyn SessionObserver>>);

impl Observers {
    #[must_use]
    pub fn new(observers: Vec<Arc<dyn SessionObserver>>) -> Self {
        Self(observers)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Run every pre-invocation hook in order, collecting context.
    pub async fn before(&self, ctx: &InvocationContext) -> Vec<String> {
        let mut context = Vec::new();
        for observer in &self.0 {
            match observer.before_invocation(ctx).await {
                Ok(Some(text)) => context.push(text),
                Ok(None) => {}
                Err(e) => tracing::error!(observer = observer.name(), "before_invocation failed: {e}"),
            }
        }
        context
    }

    /// Run every post-invocation hook in order.
    pub async fn after(&self, ctx: &InvocationContext, outcome: &AttemptOutcome) {
        for observer in &self.0 {
            if let Err(e) = observer.after_invocation(ctx, outcome).await {
                tracing::error!(observer = observer.name(), "after_invocation failed: {e}");
            }
        }
    }
}

/// Logs attempt boundaries.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

#[async_trait]
impl SessionObserver for TracingObserver {
    fn name(&self) -> &'static str {
        "tracing"
    }

    async fn before_invocation(&self, ctx: &InvocationContext) -> Result<Option<String>, ObserverError> {
        tracing::info!(
            user_id = %ctx.identity,
            session_id = %ctx.session_id,
            attempt = ctx.attempt,
            "Starting agent invocation"
        );
        Ok(None)
    }

    async fn after_invocation(&self, ctx: &InvocationContext, outcome: &AttemptOutcome) -> Result<(), ObserverError> {
        match &outcome.error {
            None => tracing::info!(
                session_id = %ctx.session_id,
                attempt = outcome.attempt,
                events = outcome.events_emitted,
                "Agent invocation finished"
            ),
            Some(error) => tracing::warn!(
                session_id = %ctx.session_id,
                attempt = outcome.attempt,
                events = outcome.events_emitted,
                %error,
                "Agent invocation failed"
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use gateway_agent_core::{IdentityExtractor, RequestContext};
    use http::{HeaderMap, HeaderValue, header::AUTHORIZATION};
    use serde_json::json;

    use super::*;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        context: Option<&'static str>,
        fail: bool,
    }

    #[async_trait]
    impl SessionObserver for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        async fn before_invocation(&self, _ctx: &InvocationContext) -> Result<Option<String>, ObserverError> {
            self.log.lock().unwrap().push(format!("before:{}", self.name));
            if self.fail {
                return Err(ObserverError("memory unavailable".into()));
            }
            Ok(self.context.map(str::to_string))
        }

        async fn after_invocation(&self, _ctx: &InvocationContext, outcome: &AttemptOutcome) -> Result<(), ObserverError> {
            self.log
                .lock()
                .unwrap()
                .push(format!("after:{}:{}", self.name, outcome.events_emitted));
            Ok(())
        }
    }

    fn ctx() -> InvocationContext {
        let token = jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &json!({"sub": "u1"}),
            &jsonwebtoken::EncodingKey::from_secret(b"test"),
        )
        .unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&token).unwrap());
        InvocationContext {
            identity: IdentityExtractor.extract(&RequestContext::new(headers)).unwrap(),
            session_id: "s1".into(),
            memory_id: "mem".into(),
            attempt: 1,
        }
    }

    #[tokio::test]
    async fn test_hooks_run_in_order_and_failures_are_isolated() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let list: Vec<Arc<dyn SessionObserver>> = vec![
            Arc::new(Recorder { name: "a", log: log.clone(), context: Some("history"), fail: false }),
            Arc::new(Recorder { name: "b", log: log.clone(), context: None, fail: true }),
            Arc::new(Recorder { name: "c", log: log.clone(), context: Some("profile"), fail: false }),
        ];
        let observers = Observers::new(list);

        let ctx = ctx();
        let context = observers.before(&ctx).await;
        assert_eq!(context, vec!["history".to_string(), "profile".to_string()]);

        let outcome = AttemptOutcome {
            attempt: 1,
            events_emitted: 3,
            error: None,
        };
        observers.after(&ctx, &outcome).await;

        assert_eq!(
            *log.lock().unwrap(),
            vec!["before:a", "before:b", "before:c", "after:a:3", "after:b:3", "after:c:3"]
        );
    }

    #[tokio::test]
    async fn test_tracing_observer_contributes_nothing() {
        let observers = Observers::new(vec![Arc::new(TracingObserver) as Arc<dyn SessionObserver>]);
        assert_eq!(observers.len(), 1);
        assert!(observers.before(&ctx()).await.is_empty());
    }
}
