//! Model-free agent that drives gateway tools directly from the prompt.
//!
//! A prompt that is a JSON object `{"tool": "<name>", "arguments": {...}}`
//! invokes that tool. Anything else is answered with the gateway's tool catalog.

use std::sync::Arc;

use async_trait::async_trait;
use futures::{StreamExt, stream::BoxStream};
use gateway_agent_core::{
    Identity,
    traits::{Agent, AgentError, AgentFactory, AgentSpec, ToolTransport},
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::ToolName;

#[derive(Debug, Clone, Deserialize)]
struct ToolRequest {
    tool: String,
    #[serde(default)]
    arguments: Value,
}

impl ToolRequest {
    fn from_prompt(prompt: &str) -> Option<Self> {
        serde_json::from_str::<Self>(prompt.trim()).ok()
    }
}

enum Stage {
    Context(Option<ToolRequest>),
    Announce(Option<ToolRequest>),
    Invoke(ToolRequest),
    Finished,
}

/// Agent assembled for one attempt, holding that attempt's transport.
pub struct DirectToolAgent {
    identity: Identity,
    session_id: String,
    context: Vec<String>,
    tools: Arc<dyn ToolTransport>,
}

impl DirectToolAgent {
    #[must_use]
    pub fn new(spec: AgentSpec) -> Self {
        Self {
            identity: spec.identity,
            session_id: spec.session_id,
            context: spec.context,
            tools: spec.tools,
        }
    }

    /// Produce the next event and the stage that follows it.
    async fn step(&self, stage: Stage) -> Option<(Result<Value, AgentError>, Stage)> {
        let stage = match stage {
            Stage::Context(request) if self.context.is_empty() => Stage::Announce(request),
            other => other,
        };
        match stage {
            Stage::Context(request) => {
                let event = json!({"type": "context", "text": self.context.join("\n\n")});
                Some((Ok(event), Stage::Announce(request)))
            }
            Stage::Announce(Some(request)) => {
                let name = ToolName::parse(&request.tool);
                let event = json!({
                    "type": "tool_use",
                    "name": request.tool,
                    "target": name.target(),
                    "input": request.arguments,
                });
                Some((Ok(event), Stage::Invoke(request)))
            }
            Stage::Announce(None) => Some((self.catalog().await, Stage::Finished)),
            Stage::Invoke(request) => {
                let result = match self.tools.call_tool(&request.tool, request.arguments).await {
                    Ok(result) => serde_json::to_value(result)
                        .map(|result| json!({"type": "tool_result", "name": request.tool, "result": result}))
                        .map_err(|e| AgentError::Other(format!("Unreadable tool result: {e}"))),
                    Err(e) => Err(AgentError::from(e)),
                };
                Some((result, Stage::Finished))
            }
            Stage::Finished => None,
        }
    }

    async fn catalog(&self) -> Result<Value, AgentError> {
        let tools = self.tools.list_tools().await?;
        tracing::debug!(
            user_id = %self.identity,
            session_id = %self.session_id,
            count = tools.len(),
            "Listing gateway tools"
        );
        let tools: Vec<Value> = tools
            .into_iter()
            .map(|t| {
                let name = ToolName::parse(&t.name);
                json!({
                    "name": t.name,
                    "target": name.target(),
                    "tool": name.tool(),
                    "description": t.description,
                })
            })
            .collect();
        Ok(json!({"type": "tool_catalog", "tools": tools}))
    }
}

impl Agent for DirectToolAgent {
    fn stream(self: Box<Self>, prompt: String) -> BoxStream<'static, Result<Value, AgentError>> {
        let agent = Arc::new(*self);
        let first = Stage::Context(ToolRequest::from_prompt(&prompt));

        futures::stream::unfold(first, move |stage| {
            let agent = Arc::clone(&agent);
            async move {
                // A failed step ends the stream after reporting its error.
                let (item, next) = agent.step(stage).await?;
                let next = if item.is_err() { Stage::Finished } else { next };
                Some((item, next))
            }
        })
        .boxed()
    }
}

/// Assembles a [`DirectToolAgent`] per attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectToolAgentFactory;

#[async_trait]
impl AgentFactory for DirectToolAgentFactory {
    async fn assemble(&self, spec: AgentSpec) -> Result<Box<dyn Agent>, AgentError> {
        tracing::info!(
            user_id = %spec.identity,
            session_id = %spec.session_id,
            "Assembling direct tool agent"
        );
        Ok(Box::new(DirectToolAgent::new(spec)))
    }
}
