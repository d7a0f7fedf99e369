//! Streamable-HTTP transport for a single gateway session.

use async_trait::async_trait;
use gateway_agent_core::traits::{CallToolResult, Tool, ToolTransport, TransportError};
use rmcp::{
    Peer, RoleClient, ServiceError, ServiceExt,
    model::CallToolRequestParam,
    service::RunningService,
    transport::streamable_http_client::{StreamableHttpClientTransport, StreamableHttpClientTransportConfig},
};
use serde_json::Value;
use tokio::sync::Mutex;
use url::Url;

type ClientSession = RunningService<RoleClient, ()>;

enum Phase {
    Idle,
    Ready(ClientSession),
    Terminated(String),
}

/// One gateway session over streamable HTTP.
///
/// The `reqwest::Client` carries the bearer credential as a default header, so
/// the credential lives and dies with this transport.
pub struct StreamableHttpTransport {
    http: reqwest::Client,
    endpoint: Url,
    phase: Mutex<Phase>,
}

impl StreamableHttpTransport {
    /// Create an unconnected transport. No I/O happens until first use.
    #[must_use]
    pub fn new(http: reqwest::Client, endpoint: Url) -> Self {
        Self {
            http,
            endpoint,
            phase: Mutex::new(Phase::Idle),
        }
    }

    async fn peer(&self) -> Result<Peer<RoleClient>, TransportError> {
        self.connect().await?;
        match &*self.phase.lock().await {
            Phase::Ready(session) => Ok(session.peer().clone()),
            Phase::Terminated(reason) => Err(TransportError::SessionNotRunning(reason.clone())),
            Phase::Idle => Err(TransportError::Protocol("transport not connected".to_string())),
        }
    }

    /// Translate a client error. Transport-level failures end the session.
    async fn fail(&self, operation: &str, err: ServiceError) -> TransportError {
        match err {
            ServiceError::McpError(error) => TransportError::Rpc {
                code: i64::from(error.code.0),
                message: error.message.into_owned(),
            },
            lost @ (ServiceError::TransportClosed | ServiceError::TransportSend(_)) => {
                self.terminate(format!("{operation}: {lost}")).await
            }
            other => TransportError::Request(format!("{operation}: {other}")),
        }
    }

    async fn terminate(&self, reason: String) -> TransportError {
        tracing::warn!(endpoint = %self.endpoint, %reason, "Gateway session terminated");
        // Dropping the running client stops its worker.
        *self.phase.lock().await = Phase::Terminated(reason.clone());
        TransportError::SessionNotRunning(reason)
    }
}

#[async_trait]
impl ToolTransport for StreamableHttpTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let mut phase = self.phase.lock().await;
        match &*phase {
            Phase::Ready(_) => Ok(()),
            Phase::Terminated(reason) => Err(TransportError::SessionNotRunning(reason.clone())),
            Phase::Idle => {
                let config = StreamableHttpClientTransportConfig::with_uri(self.endpoint.as_str());
                let transport = StreamableHttpClientTransport::with_client(self.http.clone(), config);
                let session = ()
                    .serve(transport)
                    .await
                    .map_err(|e| TransportError::Request(format!("gateway handshake failed: {e}")))?;
                tracing::debug!(endpoint = %self.endpoint, "Gateway session initialized");
                *phase = Phase::Ready(session);
                Ok(())
            }
        }
    }

    async fn list_tools(&self) -> Result<Vec<Tool>, TransportError> {
        let peer = self.peer().await?;
        match peer.list_all_tools().await {
            Ok(tools) => Ok(tools),
            Err(e) => Err(self.fail("tools/list", e).await),
        }
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, TransportError> {
        tracing::debug!(tool = name, "Invoking gateway tool");
        let peer = self.peer().await?;
        let params = CallToolRequestParam {
            name: name.to_string().into(),
            arguments: arguments.as_object().cloned(),
        };
        match peer.call_tool(params).await {
            Ok(result) => Ok(result),
            Err(e) => Err(self.fail("tools/call", e).await),
        }
    }

    async fn close(&self) {
        let previous = std::mem::replace(
            &mut *self.phase.lock().await,
            Phase::Terminated("transport closed".to_string()),
        );
        if let Phase::Ready(session) = previous {
            if let Err(e) = session.cancel().await {
                tracing::debug!(endpoint = %self.endpoint, "Failed to close gateway session: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use gateway_agent_core::is_session_lost;
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, Request, ResponseTemplate,
        matchers::{body_partial_json, header, method},
    };

    use super::*;

    const SESSION_HEADER: &str = "mcp-session-id";

    fn request_id(req: &Request) -> Value {
        serde_json::from_slice::<Value>(&req.body)
            .ok()
            .and_then(|body| body.get("id").cloned())
            .unwrap_or(Value::Null)
    }

    /// Answer with `result` under the caller's request id.
    fn reply(result: Value) -> impl Fn(&Request) -> ResponseTemplate + Send + Sync {
        move |req: &Request| {
            ResponseTemplate::new(200)
                .insert_header(SESSION_HEADER, "sess-1")
                .set_body_json(json!({"jsonrpc": "2.0", "id": request_id(req), "result": result}))
        }
    }

    async fn mount_handshake(server: &MockServer) {
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "initialize"})))
            .respond_with(reply(json!({
                "protocolVersion": "2025-03-26",
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "gw", "version": "1.0.0"}
            })))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "notifications/initialized"})))
            .respond_with(ResponseTemplate::new(202))
            .mount(server)
            .await;
        // No standalone event stream.
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(405))
            .mount(server)
            .await;
    }

    fn transport(server: &MockServer) -> StreamableHttpTransport {
        StreamableHttpTransport::new(reqwest::Client::new(), Url::parse(&server.uri()).unwrap())
    }

    #[tokio::test]
    async fn test_list_tools_over_sse() {
        let server = MockServer::start().await;
        mount_handshake(&server).await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "tools/list"})))
            .and(header(SESSION_HEADER, "sess-1"))
            .respond_with(|req: &Request| {
                let message = json!({
                    "jsonrpc": "2.0",
                    "id": request_id(req),
                    "result": {"tools": [{"name": "orders___get_order", "inputSchema": {"type": "object"}}]}
                });
                ResponseTemplate::new(200).set_body_raw(format!("data: {message}\n\n"), "text/event-stream")
            })
            .mount(&server)
            .await;

        let tools = transport(&server).list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "orders___get_order");
    }

    #[tokio::test]
    async fn test_call_tool_returns_result() {
        let server = MockServer::start().await;
        mount_handshake(&server).await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "method": "tools/call",
                "params": {"name": "orders___get_order", "arguments": {"id": 1}}
            })))
            .respond_with(reply(json!({"content": [{"type": "text", "text": "shipped"}]})))
            .mount(&server)
            .await;

        let result = transport(&server)
            .call_tool("orders___get_order", json!({"id": 1}))
            .await
            .unwrap();
        assert_eq!(
            serde_json::to_value(&result).unwrap()["content"],
            json!([{"type": "text", "text": "shipped"}])
        );
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let server = MockServer::start().await;
        mount_handshake(&server).await;

        let t = transport(&server);
        tokio_test::assert_ok!(t.connect().await);
        tokio_test::assert_ok!(t.connect().await);

        let handshakes = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|req| {
                serde_json::from_slice::<Value>(&req.body).is_ok_and(|b| b["method"] == "initialize")
            })
            .count();
        assert_eq!(handshakes, 1);
    }

    #[tokio::test]
    async fn test_failed_handshake_is_not_session_loss() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = transport(&server).connect().await.unwrap_err();
        assert!(matches!(err, TransportError::Request(_)));
        assert!(!is_session_lost(&err.to_string()));
    }

    #[tokio::test]
    async fn test_expired_session_reports_signature() {
        let server = MockServer::start().await;
        mount_handshake(&server).await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "tools/call"})))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let t = transport(&server);
        let err = t.call_tool("orders___get_order", json!({"id": 1})).await.unwrap_err();
        assert!(is_session_lost(&err.to_string()));

        // The session stays dead; no new handshake is attempted.
        let err = t.list_tools().await.unwrap_err();
        assert!(matches!(err, TransportError::SessionNotRunning(_)));
    }

    #[tokio::test]
    async fn test_tool_error_is_not_session_loss() {
        let server = MockServer::start().await;
        mount_handshake(&server).await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "tools/call"})))
            .respond_with(|req: &Request| {
                ResponseTemplate::new(200).set_body_json(json!({
                    "jsonrpc": "2.0",
                    "id": request_id(req),
                    "error": {"code": -32602, "message": "unknown tool: x"}
                }))
            })
            .mount(&server)
            .await;

        let t = transport(&server);
        let err = t.call_tool("x", json!({})).await.unwrap_err();
        assert!(matches!(err, TransportError::Rpc { code: -32602, .. }));
        assert!(!is_session_lost(&err.to_string()));
        tokio_test::assert_ok!(t.connect().await);
    }

    #[tokio::test]
    async fn test_close_ends_session() {
        let server = MockServer::start().await;
        mount_handshake(&server).await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let t = transport(&server);
        t.connect().await.unwrap();
        t.close().await;
        let err = t.connect().await.unwrap_err();
        assert!(is_session_lost(&err.to_string()));
    }
}
