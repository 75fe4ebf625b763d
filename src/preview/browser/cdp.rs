// CDP client - Chrome DevTools Protocol over a WebSocket
//
// Talks to a browser started with `--remote-debugging-port`. Each page gets
// its own browser context created with `disposeOnDetach`, so a dropped
// connection also tears the context down on the browser side.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use super::{BrowserAutomation, BrowserPage, WaitUntil};
use crate::preview::errors::BrowserError;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound for a single protocol round trip
const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(150);

/// CDP request frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdpMessage {
    pub id: u64,
    pub method: String,
    pub params: Value,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VersionInfo {
    #[serde(rename = "webSocketDebuggerUrl")]
    web_socket_debugger_url: String,
}

/// Connects to a running browser's DevTools endpoint
pub struct CdpBrowser {
    endpoint: String,
    http: reqwest::Client,
}

impl CdpBrowser {
    /// `endpoint` is either the HTTP DevTools address (`http://127.0.0.1:9222`)
    /// or a browser websocket URL (`ws://...`).
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            http: reqwest::Client::new(),
        }
    }

    async fn websocket_url(&self) -> Result<String, BrowserError> {
        if self.endpoint.starts_with("ws://") || self.endpoint.starts_with("wss://") {
            return Ok(self.endpoint.clone());
        }

        let version_url = format!("{}/json/version", self.endpoint.trim_end_matches('/'));
        let info: VersionInfo = self
            .http
            .get(&version_url)
            .timeout(COMMAND_TIMEOUT)
            .send()
            .await
            .map_err(|e| BrowserError::Connection(format!("{}: {}", version_url, e)))?
            .json()
            .await
            .map_err(|e| BrowserError::Protocol(format!("Bad /json/version payload: {}", e)))?;
        Ok(info.web_socket_debugger_url)
    }
}

#[async_trait]
impl BrowserAutomation for CdpBrowser {
    async fn open_page(&self) -> Result<Box<dyn BrowserPage>, BrowserError> {
        let ws_url = self.websocket_url().await?;
        let (socket, _) = tokio::time::timeout(COMMAND_TIMEOUT, tokio_tungstenite::connect_async(ws_url.as_str()))
            .await
            .map_err(|_| BrowserError::Timeout(COMMAND_TIMEOUT))?
            .map_err(|e| BrowserError::Connection(e.to_string()))?;

        let mut conn = CdpConnection { socket, next_id: 1 };

        let context = conn
            .call("Target.createBrowserContext", json!({ "disposeOnDetach": true }), None)
            .await?;
        let context_id = string_field(&context, "browserContextId")?;

        let mut page = CdpPage {
            conn,
            context_id,
            target_id: None,
            session_id: None,
            closed: false,
        };

        // From here on the page owns the context; close it if setup fails
        if let Err(e) = page.attach().await {
            if let Err(close_err) = page.close().await {
                debug!(error = %close_err, "Cleanup after failed attach also failed");
            }
            return Err(e);
        }

        debug!(context = %page.context_id, "Opened browser page");
        Ok(Box::new(page))
    }
}

struct CdpConnection {
    socket: Socket,
    next_id: u64,
}

impl CdpConnection {
    async fn call(
        &mut self,
        method: &str,
        params: Value,
        session_id: Option<&str>,
    ) -> Result<Value, BrowserError> {
        let id = self.next_id;
        self.next_id += 1;

        let message = CdpMessage {
            id,
            method: method.to_string(),
            params,
            session_id: session_id.map(|s| s.to_string()),
        };
        let frame = serde_json::to_string(&message)
            .map_err(|e| BrowserError::Protocol(e.to_string()))?;

        tokio::time::timeout(COMMAND_TIMEOUT, self.round_trip(id, frame))
            .await
            .map_err(|_| BrowserError::Timeout(COMMAND_TIMEOUT))?
            .map_err(|e| match e {
                BrowserError::Protocol(msg) => BrowserError::Protocol(format!("{}: {}", method, msg)),
                other => other,
            })
    }

    async fn round_trip(&mut self, id: u64, frame: String) -> Result<Value, BrowserError> {
        self.socket
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| BrowserError::Connection(e.to_string()))?;

        loop {
            let incoming = self
                .socket
                .next()
                .await
                .ok_or_else(|| BrowserError::Connection("DevTools socket closed".to_string()))?
                .map_err(|e| BrowserError::Connection(e.to_string()))?;

            let text = match incoming {
                Message::Text(text) => text,
                Message::Close(_) => {
                    return Err(BrowserError::Connection("DevTools socket closed".to_string()))
                }
                _ => continue,
            };

            let value: Value = serde_json::from_str(text.as_str())
                .map_err(|e| BrowserError::Protocol(format!("Invalid frame: {}", e)))?;

            // Events and replies to other ids are skipped
            if value.get("id").and_then(Value::as_u64) != Some(id) {
                continue;
            }
            if let Some(error) = value.get("error") {
                let message = error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error");
                return Err(BrowserError::Protocol(message.to_string()));
            }
            return Ok(value.get("result").cloned().unwrap_or(Value::Null));
        }
    }
}

struct CdpPage {
    conn: CdpConnection,
    context_id: String,
    target_id: Option<String>,
    session_id: Option<String>,
    closed: bool,
}

impl CdpPage {
    async fn attach(&mut self) -> Result<(), BrowserError> {
        let target = self
            .conn
            .call(
                "Target.createTarget",
                json!({ "url": "about:blank", "browserContextId": self.context_id }),
                None,
            )
            .await?;
        let target_id = string_field(&target, "targetId")?;
        self.target_id = Some(target_id.clone());

        let attached = self
            .conn
            .call(
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
                None,
            )
            .await?;
        self.session_id = Some(string_field(&attached, "sessionId")?);

        self.session_call("Page.enable", json!({})).await?;
        Ok(())
    }

    async fn session_call(&mut self, method: &str, params: Value) -> Result<Value, BrowserError> {
        if self.closed {
            return Err(BrowserError::Connection("Page already closed".to_string()));
        }
        let session = self
            .session_id
            .clone()
            .ok_or_else(|| BrowserError::Connection("Page not attached".to_string()))?;
        self.conn.call(method, params, Some(&session)).await
    }

    async fn runtime_evaluate(&mut self, expression: &str) -> Result<Value, BrowserError> {
        let result = self
            .session_call(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;

        if let Some(details) = result.get("exceptionDetails") {
            let text = details
                .pointer("/exception/description")
                .or_else(|| details.get("text"))
                .and_then(Value::as_str)
                .unwrap_or("script threw");
            return Err(BrowserError::Evaluation(text.to_string()));
        }

        Ok(result
            .pointer("/result/value")
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Re-evaluate `expression` until it yields `true` or the deadline passes
    async fn poll_until_true(
        &mut self,
        expression: &str,
        timeout: Duration,
    ) -> Result<bool, BrowserError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.runtime_evaluate(expression).await? == Value::Bool(true) {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl BrowserPage for CdpPage {
    async fn navigate(
        &mut self,
        url: &str,
        wait_until: WaitUntil,
        timeout: Duration,
    ) -> Result<(), BrowserError> {
        let result = self.session_call("Page.navigate", json!({ "url": url })).await?;
        if let Some(error_text) = result.get("errorText").and_then(Value::as_str) {
            return Err(BrowserError::Navigation(format!("{}: {}", url, error_text)));
        }

        let states = serde_json::to_string(wait_until.ready_states())
            .map_err(|e| BrowserError::Protocol(e.to_string()))?;
        let expression = format!(
            "location.href !== 'about:blank' && {}.includes(document.readyState)",
            states
        );

        if self.poll_until_true(&expression, timeout).await? {
            Ok(())
        } else {
            Err(BrowserError::Timeout(timeout))
        }
    }

    async fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), BrowserError> {
        let quoted = Value::String(selector.to_string()).to_string();
        let expression = format!("document.querySelector({}) !== null", quoted);

        if self.poll_until_true(&expression, timeout).await? {
            Ok(())
        } else {
            Err(BrowserError::ElementNotFound(selector.to_string()))
        }
    }

    async fn evaluate(&mut self, script: &str) -> Result<Value, BrowserError> {
        self.runtime_evaluate(script).await
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut first_error = None;

        if let Some(target_id) = self.target_id.take() {
            if let Err(e) = self
                .conn
                .call("Target.closeTarget", json!({ "targetId": target_id }), None)
                .await
            {
                first_error.get_or_insert(e);
            }
        }

        if let Err(e) = self
            .conn
            .call(
                "Target.disposeBrowserContext",
                json!({ "browserContextId": self.context_id }),
                None,
            )
            .await
        {
            first_error.get_or_insert(e);
        }

        if let Err(e) = self.conn.socket.close(None).await {
            debug!(error = %e, "DevTools socket close failed");
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for CdpPage {
    fn drop(&mut self) {
        if !self.closed {
            // Socket drop detaches; disposeOnDetach reclaims the context
            warn!(context = %self.context_id, "Browser page dropped without close()");
        }
    }
}

fn string_field(value: &Value, field: &str) -> Result<String, BrowserError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(|s| s.to_string())
        .ok_or_else(|| BrowserError::Protocol(format!("Missing '{}' in response", field)))
}
