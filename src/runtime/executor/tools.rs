/// Tools invoked by action nodes
///
/// A tool is looked up by the identifier in the action node's `tool` config.
/// Built-ins:
/// - `echo`: returns its params unchanged
/// - `http`: performs an HTTP request (`url`, `method`, `headers`, `body`)

use async_trait::async_trait;
use serde_json::{json, Value};
use std::{collections::HashMap, fmt, sync::Arc};
use tokio_util::sync::CancellationToken;

/// An external capability callable from an action node
#[async_trait]
pub trait Tool: Send + Sync {
    /// Run the tool; errors are plain messages attributed to the tool by the caller
    async fn invoke(&self, params: Value, cancel: &CancellationToken) -> Result<Value, String>;
}

/// Tools by identifier
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.tools.keys().collect();
        names.sort();
        f.debug_struct("ToolRegistry").field("tools", &names).finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `echo` and `http`
    pub fn with_builtins() -> Self {
        Self::new()
            .with_tool("echo", Arc::new(EchoTool))
            .with_tool("http", Arc::new(HttpTool::new()))
    }

    /// Add or replace a tool
    pub fn with_tool(mut self, name: impl Into<String>, tool: Arc<dyn Tool>) -> Self {
        self.tools.insert(name.into(), tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }
}

/// Returns its params unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    async fn invoke(&self, params: Value, _cancel: &CancellationToken) -> Result<Value, String> {
        Ok(params)
    }
}

/// HTTP client tool
///
/// Params: `{ "url": "...", "method": "GET", "headers": {...}, "body": ... }`.
/// Object/array bodies are sent as JSON, strings as text. A non-2xx status
/// is a tool failure.
#[derive(Debug, Clone)]
pub struct HttpTool {
    client: reqwest::Client,
}

impl HttpTool {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for HttpTool {
    async fn invoke(&self, params: Value, cancel: &CancellationToken) -> Result<Value, String> {
        let url = params
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| "missing 'url' parameter".to_string())?;
        let method = params
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("GET")
            .to_uppercase();

        let mut request = match method.as_str() {
            "GET" => self.client.get(url),
            "POST" => self.client.post(url),
            "PUT" => self.client.put(url),
            "DELETE" => self.client.delete(url),
            "PATCH" => self.client.patch(url),
            _ => return Err(format!("unsupported HTTP method: {}", method)),
        };

        if let Some(headers) = params.get("headers").and_then(Value::as_object) {
            for (key, value) in headers {
                if let Some(header_value) = value.as_str() {
                    request = request.header(key.as_str(), header_value);
                }
            }
        }

        match params.get("body") {
            Some(body) if body.is_object() || body.is_array() => {
                request = request.json(body);
            }
            Some(Value::String(text)) => {
                request = request
                    .header("Content-Type", "text/plain")
                    .body(text.clone());
            }
            _ => {}
        }

        tracing::debug!("🌍 HTTP tool request: {} {}", method, url);

        let response = tokio::select! {
            response = request.send() => response.map_err(|e| format!("HTTP request failed: {}", e))?,
            _ = cancel.cancelled() => return Err("cancelled".to_string()),
        };

        let status = response.status();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
            .collect();
        let text = tokio::select! {
            text = response.text() => text.map_err(|e| format!("failed to read response body: {}", e))?,
            _ = cancel.cancelled() => return Err("cancelled".to_string()),
        };
        let data = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

        if !status.is_success() {
            return Err(format!("{} {} returned status {}", method, url, status));
        }

        tracing::debug!("📡 HTTP tool response: {} {} -> {}", method, url, status);

        Ok(json!({
            "status": status.as_u16(),
            "headers": headers,
            "data": data,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_returns_params() {
        let params = json!({ "msg": "hi" });
        let result = EchoTool.invoke(params.clone(), &CancellationToken::new()).await;
        assert_eq!(result, Ok(params));
    }

    #[tokio::test]
    async fn http_requires_url() {
        let err = HttpTool::new()
            .invoke(json!({ "method": "GET" }), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.contains("url"));
    }

    #[tokio::test]
    async fn http_rejects_unknown_method() {
        let err = HttpTool::new()
            .invoke(json!({ "url": "http://localhost", "method": "BREW" }), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.contains("BREW"));
    }

    #[tokio::test]
    async fn http_body_read_stops_on_cancel() {
        use std::time::Duration;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/slow", listener.local_addr().unwrap());

        // Headers arrive immediately, the promised body never does
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\npartial")
                .await;
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            HttpTool::new().invoke(json!({ "url": url }), &cancel),
        )
        .await
        .expect("cancellation interrupts the body read");
        assert_eq!(result, Err("cancelled".to_string()));
    }

    #[test]
    fn builtins_are_registered() {
        let registry = ToolRegistry::with_builtins();
        assert!(registry.get("echo").is_some());
        assert!(registry.get("http").is_some());
        assert!(registry.get("teleport").is_none());
    }
}
