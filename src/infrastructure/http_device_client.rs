// HTTP device client implementation
use crate::application::device_client::{CommandReply, DeviceClient, StatusReply};
use crate::domain::command::CommandRequest;
use crate::domain::connection::ConnectionTarget;
use crate::domain::error::DeviceError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct HttpDeviceClient {
    client: reqwest::Client,
    status_path: String,
    command_path: String,
}

#[derive(Serialize)]
struct CommandBody<'a> {
    name: &'a str,
    args: &'a Map<String, Value>,
}

impl HttpDeviceClient {
    pub fn new(status_path: impl Into<String>, command_path: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            status_path: normalize_path(status_path.into()),
            command_path: normalize_path(command_path.into()),
        }
    }

    fn url(&self, target: &ConnectionTarget, path: &str) -> String {
        format!("{}{}", target.base_url(), path)
    }

    /// Read a successful JSON body or translate the failure.
    async fn read_json(response: reqwest::Response) -> Result<Value, DeviceError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeviceError::BadResponse(format!(
                "status {}: {}",
                status,
                truncate(&body, 200)
            )));
        }

        let bytes = response.bytes().await.map_err(translate)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| DeviceError::BadResponse(format!("body is not JSON: {}", e)))
    }
}

impl Default for HttpDeviceClient {
    fn default() -> Self {
        Self::new("/status", "/command")
    }
}

#[async_trait]
impl DeviceClient for HttpDeviceClient {
    async fn fetch_status(
        &self,
        target: &ConnectionTarget,
        timeout: Duration,
    ) -> Result<StatusReply, DeviceError> {
        let url = self.url(target, &self.status_path);
        let start = Instant::now();

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .timeout(timeout)
            .send()
            .await
            .map_err(translate)?;
        let body = Self::read_json(response).await?;

        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
        tracing::debug!("GET {} answered in {:.2} ms", url, latency_ms);
        Ok(StatusReply { body, latency_ms })
    }

    async fn send_command(
        &self,
        target: &ConnectionTarget,
        request: &CommandRequest,
        timeout: Duration,
    ) -> Result<CommandReply, DeviceError> {
        let url = self.url(target, &self.command_path);
        let empty = Map::new();
        let body = CommandBody {
            name: &request.name,
            args: request.args.as_ref().unwrap_or(&empty),
        };
        let start = Instant::now();

        let response = self
            .client
            .post(&url)
            .json(&body)
            .timeout(timeout)
            .send()
            .await
            .map_err(translate)?;
        let payload = Self::read_json(response).await?;

        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
        tracing::debug!("POST {} '{}' answered in {:.2} ms", url, request.name, latency_ms);

        if let Some(reason) = rejection_reason(&payload) {
            return Err(DeviceError::Rejected(reason));
        }
        Ok(CommandReply { payload, latency_ms })
    }
}

fn translate(err: reqwest::Error) -> DeviceError {
    if err.is_timeout() {
        DeviceError::Timeout
    } else if err.is_decode() || err.is_body() {
        DeviceError::BadResponse(err.to_string())
    } else {
        DeviceError::Unreachable(err.to_string())
    }
}

/// `Some(reason)` when a 2xx reply reports `ok: false` or `success: false`.
fn rejection_reason(payload: &Value) -> Option<String> {
    let failed = ["ok", "success"]
        .iter()
        .any(|key| payload.get(*key) == Some(&Value::Bool(false)));
    if !failed {
        return None;
    }

    let reason = ["message", "error"]
        .iter()
        .find_map(|key| payload.get(*key).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| payload.to_string());
    Some(reason)
}

fn normalize_path(path: String) -> String {
    if path.starts_with('/') {
        path
    } else {
        format!("/{}", path)
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;

    async fn serve(router: Router) -> ConnectionTarget {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        ConnectionTarget::new("127.0.0.1", port, 1.0).unwrap()
    }

    const TIMEOUT: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn test_fetch_status_returns_body_and_latency() {
        let target = serve(Router::new().route(
            "/status",
            get(|| async { Json(json!({"st": "RUN", "tmp1": 35.5})) }),
        ))
        .await;

        let reply = HttpDeviceClient::default()
            .fetch_status(&target, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(reply.body, json!({"st": "RUN", "tmp1": 35.5}));
        assert!(reply.latency_ms >= 0.0);
    }

    #[tokio::test]
    async fn test_fetch_status_error_status_is_bad_response() {
        let target = serve(Router::new().route(
            "/status",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        ))
        .await;

        let err = HttpDeviceClient::default()
            .fetch_status(&target, TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceError::BadResponse(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn test_fetch_status_non_json_is_bad_response() {
        let target = serve(Router::new().route("/status", get(|| async { "not json" }))).await;

        let err = HttpDeviceClient::default()
            .fetch_status(&target, TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceError::BadResponse(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn test_fetch_status_slow_device_times_out() {
        let target = serve(Router::new().route(
            "/status",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({}))
            }),
        ))
        .await;

        let err = HttpDeviceClient::default()
            .fetch_status(&target, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert_eq!(err, DeviceError::Timeout);
    }

    #[tokio::test]
    async fn test_fetch_status_closed_port_is_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let target = ConnectionTarget::new("127.0.0.1", port, 1.0).unwrap();

        let err = HttpDeviceClient::default()
            .fetch_status(&target, TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceError::Unreachable(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn test_send_command_posts_name_and_args() {
        let target = serve(Router::new().route(
            "/command",
            post(|Json(body): Json<Value>| async move {
                Json(json!({"ok": true, "echo": body}))
            }),
        ))
        .await;

        let mut args = Map::new();
        args.insert("mode".to_string(), json!("IDLE"));
        let request = CommandRequest::new("set_mode").with_args(args);

        let reply = HttpDeviceClient::default()
            .send_command(&target, &request, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(
            reply.payload["echo"],
            json!({"name": "set_mode", "args": {"mode": "IDLE"}})
        );
    }

    #[tokio::test]
    async fn test_send_command_application_failure_is_rejected() {
        let target = serve(Router::new().route(
            "/command",
            post(|| async { Json(json!({"ok": false, "message": "Unknown command"})) }),
        ))
        .await;

        let err = HttpDeviceClient::default()
            .send_command(&target, &CommandRequest::new("explode"), TIMEOUT)
            .await
            .unwrap_err();
        assert_eq!(err, DeviceError::Rejected("Unknown command".to_string()));
    }

    #[test]
    fn test_rejection_reason() {
        assert_eq!(rejection_reason(&json!({"ok": true})), None);
        assert_eq!(rejection_reason(&json!({"message": "fine"})), None);
        assert_eq!(
            rejection_reason(&json!({"success": false, "error": "busy"})),
            Some("busy".to_string())
        );
        assert_eq!(
            rejection_reason(&json!({"ok": false})),
            Some("{\"ok\":false}".to_string())
        );
    }

    #[test]
    fn test_paths_are_normalized() {
        let client = HttpDeviceClient::new("status", "/cmd");
        let target = ConnectionTarget::new("10.0.0.2", 80, 1.0).unwrap();
        assert_eq!(client.url(&target, &client.status_path), "http://10.0.0.2:80/status");
        assert_eq!(client.url(&target, &client.command_path), "http://10.0.0.2:80/cmd");
    }
}
