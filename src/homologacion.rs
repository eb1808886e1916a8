//! Client for the remote homologaciones approval API.
//!
//! A single GET against the fixed endpoint, no retry, no pagination.
//! Non-2xx responses and transport failures surface as one descriptive
//! error; the JSON body is passed through untouched.

use crate::error::ToolError;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};

/// Remote endpoint returning approved homologaciones.
const APPROVED_ENDPOINT: &str =
    "https://apphomologaciones-stg.cunapp.pro/api/v1/homologaciones?estatus=Aprobado";
/// Timeout for the outbound HTTP request.
const HTTP_TIMEOUT_SECS: u64 = 30;

pub struct ApprovalGateway {
    http_client: Client,
    endpoint: String,
}

impl Default for ApprovalGateway {
    fn default() -> Self {
        Self::with_endpoint(APPROVED_ENDPOINT)
    }
}

impl ApprovalGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            http_client: Client::builder()
                .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
                .build()
                .expect("Failed to create HTTP client"),
            endpoint: endpoint.into(),
        }
    }

    /// Fetch the approved records as raw JSON.
    pub async fn fetch_approved(&self) -> Result<Value, ToolError> {
        debug!(endpoint = %self.endpoint, "Fetching approved homologaciones");
        let response = self
            .http_client
            .get(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "Homologaciones API returned an error");
            return Err(ToolError::HttpStatus {
                status: status.as_u16(),
                body: truncate(&body, 200),
            });
        }

        Ok(response.json().await?)
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

/// One-shot HTTP stub shared by the gateway and server tests.
#[cfg(test)]
pub(crate) mod test_support {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response on an ephemeral port and return the
    /// endpoint URL to point a gateway at.
    pub(crate) async fn one_shot_server(status_line: &'static str, body: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf).await;
                let response = format!(
                    "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{addr}/api/v1/homologaciones?estatus=Aprobado")
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::one_shot_server;
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn fetch_approved_passes_json_through() {
        let payload = json!([{"id": 1, "estatus": "Aprobado"}]);
        let endpoint = one_shot_server("HTTP/1.1 200 OK", payload.to_string()).await;
        let gateway = ApprovalGateway::with_endpoint(endpoint);
        let data = gateway.fetch_approved().await.expect("should succeed");
        assert_eq!(data, payload);
    }

    #[tokio::test]
    async fn non_2xx_surfaces_as_single_error() {
        let endpoint =
            one_shot_server("HTTP/1.1 503 Service Unavailable", "down".to_string()).await;
        let gateway = ApprovalGateway::with_endpoint(endpoint);
        let err = gateway.fetch_approved().await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn connection_refused_surfaces_as_single_error() {
        let gateway = ApprovalGateway::with_endpoint("http://127.0.0.1:9/unreachable");
        assert!(gateway.fetch_approved().await.is_err());
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate("short", 200), "short");
        let long = "á".repeat(200);
        assert!(truncate(&long, 201).ends_with("..."));
    }
}
