//! Transports for the workflow event stream
//!
//! `HttpTransport` keeps one `reqwest::Client` for the whole session so
//! connections and TLS sessions are reused between runs.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::workflow::{RunRequest, WorkflowKind};

/// Raw chunks as they come off the connection
pub type ByteStream = BoxStream<'static, Result<Vec<u8>>>;

/// Opens the push connection for one run
#[async_trait]
pub trait EventTransport: Send + Sync {
    async fn connect(&self, request: &RunRequest) -> Result<ByteStream>;
}

/// Health report of the workflow API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub tools_available: BTreeMap<String, bool>,
    #[serde(default)]
    pub models_configured: BTreeMap<String, String>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status.eq_ignore_ascii_case("healthy")
    }
}

/// Streaming HTTP transport against the workflow API
pub struct HttpTransport {
    client: Client,
    api_url: String,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| ClientError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    /// Streaming endpoint of a workflow kind
    pub fn stream_url(&self, kind: WorkflowKind) -> String {
        format!("{}/workflows/{}/stream", self.api_url, kind.as_str())
    }

    /// Fetch the API health report
    pub async fn health(&self) -> Result<HealthStatus> {
        let response = self
            .client
            .get(format!("{}/health", self.api_url))
            .timeout(Duration::from_secs(30))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Http {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<HealthStatus>().await?)
    }
}

#[async_trait]
impl EventTransport for HttpTransport {
    async fn connect(&self, request: &RunRequest) -> Result<ByteStream> {
        let url = self.stream_url(request.kind);
        tracing::debug!(url = %url, "[EventChannel] Connecting");

        let response = self
            .client
            .get(&url)
            .query(&request.query_pairs())
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Http {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(ClientError::from))
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::Tool;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport_for(server: &MockServer) -> HttpTransport {
        let config = ClientConfig {
            api_url: format!("{}/api/v1", server.uri()),
            ..ClientConfig::default()
        };
        HttpTransport::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_connect_streams_body_with_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/workflows/tool-research/stream"))
            .and(query_param("topic", "quantum computing"))
            .and(query_param("tools", "arxiv,tavily"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string("data: {\"type\":\"start\"}\n\ndata: {\"type\":\"complete\"}\n\n"),
            )
            .mount(&server)
            .await;

        let request = RunRequest::new(WorkflowKind::ToolResearch, "quantum computing")
            .with_tools(vec![Tool::Arxiv, Tool::Tavily]);
        let mut stream = transport_for(&server).connect(&request).await.unwrap();

        let mut body = Vec::new();
        while let Some(chunk) = stream.next().await {
            body.extend(chunk.unwrap());
        }
        assert!(String::from_utf8(body).unwrap().contains("\"complete\""));
    }

    #[tokio::test]
    async fn test_connect_maps_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let request = RunRequest::new(WorkflowKind::Reflection, "topic");
        match transport_for(&server).connect(&request).await {
            Err(ClientError::Http { status, body }) => {
                assert_eq!(status, 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("expected HTTP error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_health() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "healthy",
                "version": "1.0.0",
                "timestamp": "2025-01-01T00:00:00",
                "tools_available": {"arxiv": true, "tavily": false},
                "models_configured": {"draft": "openai:gpt-4o"}
            })))
            .mount(&server)
            .await;

        let health = transport_for(&server).health().await.unwrap();
        assert!(health.is_healthy());
        assert_eq!(health.tools_available.get("tavily"), Some(&false));
    }
}
