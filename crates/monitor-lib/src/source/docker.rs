//! Docker Engine stats adapter
//!
//! Consumes two endpoints of the engine HTTP API:
//! - `GET /containers/{id}/json` to resolve the container at startup
//! - `GET /containers/{id}/stats?stream=true` for the unbounded
//!   newline-delimited JSON stats stream
//!
//! The endpoint is a TCP/HTTP address (`DOCKER_HOST` style). Unix
//! socket transports are not supported by this adapter.

use super::{StatsSource, StatsStream};
use crate::error::{ConnectError, StreamError};
use crate::models::StatsSnapshot;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::pin::Pin;
use std::time::Duration;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info};
use url::Url;

/// Default engine endpoint, the conventional local TCP address.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:2375";

/// Configuration for the Docker stats source
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Engine endpoint, e.g. "http://localhost:2375"
    pub endpoint: String,
    /// Timeout for establishing connections to the engine
    pub connect_timeout: Duration,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Stats source backed by the Docker Engine HTTP API.
pub struct DockerStatsSource {
    client: reqwest::Client,
    /// Endpoint with any trailing slash removed
    base: String,
}

/// Subset of the inspect response needed at startup
#[derive(Debug, Deserialize)]
struct ContainerInspect {
    #[serde(rename = "Config")]
    config: InspectConfig,
}

#[derive(Debug, Deserialize)]
struct InspectConfig {
    #[serde(rename = "Image")]
    image: String,
}

impl DockerStatsSource {
    pub fn new(config: SourceConfig) -> Result<Self, ConnectError> {
        let url = Url::parse(&config.endpoint).map_err(|e| ConnectError::InvalidEndpoint {
            endpoint: config.endpoint.clone(),
            reason: e.to_string(),
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConnectError::InvalidEndpoint {
                endpoint: config.endpoint.clone(),
                reason: format!("unsupported scheme {}", url.scheme()),
            });
        }

        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ConnectError::Unreachable {
                endpoint: config.endpoint.clone(),
                source: e,
            })?;

        Ok(Self {
            client,
            base: config.endpoint.trim_end_matches('/').to_string(),
        })
    }

    /// Resolve the container, failing fast when it does not exist.
    async fn inspect(&self, container_id: &str) -> Result<ContainerInspect, ConnectError> {
        let url = format!("{}/containers/{}/json", self.base, container_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ConnectError::Unreachable {
                endpoint: self.base.clone(),
                source: e,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(ConnectError::ContainerNotFound {
                id: container_id.to_string(),
            }),
            status if status.is_success() => {
                response
                    .json()
                    .await
                    .map_err(|e| ConnectError::Unreachable {
                        endpoint: self.base.clone(),
                        source: e,
                    })
            }
            status => Err(ConnectError::Api {
                id: container_id.to_string(),
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            }),
        }
    }
}

#[async_trait]
impl StatsSource for DockerStatsSource {
    async fn open(&self, container_id: &str) -> Result<Box<dyn StatsStream>, ConnectError> {
        let inspect = self.inspect(container_id).await?;
        info!(
            container_id = %container_id,
            image = %inspect.config.image,
            "Resolved container"
        );

        let url = format!("{}/containers/{}/stats?stream=true", self.base, container_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ConnectError::Unreachable {
                endpoint: self.base.clone(),
                source: e,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(ConnectError::ContainerNotFound {
                id: container_id.to_string(),
            }),
            status if status.is_success() => {
                debug!(container_id = %container_id, "Stats stream open");
                let chunks = response.bytes_stream().map(|chunk| chunk.map(|b| b.to_vec()));
                Ok(Box::new(DockerStatsStream {
                    chunks: Box::pin(chunks),
                    buf: Vec::new(),
                }))
            }
            status => Err(ConnectError::Api {
                id: container_id.to_string(),
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            }),
        }
    }
}

/// Newline-delimited JSON framing over the chunked stats body.
struct DockerStatsStream {
    chunks: Pin<Box<dyn Stream<Item = Result<Vec<u8>, reqwest::Error>> + Send + Sync>>,
    buf: Vec<u8>,
}

impl DockerStatsStream {
    /// Take one complete line out of the buffer, stripping the line
    /// terminator. Returns None until a full line has arrived.
    fn take_line(&mut self) -> Option<Vec<u8>> {
        let pos = self.buf.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(line)
    }
}

#[async_trait]
impl StatsStream for DockerStatsStream {
    async fn next_sample(&mut self) -> Result<StatsSnapshot, StreamError> {
        loop {
            if let Some(line) = self.take_line() {
                if line.is_empty() {
                    continue;
                }
                return Ok(serde_json::from_slice(&line)?);
            }

            match self.chunks.next().await {
                Some(Ok(chunk)) => self.buf.extend_from_slice(&chunk),
                Some(Err(e)) => return Err(StreamError::Transport(e)),
                None => return Err(StreamError::Ended),
            }
        }
    }
}
