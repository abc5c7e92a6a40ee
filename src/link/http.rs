//! HTTP+JSON link to a running reasoning service.
//!
//! - `GET  {base}/health`: liveness, used by `open` and `probe`
//! - `POST {base}/rpc/{Method}`: body is the request's params object
//!
//! Any non-2xx status or unreadable body is a [`LinkError::Backend`].

use std::time::Duration;

use serde_json::Value;
use tokio::sync::RwLock;

use super::{Link, LinkError, LinkResult};
use crate::config::{BridgeConfig, Endpoint};
use crate::protocol::WireRequest;

/// HTTP client bound to one service base URL once opened.
pub struct HttpLink {
    http: reqwest::Client,
    base_url: RwLock<Option<String>>,
}

impl HttpLink {
    pub fn new(connect_timeout: Duration) -> LinkResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| LinkError::Setup {
                message: e.to_string(),
            })?;
        Ok(Self {
            http,
            base_url: RwLock::new(None),
        })
    }

    pub fn from_config(config: &BridgeConfig) -> LinkResult<Self> {
        Self::new(config.connect_timeout())
    }

    async fn health(&self, base_url: &str) -> LinkResult<()> {
        let url = format!("{base_url}/health");
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| LinkError::Unreachable {
                message: e.to_string(),
            })?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(LinkError::Unreachable {
                message: format!("health check returned {}", resp.status()),
            })
        }
    }
}

impl Link for HttpLink {
    async fn open(&self, endpoint: &Endpoint) -> LinkResult<()> {
        let base_url = endpoint.base_url();
        self.health(&base_url).await?;
        *self.base_url.write().await = Some(base_url);
        Ok(())
    }

    async fn call(&self, request: &WireRequest) -> LinkResult<Value> {
        let Some(base_url) = self.base_url.read().await.clone() else {
            return Err(LinkError::Closed);
        };
        let url = format!("{base_url}/rpc/{}", request.method());
        let body = request.params().map_err(|e| LinkError::Backend {
            message: format!("failed to encode request: {e}"),
        })?;

        tracing::debug!(%url, "posting request");
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    LinkError::Unreachable {
                        message: e.to_string(),
                    }
                } else {
                    LinkError::Backend {
                        message: e.to_string(),
                    }
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(LinkError::Backend {
                message: format!("HTTP {status}: {text}"),
            });
        }

        resp.json().await.map_err(|e| LinkError::Backend {
            message: format!("failed to parse JSON: {e}"),
        })
    }

    async fn close(&self) {
        *self.base_url.write().await = None;
    }

    async fn probe(&self, endpoint: &Endpoint) -> LinkResult<()> {
        self.health(&endpoint.base_url()).await
    }
}
