//! HTTP connector for the backend event-stream endpoint.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use tokio_util::sync::CancellationToken;

use super::{ByteStream, Trigger, Upstream};
use crate::types::{Error, Result, UpstreamConfig};

/// `reqwest`-backed [`Upstream`].
///
/// The client carries no overall request timeout: event streams are
/// unbounded, and the connect budget is enforced by the relay's watchdog
/// through the cancellation token.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    client: reqwest::Client,
    config: UpstreamConfig,
}

impl HttpConnector {
    pub fn new(config: UpstreamConfig) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Upstream for HttpConnector {
    async fn open(&self, trigger: &Trigger, cancel: CancellationToken) -> Result<ByteStream> {
        let url = self.config.stream_url();
        let endpoint = trigger.endpoint_or(&self.config.default_endpoint);
        tracing::debug!("Connecting to backend stream: {} (endpoint={})", url, endpoint);

        let request = self
            .client
            .get(&url)
            .query(&[("request", trigger.request()), ("endpoint", endpoint)])
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(Error::cancelled("upstream request aborted before response"));
            }
            response = request => response?,
        };

        let status = response.status();
        tracing::debug!("Backend response received: {}", status);
        if !status.is_success() {
            return Err(Error::upstream_rejected(
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown"),
            ));
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| Error::stream_read(e.to_string())))
            .take_until(cancel.cancelled_owned());
        Ok(body.boxed())
    }

    async fn health(&self) -> Result<()> {
        let response = self
            .client
            .get(self.config.health_url())
            .timeout(self.config.health_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::upstream_rejected(
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown"),
            ));
        }
        Ok(())
    }
}
