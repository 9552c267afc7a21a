//! Upstream side of the relay: the trigger that starts a session and the
//! connector that turns it into a live byte stream.

pub mod connector;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::types::{Error, Result};

pub use connector::HttpConnector;

/// Raw upstream body, chunked however the transport delivers it.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Inbound request that starts one relay session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    request: String,
    endpoint: Option<String>,
}

impl Trigger {
    /// Validate the free-text request; a blank endpoint counts as absent.
    pub fn new(request: Option<String>, endpoint: Option<String>) -> Result<Self> {
        let request = request
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| Error::malformed_trigger("Missing request parameter"))?;
        let endpoint = endpoint.filter(|e| !e.trim().is_empty());
        Ok(Self { request, endpoint })
    }

    pub fn request(&self) -> &str {
        &self.request
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    pub fn endpoint_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.endpoint.as_deref().unwrap_or(default)
    }
}

/// Backend event source.
///
/// Implementations must observe `cancel` while waiting for response headers
/// and while the returned stream is being read.
#[async_trait]
pub trait Upstream: Send + Sync + std::fmt::Debug {
    /// Open the event stream for `trigger`.
    async fn open(&self, trigger: &Trigger, cancel: CancellationToken) -> Result<ByteStream>;

    /// Readiness probe, run before a session is handed out.
    async fn health(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_requires_request() {
        let err = Trigger::new(None, Some("x".to_string())).unwrap_err();
        assert!(matches!(err, Error::MalformedTrigger(_)));
        let err = Trigger::new(Some("   ".to_string()), None).unwrap_err();
        assert!(matches!(err, Error::MalformedTrigger(_)));
    }

    #[test]
    fn test_trigger_endpoint_defaults() {
        let trigger = Trigger::new(Some("docs for whatsnew".to_string()), Some(String::new())).unwrap();
        assert_eq!(trigger.endpoint(), None);
        assert_eq!(trigger.endpoint_or("generated-endpoint"), "generated-endpoint");

        let trigger = Trigger::new(Some("docs".to_string()), Some("whatsnew".to_string())).unwrap();
        assert_eq!(trigger.request(), "docs");
        assert_eq!(trigger.endpoint_or("generated-endpoint"), "whatsnew");
    }
}
