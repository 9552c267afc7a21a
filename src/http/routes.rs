//! Route handlers.

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;

use super::error::ApiError;
use crate::relay::Relay;
use crate::types::{Error, SessionId, UpstreamConfig};
use crate::upstream::Trigger;

/// Path of the relay endpoint (GET streams, POST initiates).
pub const STREAM_ROUTE: &str = "/api/generate-docs";

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub relay: Relay,
    pub upstream: Arc<UpstreamConfig>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(STREAM_ROUTE, get(stream_docs).post(start_docs))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}

#[derive(Debug, Deserialize)]
struct StreamParams {
    request: Option<String>,
    endpoint: Option<String>,
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

/// Open a relay session and stream its frames back.
async fn stream_docs(State(state): State<AppState>, Query(params): Query<StreamParams>) -> Response {
    let trigger = match Trigger::new(params.request, params.endpoint) {
        Ok(trigger) => trigger,
        Err(e) => {
            tracing::debug!("Rejected stream request: {}", e);
            return (StatusCode::BAD_REQUEST, "Missing request parameter").into_response();
        }
    };
    let session_id = params
        .session_id
        .and_then(|id| SessionId::from_string(id).ok())
        .unwrap_or_default();

    let frames = state.relay.open_with_id(trigger, session_id);
    let body = Body::from_stream(frames.map(Ok::<_, Infallible>));

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "GET"),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
        ],
        body,
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct StartRequest {
    request: Option<String>,
    endpoint: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartResponse {
    success: bool,
    session_id: SessionId,
    message: String,
    stream_url: String,
    backend_status: String,
}

/// Probe the backend and hand out the URL of a fresh session.
async fn start_docs(
    State(state): State<AppState>,
    Json(body): Json<StartRequest>,
) -> Result<Json<StartResponse>, ApiError> {
    let trigger = Trigger::new(body.request, body.endpoint)
        .map_err(|_| ApiError::bad_request("Missing request parameter"))?;

    if let Err(e) = state.relay.upstream().health().await {
        tracing::warn!("Backend health check failed: {}", e);
        return Err(ApiError::backend_unreachable(format!(
            "Make sure the backend server is running on {}",
            state.upstream.base_url
        )));
    }

    let session_id = SessionId::new();
    let stream_url = stream_url(
        &trigger,
        trigger.endpoint_or(&state.upstream.default_endpoint),
        &session_id,
    )?;
    tracing::info!(session = %session_id, "Documentation session initiated");

    Ok(Json(StartResponse {
        success: true,
        session_id,
        message: "Documentation generation initiated".to_string(),
        stream_url,
        backend_status: "connected".to_string(),
    }))
}

/// Relative URL of the GET route with the trigger encoded as query parameters.
fn stream_url(trigger: &Trigger, endpoint: &str, session_id: &SessionId) -> Result<String, Error> {
    let mut url = reqwest::Url::parse("http://relay.invalid")
        .and_then(|base| base.join(STREAM_ROUTE))
        .map_err(|e| Error::internal(e.to_string()))?;
    url.query_pairs_mut()
        .append_pair("request", trigger.request())
        .append_pair("endpoint", endpoint)
        .append_pair("sessionId", session_id.as_str());
    Ok(format!("{}?{}", url.path(), url.query().unwrap_or_default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RelayConfig, Result};
    use crate::upstream::{ByteStream, Upstream};
    use async_trait::async_trait;
    use axum::http::Request;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    #[derive(Debug)]
    struct FixedHealth {
        healthy: bool,
    }

    #[async_trait]
    impl Upstream for FixedHealth {
        async fn open(&self, _trigger: &Trigger, _cancel: CancellationToken) -> Result<ByteStream> {
            let frames: Vec<Result<bytes::Bytes>> = vec![Ok(bytes::Bytes::from_static(
                b"data: {\"type\":\"complete\",\"documentation\":\"# Docs\"}\n\n",
            ))];
            Ok(futures::stream::iter(frames).boxed())
        }

        async fn health(&self) -> Result<()> {
            if self.healthy {
                Ok(())
            } else {
                Err(Error::transport_unreachable("connection refused"))
            }
        }
    }

    fn app(healthy: bool) -> Router {
        let relay = Relay::new(
            Arc::new(FixedHealth { healthy }),
            RelayConfig::default(),
            Duration::from_secs(60),
        );
        build_router(AppState {
            relay,
            upstream: Arc::new(UpstreamConfig::default()),
        })
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app(true)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn test_stream_requires_request_param() {
        let response = app(true)
            .oneshot(
                Request::builder()
                    .uri("/api/generate-docs?endpoint=whatsnew")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"Missing request parameter");
    }

    #[tokio::test]
    async fn test_stream_headers_and_frames() {
        let response = app(true)
            .oneshot(
                Request::builder()
                    .uri("/api/generate-docs?request=new%20products&endpoint=whatsnew")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(headers[header::CACHE_CONTROL], "no-cache");
        assert_eq!(headers[header::CONNECTION], "keep-alive");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        let frames: Vec<&str> = text.split_terminator("\n\n").collect();
        assert_eq!(frames.len(), 2);
        assert!(frames[0].contains("\"type\":\"connecting\""));
        assert!(frames[1].contains("\"type\":\"complete\""));
    }

    #[tokio::test]
    async fn test_start_returns_stream_url() {
        let response = app(true)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/generate-docs")
                    .header("Content-Type", "application/json")
                    .body(Body::from(r#"{"request": "Trader Joe's new items"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["backendStatus"], "connected");
        let session_id = body["sessionId"].as_str().unwrap();
        assert!(session_id.starts_with("doc-"));
        let stream_url = body["streamUrl"].as_str().unwrap();
        assert!(stream_url.starts_with("/api/generate-docs?request=Trader+Joe%27s+new+items"));
        assert!(stream_url.contains("endpoint=generated-endpoint"));
        assert!(stream_url.ends_with(&format!("sessionId={}", session_id)));
    }

    #[tokio::test]
    async fn test_start_fails_fast_when_backend_down() {
        let response = app(false)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/generate-docs")
                    .header("Content-Type", "application/json")
                    .body(Body::from(r#"{"request": "docs", "endpoint": "whatsnew"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = json_body(response).await;
        assert_eq!(body["error"], "Cannot connect to backend");
        assert_eq!(body["healthCheck"], false);
        assert!(body["details"]
            .as_str()
            .unwrap()
            .contains("http://localhost:5000"));
    }

    #[tokio::test]
    async fn test_start_requires_request() {
        let response = app(true)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/generate-docs")
                    .header("Content-Type", "application/json")
                    .body(Body::from(r#"{"endpoint": "whatsnew"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "Missing request parameter");
    }
}
