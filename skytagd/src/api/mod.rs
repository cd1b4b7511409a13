use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use skytag::ResolveError;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/resolve", get(resolve))
        .route("/probe/{tag}", post(probe))
        .route("/reload", post(reload))
        .route("/status", get(status))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct ResolveQuery {
    tag: String,
    #[serde(default)]
    params: String,
    #[serde(default)]
    encoded: bool,
    /// Explicit mirror selection, 1-based.
    mirror: Option<usize>,
}

async fn resolve(State(state): State<Arc<AppState>>, Query(q): Query<ResolveQuery>) -> Response {
    let result = match q.mirror {
        Some(index) => {
            state
                .resolver
                .resolve_mirror(&q.tag, &q.params, q.encoded, index)
                .await
        }
        None => state.resolver.resolve(&q.tag, &q.params, q.encoded).await,
    };
    match result {
        Ok(resolved) => (StatusCode::OK, resolved).into_response(),
        Err(e @ ResolveError::NoSuchMirror { .. }) => {
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
        Err(e) => (StatusCode::NOT_FOUND, e.to_string()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct ProbeQuery {
    suffix: Option<String>,
}

async fn probe(
    State(state): State<Arc<AppState>>,
    Path(tag): Path<String>,
    Query(q): Query<ProbeQuery>,
) -> Json<serde_json::Value> {
    let tested = state
        .resolver
        .probe_and_reorder(&tag, q.suffix.as_deref())
        .await;
    Json(json!({ "tested": tested }))
}

async fn reload(State(state): State<Arc<AppState>>) -> Response {
    match state.resolver.reload().await {
        Ok(stats) => Json(json!({
            "entries": state.resolver.dictionary().len(),
            "records": stats.records,
            "committed": stats.committed,
        }))
        .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn status(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "entries": state.resolver.dictionary().len(),
        "pending_logs": state.resolver.logger().pending(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use skytag::{EngineConfig, Resolver};
    use std::io::Cursor;
    use tower::ServiceExt;

    fn test_state() -> Arc<AppState> {
        let resolver = Resolver::new(EngineConfig {
            network: false,
            ..Default::default()
        })
        .unwrap();
        resolver
            .load_reader(
                Cursor::new(
                    "%A Foo\n%U http://x/$1\n%A Bar\n%I M1\n%A M1\n%U http://one/\n".to_string(),
                ),
                true,
            )
            .unwrap();
        Arc::new(AppState { resolver })
    }

    async fn body_text(resp: Response) -> String {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn resolve_endpoint_round_trips() {
        let app = router(test_state());
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/resolve?tag=Foo&params=42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_text(resp).await, "http://x/42");
    }

    #[tokio::test]
    async fn unknown_tag_is_404() {
        let app = router(test_state());
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/resolve?tag=Nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn bad_mirror_index_is_400() {
        let app = router(test_state());
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/resolve?tag=Bar&mirror=5")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn status_reports_entries() {
        let app = router(test_state());
        let resp = app
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let v: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(v["entries"], 3);
        assert_eq!(v["pending_logs"], 0);
    }
}
