//! API Routes
//!
//! Configures the Axum router with all query cache endpoints.

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    delete_query_handler, get_query_handler, health_handler, merge_handler, snapshot_handler,
    stats_handler, store_query_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `PUT /queries` - Merge fetched data into the cached query
/// - `GET /queries/*key` - Read a cached query
/// - `DELETE /queries/*key` - Drop a cached query
/// - `POST /merge` - Merge records without touching the cache
/// - `POST /snapshot` - Flush the cache to durable storage
/// - `GET /stats` - Get cache statistics
/// - `GET /health` - Health check endpoint
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/queries", put(store_query_handler))
        .route(
            "/queries/*key",
            get(get_query_handler).delete(delete_query_handler),
        )
        .route("/merge", post(merge_handler))
        .route("/snapshot", post(snapshot_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::QueryCache;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use std::time::Duration;
    use tower::util::ServiceExt;

    fn create_test_app() -> Router {
        let cache = QueryCache::new(100, Duration::from_secs(60), Duration::from_secs(300));
        create_router(AppState::in_memory(cache))
    }

    async fn status_of(request: Request<Body>) -> StatusCode {
        create_test_app().oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        assert_eq!(status_of(request).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_stats_endpoint() {
        let request = Request::builder().uri("/stats").body(Body::empty()).unwrap();
        assert_eq!(status_of(request).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_store_endpoint() {
        let request = Request::builder()
            .method("PUT")
            .uri("/queries")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"key":["item","1"],"data":{"title":"a"}}"#))
            .unwrap();
        assert_eq!(status_of(request).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_get_not_found() {
        let request = Request::builder()
            .uri("/queries/item/missing")
            .body(Body::empty())
            .unwrap();
        assert_eq!(status_of(request).await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_merge_endpoint() {
        let request = Request::builder()
            .method("POST")
            .uri("/merge")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"target":{"a":1},"sources":[{"b":2}]}"#))
            .unwrap();
        assert_eq!(status_of(request).await, StatusCode::OK);
    }
}
