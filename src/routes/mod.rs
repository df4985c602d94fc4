use axum::http::{HeaderName, HeaderValue, Request};
use axum::Router;
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::Config;

mod health;
mod reports;
mod widgets;

// ---

const REQUEST_ID_HEADER: &str = "x-request-id";

/// UUID v4 request ids.
#[derive(Clone, Default)]
struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

pub fn router(pool: PgPool, config: Config) -> Router {
    // ---
    Router::new()
        .nest("/api/v1/widgets", widgets::router())
        .nest("/api/v1/reports", reports::router())
        .merge(health::router())
        .with_state((pool, config))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
            REQUEST_ID_HEADER,
        )))
        .layer(SetRequestIdLayer::new(
            HeaderName::from_static(REQUEST_ID_HEADER),
            UuidRequestId,
        ))
}
