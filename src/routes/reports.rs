// src/routes/reports.rs
//! Report downloads under `/api/v1/reports`.

use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    routing::get,
    Router,
};
use chrono::Local;
use sqlx::PgPool;
use tracing::info;

use crate::error::AppError;
use crate::report::{self, ReportRequest};
use crate::repository::SalesRepository;
use crate::session;
use crate::Config;

// ---

pub fn router() -> Router<(PgPool, Config)> {
    Router::new().route("/store-performance", get(store_performance))
}

/// Handle `GET /reports/store-performance?store_ids=..&start_date=..&end_date=..`.
///
/// The query is read as raw pairs so `store_ids` can repeat. Input is
/// validated before a connection is acquired.
async fn store_performance(
    Query(pairs): Query<Vec<(String, String)>>,
    State((pool, config)): State<(PgPool, Config)>,
) -> Result<impl IntoResponse, AppError> {
    // ---
    let request = ReportRequest::from_query_pairs(&pairs)?;
    info!("GET /reports/store-performance - {:?}", request);

    let generated_at = Local::now().naive_local();
    let report = session::bounded(config.query_timeout, async {
        let mut conn = session::acquire(&pool).await?;
        let mut repo = SalesRepository::new(&mut conn);
        report::build_store_performance_report(&mut repo, &request, generated_at).await
    })
    .await?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={}", report.filename),
            ),
        ],
        report.body,
    ))
}
