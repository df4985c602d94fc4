// src/routes/widgets.rs
//! Widget endpoints under `/api/v1/widgets`.
//!
//! Each handler validates its query string, then runs the matching insight
//! from [`crate::insights`] on one pooled connection within the configured
//! deadline. Responses are JSON; failures are rendered by [`AppError`].

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{Local, NaiveDate};
use serde::Deserialize;
use sqlx::PgPool;
use tracing::info;

use crate::error::AppError;
use crate::insights::{self, AtRiskPolicy, TOP_PRODUCTS_DEFAULT_LIMIT};
use crate::models::{
    AtRiskCustomersResponse, AvailableStore, ChannelPerformanceResponse, DeliveryHeatmapResponse,
    RevenueOverview, StoreChannel, StoreComparisonResponse, TopProductsFlexResponse,
    TopProductsResponse,
};
use crate::period::DateRange;
use crate::repository::{ProductSlot, SalesRepository, TopProductsFilter};
use crate::session;
use crate::Config;

// ---

pub fn router() -> Router<(PgPool, Config)> {
    // ---
    Router::new()
        .route("/top-products", get(top_products))
        .route("/top-products-flex", get(top_products_flex))
        .route("/delivery-heatmap", get(delivery_heatmap))
        .route("/delivery-heatmap-weekly", get(delivery_heatmap_weekly))
        .route("/at-risk-customers", get(at_risk_customers))
        .route("/channel-performance", get(channel_performance))
        .route("/revenue-overview", get(revenue_overview))
        .route("/store-comparison", get(store_comparison))
        .route("/available-stores", get(available_stores))
        .route("/store-channels", get(store_channels))
}

/// Server-local calendar date, captured once per request.
fn today() -> NaiveDate {
    Local::now().date_naive()
}

// --- Query parameters ---

#[derive(Debug, Deserialize)]
struct StoreQuery {
    store_id: i32,
}

#[derive(Debug, Deserialize)]
struct TopProductsQuery {
    store_id: i32,
    channel: String,
    day_of_week: u8,
    hour_start: Option<u8>,
    hour_end: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct TopProductsFlexQuery {
    store_id: i32,
    start_date: NaiveDate,
    end_date: NaiveDate,
    channel: Option<String>,
    day_of_week: Option<u8>,
    hour_start: Option<u8>,
    hour_end: Option<u8>,
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct OptionalPeriodQuery {
    store_id: i32,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
struct ChannelPerformanceQuery {
    store_id: i32,
    period_days: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct StoreComparisonQuery {
    store_a_id: i32,
    store_b_id: i32,
    start_date: NaiveDate,
    end_date: NaiveDate,
}

// --- Handlers ---

async fn top_products(
    Query(params): Query<TopProductsQuery>,
    State((pool, config)): State<(PgPool, Config)>,
) -> Result<Json<TopProductsResponse>, AppError> {
    // ---
    info!("GET /widgets/top-products - {:?}", params);

    let response = session::bounded(config.query_timeout, async {
        let mut conn = session::acquire(&pool).await?;
        let mut repo = SalesRepository::new(&mut conn);
        insights::top_products_insight(
            &mut repo,
            params.store_id,
            params.channel,
            params.day_of_week,
            params.hour_start.unwrap_or(0),
            params.hour_end.unwrap_or(23),
        )
        .await
    })
    .await?;

    info!(
        "GET /widgets/top-products - returning {} products",
        response.products.len()
    );
    Ok(Json(response))
}

async fn top_products_flex(
    Query(params): Query<TopProductsFlexQuery>,
    State((pool, config)): State<(PgPool, Config)>,
) -> Result<Json<TopProductsFlexResponse>, AppError> {
    // ---
    info!("GET /widgets/top-products-flex - {:?}", params);

    let slot = ProductSlot::new(
        params.channel,
        params.day_of_week,
        params.hour_start,
        params.hour_end,
        params.limit.unwrap_or(TOP_PRODUCTS_DEFAULT_LIMIT),
    )?;
    let range = DateRange::new(params.start_date, params.end_date)?;
    let filter = TopProductsFilter::new(params.store_id, range, slot)?;

    let response = session::bounded(config.query_timeout, async {
        let mut conn = session::acquire(&pool).await?;
        let mut repo = SalesRepository::new(&mut conn);
        insights::top_products_flexible(&mut repo, filter).await
    })
    .await?;

    Ok(Json(response))
}

async fn delivery_heatmap(
    Query(params): Query<OptionalPeriodQuery>,
    State((pool, config)): State<(PgPool, Config)>,
) -> Result<Json<DeliveryHeatmapResponse>, AppError> {
    // ---
    info!("GET /widgets/delivery-heatmap - {:?}", params);

    let range = DateRange::month_to_date(params.start_date, params.end_date, today())?;
    let response = session::bounded(config.query_timeout, async {
        let mut conn = session::acquire(&pool).await?;
        let mut repo = SalesRepository::new(&mut conn);
        insights::delivery_heatmap(&mut repo, params.store_id, range).await
    })
    .await?;

    Ok(Json(response))
}

async fn delivery_heatmap_weekly(
    Query(params): Query<StoreQuery>,
    State((pool, config)): State<(PgPool, Config)>,
) -> Result<Json<DeliveryHeatmapResponse>, AppError> {
    // ---
    info!("GET /widgets/delivery-heatmap-weekly - {:?}", params);

    let today = today();
    let response = session::bounded(config.query_timeout, async {
        let mut conn = session::acquire(&pool).await?;
        let mut repo = SalesRepository::new(&mut conn);
        insights::delivery_heatmap_weekly(&mut repo, params.store_id, today).await
    })
    .await?;

    Ok(Json(response))
}

async fn at_risk_customers(
    Query(params): Query<StoreQuery>,
    State((pool, config)): State<(PgPool, Config)>,
) -> Result<Json<AtRiskCustomersResponse>, AppError> {
    // ---
    info!("GET /widgets/at-risk-customers - {:?}", params);

    let today = today();
    let response = session::bounded(config.query_timeout, async {
        let mut conn = session::acquire(&pool).await?;
        let mut repo = SalesRepository::new(&mut conn);
        insights::at_risk_customers(&mut repo, params.store_id, today, AtRiskPolicy::default())
            .await
    })
    .await?;

    Ok(Json(response))
}

async fn channel_performance(
    Query(params): Query<ChannelPerformanceQuery>,
    State((pool, config)): State<(PgPool, Config)>,
) -> Result<Json<ChannelPerformanceResponse>, AppError> {
    // ---
    info!("GET /widgets/channel-performance - {:?}", params);

    let period_days = insights::channel_period_days(params.period_days)?;
    let today = today();
    let response = session::bounded(config.query_timeout, async {
        let mut conn = session::acquire(&pool).await?;
        let mut repo = SalesRepository::new(&mut conn);
        insights::channel_performance(&mut repo, params.store_id, period_days, today).await
    })
    .await?;

    Ok(Json(response))
}

async fn revenue_overview(
    Query(params): Query<OptionalPeriodQuery>,
    State((pool, config)): State<(PgPool, Config)>,
) -> Result<Json<RevenueOverview>, AppError> {
    // ---
    info!("GET /widgets/revenue-overview - {:?}", params);

    let range = DateRange::calendar_month(params.start_date, params.end_date, today())?;
    let response = session::bounded(config.query_timeout, async {
        let mut conn = session::acquire(&pool).await?;
        let mut repo = SalesRepository::new(&mut conn);
        insights::revenue_overview(&mut repo, params.store_id, range).await
    })
    .await?;

    Ok(Json(response))
}

async fn store_comparison(
    Query(params): Query<StoreComparisonQuery>,
    State((pool, config)): State<(PgPool, Config)>,
) -> Result<Json<StoreComparisonResponse>, AppError> {
    // ---
    info!("GET /widgets/store-comparison - {:?}", params);

    let range = DateRange::new(params.start_date, params.end_date)?;
    let response = session::bounded(config.query_timeout, async {
        let mut conn = session::acquire(&pool).await?;
        let mut repo = SalesRepository::new(&mut conn);
        insights::store_comparison(&mut repo, params.store_a_id, params.store_b_id, range).await
    })
    .await?;

    Ok(Json(response))
}

async fn available_stores(
    State((pool, config)): State<(PgPool, Config)>,
) -> Result<Json<Vec<AvailableStore>>, AppError> {
    // ---
    info!("GET /widgets/available-stores");

    let stores = session::bounded(config.query_timeout, async {
        let mut conn = session::acquire(&pool).await?;
        let mut repo = SalesRepository::new(&mut conn);
        insights::available_stores(&mut repo).await
    })
    .await?;

    Ok(Json(stores))
}

async fn store_channels(
    Query(params): Query<StoreQuery>,
    State((pool, config)): State<(PgPool, Config)>,
) -> Result<Json<Vec<StoreChannel>>, AppError> {
    // ---
    info!("GET /widgets/store-channels - {:?}", params);

    let channels = session::bounded(config.query_timeout, async {
        let mut conn = session::acquire(&pool).await?;
        let mut repo = SalesRepository::new(&mut conn);
        insights::store_channels(&mut repo, params.store_id).await
    })
    .await?;

    Ok(Json(channels))
}
