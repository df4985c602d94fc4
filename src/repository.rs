//! Read-only aggregation queries over the sales dataset.
//!
//! A [`SalesRepository`] borrows one database connection for the lifetime of
//! a request and runs its queries on it in sequence. Every query restricts
//! itself to `sale_status_desc = 'COMPLETED'`. Aggregates are cast to
//! `float8`/`bigint` in SQL so rows decode into plain Rust numbers; all
//! percentage and delta arithmetic happens in [`crate::period`].

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::{PgConnection, Postgres, QueryBuilder};

use crate::error::AppError;
use crate::period::DateRange;

// ---

/// Placeholders for delivery addresses missing a neighborhood or city.
pub const UNKNOWN_NEIGHBORHOOD: &str = "Sem bairro";
pub const UNKNOWN_CITY: &str = "Sem cidade";

/// Length of the windows compared by the top-products week-over-week delta.
pub const COMPARISON_WEEK_DAYS: u32 = 7;

/// Dimension filters and row limit for a top-products query, validated
/// independently of the date window.
///
/// `day_of_week` uses 1 = Monday .. 7 = Sunday. `hours` is inclusive on both
/// ends.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductSlot {
    pub channel: Option<String>,
    pub day_of_week: Option<u8>,
    pub hours: Option<(u8, u8)>,
    pub limit: i64,
}

impl ProductSlot {
    // ---
    /// Validate raw request values.
    ///
    /// A blank channel counts as absent; an hour range only applies when both
    /// ends are given.
    pub fn new(
        channel: Option<String>,
        day_of_week: Option<u8>,
        hour_start: Option<u8>,
        hour_end: Option<u8>,
        limit: i64,
    ) -> Result<Self, AppError> {
        if let Some(day) = day_of_week {
            if !(1..=7).contains(&day) {
                return Err(AppError::InvalidInput(format!(
                    "day_of_week must be between 1 and 7, got {day}"
                )));
            }
        }
        for hour in [hour_start, hour_end].into_iter().flatten() {
            if hour > 23 {
                return Err(AppError::InvalidInput(format!(
                    "hours must be between 0 and 23, got {hour}"
                )));
            }
        }
        let hours = match (hour_start, hour_end) {
            (Some(start), Some(end)) if start > end => {
                return Err(AppError::InvalidInput(format!(
                    "hour_start {start} must not exceed hour_end {end}"
                )));
            }
            (Some(start), Some(end)) => Some((start, end)),
            _ => None,
        };
        if !(1..=50).contains(&limit) {
            return Err(AppError::InvalidInput(format!(
                "limit must be between 1 and 50, got {limit}"
            )));
        }

        let channel = channel
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        Ok(Self {
            channel,
            day_of_week,
            hours,
            limit,
        })
    }
}

/// Filters for the top-products aggregation.
///
/// Quantities, revenue and shares cover `range`. The week-over-week delta
/// compares `week`, the last 7 days of `range`, with `prior_week`.
#[derive(Debug, Clone, PartialEq)]
pub struct TopProductsFilter {
    pub store_id: i32,
    pub range: DateRange,
    pub week: DateRange,
    pub prior_week: DateRange,
    pub channel: Option<String>,
    pub day_of_week: Option<u8>,
    pub hours: Option<(u8, u8)>,
    pub limit: i64,
}

impl TopProductsFilter {
    // ---
    pub fn new(store_id: i32, range: DateRange, slot: ProductSlot) -> Result<Self, AppError> {
        let week = DateRange::trailing(range.end, COMPARISON_WEEK_DAYS)?;
        let prior_week = week.previous()?;
        Ok(Self {
            store_id,
            range,
            week,
            prior_week,
            channel: slot.channel,
            day_of_week: slot.day_of_week,
            hours: slot.hours,
            limit: slot.limit,
        })
    }

    /// Every date the query reads, from the earliest window start to the
    /// end of `range`.
    pub fn span(&self) -> DateRange {
        DateRange {
            start: self.range.start.min(self.prior_week.start),
            end: self.range.end,
        }
    }

    /// Same filter with the channel dropped.
    pub fn without_channel(&self) -> Self {
        Self {
            channel: None,
            ..self.clone()
        }
    }

    /// Store and date range only.
    pub fn period_only(&self) -> Self {
        Self {
            channel: None,
            day_of_week: None,
            hours: None,
            ..self.clone()
        }
    }
}

/// PostgreSQL `EXTRACT(DOW ...)` value (0 = Sunday) for a 1 = Monday .. 7 =
/// Sunday day of week.
pub fn postgres_dow(day_of_week: u8) -> i32 {
    i32::from(day_of_week % 7)
}

// --- Row types ---

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct TopProductRow {
    pub product_name: String,
    pub total_quantity: i64,
    pub total_revenue: f64,
    /// Revenue of every product matching the filters, before `LIMIT`.
    pub window_revenue: f64,
    pub week_quantity: i64,
    pub previous_week_quantity: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct DeliveryRegionRow {
    pub neighborhood: String,
    pub city: String,
    pub delivery_count: i64,
    pub avg_delivery_seconds: Option<f64>,
    pub p90_delivery_seconds: Option<f64>,
    pub previous_avg_delivery_seconds: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct AtRiskCustomerRow {
    pub customer_id: i32,
    pub customer_name: Option<String>,
    pub total_orders: i64,
    pub last_order_date: NaiveDate,
    pub days_since_last_order: i32,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ChannelPerformanceRow {
    pub channel_name: String,
    pub total_sales: f64,
    pub total_orders: i64,
    pub average_ticket: f64,
    pub hourly_distribution: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, sqlx::FromRow)]
pub struct SalesSummaryRow {
    pub total_sales: f64,
    pub total_orders: i64,
    pub average_ticket: f64,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct DailySalesRow {
    pub sale_date: NaiveDate,
    pub total_sales: f64,
    pub total_orders: i64,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ChannelSalesRow {
    pub channel_name: String,
    pub total_sales: f64,
}

/// Per-store totals plus its rank-1 channel by revenue.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct StorePerformanceRow {
    pub store_id: i32,
    pub store_name: String,
    pub total_sales: f64,
    pub total_orders: i64,
    pub average_ticket: f64,
    pub top_channel: Option<String>,
    pub top_channel_sales: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct StoreTotalsRow {
    pub store_id: i32,
    pub total_sales: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct StoreRow {
    pub store_id: i32,
    pub store_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct ChannelRow {
    pub id: i32,
    pub name: String,
}

// ---

/// Data access for one request, bound to a single connection.
pub struct SalesRepository<'c> {
    conn: &'c mut PgConnection,
}

impl<'c> SalesRepository<'c> {
    // ---
    pub fn new(conn: &'c mut PgConnection) -> Self {
        Self { conn }
    }

    /// Date of the most recent completed sale across `store_ids`.
    pub async fn last_sale_date(
        &mut self,
        store_ids: &[i32],
    ) -> Result<Option<NaiveDate>, sqlx::Error> {
        // ---
        if store_ids.is_empty() {
            return Ok(None);
        }

        let row: (Option<NaiveDate>,) = sqlx::query_as(
            r#"
            SELECT MAX(created_at)::date
            FROM sales
            WHERE store_id = ANY($1)
              AND sale_status_desc = 'COMPLETED'
            "#,
        )
        .bind(store_ids)
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(row.0)
    }

    /// Products ranked by revenue in `filter.range`, with the quantity sold
    /// under the same filters in `filter.week` and `filter.prior_week`.
    pub async fn top_products(
        &mut self,
        filter: &TopProductsFilter,
    ) -> Result<Vec<TopProductRow>, sqlx::Error> {
        // ---
        let mut qb = top_products_query(filter);

        tracing::debug!(?filter, "top products query");
        qb.build_query_as::<TopProductRow>()
            .fetch_all(&mut *self.conn)
            .await
    }

    /// Delivery volume and duration per neighborhood/city in `range`,
    /// discarding buckets with fewer than `min_deliveries` deliveries, with
    /// the average duration over `previous`.
    pub async fn delivery_regions(
        &mut self,
        store_id: i32,
        range: DateRange,
        previous: DateRange,
        min_deliveries: i64,
    ) -> Result<Vec<DeliveryRegionRow>, sqlx::Error> {
        // ---
        sqlx::query_as::<_, DeliveryRegionRow>(
            r#"
            WITH current_period AS (
                SELECT
                    COALESCE(da.neighborhood, $6) AS neighborhood,
                    COALESCE(da.city, $7)         AS city,
                    COUNT(*)                      AS delivery_count,
                    AVG(s.delivery_seconds)::float8 AS avg_delivery_seconds,
                    percentile_cont(0.9) WITHIN GROUP (
                        ORDER BY s.delivery_seconds::float8
                    ) AS p90_delivery_seconds
                FROM sales s
                JOIN delivery_addresses da ON da.sale_id = s.id
                WHERE s.store_id = $1
                  AND s.sale_status_desc = 'COMPLETED'
                  AND s.created_at::date BETWEEN $2 AND $3
                GROUP BY 1, 2
                HAVING COUNT(*) >= $8
            ),
            previous_period AS (
                SELECT
                    COALESCE(da.neighborhood, $6) AS neighborhood,
                    COALESCE(da.city, $7)         AS city,
                    AVG(s.delivery_seconds)::float8 AS avg_delivery_seconds
                FROM sales s
                JOIN delivery_addresses da ON da.sale_id = s.id
                WHERE s.store_id = $1
                  AND s.sale_status_desc = 'COMPLETED'
                  AND s.created_at::date BETWEEN $4 AND $5
                GROUP BY 1, 2
            )
            SELECT
                cp.neighborhood,
                cp.city,
                cp.delivery_count,
                cp.avg_delivery_seconds,
                cp.p90_delivery_seconds,
                pp.avg_delivery_seconds AS previous_avg_delivery_seconds
            FROM current_period cp
            LEFT JOIN previous_period pp
                   ON pp.neighborhood = cp.neighborhood
                  AND pp.city = cp.city
            ORDER BY cp.delivery_count DESC, cp.neighborhood, cp.city
            "#,
        )
        .bind(store_id)
        .bind(range.start)
        .bind(range.end)
        .bind(previous.start)
        .bind(previous.end)
        .bind(UNKNOWN_NEIGHBORHOOD)
        .bind(UNKNOWN_CITY)
        .bind(min_deliveries)
        .fetch_all(&mut *self.conn)
        .await
    }

    /// Identified customers with at least `min_orders` completed orders since
    /// `lookback_start` whose last order is more than `inactive_days` before
    /// `as_of`. Most inactive first.
    pub async fn at_risk_customers(
        &mut self,
        store_id: i32,
        as_of: NaiveDate,
        lookback_start: NaiveDate,
        min_orders: i64,
        inactive_days: i32,
    ) -> Result<Vec<AtRiskCustomerRow>, sqlx::Error> {
        // ---
        sqlx::query_as::<_, AtRiskCustomerRow>(
            r#"
            SELECT
                s.customer_id::int                          AS customer_id,
                MAX(s.customer_name)                        AS customer_name,
                COUNT(*)                                    AS total_orders,
                MAX(s.created_at)::date                     AS last_order_date,
                ($2::date - MAX(s.created_at)::date)::int   AS days_since_last_order
            FROM sales s
            WHERE s.store_id = $1
              AND s.customer_id IS NOT NULL
              AND s.sale_status_desc = 'COMPLETED'
              AND s.created_at::date BETWEEN $3 AND $2
            GROUP BY s.customer_id
            HAVING COUNT(*) >= $4
               AND ($2::date - MAX(s.created_at)::date) > $5
            ORDER BY days_since_last_order DESC, customer_id
            "#,
        )
        .bind(store_id)
        .bind(as_of)
        .bind(lookback_start)
        .bind(min_orders)
        .bind(inactive_days)
        .fetch_all(&mut *self.conn)
        .await
    }

    /// Per-channel totals in `range` with order counts by hour of day.
    pub async fn channel_performance(
        &mut self,
        store_id: i32,
        range: DateRange,
    ) -> Result<Vec<ChannelPerformanceRow>, sqlx::Error> {
        // ---
        sqlx::query_as::<_, ChannelPerformanceRow>(
            r#"
            WITH scoped AS (
                SELECT
                    ch.name AS channel_name,
                    s.total_amount,
                    EXTRACT(HOUR FROM s.created_at)::int AS sale_hour
                FROM sales s
                JOIN channels ch ON ch.id = s.channel_id
                WHERE s.store_id = $1
                  AND s.sale_status_desc = 'COMPLETED'
                  AND s.created_at::date BETWEEN $2 AND $3
            ),
            hourly AS (
                SELECT channel_name, sale_hour, COUNT(*) AS orders
                FROM scoped
                GROUP BY channel_name, sale_hour
            )
            SELECT
                sc.channel_name,
                COALESCE(SUM(sc.total_amount), 0)::float8 AS total_sales,
                COUNT(*)                                  AS total_orders,
                COALESCE(AVG(sc.total_amount), 0)::float8 AS average_ticket,
                (
                    SELECT json_object_agg(h.sale_hour::text, h.orders ORDER BY h.sale_hour)
                    FROM hourly h
                    WHERE h.channel_name = sc.channel_name
                ) AS hourly_distribution
            FROM scoped sc
            GROUP BY sc.channel_name
            ORDER BY total_sales DESC, sc.channel_name
            "#,
        )
        .bind(store_id)
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&mut *self.conn)
        .await
    }

    /// Revenue, order count and average ticket for one store in `range`.
    pub async fn sales_summary(
        &mut self,
        store_id: i32,
        range: DateRange,
    ) -> Result<SalesSummaryRow, sqlx::Error> {
        // ---
        sqlx::query_as::<_, SalesSummaryRow>(
            r#"
            SELECT
                COALESCE(SUM(total_amount), 0)::float8 AS total_sales,
                COUNT(*)                               AS total_orders,
                COALESCE(AVG(total_amount), 0)::float8 AS average_ticket
            FROM sales
            WHERE store_id = $1
              AND sale_status_desc = 'COMPLETED'
              AND created_at::date BETWEEN $2 AND $3
            "#,
        )
        .bind(store_id)
        .bind(range.start)
        .bind(range.end)
        .fetch_one(&mut *self.conn)
        .await
    }

    /// One row per day with sales in `range`, ordered by date.
    pub async fn daily_sales(
        &mut self,
        store_id: i32,
        range: DateRange,
    ) -> Result<Vec<DailySalesRow>, sqlx::Error> {
        // ---
        sqlx::query_as::<_, DailySalesRow>(
            r#"
            SELECT
                created_at::date                       AS sale_date,
                COALESCE(SUM(total_amount), 0)::float8 AS total_sales,
                COUNT(*)                               AS total_orders
            FROM sales
            WHERE store_id = $1
              AND sale_status_desc = 'COMPLETED'
              AND created_at::date BETWEEN $2 AND $3
            GROUP BY created_at::date
            ORDER BY sale_date
            "#,
        )
        .bind(store_id)
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&mut *self.conn)
        .await
    }

    /// Revenue per channel in `range`, highest first.
    pub async fn channel_sales(
        &mut self,
        store_id: i32,
        range: DateRange,
    ) -> Result<Vec<ChannelSalesRow>, sqlx::Error> {
        // ---
        sqlx::query_as::<_, ChannelSalesRow>(
            r#"
            SELECT
                ch.name                                  AS channel_name,
                COALESCE(SUM(s.total_amount), 0)::float8 AS total_sales
            FROM sales s
            JOIN channels ch ON ch.id = s.channel_id
            WHERE s.store_id = $1
              AND s.sale_status_desc = 'COMPLETED'
              AND s.created_at::date BETWEEN $2 AND $3
            GROUP BY ch.name
            ORDER BY total_sales DESC, ch.name
            "#,
        )
        .bind(store_id)
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&mut *self.conn)
        .await
    }

    /// Totals and leading channel for every existing store in `store_ids`,
    /// zero-filled for stores without sales in `range`. Highest revenue first.
    pub async fn store_performance(
        &mut self,
        store_ids: &[i32],
        range: DateRange,
    ) -> Result<Vec<StorePerformanceRow>, sqlx::Error> {
        // ---
        if store_ids.is_empty() {
            return Ok(Vec::new());
        }

        sqlx::query_as::<_, StorePerformanceRow>(
            r#"
            WITH current_period AS (
                SELECT
                    s.store_id,
                    SUM(s.total_amount) AS total_sales,
                    COUNT(*)            AS total_orders,
                    AVG(s.total_amount) AS average_ticket
                FROM sales s
                WHERE s.sale_status_desc = 'COMPLETED'
                  AND s.store_id = ANY($1)
                  AND s.created_at::date BETWEEN $2 AND $3
                GROUP BY s.store_id
            ),
            channel_rank AS (
                SELECT
                    s.store_id,
                    ch.name             AS channel_name,
                    SUM(s.total_amount) AS channel_sales,
                    ROW_NUMBER() OVER (
                        PARTITION BY s.store_id
                        ORDER BY SUM(s.total_amount) DESC, ch.name
                    ) AS channel_rank
                FROM sales s
                JOIN channels ch ON ch.id = s.channel_id
                WHERE s.sale_status_desc = 'COMPLETED'
                  AND s.store_id = ANY($1)
                  AND s.created_at::date BETWEEN $2 AND $3
                GROUP BY s.store_id, ch.name
            )
            SELECT
                st.id::int                                AS store_id,
                st.name                                   AS store_name,
                COALESCE(cp.total_sales, 0)::float8       AS total_sales,
                COALESCE(cp.total_orders, 0)::bigint      AS total_orders,
                COALESCE(cp.average_ticket, 0)::float8    AS average_ticket,
                cr.channel_name                           AS top_channel,
                cr.channel_sales::float8                  AS top_channel_sales
            FROM stores st
            LEFT JOIN current_period cp ON cp.store_id = st.id
            LEFT JOIN channel_rank cr
                   ON cr.store_id = st.id
                  AND cr.channel_rank = 1
            WHERE st.id = ANY($1)
            ORDER BY COALESCE(cp.total_sales, 0) DESC, st.id
            "#,
        )
        .bind(store_ids)
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&mut *self.conn)
        .await
    }

    /// Revenue per store in `range`; stores without sales are omitted.
    pub async fn store_sales_totals(
        &mut self,
        store_ids: &[i32],
        range: DateRange,
    ) -> Result<Vec<StoreTotalsRow>, sqlx::Error> {
        // ---
        if store_ids.is_empty() {
            return Ok(Vec::new());
        }

        sqlx::query_as::<_, StoreTotalsRow>(
            r#"
            SELECT
                store_id::int                          AS store_id,
                COALESCE(SUM(total_amount), 0)::float8 AS total_sales
            FROM sales
            WHERE sale_status_desc = 'COMPLETED'
              AND store_id = ANY($1)
              AND created_at::date BETWEEN $2 AND $3
            GROUP BY store_id
            "#,
        )
        .bind(store_ids)
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&mut *self.conn)
        .await
    }

    /// Channels a store has sold through, by name.
    pub async fn list_channels_for_store(
        &mut self,
        store_id: i32,
    ) -> Result<Vec<ChannelRow>, sqlx::Error> {
        // ---
        sqlx::query_as::<_, ChannelRow>(
            r#"
            SELECT DISTINCT ch.id::int AS id, ch.name
            FROM sales s
            JOIN channels ch ON ch.id = s.channel_id
            WHERE s.store_id = $1
            ORDER BY ch.name
            "#,
        )
        .bind(store_id)
        .fetch_all(&mut *self.conn)
        .await
    }

    pub async fn list_available_stores(
        &mut self,
        limit: i64,
    ) -> Result<Vec<StoreRow>, sqlx::Error> {
        // ---
        sqlx::query_as::<_, StoreRow>(
            r#"
            SELECT st.id::int AS store_id, st.name AS store_name
            FROM stores st
            ORDER BY st.name
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&mut *self.conn)
        .await
    }
}

/// Top-products aggregation for `filter`, every value bound.
fn top_products_query(filter: &TopProductsFilter) -> QueryBuilder<'static, Postgres> {
    // ---
    let mut qb: QueryBuilder<'static, Postgres> = QueryBuilder::new(
        r#"
        WITH scoped AS (
            SELECT
                p.name AS product_name,
                ps.quantity,
                ps.total_price,
                s.created_at::date AS sale_date
            FROM sales s
            JOIN channels ch ON ch.id = s.channel_id
            JOIN product_sales ps ON ps.sale_id = s.id
            JOIN products p ON p.id = ps.product_id
        "#,
    );
    push_sale_filters(&mut qb, filter, filter.span());
    qb.push(
        r#"
        ),
        totals AS (
            SELECT
                product_name,
                SUM(quantity) FILTER (WHERE"#,
    );
    push_sale_date_between(&mut qb, filter.range);
    qb.push(") AS total_quantity, SUM(total_price) FILTER (WHERE");
    push_sale_date_between(&mut qb, filter.range);
    qb.push(") AS total_revenue, SUM(quantity) FILTER (WHERE");
    push_sale_date_between(&mut qb, filter.week);
    qb.push(") AS week_quantity, SUM(quantity) FILTER (WHERE");
    push_sale_date_between(&mut qb, filter.prior_week);
    qb.push(
        r#") AS previous_week_quantity
            FROM scoped
            GROUP BY product_name
        )
        SELECT
            product_name,
            total_quantity::bigint                            AS total_quantity,
            COALESCE(total_revenue, 0)::float8                AS total_revenue,
            COALESCE(SUM(total_revenue) OVER (), 0)::float8   AS window_revenue,
            COALESCE(week_quantity, 0)::bigint                AS week_quantity,
            previous_week_quantity::bigint                    AS previous_week_quantity
        FROM totals
        WHERE total_quantity IS NOT NULL
        ORDER BY total_revenue DESC, product_name
        LIMIT "#,
    );
    qb.push_bind(filter.limit);
    qb
}

/// Append the `WHERE` clause of the top-products query over `span`,
/// binding every value.
fn push_sale_filters(
    qb: &mut QueryBuilder<'_, Postgres>,
    filter: &TopProductsFilter,
    span: DateRange,
) {
    // ---
    qb.push(" WHERE s.store_id = ")
        .push_bind(filter.store_id)
        .push(" AND s.sale_status_desc = 'COMPLETED'");

    if let Some(channel) = &filter.channel {
        qb.push(" AND ch.name = ").push_bind(channel.clone());
    }
    if let Some(day) = filter.day_of_week {
        qb.push(" AND EXTRACT(DOW FROM s.created_at)::int = ")
            .push_bind(postgres_dow(day));
    }
    if let Some((start, end)) = filter.hours {
        qb.push(" AND EXTRACT(HOUR FROM s.created_at)::int BETWEEN ")
            .push_bind(i32::from(start))
            .push(" AND ")
            .push_bind(i32::from(end));
    }
    qb.push(" AND s.created_at::date BETWEEN ")
        .push_bind(span.start)
        .push(" AND ")
        .push_bind(span.end);
}

/// ` sale_date BETWEEN $a AND $b` for one comparison window.
fn push_sale_date_between(qb: &mut QueryBuilder<'_, Postgres>, range: DateRange) {
    qb.push(" sale_date BETWEEN ")
        .push_bind(range.start)
        .push(" AND ")
        .push_bind(range.end);
}
