//! Widget insights.
//!
//! Each widget resolves its defaults, runs one or more repository queries on
//! the request's connection, and assembles the client-facing shape from
//! [`crate::models`]. Nothing here touches HTTP.

use chrono::{Months, NaiveDate};
use tracing::{debug, info};

use crate::error::AppError;
use crate::models::{
    AtRiskCustomer, AtRiskCustomersResponse, AvailableStore, ChannelPerformance,
    ChannelPerformanceResponse, DeliveryHeatmapResponse, RevenueDailyPoint, RevenueOverview,
    RevenueTopChannel, StoreChannel, StoreComparisonResponse, StoreComparisonRow,
    TopProductInsight, TopProductsFlexResponse, TopProductsResponse, NO_SALES_NOTE,
};
use crate::period::{change_pct, round2, share_pct, DateRange};
use crate::repository::{
    ChannelSalesRow, DailySalesRow, ProductSlot, SalesRepository, SalesSummaryRow,
    StorePerformanceRow, StoreTotalsRow, TopProductRow, TopProductsFilter,
};

// ---

/// Days covered by the default top-products insight, ending at the store's
/// last completed sale.
pub const TOP_PRODUCTS_WINDOW_DAYS: u32 = 30;
pub const TOP_PRODUCTS_DEFAULT_LIMIT: i64 = 10;

/// Fixed-window delivery heatmap: 7 days, buckets of at least 10 deliveries.
pub const WEEKLY_DELIVERY_WINDOW_DAYS: u32 = 7;
pub const WEEKLY_MIN_DELIVERIES: i64 = 10;

pub const CHANNEL_PERIOD_DEFAULT_DAYS: u32 = 30;
pub const CHANNEL_PERIOD_MAX_DAYS: u32 = 90;

pub const AVAILABLE_STORES_LIMIT: i64 = 50;

/// Source of top-products rows, implemented by [`SalesRepository`].
#[allow(async_fn_in_trait)]
pub trait TopProductsSource {
    async fn last_sale_date(&mut self, store_id: i32) -> Result<Option<NaiveDate>, AppError>;

    async fn top_products(
        &mut self,
        filter: &TopProductsFilter,
    ) -> Result<Vec<TopProductRow>, AppError>;
}

impl TopProductsSource for SalesRepository<'_> {
    async fn last_sale_date(&mut self, store_id: i32) -> Result<Option<NaiveDate>, AppError> {
        Ok(SalesRepository::last_sale_date(self, &[store_id]).await?)
    }

    async fn top_products(
        &mut self,
        filter: &TopProductsFilter,
    ) -> Result<Vec<TopProductRow>, AppError> {
        Ok(SalesRepository::top_products(self, filter).await?)
    }
}

// --- Top products ---

/// Run `filter`, relaxing it step by step while the result is empty:
/// exact filters, then without channel, then date range only.
///
/// The first non-empty result is returned as-is.
pub async fn top_products_with_fallback<S: TopProductsSource>(
    source: &mut S,
    filter: &TopProductsFilter,
) -> Result<Vec<TopProductRow>, AppError> {
    // ---
    let rows = source.top_products(filter).await?;
    if !rows.is_empty() {
        return Ok(rows);
    }

    if filter.channel.is_some() {
        debug!(store_id = filter.store_id, "top products empty, dropping channel");
        let rows = source.top_products(&filter.without_channel()).await?;
        if !rows.is_empty() {
            return Ok(rows);
        }
    }

    if filter.day_of_week.is_some() || filter.hours.is_some() {
        debug!(store_id = filter.store_id, "top products empty, keeping date range only");
        return source.top_products(&filter.period_only()).await;
    }

    Ok(Vec::new())
}

/// Top products for a channel, weekday and hour range over the 30 days
/// ending at the store's most recent completed sale. The week-over-week
/// delta compares the last 7 of those days with the 7 before.
pub async fn top_products_insight<S: TopProductsSource>(
    source: &mut S,
    store_id: i32,
    channel: String,
    day_of_week: u8,
    hour_start: u8,
    hour_end: u8,
) -> Result<TopProductsResponse, AppError> {
    // ---
    let slot = ProductSlot::new(
        Some(channel.clone()),
        Some(day_of_week),
        Some(hour_start),
        Some(hour_end),
        TOP_PRODUCTS_DEFAULT_LIMIT,
    )?;

    let mut response = TopProductsResponse {
        store_id,
        channel,
        day_of_week,
        hour_start,
        hour_end,
        period_start: None,
        period_end: None,
        products: Vec::new(),
        note: None,
    };

    let Some(last_sale) = source.last_sale_date(store_id).await? else {
        info!(store_id, "No completed sales for store");
        response.note = Some(NO_SALES_NOTE);
        return Ok(response);
    };

    let range = DateRange::trailing(last_sale, TOP_PRODUCTS_WINDOW_DAYS)?;
    let filter = TopProductsFilter::new(store_id, range, slot)?;

    let rows = top_products_with_fallback(source, &filter).await?;
    response.period_start = Some(range.start);
    response.period_end = Some(range.end);
    response.products = rows.into_iter().map(TopProductInsight::from).collect();
    Ok(response)
}

/// Top products for an explicit filter set, echoing the filters back.
pub async fn top_products_flexible<S: TopProductsSource>(
    source: &mut S,
    filter: TopProductsFilter,
) -> Result<TopProductsFlexResponse, AppError> {
    // ---
    let rows = top_products_with_fallback(source, &filter).await?;
    Ok(TopProductsFlexResponse {
        store_id: filter.store_id,
        start_date: filter.range.start,
        end_date: filter.range.end,
        channel: filter.channel,
        day_of_week: filter.day_of_week,
        hour_start: filter.hours.map(|(start, _)| start),
        hour_end: filter.hours.map(|(_, end)| end),
        products: rows.into_iter().map(TopProductInsight::from).collect(),
    })
}

// --- Delivery ---

/// Windows and minimum bucket size for one delivery heatmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeatmapPlan {
    pub range: DateRange,
    pub previous: DateRange,
    pub min_deliveries: i64,
}

impl HeatmapPlan {
    // ---
    /// Caller-chosen window, every bucket kept.
    pub fn flexible(range: DateRange) -> Result<Self, AppError> {
        Ok(Self {
            range,
            previous: range.previous()?,
            min_deliveries: 1,
        })
    }

    /// The 7 days ending `today`, buckets of at least 10 deliveries.
    pub fn weekly(today: NaiveDate) -> Result<Self, AppError> {
        let range = DateRange::trailing(today, WEEKLY_DELIVERY_WINDOW_DAYS)?;
        Ok(Self {
            range,
            previous: range.previous()?,
            min_deliveries: WEEKLY_MIN_DELIVERIES,
        })
    }
}

async fn run_heatmap(
    repo: &mut SalesRepository<'_>,
    store_id: i32,
    plan: HeatmapPlan,
) -> Result<DeliveryHeatmapResponse, AppError> {
    // ---
    let rows = repo
        .delivery_regions(store_id, plan.range, plan.previous, plan.min_deliveries)
        .await?;
    Ok(DeliveryHeatmapResponse {
        store_id,
        period_start: plan.range.start,
        period_end: plan.range.end,
        regions: rows.into_iter().map(Into::into).collect(),
    })
}

/// Delivery statistics per region for `range`, with no minimum bucket size.
pub async fn delivery_heatmap(
    repo: &mut SalesRepository<'_>,
    store_id: i32,
    range: DateRange,
) -> Result<DeliveryHeatmapResponse, AppError> {
    run_heatmap(repo, store_id, HeatmapPlan::flexible(range)?).await
}

/// Delivery statistics for the 7 days ending `today` against the 7 before.
pub async fn delivery_heatmap_weekly(
    repo: &mut SalesRepository<'_>,
    store_id: i32,
    today: NaiveDate,
) -> Result<DeliveryHeatmapResponse, AppError> {
    run_heatmap(repo, store_id, HeatmapPlan::weekly(today)?).await
}

// --- At-risk customers ---

/// Which returning customers count as drifting away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtRiskPolicy {
    /// Minimum completed orders within the lookback window.
    pub min_orders: i64,
    /// Customers whose last order is more than this many days old.
    pub inactive_days: i32,
    pub lookback_months: u32,
}

impl Default for AtRiskPolicy {
    fn default() -> Self {
        Self {
            min_orders: 2,
            inactive_days: 30,
            lookback_months: 6,
        }
    }
}

impl AtRiskPolicy {
    // ---
    pub fn lookback_start(&self, today: NaiveDate) -> NaiveDate {
        today
            .checked_sub_months(Months::new(self.lookback_months))
            .unwrap_or(NaiveDate::MIN)
    }

    pub fn includes(&self, customer: &AtRiskCustomer) -> bool {
        customer.total_orders >= self.min_orders
            && customer.days_since_last_order > i64::from(self.inactive_days)
    }

    /// Keep qualifying customers, most inactive first.
    pub fn select(&self, customers: Vec<AtRiskCustomer>) -> Vec<AtRiskCustomer> {
        let mut selected: Vec<AtRiskCustomer> =
            customers.into_iter().filter(|c| self.includes(c)).collect();
        selected.sort_by(|a, b| {
            b.days_since_last_order
                .cmp(&a.days_since_last_order)
                .then(a.customer_id.cmp(&b.customer_id))
        });
        selected
    }
}

pub async fn at_risk_customers(
    repo: &mut SalesRepository<'_>,
    store_id: i32,
    today: NaiveDate,
    policy: AtRiskPolicy,
) -> Result<AtRiskCustomersResponse, AppError> {
    // ---
    let rows = repo
        .at_risk_customers(
            store_id,
            today,
            policy.lookback_start(today),
            policy.min_orders,
            policy.inactive_days,
        )
        .await?;
    let customers = policy.select(rows.into_iter().map(AtRiskCustomer::from).collect());
    Ok(AtRiskCustomersResponse {
        store_id,
        customers,
    })
}

// --- Channel performance ---

/// Validated `period_days`, defaulting to 30.
pub fn channel_period_days(period_days: Option<u32>) -> Result<u32, AppError> {
    let days = period_days.unwrap_or(CHANNEL_PERIOD_DEFAULT_DAYS);
    if !(1..=CHANNEL_PERIOD_MAX_DAYS).contains(&days) {
        return Err(AppError::InvalidInput(format!(
            "period_days must be between 1 and {CHANNEL_PERIOD_MAX_DAYS}, got {days}"
        )));
    }
    Ok(days)
}

pub async fn channel_performance(
    repo: &mut SalesRepository<'_>,
    store_id: i32,
    period_days: u32,
    today: NaiveDate,
) -> Result<ChannelPerformanceResponse, AppError> {
    // ---
    let range = DateRange::trailing(today, period_days)?;
    let rows = repo.channel_performance(store_id, range).await?;
    Ok(ChannelPerformanceResponse {
        store_id,
        period_days,
        channels: rows.into_iter().map(ChannelPerformance::from).collect(),
    })
}

// --- Revenue overview ---

pub async fn revenue_overview(
    repo: &mut SalesRepository<'_>,
    store_id: i32,
    range: DateRange,
) -> Result<RevenueOverview, AppError> {
    // ---
    let previous_range = range.previous()?;
    let current = repo.sales_summary(store_id, range).await?;
    let previous = repo.sales_summary(store_id, previous_range).await?;
    let daily = repo.daily_sales(store_id, range).await?;
    let channels = repo.channel_sales(store_id, range).await?;

    Ok(assemble_revenue_overview(
        store_id, range, &current, &previous, daily, channels,
    ))
}

/// Combine the revenue queries into one overview.
pub fn assemble_revenue_overview(
    store_id: i32,
    range: DateRange,
    current: &SalesSummaryRow,
    previous: &SalesSummaryRow,
    daily: Vec<DailySalesRow>,
    channels: Vec<ChannelSalesRow>,
) -> RevenueOverview {
    // ---
    let mut top_channels: Vec<RevenueTopChannel> = channels
        .into_iter()
        .map(|c| RevenueTopChannel {
            share_pct: share_pct(c.total_sales, current.total_sales),
            total_sales: round2(c.total_sales),
            channel: c.channel_name,
        })
        .collect();
    top_channels.sort_by(|a, b| {
        b.total_sales
            .total_cmp(&a.total_sales)
            .then_with(|| a.channel.cmp(&b.channel))
    });

    let mut daily_breakdown: Vec<RevenueDailyPoint> = daily
        .into_iter()
        .map(|d| RevenueDailyPoint {
            date: d.sale_date,
            total_sales: round2(d.total_sales),
            total_orders: d.total_orders,
        })
        .collect();
    daily_breakdown.sort_by_key(|d| d.date);

    RevenueOverview {
        store_id,
        start_date: range.start,
        end_date: range.end,
        total_sales: round2(current.total_sales),
        total_orders: current.total_orders,
        average_ticket: round2(current.average_ticket),
        sales_change_pct: change_pct(current.total_sales, previous.total_sales),
        orders_change_pct: change_pct(current.total_orders as f64, previous.total_orders as f64),
        top_channels,
        daily_breakdown,
    }
}

// --- Store comparison ---

pub async fn store_comparison(
    repo: &mut SalesRepository<'_>,
    store_a_id: i32,
    store_b_id: i32,
    range: DateRange,
) -> Result<StoreComparisonResponse, AppError> {
    // ---
    if store_a_id == store_b_id {
        return Err(AppError::InvalidInput(
            "store_a_id and store_b_id must differ".to_string(),
        ));
    }

    let previous_range = range.previous()?;
    let store_ids = [store_a_id, store_b_id];
    let current = repo.store_performance(&store_ids, range).await?;
    let previous = repo.store_sales_totals(&store_ids, previous_range).await?;

    Ok(StoreComparisonResponse {
        period_start: range.start,
        period_end: range.end,
        stores: compare_stores(current, &previous),
    })
}

/// Attach previous-period deltas and channel shares, highest revenue first.
pub fn compare_stores(
    current: Vec<StorePerformanceRow>,
    previous: &[StoreTotalsRow],
) -> Vec<StoreComparisonRow> {
    // ---
    let mut rows: Vec<StoreComparisonRow> = current
        .into_iter()
        .map(|store| {
            let previous_sales = previous
                .iter()
                .find(|p| p.store_id == store.store_id)
                .map_or(0.0, |p| p.total_sales);
            let top_channel_share_pct = match (&store.top_channel, store.top_channel_sales) {
                (Some(_), Some(channel_sales)) if store.total_sales > 0.0 => {
                    Some(share_pct(channel_sales, store.total_sales))
                }
                _ => None,
            };

            StoreComparisonRow {
                store_id: store.store_id,
                store_name: store.store_name,
                total_sales: round2(store.total_sales),
                total_orders: store.total_orders,
                average_ticket: round2(store.average_ticket),
                sales_change_pct: change_pct(store.total_sales, previous_sales),
                top_channel: store.top_channel,
                top_channel_share_pct,
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        b.total_sales
            .total_cmp(&a.total_sales)
            .then(a.store_id.cmp(&b.store_id))
    });
    rows
}

// --- Listings ---

pub async fn available_stores(
    repo: &mut SalesRepository<'_>,
) -> Result<Vec<AvailableStore>, AppError> {
    Ok(repo.list_available_stores(AVAILABLE_STORES_LIMIT).await?)
}

pub async fn store_channels(
    repo: &mut SalesRepository<'_>,
    store_id: i32,
) -> Result<Vec<StoreChannel>, AppError> {
    Ok(repo.list_channels_for_store(store_id).await?)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn row(name: &str, qty: i64, revenue: f64, prev: Option<i64>) -> TopProductRow {
        TopProductRow {
            product_name: name.to_string(),
            total_quantity: qty,
            total_revenue: revenue,
            window_revenue: revenue,
            week_quantity: qty,
            previous_week_quantity: prev,
        }
    }

    /// In-memory source answering by which filters are set.
    struct FakeSource {
        last_sale: Option<NaiveDate>,
        exact: Vec<TopProductRow>,
        without_channel: Vec<TopProductRow>,
        period_only: Vec<TopProductRow>,
        calls: Vec<TopProductsFilter>,
    }

    impl FakeSource {
        fn new(last_sale: Option<NaiveDate>) -> Self {
            Self {
                last_sale,
                exact: Vec::new(),
                without_channel: Vec::new(),
                period_only: Vec::new(),
                calls: Vec::new(),
            }
        }
    }

    impl TopProductsSource for FakeSource {
        async fn last_sale_date(&mut self, _store_id: i32) -> Result<Option<NaiveDate>, AppError> {
            Ok(self.last_sale)
        }

        async fn top_products(
            &mut self,
            filter: &TopProductsFilter,
        ) -> Result<Vec<TopProductRow>, AppError> {
            self.calls.push(filter.clone());
            let rows = if filter.channel.is_some() {
                &self.exact
            } else if filter.day_of_week.is_some() || filter.hours.is_some() {
                &self.without_channel
            } else {
                &self.period_only
            };
            Ok(rows.clone())
        }
    }

    fn full_filter() -> TopProductsFilter {
        let range = DateRange::new(d(2025, 10, 1), d(2025, 10, 31)).unwrap();
        let slot = ProductSlot::new(Some("iFood".into()), Some(5), Some(18), Some(23), 10).unwrap();
        TopProductsFilter::new(1, range, slot).unwrap()
    }

    /// Completed sales matching every dimension filter, aggregated by date
    /// the way the repository query does.
    struct DatedSource {
        sales: Vec<(NaiveDate, &'static str, i64, f64)>,
    }

    impl TopProductsSource for DatedSource {
        async fn last_sale_date(&mut self, _store_id: i32) -> Result<Option<NaiveDate>, AppError> {
            Ok(self.sales.iter().map(|(date, ..)| *date).max())
        }

        async fn top_products(
            &mut self,
            filter: &TopProductsFilter,
        ) -> Result<Vec<TopProductRow>, AppError> {
            let within = |date: &NaiveDate, r: DateRange| r.start <= *date && *date <= r.end;
            let sum_qty = |name: &str, r: DateRange| -> i64 {
                self.sales
                    .iter()
                    .filter(|(date, n, ..)| *n == name && within(date, r))
                    .map(|(_, _, qty, _)| qty)
                    .sum()
            };

            let mut names: Vec<&str> = self.sales.iter().map(|(_, n, ..)| *n).collect();
            names.sort_unstable();
            names.dedup();

            let mut rows = Vec::new();
            for name in names {
                let total_quantity = sum_qty(name, filter.range);
                if total_quantity == 0 {
                    continue;
                }
                let total_revenue: f64 = self
                    .sales
                    .iter()
                    .filter(|(date, n, ..)| *n == name && within(date, filter.range))
                    .map(|(.., price)| price)
                    .sum();
                let previous_week = sum_qty(name, filter.prior_week);
                rows.push(TopProductRow {
                    product_name: name.to_string(),
                    total_quantity,
                    total_revenue,
                    window_revenue: total_revenue,
                    week_quantity: sum_qty(name, filter.week),
                    previous_week_quantity: (previous_week > 0).then_some(previous_week),
                });
            }
            Ok(rows)
        }
    }

    #[test]
    fn insight_compares_last_week_with_the_week_before() {
        let today = d(2025, 10, 17);
        let mut source = DatedSource {
            sales: vec![
                (today, "X-Burger", 2, 60.0),
                (today - chrono::Days::new(8), "X-Burger", 3, 90.0),
            ],
        };

        let resp = tokio_test::block_on(top_products_insight(
            &mut source,
            1,
            "iFood".into(),
            5,
            18,
            23,
        ))
        .unwrap();

        assert_eq!(resp.products.len(), 1);
        let product = &resp.products[0];
        assert_eq!(product.total_quantity_sold, 5);
        assert_eq!(product.total_revenue, 150.0);
        // (2 - 3) / 3 * 100
        assert_eq!(product.week_over_week_change_pct, Some(-33.33));
    }

    #[test]
    fn insight_week_over_week_is_null_without_prior_week_sales() {
        let today = d(2025, 10, 17);
        let mut source = DatedSource {
            sales: vec![
                (today, "X-Burger", 2, 60.0),
                (today - chrono::Days::new(20), "X-Burger", 3, 90.0),
            ],
        };

        let resp = tokio_test::block_on(top_products_insight(
            &mut source,
            1,
            "iFood".into(),
            5,
            18,
            23,
        ))
        .unwrap();

        assert_eq!(resp.products[0].total_quantity_sold, 5);
        assert_eq!(resp.products[0].week_over_week_change_pct, None);
    }

    #[test]
    fn fallback_returns_exact_match_first() {
        let mut source = FakeSource::new(None);
        source.exact = vec![row("X-Burger", 3, 90.0, None)];
        source.period_only = vec![row("Soda", 9, 40.0, None)];

        let rows =
            tokio_test::block_on(top_products_with_fallback(&mut source, &full_filter())).unwrap();
        assert_eq!(rows, vec![row("X-Burger", 3, 90.0, None)]);
        assert_eq!(source.calls.len(), 1);
    }

    #[test]
    fn fallback_drops_channel_before_time_filters() {
        let mut source = FakeSource::new(None);
        source.without_channel = vec![row("Fries", 4, 30.0, None)];
        source.period_only = vec![row("Soda", 9, 40.0, None)];

        let rows =
            tokio_test::block_on(top_products_with_fallback(&mut source, &full_filter())).unwrap();
        assert_eq!(rows, vec![row("Fries", 4, 30.0, None)]);
        assert_eq!(source.calls.len(), 2);
        assert_eq!(source.calls[1].channel, None);
        assert_eq!(source.calls[1].day_of_week, Some(5));
    }

    #[test]
    fn fallback_ends_at_date_range_only() {
        let mut source = FakeSource::new(None);
        source.period_only = vec![row("Soda", 9, 40.0, None)];

        let rows =
            tokio_test::block_on(top_products_with_fallback(&mut source, &full_filter())).unwrap();
        assert_eq!(rows, vec![row("Soda", 9, 40.0, None)]);
        assert_eq!(source.calls.len(), 3);
        assert_eq!(source.calls[2], full_filter().period_only());
    }

    #[test]
    fn fallback_surfaces_empty_result() {
        let mut source = FakeSource::new(None);
        let rows =
            tokio_test::block_on(top_products_with_fallback(&mut source, &full_filter())).unwrap();
        assert!(rows.is_empty());
        assert_eq!(source.calls.len(), 3);
    }

    #[test]
    fn fallback_skips_steps_that_change_nothing() {
        let range = DateRange::new(d(2025, 10, 1), d(2025, 10, 31)).unwrap();
        let slot = ProductSlot::new(None, None, None, None, 10).unwrap();
        let filter = TopProductsFilter::new(1, range, slot).unwrap();
        let mut source = FakeSource::new(None);

        let rows = tokio_test::block_on(top_products_with_fallback(&mut source, &filter)).unwrap();
        assert!(rows.is_empty());
        assert_eq!(source.calls.len(), 1);
    }

    #[test]
    fn insight_without_sales_returns_marker() {
        let mut source = FakeSource::new(None);
        let resp = tokio_test::block_on(top_products_insight(
            &mut source,
            1,
            "iFood".into(),
            5,
            18,
            23,
        ))
        .unwrap();

        assert!(resp.products.is_empty());
        assert_eq!(resp.note, Some(NO_SALES_NOTE));
        assert_eq!(resp.period_start, None);
        assert!(source.calls.is_empty());
    }

    #[test]
    fn insight_rejects_invalid_slot_before_querying() {
        let mut source = FakeSource::new(Some(d(2025, 8, 20)));
        let res = tokio_test::block_on(top_products_insight(
            &mut source,
            1,
            "iFood".into(),
            8,
            18,
            23,
        ));
        assert!(matches!(res, Err(AppError::InvalidInput(_))));
        assert!(source.calls.is_empty());
    }

    #[test]
    fn insight_window_ends_at_last_sale() {
        let mut source = FakeSource::new(Some(d(2025, 8, 20)));
        source.exact = vec![row("X-Burger", 5, 100.0, Some(4))];

        let resp = tokio_test::block_on(top_products_insight(
            &mut source,
            1,
            "iFood".into(),
            5,
            18,
            23,
        ))
        .unwrap();

        assert_eq!(resp.period_end, Some(d(2025, 8, 20)));
        assert_eq!(resp.period_start, Some(d(2025, 7, 22)));
        assert_eq!(resp.note, None);
        assert_eq!(resp.products.len(), 1);
        assert_eq!(resp.products[0].total_quantity_sold, 5);
        assert_eq!(resp.products[0].week_over_week_change_pct, Some(25.0));
        assert_eq!(source.calls[0].range.len_days(), 30);
    }

    #[test]
    fn flexible_echoes_filters() {
        let mut source = FakeSource::new(None);
        source.without_channel = vec![row("Fries", 4, 30.0, None)];

        let resp =
            tokio_test::block_on(top_products_flexible(&mut source, full_filter())).unwrap();
        assert_eq!(resp.channel.as_deref(), Some("iFood"));
        assert_eq!(resp.hour_start, Some(18));
        assert_eq!(resp.hour_end, Some(23));
        assert_eq!(resp.products[0].product_name, "Fries");
        assert_eq!(resp.products[0].percentage_of_total, 100.0);
    }

    #[test]
    fn flexible_heatmap_keeps_every_bucket() {
        let range = DateRange::new(d(2025, 10, 1), d(2025, 10, 18)).unwrap();
        let plan = HeatmapPlan::flexible(range).unwrap();
        assert_eq!(plan.min_deliveries, 1);
        assert_eq!(plan.range, range);
        assert_eq!(plan.previous, range.previous().unwrap());
    }

    #[test]
    fn weekly_heatmap_needs_ten_deliveries_per_bucket() {
        let plan = HeatmapPlan::weekly(d(2025, 10, 18)).unwrap();
        assert_eq!(plan.min_deliveries, 10);
        assert_eq!((plan.range.start, plan.range.end), (d(2025, 10, 12), d(2025, 10, 18)));
        assert_eq!(
            (plan.previous.start, plan.previous.end),
            (d(2025, 10, 5), d(2025, 10, 11))
        );
    }

    fn customer(id: i32, orders: i64, days: i64) -> AtRiskCustomer {
        AtRiskCustomer {
            customer_id: id,
            customer_name: format!("Customer {id}"),
            total_orders: orders,
            last_order_date: d(2025, 1, 1),
            days_since_last_order: days,
        }
    }

    #[test]
    fn at_risk_boundary_is_thirty_one_days() {
        let policy = AtRiskPolicy::default();
        assert!(!policy.includes(&customer(1, 2, 30)));
        assert!(policy.includes(&customer(2, 2, 31)));
        assert!(!policy.includes(&customer(3, 1, 90)));
    }

    #[test]
    fn at_risk_sorted_most_inactive_first() {
        let policy = AtRiskPolicy::default();
        let selected = policy.select(vec![
            customer(1, 3, 40),
            customer(2, 2, 120),
            customer(3, 5, 10),
            customer(4, 2, 40),
        ]);
        let ids: Vec<i32> = selected.iter().map(|c| c.customer_id).collect();
        assert_eq!(ids, vec![2, 1, 4]);
    }

    #[test]
    fn at_risk_lookback_is_six_months() {
        let policy = AtRiskPolicy::default();
        assert_eq!(policy.lookback_start(d(2025, 8, 31)), d(2025, 2, 28));
        assert_eq!(policy.lookback_start(d(2025, 10, 18)), d(2025, 4, 18));
    }

    #[test]
    fn channel_period_days_validated() {
        assert_eq!(channel_period_days(None).unwrap(), 30);
        assert_eq!(channel_period_days(Some(90)).unwrap(), 90);
        assert!(matches!(
            channel_period_days(Some(0)),
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            channel_period_days(Some(91)),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn revenue_overview_deltas_and_breakdowns() {
        let range = DateRange::new(d(2025, 3, 1), d(2025, 3, 31)).unwrap();
        let current = SalesSummaryRow {
            total_sales: 1500.0,
            total_orders: 30,
            average_ticket: 50.0,
        };
        let previous = SalesSummaryRow {
            total_sales: 1000.0,
            total_orders: 40,
            average_ticket: 25.0,
        };
        let daily = vec![
            DailySalesRow {
                sale_date: d(2025, 3, 2),
                total_sales: 500.0,
                total_orders: 10,
            },
            DailySalesRow {
                sale_date: d(2025, 3, 1),
                total_sales: 1000.0,
                total_orders: 20,
            },
        ];
        let channels = vec![
            ChannelSalesRow {
                channel_name: "Presencial".into(),
                total_sales: 500.0,
            },
            ChannelSalesRow {
                channel_name: "iFood".into(),
                total_sales: 1000.0,
            },
        ];

        let overview =
            assemble_revenue_overview(1, range, &current, &previous, daily, channels);
        assert_eq!(overview.sales_change_pct, 50.0);
        assert_eq!(overview.orders_change_pct, -25.0);
        assert_eq!(overview.top_channels[0].channel, "iFood");
        assert_eq!(overview.top_channels[0].share_pct, 66.67);
        assert_eq!(overview.daily_breakdown[0].date, d(2025, 3, 1));
        assert_eq!(overview.start_date, d(2025, 3, 1));
        assert_eq!(overview.end_date, d(2025, 3, 31));
    }

    #[test]
    fn revenue_overview_without_baseline_reports_no_change() {
        let range = DateRange::new(d(2025, 3, 1), d(2025, 3, 31)).unwrap();
        let current = SalesSummaryRow {
            total_sales: 1500.0,
            total_orders: 30,
            average_ticket: 50.0,
        };
        let overview = assemble_revenue_overview(
            1,
            range,
            &current,
            &SalesSummaryRow::default(),
            Vec::new(),
            Vec::new(),
        );
        assert_eq!(overview.sales_change_pct, 0.0);
        assert_eq!(overview.orders_change_pct, 0.0);
    }

    fn perf(id: i32, total: f64, channel: Option<(&str, f64)>) -> StorePerformanceRow {
        StorePerformanceRow {
            store_id: id,
            store_name: format!("Store {id}"),
            total_sales: total,
            total_orders: if total > 0.0 { 10 } else { 0 },
            average_ticket: total / 10.0,
            top_channel: channel.map(|(name, _)| name.to_string()),
            top_channel_sales: channel.map(|(_, sales)| sales),
        }
    }

    #[test]
    fn comparison_orders_by_revenue_regardless_of_input_order() {
        let previous = vec![StoreTotalsRow {
            store_id: 2,
            total_sales: 400.0,
        }];
        let rows = compare_stores(
            vec![
                perf(1, 500.0, Some(("Rappi", 250.0))),
                perf(2, 800.0, Some(("iFood", 600.0))),
            ],
            &previous,
        );

        assert_eq!(rows[0].store_id, 2);
        assert_eq!(rows[0].sales_change_pct, 100.0);
        assert_eq!(rows[0].top_channel_share_pct, Some(75.0));
        assert_eq!(rows[1].store_id, 1);
        assert_eq!(rows[1].sales_change_pct, 0.0);
    }

    #[test]
    fn comparison_idle_store_has_no_top_channel() {
        let rows = compare_stores(vec![perf(1, 0.0, None), perf(2, 10.0, None)], &[]);
        assert_eq!(rows[0].store_id, 2);
        assert_eq!(rows[1].top_channel, None);
        assert_eq!(rows[1].top_channel_share_pct, None);
    }
}
