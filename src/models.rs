//! Client-facing insight shapes and the row transformations that build them.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;

use crate::period::{item_change_pct, round2, share_pct};
use crate::repository::{
    AtRiskCustomerRow, ChannelPerformanceRow, ChannelRow, DeliveryRegionRow, StoreRow,
    TopProductRow,
};

// ---

/// Label for sales without a customer name.
pub const ANONYMOUS_CUSTOMER: &str = "Cliente Anônimo";

/// Note attached to a top-products insight for a store with no completed sales.
pub const NO_SALES_NOTE: &str = "no completed sales for this store";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopProductInsight {
    pub product_name: String,
    pub total_quantity_sold: i64,
    pub total_revenue: f64,
    pub percentage_of_total: f64,
    pub week_over_week_change_pct: Option<f64>,
}

impl From<TopProductRow> for TopProductInsight {
    fn from(row: TopProductRow) -> Self {
        // ---
        Self {
            percentage_of_total: share_pct(row.total_revenue, row.window_revenue),
            week_over_week_change_pct: item_change_pct(
                row.week_quantity as f64,
                row.previous_week_quantity.map(|q| q as f64),
            ),
            total_revenue: round2(row.total_revenue),
            total_quantity_sold: row.total_quantity,
            product_name: row.product_name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryRegionInsight {
    pub neighborhood: String,
    pub city: String,
    pub delivery_count: i64,
    pub avg_delivery_minutes: f64,
    pub p90_delivery_minutes: f64,
    /// Change in average delivery time against the previous period.
    pub week_over_week_change_pct: Option<f64>,
}

impl From<DeliveryRegionRow> for DeliveryRegionInsight {
    fn from(row: DeliveryRegionRow) -> Self {
        // ---
        let avg_seconds = row.avg_delivery_seconds.unwrap_or(0.0);
        Self {
            neighborhood: row.neighborhood,
            city: row.city,
            delivery_count: row.delivery_count,
            avg_delivery_minutes: round2(avg_seconds / 60.0),
            p90_delivery_minutes: round2(row.p90_delivery_seconds.unwrap_or(0.0) / 60.0),
            week_over_week_change_pct: item_change_pct(
                avg_seconds,
                row.previous_avg_delivery_seconds,
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AtRiskCustomer {
    pub customer_id: i32,
    pub customer_name: String,
    pub total_orders: i64,
    pub last_order_date: NaiveDate,
    pub days_since_last_order: i64,
}

impl From<AtRiskCustomerRow> for AtRiskCustomer {
    fn from(row: AtRiskCustomerRow) -> Self {
        // ---
        Self {
            customer_id: row.customer_id,
            customer_name: row
                .customer_name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| ANONYMOUS_CUSTOMER.to_string()),
            total_orders: row.total_orders,
            last_order_date: row.last_order_date,
            days_since_last_order: i64::from(row.days_since_last_order),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelPerformance {
    pub channel_name: String,
    pub total_sales: f64,
    pub total_orders: i64,
    pub average_ticket: f64,
    pub hourly_distribution: BTreeMap<String, i64>,
}

impl From<ChannelPerformanceRow> for ChannelPerformance {
    fn from(row: ChannelPerformanceRow) -> Self {
        // ---
        Self {
            channel_name: row.channel_name,
            total_sales: round2(row.total_sales),
            total_orders: row.total_orders,
            average_ticket: round2(row.average_ticket),
            hourly_distribution: decode_hourly_distribution(row.hourly_distribution),
        }
    }
}

/// Decode an hour-of-day → order-count mapping.
///
/// Accepts a JSON object, a JSON object encoded as a string, or nothing.
/// Keys are normalised to the plain hour ("18"), entries whose count is not a
/// number are skipped, and anything else yields an empty mapping.
pub fn decode_hourly_distribution(value: Option<Value>) -> BTreeMap<String, i64> {
    // ---
    match value {
        Some(Value::Object(map)) => map
            .into_iter()
            .filter_map(|(hour, count)| {
                let hour = hour.trim().parse::<u8>().ok().filter(|h| *h < 24)?;
                let count = match count {
                    Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
                    Value::String(s) => s.trim().parse::<i64>().ok(),
                    _ => None,
                }?;
                Some((hour.to_string(), count))
            })
            .collect(),
        Some(Value::String(encoded)) => match serde_json::from_str::<Value>(&encoded) {
            Ok(Value::String(_)) | Err(_) => {
                tracing::debug!("Ignoring undecodable hourly distribution: {}", encoded);
                BTreeMap::new()
            }
            Ok(inner) => decode_hourly_distribution(Some(inner)),
        },
        _ => BTreeMap::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueTopChannel {
    pub channel: String,
    pub total_sales: f64,
    pub share_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueDailyPoint {
    pub date: NaiveDate,
    pub total_sales: f64,
    pub total_orders: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevenueOverview {
    pub store_id: i32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_sales: f64,
    pub total_orders: i64,
    pub average_ticket: f64,
    pub sales_change_pct: f64,
    pub orders_change_pct: f64,
    pub top_channels: Vec<RevenueTopChannel>,
    pub daily_breakdown: Vec<RevenueDailyPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreComparisonRow {
    pub store_id: i32,
    pub store_name: String,
    pub total_sales: f64,
    pub total_orders: i64,
    pub average_ticket: f64,
    pub sales_change_pct: f64,
    pub top_channel: Option<String>,
    pub top_channel_share_pct: Option<f64>,
}

// --- Response envelopes ---

#[derive(Debug, Serialize)]
pub struct TopProductsResponse {
    pub store_id: i32,
    pub channel: String,
    pub day_of_week: u8,
    pub hour_start: u8,
    pub hour_end: u8,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    pub products: Vec<TopProductInsight>,
    pub note: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct TopProductsFlexResponse {
    pub store_id: i32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub channel: Option<String>,
    pub day_of_week: Option<u8>,
    pub hour_start: Option<u8>,
    pub hour_end: Option<u8>,
    pub products: Vec<TopProductInsight>,
}

#[derive(Debug, Serialize)]
pub struct DeliveryHeatmapResponse {
    pub store_id: i32,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub regions: Vec<DeliveryRegionInsight>,
}

#[derive(Debug, Serialize)]
pub struct AtRiskCustomersResponse {
    pub store_id: i32,
    pub customers: Vec<AtRiskCustomer>,
}

#[derive(Debug, Serialize)]
pub struct ChannelPerformanceResponse {
    pub store_id: i32,
    pub period_days: u32,
    pub channels: Vec<ChannelPerformance>,
}

#[derive(Debug, Serialize)]
pub struct StoreComparisonResponse {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub stores: Vec<StoreComparisonRow>,
}

/// Pass-through listings are served with their row shape unchanged.
pub type AvailableStore = StoreRow;
pub type StoreChannel = ChannelRow;
