//! Store performance report: per-store totals over a period as a
//! semicolon-delimited CSV download.

use chrono::{NaiveDate, NaiveDateTime};
use csv::{Terminator, WriterBuilder};
use tracing::info;

use crate::error::AppError;
use crate::period::{round2, DateRange};
use crate::repository::{SalesRepository, StorePerformanceRow};

// ---

pub const REPORT_HEADER: [&str; 6] = [
    "Loja",
    "Faturamento",
    "Pedidos",
    "Ticket Médio",
    "Canal líder",
    "Participação canal líder (%)",
];

const GENERATED_AT_LABEL: &str = "Gerado em";

/// Validated report parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRequest {
    pub store_ids: Vec<i32>,
    pub range: DateRange,
}

impl ReportRequest {
    // ---
    /// Build from raw query pairs. `store_ids` may repeat or hold a
    /// comma-separated list; duplicates are dropped, order is kept.
    pub fn from_query_pairs(pairs: &[(String, String)]) -> Result<Self, AppError> {
        // ---
        let mut store_ids: Vec<i32> = Vec::new();
        let mut start_date = None;
        let mut end_date = None;

        for (key, value) in pairs {
            match key.as_str() {
                "store_ids" | "store_ids[]" => {
                    for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                        let id = part.parse::<i32>().map_err(|_| {
                            AppError::InvalidInput(format!("invalid store id: {part}"))
                        })?;
                        if !store_ids.contains(&id) {
                            store_ids.push(id);
                        }
                    }
                }
                "start_date" => start_date = Some(parse_date("start_date", value)?),
                "end_date" => end_date = Some(parse_date("end_date", value)?),
                _ => {}
            }
        }

        if store_ids.is_empty() {
            return Err(AppError::InvalidInput(
                "store_ids must list at least one store".to_string(),
            ));
        }
        let start = start_date
            .ok_or_else(|| AppError::InvalidInput("start_date is required".to_string()))?;
        let end =
            end_date.ok_or_else(|| AppError::InvalidInput("end_date is required".to_string()))?;

        Ok(Self {
            store_ids,
            range: DateRange::new(start, end)?,
        })
    }
}

fn parse_date(field: &str, value: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        AppError::InvalidInput(format!("{field} must be a YYYY-MM-DD date, got {value:?}"))
    })
}

/// Rendered report ready for download.
#[derive(Debug, Clone, PartialEq)]
pub struct StorePerformanceReport {
    pub filename: String,
    pub body: String,
}

/// Query, filter and render the report for `request`.
pub async fn build_store_performance_report(
    repo: &mut SalesRepository<'_>,
    request: &ReportRequest,
    generated_at: NaiveDateTime,
) -> Result<StorePerformanceReport, AppError> {
    // ---
    let rows = repo
        .store_performance(&request.store_ids, request.range)
        .await?;
    let rows = select_report_rows(rows)?;

    info!(
        stores = rows.len(),
        start = %request.range.start,
        end = %request.range.end,
        "Rendering store performance report"
    );

    Ok(StorePerformanceReport {
        filename: report_filename(request.range),
        body: render_csv(&rows, generated_at)?,
    })
}

/// Stores with at least one completed sale, highest revenue first.
///
/// No such store is `NotFound`, distinct from the empty-selection client
/// error raised while parsing the request.
pub fn select_report_rows(
    rows: Vec<StorePerformanceRow>,
) -> Result<Vec<StorePerformanceRow>, AppError> {
    // ---
    let mut rows: Vec<StorePerformanceRow> =
        rows.into_iter().filter(|r| r.total_orders > 0).collect();

    if rows.is_empty() {
        return Err(AppError::NotFound(
            "no sales found for the selected stores and period".to_string(),
        ));
    }

    rows.sort_by(|a, b| {
        b.total_sales
            .total_cmp(&a.total_sales)
            .then(a.store_id.cmp(&b.store_id))
    });
    Ok(rows)
}

/// `store-performance_YYYYMMDD_YYYYMMDD.csv`
pub fn report_filename(range: DateRange) -> String {
    format!(
        "store-performance_{}_{}.csv",
        range.start.format("%Y%m%d"),
        range.end.format("%Y%m%d")
    )
}

/// Header, one line per store in the given order, then a generation trailer.
pub fn render_csv(
    rows: &[StorePerformanceRow],
    generated_at: NaiveDateTime,
) -> Result<String, AppError> {
    // ---
    let mut buf: Vec<u8> = Vec::new();
    let mut wtr = WriterBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(&mut buf);

    wtr.write_record(REPORT_HEADER)?;

    for row in rows {
        let share = match (&row.top_channel, row.top_channel_sales) {
            (Some(_), Some(sales)) if row.total_sales > 0.0 => sales / row.total_sales * 100.0,
            _ => 0.0,
        };
        wtr.write_record([
            row.store_name.clone(),
            format!("{:.2}", round2(row.total_sales)),
            row.total_orders.to_string(),
            format!("{:.2}", round2(row.average_ticket)),
            row.top_channel.clone().unwrap_or_else(|| "-".to_string()),
            format!("{share:.1}"),
        ])?;
    }

    wtr.write_record([
        GENERATED_AT_LABEL.to_string(),
        generated_at.format("%Y-%m-%dT%H:%M:%S").to_string(),
    ])?;

    wtr.flush().map_err(csv::Error::from)?;
    drop(wtr);
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn row(
        id: i32,
        name: &str,
        total: f64,
        orders: i64,
        channel: Option<(&str, f64)>,
    ) -> StorePerformanceRow {
        StorePerformanceRow {
            store_id: id,
            store_name: name.to_string(),
            total_sales: total,
            total_orders: orders,
            average_ticket: if orders > 0 { total / orders as f64 } else { 0.0 },
            top_channel: channel.map(|(c, _)| c.to_string()),
            top_channel_sales: channel.map(|(_, s)| s),
        }
    }

    fn generated_at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 10, 18)
            .unwrap()
            .and_hms_opt(14, 30, 5)
            .unwrap()
    }

    #[test]
    fn parses_repeated_and_comma_separated_store_ids() {
        let req = ReportRequest::from_query_pairs(&pairs(&[
            ("store_ids", "3"),
            ("store_ids", "1,2"),
            ("store_ids", "3"),
            ("start_date", "2025-10-01"),
            ("end_date", "2025-10-31"),
        ]))
        .unwrap();
        assert_eq!(req.store_ids, vec![3, 1, 2]);
        assert_eq!(req.range.len_days(), 31);
    }

    #[test]
    fn empty_store_list_is_client_error() {
        let err = ReportRequest::from_query_pairs(&pairs(&[
            ("start_date", "2025-10-01"),
            ("end_date", "2025-10-31"),
        ]))
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        let err = ReportRequest::from_query_pairs(&pairs(&[
            ("store_ids", ""),
            ("start_date", "2025-10-01"),
            ("end_date", "2025-10-31"),
        ]))
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[test]
    fn inverted_or_malformed_dates_are_client_errors() {
        for (start, end) in [
            ("2025-10-31", "2025-10-01"),
            ("2025-13-01", "2025-10-01"),
            ("01/10/2025", "2025-10-31"),
        ] {
            let err = ReportRequest::from_query_pairs(&pairs(&[
                ("store_ids", "1"),
                ("start_date", start),
                ("end_date", end),
            ]))
            .unwrap_err();
            assert!(matches!(err, AppError::InvalidInput(_)), "{start} {end}");
        }
    }

    #[test]
    fn filename_encodes_compact_dates() {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 10, 31).unwrap(),
        )
        .unwrap();
        assert_eq!(
            report_filename(range),
            "store-performance_20251001_20251031.csv"
        );
    }

    #[test]
    fn renders_header_rows_and_trailer() {
        let rows = vec![
            row(2, "Loja Centro", 1500.0, 30, Some(("iFood", 900.0))),
            row(1, "Loja Norte", 200.456, 4, None),
        ];
        let csv = render_csv(&rows, generated_at()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 4);
        assert_eq!(
            lines[0],
            "Loja;Faturamento;Pedidos;Ticket Médio;Canal líder;Participação canal líder (%)"
        );
        assert_eq!(lines[1], "Loja Centro;1500.00;30;50.00;iFood;60.0");
        assert_eq!(lines[2], "Loja Norte;200.46;4;50.11;-;0.0");
        assert_eq!(lines[3], "Gerado em;2025-10-18T14:30:05");
    }

    #[test]
    fn leading_channel_share_is_rounded_once() {
        // 12.4504% rounds to 12.5, not via 12.45 down to 12.4
        let rows = vec![row(1, "Loja Sul", 10000.0, 100, Some(("iFood", 1245.04)))];
        let csv = render_csv(&rows, generated_at()).unwrap();
        assert_eq!(
            csv.lines().nth(1).unwrap(),
            "Loja Sul;10000.00;100;100.00;iFood;12.5"
        );
    }

    #[test]
    fn stores_without_sales_are_not_found() {
        let rows = vec![row(1, "Loja Norte", 0.0, 0, None), row(2, "Loja Sul", 0.0, 0, None)];
        let err = select_report_rows(rows).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = select_report_rows(Vec::new()).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn idle_stores_are_dropped_from_mixed_selection() {
        let rows = vec![
            row(1, "Loja Norte", 0.0, 0, None),
            row(2, "Loja Centro", 800.0, 16, Some(("iFood", 500.0))),
        ];
        let selected = select_report_rows(rows).unwrap();
        let ids: Vec<i32> = selected.iter().map(|r| r.store_id).collect();
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn report_rows_keep_highest_revenue_first() {
        let rows = vec![
            row(1, "Loja Norte", 300.0, 6, None),
            row(2, "Loja Centro", 1500.0, 30, Some(("iFood", 900.0))),
            row(3, "Loja Sul", 300.0, 5, None),
        ];
        let selected = select_report_rows(rows).unwrap();
        let ids: Vec<i32> = selected.iter().map(|r| r.store_id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[test]
    fn quotes_names_containing_the_delimiter() {
        let rows = vec![row(1, "Bar; Grill", 10.0, 1, Some(("Balcão", 10.0)))];
        let csv = render_csv(&rows, generated_at()).unwrap();
        assert!(csv.lines().nth(1).unwrap().starts_with("\"Bar; Grill\";"));
    }
}
