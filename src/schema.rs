//! Startup check of the sales dataset the service reads from.
//!
//! The schema is owned elsewhere; this module only verifies, read-only, that
//! the tables every insight joins against are present. Called once from
//! `main.rs` before the server starts accepting requests.

use anyhow::{bail, Result};
use sqlx::PgPool;

// ---

pub const REQUIRED_TABLES: [&str; 6] = [
    "sales",
    "product_sales",
    "products",
    "channels",
    "delivery_addresses",
    "stores",
];

/// Fail with the list of missing tables, if any.
pub async fn verify_schema(pool: &PgPool) -> Result<()> {
    // ---
    let missing: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT t.name
        FROM unnest($1::text[]) AS t(name)
        WHERE to_regclass(t.name) IS NULL
        ORDER BY t.name
        "#,
    )
    .bind(&REQUIRED_TABLES[..])
    .fetch_all(pool)
    .await?;

    if !missing.is_empty() {
        let names: Vec<String> = missing.into_iter().map(|(name,)| name).collect();
        bail!("Sales dataset is missing tables: {}", names.join(", "));
    }

    tracing::info!("Sales dataset schema verified");
    Ok(())
}
