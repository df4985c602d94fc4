//! Per-request database session and deadline.
//!
//! A handler's analytics work runs inside [`bounded`]: it acquires one pooled
//! connection, runs its queries on it, and the connection returns to the pool
//! when the work finishes, fails, or is dropped at the deadline. Each
//! connection also carries a server-side `statement_timeout` (set in
//! `main.rs`), so an abandoned query does not keep running.

use std::{future::Future, time::Duration};

use sqlx::{pool::PoolConnection, PgPool, Postgres};

use crate::error::AppError;

// ---

pub async fn acquire(pool: &PgPool) -> Result<PoolConnection<Postgres>, AppError> {
    Ok(pool.acquire().await?)
}

/// Run `work`, failing with [`AppError::Timeout`] once `limit` elapses.
pub async fn bounded<T, F>(limit: Duration, work: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    tokio::time::timeout(limit, work)
        .await
        .map_err(|_| AppError::Timeout)?
}
