//! Durable record of event lifecycle state.
//!
//! The pipeline only ever writes: an event-level `failed` status and
//! per-destination outcome rows. Nothing is written on the happy path;
//! success is implicit in the absence of a failure row. Nothing is read
//! back except destination display names. Updates tolerate being invoked
//! repeatedly for the same event.

use std::fmt;

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::error::StatusStoreError;

pub const EVENT_STATUS_FAILED: &str = "failed";

/// Outcome recorded per (event, destination). Only failures are persisted;
/// the schema carries the status column for operator tooling that reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationStatus {
    Failed,
}

impl fmt::Display for DestinationStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DestinationStatus::Failed => write!(f, "failed"),
        }
    }
}

#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Mark the event failed. Safe to call more than once per event.
    async fn record_failure(&self, event_id: &str) -> Result<(), StatusStoreError>;

    /// Record the outcome of one destination delivery.
    async fn record_destination_outcome(
        &self,
        event_id: &str,
        destination_name: &str,
        status: DestinationStatus,
        response: &str,
    ) -> Result<(), StatusStoreError>;

    /// Human-readable label for a destination service identifier, if one is
    /// configured.
    async fn destination_display_name(
        &self,
        service_id: &str,
    ) -> Result<Option<String>, StatusStoreError>;
}

pub struct PgStatusStore {
    pool: PgPool,
}

impl PgStatusStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StatusStore for PgStatusStore {
    async fn record_failure(&self, event_id: &str) -> Result<(), StatusStoreError> {
        sqlx::query(
            r#"
INSERT INTO hub_event_status (event_id, status)
VALUES ($1, $2)
ON CONFLICT (event_id) DO UPDATE
SET status = $2, updated_at = now()
            "#,
        )
        .bind(event_id)
        .bind(EVENT_STATUS_FAILED)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_destination_outcome(
        &self,
        event_id: &str,
        destination_name: &str,
        status: DestinationStatus,
        response: &str,
    ) -> Result<(), StatusStoreError> {
        sqlx::query(
            r#"
INSERT INTO hub_event_destination (event_id, destination_name, status, response)
VALUES ($1, $2, $3, $4)
ON CONFLICT (event_id, destination_name) DO UPDATE
SET status = $3, response = $4, updated_at = now()
            "#,
        )
        .bind(event_id)
        .bind(destination_name)
        .bind(status.to_string())
        .bind(response)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn destination_display_name(
        &self,
        service_id: &str,
    ) -> Result<Option<String>, StatusStoreError> {
        let row = sqlx::query(
            r#"
SELECT display_name FROM hub_destination WHERE service_id = $1
            "#,
        )
        .bind(service_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| row.get("display_name")))
    }
}
