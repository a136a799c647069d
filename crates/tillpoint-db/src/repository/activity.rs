//! # Activity Log Repository
//!
//! Append-only audit trail for sales and returns.
//!
//! Coordinators write their audit entries inside a savepoint of the business
//! transaction. A failed audit insert rolls back to the savepoint and is
//! logged; the sale or return it describes still commits.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Connection, FromRow, SqliteConnection, SqlitePool};
use tracing::{debug, warn};

use crate::error::DbResult;
use tillpoint_core::{ActivityEntry, ActivityType};

#[derive(Debug, FromRow)]
struct ActivityRow {
    id: i64,
    staff_id: i64,
    activity_type: ActivityType,
    details: String,
    created_at: DateTime<Utc>,
}

impl From<ActivityRow> for ActivityEntry {
    fn from(row: ActivityRow) -> Self {
        ActivityEntry {
            id: row.id,
            staff_id: row.staff_id,
            activity_type: row.activity_type,
            details: row.details,
            created_at: row.created_at,
        }
    }
}

/// Inserts one entry on an open connection.
pub(crate) async fn append(
    conn: &mut SqliteConnection,
    staff_id: i64,
    activity_type: ActivityType,
    details: &Value,
    now: DateTime<Utc>,
) -> DbResult<i64> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO activity_log (staff_id, activity_type, details, created_at)
        VALUES (?1, ?2, ?3, ?4)
        RETURNING id
        "#,
    )
    .bind(staff_id)
    .bind(activity_type)
    .bind(details.to_string())
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    debug!(id, staff_id, ?activity_type, "Activity logged");
    Ok(id)
}

/// Inserts one entry inside a savepoint of the caller's transaction.
///
/// Never fails the caller: errors roll back to the savepoint, get logged,
/// and come back as `None`.
pub(crate) async fn append_in_savepoint(
    conn: &mut SqliteConnection,
    staff_id: i64,
    activity_type: ActivityType,
    details: &Value,
    now: DateTime<Utc>,
) -> Option<i64> {
    let mut savepoint = match conn.begin().await {
        Ok(savepoint) => savepoint,
        Err(e) => {
            warn!(?e, staff_id, ?activity_type, "Could not open audit savepoint");
            return None;
        }
    };

    match append(&mut savepoint, staff_id, activity_type, details, now).await {
        Ok(id) => match savepoint.commit().await {
            Ok(()) => Some(id),
            Err(e) => {
                warn!(?e, staff_id, ?activity_type, "Could not release audit savepoint");
                None
            }
        },
        Err(e) => {
            warn!(?e, staff_id, ?activity_type, "Audit entry dropped");
            if let Err(e) = savepoint.rollback().await {
                warn!(?e, "Could not roll back audit savepoint");
            }
            None
        }
    }
}

/// Read and write access to the audit trail.
#[derive(Debug, Clone)]
pub struct ActivityLogRepository {
    pool: SqlitePool,
}

impl ActivityLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ActivityLogRepository { pool }
    }

    /// Appends an entry outside any business transaction.
    pub async fn append(
        &self,
        staff_id: i64,
        activity_type: ActivityType,
        details: &Value,
    ) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;
        append(&mut conn, staff_id, activity_type, details, Utc::now()).await
    }

    /// Most recent entries first.
    pub async fn recent(&self, limit: i64) -> DbResult<Vec<ActivityEntry>> {
        let rows: Vec<ActivityRow> = sqlx::query_as(
            r#"
            SELECT id, staff_id, activity_type, details, created_at
            FROM activity_log
            ORDER BY id DESC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ActivityEntry::from).collect())
    }

    /// Entries written for one staff member, oldest first.
    pub async fn for_staff(&self, staff_id: i64) -> DbResult<Vec<ActivityEntry>> {
        let rows: Vec<ActivityRow> = sqlx::query_as(
            r#"
            SELECT id, staff_id, activity_type, details, created_at
            FROM activity_log
            WHERE staff_id = ?1
            ORDER BY created_at, id
            "#,
        )
        .bind(staff_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ActivityEntry::from).collect())
    }
}
