//! # Work Order Repository
//!
//! Reads the work-order snapshot the Invoice Builder consumes and writes back
//! the only status changes the ledger owns:
//!
//! ```text
//! completed ──(invoice built)──► invoiced ──(invoice deleted)──► completed
//! ```

use officina_core::{LineType, PartUsage, WorkOrderItem, WorkOrderSnapshot, WorkOrderStatus};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use crate::repository::expect_one_row;

/// Repository for work-order snapshots.
#[derive(Debug, Clone)]
pub struct WorkOrderRepository {
    pool: SqlitePool,
}

impl WorkOrderRepository {
    /// Creates a new WorkOrderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        WorkOrderRepository { pool }
    }

    /// Gets a work order with its items and parts in order.
    pub async fn get_snapshot(&self, id: &str) -> DbResult<Option<WorkOrderSnapshot>> {
        let mut conn = self.pool.acquire().await?;
        Self::find_snapshot(&mut conn, id).await
    }

    /// Inserts a work order with its items and parts.
    ///
    /// Work orders are maintained by the back office; this exists so a
    /// ledger can be populated without it.
    pub async fn insert(&self, snapshot: &WorkOrderSnapshot) -> DbResult<()> {
        debug!(id = %snapshot.id, items = snapshot.items.len(), parts = snapshot.parts.len(), "Inserting work order");

        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO work_orders (id, client_id, status, claim_number) VALUES (?1, ?2, ?3, ?4)")
            .bind(&snapshot.id)
            .bind(&snapshot.client_id)
            .bind(snapshot.status)
            .bind(&snapshot.claim_number)
            .execute(&mut *tx)
            .await?;

        for (position, item) in snapshot.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO work_order_items (
                    id, work_order_id, position, item_type, description,
                    quantity_hundredths, unit_price_cents
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&snapshot.id)
            .bind(position as i64)
            .bind(item.item_type)
            .bind(&item.description)
            .bind(item.quantity_hundredths)
            .bind(item.unit_price_cents)
            .execute(&mut *tx)
            .await?;
        }

        for (position, part) in snapshot.parts.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO part_usages (
                    id, work_order_id, position, part_code, description,
                    quantity_hundredths, unit_price_cents, vat_rate_bps
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&snapshot.id)
            .bind(position as i64)
            .bind(&part.part_code)
            .bind(&part.description)
            .bind(part.quantity_hundredths)
            .bind(part.unit_price_cents)
            .bind(part.vat_rate_bps)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub(crate) async fn find_snapshot(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<WorkOrderSnapshot>> {
        let header: Option<(String, String, WorkOrderStatus, Option<String>)> =
            sqlx::query_as("SELECT id, client_id, status, claim_number FROM work_orders WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *conn)
                .await?;

        let Some((id, client_id, status, claim_number)) = header else {
            return Ok(None);
        };

        let items: Vec<WorkOrderItem> = sqlx::query_as(
            r#"
            SELECT item_type, description, quantity_hundredths, unit_price_cents
            FROM work_order_items
            WHERE work_order_id = ?
            ORDER BY position
            "#,
        )
        .bind(&id)
        .fetch_all(&mut *conn)
        .await?;

        let parts: Vec<PartUsage> = sqlx::query_as(
            r#"
            SELECT part_code, description, quantity_hundredths, unit_price_cents, vat_rate_bps
            FROM part_usages
            WHERE work_order_id = ?
            ORDER BY position
            "#,
        )
        .bind(&id)
        .fetch_all(&mut *conn)
        .await?;

        debug!(id = %id, items = items.len(), parts = parts.len(), "Loaded work order snapshot");

        Ok(Some(WorkOrderSnapshot {
            id,
            client_id,
            status,
            claim_number,
            items,
            parts,
        }))
    }

    /// The work order's owner, if the work order exists.
    pub(crate) async fn client_of(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<String>> {
        let client: Option<String> = sqlx::query_scalar("SELECT client_id FROM work_orders WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(client)
    }

    /// completed → invoiced. A work order that left `completed` meanwhile is a conflict.
    pub(crate) async fn mark_invoiced(conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
        let result = sqlx::query("UPDATE work_orders SET status = ?1 WHERE id = ?2 AND status = ?3")
            .bind(WorkOrderStatus::Invoiced)
            .bind(id)
            .bind(WorkOrderStatus::Completed)
            .execute(&mut *conn)
            .await?;
        expect_one_row(result.rows_affected(), || format!("work order {} is no longer completed", id))
    }

    /// invoiced → completed, when the invoice is deleted.
    pub(crate) async fn reopen(conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
        let result = sqlx::query("UPDATE work_orders SET status = ?1 WHERE id = ?2 AND status = ?3")
            .bind(WorkOrderStatus::Completed)
            .bind(id)
            .bind(WorkOrderStatus::Invoiced)
            .execute(&mut *conn)
            .await?;
        expect_one_row(result.rows_affected(), || format!("work order {} is no longer invoiced", id))
    }
}

/// Convenience for building snapshots in tests and the seed binary.
pub fn labor_item(description: &str, quantity_hundredths: i64, unit_price_cents: i64) -> WorkOrderItem {
    WorkOrderItem {
        item_type: LineType::Labor,
        description: description.to_string(),
        quantity_hundredths,
        unit_price_cents,
    }
}
