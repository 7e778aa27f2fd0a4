//! # Deposit Repository
//!
//! Deposit status changes are guarded on the current status, so two
//! operations racing on the same deposit cannot both succeed:
//!
//! ```text
//! pending ──apply──► applied ──(payment deleted)──► pending
//!    │
//!    └──refund──► refunded
//! ```

use officina_core::{Deposit, DepositStatus};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use crate::repository::expect_one_row;

const SELECT_DEPOSIT: &str = r#"
    SELECT
        id, client_id, work_order_id, amount_cents, method, deposit_date,
        reference, notes, status, invoice_id, payment_id, created_at
    FROM deposits
"#;

/// Repository for deposits.
#[derive(Debug, Clone)]
pub struct DepositRepository {
    pool: SqlitePool,
}

impl DepositRepository {
    /// Creates a new DepositRepository.
    pub fn new(pool: SqlitePool) -> Self {
        DepositRepository { pool }
    }

    /// Gets a deposit by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Deposit>> {
        let mut conn = self.pool.acquire().await?;
        Self::find(&mut conn, id).await
    }

    /// Pending deposits taken against a work order, oldest first.
    pub async fn pending_for_work_order(&self, work_order_id: &str) -> DbResult<Vec<Deposit>> {
        let mut conn = self.pool.acquire().await?;
        Self::pending_of_work_order(&mut conn, work_order_id).await
    }

    // -------------------------------------------------------------------------
    // Connection functions
    // -------------------------------------------------------------------------

    pub(crate) async fn find(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Deposit>> {
        let sql = format!("{SELECT_DEPOSIT} WHERE id = ?");
        let deposit = sqlx::query_as::<_, Deposit>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(deposit)
    }

    pub(crate) async fn pending_of_work_order(
        conn: &mut SqliteConnection,
        work_order_id: &str,
    ) -> DbResult<Vec<Deposit>> {
        let sql = format!("{SELECT_DEPOSIT} WHERE work_order_id = ? AND status = ? ORDER BY deposit_date, created_at");
        let deposits = sqlx::query_as::<_, Deposit>(&sql)
            .bind(work_order_id)
            .bind(DepositStatus::Pending)
            .fetch_all(&mut *conn)
            .await?;
        Ok(deposits)
    }

    pub(crate) async fn insert(conn: &mut SqliteConnection, deposit: &Deposit) -> DbResult<()> {
        debug!(id = %deposit.id, amount = %deposit.amount(), "Inserting deposit");

        sqlx::query(
            r#"
            INSERT INTO deposits (
                id, client_id, work_order_id, amount_cents, method, deposit_date,
                reference, notes, status, invoice_id, payment_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&deposit.id)
        .bind(&deposit.client_id)
        .bind(&deposit.work_order_id)
        .bind(deposit.amount_cents)
        .bind(deposit.method)
        .bind(deposit.deposit_date)
        .bind(&deposit.reference)
        .bind(&deposit.notes)
        .bind(deposit.status)
        .bind(&deposit.invoice_id)
        .bind(&deposit.payment_id)
        .bind(deposit.created_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// pending → applied, linking the invoice and the payment created for it.
    pub(crate) async fn mark_applied(
        conn: &mut SqliteConnection,
        id: &str,
        invoice_id: &str,
        payment_id: &str,
    ) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE deposits SET status = ?1, invoice_id = ?2, payment_id = ?3 WHERE id = ?4 AND status = ?5",
        )
        .bind(DepositStatus::Applied)
        .bind(invoice_id)
        .bind(payment_id)
        .bind(id)
        .bind(DepositStatus::Pending)
        .execute(&mut *conn)
        .await?;
        expect_one_row(result.rows_affected(), || format!("deposit {} is no longer pending", id))
    }

    /// pending → refunded.
    pub(crate) async fn mark_refunded(conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
        let result = sqlx::query("UPDATE deposits SET status = ?1 WHERE id = ?2 AND status = ?3")
            .bind(DepositStatus::Refunded)
            .bind(id)
            .bind(DepositStatus::Pending)
            .execute(&mut *conn)
            .await?;
        expect_one_row(result.rows_affected(), || format!("deposit {} is no longer pending", id))
    }

    /// applied → pending for whatever deposit produced `payment_id`.
    ///
    /// Returns the number of deposits released (0 or 1).
    pub(crate) async fn release_payment(conn: &mut SqliteConnection, payment_id: &str) -> DbResult<u64> {
        let result = sqlx::query(
            "UPDATE deposits SET status = ?1, invoice_id = NULL, payment_id = NULL WHERE payment_id = ?2 AND status = ?3",
        )
        .bind(DepositStatus::Pending)
        .bind(payment_id)
        .bind(DepositStatus::Applied)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }
}
