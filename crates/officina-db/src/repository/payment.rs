//! # Payment Repository
//!
//! Payments and the allocation rows that spread them over invoices. A
//! payment's unallocated part is never stored: it is the amount minus the
//! sum of its allocations.

use officina_core::{Payment, PaymentAllocation};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;

const SELECT_PAYMENT: &str = r#"
    SELECT id, client_id, amount_cents, payment_date, method, reference, notes, created_at
    FROM payments
"#;

const SELECT_ALLOCATION: &str = r#"
    SELECT id, payment_id, invoice_id, amount_cents, created_at
    FROM payment_allocations
"#;

/// Repository for payments and allocations.
#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: SqlitePool,
}

impl PaymentRepository {
    /// Creates a new PaymentRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PaymentRepository { pool }
    }

    /// Gets a payment with its allocations.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Payment>> {
        let mut conn = self.pool.acquire().await?;
        Self::find(&mut conn, id).await
    }

    /// Payments received from a client, newest first, with allocations.
    pub async fn list_for_client(&self, client_id: &str) -> DbResult<Vec<Payment>> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!("{SELECT_PAYMENT} WHERE client_id = ? ORDER BY payment_date DESC, created_at DESC");
        let mut payments = sqlx::query_as::<_, Payment>(&sql)
            .bind(client_id)
            .fetch_all(&mut *conn)
            .await?;

        for payment in &mut payments {
            payment.allocations = Self::allocations_of_payment(&mut conn, &payment.id).await?;
        }

        Ok(payments)
    }

    /// Allocations settling an invoice, oldest first.
    pub async fn allocations_for_invoice(&self, invoice_id: &str) -> DbResult<Vec<PaymentAllocation>> {
        let mut conn = self.pool.acquire().await?;
        Self::allocations_of_invoice(&mut conn, invoice_id).await
    }

    // -------------------------------------------------------------------------
    // Connection functions
    // -------------------------------------------------------------------------

    pub(crate) async fn find(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Payment>> {
        let sql = format!("{SELECT_PAYMENT} WHERE id = ?");
        let payment = sqlx::query_as::<_, Payment>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        match payment {
            Some(mut payment) => {
                payment.allocations = Self::allocations_of_payment(conn, &payment.id).await?;
                Ok(Some(payment))
            }
            None => Ok(None),
        }
    }

    /// Inserts the payment header and its allocations.
    pub(crate) async fn insert(conn: &mut SqliteConnection, payment: &Payment) -> DbResult<()> {
        debug!(id = %payment.id, amount = %payment.amount(), "Inserting payment");

        sqlx::query(
            r#"
            INSERT INTO payments (
                id, client_id, amount_cents, payment_date, method, reference, notes, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.client_id)
        .bind(payment.amount_cents)
        .bind(payment.payment_date)
        .bind(payment.method)
        .bind(&payment.reference)
        .bind(&payment.notes)
        .bind(payment.created_at)
        .execute(&mut *conn)
        .await?;

        Self::insert_allocations(conn, &payment.allocations).await
    }

    pub(crate) async fn insert_allocations(
        conn: &mut SqliteConnection,
        allocations: &[PaymentAllocation],
    ) -> DbResult<()> {
        for allocation in allocations {
            sqlx::query(
                r#"
                INSERT INTO payment_allocations (id, payment_id, invoice_id, amount_cents, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(&allocation.id)
            .bind(&allocation.payment_id)
            .bind(&allocation.invoice_id)
            .bind(allocation.amount_cents)
            .bind(allocation.created_at)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    pub(crate) async fn allocations_of_payment(
        conn: &mut SqliteConnection,
        payment_id: &str,
    ) -> DbResult<Vec<PaymentAllocation>> {
        let sql = format!("{SELECT_ALLOCATION} WHERE payment_id = ? ORDER BY created_at, id");
        let allocations = sqlx::query_as::<_, PaymentAllocation>(&sql)
            .bind(payment_id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(allocations)
    }

    pub(crate) async fn allocations_of_invoice(
        conn: &mut SqliteConnection,
        invoice_id: &str,
    ) -> DbResult<Vec<PaymentAllocation>> {
        let sql = format!("{SELECT_ALLOCATION} WHERE invoice_id = ? ORDER BY created_at, id");
        let allocations = sqlx::query_as::<_, PaymentAllocation>(&sql)
            .bind(invoice_id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(allocations)
    }

    /// Removes every allocation of a payment; returns how many went.
    pub(crate) async fn clear_allocations(conn: &mut SqliteConnection, payment_id: &str) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM payment_allocations WHERE payment_id = ?")
            .bind(payment_id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    /// Deletes a payment; its allocations cascade.
    pub(crate) async fn delete(conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM payments WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}
