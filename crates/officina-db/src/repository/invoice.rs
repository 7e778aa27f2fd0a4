//! # Invoice Repository
//!
//! Invoices, their lines, and the balance queries the ledger derives
//! everything else from.
//!
//! ## Balances
//! ```text
//! paid      = Σ payment_allocations.amount_cents  for the invoice
//! credited  = Σ credit_notes.total_cents           for the invoice (≤ 0)
//! remaining = total − paid − |credited|            (never below zero)
//!
//! exposure(party) = Σ invoices.total_cents billed to the party
//!                 − Σ allocations against those invoices
//! ```
//!
//! Exposure is summed from allocation rows, never from payment amounts: a
//! single payment split over two invoices counts once.

use chrono::NaiveDate;
use officina_core::allocation::OpenInvoice;
use officina_core::credit_limit;
use officina_core::status::{derive_status, remaining};
use officina_core::{Invoice, InvoiceLine, InvoiceStatus, InvoiceSummary, Money};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;

const SELECT_INVOICE: &str = r#"
    SELECT
        i.id, i.invoice_number, i.period, i.sequence, i.work_order_id,
        i.client_id, i.bill_to_client_id, i.bill_to_name, i.bill_to_tax_id,
        i.bill_to_address, i.claim_number, i.invoice_date, i.due_date,
        i.subtotal_cents, i.vat_rate_bps, i.vat_cents, i.stamp_duty_cents,
        i.total_cents, i.vat_exempt, i.vat_exemption_code, i.split_payment,
        i.intent_declaration_id, i.plafond_used_cents, i.notes, i.customer_notes,
        i.payment_iban, i.payment_reference, i.created_at
"#;

const PAID_SUBQUERY: &str =
    "COALESCE((SELECT SUM(pa.amount_cents) FROM payment_allocations pa WHERE pa.invoice_id = i.id), 0)";

const CREDITED_SUBQUERY: &str =
    "COALESCE((SELECT SUM(cn.total_cents) FROM credit_notes cn WHERE cn.invoice_id = i.id), 0)";

/// An invoice header with its settlement sums.
#[derive(Debug, FromRow)]
struct BalanceRow {
    #[sqlx(flatten)]
    invoice: Invoice,
    paid_cents: i64,
    credited_cents: i64,
}

impl BalanceRow {
    fn summarize(self, today: NaiveDate) -> InvoiceSummary {
        let paid = Money::from_cents(self.paid_cents);
        let credited = Money::from_cents(self.credited_cents);
        let status = derive_status(
            self.invoice.total(),
            self.invoice.due_date,
            paid,
            self.credited_cents != 0,
            today,
        );
        InvoiceSummary {
            remaining_cents: remaining(self.invoice.total(), paid, credited).cents(),
            paid_cents: self.paid_cents,
            credited_cents: self.credited_cents,
            status,
            invoice: self.invoice,
        }
    }
}

/// Repository for invoices.
#[derive(Debug, Clone)]
pub struct InvoiceRepository {
    pool: SqlitePool,
}

impl InvoiceRepository {
    /// Creates a new InvoiceRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InvoiceRepository { pool }
    }

    /// Gets an invoice with its lines.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Invoice>> {
        let mut conn = self.pool.acquire().await?;
        Self::find(&mut conn, id).await
    }

    /// Gets an invoice by its document number, e.g. `2026/0001`.
    pub async fn get_by_number(&self, invoice_number: &str) -> DbResult<Option<Invoice>> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!("{SELECT_INVOICE} FROM invoices i WHERE i.invoice_number = ?");
        let invoice = sqlx::query_as::<_, Invoice>(&sql)
            .bind(invoice_number)
            .fetch_optional(&mut *conn)
            .await?;

        match invoice {
            Some(mut invoice) => {
                invoice.lines = Self::lines(&mut conn, &invoice.id).await?;
                Ok(Some(invoice))
            }
            None => Ok(None),
        }
    }

    /// Invoice headers with derived figures, newest number first.
    pub async fn summaries(&self, client_id: Option<&str>, today: NaiveDate) -> DbResult<Vec<InvoiceSummary>> {
        let sql = format!(
            "{SELECT_INVOICE}, {PAID_SUBQUERY} AS paid_cents, {CREDITED_SUBQUERY} AS credited_cents \
             FROM invoices i \
             WHERE (?1 IS NULL OR i.bill_to_client_id = ?1) \
             ORDER BY i.period DESC, i.sequence DESC"
        );
        let rows = sqlx::query_as::<_, BalanceRow>(&sql)
            .bind(client_id)
            .fetch_all(&self.pool)
            .await?;

        debug!(count = rows.len(), client_id = ?client_id, "Listed invoices");
        Ok(rows.into_iter().map(|row| row.summarize(today)).collect())
    }

    // -------------------------------------------------------------------------
    // Connection functions
    // -------------------------------------------------------------------------

    pub(crate) async fn find(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Invoice>> {
        let sql = format!("{SELECT_INVOICE} FROM invoices i WHERE i.id = ?");
        let invoice = sqlx::query_as::<_, Invoice>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        match invoice {
            Some(mut invoice) => {
                invoice.lines = Self::lines(conn, &invoice.id).await?;
                Ok(Some(invoice))
            }
            None => Ok(None),
        }
    }

    pub(crate) async fn lines(conn: &mut SqliteConnection, invoice_id: &str) -> DbResult<Vec<InvoiceLine>> {
        let lines = sqlx::query_as::<_, InvoiceLine>(
            r#"
            SELECT
                id, invoice_id, line_number, line_type, description,
                quantity_hundredths, unit_price_cents, discount_bps, discount_cents,
                vat_rate_bps, subtotal_cents, vat_cents
            FROM invoice_lines
            WHERE invoice_id = ?
            ORDER BY line_number
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(lines)
    }

    /// Inserts the invoice and its lines.
    pub(crate) async fn insert(conn: &mut SqliteConnection, invoice: &Invoice) -> DbResult<()> {
        debug!(id = %invoice.id, number = %invoice.invoice_number, "Inserting invoice");

        sqlx::query(
            r#"
            INSERT INTO invoices (
                id, invoice_number, period, sequence, work_order_id,
                client_id, bill_to_client_id, bill_to_name, bill_to_tax_id,
                bill_to_address, claim_number, invoice_date, due_date,
                subtotal_cents, vat_rate_bps, vat_cents, stamp_duty_cents,
                total_cents, vat_exempt, vat_exemption_code, split_payment,
                intent_declaration_id, plafond_used_cents, notes, customer_notes,
                payment_iban, payment_reference, created_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8, ?9,
                ?10, ?11, ?12, ?13,
                ?14, ?15, ?16, ?17,
                ?18, ?19, ?20, ?21,
                ?22, ?23, ?24, ?25,
                ?26, ?27, ?28
            )
            "#,
        )
        .bind(&invoice.id)
        .bind(&invoice.invoice_number)
        .bind(invoice.period)
        .bind(invoice.sequence)
        .bind(&invoice.work_order_id)
        .bind(&invoice.client_id)
        .bind(&invoice.bill_to_client_id)
        .bind(&invoice.bill_to_name)
        .bind(&invoice.bill_to_tax_id)
        .bind(&invoice.bill_to_address)
        .bind(&invoice.claim_number)
        .bind(invoice.invoice_date)
        .bind(invoice.due_date)
        .bind(invoice.subtotal_cents)
        .bind(invoice.vat_rate_bps)
        .bind(invoice.vat_cents)
        .bind(invoice.stamp_duty_cents)
        .bind(invoice.total_cents)
        .bind(invoice.vat_exempt)
        .bind(&invoice.vat_exemption_code)
        .bind(invoice.split_payment)
        .bind(&invoice.intent_declaration_id)
        .bind(invoice.plafond_used_cents)
        .bind(&invoice.notes)
        .bind(&invoice.customer_notes)
        .bind(&invoice.payment_iban)
        .bind(&invoice.payment_reference)
        .bind(invoice.created_at)
        .execute(&mut *conn)
        .await?;

        for line in &invoice.lines {
            sqlx::query(
                r#"
                INSERT INTO invoice_lines (
                    id, invoice_id, line_number, line_type, description,
                    quantity_hundredths, unit_price_cents, discount_bps, discount_cents,
                    vat_rate_bps, subtotal_cents, vat_cents
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                "#,
            )
            .bind(&line.id)
            .bind(&line.invoice_id)
            .bind(line.line_number)
            .bind(line.line_type)
            .bind(&line.description)
            .bind(line.quantity_hundredths)
            .bind(line.unit_price_cents)
            .bind(line.discount_bps)
            .bind(line.discount_cents)
            .bind(line.vat_rate_bps)
            .bind(line.subtotal_cents)
            .bind(line.vat_cents)
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }

    /// Rewrites the only mutable fields of an invoice.
    pub(crate) async fn update_annotations(
        conn: &mut SqliteConnection,
        id: &str,
        notes: Option<&str>,
        customer_notes: Option<&str>,
        due_date: NaiveDate,
    ) -> DbResult<()> {
        sqlx::query("UPDATE invoices SET notes = ?1, customer_notes = ?2, due_date = ?3 WHERE id = ?4")
            .bind(notes)
            .bind(customer_notes)
            .bind(due_date)
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Deletes the invoice; its lines cascade.
    pub(crate) async fn delete(conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM invoices WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub(crate) async fn last_sequence(conn: &mut SqliteConnection, period: i32) -> DbResult<Option<u32>> {
        let last: Option<i64> = sqlx::query_scalar("SELECT MAX(sequence) FROM invoices WHERE period = ?")
            .bind(period)
            .fetch_one(&mut *conn)
            .await?;
        Ok(last.and_then(|v| u32::try_from(v).ok()))
    }

    /// Σ allocations against the invoice.
    pub(crate) async fn paid(conn: &mut SqliteConnection, invoice_id: &str) -> DbResult<Money> {
        let cents: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount_cents), 0) FROM payment_allocations WHERE invoice_id = ?",
        )
        .bind(invoice_id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(Money::from_cents(cents))
    }

    /// Σ credit-note totals against the invoice (zero or negative).
    pub(crate) async fn credited(conn: &mut SqliteConnection, invoice_id: &str) -> DbResult<Money> {
        let cents: i64 =
            sqlx::query_scalar("SELECT COALESCE(SUM(total_cents), 0) FROM credit_notes WHERE invoice_id = ?")
                .bind(invoice_id)
                .fetch_one(&mut *conn)
                .await?;
        Ok(Money::from_cents(cents))
    }

    /// What `invoice` still owes.
    pub(crate) async fn remaining_of(conn: &mut SqliteConnection, invoice: &Invoice) -> DbResult<Money> {
        let paid = Self::paid(conn, &invoice.id).await?;
        let credited = Self::credited(conn, &invoice.id).await?;
        Ok(remaining(invoice.total(), paid, credited))
    }

    /// Every invoice billed to `client_id` with what it still owes.
    pub(crate) async fn open_for_client(conn: &mut SqliteConnection, client_id: &str) -> DbResult<Vec<OpenInvoice>> {
        let sql = format!(
            "SELECT i.id, i.invoice_number, i.invoice_date, i.due_date, i.total_cents, \
             {PAID_SUBQUERY} AS paid_cents, {CREDITED_SUBQUERY} AS credited_cents \
             FROM invoices i \
             WHERE i.bill_to_client_id = ? \
             ORDER BY i.invoice_date, i.invoice_number"
        );
        let rows: Vec<(String, String, NaiveDate, NaiveDate, i64, i64, i64)> = sqlx::query_as(&sql)
            .bind(client_id)
            .fetch_all(&mut *conn)
            .await?;

        let open = rows
            .into_iter()
            .map(|(invoice_id, invoice_number, invoice_date, due_date, total, paid, credited)| OpenInvoice {
                invoice_id,
                invoice_number,
                invoice_date,
                due_date,
                remaining: remaining(
                    Money::from_cents(total),
                    Money::from_cents(paid),
                    Money::from_cents(credited),
                ),
            })
            .collect::<Vec<_>>();

        debug!(client_id = %client_id, invoices = open.len(), "Loaded client balances");
        Ok(open)
    }

    /// Outstanding exposure of a billing party.
    pub(crate) async fn exposure(conn: &mut SqliteConnection, client_id: &str) -> DbResult<Money> {
        let invoiced: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(total_cents), 0) FROM invoices WHERE bill_to_client_id = ?",
        )
        .bind(client_id)
        .fetch_one(&mut *conn)
        .await?;

        let allocated: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(pa.amount_cents), 0)
            FROM payment_allocations pa
            JOIN invoices i ON i.id = pa.invoice_id
            WHERE i.bill_to_client_id = ?
            "#,
        )
        .bind(client_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(credit_limit::exposure(Money::from_cents(invoiced), Money::from_cents(allocated)))
    }

    /// Derived status of a persisted invoice.
    pub(crate) async fn status_of(
        conn: &mut SqliteConnection,
        invoice: &Invoice,
        today: NaiveDate,
    ) -> DbResult<InvoiceStatus> {
        let paid = Self::paid(conn, &invoice.id).await?;
        let credited = Self::credited(conn, &invoice.id).await?;
        Ok(derive_status(invoice.total(), invoice.due_date, paid, !credited.is_zero(), today))
    }
}
