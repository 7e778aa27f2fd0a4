//! # Credit Note Repository
//!
//! Credit notes are append-only: once issued they are never edited or
//! deleted, only added to.

use officina_core::{CreditNote, CreditNoteLine};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;

const SELECT_CREDIT_NOTE: &str = r#"
    SELECT
        id, credit_note_number, period, sequence, invoice_id, client_id,
        credit_note_date, kind, reason, subtotal_cents, vat_cents,
        stamp_duty_cents, total_cents, created_at
    FROM credit_notes
"#;

/// Repository for credit notes.
#[derive(Debug, Clone)]
pub struct CreditNoteRepository {
    pool: SqlitePool,
}

impl CreditNoteRepository {
    /// Creates a new CreditNoteRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CreditNoteRepository { pool }
    }

    /// Gets a credit note with its lines.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<CreditNote>> {
        let mut conn = self.pool.acquire().await?;
        let sql = format!("{SELECT_CREDIT_NOTE} WHERE id = ?");
        let note = sqlx::query_as::<_, CreditNote>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        match note {
            Some(mut note) => {
                note.lines = Self::lines(&mut conn, &note.id).await?;
                Ok(Some(note))
            }
            None => Ok(None),
        }
    }

    /// Credit notes issued against an invoice, in number order.
    pub async fn list_for_invoice(&self, invoice_id: &str) -> DbResult<Vec<CreditNote>> {
        let mut conn = self.pool.acquire().await?;
        Self::for_invoice(&mut conn, invoice_id).await
    }

    // -------------------------------------------------------------------------
    // Connection functions
    // -------------------------------------------------------------------------

    pub(crate) async fn for_invoice(conn: &mut SqliteConnection, invoice_id: &str) -> DbResult<Vec<CreditNote>> {
        let sql = format!("{SELECT_CREDIT_NOTE} WHERE invoice_id = ? ORDER BY period, sequence");
        let mut notes = sqlx::query_as::<_, CreditNote>(&sql)
            .bind(invoice_id)
            .fetch_all(&mut *conn)
            .await?;

        for note in &mut notes {
            note.lines = Self::lines(conn, &note.id).await?;
        }

        Ok(notes)
    }

    async fn lines(conn: &mut SqliteConnection, credit_note_id: &str) -> DbResult<Vec<CreditNoteLine>> {
        let lines = sqlx::query_as::<_, CreditNoteLine>(
            r#"
            SELECT
                id, credit_note_id, line_number, source_line_id, line_type, description,
                quantity_hundredths, unit_price_cents, discount_bps, discount_cents,
                vat_rate_bps, subtotal_cents, vat_cents
            FROM credit_note_lines
            WHERE credit_note_id = ?
            ORDER BY line_number
            "#,
        )
        .bind(credit_note_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(lines)
    }

    /// Inserts a credit note and its lines.
    pub(crate) async fn insert(conn: &mut SqliteConnection, note: &CreditNote) -> DbResult<()> {
        debug!(id = %note.id, number = %note.credit_note_number, total = %note.total(), "Inserting credit note");

        sqlx::query(
            r#"
            INSERT INTO credit_notes (
                id, credit_note_number, period, sequence, invoice_id, client_id,
                credit_note_date, kind, reason, subtotal_cents, vat_cents,
                stamp_duty_cents, total_cents, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
        )
        .bind(&note.id)
        .bind(&note.credit_note_number)
        .bind(note.period)
        .bind(note.sequence)
        .bind(&note.invoice_id)
        .bind(&note.client_id)
        .bind(note.credit_note_date)
        .bind(note.kind)
        .bind(&note.reason)
        .bind(note.subtotal_cents)
        .bind(note.vat_cents)
        .bind(note.stamp_duty_cents)
        .bind(note.total_cents)
        .bind(note.created_at)
        .execute(&mut *conn)
        .await?;

        for line in &note.lines {
            sqlx::query(
                r#"
                INSERT INTO credit_note_lines (
                    id, credit_note_id, line_number, source_line_id, line_type, description,
                    quantity_hundredths, unit_price_cents, discount_bps, discount_cents,
                    vat_rate_bps, subtotal_cents, vat_cents
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                "#,
            )
            .bind(&line.id)
            .bind(&line.credit_note_id)
            .bind(line.line_number)
            .bind(&line.source_line_id)
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
}
