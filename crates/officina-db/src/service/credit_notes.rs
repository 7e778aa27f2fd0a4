//! # Credit Note Service
//!
//! Issues credit notes against invoices. Credit notes are numbered in their
//! own family (`NC-2026/0001`), so the lock taken is the credit-note
//! sequence of the credit note's period plus the billing party's ledger.

use chrono::{NaiveDate, Utc};
use officina_core::credit_note::{self, CreditLineRequest, CreditNoteDraft};
use officina_core::numbering::period_of;
use officina_core::{CoreError, CoreResult, CreditNote, DocumentFamily, Invoice, Money};
use tracing::info;

use crate::error::DbResult;
use crate::ledger::LockKey;
use crate::pool::Database;
use crate::repository::{CreditNoteRepository, InvoiceRepository};

/// Full and partial invoice reversals.
#[derive(Debug, Clone)]
pub struct CreditNoteService {
    db: Database,
}

impl CreditNoteService {
    pub fn new(db: Database) -> Self {
        CreditNoteService { db }
    }

    /// Reverses a whole invoice, stamp duty included.
    pub async fn reverse_full(&self, invoice_id: &str, reason: &str, date: NaiveDate) -> DbResult<CreditNote> {
        self.issue(invoice_id, date, |invoice, credited| {
            credit_note::reverse_full(invoice, credited, reason, date)
        })
        .await
    }

    /// Reverses the requested quantities of some invoice lines.
    pub async fn reverse_partial(
        &self,
        invoice_id: &str,
        lines: &[CreditLineRequest],
        reason: &str,
        date: NaiveDate,
    ) -> DbResult<CreditNote> {
        self.issue(invoice_id, date, |invoice, credited| {
            credit_note::reverse_partial(invoice, credited, lines, reason, date)
        })
        .await
    }

    /// Credit notes issued against an invoice.
    pub async fn list_credit_notes(&self, invoice_id: &str) -> DbResult<Vec<CreditNote>> {
        self.db.credit_note_records().list_for_invoice(invoice_id).await
    }

    async fn issue<F>(&self, invoice_id: &str, date: NaiveDate, compute: F) -> DbResult<CreditNote>
    where
        F: FnOnce(&Invoice, Money) -> CoreResult<CreditNoteDraft>,
    {
        let bill_to = {
            let mut conn = self.db.pool().acquire().await?;
            InvoiceRepository::find(&mut conn, invoice_id)
                .await?
                .ok_or_else(|| CoreError::not_found("Invoice", invoice_id))?
                .bill_to_client_id
        };
        let period = period_of(date);

        let mut tx = self
            .db
            .begin_ledger(vec![
                LockKey::sequence(DocumentFamily::CreditNote, period),
                LockKey::client(bill_to),
            ])
            .await?;

        let invoice = InvoiceRepository::find(tx.conn(), invoice_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Invoice", invoice_id))?;
        let credited = InvoiceRepository::credited(tx.conn(), invoice_id).await?;

        let draft = compute(&invoice, credited)?;
        let number = tx.next_number(DocumentFamily::CreditNote, period).await?;
        let note = draft.into_credit_note(number, Utc::now());

        CreditNoteRepository::insert(tx.conn(), &note).await?;
        tx.commit().await?;

        info!(
            number = %note.credit_note_number,
            invoice = %invoice.invoice_number,
            kind = ?note.kind,
            total = %note.total(),
            "Credit note issued"
        );
        Ok(note)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
