//! # Credit Note Engine
//!
//! Computes the negative document that reverses an invoice, fully or on
//! selected lines. Each reversed line is re-priced from the negated unit
//! price with the source line's discount and VAT rate, so symmetric rounding
//! gives exactly the negated source amounts on a full reversal.
//!
//! ## Reversal Cap
//! ```text
//! Σ |credit note totals| (existing + this one)  ≤  invoice total
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::invoice::{price_line, PricedLine};
use crate::money::{Money, Quantity};
use crate::numbering::DocumentNumber;
use crate::types::{CreditNote, CreditNoteKind, CreditNoteLine, Invoice, InvoiceLine};
use crate::validation::{validate_quantity, validate_reason};

/// A line to reverse and how much of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CreditLineRequest {
    pub source_line_id: String,
    pub quantity_hundredths: i64,
}

/// A reversed line with the id of the line it mirrors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReversedLine {
    pub source_line_id: String,
    pub priced: PricedLine,
}

/// A credit note waiting for its number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditNoteDraft {
    pub invoice_id: String,
    pub invoice_number: String,
    pub client_id: String,
    pub kind: CreditNoteKind,
    pub reason: String,
    pub credit_note_date: NaiveDate,
    pub lines: Vec<ReversedLine>,
    pub subtotal: Money,
    pub vat: Money,
    pub stamp_duty: Money,
    pub total: Money,
}

impl CreditNoteDraft {
    pub fn into_credit_note(self, number: DocumentNumber, created_at: DateTime<Utc>) -> CreditNote {
        let id = Uuid::new_v4().to_string();
        let lines = self
            .lines
            .into_iter()
            .map(|line| CreditNoteLine {
                id: Uuid::new_v4().to_string(),
                credit_note_id: id.clone(),
                line_number: line.priced.line_number,
                source_line_id: line.source_line_id,
                line_type: line.priced.line_type,
                description: line.priced.description,
                quantity_hundredths: line.priced.quantity.hundredths(),
                unit_price_cents: line.priced.unit_price.cents(),
                discount_bps: line.priced.discount_rate.bps(),
                discount_cents: line.priced.discount.cents(),
                vat_rate_bps: line.priced.vat_rate.bps(),
                subtotal_cents: line.priced.subtotal.cents(),
                vat_cents: line.priced.vat.cents(),
            })
            .collect();

        CreditNote {
            id,
            credit_note_number: number.to_string(),
            period: number.period,
            sequence: number.sequence,
            invoice_id: self.invoice_id,
            client_id: self.client_id,
            credit_note_date: self.credit_note_date,
            kind: self.kind,
            reason: self.reason,
            subtotal_cents: self.subtotal.cents(),
            vat_cents: self.vat.cents(),
            stamp_duty_cents: self.stamp_duty.cents(),
            total_cents: self.total.cents(),
            created_at,
            lines,
        }
    }
}

fn reverse_line(line_number: u32, source: &InvoiceLine, quantity: Quantity) -> ReversedLine {
    ReversedLine {
        source_line_id: source.id.clone(),
        priced: price_line(
            line_number,
            source.line_type,
            &source.description,
            quantity,
            -source.unit_price(),
            source.discount_rate(),
            source.vat_rate(),
        ),
    }
}

fn assemble(
    invoice: &Invoice,
    already_credited: Money,
    kind: CreditNoteKind,
    reason: String,
    date: NaiveDate,
    lines: Vec<ReversedLine>,
    stamp_duty: Money,
) -> CoreResult<CreditNoteDraft> {
    if date < invoice.invoice_date {
        return Err(ValidationError::InvalidFormat {
            field: "credit_note_date".to_string(),
            reason: format!("must not precede the invoice date {}", invoice.invoice_date),
        }
        .into());
    }

    let subtotal: Money = lines.iter().map(|l| l.priced.subtotal).sum();
    let vat: Money = lines.iter().map(|l| l.priced.vat).sum();
    let total = subtotal + vat + stamp_duty;

    if already_credited.abs() + total.abs() > invoice.total() {
        return Err(CoreError::OverReversal {
            invoice_number: invoice.invoice_number.clone(),
            total: invoice.total(),
            credited: already_credited.abs(),
            requested: total.abs(),
        });
    }

    Ok(CreditNoteDraft {
        invoice_id: invoice.id.clone(),
        invoice_number: invoice.invoice_number.clone(),
        client_id: invoice.bill_to_client_id.clone(),
        kind,
        reason,
        credit_note_date: date,
        lines,
        subtotal,
        vat,
        stamp_duty,
        total,
    })
}

/// Reverses every line of `invoice` and its stamp duty.
///
/// `already_credited` is the sum of existing credit-note totals (negative).
pub fn reverse_full(
    invoice: &Invoice,
    already_credited: Money,
    reason: &str,
    date: NaiveDate,
) -> CoreResult<CreditNoteDraft> {
    let reason = validate_reason(reason)?;

    let lines = invoice
        .lines
        .iter()
        .enumerate()
        .map(|(index, source)| reverse_line(index as u32 + 1, source, source.quantity()))
        .collect();

    assemble(
        invoice,
        already_credited,
        CreditNoteKind::Full,
        reason,
        date,
        lines,
        -invoice.stamp_duty(),
    )
}

/// Reverses the requested quantities of selected lines. No stamp duty.
pub fn reverse_partial(
    invoice: &Invoice,
    already_credited: Money,
    requested: &[CreditLineRequest],
    reason: &str,
    date: NaiveDate,
) -> CoreResult<CreditNoteDraft> {
    let reason = validate_reason(reason)?;

    if requested.is_empty() {
        return Err(ValidationError::Required {
            field: "lines".to_string(),
        }
        .into());
    }

    let mut seen = HashSet::new();
    let mut lines = Vec::with_capacity(requested.len());

    for (index, request) in requested.iter().enumerate() {
        if !seen.insert(request.source_line_id.as_str()) {
            return Err(ValidationError::Duplicate {
                field: "source_line_id".to_string(),
                value: request.source_line_id.clone(),
            }
            .into());
        }

        let source = invoice
            .lines
            .iter()
            .find(|l| l.id == request.source_line_id)
            .ok_or_else(|| CoreError::not_found("Invoice line", request.source_line_id.clone()))?;

        validate_quantity(request.quantity_hundredths)?;
        let quantity = Quantity::from_hundredths(request.quantity_hundredths);
        if quantity > source.quantity() {
            return Err(CoreError::CreditQuantityExceeded {
                line_number: source.line_number,
                requested: quantity,
                invoiced: source.quantity(),
            });
        }

        lines.push(reverse_line(index as u32 + 1, source, quantity));
    }

    assemble(
        invoice,
        already_credited,
        CreditNoteKind::Partial,
        reason,
        date,
        lines,
        Money::zero(),
    )
}

// =============================================================================
// Unit Tests
// =============================================================================
