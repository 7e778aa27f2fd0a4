//! # Allocation Planning
//!
//! Splits a payment across open invoices. Planning is pure: officina-db loads
//! the open invoices inside the payment transaction, asks for a plan, then
//! writes the allocation rows.
//!
//! ## Strategies
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Fifo          invoice_date asc                → greedy                │
//! │  OverdueFirst  (overdue desc, invoice_date asc) → greedy               │
//! │  Manual        caller's (invoice, amount) list → validated as a batch  │
//! │                                                                         │
//! │  greedy: take min(payment left, invoice remaining) per invoice until   │
//! │          the payment or the invoices run out; leftover is unallocated  │
//! │          credit, not an error                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Manual Batches
//! Each entry is checked against the invoice's *effective* remaining amount,
//! which shrinks as earlier entries of the same batch are accepted. Against a
//! remaining of €100, `[80, 80]` fails on the second entry while `[60, 40]`
//! succeeds. Entries for the same invoice are merged into one allocation.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::validation::validate_amount;

// =============================================================================
// Inputs
// =============================================================================

/// An invoice as seen by the allocator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenInvoice {
    pub invoice_id: String,
    pub invoice_number: String,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    /// total − paid − |credited|, as of the start of the transaction.
    pub remaining: Money,
}

impl OpenInvoice {
    pub fn is_overdue(&self, as_of: NaiveDate) -> bool {
        self.due_date < as_of && self.remaining.is_positive()
    }
}

/// One caller-chosen allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ManualAllocation {
    pub invoice_id: String,
    pub amount_cents: i64,
}

impl ManualAllocation {
    pub fn new(invoice_id: impl Into<String>, amount: Money) -> Self {
        ManualAllocation {
            invoice_id: invoice_id.into(),
            amount_cents: amount.cents(),
        }
    }
}

/// How a payment is spread over invoices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "strategy", content = "allocations", rename_all = "snake_case")]
pub enum AllocationStrategy {
    Fifo,
    OverdueFirst,
    Manual(Vec<ManualAllocation>),
}

// =============================================================================
// Plan
// =============================================================================

/// An allocation the ledger will write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedAllocation {
    pub invoice_id: String,
    pub invoice_number: String,
    pub amount: Money,
}

/// The outcome of planning a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPlan {
    pub allocations: Vec<PlannedAllocation>,
    pub allocated: Money,
    /// Credit left on the payment.
    pub unallocated: Money,
}

/// Plans the allocation of `payment_amount`.
///
/// `open` must hold the payer's invoices; for the manual strategy it must hold
/// every invoice the entries reference.
///
/// ## Errors
/// - [`CoreError::NoOpenInvoices`] when an automatic strategy has nothing to settle
/// - [`CoreError::ManualAllocationsRequired`] for an empty manual list
/// - [`CoreError::NotFound`] for a manual entry naming an unknown invoice
/// - [`CoreError::OverAllocation`] when an entry exceeds the effective remaining
/// - [`CoreError::PaymentOverAllocated`] when entries exceed the payment
///
/// ## Example
/// ```rust
/// use chrono::NaiveDate;
/// use officina_core::allocation::{plan, AllocationStrategy, OpenInvoice};
/// use officina_core::money::Money;
///
/// let day = |d| NaiveDate::from_ymd_opt(2026, 3, d).unwrap();
/// let open: Vec<OpenInvoice> = [(1, 3000), (2, 5000), (3, 4000)]
///     .into_iter()
///     .map(|(d, cents)| OpenInvoice {
///         invoice_id: format!("inv-{d}"),
///         invoice_number: format!("2026/000{d}"),
///         invoice_date: day(d),
///         due_date: day(d + 20),
///         remaining: Money::from_cents(cents),
///     })
///     .collect();
///
/// let plan = plan("client-1", Money::from_cents(15_000), &AllocationStrategy::Fifo, &open, day(10)).unwrap();
/// assert_eq!(plan.allocations.len(), 3);
/// assert_eq!(plan.unallocated, Money::from_cents(3000));
/// ```
pub fn plan(
    client_id: &str,
    payment_amount: Money,
    strategy: &AllocationStrategy,
    open: &[OpenInvoice],
    as_of: NaiveDate,
) -> CoreResult<AllocationPlan> {
    validate_amount("payment amount", payment_amount.cents())?;

    let allocations = match strategy {
        AllocationStrategy::Fifo => {
            let mut ordered = open_only(client_id, open)?;
            ordered.sort_by(|a, b| {
                a.invoice_date
                    .cmp(&b.invoice_date)
                    .then_with(|| a.invoice_number.cmp(&b.invoice_number))
            });
            greedy(payment_amount, &ordered)
        }
        AllocationStrategy::OverdueFirst => {
            let mut ordered = open_only(client_id, open)?;
            ordered.sort_by(|a, b| {
                b.is_overdue(as_of)
                    .cmp(&a.is_overdue(as_of))
                    .then_with(|| a.invoice_date.cmp(&b.invoice_date))
                    .then_with(|| a.invoice_number.cmp(&b.invoice_number))
            });
            greedy(payment_amount, &ordered)
        }
        AllocationStrategy::Manual(entries) => manual(payment_amount, entries, open)?,
    };

    let allocated: Money = allocations.iter().map(|a| a.amount).sum();
    Ok(AllocationPlan {
        allocations,
        allocated,
        unallocated: payment_amount - allocated,
    })
}

fn open_only<'a>(client_id: &str, open: &'a [OpenInvoice]) -> CoreResult<Vec<&'a OpenInvoice>> {
    let candidates: Vec<&OpenInvoice> = open.iter().filter(|i| i.remaining.is_positive()).collect();
    if candidates.is_empty() {
        return Err(CoreError::NoOpenInvoices {
            client_id: client_id.to_string(),
        });
    }
    Ok(candidates)
}

fn greedy(payment_amount: Money, ordered: &[&OpenInvoice]) -> Vec<PlannedAllocation> {
    let mut left = payment_amount;
    let mut allocations = Vec::new();

    for invoice in ordered {
        if !left.is_positive() {
            break;
        }
        let amount = left.min(invoice.remaining);
        allocations.push(PlannedAllocation {
            invoice_id: invoice.invoice_id.clone(),
            invoice_number: invoice.invoice_number.clone(),
            amount,
        });
        left -= amount;
    }

    allocations
}

fn manual(
    payment_amount: Money,
    entries: &[ManualAllocation],
    open: &[OpenInvoice],
) -> CoreResult<Vec<PlannedAllocation>> {
    if entries.is_empty() {
        return Err(CoreError::ManualAllocationsRequired);
    }

    let by_id: HashMap<&str, &OpenInvoice> = open.iter().map(|i| (i.invoice_id.as_str(), i)).collect();
    let mut effective: HashMap<&str, Money> = HashMap::new();
    let mut allocations: Vec<PlannedAllocation> = Vec::new();
    let mut running_total = Money::zero();

    for entry in entries {
        validate_amount("allocation amount", entry.amount_cents)?;
        let amount = Money::from_cents(entry.amount_cents);

        let invoice = by_id
            .get(entry.invoice_id.as_str())
            .ok_or_else(|| CoreError::not_found("Invoice", entry.invoice_id.clone()))?;

        let remaining = effective
            .entry(invoice.invoice_id.as_str())
            .or_insert(invoice.remaining);
        if amount > *remaining {
            return Err(CoreError::OverAllocation {
                invoice_number: invoice.invoice_number.clone(),
                requested: amount,
                remaining: *remaining,
            });
        }
        *remaining -= amount;

        running_total += amount;
        if running_total > payment_amount {
            return Err(CoreError::PaymentOverAllocated {
                allocated: running_total,
                payment_amount,
            });
        }

        match allocations.iter_mut().find(|a| a.invoice_id == invoice.invoice_id) {
            Some(existing) => existing.amount += amount,
            None => allocations.push(PlannedAllocation {
                invoice_id: invoice.invoice_id.clone(),
                invoice_number: invoice.invoice_number.clone(),
                amount,
            }),
        }
    }

    Ok(allocations)
}

// =============================================================================
// Unit Tests
// =============================================================================
