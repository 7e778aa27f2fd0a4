//! # Deposits
//!
//! Lifecycle rules for pre-payments: `pending → applied | refunded`.
//! Applying a deposit turns it into a payment with one allocation covering the
//! whole deposit, so it may never exceed what the invoice still owes.

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{Deposit, DepositStatus, Invoice};

fn ensure_pending(deposit: &Deposit) -> CoreResult<()> {
    if deposit.status != DepositStatus::Pending {
        return Err(CoreError::InvalidDepositStatus {
            deposit_id: deposit.id.clone(),
            status: deposit.status,
        });
    }
    Ok(())
}

/// Checks that `deposit` may settle part of `invoice`, which still owes `remaining`.
pub fn check_apply(deposit: &Deposit, invoice: &Invoice, remaining: Money) -> CoreResult<()> {
    ensure_pending(deposit)?;

    let same_party = deposit.client_id == invoice.bill_to_client_id || deposit.client_id == invoice.client_id;
    let same_work_order = deposit
        .work_order_id
        .as_deref()
        .map_or(true, |wo| wo == invoice.work_order_id);
    if !same_party || !same_work_order {
        return Err(CoreError::not_found("Deposit for invoice", invoice.invoice_number.clone()));
    }

    if deposit.amount() > remaining {
        return Err(CoreError::OverAllocation {
            invoice_number: invoice.invoice_number.clone(),
            requested: deposit.amount(),
            remaining,
        });
    }

    Ok(())
}

/// Checks that `deposit` may be refunded.
pub fn check_refund(deposit: &Deposit) -> CoreResult<()> {
    ensure_pending(deposit)
}
