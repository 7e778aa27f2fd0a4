//! # Status Deriver
//!
//! An invoice's payment status is never stored; it is derived from its
//! allocation and credit-note history whenever it is read.
//!
//! ```text
//! credit note exists         → credited
//! paid ≥ total               → paid
//! due date past, remaining   → overdue
//! paid > 0                   → partial
//! otherwise                  → unpaid
//! ```

use chrono::NaiveDate;

use crate::money::Money;
use crate::types::InvoiceStatus;

/// What is left to collect: total − paid − |credited|, never below zero.
///
/// ## Example
/// ```rust
/// use officina_core::money::Money;
/// use officina_core::status::remaining;
///
/// let r = remaining(Money::from_cents(12_200), Money::from_cents(5_000), Money::from_cents(-2_200));
/// assert_eq!(r, Money::from_cents(5_000));
/// ```
pub fn remaining(total: Money, paid: Money, credited: Money) -> Money {
    let left = total - paid - credited.abs();
    if left.is_negative() {
        Money::zero()
    } else {
        left
    }
}

/// Derives the status of an invoice as of `today`.
pub fn derive_status(
    total: Money,
    due_date: NaiveDate,
    paid: Money,
    has_credit_notes: bool,
    today: NaiveDate,
) -> InvoiceStatus {
    if has_credit_notes {
        return InvoiceStatus::Credited;
    }

    if paid >= total {
        return InvoiceStatus::Paid;
    }

    if due_date < today && (total - paid).is_positive() {
        return InvoiceStatus::Overdue;
    }

    if paid.is_positive() {
        return InvoiceStatus::Partial;
    }

    InvoiceStatus::Unpaid
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, m, d).unwrap()
    }

    #[test]
    fn test_precedence() {
        let total = Money::from_cents(10_000);
        let due = day(3, 31);

        assert_eq!(derive_status(total, due, Money::zero(), false, day(3, 1)), InvoiceStatus::Unpaid);
        assert_eq!(derive_status(total, due, Money::from_cents(4000), false, day(3, 1)), InvoiceStatus::Partial);
        // A partially paid invoice past its due date is overdue, not partial.
        assert_eq!(derive_status(total, due, Money::from_cents(4000), false, day(4, 1)), InvoiceStatus::Overdue);
        assert_eq!(derive_status(total, due, total, false, day(4, 1)), InvoiceStatus::Paid);
        assert_eq!(derive_status(total, due, total, true, day(4, 1)), InvoiceStatus::Credited);
    }

    #[test]
    fn test_due_date_itself_is_not_overdue() {
        let total = Money::from_cents(10_000);
        assert_eq!(derive_status(total, day(3, 31), Money::zero(), false, day(3, 31)), InvoiceStatus::Unpaid);
    }

    #[test]
    fn test_remaining_never_negative() {
        assert_eq!(remaining(Money::from_cents(100), Money::from_cents(150), Money::zero()), Money::zero());
        assert_eq!(remaining(Money::from_cents(100), Money::zero(), Money::from_cents(-100)), Money::zero());
    }
}
