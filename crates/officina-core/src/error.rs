//! # Error Types
//!
//! Domain error types for officina-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  officina-core errors (this file)                                      │
//! │  ├── CoreError        - Ledger rule violations                         │
//! │  ├── ValidationError  - Input shape failures                           │
//! │  └── ErrorKind        - The tag callers branch on                      │
//! │                                                                         │
//! │  officina-db errors (separate crate)                                   │
//! │  └── DbError          - Storage failures + wrapped CoreError           │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → caller                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Error Kinds
//! Every ledger failure carries one of three kinds:
//!
//! | Kind                 | Meaning                                 | Caller action      |
//! |----------------------|-----------------------------------------|--------------------|
//! | `NotFound`           | A referenced record is absent           | Fix the reference  |
//! | `BusinessValidation` | A state or rule violation               | Fix the request    |
//! | `Conflict`           | A concurrent write collided             | Retry the request  |
//!
//! The ledger never retries a conflict itself.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

use crate::money::{Money, Quantity};
use crate::types::{DepositStatus, DocumentFamily, WorkOrderStatus};

// =============================================================================
// Error Kind
// =============================================================================

/// Classification of a ledger failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    BusinessValidation,
    Conflict,
}

impl ErrorKind {
    /// Only conflicts are worth retrying, and only by the caller.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Conflict)
    }
}

// =============================================================================
// Core Error
// =============================================================================

/// Ledger rule violations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A referenced record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The work order is not in the completed state.
    ///
    /// ## When This Occurs
    /// - Invoicing a work order that is still in progress or waiting for parts
    /// - Invoicing a cancelled work order
    #[error("Work order {work_order_id} is {status}, only completed work orders can be invoiced")]
    WorkOrderNotCompleted {
        work_order_id: String,
        status: WorkOrderStatus,
    },

    /// The work order already carries an invoice.
    #[error("Work order {work_order_id} is already invoiced")]
    AlreadyInvoiced { work_order_id: String },

    /// No line of the work order produces a positive amount.
    #[error("Work order {work_order_id} has no billable amount")]
    NothingToInvoice { work_order_id: String },

    /// The VAT-plafond declaration cannot cover the invoice.
    ///
    /// ## User Workflow
    /// ```text
    /// Declaration 2026/12: limit €10,000.00, used €9,500.00
    ///      │
    ///      ▼
    /// Invoice pretax €800.00
    ///      │
    ///      ▼
    /// PlafondExceeded { remaining: €500.00, requested: €800.00 }
    /// ```
    #[error("Declaration of intent {protocol_number} has {remaining} remaining, invoice needs {requested}")]
    PlafondExceeded {
        protocol_number: String,
        remaining: Money,
        requested: Money,
    },

    /// The billing party would exceed a credit limit under the block policy.
    #[error("Credit limit {limit} exceeded for client {client_id}: exposure {exposure} + invoice {amount}")]
    CreditLimitExceeded {
        client_id: String,
        limit: Money,
        exposure: Money,
        amount: Money,
    },

    /// An allocation would exceed the invoice's remaining amount.
    #[error("Allocation of {requested} exceeds remaining {remaining} on invoice {invoice_number}")]
    OverAllocation {
        invoice_number: String,
        requested: Money,
        remaining: Money,
    },

    /// Allocations would exceed the payment amount.
    #[error("Allocations total {allocated} exceeds payment amount {payment_amount}")]
    PaymentOverAllocated {
        allocated: Money,
        payment_amount: Money,
    },

    /// An automatic strategy found nothing to settle.
    #[error("Client {client_id} has no open invoices")]
    NoOpenInvoices { client_id: String },

    /// The manual strategy was chosen without allocation entries.
    #[error("Manual allocation requires at least one entry")]
    ManualAllocationsRequired,

    /// Credit notes would reverse more than the invoice total.
    #[error("Invoice {invoice_number} total {total}: already credited {credited}, cannot credit {requested} more")]
    OverReversal {
        invoice_number: String,
        total: Money,
        credited: Money,
        requested: Money,
    },

    /// A partial reversal asked for more than was invoiced on a line.
    #[error("Line {line_number}: cannot credit {requested}, invoiced quantity is {invoiced}")]
    CreditQuantityExceeded {
        line_number: u32,
        requested: Quantity,
        invoiced: Quantity,
    },

    /// The period has used every document number.
    ///
    /// A hard ceiling, never retried.
    #[error("{family} numbering for {period} is exhausted ({capacity} documents)")]
    NumberingExhausted {
        family: DocumentFamily,
        period: i32,
        capacity: u32,
    },

    /// A deposit is not in a state that allows the operation.
    #[error("Deposit {deposit_id} is {status}, expected pending")]
    InvalidDepositStatus {
        deposit_id: String,
        status: DepositStatus,
    },

    /// An invoice with settlement history cannot be deleted.
    #[error("Invoice {invoice_number} cannot be deleted: {reason}")]
    InvoiceLocked {
        invoice_number: String,
        reason: String,
    },

    /// Input validation failure.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates a NotFound error.
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Classifies the error.
    ///
    /// Core errors are never conflicts: conflicts only arise from the store.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::NotFound { .. } => ErrorKind::NotFound,
            _ => ErrorKind::BusinessValidation,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID, malformed amount).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in the allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Duplicate value within one request.
    #[error("{field} '{value}' appears more than once")]
    Duplicate { field: String, value: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::OverAllocation {
            invoice_number: "2026/0007".to_string(),
            requested: Money::from_cents(8000),
            remaining: Money::from_cents(2000),
        };
        assert_eq!(
            err.to_string(),
            "Allocation of €80.00 exceeds remaining €20.00 on invoice 2026/0007"
        );
    }

    #[test]
    fn test_kinds() {
        assert_eq!(CoreError::not_found("Invoice", "x").kind(), ErrorKind::NotFound);
        assert_eq!(
            CoreError::NumberingExhausted {
                family: DocumentFamily::Invoice,
                period: 2026,
                capacity: 9999,
            }
            .kind(),
            ErrorKind::BusinessValidation
        );
        assert_eq!(
            CoreError::from(ValidationError::Required { field: "reason".into() }).kind(),
            ErrorKind::BusinessValidation
        );
        assert!(ErrorKind::Conflict.is_retryable());
        assert!(!ErrorKind::BusinessValidation.is_retryable());
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let core_err: CoreError = ValidationError::Required {
            field: "reason".to_string(),
        }
        .into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
