//! # Repository Module
//!
//! SQL for each aggregate, isolated from the ledger rules.
//!
//! ## Two Entry Points Per Query
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Outside a ledger operation                                            │
//! │       db.invoices().get_by_id(id)          (&self, uses the pool)      │
//! │            │                                                            │
//! │            ▼                                                            │
//! │  Inside a ledger operation                                             │
//! │       InvoiceRepository::find(tx.conn(), id)  (one connection)         │
//! │                                                                         │
//! │  Pool methods acquire a connection and delegate to the connection      │
//! │  functions, so both paths run the same SQL. Services only ever use     │
//! │  the connection functions while a transaction is open.                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ClientRepository`] - Billing profiles (collaborator data)
//! - [`WorkOrderRepository`] - Work order snapshots (collaborator data)
//! - [`DeclarationRepository`] - Declarations of intent and plafond usage
//! - [`InvoiceRepository`] - Invoices, lines, balances and exposure
//! - [`PaymentRepository`] - Payments and allocations
//! - [`CreditNoteRepository`] - Credit notes and lines
//! - [`DepositRepository`] - Deposits

pub mod client;
pub mod credit_note;
pub mod declaration;
pub mod deposit;
pub mod invoice;
pub mod payment;
pub mod work_order;

pub use client::ClientRepository;
pub use credit_note::CreditNoteRepository;
pub use declaration::DeclarationRepository;
pub use deposit::DepositRepository;
pub use invoice::InvoiceRepository;
pub use payment::PaymentRepository;
pub use work_order::WorkOrderRepository;

use crate::error::{DbError, DbResult};

/// Turns a guarded UPDATE that matched nothing into a conflict.
pub(crate) fn expect_one_row(rows_affected: u64, what: impl FnOnce() -> String) -> DbResult<()> {
    if rows_affected == 0 {
        return Err(DbError::Conflict(what()));
    }
    Ok(())
}
