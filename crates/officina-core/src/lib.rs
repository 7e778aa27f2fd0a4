//! # officina-core: Pure Ledger Logic for Officina
//!
//! Every monetary decision of the invoice and payment ledger lives here as
//! plain functions over plain data. Nothing in this crate touches a database,
//! a clock or the network; officina-db feeds it rows and persists its results.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Officina Ledger                                  │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │      Back office (work orders, clients, rendering, HTTP)        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              officina-db (services, repositories)               │   │
//! │  │       one SQLite transaction per ledger operation               │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ officina-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   money ─ tax ─ invoice ─ credit_limit ─ allocation             │   │
//! │  │   numbering ─ credit_note ─ deposit ─ status                    │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK                               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Integer cents and hundredths with half-up rounding
//! - [`types`] - Ledger records and enums
//! - [`error`] - `CoreError`, `ValidationError`, `ErrorKind`
//! - [`config`] - Fiscal constants
//! - [`numbering`] - Document number format and succession
//! - [`tax`] - VAT treatment and stamp duty
//! - [`invoice`] - Pricing a work order into an invoice
//! - [`credit_limit`] - Exposure and the credit guard
//! - [`allocation`] - Spreading payments over invoices
//! - [`credit_note`] - Full and partial reversals
//! - [`deposit`] - Deposit lifecycle rules
//! - [`status`] - Derived payment status
//!
//! ## Example Usage
//!
//! ```rust
//! use officina_core::money::Money;
//! use officina_core::types::TaxRate;
//!
//! let labor = Money::from_cents(4550);
//! let vat = labor.calculate_tax(TaxRate::STANDARD);
//!
//! // 22% of €45.50 = €10.01
//! assert_eq!(vat.cents(), 1001);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod allocation;
pub mod config;
pub mod credit_limit;
pub mod credit_note;
pub mod deposit;
pub mod error;
pub mod invoice;
pub mod money;
pub mod numbering;
pub mod status;
pub mod tax;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use config::FiscalConfig;
pub use error::{CoreError, CoreResult, ErrorKind, ValidationError};
pub use money::{Money, Quantity};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Documents per `(family, period)`: four zero-padded digits.
pub const DOCUMENT_NUMBER_CAPACITY: u32 = 9999;

/// Largest quantity on one line, in hundredths (999,999.99).
pub const MAX_LINE_QUANTITY: i64 = 99_999_999;

/// Longest accepted credit-note reason.
pub const MAX_REASON_LENGTH: usize = 500;
