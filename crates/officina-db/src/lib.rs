//! # officina-db: Ledger Persistence for Officina
//!
//! This crate stores the invoice & payment ledger in SQLite and runs every
//! ledger mutation as one locked transaction.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Officina Ledger Flow                             │
//! │                                                                         │
//! │  Back office (build invoice, record payment, issue credit note)         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   officina-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Services    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │ (service/)    │    │ (repository/) │    │  (embedded)  │  │   │
//! │  │   │               │    │               │    │              │  │   │
//! │  │   │ InvoiceSvc    │───►│ InvoiceRepo   │    │ 001_ledger_  │  │   │
//! │  │   │ PaymentSvc    │    │ PaymentRepo   │    │   schema.sql │  │   │
//! │  │   │ CreditNoteSvc │    │ ...           │    │              │  │   │
//! │  │   └──────┬────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │          │ LedgerTransaction (ledger.rs): named locks + tx     │   │
//! │  │          ▼                                                      │   │
//! │  │   officina-core: pricing, tax, allocation, reversal, status     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`ledger`] - Named locks and ledger transactions
//! - [`repository`] - SQL per aggregate
//! - [`service`] - Ledger operations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use officina_core::invoice::InvoiceRequest;
//! use officina_core::FiscalConfig;
//! use officina_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("ledger.db")).await?;
//! let config = FiscalConfig::from_env()?;
//!
//! let built = db
//!     .invoicing(&config)
//!     .build_from_work_order("wo-42", InvoiceRequest::on(today))
//!     .await?;
//! println!("{} {}", built.invoice.invoice_number, built.invoice.total());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod ledger;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod service;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use ledger::{LedgerTransaction, LockKey};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::declaration::NewDeclaration;
pub use repository::{
    ClientRepository, CreditNoteRepository, DeclarationRepository, DepositRepository, InvoiceRepository,
    PaymentRepository, WorkOrderRepository,
};

// Service re-exports
pub use service::{
    AppliedDeposit, BuiltInvoice, CreditNoteService, DepositRequest, DepositService, InvoiceService, InvoiceUpdate,
    PaymentRequest, PaymentService, ReportService,
};
