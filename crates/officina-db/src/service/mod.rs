//! # Ledger Services
//!
//! Every ledger mutation runs here as one [`LedgerTransaction`]: the named
//! locks are taken first, then all reads, checks and writes happen on the
//! transaction's connection, and nothing is visible until commit.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  service call                                                           │
//! │     │                                                                   │
//! │     ├─ pre-read (pool)       who is the billing party? which period?    │
//! │     │                         connection dropped before locking         │
//! │     ▼                                                                   │
//! │  begin_ledger([Sequence(family, period), ClientLedger(party)])          │
//! │     │                                                                   │
//! │     ├─ re-read inside the transaction, pure officina-core checks        │
//! │     ├─ next_number / inserts / guarded updates                          │
//! │     ▼                                                                   │
//! │  commit ── locks released                                               │
//! │                                                                         │
//! │  Any `?` before commit drops the transaction: rollback + unlock.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Conflicts are reported, never retried here.
//!
//! [`LedgerTransaction`]: crate::ledger::LedgerTransaction

pub mod credit_notes;
pub mod deposits;
pub mod invoicing;
pub mod payments;
pub mod reports;

pub use credit_notes::CreditNoteService;
pub use deposits::{AppliedDeposit, DepositRequest, DepositService};
pub use invoicing::{BuiltInvoice, InvoiceService, InvoiceUpdate};
pub use payments::{PaymentRequest, PaymentService};
pub use reports::ReportService;

#[cfg(test)]
pub(crate) mod fixtures {
    //! A small ledger shared by the service tests.

    use chrono::NaiveDate;
    use std::path::PathBuf;
    use uuid::Uuid;
    use officina_core::{
        BillingProfile, CreditLimitPolicy, PartUsage, VatRegime, WorkOrderSnapshot, WorkOrderStatus,
    };

    use crate::pool::{Database, DbConfig};
    use crate::repository::work_order::labor_item;

    pub fn day(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, month, day).unwrap()
    }

    pub fn profile(id: &str) -> BillingProfile {
        BillingProfile {
            id: id.to_string(),
            display_name: format!("Cliente {id}"),
            tax_id: Some("IT01234567890".to_string()),
            address: Some("Via Roma 1, Torino".to_string()),
            billing_address: None,
            default_vat_rate_bps: None,
            default_discount_bps: 0,
            payment_terms_days: Some(30),
            vat_regime: VatRegime::Ordinary,
            vat_exempt: false,
            vat_exemption_code: None,
            split_payment: false,
            credit_limit_cents: None,
            credit_limit_policy: CreditLimitPolicy::Warn,
            preferred_payment_method: None,
        }
    }

    /// A completed work order worth `labor_cents` of labor.
    pub fn work_order(id: &str, client_id: &str, labor_cents: i64) -> WorkOrderSnapshot {
        WorkOrderSnapshot {
            id: id.to_string(),
            client_id: client_id.to_string(),
            status: WorkOrderStatus::Completed,
            claim_number: None,
            items: vec![labor_item("Manodopera", 100, labor_cents)],
            parts: Vec::<PartUsage>::new(),
        }
    }

    pub async fn database() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    /// A database file with a pool wide enough for ledger transactions to
    /// run side by side, so only the named locks keep them apart.
    pub async fn file_database() -> (Database, PathBuf) {
        let path = std::env::temp_dir().join(format!("officina-{}.db", Uuid::new_v4()));
        let db = Database::new(DbConfig::new(path.clone()).max_connections(8))
            .await
            .unwrap();
        (db, path)
    }

    pub async fn discard(db: Database, path: PathBuf) {
        db.close().await;
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
        }
    }

    pub async fn with_client(db: &Database, profile: BillingProfile) {
        db.clients().insert(&profile).await.unwrap();
    }

    pub async fn with_work_order(db: &Database, snapshot: WorkOrderSnapshot) {
        db.work_orders().insert(&snapshot).await.unwrap();
    }
}
