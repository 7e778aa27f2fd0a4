//! # Deposit Service
//!
//! Pre-payments taken before a job is invoiced. Applying one creates a
//! payment with a single allocation covering the whole deposit:
//!
//! ```text
//! Deposit (pending, 50.00)
//!     │ apply_deposit(invoice)
//!     ▼
//! Payment 50.00 ──► PaymentAllocation 50.00 ──► Invoice
//! Deposit (applied, payment_id, invoice_id)
//! ```

use chrono::{NaiveDate, Utc};
use officina_core::deposit::{check_apply, check_refund};
use officina_core::validation::validate_amount;
use officina_core::{CoreError, Deposit, DepositStatus, Money, Payment, PaymentAllocation, PaymentMethod};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::ledger::LockKey;
use crate::pool::Database;
use crate::repository::{ClientRepository, DepositRepository, InvoiceRepository, PaymentRepository, WorkOrderRepository};

/// A deposit to take.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositRequest {
    pub client_id: String,
    pub work_order_id: Option<String>,
    pub amount: Money,
    pub method: PaymentMethod,
    pub deposit_date: NaiveDate,
    pub reference: Option<String>,
    pub notes: Option<String>,
}

/// A deposit moved to applied, with the payment created for it.
#[derive(Debug, Clone)]
pub struct AppliedDeposit {
    pub deposit: Deposit,
    pub payment: Payment,
}

/// Deposit lifecycle.
#[derive(Debug, Clone)]
pub struct DepositService {
    db: Database,
}

impl DepositService {
    pub fn new(db: Database) -> Self {
        DepositService { db }
    }

    /// Takes a deposit in state pending.
    pub async fn create_deposit(&self, request: DepositRequest) -> DbResult<Deposit> {
        validate_amount("amount", request.amount.cents())?;

        let mut tx = self.db.begin_ledger(vec![LockKey::client(request.client_id.clone())]).await?;

        ClientRepository::require(tx.conn(), &request.client_id).await?;
        if let Some(work_order_id) = &request.work_order_id {
            WorkOrderRepository::client_of(tx.conn(), work_order_id)
                .await?
                .ok_or_else(|| CoreError::not_found("Work order", work_order_id.clone()))?;
        }

        let deposit = Deposit {
            id: Uuid::new_v4().to_string(),
            client_id: request.client_id,
            work_order_id: request.work_order_id,
            amount_cents: request.amount.cents(),
            method: request.method,
            deposit_date: request.deposit_date,
            reference: request.reference,
            notes: request.notes,
            status: DepositStatus::Pending,
            invoice_id: None,
            payment_id: None,
            created_at: Utc::now(),
        };
        DepositRepository::insert(tx.conn(), &deposit).await?;
        tx.commit().await?;

        info!(id = %deposit.id, client_id = %deposit.client_id, amount = %deposit.amount(), "Deposit taken");
        Ok(deposit)
    }

    /// Settles part of an invoice with a pending deposit.
    ///
    /// ## Errors
    /// - NotFound: deposit or invoice, or a deposit of another party or work order
    /// - BusinessValidation: deposit not pending, or larger than what the invoice still owes
    pub async fn apply_deposit(&self, deposit_id: &str, invoice_id: &str, applied_on: NaiveDate) -> DbResult<AppliedDeposit> {
        let (depositor, bill_to) = {
            let mut conn = self.db.pool().acquire().await?;
            let deposit = DepositRepository::find(&mut conn, deposit_id)
                .await?
                .ok_or_else(|| CoreError::not_found("Deposit", deposit_id))?;
            let invoice = InvoiceRepository::find(&mut conn, invoice_id)
                .await?
                .ok_or_else(|| CoreError::not_found("Invoice", invoice_id))?;
            (deposit.client_id, invoice.bill_to_client_id)
        };

        let mut tx = self
            .db
            .begin_ledger(vec![LockKey::client(depositor), LockKey::client(bill_to)])
            .await?;

        let deposit = DepositRepository::find(tx.conn(), deposit_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Deposit", deposit_id))?;
        let invoice = InvoiceRepository::find(tx.conn(), invoice_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Invoice", invoice_id))?;
        let remaining = InvoiceRepository::remaining_of(tx.conn(), &invoice).await?;

        check_apply(&deposit, &invoice, remaining)?;

        let payment_id = Uuid::new_v4().to_string();
        let created_at = Utc::now();
        let payment = Payment {
            allocations: vec![PaymentAllocation {
                id: Uuid::new_v4().to_string(),
                payment_id: payment_id.clone(),
                invoice_id: invoice.id.clone(),
                amount_cents: deposit.amount_cents,
                created_at,
            }],
            id: payment_id,
            client_id: deposit.client_id.clone(),
            amount_cents: deposit.amount_cents,
            payment_date: applied_on,
            method: deposit.method,
            reference: deposit.reference.clone(),
            notes: Some(format!("Acconto del {}", deposit.deposit_date.format("%d/%m/%Y"))),
            created_at,
        };

        PaymentRepository::insert(tx.conn(), &payment).await?;
        DepositRepository::mark_applied(tx.conn(), deposit_id, &invoice.id, &payment.id).await?;
        let deposit = DepositRepository::find(tx.conn(), deposit_id)
            .await?
            .ok_or_else(|| DbError::Internal(format!("deposit {} vanished while applying", deposit_id)))?;

        tx.commit().await?;

        info!(
            id = %deposit_id,
            invoice = %invoice.invoice_number,
            amount = %deposit.amount(),
            payment_id = %payment.id,
            "Deposit applied"
        );
        Ok(AppliedDeposit { deposit, payment })
    }

    /// Gives a pending deposit back.
    pub async fn refund_deposit(&self, deposit_id: &str) -> DbResult<Deposit> {
        let depositor = {
            let mut conn = self.db.pool().acquire().await?;
            DepositRepository::find(&mut conn, deposit_id)
                .await?
                .ok_or_else(|| CoreError::not_found("Deposit", deposit_id))?
                .client_id
        };

        let mut tx = self.db.begin_ledger(vec![LockKey::client(depositor)]).await?;

        let deposit = DepositRepository::find(tx.conn(), deposit_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Deposit", deposit_id))?;
        check_refund(&deposit)?;
        DepositRepository::mark_refunded(tx.conn(), deposit_id).await?;
        tx.commit().await?;

        info!(id = %deposit_id, amount = %deposit.amount(), "Deposit refunded");
        Ok(Deposit {
            status: DepositStatus::Refunded,
            ..deposit
        })
    }

    /// Pending deposits on a work order.
    pub async fn pending_for_work_order(&self, work_order_id: &str) -> DbResult<Vec<Deposit>> {
        self.db.deposit_records().pending_for_work_order(work_order_id).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::fixtures::{database, day, profile, with_client, with_work_order, work_order};
    use officina_core::invoice::InvoiceRequest;
    use officina_core::{ErrorKind, FiscalConfig, Invoice, InvoiceStatus};

    fn request(client_id: &str, work_order_id: Option<&str>, cents: i64) -> DepositRequest {
        DepositRequest {
            client_id: client_id.to_string(),
            work_order_id: work_order_id.map(str::to_string),
            amount: Money::from_cents(cents),
            method: PaymentMethod::Cash,
            deposit_date: day(3, 1),
            reference: None,
            notes: None,
        }
    }

    async fn invoice_for(db: &Database, work_order_id: &str) -> (Invoice, Vec<Deposit>) {
        let built = db
            .invoicing(&FiscalConfig::default())
            .build_from_work_order(work_order_id, InvoiceRequest::on(day(3, 10)))
            .await
            .unwrap();
        (built.invoice, built.pending_deposits)
    }

    #[tokio::test]
    async fn test_apply_creates_payment_and_single_allocation() {
        let db = database().await;
        with_client(&db, profile("c1")).await;
        with_work_order(&db, work_order("wo-1", "c1", 10_000)).await;

        let deposit = db.deposits().create_deposit(request("c1", Some("wo-1"), 5_000)).await.unwrap();
        assert_eq!(deposit.status, DepositStatus::Pending);

        let (invoice, pending) = invoice_for(&db, "wo-1").await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, deposit.id);

        let applied = db.deposits().apply_deposit(&deposit.id, &invoice.id, day(3, 10)).await.unwrap();
        assert_eq!(applied.deposit.status, DepositStatus::Applied);
        assert_eq!(applied.deposit.payment_id.as_deref(), Some(applied.payment.id.as_str()));
        assert_eq!(applied.payment.allocations.len(), 1);
        assert_eq!(applied.payment.allocations[0].amount_cents, 5_000);

        let view = db
            .invoicing(&FiscalConfig::default())
            .invoice_view(&invoice.id, day(3, 11))
            .await
            .unwrap();
        assert_eq!(view.status, InvoiceStatus::Partial);
        assert_eq!(view.remaining_cents, 7_200);

        // Applied deposits can be neither applied again nor refunded.
        let err = db.deposits().refund_deposit(&deposit.id).await.unwrap_err();
        assert!(matches!(err, DbError::Ledger(CoreError::InvalidDepositStatus { .. })));
        assert!(db.deposits().pending_for_work_order("wo-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deposit_larger_than_remaining_is_rejected() {
        let db = database().await;
        with_client(&db, profile("c1")).await;
        with_work_order(&db, work_order("wo-1", "c1", 10_000)).await;

        let deposit = db.deposits().create_deposit(request("c1", Some("wo-1"), 20_000)).await.unwrap();
        let (invoice, _) = invoice_for(&db, "wo-1").await;

        let err = db
            .deposits()
            .apply_deposit(&deposit.id, &invoice.id, day(3, 10))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Ledger(CoreError::OverAllocation { .. })));
    }

    #[tokio::test]
    async fn test_deposit_of_another_client_is_not_found() {
        let db = database().await;
        with_client(&db, profile("c1")).await;
        with_client(&db, profile("c2")).await;
        with_work_order(&db, work_order("wo-1", "c1", 10_000)).await;

        let stranger = db.deposits().create_deposit(request("c2", None, 1_000)).await.unwrap();
        let (invoice, _) = invoice_for(&db, "wo-1").await;

        let err = db
            .deposits()
            .apply_deposit(&stranger.id, &invoice.id, day(3, 10))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn test_refund_and_payment_deletion_release() {
        let db = database().await;
        with_client(&db, profile("c1")).await;
        with_work_order(&db, work_order("wo-1", "c1", 10_000)).await;

        let refunded = db.deposits().create_deposit(request("c1", None, 1_000)).await.unwrap();
        let refunded = db.deposits().refund_deposit(&refunded.id).await.unwrap();
        assert_eq!(refunded.status, DepositStatus::Refunded);

        let deposit = db.deposits().create_deposit(request("c1", Some("wo-1"), 3_000)).await.unwrap();
        let (invoice, _) = invoice_for(&db, "wo-1").await;
        let applied = db.deposits().apply_deposit(&deposit.id, &invoice.id, day(3, 10)).await.unwrap();

        db.payments().delete_payment(&applied.payment.id).await.unwrap();

        let back = db.deposit_records().get_by_id(&deposit.id).await.unwrap().unwrap();
        assert_eq!(back.status, DepositStatus::Pending);
        assert!(back.payment_id.is_none());
        assert!(back.invoice_id.is_none());
    }
}
