//! # Payment Service
//!
//! Records payments and spreads them over the payer's open invoices.
//!
//! Every operation here holds the payer's `ClientLedger` lock, so the
//! remaining amounts the allocation plan is computed from cannot move before
//! the allocations are written. The database adds one more guard:
//! `UNIQUE (payment_id, invoice_id)` on allocations.

use chrono::{NaiveDate, Utc};
use officina_core::allocation::{self, AllocationPlan, AllocationStrategy, ManualAllocation};
use officina_core::validation::validate_amount;
use officina_core::{CoreError, Money, Payment, PaymentAllocation, PaymentMethod, PaymentView};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DbResult;
use crate::ledger::LockKey;
use crate::pool::Database;
use crate::repository::{ClientRepository, DepositRepository, InvoiceRepository, PaymentRepository};

/// A payment to record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub client_id: String,
    pub amount: Money,
    pub payment_date: NaiveDate,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub strategy: AllocationStrategy,
}

/// Payment recording and allocation.
#[derive(Debug, Clone)]
pub struct PaymentService {
    db: Database,
}

fn allocation_rows(payment_id: &str, plan: &AllocationPlan) -> Vec<PaymentAllocation> {
    let created_at = Utc::now();
    plan.allocations
        .iter()
        .map(|planned| PaymentAllocation {
            id: Uuid::new_v4().to_string(),
            payment_id: payment_id.to_string(),
            invoice_id: planned.invoice_id.clone(),
            amount_cents: planned.amount.cents(),
            created_at,
        })
        .collect()
}

impl PaymentService {
    pub fn new(db: Database) -> Self {
        PaymentService { db }
    }

    /// Records a payment and its allocations in one transaction.
    ///
    /// ## Errors
    /// - NotFound: the client, or a manual entry naming an invoice not billed to it
    /// - BusinessValidation: non-positive amount, no open invoices for an
    ///   automatic strategy, over-allocation of an invoice or of the payment
    pub async fn record_payment(&self, request: PaymentRequest) -> DbResult<PaymentView> {
        validate_amount("amount", request.amount.cents())?;

        let mut tx = self.db.begin_ledger(vec![LockKey::client(request.client_id.clone())]).await?;

        ClientRepository::require(tx.conn(), &request.client_id).await?;
        let open = InvoiceRepository::open_for_client(tx.conn(), &request.client_id).await?;
        let plan = allocation::plan(
            &request.client_id,
            request.amount,
            &request.strategy,
            &open,
            request.payment_date,
        )?;

        let payment_id = Uuid::new_v4().to_string();
        let payment = Payment {
            allocations: allocation_rows(&payment_id, &plan),
            id: payment_id,
            client_id: request.client_id,
            amount_cents: request.amount.cents(),
            payment_date: request.payment_date,
            method: request.method,
            reference: request.reference,
            notes: request.notes,
            created_at: Utc::now(),
        };

        PaymentRepository::insert(tx.conn(), &payment).await?;
        tx.commit().await?;

        info!(
            id = %payment.id,
            client_id = %payment.client_id,
            amount = %payment.amount(),
            invoices = payment.allocations.len(),
            "Payment allocated"
        );
        if plan.unallocated.is_positive() {
            warn!(
                id = %payment.id,
                client_id = %payment.client_id,
                unallocated = %plan.unallocated,
                "Payment leaves unallocated credit"
            );
        }

        Ok(PaymentView::from(payment))
    }

    /// Replaces every allocation of a payment with `entries`.
    pub async fn reallocate_payment(&self, payment_id: &str, entries: Vec<ManualAllocation>) -> DbResult<PaymentView> {
        let client_id = self.payer_of(payment_id).await?;
        let mut tx = self.db.begin_ledger(vec![LockKey::client(client_id.clone())]).await?;

        let payment = PaymentRepository::find(tx.conn(), payment_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Payment", payment_id))?;

        let cleared = PaymentRepository::clear_allocations(tx.conn(), payment_id).await?;
        let open = InvoiceRepository::open_for_client(tx.conn(), &client_id).await?;
        let plan = allocation::plan(
            &client_id,
            payment.amount(),
            &AllocationStrategy::Manual(entries),
            &open,
            payment.payment_date,
        )?;
        PaymentRepository::insert_allocations(tx.conn(), &allocation_rows(payment_id, &plan)).await?;

        let payment = PaymentRepository::find(tx.conn(), payment_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Payment", payment_id))?;
        tx.commit().await?;

        info!(
            id = %payment_id,
            replaced = cleared,
            invoices = payment.allocations.len(),
            unallocated = %payment.unallocated(),
            "Payment reallocated"
        );
        Ok(PaymentView::from(payment))
    }

    /// Deletes a payment with its allocations.
    ///
    /// A payment created by applying a deposit sends the deposit back to pending.
    pub async fn delete_payment(&self, payment_id: &str) -> DbResult<()> {
        let client_id = self.payer_of(payment_id).await?;
        let mut tx = self.db.begin_ledger(vec![LockKey::client(client_id)]).await?;

        let payment = PaymentRepository::find(tx.conn(), payment_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Payment", payment_id))?;

        let released = DepositRepository::release_payment(tx.conn(), payment_id).await?;
        PaymentRepository::delete(tx.conn(), payment_id).await?;
        tx.commit().await?;

        info!(
            id = %payment_id,
            amount = %payment.amount(),
            allocations = payment.allocations.len(),
            deposits_released = released,
            "Payment deleted"
        );
        Ok(())
    }

    /// A payment with its allocations and unallocated remainder.
    pub async fn payment_view(&self, payment_id: &str) -> DbResult<PaymentView> {
        let payment = self
            .db
            .payment_records()
            .get_by_id(payment_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Payment", payment_id))?;
        Ok(PaymentView::from(payment))
    }

    async fn payer_of(&self, payment_id: &str) -> DbResult<String> {
        let mut conn = self.db.pool().acquire().await?;
        let payment = PaymentRepository::find(&mut conn, payment_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Payment", payment_id))?;
        debug!(id = %payment_id, client_id = %payment.client_id, "Resolved payer");
        Ok(payment.client_id)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::service::fixtures::{database, day, profile, with_client, with_work_order, work_order};
    use officina_core::invoice::InvoiceRequest;
    use officina_core::{ErrorKind, FiscalConfig, Invoice, InvoiceStatus, TaxRate};

    /// Invoices at 0% VAT so totals equal the labor amounts.
    async fn invoices(db: &Database, client_id: &str, amounts: &[(i64, u32)]) -> Vec<Invoice> {
        let mut config = FiscalConfig::default();
        config.stamp_duty_threshold = Money::from_cents(i64::MAX / 2);
        let service = db.invoicing(&config);

        let mut built = Vec::new();
        for (index, (cents, d)) in amounts.iter().enumerate() {
            let wo = format!("wo-{client_id}-{index}");
            with_work_order(db, work_order(&wo, client_id, *cents)).await;
            let mut request = InvoiceRequest::on(day(3, *d));
            request.vat_rate_override = Some(TaxRate::zero());
            built.push(service.build_from_work_order(&wo, request).await.unwrap().invoice);
        }
        built
    }

    fn request(client_id: &str, cents: i64, strategy: AllocationStrategy) -> PaymentRequest {
        PaymentRequest {
            client_id: client_id.to_string(),
            amount: Money::from_cents(cents),
            payment_date: day(3, 20),
            method: PaymentMethod::BankTransfer,
            reference: Some("CRO 0001".to_string()),
            notes: None,
            strategy,
        }
    }

    #[tokio::test]
    async fn test_fifo_leaves_leftover_unallocated() {
        let db = database().await;
        with_client(&db, profile("c1")).await;
        let built = invoices(&db, "c1", &[(3_000, 1), (5_000, 2), (4_000, 3)]).await;

        let view = db
            .payments()
            .record_payment(request("c1", 15_000, AllocationStrategy::Fifo))
            .await
            .unwrap();

        assert_eq!(view.payment.allocations.len(), 3);
        assert_eq!(view.allocated_cents, 12_000);
        assert_eq!(view.unallocated_cents, 3_000);

        let status = db
            .invoicing(&FiscalConfig::default())
            .invoice_view(&built[2].id, day(3, 20))
            .await
            .unwrap()
            .status;
        assert_eq!(status, InvoiceStatus::Paid);
    }

    #[tokio::test]
    async fn test_manual_batch_is_checked_cumulatively() {
        let db = database().await;
        with_client(&db, profile("c1")).await;
        let built = invoices(&db, "c1", &[(10_000, 1)]).await;
        let id = &built[0].id;

        let err = db
            .payments()
            .record_payment(request(
                "c1",
                20_000,
                AllocationStrategy::Manual(vec![
                    ManualAllocation::new(id.clone(), Money::from_cents(8_000)),
                    ManualAllocation::new(id.clone(), Money::from_cents(8_000)),
                ]),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Ledger(CoreError::OverAllocation { .. })));

        let view = db
            .payments()
            .record_payment(request(
                "c1",
                10_000,
                AllocationStrategy::Manual(vec![
                    ManualAllocation::new(id.clone(), Money::from_cents(6_000)),
                    ManualAllocation::new(id.clone(), Money::from_cents(4_000)),
                ]),
            ))
            .await
            .unwrap();
        assert_eq!(view.allocated_cents, 10_000);
        assert_eq!(view.payment.allocations.len(), 1);
    }

    #[tokio::test]
    async fn test_manual_entry_for_another_payer_is_not_found() {
        let db = database().await;
        with_client(&db, profile("c1")).await;
        with_client(&db, profile("c2")).await;
        let theirs = invoices(&db, "c2", &[(10_000, 1)]).await;

        let err = db
            .payments()
            .record_payment(request(
                "c1",
                5_000,
                AllocationStrategy::Manual(vec![ManualAllocation::new(
                    theirs[0].id.clone(),
                    Money::from_cents(5_000),
                )]),
            ))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn test_payment_without_open_invoices_is_refused() {
        let db = database().await;
        with_client(&db, profile("c1")).await;

        let err = db
            .payments()
            .record_payment(request("c1", 5_000, AllocationStrategy::Fifo))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Ledger(CoreError::NoOpenInvoices { .. })));
    }

    #[tokio::test]
    async fn test_exposure_counts_allocations_once() {
        let db = database().await;
        with_client(&db, profile("c1")).await;
        invoices(&db, "c1", &[(60_000, 1), (40_000, 2)]).await;

        // One payment, two allocation rows.
        let view = db
            .payments()
            .record_payment(request("c1", 80_000, AllocationStrategy::Fifo))
            .await
            .unwrap();
        assert_eq!(view.payment.allocations.len(), 2);

        let mut conn = db.pool().acquire().await.unwrap();
        let exposure = InvoiceRepository::exposure(&mut conn, "c1").await.unwrap();
        assert_eq!(exposure, Money::from_cents(20_000));
    }

    #[tokio::test]
    async fn test_reallocate_and_delete() {
        let db = database().await;
        with_client(&db, profile("c1")).await;
        let built = invoices(&db, "c1", &[(3_000, 1), (5_000, 2)]).await;

        let view = db
            .payments()
            .record_payment(request("c1", 4_000, AllocationStrategy::Fifo))
            .await
            .unwrap();
        assert!(view
            .payment
            .allocations
            .iter()
            .any(|a| a.invoice_id == built[0].id && a.amount_cents == 3_000));

        let moved = db
            .payments()
            .reallocate_payment(
                &view.payment.id,
                vec![ManualAllocation::new(built[1].id.clone(), Money::from_cents(4_000))],
            )
            .await
            .unwrap();
        assert_eq!(moved.payment.allocations.len(), 1);
        assert_eq!(moved.payment.allocations[0].invoice_id, built[1].id);
        assert_eq!(moved.unallocated_cents, 0);

        db.payments().delete_payment(&view.payment.id).await.unwrap();
        let err = db.payments().payment_view(&view.payment.id).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::NotFound));

        let mut conn = db.pool().acquire().await.unwrap();
        let open = InvoiceRepository::open_for_client(&mut conn, "c1").await.unwrap();
        assert!(open.iter().all(|i| i.remaining.cents() > 0));
    }
}
