//! # Invoice Service
//!
//! Builds invoices from completed work orders and maintains them afterwards.
//!
//! ## Building
//! ```text
//! lock Sequence(invoice, period) + ClientLedger(billing party)
//!   │
//!   ├─ work order snapshot     must be completed, not invoiced
//!   ├─ billing profile         tax, discount, terms, credit limit
//!   ├─ declaration of intent   valid on the invoice date, if any
//!   ├─ exposure                Σ invoices − Σ allocations of the party
//!   │
//!   ├─ InvoiceBuilder::price   pure pricing + tax resolution
//!   ├─ credit_limit::check     block → error, warn → invoice note
//!   ├─ next_number             2026/0001, 2026/0002, ...
//!   │
//!   ├─ insert invoice + lines
//!   ├─ consume plafond         guarded update
//!   └─ work order → invoiced   guarded update
//! commit
//! ```

use chrono::{NaiveDate, Utc};
use officina_core::credit_limit;
use officina_core::invoice::{InvoiceBuilder, InvoiceRequest};
use officina_core::numbering::period_of;
use officina_core::status::remaining;
use officina_core::{
    CoreError, Deposit, DocumentFamily, FiscalConfig, Invoice, InvoiceStatus, InvoiceSummary, InvoiceView, Money,
    ValidationError,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::ledger::LockKey;
use crate::pool::Database;
use crate::repository::{
    ClientRepository, CreditNoteRepository, DeclarationRepository, DepositRepository, InvoiceRepository,
    PaymentRepository, WorkOrderRepository,
};

/// Result of building an invoice.
#[derive(Debug, Clone)]
pub struct BuiltInvoice {
    pub invoice: Invoice,
    /// Set when the billing party went over its credit limit under the warn policy.
    pub credit_warning: Option<String>,
    /// Deposits taken on the work order that can now be applied to the invoice.
    pub pending_deposits: Vec<Deposit>,
}

/// The fields of an issued invoice that may still change. `None` keeps the
/// current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvoiceUpdate {
    pub notes: Option<String>,
    pub customer_notes: Option<String>,
    pub due_date: Option<NaiveDate>,
}

/// Invoice building and maintenance.
#[derive(Debug, Clone)]
pub struct InvoiceService {
    db: Database,
    config: FiscalConfig,
}

impl InvoiceService {
    pub fn new(db: Database, config: FiscalConfig) -> Self {
        InvoiceService { db, config }
    }

    /// Builds, numbers and persists the invoice of a completed work order.
    ///
    /// ## Errors
    /// - NotFound: work order or billing party
    /// - BusinessValidation: work order not completed or already invoiced,
    ///   nothing billable, plafond exceeded, credit limit exceeded under block,
    ///   numbering exhausted
    /// - Conflict: the work order or declaration changed under us
    pub async fn build_from_work_order(&self, work_order_id: &str, request: InvoiceRequest) -> DbResult<BuiltInvoice> {
        let owner = {
            let mut conn = self.db.pool().acquire().await?;
            WorkOrderRepository::client_of(&mut conn, work_order_id)
                .await?
                .ok_or_else(|| CoreError::not_found("Work order", work_order_id))?
        };
        let bill_to = request.bill_to_client_id.clone().unwrap_or_else(|| owner.clone());
        let period = period_of(request.invoice_date);

        let mut tx = self
            .db
            .begin_ledger(vec![
                LockKey::sequence(DocumentFamily::Invoice, period),
                LockKey::client(bill_to.clone()),
            ])
            .await?;

        let snapshot = WorkOrderRepository::find_snapshot(tx.conn(), work_order_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Work order", work_order_id))?;
        if snapshot.client_id != owner {
            return Err(DbError::conflict(format!(
                "work order {} changed client while invoicing",
                work_order_id
            )));
        }

        let profile = ClientRepository::require(tx.conn(), &bill_to).await?;
        let declaration = DeclarationRepository::valid_for(tx.conn(), &bill_to, request.invoice_date).await?;
        let exposure = InvoiceRepository::exposure(tx.conn(), &bill_to).await?;

        let mut draft = InvoiceBuilder::new(&self.config).price(&snapshot, &profile, declaration.as_ref(), &request)?;

        let check = credit_limit::check(&profile, exposure, draft.total)?;
        if let Some(warning) = &check.warning {
            warn!(
                client_id = %bill_to,
                exposure = %check.exposure,
                amount = %draft.total,
                "Credit limit exceeded, invoicing under warn policy"
            );
            debug!(warning = %warning, "Credit warning recorded on invoice");
        }
        draft.apply_credit_check(&check);

        let number = tx.next_number(DocumentFamily::Invoice, period).await?;
        let invoice = draft.into_invoice(number, Utc::now());

        InvoiceRepository::insert(tx.conn(), &invoice).await?;
        if let Some(declaration_id) = &invoice.intent_declaration_id {
            DeclarationRepository::consume(tx.conn(), declaration_id, Money::from_cents(invoice.plafond_used_cents))
                .await?;
        }
        WorkOrderRepository::mark_invoiced(tx.conn(), work_order_id).await?;
        let pending_deposits = DepositRepository::pending_of_work_order(tx.conn(), work_order_id).await?;

        tx.commit().await?;

        info!(
            number = %invoice.invoice_number,
            work_order_id = %work_order_id,
            bill_to = %invoice.bill_to_client_id,
            total = %invoice.total(),
            exempt = invoice.vat_exempt,
            "Invoice built"
        );

        Ok(BuiltInvoice {
            invoice,
            credit_warning: check.warning,
            pending_deposits,
        })
    }

    /// Changes the notes or the due date of an invoice.
    pub async fn update_invoice(&self, invoice_id: &str, update: InvoiceUpdate) -> DbResult<Invoice> {
        let mut tx = self.db.begin_ledger(Vec::new()).await?;

        let invoice = InvoiceRepository::find(tx.conn(), invoice_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Invoice", invoice_id))?;

        let due_date = update.due_date.unwrap_or(invoice.due_date);
        if due_date < invoice.invoice_date {
            return Err(ValidationError::InvalidFormat {
                field: "due_date".to_string(),
                reason: "must not precede the invoice date".to_string(),
            }
            .into());
        }
        let notes = update.notes.or(invoice.notes);
        let customer_notes = update.customer_notes.or(invoice.customer_notes);

        InvoiceRepository::update_annotations(
            tx.conn(),
            invoice_id,
            notes.as_deref(),
            customer_notes.as_deref(),
            due_date,
        )
        .await?;
        let updated = InvoiceRepository::find(tx.conn(), invoice_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Invoice", invoice_id))?;

        tx.commit().await?;

        info!(number = %updated.invoice_number, due_date = %updated.due_date, "Invoice updated");
        Ok(updated)
    }

    /// Deletes an unsettled invoice that is the latest of its period.
    ///
    /// The work order returns to completed and consumed plafond is released.
    pub async fn delete_invoice(&self, invoice_id: &str) -> DbResult<()> {
        let (period, bill_to) = {
            let mut conn = self.db.pool().acquire().await?;
            let invoice = InvoiceRepository::find(&mut conn, invoice_id)
                .await?
                .ok_or_else(|| CoreError::not_found("Invoice", invoice_id))?;
            (invoice.period, invoice.bill_to_client_id)
        };

        let mut tx = self
            .db
            .begin_ledger(vec![
                LockKey::sequence(DocumentFamily::Invoice, period),
                LockKey::client(bill_to),
            ])
            .await?;

        let invoice = InvoiceRepository::find(tx.conn(), invoice_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Invoice", invoice_id))?;

        let locked = |reason: &str| CoreError::InvoiceLocked {
            invoice_number: invoice.invoice_number.clone(),
            reason: reason.to_string(),
        };

        if !PaymentRepository::allocations_of_invoice(tx.conn(), invoice_id).await?.is_empty() {
            return Err(locked("payments are allocated to it").into());
        }
        if !CreditNoteRepository::for_invoice(tx.conn(), invoice_id).await?.is_empty() {
            return Err(locked("credit notes were issued against it").into());
        }
        if InvoiceRepository::last_sequence(tx.conn(), invoice.period).await? != Some(invoice.sequence) {
            return Err(locked("a later invoice of the same period exists").into());
        }

        if let Some(declaration_id) = &invoice.intent_declaration_id {
            DeclarationRepository::release(tx.conn(), declaration_id, Money::from_cents(invoice.plafond_used_cents))
                .await?;
        }
        WorkOrderRepository::reopen(tx.conn(), &invoice.work_order_id).await?;
        InvoiceRepository::delete(tx.conn(), invoice_id).await?;

        tx.commit().await?;

        info!(number = %invoice.invoice_number, work_order_id = %invoice.work_order_id, "Invoice deleted");
        Ok(())
    }

    /// An invoice with its allocations, credit notes and derived figures.
    pub async fn invoice_view(&self, invoice_id: &str, today: NaiveDate) -> DbResult<InvoiceView> {
        let mut conn = self.db.pool().acquire().await?;

        let invoice = InvoiceRepository::find(&mut conn, invoice_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Invoice", invoice_id))?;
        let allocations = PaymentRepository::allocations_of_invoice(&mut conn, invoice_id).await?;
        let credit_notes = CreditNoteRepository::for_invoice(&mut conn, invoice_id).await?;

        let paid = InvoiceRepository::paid(&mut conn, invoice_id).await?;
        let credited = InvoiceRepository::credited(&mut conn, invoice_id).await?;
        let status = InvoiceRepository::status_of(&mut conn, &invoice, today).await?;

        Ok(InvoiceView {
            remaining_cents: remaining(invoice.total(), paid, credited).cents(),
            paid_cents: paid.cents(),
            credited_cents: credited.cents(),
            status,
            allocations,
            credit_notes,
            invoice,
        })
    }

    /// Invoices, optionally of one billing party and in one status.
    pub async fn list_invoices(
        &self,
        client_id: Option<&str>,
        status: Option<InvoiceStatus>,
        today: NaiveDate,
    ) -> DbResult<Vec<InvoiceSummary>> {
        let summaries = self.db.invoices().summaries(client_id, today).await?;
        Ok(match status {
            Some(status) => summaries.into_iter().filter(|s| s.status == status).collect(),
            None => summaries,
        })
    }

    /// Invoices past their due date with something still owed.
    pub async fn overdue_invoices(&self, today: NaiveDate) -> DbResult<Vec<InvoiceSummary>> {
        self.list_invoices(None, Some(InvoiceStatus::Overdue), today).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::declaration::NewDeclaration;
    use crate::service::fixtures::{
        database, day, discard, file_database, profile, with_client, with_work_order, work_order,
    };
    use officina_core::{CreditLimitPolicy, ErrorKind, PaymentMethod, WorkOrderStatus};

    fn config() -> FiscalConfig {
        FiscalConfig::default()
    }

    #[tokio::test]
    async fn test_build_numbers_from_one_and_marks_invoiced() {
        let db = database().await;
        with_client(&db, profile("c1")).await;
        with_work_order(&db, work_order("wo-1", "c1", 10_000)).await;
        with_work_order(&db, work_order("wo-2", "c1", 5_000)).await;

        let service = db.invoicing(&config());
        let first = service.build_from_work_order("wo-1", InvoiceRequest::on(day(3, 10))).await.unwrap();
        let second = service.build_from_work_order("wo-2", InvoiceRequest::on(day(3, 11))).await.unwrap();

        assert_eq!(first.invoice.invoice_number, "2026/0001");
        assert_eq!(second.invoice.invoice_number, "2026/0002");
        assert_eq!(first.invoice.total_cents, 12_200);
        assert!(first.invoice.totals_are_consistent());
        assert_eq!(first.invoice.due_date, day(4, 9));
        assert_eq!(first.invoice.payment_reference, "2026/0001");

        let snapshot = db.work_orders().get_snapshot("wo-1").await.unwrap().unwrap();
        assert_eq!(snapshot.status, WorkOrderStatus::Invoiced);

        let stored = db.invoices().get_by_number("2026/0001").await.unwrap().unwrap();
        assert_eq!(stored.lines.len(), 1);
        assert_eq!(stored.id, first.invoice.id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_builds_get_distinct_numbers() {
        // One client per work order: the period's sequence lock is the only
        // key the builds share.
        let (db, path) = file_database().await;
        for n in 0..8i64 {
            with_client(&db, profile(&format!("c{n}"))).await;
            with_work_order(&db, work_order(&format!("wo-{n}"), &format!("c{n}"), 1_000 * (n + 1))).await;
        }

        let handles: Vec<_> = (0..8i64)
            .map(|n| {
                let service = db.invoicing(&config());
                tokio::spawn(async move {
                    let work_order_id = format!("wo-{n}");
                    service
                        .build_from_work_order(&work_order_id, InvoiceRequest::on(day(3, 10)))
                        .await
                        .map(|built| built.invoice.invoice_number)
                })
            })
            .collect();

        let mut numbers = Vec::new();
        for handle in handles {
            numbers.push(handle.await.unwrap().unwrap());
        }
        numbers.sort();

        let expected: Vec<String> = (1..=8).map(|n| format!("2026/{n:04}")).collect();
        assert_eq!(numbers, expected);
        discard(db, path).await;
    }

    #[tokio::test]
    async fn test_second_build_is_already_invoiced() {
        let db = database().await;
        with_client(&db, profile("c1")).await;
        with_work_order(&db, work_order("wo-1", "c1", 10_000)).await;

        let service = db.invoicing(&config());
        service.build_from_work_order("wo-1", InvoiceRequest::on(day(3, 10))).await.unwrap();
        let err = service
            .build_from_work_order("wo-1", InvoiceRequest::on(day(3, 10)))
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::Ledger(CoreError::AlreadyInvoiced { .. })));
        assert_eq!(err.kind(), Some(ErrorKind::BusinessValidation));
    }

    #[tokio::test]
    async fn test_unknown_work_order_is_not_found() {
        let db = database().await;
        let err = db
            .invoicing(&config())
            .build_from_work_order("missing", InvoiceRequest::on(day(3, 10)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::NotFound));
    }

    #[tokio::test]
    async fn test_bill_to_override_uses_the_payer_profile() {
        let db = database().await;
        with_client(&db, profile("owner")).await;
        let mut insurer = profile("insurer");
        insurer.display_name = "Assicurazioni Srl".to_string();
        insurer.preferred_payment_method = Some(PaymentMethod::BankTransfer);
        with_client(&db, insurer).await;
        with_work_order(&db, work_order("wo-1", "owner", 10_000)).await;

        let mut config = config();
        config.invoice_iban = Some("IT60X0542811101000000123456".to_string());

        let mut request = InvoiceRequest::on(day(3, 10));
        request.bill_to_client_id = Some("insurer".to_string());
        let built = db.invoicing(&config).build_from_work_order("wo-1", request).await.unwrap();

        assert_eq!(built.invoice.client_id, "owner");
        assert_eq!(built.invoice.bill_to_client_id, "insurer");
        assert_eq!(built.invoice.bill_to_name, "Assicurazioni Srl");
        assert_eq!(built.invoice.payment_iban.as_deref(), Some("IT60X0542811101000000123456"));
    }

    #[tokio::test]
    async fn test_declaration_consumes_plafond_and_release_on_delete() {
        let db = database().await;
        with_client(&db, profile("exporter")).await;
        with_work_order(&db, work_order("wo-1", "exporter", 30_000)).await;

        let declaration = db
            .declarations()
            .register(NewDeclaration {
                client_id: "exporter".to_string(),
                protocol_number: "24012345678-000001".to_string(),
                declaration_date: day(1, 10),
                amount_limit: Money::from_cents(100_000),
                expiry_date: day(12, 31),
            })
            .await
            .unwrap();

        let service = db.invoicing(&config());
        let built = service.build_from_work_order("wo-1", InvoiceRequest::on(day(3, 10))).await.unwrap();

        assert!(built.invoice.vat_exempt);
        assert_eq!(built.invoice.vat_cents, 0);
        assert_eq!(built.invoice.plafond_used_cents, 30_000);
        // Zero-rated above the threshold carries stamp duty.
        assert_eq!(built.invoice.stamp_duty_cents, 200);

        let after = db.declarations().get_by_id(&declaration.id).await.unwrap().unwrap();
        assert_eq!(after.used_amount_cents, 30_000);

        service.delete_invoice(&built.invoice.id).await.unwrap();
        let released = db.declarations().get_by_id(&declaration.id).await.unwrap().unwrap();
        assert_eq!(released.used_amount_cents, 0);

        let snapshot = db.work_orders().get_snapshot("wo-1").await.unwrap().unwrap();
        assert_eq!(snapshot.status, WorkOrderStatus::Completed);
    }

    #[tokio::test]
    async fn test_insufficient_plafond_rejects_and_leaves_no_trace() {
        let db = database().await;
        with_client(&db, profile("exporter")).await;
        with_work_order(&db, work_order("wo-1", "exporter", 30_000)).await;

        db.declarations()
            .register(NewDeclaration {
                client_id: "exporter".to_string(),
                protocol_number: "24012345678-000002".to_string(),
                declaration_date: day(1, 10),
                amount_limit: Money::from_cents(10_000),
                expiry_date: day(12, 31),
            })
            .await
            .unwrap();

        let err = db
            .invoicing(&config())
            .build_from_work_order("wo-1", InvoiceRequest::on(day(3, 10)))
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::Ledger(CoreError::PlafondExceeded { .. })));
        assert!(db.invoices().get_by_number("2026/0001").await.unwrap().is_none());
        let snapshot = db.work_orders().get_snapshot("wo-1").await.unwrap().unwrap();
        assert_eq!(snapshot.status, WorkOrderStatus::Completed);
    }

    #[tokio::test]
    async fn test_plafond_equal_to_pretax_does_not_cover_the_invoice() {
        let db = database().await;
        for (client, limit) in [("short", 10_000), ("covered", 12_200)] {
            with_client(&db, profile(client)).await;
            with_work_order(&db, work_order(&format!("wo-{client}"), client, 10_000)).await;
            db.declarations()
                .register(NewDeclaration {
                    client_id: client.to_string(),
                    protocol_number: format!("24012345678-{client}"),
                    declaration_date: day(1, 10),
                    amount_limit: Money::from_cents(limit),
                    expiry_date: day(12, 31),
                })
                .await
                .unwrap();
        }
        let service = db.invoicing(&config());

        let err = service
            .build_from_work_order("wo-short", InvoiceRequest::on(day(3, 10)))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Ledger(CoreError::PlafondExceeded { .. })));

        let built = service
            .build_from_work_order("wo-covered", InvoiceRequest::on(day(3, 10)))
            .await
            .unwrap();
        assert_eq!(built.invoice.total_cents, 10_200);
        assert_eq!(built.invoice.plafond_used_cents, 10_000);
        let declaration = db
            .declarations()
            .get_by_id(built.invoice.intent_declaration_id.as_deref().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(declaration.used_amount_cents, 10_000);
    }

    #[tokio::test]
    async fn test_credit_limit_block_and_warn() {
        let db = database().await;
        let mut strict = profile("strict");
        strict.credit_limit_cents = Some(10_000);
        strict.credit_limit_policy = CreditLimitPolicy::Block;
        with_client(&db, strict).await;
        let mut lenient = profile("lenient");
        lenient.credit_limit_cents = Some(10_000);
        with_client(&db, lenient).await;
        with_work_order(&db, work_order("wo-1", "strict", 10_000)).await;
        with_work_order(&db, work_order("wo-2", "lenient", 10_000)).await;

        let service = db.invoicing(&config());

        let err = service
            .build_from_work_order("wo-1", InvoiceRequest::on(day(3, 10)))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Ledger(CoreError::CreditLimitExceeded { .. })));

        let built = service.build_from_work_order("wo-2", InvoiceRequest::on(day(3, 10))).await.unwrap();
        let warning = built.credit_warning.unwrap();
        assert!(built.invoice.notes.unwrap().contains(&warning));
        // The rejected build left no gap in the numbering.
        assert_eq!(built.invoice.invoice_number, "2026/0001");
    }

    #[tokio::test]
    async fn test_update_only_touches_annotations() {
        let db = database().await;
        with_client(&db, profile("c1")).await;
        with_work_order(&db, work_order("wo-1", "c1", 10_000)).await;

        let service = db.invoicing(&config());
        let built = service.build_from_work_order("wo-1", InvoiceRequest::on(day(3, 10))).await.unwrap();

        let updated = service
            .update_invoice(
                &built.invoice.id,
                InvoiceUpdate {
                    customer_notes: Some("Ritiro venerdì".to_string()),
                    due_date: Some(day(5, 31)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.due_date, day(5, 31));
        assert_eq!(updated.customer_notes.as_deref(), Some("Ritiro venerdì"));
        assert_eq!(updated.total_cents, built.invoice.total_cents);

        let err = service
            .update_invoice(
                &built.invoice.id,
                InvoiceUpdate {
                    due_date: Some(day(3, 1)),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::BusinessValidation));
    }

    #[tokio::test]
    async fn test_delete_only_latest_of_period() {
        let db = database().await;
        with_client(&db, profile("c1")).await;
        with_work_order(&db, work_order("wo-1", "c1", 10_000)).await;
        with_work_order(&db, work_order("wo-2", "c1", 10_000)).await;

        let service = db.invoicing(&config());
        let first = service.build_from_work_order("wo-1", InvoiceRequest::on(day(3, 10))).await.unwrap();
        let second = service.build_from_work_order("wo-2", InvoiceRequest::on(day(3, 10))).await.unwrap();

        let err = service.delete_invoice(&first.invoice.id).await.unwrap_err();
        assert!(matches!(err, DbError::Ledger(CoreError::InvoiceLocked { .. })));

        service.delete_invoice(&second.invoice.id).await.unwrap();
        assert!(db.invoices().get_by_id(&second.invoice.id).await.unwrap().is_none());

        // The freed number is issued again.
        let again = service.build_from_work_order("wo-2", InvoiceRequest::on(day(3, 12))).await.unwrap();
        assert_eq!(again.invoice.invoice_number, "2026/0002");
    }

    #[tokio::test]
    async fn test_overdue_listing() {
        let db = database().await;
        with_client(&db, profile("c1")).await;
        with_work_order(&db, work_order("wo-1", "c1", 10_000)).await;

        let service = db.invoicing(&config());
        let built = service.build_from_work_order("wo-1", InvoiceRequest::on(day(3, 10))).await.unwrap();

        assert!(service.overdue_invoices(day(4, 1)).await.unwrap().is_empty());
        let overdue = service.overdue_invoices(day(4, 20)).await.unwrap();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].invoice.id, built.invoice.id);
        assert_eq!(overdue[0].remaining_cents, 12_200);

        let view = service.invoice_view(&built.invoice.id, day(4, 1)).await.unwrap();
        assert_eq!(view.status, InvoiceStatus::Unpaid);
        assert_eq!(view.remaining_cents, 12_200);
    }
}
