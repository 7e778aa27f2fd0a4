//! # Report Service
//!
//! Revenue aggregates over the invoices dated in a range. Collections and
//! credit notes are attributed to the invoice they settle or reverse, not to
//! the day they happened.

use chrono::NaiveDate;
use officina_core::{RevenueReport, ValidationError};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::pool::Database;

/// Revenue aggregates.
#[derive(Debug, Clone)]
pub struct ReportService {
    db: Database,
}

impl ReportService {
    pub fn new(db: Database) -> Self {
        ReportService { db }
    }

    /// Totals of invoices dated in `[from, to]`.
    pub async fn revenue_report(&self, from: NaiveDate, to: NaiveDate) -> DbResult<RevenueReport> {
        if to < from {
            return Err(ValidationError::InvalidFormat {
                field: "to".to_string(),
                reason: "must not precede from".to_string(),
            }
            .into());
        }

        let mut conn = self.db.pool().acquire().await?;

        let (count, subtotal, vat, stamp_duty, total): (i64, i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(subtotal_cents), 0),
                COALESCE(SUM(vat_cents), 0),
                COALESCE(SUM(stamp_duty_cents), 0),
                COALESCE(SUM(total_cents), 0)
            FROM invoices
            WHERE invoice_date BETWEEN ?1 AND ?2
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_one(&mut *conn)
        .await?;

        let collected: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(pa.amount_cents), 0)
            FROM payment_allocations pa
            JOIN invoices i ON i.id = pa.invoice_id
            WHERE i.invoice_date BETWEEN ?1 AND ?2
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_one(&mut *conn)
        .await?;

        let credited: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(cn.total_cents), 0)
            FROM credit_notes cn
            JOIN invoices i ON i.id = cn.invoice_id
            WHERE i.invoice_date BETWEEN ?1 AND ?2
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_one(&mut *conn)
        .await?;

        let invoice_count =
            u32::try_from(count).map_err(|_| DbError::Internal(format!("invoice count {} out of range", count)))?;

        debug!(from = %from, to = %to, invoices = invoice_count, "Revenue report computed");

        Ok(RevenueReport {
            invoice_count,
            subtotal_cents: subtotal,
            vat_cents: vat,
            stamp_duty_cents: stamp_duty,
            total_cents: total,
            collected_cents: collected,
            credited_cents: credited,
            net_cents: total + credited,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::fixtures::{database, day, profile, with_client, with_work_order, work_order};
    use crate::service::PaymentRequest;
    use officina_core::allocation::AllocationStrategy;
    use officina_core::invoice::InvoiceRequest;
    use officina_core::{ErrorKind, FiscalConfig, Money, PaymentMethod};

    #[tokio::test]
    async fn test_revenue_report_over_a_month() {
        let db = database().await;
        with_client(&db, profile("c1")).await;
        with_work_order(&db, work_order("wo-1", "c1", 10_000)).await;
        with_work_order(&db, work_order("wo-2", "c1", 5_000)).await;
        with_work_order(&db, work_order("wo-3", "c1", 1_000)).await;

        let invoicing = db.invoicing(&FiscalConfig::default());
        let first = invoicing.build_from_work_order("wo-1", InvoiceRequest::on(day(3, 5))).await.unwrap();
        invoicing.build_from_work_order("wo-2", InvoiceRequest::on(day(3, 20))).await.unwrap();
        invoicing.build_from_work_order("wo-3", InvoiceRequest::on(day(4, 2))).await.unwrap();

        db.payments()
            .record_payment(PaymentRequest {
                client_id: "c1".to_string(),
                amount: Money::from_cents(6_100),
                payment_date: day(3, 25),
                method: PaymentMethod::Pos,
                reference: None,
                notes: None,
                strategy: AllocationStrategy::Fifo,
            })
            .await
            .unwrap();
        // Issued in April, still attributed to the March invoice.
        db.credit_notes()
            .reverse_full(&first.invoice.id, "Reso", day(4, 3))
            .await
            .unwrap();

        let report = db.reports().revenue_report(day(3, 1), day(3, 31)).await.unwrap();
        assert_eq!(report.invoice_count, 2);
        assert_eq!(report.subtotal_cents, 15_000);
        assert_eq!(report.vat_cents, 3_300);
        assert_eq!(report.total_cents, 18_300);
        assert_eq!(report.collected_cents, 6_100);
        assert_eq!(report.credited_cents, -12_200);
        assert_eq!(report.net_cents, 6_100);
    }

    #[tokio::test]
    async fn test_inverted_range_is_rejected() {
        let db = database().await;
        let err = db.reports().revenue_report(day(3, 31), day(3, 1)).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::BusinessValidation));
    }
}
