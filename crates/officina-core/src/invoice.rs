//! # Invoice Builder
//!
//! Prices a completed work order into an invoice draft. Numbering, the
//! credit-limit exposure lookup and persistence happen in officina-db; this
//! module owns every monetary decision.
//!
//! ## Pricing Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  WorkOrderSnapshot (status must be Completed)                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  flatten: labor/service items, then part usages                        │
//! │       │                                                                 │
//! │       ▼  per line, each step rounded half-up to the cent               │
//! │  gross    = round(quantity × unit_price)                               │
//! │  discount = round(gross × profile discount %)                          │
//! │  subtotal = gross − discount                                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  TaxResolver.resolve(profile, declaration, Σ subtotal, Σ taxed total)  │
//! │       │                                                                 │
//! │       ▼  per line                                                      │
//! │  vat      = round(subtotal × line rate)                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  subtotal = Σ line.subtotal   vat = Σ line.vat                         │
//! │  stamp    = duty if Σ zero-rated subtotal > threshold                  │
//! │  total    = subtotal + vat + stamp                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::FiscalConfig;
use crate::credit_limit::CreditCheck;
use crate::error::{CoreError, CoreResult};
use crate::money::{Money, Quantity};
use crate::numbering::DocumentNumber;
use crate::tax::{TaxDecision, TaxRequest, TaxResolver};
use crate::types::{
    BillingProfile, DiscountRate, IntentDeclaration, Invoice, InvoiceLine, LineType, PaymentMethod,
    TaxRate, WorkOrderSnapshot, WorkOrderStatus,
};
use crate::validation::{validate_discount, validate_price_cents, validate_quantity};

// =============================================================================
// Request
// =============================================================================

/// Caller-supplied invoicing options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceRequest {
    pub invoice_date: NaiveDate,
    /// Overrides `invoice_date + payment terms`.
    pub due_date: Option<NaiveDate>,
    /// Overrides the profile's default rate for taxable lines.
    pub vat_rate_override: Option<TaxRate>,
    /// Invoice another party than the work order's owner.
    pub bill_to_client_id: Option<String>,
    pub customer_notes: Option<String>,
}

impl InvoiceRequest {
    pub fn on(invoice_date: NaiveDate) -> Self {
        InvoiceRequest {
            invoice_date,
            due_date: None,
            vat_rate_override: None,
            bill_to_client_id: None,
            customer_notes: None,
        }
    }
}

// =============================================================================
// Line Pricing
// =============================================================================

/// A priced line not yet attached to a numbered invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub line_number: u32,
    pub line_type: LineType,
    pub description: String,
    pub quantity: Quantity,
    pub unit_price: Money,
    pub discount_rate: DiscountRate,
    pub discount: Money,
    pub vat_rate: TaxRate,
    pub subtotal: Money,
    pub vat: Money,
}

/// Prices one line. Works for negative unit prices (credit notes) too.
///
/// ## Example
/// ```rust
/// use officina_core::invoice::price_line;
/// use officina_core::money::{Money, Quantity};
/// use officina_core::types::{DiscountRate, LineType, TaxRate};
///
/// let line = price_line(
///     1,
///     LineType::Labor,
///     "Tagliando",
///     Quantity::from_hundredths(150),
///     Money::from_cents(4550),
///     DiscountRate::from_bps(1000),
///     TaxRate::from_bps(2200),
/// );
/// assert_eq!(line.discount.cents(), 683);   // 682.5 → 683
/// assert_eq!(line.subtotal.cents(), 6142);  // 6825 − 683
/// assert_eq!(line.vat.cents(), 1351);       // 1351.24 → 1351
/// ```
pub fn price_line(
    line_number: u32,
    line_type: LineType,
    description: &str,
    quantity: Quantity,
    unit_price: Money,
    discount_rate: DiscountRate,
    vat_rate: TaxRate,
) -> PricedLine {
    let gross = unit_price.times(quantity);
    let discount = gross.discount_amount(discount_rate);
    let subtotal = gross - discount;
    let vat = subtotal.calculate_tax(vat_rate);

    PricedLine {
        line_number,
        line_type,
        description: description.to_string(),
        quantity,
        unit_price,
        discount_rate,
        discount,
        vat_rate,
        subtotal,
        vat,
    }
}

// =============================================================================
// Draft
// =============================================================================

/// A fully priced invoice waiting for its number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceDraft {
    pub work_order_id: String,
    pub client_id: String,
    pub bill_to_client_id: String,
    pub bill_to_name: String,
    pub bill_to_tax_id: Option<String>,
    pub bill_to_address: Option<String>,
    pub claim_number: Option<String>,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub lines: Vec<PricedLine>,
    pub subtotal: Money,
    pub vat: Money,
    pub stamp_duty: Money,
    pub total: Money,
    pub tax: TaxDecision,
    pub split_payment: bool,
    pub payment_iban: Option<String>,
    /// Legal and credit notices, one per line.
    pub notices: Vec<String>,
    pub customer_notes: Option<String>,
}

impl InvoiceDraft {
    /// Records the credit-limit outcome; a warning becomes an invoice notice.
    pub fn apply_credit_check(&mut self, check: &CreditCheck) {
        if let Some(warning) = &check.warning {
            self.notices.push(warning.clone());
        }
    }

    /// Freezes the draft into an invoice under `number`.
    pub fn into_invoice(self, number: DocumentNumber, created_at: DateTime<Utc>) -> Invoice {
        let invoice_id = Uuid::new_v4().to_string();
        let invoice_number = number.to_string();

        let lines = self
            .lines
            .into_iter()
            .map(|line| InvoiceLine {
                id: Uuid::new_v4().to_string(),
                invoice_id: invoice_id.clone(),
                line_number: line.line_number,
                line_type: line.line_type,
                description: line.description,
                quantity_hundredths: line.quantity.hundredths(),
                unit_price_cents: line.unit_price.cents(),
                discount_bps: line.discount_rate.bps(),
                discount_cents: line.discount.cents(),
                vat_rate_bps: line.vat_rate.bps(),
                subtotal_cents: line.subtotal.cents(),
                vat_cents: line.vat.cents(),
            })
            .collect();

        let notes = if self.notices.is_empty() {
            None
        } else {
            Some(self.notices.join("\n"))
        };

        let (intent_declaration_id, plafond_used) = match self.tax.plafond {
            Some(plafond) => (Some(plafond.declaration_id), plafond.amount),
            None => (None, Money::zero()),
        };

        Invoice {
            id: invoice_id,
            payment_reference: invoice_number.clone(),
            invoice_number,
            period: number.period,
            sequence: number.sequence,
            work_order_id: self.work_order_id,
            client_id: self.client_id,
            bill_to_client_id: self.bill_to_client_id,
            bill_to_name: self.bill_to_name,
            bill_to_tax_id: self.bill_to_tax_id,
            bill_to_address: self.bill_to_address,
            claim_number: self.claim_number,
            invoice_date: self.invoice_date,
            due_date: self.due_date,
            subtotal_cents: self.subtotal.cents(),
            vat_rate_bps: self.tax.effective_rate.bps(),
            vat_cents: self.vat.cents(),
            stamp_duty_cents: self.stamp_duty.cents(),
            total_cents: self.total.cents(),
            vat_exempt: self.tax.is_exempt,
            vat_exemption_code: self.tax.exemption_code,
            split_payment: self.split_payment,
            intent_declaration_id,
            plafond_used_cents: plafond_used.cents(),
            notes,
            customer_notes: self.customer_notes,
            payment_iban: self.payment_iban,
            created_at,
            lines,
        }
    }
}

// =============================================================================
// Builder
// =============================================================================

struct Candidate<'a> {
    line_type: LineType,
    description: &'a str,
    quantity: Quantity,
    unit_price: Money,
    stored_rate: Option<TaxRate>,
}

/// Prices work orders under a fiscal configuration.
#[derive(Debug, Clone, Copy)]
pub struct InvoiceBuilder<'a> {
    config: &'a FiscalConfig,
}

impl<'a> InvoiceBuilder<'a> {
    pub fn new(config: &'a FiscalConfig) -> Self {
        InvoiceBuilder { config }
    }

    /// Prices `work_order` for `profile`.
    ///
    /// ## Errors
    /// - [`CoreError::AlreadyInvoiced`] / [`CoreError::WorkOrderNotCompleted`]
    /// - [`CoreError::NothingToInvoice`] when the discounted subtotal is not positive
    /// - [`CoreError::PlafondExceeded`] from the tax resolver
    /// - [`CoreError::Validation`] for malformed quantities or prices
    pub fn price(
        &self,
        work_order: &WorkOrderSnapshot,
        profile: &BillingProfile,
        declaration: Option<&IntentDeclaration>,
        request: &InvoiceRequest,
    ) -> CoreResult<InvoiceDraft> {
        match work_order.status {
            WorkOrderStatus::Completed => {}
            WorkOrderStatus::Invoiced => {
                return Err(CoreError::AlreadyInvoiced {
                    work_order_id: work_order.id.clone(),
                })
            }
            status => {
                return Err(CoreError::WorkOrderNotCompleted {
                    work_order_id: work_order.id.clone(),
                    status,
                })
            }
        }

        validate_discount(profile.default_discount_bps)?;
        let candidates = flatten(work_order)?;
        let discount = profile.default_discount();

        // Preliminary figures at the taxable rates: a declaration of intent
        // must cover the total before the exemption is chosen.
        let resolver = TaxResolver::new(self.config);
        let taxable_rate = resolver.taxable_rate(profile, request.vat_rate_override);
        let preliminary: Vec<PricedLine> = candidates
            .iter()
            .map(|c| {
                let rate = c.stored_rate.unwrap_or(taxable_rate);
                price_line(0, c.line_type, c.description, c.quantity, c.unit_price, discount, rate)
            })
            .collect();
        let pretax: Money = preliminary.iter().map(|l| l.subtotal).sum();
        let gross: Money = pretax + preliminary.iter().map(|l| l.vat).sum::<Money>();

        if !pretax.is_positive() {
            return Err(CoreError::NothingToInvoice {
                work_order_id: work_order.id.clone(),
            });
        }

        let tax = resolver.resolve(TaxRequest {
            profile,
            declaration,
            invoice_date: request.invoice_date,
            pretax_amount: pretax,
            gross_amount: gross,
            rate_override: request.vat_rate_override,
        })?;

        let lines: Vec<PricedLine> = candidates
            .iter()
            .enumerate()
            .map(|(index, c)| {
                price_line(
                    index as u32 + 1,
                    c.line_type,
                    c.description,
                    c.quantity,
                    c.unit_price,
                    discount,
                    tax.line_rate(c.stored_rate),
                )
            })
            .collect();

        let subtotal: Money = lines.iter().map(|l| l.subtotal).sum();
        let vat: Money = lines.iter().map(|l| l.vat).sum();
        let exempt_subtotal: Money = lines
            .iter()
            .filter(|l| l.vat_rate.is_zero())
            .map(|l| l.subtotal)
            .sum();
        let stamp_duty = resolver.stamp_duty(exempt_subtotal);

        let terms = profile
            .payment_terms_days
            .unwrap_or(self.config.default_payment_terms_days);
        let due_date = request
            .due_date
            .unwrap_or(request.invoice_date + Duration::days(i64::from(terms)));

        let payment_iban = match profile.preferred_payment_method {
            Some(PaymentMethod::BankTransfer) => self.config.invoice_iban.clone(),
            _ => None,
        };

        let notices = tax.notes.iter().cloned().collect();

        Ok(InvoiceDraft {
            work_order_id: work_order.id.clone(),
            client_id: work_order.client_id.clone(),
            bill_to_client_id: profile.id.clone(),
            bill_to_name: profile.display_name.clone(),
            bill_to_tax_id: profile.tax_id.clone(),
            bill_to_address: profile.invoice_address().map(str::to_string),
            claim_number: work_order.claim_number.clone(),
            invoice_date: request.invoice_date,
            due_date,
            lines,
            subtotal,
            vat,
            stamp_duty,
            total: subtotal + vat + stamp_duty,
            split_payment: profile.split_payment,
            payment_iban,
            notices,
            customer_notes: request.customer_notes.clone(),
            tax,
        })
    }
}

/// Labor/service items in order, then part usages in order.
fn flatten(work_order: &WorkOrderSnapshot) -> CoreResult<Vec<Candidate<'_>>> {
    let mut candidates = Vec::with_capacity(work_order.items.len() + work_order.parts.len());

    for item in &work_order.items {
        validate_quantity(item.quantity_hundredths)?;
        validate_price_cents(item.unit_price_cents)?;
        candidates.push(Candidate {
            line_type: item.item_type,
            description: &item.description,
            quantity: Quantity::from_hundredths(item.quantity_hundredths),
            unit_price: Money::from_cents(item.unit_price_cents),
            stored_rate: None,
        });
    }

    for part in &work_order.parts {
        validate_quantity(part.quantity_hundredths)?;
        validate_price_cents(part.unit_price_cents)?;
        candidates.push(Candidate {
            line_type: LineType::Part,
            description: &part.description,
            quantity: Quantity::from_hundredths(part.quantity_hundredths),
            unit_price: Money::from_cents(part.unit_price_cents),
            stored_rate: part.vat_rate_bps.map(TaxRate::from_bps),
        });
    }

    Ok(candidates)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tax::tests::profile;
    use crate::types::{PartUsage, VatRegime, WorkOrderItem};
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn work_order(items: Vec<WorkOrderItem>, parts: Vec<PartUsage>) -> WorkOrderSnapshot {
        WorkOrderSnapshot {
            id: "wo-1".into(),
            client_id: "client-1".into(),
            status: WorkOrderStatus::Completed,
            claim_number: None,
            items,
            parts,
        }
    }

    fn labor(hundredths: i64, cents: i64) -> WorkOrderItem {
        WorkOrderItem {
            item_type: LineType::Labor,
            description: "Manodopera".into(),
            quantity_hundredths: hundredths,
            unit_price_cents: cents,
        }
    }

    fn part(hundredths: i64, cents: i64, rate: Option<u32>) -> PartUsage {
        PartUsage {
            part_code: "FLT-001".into(),
            description: "Filtro olio".into(),
            quantity_hundredths: hundredths,
            unit_price_cents: cents,
            vat_rate_bps: rate,
        }
    }

    #[test]
    fn test_prices_items_then_parts() {
        let config = FiscalConfig::default();
        let wo = work_order(vec![labor(200, 4000)], vec![part(100, 1250, Some(1000))]);
        let draft = InvoiceBuilder::new(&config)
            .price(&wo, &profile(), None, &InvoiceRequest::on(date(2026, 3, 10)))
            .unwrap();

        assert_eq!(draft.lines.len(), 2);
        assert_eq!(draft.lines[0].line_type, LineType::Labor);
        assert_eq!(draft.lines[0].vat.cents(), 1760);
        assert_eq!(draft.lines[1].line_type, LineType::Part);
        assert_eq!(draft.lines[1].vat_rate.bps(), 1000);
        assert_eq!(draft.lines[1].vat.cents(), 125);
        assert_eq!(draft.subtotal.cents(), 9250);
        assert_eq!(draft.vat.cents(), 1885);
        assert_eq!(draft.stamp_duty, Money::zero());
        assert_eq!(draft.total.cents(), 11_135);
        assert_eq!(draft.due_date, date(2026, 4, 9));
    }

    fn declaration(limit_cents: i64) -> IntentDeclaration {
        IntentDeclaration {
            id: "decl-1".into(),
            client_id: "client-1".into(),
            protocol_number: "24011512345678-000001".into(),
            declaration_date: date(2026, 1, 15),
            amount_limit_cents: limit_cents,
            used_amount_cents: 0,
            expiry_date: date(2026, 12, 31),
            is_active: true,
        }
    }

    #[test]
    fn test_declaration_covers_taxed_total_not_just_pretax() {
        let config = FiscalConfig::default();
        let builder = InvoiceBuilder::new(&config);
        let wo = work_order(vec![labor(100, 10_000)], vec![]);
        let request = InvoiceRequest::on(date(2026, 3, 10));

        // Exactly the pretax amount: the exempt invoice would still total 102.00.
        let err = builder
            .price(&wo, &profile(), Some(&declaration(10_000)), &request)
            .unwrap_err();
        match err {
            CoreError::PlafondExceeded { remaining, requested, .. } => {
                assert_eq!(remaining.cents(), 10_000);
                assert_eq!(requested.cents(), 12_200);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let draft = builder
            .price(&wo, &profile(), Some(&declaration(12_200)), &request)
            .unwrap();
        assert_eq!(draft.vat, Money::zero());
        assert_eq!(draft.stamp_duty.cents(), 200);
        assert_eq!(draft.total.cents(), 10_200);

        let number = DocumentNumber::next_after(crate::types::DocumentFamily::Invoice, 2026, None).unwrap();
        let invoice = draft.into_invoice(number, Utc::now());
        assert_eq!(invoice.intent_declaration_id.as_deref(), Some("decl-1"));
        assert_eq!(invoice.plafond_used_cents, 10_000);
    }

    #[test]
    fn test_discount_applies_per_line_before_vat() {
        let config = FiscalConfig::default();
        let mut p = profile();
        p.default_discount_bps = 1000;
        let wo = work_order(vec![labor(100, 3333), labor(100, 3333)], vec![]);
        let draft = InvoiceBuilder::new(&config)
            .price(&wo, &p, None, &InvoiceRequest::on(date(2026, 3, 10)))
            .unwrap();

        // Per line: discount 333.3 → 333, subtotal 3000, vat 660
        assert!(draft.lines.iter().all(|l| l.discount.cents() == 333));
        assert_eq!(draft.subtotal.cents(), 6000);
        assert_eq!(draft.vat.cents(), 1320);
    }

    #[test]
    fn test_rejects_unfinished_and_invoiced_work_orders() {
        let config = FiscalConfig::default();
        let builder = InvoiceBuilder::new(&config);
        let request = InvoiceRequest::on(date(2026, 3, 10));

        let mut wo = work_order(vec![labor(100, 1000)], vec![]);
        wo.status = WorkOrderStatus::InProgress;
        assert!(matches!(
            builder.price(&wo, &profile(), None, &request),
            Err(CoreError::WorkOrderNotCompleted { .. })
        ));

        wo.status = WorkOrderStatus::Invoiced;
        assert!(matches!(
            builder.price(&wo, &profile(), None, &request),
            Err(CoreError::AlreadyInvoiced { .. })
        ));
    }

    #[test]
    fn test_rejects_zero_billable_amount() {
        let config = FiscalConfig::default();
        let wo = work_order(vec![labor(100, 0)], vec![]);
        let err = InvoiceBuilder::new(&config)
            .price(&wo, &profile(), None, &InvoiceRequest::on(date(2026, 3, 10)))
            .unwrap_err();
        assert!(matches!(err, CoreError::NothingToInvoice { .. }));
    }

    #[test]
    fn test_stamp_duty_boundary_on_exempt_invoice() {
        let config = FiscalConfig::default();
        let mut p = profile();
        p.vat_regime = VatRegime::FlatRate;
        let builder = InvoiceBuilder::new(&config);
        let request = InvoiceRequest::on(date(2026, 3, 10));

        let at_threshold = builder
            .price(&work_order(vec![labor(100, 7747)], vec![]), &p, None, &request)
            .unwrap();
        assert_eq!(at_threshold.stamp_duty, Money::zero());
        assert_eq!(at_threshold.total.cents(), 7747);

        let above = builder
            .price(&work_order(vec![labor(100, 7748)], vec![]), &p, None, &request)
            .unwrap();
        assert_eq!(above.stamp_duty.cents(), 200);
        assert_eq!(above.total.cents(), 7948);
        assert_eq!(above.tax.exemption_code.as_deref(), Some("N3.5"));
    }

    #[test]
    fn test_zero_rated_parts_count_toward_stamp_duty() {
        let config = FiscalConfig::default();
        let wo = work_order(vec![labor(100, 1000)], vec![part(100, 8000, Some(0))]);
        let draft = InvoiceBuilder::new(&config)
            .price(&wo, &profile(), None, &InvoiceRequest::on(date(2026, 3, 10)))
            .unwrap();
        assert_eq!(draft.stamp_duty.cents(), 200);
        assert_eq!(draft.total, draft.subtotal + draft.vat + draft.stamp_duty);
    }

    #[test]
    fn test_bank_transfer_profile_gets_iban_and_terms() {
        let config = FiscalConfig {
            invoice_iban: Some("IT60X0542811101000000123456".into()),
            ..FiscalConfig::default()
        };
        let mut p = profile();
        p.preferred_payment_method = Some(PaymentMethod::BankTransfer);
        p.payment_terms_days = Some(60);
        p.billing_address = Some("Casella Postale 12".into());
        let draft = InvoiceBuilder::new(&config)
            .price(&work_order(vec![labor(100, 1000)], vec![]), &p, None, &InvoiceRequest::on(date(2026, 1, 31)))
            .unwrap();

        assert_eq!(draft.payment_iban, config.invoice_iban);
        assert_eq!(draft.due_date, date(2026, 4, 1));
        assert_eq!(draft.bill_to_address.as_deref(), Some("Casella Postale 12"));
    }

    #[test]
    fn test_into_invoice_numbers_and_links_lines() {
        let config = FiscalConfig::default();
        let draft = InvoiceBuilder::new(&config)
            .price(&work_order(vec![labor(150, 4550)], vec![]), &profile(), None, &InvoiceRequest::on(date(2026, 3, 10)))
            .unwrap();
        let number = DocumentNumber::next_after(crate::types::DocumentFamily::Invoice, 2026, None).unwrap();
        let invoice = draft.into_invoice(number, Utc::now());

        assert_eq!(invoice.invoice_number, "2026/0001");
        assert_eq!(invoice.payment_reference, "2026/0001");
        assert!(invoice.lines.iter().all(|l| l.invoice_id == invoice.id));
        assert!(invoice.totals_are_consistent());
    }

    proptest! {
        #[test]
        fn totals_identity_holds(
            lines in prop::collection::vec((1i64..10_000i64, 0i64..500_000i64, prop::option::of(0u32..2_500u32)), 1..12),
            discount in 0u32..5_000u32,
        ) {
            let config = FiscalConfig::default();
            let mut p = profile();
            p.default_discount_bps = discount;
            let parts = lines
                .iter()
                .map(|(q, c, r)| part(*q, *c, *r))
                .collect();
            let wo = work_order(vec![labor(100, 1000)], parts);
            let draft = InvoiceBuilder::new(&config)
                .price(&wo, &p, None, &InvoiceRequest::on(date(2026, 3, 10)))
                .unwrap();

            let line_subtotal: Money = draft.lines.iter().map(|l| l.subtotal).sum();
            let line_vat: Money = draft.lines.iter().map(|l| l.vat).sum();
            prop_assert_eq!(draft.subtotal, line_subtotal);
            prop_assert_eq!(draft.vat, line_vat);
            prop_assert_eq!(draft.total, draft.subtotal + draft.vat + draft.stamp_duty);
        }
    }
}
