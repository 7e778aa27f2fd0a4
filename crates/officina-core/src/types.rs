//! # Domain Types
//!
//! Ledger records and the collaborator snapshots they are built from.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  INPUTS (read from collaborators)                                      │
//! │  ┌──────────────────┐  ┌──────────────────┐  ┌────────────────────┐    │
//! │  │ WorkOrderSnapshot│  │ BillingProfile   │  │ IntentDeclaration  │    │
//! │  │  items, parts    │  │  regime, terms   │  │  limit, used       │    │
//! │  └────────┬─────────┘  └────────┬─────────┘  └─────────┬──────────┘    │
//! │           └─────────────────────┼──────────────────────┘               │
//! │                                 ▼                                       │
//! │  LEDGER RECORDS (persisted, immutable money)                           │
//! │  ┌──────────────┐ 1:N ┌──────────────┐                                 │
//! │  │   Invoice    │────►│ InvoiceLine  │                                 │
//! │  └──────┬───────┘     └──────────────┘                                 │
//! │         │ 1:N                                                           │
//! │         ├──────────► PaymentAllocation ◄──── N:1 ──── Payment           │
//! │         │ 1:N                                                           │
//! │         └──────────► CreditNote ──► CreditNoteLine                     │
//! │                                                                         │
//! │  Deposit: pending ──► applied (Payment + 1 Allocation) | refunded      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Storage Convention
//! Persisted records carry raw integer columns (`*_cents`, `*_bps`,
//! `quantity_hundredths`) and expose typed accessors ([`Money`], [`Quantity`],
//! [`TaxRate`]). With the `sqlx` feature they decode straight from rows.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::money::{Money, Quantity};

// =============================================================================
// Rates
// =============================================================================

/// VAT rate in basis points (2200 = 22%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Italian standard rate.
    pub const STANDARD: TaxRate = TaxRate(2200);

    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Whole-percent constructor: `from_percent(22)` is 22%.
    #[inline]
    pub const fn from_percent(percent: u32) -> Self {
        TaxRate(percent * 100)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

impl fmt::Display for TaxRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

/// Line discount in basis points (1000 = 10%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DiscountRate(u32);

impl DiscountRate {
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        DiscountRate(bps)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        DiscountRate(0)
    }
}

impl Default for DiscountRate {
    fn default() -> Self {
        DiscountRate::zero()
    }
}

// =============================================================================
// Enumerations
// =============================================================================

/// Kind of invoiced work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum LineType {
    Labor,
    Service,
    Part,
}

/// How money reached the shop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    /// Card on the POS terminal.
    Pos,
    BankTransfer,
    Check,
    Other,
}

/// Work order lifecycle, owned by the work-order collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum WorkOrderStatus {
    Draft,
    InProgress,
    WaitingParts,
    Completed,
    Invoiced,
    Cancelled,
}

impl fmt::Display for WorkOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkOrderStatus::Draft => "draft",
            WorkOrderStatus::InProgress => "in_progress",
            WorkOrderStatus::WaitingParts => "waiting_parts",
            WorkOrderStatus::Completed => "completed",
            WorkOrderStatus::Invoiced => "invoiced",
            WorkOrderStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Italian VAT regime code carried on the billing profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[ts(export)]
pub enum VatRegime {
    /// RF01: ordinary regime.
    #[serde(rename = "RF01")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "RF01"))]
    Ordinary,
    /// RF02: "contribuenti minimi".
    #[serde(rename = "RF02")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "RF02"))]
    Minimum,
    /// RF19: "regime forfettario".
    #[serde(rename = "RF19")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "RF19"))]
    FlatRate,
}

impl VatRegime {
    pub const fn code(&self) -> &'static str {
        match self {
            VatRegime::Ordinary => "RF01",
            VatRegime::Minimum => "RF02",
            VatRegime::FlatRate => "RF19",
        }
    }
}

impl Default for VatRegime {
    fn default() -> Self {
        VatRegime::Ordinary
    }
}

/// What happens when an invoice would push a client over its credit limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CreditLimitPolicy {
    Warn,
    Block,
}

impl Default for CreditLimitPolicy {
    fn default() -> Self {
        CreditLimitPolicy::Warn
    }
}

/// Derived payment status of an invoice. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Unpaid,
    Partial,
    Overdue,
    Paid,
    Credited,
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InvoiceStatus::Unpaid => "unpaid",
            InvoiceStatus::Partial => "partial",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Credited => "credited",
        };
        f.write_str(s)
    }
}

/// Deposit lifecycle: `pending → applied | refunded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DepositStatus {
    Pending,
    Applied,
    Refunded,
}

impl fmt::Display for DepositStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DepositStatus::Pending => "pending",
            DepositStatus::Applied => "applied",
            DepositStatus::Refunded => "refunded",
        };
        f.write_str(s)
    }
}

/// Whether a credit note reverses the whole invoice or selected lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CreditNoteKind {
    Full,
    Partial,
}

/// Numbering space of a fiscal document. Families never share numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFamily {
    Invoice,
    CreditNote,
}

impl fmt::Display for DocumentFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentFamily::Invoice => f.write_str("invoice"),
            DocumentFamily::CreditNote => f.write_str("credit note"),
        }
    }
}

// =============================================================================
// Collaborator Snapshots
// =============================================================================

/// Fiscal profile of the party an invoice is addressed to.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct BillingProfile {
    pub id: String,
    pub display_name: String,
    /// Partita IVA or codice fiscale.
    pub tax_id: Option<String>,
    pub address: Option<String>,
    /// Replaces `address` on invoices when set.
    pub billing_address: Option<String>,
    /// `None` falls back to the configured default rate.
    pub default_vat_rate_bps: Option<u32>,
    pub default_discount_bps: u32,
    /// `None` falls back to the configured default terms.
    pub payment_terms_days: Option<u32>,
    pub vat_regime: VatRegime,
    pub vat_exempt: bool,
    pub vat_exemption_code: Option<String>,
    pub split_payment: bool,
    /// `None` or zero means no limit.
    pub credit_limit_cents: Option<i64>,
    pub credit_limit_policy: CreditLimitPolicy,
    pub preferred_payment_method: Option<PaymentMethod>,
}

impl BillingProfile {
    #[inline]
    pub fn default_vat_rate(&self) -> Option<TaxRate> {
        self.default_vat_rate_bps.map(TaxRate::from_bps)
    }

    #[inline]
    pub fn default_discount(&self) -> DiscountRate {
        DiscountRate::from_bps(self.default_discount_bps)
    }

    /// The enforced credit limit, if any.
    pub fn credit_limit(&self) -> Option<Money> {
        self.credit_limit_cents
            .filter(|cents| *cents > 0)
            .map(Money::from_cents)
    }

    /// Address printed on the invoice.
    pub fn invoice_address(&self) -> Option<&str> {
        self.billing_address
            .as_deref()
            .or(self.address.as_deref())
    }
}

/// A labor or service entry on a work order.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct WorkOrderItem {
    pub item_type: LineType,
    pub description: String,
    pub quantity_hundredths: i64,
    pub unit_price_cents: i64,
}

/// A part consumed by a work order, priced at the time of use.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PartUsage {
    pub part_code: String,
    pub description: String,
    pub quantity_hundredths: i64,
    pub unit_price_cents: i64,
    /// The part's stored VAT rate; `None` uses the invoice rate.
    pub vat_rate_bps: Option<u32>,
}

/// Read-only view of a work order at invoicing time.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct WorkOrderSnapshot {
    pub id: String,
    pub client_id: String,
    pub status: WorkOrderStatus,
    /// Insurance claim reference, copied to the invoice.
    pub claim_number: Option<String>,
    pub items: Vec<WorkOrderItem>,
    pub parts: Vec<PartUsage>,
}

// =============================================================================
// Intent Declaration
// =============================================================================

/// A VAT-plafond "dichiarazione d'intento" lodged by a habitual exporter.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct IntentDeclaration {
    pub id: String,
    pub client_id: String,
    pub protocol_number: String,
    #[ts(as = "String")]
    pub declaration_date: NaiveDate,
    pub amount_limit_cents: i64,
    pub used_amount_cents: i64,
    #[ts(as = "String")]
    pub expiry_date: NaiveDate,
    pub is_active: bool,
}

impl IntentDeclaration {
    pub fn amount_limit(&self) -> Money {
        Money::from_cents(self.amount_limit_cents)
    }

    pub fn used_amount(&self) -> Money {
        Money::from_cents(self.used_amount_cents)
    }

    pub fn remaining_amount(&self) -> Money {
        self.amount_limit() - self.used_amount()
    }

    /// Active, already lodged and not expired on `date`.
    pub fn is_valid_on(&self, date: NaiveDate) -> bool {
        self.is_active && self.declaration_date <= date && self.expiry_date >= date
    }

    /// Consumed share of the ceiling in basis points.
    pub fn usage_bps(&self) -> u32 {
        if self.amount_limit_cents <= 0 {
            return 0;
        }
        (self.used_amount_cents as i128 * 10_000 / self.amount_limit_cents as i128) as u32
    }
}

// =============================================================================
// Invoice
// =============================================================================

/// A priced invoice line. Monetary columns are final once persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct InvoiceLine {
    pub id: String,
    pub invoice_id: String,
    /// 1-based position on the document.
    pub line_number: u32,
    pub line_type: LineType,
    pub description: String,
    pub quantity_hundredths: i64,
    pub unit_price_cents: i64,
    pub discount_bps: u32,
    pub discount_cents: i64,
    pub vat_rate_bps: u32,
    /// quantity × unit price − discount.
    pub subtotal_cents: i64,
    pub vat_cents: i64,
}

impl InvoiceLine {
    #[inline]
    pub fn quantity(&self) -> Quantity {
        Quantity::from_hundredths(self.quantity_hundredths)
    }

    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn discount_rate(&self) -> DiscountRate {
        DiscountRate::from_bps(self.discount_bps)
    }

    #[inline]
    pub fn vat_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.vat_rate_bps)
    }

    #[inline]
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.subtotal_cents)
    }

    #[inline]
    pub fn vat(&self) -> Money {
        Money::from_cents(self.vat_cents)
    }
}

/// A numbered invoice issued for one work order.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Invoice {
    pub id: String,
    /// `YYYY/NNNN`.
    pub invoice_number: String,
    pub period: i32,
    pub sequence: u32,
    pub work_order_id: String,
    /// Owner of the work order.
    pub client_id: String,
    /// Billing party the document is addressed to.
    pub bill_to_client_id: String,
    pub bill_to_name: String,
    pub bill_to_tax_id: Option<String>,
    pub bill_to_address: Option<String>,
    pub claim_number: Option<String>,
    #[ts(as = "String")]
    pub invoice_date: NaiveDate,
    #[ts(as = "String")]
    pub due_date: NaiveDate,
    pub subtotal_cents: i64,
    /// Headline rate; lines may carry their own.
    pub vat_rate_bps: u32,
    pub vat_cents: i64,
    pub stamp_duty_cents: i64,
    pub total_cents: i64,
    pub vat_exempt: bool,
    pub vat_exemption_code: Option<String>,
    pub split_payment: bool,
    pub intent_declaration_id: Option<String>,
    /// Plafond consumed by this invoice.
    pub plafond_used_cents: i64,
    pub notes: Option<String>,
    pub customer_notes: Option<String>,
    pub payment_iban: Option<String>,
    pub payment_reference: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    pub lines: Vec<InvoiceLine>,
}

impl Invoice {
    #[inline]
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.subtotal_cents)
    }

    #[inline]
    pub fn vat(&self) -> Money {
        Money::from_cents(self.vat_cents)
    }

    #[inline]
    pub fn stamp_duty(&self) -> Money {
        Money::from_cents(self.stamp_duty_cents)
    }

    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    /// Whether the stored totals obey `total = subtotal + vat + stamp` and
    /// `subtotal = Σ line.subtotal`.
    pub fn totals_are_consistent(&self) -> bool {
        let line_subtotal: Money = self.lines.iter().map(InvoiceLine::subtotal).sum();
        let line_vat: Money = self.lines.iter().map(InvoiceLine::vat).sum();
        self.total() == self.subtotal() + self.vat() + self.stamp_duty()
            && self.subtotal() == line_subtotal
            && self.vat() == line_vat
    }
}

// =============================================================================
// Payments
// =============================================================================

/// Money received from a client.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Payment {
    pub id: String,
    pub client_id: String,
    pub amount_cents: i64,
    #[ts(as = "String")]
    pub payment_date: NaiveDate,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    pub allocations: Vec<PaymentAllocation>,
}

impl Payment {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }

    /// Σ allocation amounts.
    pub fn allocated(&self) -> Money {
        self.allocations.iter().map(PaymentAllocation::amount).sum()
    }

    /// Credit left on the payment after its allocations.
    pub fn unallocated(&self) -> Money {
        self.amount() - self.allocated()
    }
}

/// The share of one payment assigned to one invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PaymentAllocation {
    pub id: String,
    pub payment_id: String,
    pub invoice_id: String,
    pub amount_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl PaymentAllocation {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Credit Notes
// =============================================================================

/// A reversed invoice line. Amounts are negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CreditNoteLine {
    pub id: String,
    pub credit_note_id: String,
    pub line_number: u32,
    pub source_line_id: String,
    pub line_type: LineType,
    pub description: String,
    pub quantity_hundredths: i64,
    /// Negated source unit price.
    pub unit_price_cents: i64,
    pub discount_bps: u32,
    pub discount_cents: i64,
    pub vat_rate_bps: u32,
    pub subtotal_cents: i64,
    pub vat_cents: i64,
}

impl CreditNoteLine {
    #[inline]
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.subtotal_cents)
    }

    #[inline]
    pub fn vat(&self) -> Money {
        Money::from_cents(self.vat_cents)
    }
}

/// A negative-valued document reversing all or part of an invoice.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CreditNote {
    pub id: String,
    /// `NC-YYYY/NNNN`.
    pub credit_note_number: String,
    pub period: i32,
    pub sequence: u32,
    pub invoice_id: String,
    pub client_id: String,
    #[ts(as = "String")]
    pub credit_note_date: NaiveDate,
    pub kind: CreditNoteKind,
    pub reason: String,
    pub subtotal_cents: i64,
    pub vat_cents: i64,
    pub stamp_duty_cents: i64,
    pub total_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    pub lines: Vec<CreditNoteLine>,
}

impl CreditNote {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

// =============================================================================
// Deposits
// =============================================================================

/// A pre-payment taken before a work order is invoiced.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Deposit {
    pub id: String,
    pub client_id: String,
    pub work_order_id: Option<String>,
    pub amount_cents: i64,
    pub method: PaymentMethod,
    #[ts(as = "String")]
    pub deposit_date: NaiveDate,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub status: DepositStatus,
    /// Set once applied.
    pub invoice_id: Option<String>,
    /// Set once applied.
    pub payment_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Deposit {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Derived Views
// =============================================================================

/// An invoice with its settlement history and derived figures, as exposed to
/// rendering and reporting layers.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InvoiceView {
    pub invoice: Invoice,
    pub allocations: Vec<PaymentAllocation>,
    pub credit_notes: Vec<CreditNote>,
    pub paid_cents: i64,
    pub credited_cents: i64,
    pub remaining_cents: i64,
    pub status: InvoiceStatus,
}

/// Aggregates over invoices dated within a range.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RevenueReport {
    pub invoice_count: u32,
    pub subtotal_cents: i64,
    pub vat_cents: i64,
    pub stamp_duty_cents: i64,
    pub total_cents: i64,
    pub collected_cents: i64,
    /// Negative: Σ credit note totals.
    pub credited_cents: i64,
    /// total + credited.
    pub net_cents: i64,
}

/// One row of an invoice listing: the header with its derived figures.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InvoiceSummary {
    pub invoice: Invoice,
    pub paid_cents: i64,
    pub credited_cents: i64,
    pub remaining_cents: i64,
    pub status: InvoiceStatus,
}

/// A payment with its allocations and what is left of it.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentView {
    pub payment: Payment,
    pub allocated_cents: i64,
    pub unallocated_cents: i64,
}

impl From<Payment> for PaymentView {
    fn from(payment: Payment) -> Self {
        PaymentView {
            allocated_cents: payment.allocated().cents(),
            unallocated_cents: payment.unallocated().cents(),
            payment,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn declaration(limit: i64, used: i64) -> IntentDeclaration {
        IntentDeclaration {
            id: "d1".into(),
            client_id: "c1".into(),
            protocol_number: "2026/12".into(),
            declaration_date: NaiveDate::from_ymd_opt(2026, 1, 10).unwrap(),
            amount_limit_cents: limit,
            used_amount_cents: used,
            expiry_date: NaiveDate::from_ymd_opt(2026, 12, 31).unwrap(),
            is_active: true,
        }
    }

    #[test]
    fn test_declaration_remaining_and_usage() {
        let d = declaration(1_000_000, 250_000);
        assert_eq!(d.remaining_amount(), Money::from_cents(750_000));
        assert_eq!(d.usage_bps(), 2500);
    }

    #[test]
    fn test_declaration_validity_window() {
        let d = declaration(100, 0);
        assert!(d.is_valid_on(NaiveDate::from_ymd_opt(2026, 12, 31).unwrap()));
        assert!(!d.is_valid_on(NaiveDate::from_ymd_opt(2027, 1, 1).unwrap()));
        assert!(!d.is_valid_on(NaiveDate::from_ymd_opt(2026, 1, 9).unwrap()));

        let inactive = IntentDeclaration { is_active: false, ..d };
        assert!(!inactive.is_valid_on(NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()));
    }

    #[test]
    fn test_vat_regime_serializes_as_code() {
        assert_eq!(serde_json::to_string(&VatRegime::FlatRate).unwrap(), "\"RF19\"");
        let parsed: VatRegime = serde_json::from_str("\"RF02\"").unwrap();
        assert_eq!(parsed, VatRegime::Minimum);
        assert_eq!(VatRegime::Ordinary.code(), "RF01");
    }

    #[test]
    fn test_status_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&InvoiceStatus::Overdue).unwrap(), "\"overdue\"");
        assert_eq!(
            serde_json::to_string(&PaymentMethod::BankTransfer).unwrap(),
            "\"bank_transfer\""
        );
    }

    #[test]
    fn test_tax_rate_display() {
        assert_eq!(TaxRate::STANDARD.to_string(), "22.00%");
        assert_eq!(TaxRate::from_bps(450).to_string(), "4.50%");
    }
}
