//! # Tax Resolver
//!
//! Decides the VAT treatment of an invoice from the billing party's fiscal
//! profile and any VAT-plafond declaration, and whether stamp duty applies.
//!
//! ## Precedence (highest first)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. Declaration of intent (plafond)                                    │
//! │     valid on the invoice date?                                         │
//! │       ├── remaining >= total   → rate 0, code N3.5, consume pretax     │
//! │       └── remaining <  total   → PlafondExceeded (hard failure)        │
//! │     total = preliminary VAT-inclusive total, never below           │
//! │             pretax + the stamp duty the exempt invoice will carry      │
//! │                                                                         │
//! │  2. Regime RF19 (forfettario) / RF02 (minimi)                          │
//! │       → rate 0, code N3.5, regime legal notice                         │
//! │                                                                         │
//! │  3. Exemption flag on the profile                                      │
//! │       → rate 0, the profile's own exemption code                       │
//! │                                                                         │
//! │  4. Taxable                                                            │
//! │       → caller override, else profile default, else configured default │
//! │         (part lines keep their stored rate)                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Stamp Duty
//! Added when the zero-rated subtotal is **strictly** above the configured
//! threshold: €77.47 exempt pays nothing, €77.48 pays the duty.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::FiscalConfig;
use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{BillingProfile, IntentDeclaration, TaxRate, VatRegime};
use crate::validation::validate_tax_rate;

/// Nature code for operations under a declaration of intent.
pub const DECLARATION_EXEMPTION_CODE: &str = "N3.5";

const DECLARATION_NOTICE: &str =
    "Operazione effettuata ai sensi dell'art. 1, c. 100, L. 244/2007 - Dichiarazione di intento";
const FLAT_RATE_NOTICE: &str =
    "Operazione effettuata ai sensi dell'art. 1, commi 54-89, L. 190/2014 - Regime Forfettario";
const MINIMUM_NOTICE: &str =
    "Operazione effettuata ai sensi dell'art. 27, commi 1 e 2, D.L. 98/2011 - Regime dei Minimi";

// =============================================================================
// Decision
// =============================================================================

/// Which rule set the VAT treatment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxBasis {
    IntentDeclaration,
    Regime(VatRegime),
    ExemptionFlag,
    Taxable,
}

/// Plafond consumed by an invoice under a declaration of intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlafondUse {
    pub declaration_id: String,
    pub protocol_number: String,
    pub amount: Money,
}

/// The resolved VAT treatment of one invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxDecision {
    pub effective_rate: TaxRate,
    pub is_exempt: bool,
    pub exemption_code: Option<String>,
    /// Legal notice printed on the invoice.
    pub notes: Option<String>,
    pub basis: TaxBasis,
    pub plafond: Option<PlafondUse>,
}

impl TaxDecision {
    /// The rate for a single line.
    ///
    /// Exempt invoices zero every line; otherwise a line's stored rate (parts)
    /// wins over the invoice rate.
    pub fn line_rate(&self, stored: Option<TaxRate>) -> TaxRate {
        if self.is_exempt {
            TaxRate::zero()
        } else {
            stored.unwrap_or(self.effective_rate)
        }
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// What the resolver needs to know about the invoice being built.
#[derive(Debug, Clone, Copy)]
pub struct TaxRequest<'a> {
    pub profile: &'a BillingProfile,
    /// The declaration of intent the party holds for the invoice date, if any.
    pub declaration: Option<&'a IntentDeclaration>,
    pub invoice_date: NaiveDate,
    /// Σ line subtotals after discount.
    pub pretax_amount: Money,
    /// Σ line totals at the taxable rates, before any exemption is chosen.
    pub gross_amount: Money,
    pub rate_override: Option<TaxRate>,
}

/// Applies the closed Italian VAT rule set.
#[derive(Debug, Clone, Copy)]
pub struct TaxResolver<'a> {
    config: &'a FiscalConfig,
}

impl<'a> TaxResolver<'a> {
    pub fn new(config: &'a FiscalConfig) -> Self {
        TaxResolver { config }
    }

    /// Resolves the VAT treatment.
    ///
    /// ## Errors
    /// - [`CoreError::PlafondExceeded`] when a valid declaration cannot cover
    ///   the invoice total. There is no fallback to the taxable rate.
    /// - [`CoreError::Validation`] for an override above 100%.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let decision = TaxResolver::new(&config).resolve(TaxRequest {
    ///     profile: &profile,
    ///     declaration: None,
    ///     invoice_date,
    ///     pretax_amount: Money::from_cents(10_000),
    ///     gross_amount: Money::from_cents(12_200),
    ///     rate_override: None,
    /// })?;
    /// assert_eq!(decision.effective_rate, TaxRate::STANDARD);
    /// ```
    pub fn resolve(&self, request: TaxRequest<'_>) -> CoreResult<TaxDecision> {
        if let Some(rate) = request.rate_override {
            validate_tax_rate(rate.bps())?;
        }

        if let Some(declaration) = request
            .declaration
            .filter(|d| d.client_id == request.profile.id && d.is_valid_on(request.invoice_date))
        {
            let remaining = declaration.remaining_amount();
            let required = self.plafond_requirement(&request);
            if remaining < required {
                return Err(CoreError::PlafondExceeded {
                    protocol_number: declaration.protocol_number.clone(),
                    remaining,
                    requested: required,
                });
            }

            return Ok(TaxDecision {
                effective_rate: TaxRate::zero(),
                is_exempt: true,
                exemption_code: Some(DECLARATION_EXEMPTION_CODE.to_string()),
                notes: Some(format!(
                    "{} n. {} del {}",
                    DECLARATION_NOTICE,
                    declaration.protocol_number,
                    declaration.declaration_date.format("%d/%m/%Y")
                )),
                basis: TaxBasis::IntentDeclaration,
                plafond: Some(PlafondUse {
                    declaration_id: declaration.id.clone(),
                    protocol_number: declaration.protocol_number.clone(),
                    amount: request.pretax_amount,
                }),
            });
        }

        let regime_notice = match request.profile.vat_regime {
            VatRegime::FlatRate => Some(FLAT_RATE_NOTICE),
            VatRegime::Minimum => Some(MINIMUM_NOTICE),
            VatRegime::Ordinary => None,
        };
        if let Some(notice) = regime_notice {
            return Ok(TaxDecision {
                effective_rate: TaxRate::zero(),
                is_exempt: true,
                exemption_code: Some(DECLARATION_EXEMPTION_CODE.to_string()),
                notes: Some(notice.to_string()),
                basis: TaxBasis::Regime(request.profile.vat_regime),
                plafond: None,
            });
        }

        if request.profile.vat_exempt {
            return Ok(TaxDecision {
                effective_rate: TaxRate::zero(),
                is_exempt: true,
                exemption_code: request.profile.vat_exemption_code.clone(),
                notes: None,
                basis: TaxBasis::ExemptionFlag,
                plafond: None,
            });
        }

        Ok(TaxDecision {
            effective_rate: self.taxable_rate(request.profile, request.rate_override),
            is_exempt: false,
            exemption_code: None,
            notes: None,
            basis: TaxBasis::Taxable,
            plafond: None,
        })
    }

    /// The invoice rate when no exemption applies: caller override, else the
    /// profile default, else the configured default.
    pub fn taxable_rate(&self, profile: &BillingProfile, rate_override: Option<TaxRate>) -> TaxRate {
        rate_override
            .or_else(|| profile.default_vat_rate())
            .unwrap_or(self.config.default_vat_rate)
    }

    /// What a declaration must still cover for the invoice to go out under it.
    ///
    /// The preliminary VAT-inclusive total, and never less than what the
    /// exempt invoice will carry once stamp duty is added.
    pub fn plafond_requirement(&self, request: &TaxRequest<'_>) -> Money {
        let exempt_total = request.pretax_amount + self.stamp_duty(request.pretax_amount);
        request.gross_amount.max(exempt_total)
    }

    /// Stamp duty owed on an invoice with the given zero-rated subtotal.
    pub fn stamp_duty(&self, exempt_subtotal: Money) -> Money {
        if exempt_subtotal > self.config.stamp_duty_threshold {
            self.config.stamp_duty_amount
        } else {
            Money::zero()
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
