//! # Fiscal Configuration
//!
//! Process-wide fiscal constants, passed explicitly into the tax resolver and
//! the invoice builder.
//!
//! ## Configuration Sources (Priority Order)
//! 1. Environment variables (`OFFICINA_*`)
//! 2. Defaults (this file)
//!
//! ## Environment Variables
//! | Variable                         | Example      | Field                        |
//! |----------------------------------|--------------|------------------------------|
//! | `OFFICINA_STAMP_DUTY_AMOUNT`     | `2.00`       | `stamp_duty_amount`          |
//! | `OFFICINA_STAMP_DUTY_THRESHOLD`  | `77,47`      | `stamp_duty_threshold`       |
//! | `OFFICINA_PAYMENT_TERMS_DAYS`    | `30`         | `default_payment_terms_days` |
//! | `OFFICINA_DEFAULT_VAT_RATE`      | `22`         | `default_vat_rate`           |
//! | `OFFICINA_INVOICE_IBAN`          | `IT60X05...` | `invoice_iban`               |

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::TaxRate;
use crate::validation::{validate_iban, validate_tax_rate};

/// Fiscal constants for invoice pricing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiscalConfig {
    /// Marca da bollo added to qualifying invoices.
    pub stamp_duty_amount: Money,

    /// Stamp duty applies when the exempt subtotal is strictly above this.
    pub stamp_duty_threshold: Money,

    /// Terms used when the billing profile has none.
    pub default_payment_terms_days: u32,

    /// Rate used when the billing profile has no usable default.
    pub default_vat_rate: TaxRate,

    /// Printed on invoices settled by bank transfer.
    pub invoice_iban: Option<String>,

    /// Minor-unit digits of the ledger currency.
    pub currency_decimals: u8,
}

impl Default for FiscalConfig {
    /// Italian fiscal defaults.
    ///
    /// ## Default Values
    /// - Stamp duty: €2.00 above €77.47 of exempt amount
    /// - Payment terms: 30 days
    /// - VAT: 22%
    fn default() -> Self {
        FiscalConfig {
            stamp_duty_amount: Money::from_cents(200),
            stamp_duty_threshold: Money::from_cents(7747),
            default_payment_terms_days: 30,
            default_vat_rate: TaxRate::STANDARD,
            invoice_iban: None,
            currency_decimals: 2,
        }
    }
}

impl FiscalConfig {
    /// Builds the configuration from `OFFICINA_*` environment variables.
    ///
    /// A malformed value is an error rather than a silent fallback.
    pub fn from_env() -> Result<Self, ValidationError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = FiscalConfig::default();

        if let Some(raw) = lookup("OFFICINA_STAMP_DUTY_AMOUNT") {
            config.stamp_duty_amount = parse_amount("OFFICINA_STAMP_DUTY_AMOUNT", &raw)?;
        }

        if let Some(raw) = lookup("OFFICINA_STAMP_DUTY_THRESHOLD") {
            config.stamp_duty_threshold = parse_amount("OFFICINA_STAMP_DUTY_THRESHOLD", &raw)?;
        }

        if let Some(raw) = lookup("OFFICINA_PAYMENT_TERMS_DAYS") {
            config.default_payment_terms_days =
                raw.trim()
                    .parse()
                    .map_err(|_| ValidationError::InvalidFormat {
                        field: "OFFICINA_PAYMENT_TERMS_DAYS".to_string(),
                        reason: format!("'{}' is not a number of days", raw),
                    })?;
        }

        if let Some(raw) = lookup("OFFICINA_DEFAULT_VAT_RATE") {
            // Percent with up to two decimals: "22", "4,5"
            let bps = parse_amount("OFFICINA_DEFAULT_VAT_RATE", &raw)?.cents();
            let bps = u32::try_from(bps).map_err(|_| ValidationError::OutOfRange {
                field: "OFFICINA_DEFAULT_VAT_RATE".to_string(),
                min: 0,
                max: 100,
            })?;
            validate_tax_rate(bps)?;
            config.default_vat_rate = TaxRate::from_bps(bps);
        }

        if let Some(raw) = lookup("OFFICINA_INVOICE_IBAN") {
            let iban: String = raw.split_whitespace().collect();
            if !iban.is_empty() {
                validate_iban(&iban)?;
                config.invoice_iban = Some(iban);
            }
        }

        Ok(config)
    }

    /// Formats a cent amount for notes and logs, e.g. `€12.34`.
    pub fn format_amount(&self, amount: Money) -> String {
        let cents = amount.cents();
        let divisor = 10_i64.pow(self.currency_decimals as u32);
        let whole = cents / divisor;
        let frac = (cents % divisor).abs();

        format!(
            "{}€{}",
            if cents < 0 { "-" } else { "" },
            if self.currency_decimals > 0 {
                format!(
                    "{}.{:0width$}",
                    whole.abs(),
                    frac,
                    width = self.currency_decimals as usize
                )
            } else {
                whole.abs().to_string()
            }
        )
    }
}

fn parse_amount(field: &str, raw: &str) -> Result<Money, ValidationError> {
    match Money::parse_decimal(raw) {
        Some(amount) if !amount.is_negative() => Ok(amount),
        _ => Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: format!("'{}' is not a decimal amount", raw),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = FiscalConfig::default();
        assert_eq!(config.stamp_duty_amount.cents(), 200);
        assert_eq!(config.stamp_duty_threshold.cents(), 7747);
        assert_eq!(config.default_payment_terms_days, 30);
        assert_eq!(config.default_vat_rate.bps(), 2200);
    }

    #[test]
    fn test_overrides() {
        let config = FiscalConfig::from_lookup(lookup(&[
            ("OFFICINA_STAMP_DUTY_THRESHOLD", "77,47"),
            ("OFFICINA_STAMP_DUTY_AMOUNT", "2"),
            ("OFFICINA_PAYMENT_TERMS_DAYS", "60"),
            ("OFFICINA_DEFAULT_VAT_RATE", "10"),
            ("OFFICINA_INVOICE_IBAN", "IT60 X054 2811 1010 0000 0123 456"),
        ]))
        .unwrap();

        assert_eq!(config.stamp_duty_threshold.cents(), 7747);
        assert_eq!(config.stamp_duty_amount.cents(), 200);
        assert_eq!(config.default_payment_terms_days, 60);
        assert_eq!(config.default_vat_rate.bps(), 1000);
        assert_eq!(config.invoice_iban.as_deref(), Some("IT60X0542811101000000123456"));
    }

    #[test]
    fn test_malformed_values_are_rejected() {
        assert!(FiscalConfig::from_lookup(lookup(&[("OFFICINA_STAMP_DUTY_AMOUNT", "two")])).is_err());
        assert!(FiscalConfig::from_lookup(lookup(&[("OFFICINA_PAYMENT_TERMS_DAYS", "-3")])).is_err());
        assert!(FiscalConfig::from_lookup(lookup(&[("OFFICINA_DEFAULT_VAT_RATE", "150")])).is_err());
    }

    #[test]
    fn test_format_amount() {
        let config = FiscalConfig::default();
        assert_eq!(config.format_amount(Money::from_cents(1234)), "€12.34");
        assert_eq!(config.format_amount(Money::from_cents(-5)), "-€0.05");
    }
}
