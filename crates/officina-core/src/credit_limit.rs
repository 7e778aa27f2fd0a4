//! # Credit Limit
//!
//! Exposure of a billing party is what it has been invoiced minus what has
//! been allocated against those invoices. A prospective invoice is checked
//! against the party's limit under its policy:
//!
//! ```text
//! exposure + invoice_total > limit ?
//!     ├── no limit / within limit → allowed
//!     ├── policy warn             → allowed, warning notice on the invoice
//!     └── policy block            → CreditLimitExceeded
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{BillingProfile, CreditLimitPolicy};

/// Outstanding exposure from ledger sums.
///
/// ## Example
/// ```rust
/// use officina_core::credit_limit::exposure;
/// use officina_core::money::Money;
///
/// let e = exposure(Money::from_cents(80_000), Money::from_cents(40_000));
/// assert_eq!(e, Money::from_cents(40_000));
/// ```
pub fn exposure(invoiced_total: Money, allocated_total: Money) -> Money {
    invoiced_total - allocated_total
}

/// Outcome of a credit check that did not block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditCheck {
    pub exposure: Money,
    pub limit: Option<Money>,
    /// Set when the limit is exceeded under the warn policy.
    pub warning: Option<String>,
}

/// Checks a prospective invoice of `amount` against the profile's limit.
pub fn check(profile: &BillingProfile, exposure: Money, amount: Money) -> CoreResult<CreditCheck> {
    let limit = profile.credit_limit();

    let Some(limit) = limit else {
        return Ok(CreditCheck {
            exposure,
            limit: None,
            warning: None,
        });
    };

    if exposure + amount <= limit {
        return Ok(CreditCheck {
            exposure,
            limit: Some(limit),
            warning: None,
        });
    }

    match profile.credit_limit_policy {
        CreditLimitPolicy::Block => Err(CoreError::CreditLimitExceeded {
            client_id: profile.id.clone(),
            limit,
            exposure,
            amount,
        }),
        CreditLimitPolicy::Warn => Ok(CreditCheck {
            exposure,
            limit: Some(limit),
            warning: Some(format!(
                "Attenzione: fido cliente superato (fido {}, esposizione {}, fattura {})",
                limit, exposure, amount
            )),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tax::tests::profile;

    fn limited(policy: CreditLimitPolicy) -> BillingProfile {
        let mut p = profile();
        p.credit_limit_cents = Some(100_000);
        p.credit_limit_policy = policy;
        p
    }

    #[test]
    fn test_block_policy_rejects_over_limit() {
        // Limit 1000, invoiced 800, paid 400: exposure 400.
        let p = limited(CreditLimitPolicy::Block);
        let e = exposure(Money::from_cents(80_000), Money::from_cents(40_000));

        assert!(check(&p, e, Money::from_cents(60_000)).is_ok());
        let err = check(&p, e, Money::from_cents(60_001)).unwrap_err();
        assert!(matches!(err, CoreError::CreditLimitExceeded { .. }));
    }

    #[test]
    fn test_warn_policy_allows_with_notice() {
        let p = limited(CreditLimitPolicy::Warn);
        let result = check(&p, Money::from_cents(40_000), Money::from_cents(70_000)).unwrap();
        assert!(result.warning.unwrap().contains("€1000.00"));
    }

    #[test]
    fn test_no_limit_never_blocks() {
        let mut p = profile();
        p.credit_limit_policy = CreditLimitPolicy::Block;
        p.credit_limit_cents = Some(0);
        let result = check(&p, Money::from_cents(1_000_000), Money::from_cents(1_000_000)).unwrap();
        assert_eq!(result.limit, None);
        assert!(result.warning.is_none());
    }
}
