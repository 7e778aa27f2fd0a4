//! # Money Module
//!
//! Integer money and quantity arithmetic for the ledger.
//!
//! ## Rounding Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ROUND HALF-UP, SYMMETRIC AROUND ZERO                                   │
//! │                                                                         │
//! │    0.005 →  0.01        -0.005 → -0.01                                  │
//! │    0.004 →  0.00        -0.004 → -0.00                                  │
//! │                                                                         │
//! │  Every intermediate step of a line (gross, discount, VAT) is rounded   │
//! │  to the cent before the next step runs. Because rounding is symmetric, │
//! │  negating a line (credit notes) negates every rounded figure exactly:  │
//! │                                                                         │
//! │    vat(-x) == -vat(x)   for every amount and rate                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use officina_core::money::{Money, Quantity};
//! use officina_core::types::TaxRate;
//!
//! let unit_price = Money::from_cents(4550);          // €45.50
//! let hours = Quantity::from_hundredths(150);        // 1.50 h
//! let gross = unit_price.times(hours);               // €68.25
//! assert_eq!(gross.cents(), 6825);
//!
//! let vat = gross.calculate_tax(TaxRate::from_bps(2200));
//! assert_eq!(vat.cents(), 1502);                     // 15.015 → 15.02
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use ts_rs::TS;

use crate::types::{DiscountRate, TaxRate};

/// Divides and rounds half away from zero.
///
/// `denominator` must be positive.
pub(crate) fn round_half_up(numerator: i128, denominator: i128) -> i64 {
    let quotient = numerator / denominator;
    let remainder = numerator % denominator;
    let adjust = if remainder.abs() * 2 >= denominator {
        numerator.signum()
    } else {
        0
    };
    (quotient + adjust) as i64
}

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (euro cents).
///
/// ## Design Decisions
/// - **i64 (signed)**: credit notes carry negative amounts
/// - **No float constructor**: amounts enter as cents or as decimal strings
///
/// ## Where Money Flows
/// ```text
/// WorkOrderItem.unit_price ──► InvoiceLine.subtotal ──► Invoice.total
///                                                          │
/// Payment.amount ──► PaymentAllocation.amount ─────────────┘ (settles)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    ///
    /// ## Example
    /// ```rust
    /// use officina_core::money::Money;
    ///
    /// let stamp = Money::from_cents(200); // €2.00
    /// assert_eq!(stamp.cents(), 200);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Parses a decimal amount such as `"77.47"`, `"77,47"` or `"-3.5"`.
    ///
    /// At most two fractional digits are accepted; anything else is `None`.
    ///
    /// ## Example
    /// ```rust
    /// use officina_core::money::Money;
    ///
    /// assert_eq!(Money::parse_decimal("77,47"), Some(Money::from_cents(7747)));
    /// assert_eq!(Money::parse_decimal("2"), Some(Money::from_cents(200)));
    /// assert_eq!(Money::parse_decimal("1.234"), None);
    /// ```
    pub fn parse_decimal(input: &str) -> Option<Money> {
        let input = input.trim();
        let (negative, digits) = match input.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, input),
        };
        let normalized = digits.replace(',', ".");
        let (major, minor) = match normalized.split_once('.') {
            Some((major, minor)) => (major, minor),
            None => (normalized.as_str(), ""),
        };

        if major.is_empty() || !major.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        if minor.len() > 2 || !minor.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }

        let major: i64 = major.parse().ok()?;
        let minor: i64 = match minor.len() {
            0 => 0,
            1 => minor.parse::<i64>().ok()? * 10,
            _ => minor.parse().ok()?,
        };
        let cents = major.checked_mul(100)?.checked_add(minor)?;
        Some(Money(if negative { -cents } else { cents }))
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the whole-euro portion (truncated toward zero).
    #[inline]
    pub const fn units(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the cents portion (always 0-99).
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Returns the smaller of two amounts.
    #[inline]
    pub fn min(self, other: Money) -> Money {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }

    /// Calculates VAT on this amount, rounded half-up to the cent.
    ///
    /// ## Example
    /// ```rust
    /// use officina_core::money::Money;
    /// use officina_core::types::TaxRate;
    ///
    /// let base = Money::from_cents(1000);           // €10.00
    /// let vat = base.calculate_tax(TaxRate::from_bps(2200));
    /// assert_eq!(vat.cents(), 220);                 // €2.20
    ///
    /// // Symmetric: the credit-note side rounds to the exact negation
    /// let reversed = Money::from_cents(-1000).calculate_tax(TaxRate::from_bps(2200));
    /// assert_eq!(reversed.cents(), -220);
    /// ```
    pub fn calculate_tax(&self, rate: TaxRate) -> Money {
        self.basis_points(rate.bps())
    }

    /// Returns the discount amount (not the discounted total) for a rate.
    ///
    /// ## Example
    /// ```rust
    /// use officina_core::money::Money;
    /// use officina_core::types::DiscountRate;
    ///
    /// let gross = Money::from_cents(8333);
    /// let discount = gross.discount_amount(DiscountRate::from_bps(1000)); // 10%
    /// assert_eq!(discount.cents(), 833); // 833.3 → 833
    /// ```
    pub fn discount_amount(&self, rate: DiscountRate) -> Money {
        self.basis_points(rate.bps())
    }

    /// Multiplies a unit price by a fractional quantity, rounded half-up.
    ///
    /// ## Example
    /// ```rust
    /// use officina_core::money::{Money, Quantity};
    ///
    /// let hourly = Money::from_cents(3333);
    /// let total = hourly.times(Quantity::from_hundredths(150)); // 1.5 h
    /// assert_eq!(total.cents(), 5000); // 4999.5 → 5000
    /// ```
    pub fn times(&self, quantity: Quantity) -> Money {
        Money(round_half_up(
            self.0 as i128 * quantity.hundredths() as i128,
            100,
        ))
    }

    fn basis_points(&self, bps: u32) -> Money {
        Money(round_half_up(self.0 as i128 * bps as i128, 10_000))
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Shows money as `€12.34` / `-€5.50`. Debug aid, not localized output.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}€{}.{:02}", sign, self.units().abs(), self.cents_part())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + *m)
    }
}

// =============================================================================
// Quantity
// =============================================================================

/// A quantity with two decimal places, stored as hundredths.
///
/// Labor is billed in fractional hours (1.50 h = 150), parts in units
/// (2 pcs = 200).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Quantity(i64);

impl Quantity {
    #[inline]
    pub const fn from_hundredths(hundredths: i64) -> Self {
        Quantity(hundredths)
    }

    /// Whole units: `from_units(3)` is 3.00.
    #[inline]
    pub const fn from_units(units: i64) -> Self {
        Quantity(units * 100)
    }

    #[inline]
    pub const fn hundredths(&self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, (self.0 / 100).abs(), (self.0 % 100).abs())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.cents(), 1099);
        assert_eq!(money.units(), 10);
        assert_eq!(money.cents_part(), 99);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(7747).to_string(), "€77.47");
        assert_eq!(Money::from_cents(-550).to_string(), "-€5.50");
        assert_eq!(Money::zero().to_string(), "€0.00");
        assert_eq!(Quantity::from_hundredths(150).to_string(), "1.50");
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(Money::parse_decimal("77.47"), Some(Money::from_cents(7747)));
        assert_eq!(Money::parse_decimal("77,47"), Some(Money::from_cents(7747)));
        assert_eq!(Money::parse_decimal(" 2.5 "), Some(Money::from_cents(250)));
        assert_eq!(Money::parse_decimal("-3"), Some(Money::from_cents(-300)));
        assert_eq!(Money::parse_decimal(""), None);
        assert_eq!(Money::parse_decimal("abc"), None);
        assert_eq!(Money::parse_decimal("1.999"), None);
        assert_eq!(Money::parse_decimal(".50"), None);
    }

    #[test]
    fn test_half_up_rounding() {
        assert_eq!(round_half_up(5, 10), 1);
        assert_eq!(round_half_up(4, 10), 0);
        assert_eq!(round_half_up(-5, 10), -1);
        assert_eq!(round_half_up(-4, 10), 0);
        assert_eq!(round_half_up(15, 10), 2);
        assert_eq!(round_half_up(25, 10), 3);
    }

    #[test]
    fn test_tax_calculation_with_rounding() {
        // €68.25 at 22% = 15.015 → 15.02
        let tax = Money::from_cents(6825).calculate_tax(TaxRate::from_bps(2200));
        assert_eq!(tax.cents(), 1502);
    }

    #[test]
    fn test_times_fractional_quantity() {
        let price = Money::from_cents(4550);
        assert_eq!(price.times(Quantity::from_hundredths(150)).cents(), 6825);
        assert_eq!(price.times(Quantity::from_units(2)).cents(), 9100);
        assert_eq!(Money::from_cents(1).times(Quantity::from_hundredths(50)).cents(), 1);
    }

    #[test]
    fn test_sum() {
        let total: Money = [100, 250, -50].iter().map(|c| Money::from_cents(*c)).sum();
        assert_eq!(total.cents(), 300);
    }

    proptest! {
        /// Negating the base negates every rounded derivative exactly.
        #[test]
        fn rounding_is_sign_symmetric(
            cents in -10_000_000i64..10_000_000i64,
            bps in 0u32..10_000u32,
            qty in 1i64..100_000i64,
        ) {
            let m = Money::from_cents(cents);
            prop_assert_eq!((-m).calculate_tax(TaxRate::from_bps(bps)), -m.calculate_tax(TaxRate::from_bps(bps)));
            prop_assert_eq!((-m).discount_amount(DiscountRate::from_bps(bps)), -m.discount_amount(DiscountRate::from_bps(bps)));
            prop_assert_eq!((-m).times(Quantity::from_hundredths(qty)), -m.times(Quantity::from_hundredths(qty)));
        }

        /// Rounding error never exceeds half a cent.
        #[test]
        fn tax_error_is_at_most_half_a_cent(cents in 0i64..10_000_000i64, bps in 0u32..10_000u32) {
            let exact = cents as i128 * bps as i128;
            let rounded = Money::from_cents(cents).calculate_tax(TaxRate::from_bps(bps)).cents() as i128 * 10_000;
            prop_assert!((rounded - exact).abs() * 2 <= 10_000);
        }
    }
}
