//! # Validation Module
//!
//! Input checks run before any ledger rule is evaluated.
//!
//! ## Validation Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Layer 1: THIS MODULE - shape of the request                           │
//! │  ├── amounts positive, rates within 0-100%                             │
//! │  └── identifiers well-formed, reasons present                          │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Ledger rules (allocation, credit_note, tax, ...)             │
//! │  └── over-allocation, over-reversal, plafond, credit limit             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: SQLite constraints                                           │
//! │  ├── CHECK (amount_cents > 0), CHECK (used <= limit)                   │
//! │  └── UNIQUE (invoice_number), UNIQUE (payment_id, invoice_id)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::{MAX_LINE_QUANTITY, MAX_REASON_LENGTH};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a credit-note reason.
///
/// ## Rules
/// - Must not be blank
/// - At most 500 characters
///
/// ## Returns
/// The trimmed reason.
pub fn validate_reason(reason: &str) -> ValidationResult<String> {
    let reason = reason.trim();

    if reason.is_empty() {
        return Err(ValidationError::Required {
            field: "reason".to_string(),
        });
    }

    if reason.chars().count() > MAX_REASON_LENGTH {
        return Err(ValidationError::TooLong {
            field: "reason".to_string(),
            max: MAX_REASON_LENGTH,
        });
    }

    Ok(reason.to_string())
}

/// Validates an IBAN's shape (country, check digits, 11-30 alphanumerics).
///
/// ## Example
/// ```rust
/// use officina_core::validation::validate_iban;
///
/// assert!(validate_iban("IT60X0542811101000000123456").is_ok());
/// assert!(validate_iban("IT60 X054").is_err());
/// ```
pub fn validate_iban(iban: &str) -> ValidationResult<()> {
    let invalid = |reason: &str| ValidationError::InvalidFormat {
        field: "iban".to_string(),
        reason: reason.to_string(),
    };

    if !(15..=34).contains(&iban.len()) {
        return Err(invalid("must be 15 to 34 characters"));
    }

    let bytes = iban.as_bytes();
    if !bytes[..2].iter().all(u8::is_ascii_uppercase) || !bytes[2..4].iter().all(u8::is_ascii_digit) {
        return Err(invalid("must start with a country code and two check digits"));
    }

    if !bytes[4..].iter().all(u8::is_ascii_alphanumeric) {
        return Err(invalid("must contain only letters and digits"));
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity in hundredths.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed [`MAX_LINE_QUANTITY`]
pub fn validate_quantity(hundredths: i64) -> ValidationResult<()> {
    if hundredths <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if hundredths > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a unit price in cents. Zero is allowed (warranty work).
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: "unit_price".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates a payment, deposit or allocation amount in cents.
///
/// ## Example
/// ```rust
/// use officina_core::validation::validate_amount;
///
/// assert!(validate_amount("payment amount", 15000).is_ok());
/// assert!(validate_amount("payment amount", 0).is_err());
/// ```
pub fn validate_amount(field: &str, cents: i64) -> ValidationResult<()> {
    if cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }

    Ok(())
}

/// Validates a VAT rate in basis points (0% to 100%).
pub fn validate_tax_rate(bps: u32) -> ValidationResult<()> {
    if bps > 10_000 {
        return Err(ValidationError::OutOfRange {
            field: "vat_rate".to_string(),
            min: 0,
            max: 10_000,
        });
    }

    Ok(())
}

/// Validates a discount in basis points (0% to 100%).
pub fn validate_discount(bps: u32) -> ValidationResult<()> {
    if bps > 10_000 {
        return Err(ValidationError::OutOfRange {
            field: "discount".to_string(),
            min: 0,
            max: 10_000,
        });
    }

    Ok(())
}

// =============================================================================
// UUID Validators
// =============================================================================

/// Validates a UUID string.
pub fn validate_uuid(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_reason() {
        assert_eq!(validate_reason("  wrong plate  ").unwrap(), "wrong plate");
        assert!(validate_reason("   ").is_err());
        assert!(validate_reason(&"x".repeat(501)).is_err());
    }

    #[test]
    fn test_validate_iban() {
        assert!(validate_iban("IT60X0542811101000000123456").is_ok());
        assert!(validate_iban("it60X0542811101000000123456").is_err());
        assert!(validate_iban("ITXX0542811101000000123456").is_err());
        assert!(validate_iban("IT60").is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(150).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-100).is_err());
        assert!(validate_quantity(MAX_LINE_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_validate_amounts_and_rates() {
        assert!(validate_price_cents(0).is_ok());
        assert!(validate_price_cents(-1).is_err());
        assert!(validate_amount("amount", 1).is_ok());
        assert!(validate_amount("amount", -1).is_err());
        assert!(validate_tax_rate(2200).is_ok());
        assert!(validate_tax_rate(10_001).is_err());
        assert!(validate_discount(10_000).is_ok());
        assert!(validate_discount(10_001).is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("invoice_id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_uuid("invoice_id", "").is_err());
        assert!(validate_uuid("invoice_id", "not-a-uuid").is_err());
    }
}
