//! # Document Numbering
//!
//! Formatting and succession rules for fiscal document numbers. The storage
//! side (reading the last issued number under a lock) lives in officina-db.
//!
//! ## Number Format
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │   Invoice:      2026/0001, 2026/0002, ... 2026/9999                     │
//! │   Credit note:  NC-2026/0001, ...                                       │
//! │                 └┬┘ └─┬┘ └─┬┘                                           │
//! │          family prefix │   sequence, zero-padded to 4 digits            │
//! │                     period (fiscal year)                                │
//! │                                                                         │
//! │   Each (family, period) pair is an independent, gap-free space.        │
//! │   2026/9999 is the last invoice of 2026: the next one is an error,      │
//! │   never a wraparound and never 2026/10000.                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, CoreResult};
use crate::types::DocumentFamily;
use crate::DOCUMENT_NUMBER_CAPACITY;

impl DocumentFamily {
    /// Prefix that keeps the families' numbers visually disjoint.
    pub const fn prefix(&self) -> &'static str {
        match self {
            DocumentFamily::Invoice => "",
            DocumentFamily::CreditNote => "NC-",
        }
    }
}

/// The numbering period a document dated `date` belongs to.
pub fn period_of(date: NaiveDate) -> i32 {
    date.year()
}

/// A fiscal document number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentNumber {
    pub family: DocumentFamily,
    pub period: i32,
    pub sequence: u32,
}

impl DocumentNumber {
    /// The number following `last` in its period, or the first one when the
    /// period is empty.
    ///
    /// ## Example
    /// ```rust
    /// use officina_core::numbering::DocumentNumber;
    /// use officina_core::types::DocumentFamily;
    ///
    /// let first = DocumentNumber::next_after(DocumentFamily::Invoice, 2026, None).unwrap();
    /// assert_eq!(first.to_string(), "2026/0001");
    ///
    /// let next = DocumentNumber::next_after(DocumentFamily::CreditNote, 2026, Some(41)).unwrap();
    /// assert_eq!(next.to_string(), "NC-2026/0042");
    ///
    /// assert!(DocumentNumber::next_after(DocumentFamily::Invoice, 2026, Some(9999)).is_err());
    /// ```
    pub fn next_after(family: DocumentFamily, period: i32, last: Option<u32>) -> CoreResult<Self> {
        let sequence = match last {
            None => 1,
            Some(last) => last.saturating_add(1),
        };

        if sequence > DOCUMENT_NUMBER_CAPACITY {
            return Err(CoreError::NumberingExhausted {
                family,
                period,
                capacity: DOCUMENT_NUMBER_CAPACITY,
            });
        }

        Ok(DocumentNumber {
            family,
            period,
            sequence,
        })
    }

    /// Parses a formatted number of the given family.
    pub fn parse(family: DocumentFamily, number: &str) -> Option<Self> {
        let rest = number.strip_prefix(family.prefix())?;
        let (period, sequence) = rest.split_once('/')?;
        if period.len() != 4 || sequence.len() != 4 {
            return None;
        }
        if !period.bytes().chain(sequence.bytes()).all(|b| b.is_ascii_digit()) {
            return None;
        }

        let period: i32 = period.parse().ok()?;
        let sequence: u32 = sequence.parse().ok()?;
        if sequence == 0 {
            return None;
        }

        Some(DocumentNumber {
            family,
            period,
            sequence,
        })
    }
}

impl fmt::Display for DocumentNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}/{:04}", self.family.prefix(), self.period, self.sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_number_of_period() {
        let n = DocumentNumber::next_after(DocumentFamily::Invoice, 2026, None).unwrap();
        assert_eq!(n.to_string(), "2026/0001");
        assert_eq!(n.sequence, 1);
    }

    #[test]
    fn test_capacity_is_a_hard_ceiling() {
        let last = DocumentNumber::next_after(DocumentFamily::Invoice, 2026, Some(9998)).unwrap();
        assert_eq!(last.to_string(), "2026/9999");

        let err = DocumentNumber::next_after(DocumentFamily::Invoice, 2026, Some(9999)).unwrap_err();
        assert!(matches!(
            err,
            CoreError::NumberingExhausted { period: 2026, capacity: 9999, .. }
        ));
    }

    #[test]
    fn test_families_are_disjoint() {
        let invoice = DocumentNumber::next_after(DocumentFamily::Invoice, 2026, Some(4)).unwrap();
        let credit = DocumentNumber::next_after(DocumentFamily::CreditNote, 2026, Some(4)).unwrap();
        assert_ne!(invoice.to_string(), credit.to_string());
        assert_eq!(credit.to_string(), "NC-2026/0005");
    }

    #[test]
    fn test_parse() {
        let n = DocumentNumber::parse(DocumentFamily::Invoice, "2026/0042").unwrap();
        assert_eq!((n.period, n.sequence), (2026, 42));

        let c = DocumentNumber::parse(DocumentFamily::CreditNote, "NC-2025/0003").unwrap();
        assert_eq!((c.period, c.sequence), (2025, 3));

        assert!(DocumentNumber::parse(DocumentFamily::Invoice, "NC-2025/0003").is_none());
        assert!(DocumentNumber::parse(DocumentFamily::Invoice, "2026/42").is_none());
        assert!(DocumentNumber::parse(DocumentFamily::Invoice, "2026/0000").is_none());
    }

    #[test]
    fn test_period_of() {
        assert_eq!(period_of(NaiveDate::from_ymd_opt(2026, 12, 31).unwrap()), 2026);
    }
}
