//! # Sequence Formatting
//!
//! Display formats for the business numbers printed on receipts.
//!
//! ```text
//! sequences.last_value   Display
//! ────────────────────   ───────────
//! invoice  42        ──► "0000042"
//! return   7         ──► "RTN-000007"
//! ```
//!
//! Issuing values is the database's job (`tillpoint-db::repository::sequence`);
//! this module only formats and parses them.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Prefix carried by every return number.
pub const RETURN_PREFIX: &str = "RTN-";

const INVOICE_WIDTH: usize = 7;
const RETURN_WIDTH: usize = 6;

/// The two counters kept in the `sequences` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SequenceKind {
    Invoice,
    Return,
}

impl SequenceKind {
    /// Row key in the `sequences` table.
    pub const fn name(&self) -> &'static str {
        match self {
            SequenceKind::Invoice => "invoice",
            SequenceKind::Return => "return",
        }
    }

    /// Formats a raw counter value for display.
    ///
    /// ```rust
    /// use tillpoint_core::sequence::SequenceKind;
    ///
    /// assert_eq!(SequenceKind::Invoice.format(42), "0000042");
    /// assert_eq!(SequenceKind::Return.format(7), "RTN-000007");
    /// ```
    pub fn format(&self, value: i64) -> String {
        match self {
            SequenceKind::Invoice => format!("{:0width$}", value, width = INVOICE_WIDTH),
            SequenceKind::Return => {
                format!("{}{:0width$}", RETURN_PREFIX, value, width = RETURN_WIDTH)
            }
        }
    }

    /// Parses a formatted number back to its counter value.
    ///
    /// Returns `None` for anything this kind would not have produced.
    pub fn parse(&self, formatted: &str) -> Option<i64> {
        let digits = match self {
            SequenceKind::Invoice => formatted,
            SequenceKind::Return => formatted.strip_prefix(RETURN_PREFIX)?,
        };

        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }

        digits.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_pads_to_width() {
        assert_eq!(SequenceKind::Invoice.format(1), "0000001");
        assert_eq!(SequenceKind::Return.format(1), "RTN-000001");
        // Widths are minimums; large counters keep all their digits
        assert_eq!(SequenceKind::Invoice.format(12_345_678), "12345678");
    }

    #[test]
    fn test_parse() {
        assert_eq!(SequenceKind::Invoice.parse("0000042"), Some(42));
        assert_eq!(SequenceKind::Return.parse("RTN-000007"), Some(7));

        assert_eq!(SequenceKind::Return.parse("000007"), None);
        assert_eq!(SequenceKind::Invoice.parse("RTN-000007"), None);
        assert_eq!(SequenceKind::Invoice.parse(""), None);
        assert_eq!(SequenceKind::Invoice.parse("-12"), None);
    }
}
