//! Identifier normalization
//!
//! Canonical forms used on both sides of a match: identifiers read from the
//! tabular source and identifiers extracted from the page go through the
//! same functions, so set membership is a plain string comparison.

/// Canonicalize a VIN: uppercase, keep only A-Z/0-9, then drop I, O and Q
/// (those letters are not part of the VIN alphabet).
pub fn normalize_vin(text: &str) -> String {
    text.to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .filter(|c| !matches!(c, 'I' | 'O' | 'Q'))
        .collect()
}

/// Canonicalize a stock code: trim and uppercase, nothing else
pub fn normalize_stock(text: &str) -> String {
    text.trim().to_uppercase()
}
