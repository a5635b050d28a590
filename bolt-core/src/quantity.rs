//! Resource quantities
//!
//! Validates strings such as "500m", "4", "3Gi" or "1e3" against the
//! cluster's quantity grammar: an optionally signed decimal number followed
//! by a binary suffix, a decimal SI suffix or a decimal exponent.

use std::fmt;
use thiserror::Error;

const BINARY_SUFFIXES: [&str; 6] = ["Ki", "Mi", "Gi", "Ti", "Pi", "Ei"];
const DECIMAL_SUFFIXES: [&str; 10] = ["n", "u", "m", "", "k", "M", "G", "T", "P", "E"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    #[error("quantity is empty")]
    Empty,

    #[error("'{0}' is not a valid quantity")]
    Invalid(String),

    #[error("'{0}' is negative")]
    Negative(String),
}

/// A validated resource quantity, kept in its original textual form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quantity(String);

impl Quantity {
    pub fn parse(input: &str) -> Result<Self, QuantityError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(QuantityError::Empty);
        }

        let unsigned = trimmed
            .strip_prefix(|c: char| c == '+' || c == '-')
            .unwrap_or(trimmed);

        let number_len = unsigned
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(unsigned.len());
        let (number, suffix) = unsigned.split_at(number_len);

        let has_digit = number.chars().any(|c| c.is_ascii_digit());
        if !has_digit || number.matches('.').count() > 1 {
            return Err(QuantityError::Invalid(input.to_string()));
        }

        if !is_valid_suffix(suffix) {
            return Err(QuantityError::Invalid(input.to_string()));
        }

        Ok(Self(trimmed.to_string()))
    }

    /// Parses a quantity used as a resource limit, which must not be negative
    pub fn parse_limit(input: &str) -> Result<Self, QuantityError> {
        let quantity = Self::parse(input)?;
        if quantity.0.starts_with('-') {
            return Err(QuantityError::Negative(quantity.0));
        }
        Ok(quantity)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn is_valid_suffix(suffix: &str) -> bool {
    if BINARY_SUFFIXES.contains(&suffix) || DECIMAL_SUFFIXES.contains(&suffix) {
        return true;
    }

    // Decimal exponent: e|E followed by a signed integer
    let Some(exponent) = suffix.strip_prefix(|c: char| c == 'e' || c == 'E') else {
        return false;
    };
    let digits = exponent
        .strip_prefix(|c: char| c == '+' || c == '-')
        .unwrap_or(exponent);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}
