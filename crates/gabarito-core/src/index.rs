//! Variant-index and position normalization.
//!
//! Variant indexes and positions are 1-based everywhere outside this module.
//! [`to_offset`] is the single place a 1-based number becomes a 0-based
//! offset; nothing else in the crate subtracts one.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Prefix used by the string form of a variant selector (`"versao3"`).
pub const VARIANT_PREFIX: &str = "versao";

/// Convert a 1-based number into a 0-based offset into a sequence of `len`
/// elements. `None` for 0 or anything past the end.
pub fn to_offset(one_based: u32, len: usize) -> Option<usize> {
    let offset = usize::try_from(one_based).ok()?.checked_sub(1)?;
    (offset < len).then_some(offset)
}

/// A validated 1-based variant index in `1..=K`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariantIndex(u32);

impl VariantIndex {
    /// The variant used when a submission does not name one.
    pub const FIRST: VariantIndex = VariantIndex(1);

    /// Validate `value` against `variant_count`.
    pub fn new(value: u32, variant_count: u32) -> CoreResult<Self> {
        if value == 0 || value > variant_count {
            return Err(CoreError::validation(format!(
                "variant index {value} is outside 1..={variant_count}"
            )));
        }
        Ok(VariantIndex(value))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for VariantIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A 1-based answer-sheet position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Position(u32);

impl Position {
    pub fn new(value: u32) -> CoreResult<Self> {
        if value == 0 {
            return Err(CoreError::validation("position 0 is invalid, positions start at 1"));
        }
        Ok(Position(value))
    }

    /// Parse a wire-format position key such as `"12"`.
    pub fn parse(raw: &str) -> CoreResult<Self> {
        let value = raw
            .trim()
            .parse::<u32>()
            .map_err(|_| CoreError::validation(format!("position '{raw}' is not a positive integer")))?;
        Position::new(value)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A variant selector exactly as a client sent it.
///
/// Mobile clients send `"versaoN"`; the sheet scanner sends a bare integer
/// (sometimes quoted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawVariant {
    Number(i64),
    Text(String),
}

impl RawVariant {
    /// Parse into a plain number without range validation.
    fn parse_number(&self) -> CoreResult<i64> {
        match self {
            RawVariant::Number(n) => Ok(*n),
            RawVariant::Text(s) => {
                let trimmed = s.trim();
                let digits = strip_prefix_ignore_case(trimmed, VARIANT_PREFIX).unwrap_or(trimmed);
                digits.trim().parse::<i64>().map_err(|_| {
                    CoreError::validation(format!("variant selector '{s}' is not a number"))
                })
            }
        }
    }
}

impl From<u32> for RawVariant {
    fn from(n: u32) -> Self {
        RawVariant::Number(n.into())
    }
}

impl From<&str> for RawVariant {
    fn from(s: &str) -> Self {
        RawVariant::Text(s.to_string())
    }
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

/// Normalize a client-supplied variant selector into a validated index.
///
/// Absent selects variant 1. A present value that does not parse, or parses
/// outside `1..=variant_count`, is a validation error; it is never clamped.
pub fn normalize_variant_index(
    raw: Option<&RawVariant>,
    variant_count: u32,
) -> CoreResult<VariantIndex> {
    let Some(raw) = raw else {
        return VariantIndex::new(1, variant_count);
    };
    let n = raw.parse_number()?;
    let value = u32::try_from(n).map_err(|_| {
        CoreError::validation(format!("variant index {n} is outside 1..={variant_count}"))
    })?;
    VariantIndex::new(value, variant_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_boundaries() {
        assert_eq!(to_offset(0, 3), None);
        assert_eq!(to_offset(1, 3), Some(0));
        assert_eq!(to_offset(3, 3), Some(2));
        assert_eq!(to_offset(4, 3), None);
        assert_eq!(to_offset(1, 0), None);
    }

    #[test]
    fn string_and_integer_forms_agree() {
        let from_text = normalize_variant_index(Some(&"versao3".into()), 5).unwrap();
        let from_int = normalize_variant_index(Some(&3u32.into()), 5).unwrap();
        assert_eq!(from_text, from_int);
        assert_eq!(from_text.get(), 3);

        let quoted = normalize_variant_index(Some(&"3".into()), 5).unwrap();
        assert_eq!(quoted.get(), 3);
        let upper = normalize_variant_index(Some(&" VERSAO2 ".into()), 5).unwrap();
        assert_eq!(upper.get(), 2);
    }

    #[test]
    fn absent_defaults_to_first() {
        assert_eq!(normalize_variant_index(None, 5).unwrap(), VariantIndex::FIRST);
    }

    #[test]
    fn variant_boundaries() {
        let k = 5;
        assert!(normalize_variant_index(Some(&0u32.into()), k).is_err());
        assert_eq!(normalize_variant_index(Some(&1u32.into()), k).unwrap().get(), 1);
        assert_eq!(normalize_variant_index(Some(&5u32.into()), k).unwrap().get(), 5);
        assert!(normalize_variant_index(Some(&6u32.into()), k).is_err());
        assert!(normalize_variant_index(Some(&RawVariant::Number(-1)), k).is_err());
    }

    #[test]
    fn out_of_range_is_rejected_not_clamped() {
        let err = normalize_variant_index(Some(&"versao9".into()), 5).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("1..=5"));
    }

    #[test]
    fn garbage_selectors_are_rejected() {
        for raw in ["versao", "versaoX", "tipo2", ""] {
            let err = normalize_variant_index(Some(&raw.into()), 5).unwrap_err();
            assert!(err.is_validation(), "{raw} should be a validation error");
        }
    }

    #[test]
    fn raw_variant_decodes_both_shapes() {
        let n: RawVariant = serde_json::from_str("4").unwrap();
        assert_eq!(n, RawVariant::Number(4));
        let s: RawVariant = serde_json::from_str(r#""versao4""#).unwrap();
        assert_eq!(s, RawVariant::Text("versao4".into()));
    }

    #[test]
    fn position_parsing() {
        assert_eq!(Position::parse("12").unwrap().get(), 12);
        assert_eq!(Position::parse(" 1 ").unwrap().get(), 1);
        assert!(Position::parse("0").is_err());
        assert!(Position::parse("-3").is_err());
        assert!(Position::parse("a").is_err());
    }
}
