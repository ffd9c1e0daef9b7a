//! Lexical forms of the primitive types.

use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, FixedOffset};
use lazy_static::lazy_static;
use num_bigint::BigInt;
use regex::Regex;
use uuid::Uuid;

use crate::schema::PrimitiveType;

lazy_static! {
    static ref URI: Regex = Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:[^\s]*$").unwrap();
}

/// A value type with a lexical form.
pub trait LexicalValue: Sized {
    fn from_lexical(src: &str) -> Option<Self>;
}

impl LexicalValue for bool {
    fn from_lexical(src: &str) -> Option<Self> {
        match src {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        }
    }
}

impl LexicalValue for BigInt {
    fn from_lexical(src: &str) -> Option<Self> {
        src.parse().ok()
    }
}

impl LexicalValue for BigDecimal {
    fn from_lexical(src: &str) -> Option<Self> {
        // `BigDecimal` also takes exponents; an empty or sign-only string is never a number.
        if !src.bytes().any(|b| b.is_ascii_digit()) {
            return None;
        }
        src.parse().ok()
    }
}

impl LexicalValue for String {
    fn from_lexical(src: &str) -> Option<Self> {
        Some(src.to_string())
    }
}

impl LexicalValue for DateTime<FixedOffset> {
    fn from_lexical(src: &str) -> Option<Self> {
        DateTime::parse_from_rfc3339(src).ok()
    }
}

impl LexicalValue for Uuid {
    fn from_lexical(src: &str) -> Option<Self> {
        // `parse_str` also accepts simple, braced and URN forms.
        if src.len() != 36 {
            return None;
        }
        Uuid::parse_str(src).ok()
    }
}

/// An absolute URI, `scheme:rest` without whitespace.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Uri(String);

impl Uri {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn scheme(&self) -> &str {
        self.0.split_once(':').map_or("", |(scheme, _)| scheme)
    }
}

impl LexicalValue for Uri {
    fn from_lexical(src: &str) -> Option<Self> {
        URI.is_match(src).then(|| Uri(src.to_string()))
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn lexical_value<T: LexicalValue>(src: &str) -> Option<T> {
    T::from_lexical(src)
}

/// A value of one of the primitive types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypedValue {
    Boolean(bool),
    Integer(BigInt),
    Real(BigDecimal),
    String(String),
    Timestamp(DateTime<FixedOffset>),
    Uri(Uri),
    Uuid(Uuid),
}

impl TypedValue {
    /// Parses `src` as a value of `primitive`.
    pub fn parse(primitive: PrimitiveType, src: &str) -> Option<Self> {
        Some(match primitive {
            PrimitiveType::Boolean => TypedValue::Boolean(lexical_value(src)?),
            PrimitiveType::Integer => TypedValue::Integer(lexical_value(src)?),
            PrimitiveType::Real => TypedValue::Real(lexical_value(src)?),
            PrimitiveType::String => TypedValue::String(lexical_value(src)?),
            PrimitiveType::Timestamp => TypedValue::Timestamp(lexical_value(src)?),
            PrimitiveType::Uri => TypedValue::Uri(lexical_value(src)?),
            PrimitiveType::Uuid => TypedValue::Uuid(lexical_value(src)?),
        })
    }

    pub fn primitive(&self) -> PrimitiveType {
        match self {
            TypedValue::Boolean(_) => PrimitiveType::Boolean,
            TypedValue::Integer(_) => PrimitiveType::Integer,
            TypedValue::Real(_) => PrimitiveType::Real,
            TypedValue::String(_) => PrimitiveType::String,
            TypedValue::Timestamp(_) => PrimitiveType::Timestamp,
            TypedValue::Uri(_) => PrimitiveType::Uri,
            TypedValue::Uuid(_) => PrimitiveType::Uuid,
        }
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::Boolean(v) => write!(f, "{v}"),
            TypedValue::Integer(v) => write!(f, "{v}"),
            TypedValue::Real(v) => write!(f, "{v}"),
            TypedValue::String(v) => f.write_str(v),
            TypedValue::Timestamp(v) => f.write_str(&v.to_rfc3339()),
            TypedValue::Uri(v) => write!(f, "{v}"),
            TypedValue::Uuid(v) => write!(f, "{}", v.hyphenated()),
        }
    }
}

impl FromStr for Uri {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uri::from_lexical(s).ok_or_else(|| format!("{s:?} is not an absolute URI"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accepts(primitive: PrimitiveType, src: &str) -> bool {
        TypedValue::parse(primitive, src).is_some()
    }

    #[test]
    fn booleans() {
        assert_eq!(
            TypedValue::parse(PrimitiveType::Boolean, "1"),
            Some(TypedValue::Boolean(true))
        );
        assert_eq!(
            TypedValue::parse(PrimitiveType::Boolean, "false"),
            Some(TypedValue::Boolean(false))
        );
        assert!(!accepts(PrimitiveType::Boolean, "TRUE"));
        assert!(!accepts(PrimitiveType::Boolean, "yes"));
    }

    #[test]
    fn integers_are_unbounded() {
        let big = "-123456789012345678901234567890";
        let value = TypedValue::parse(PrimitiveType::Integer, big).unwrap();
        assert_eq!(value.to_string(), big);
        assert!(!accepts(PrimitiveType::Integer, "1.5"));
        assert!(!accepts(PrimitiveType::Integer, ""));
    }

    #[test]
    fn reals() {
        assert!(accepts(PrimitiveType::Real, "3.14159265358979323846264338327950288"));
        assert!(accepts(PrimitiveType::Real, "-2"));
        assert!(accepts(PrimitiveType::Real, "6.02e23"));
        assert!(!accepts(PrimitiveType::Real, "-"));
        assert!(!accepts(PrimitiveType::Real, "pi"));
    }

    #[test]
    fn strings_are_kept_verbatim() {
        assert_eq!(
            TypedValue::parse(PrimitiveType::String, "  Hello "),
            Some(TypedValue::String("  Hello ".into()))
        );
        assert!(accepts(PrimitiveType::String, ""));
    }

    #[test]
    fn timestamps_need_an_offset() {
        let value = TypedValue::parse(PrimitiveType::Timestamp, "2024-02-29T12:30:00+01:00").unwrap();
        assert_eq!(value.primitive(), PrimitiveType::Timestamp);
        assert!(accepts(PrimitiveType::Timestamp, "2024-02-29T12:30:00Z"));
        assert!(!accepts(PrimitiveType::Timestamp, "2024-02-29T12:30:00"));
        assert!(!accepts(PrimitiveType::Timestamp, "2023-02-29T12:30:00Z"));
    }

    #[test]
    fn uris() {
        let uri: Uri = "urn:isbn:0451450523".parse().unwrap();
        assert_eq!(uri.scheme(), "urn");
        assert!(accepts(PrimitiveType::Uri, "https://example.org/a?b=c"));
        assert!(!accepts(PrimitiveType::Uri, "example.org/path"));
        assert!(!accepts(PrimitiveType::Uri, "http://example.org/a b"));
        assert!(!accepts(PrimitiveType::Uri, "1http:x"));
    }

    #[test]
    fn uuids_are_hyphenated() {
        let src = "67e55044-10b1-426f-9247-bb680e5fe0c8";
        let value = TypedValue::parse(PrimitiveType::Uuid, src).unwrap();
        assert_eq!(value.to_string(), src);
        assert!(!accepts(PrimitiveType::Uuid, "67e5504410b1426f9247bb680e5fe0c8"));
        assert!(!accepts(PrimitiveType::Uuid, "67e55044-10b1-426f-9247-bb680e5fe0cz"));
    }
}
