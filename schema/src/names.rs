use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use num_bigint::BigUint;
use regex::Regex;
use thiserror::Error;

const MAX_NAME_LENGTH: usize = 255;

lazy_static! {
    static ref SCHEMA_NAME: Regex =
        Regex::new(r"^[A-Za-z][A-Za-z0-9_]*(\.[A-Za-z][A-Za-z0-9_]*)*$").unwrap();
    static ref LOCAL_NAME: Regex = Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").unwrap();
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("{value:?} is not a valid {kind} name")]
    Invalid { kind: &'static str, value: String },
    #[error("{value:?} is not a valid version (expected MAJOR.MINOR)")]
    Version { value: String },
    #[error("{value:?} is not a valid schema identifier (expected NAME:MAJOR.MINOR)")]
    Identifier { value: String },
    #[error("{value:?} is not a valid qualified name (expected SCHEMA.NAME)")]
    Qualified { value: String },
}

macro_rules! validated_name {
    ($(#[$meta:meta])* $name:ident, $kind:literal, $pattern:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Result<Self, NameError> {
                let value = value.into();
                if value.len() <= MAX_NAME_LENGTH && $pattern.is_match(&value) {
                    Ok(Self(value))
                } else {
                    Err(NameError::Invalid { kind: $kind, value })
                }
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = NameError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

validated_name!(
    /// The name of a schema, e.g. `Core` or `org.example.Dublin`.
    SchemaName,
    "schema",
    SCHEMA_NAME
);
validated_name!(
    /// The name of a type, unique within its schema.
    TypeName,
    "type",
    LOCAL_NAME
);
validated_name!(
    /// The name of an attribute, unique within its schema.
    AttributeName,
    "attribute",
    LOCAL_NAME
);

/// A `MAJOR.MINOR` schema version. Both components are unbounded.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: BigUint,
    pub minor: BigUint,
}

impl Version {
    pub fn new(major: impl Into<BigUint>, minor: impl Into<BigUint>) -> Self {
        Self {
            major: major.into(),
            minor: minor.into(),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for Version {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let error = || NameError::Version { value: s.into() };
        let (major, minor) = s.split_once('.').ok_or_else(error)?;
        Ok(Self {
            major: parse_component(major).ok_or_else(error)?,
            minor: parse_component(minor).ok_or_else(error)?,
        })
    }
}

/// Parses one unsigned version component. Signs and empty strings are rejected, which
/// `BigUint::from_str` would otherwise partly accept.
pub(crate) fn parse_component(source: &str) -> Option<BigUint> {
    if source.is_empty() || !source.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    source.parse().ok()
}

/// Uniquely identifies one schema: a name at one version.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaIdentifier {
    pub name: SchemaName,
    pub version: Version,
}

impl SchemaIdentifier {
    pub fn new(name: SchemaName, version: Version) -> Self {
        Self { name, version }
    }
}

impl fmt::Display for SchemaIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

impl FromStr for SchemaIdentifier {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, version) = s
            .rsplit_once(':')
            .ok_or_else(|| NameError::Identifier { value: s.into() })?;
        Ok(Self {
            name: name.parse()?,
            version: version.parse()?,
        })
    }
}

/// A schema-name-prefixed name, written `Schema.name`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QualifiedName<N> {
    pub schema: SchemaName,
    pub name: N,
}

pub type QualifiedTypeName = QualifiedName<TypeName>;
pub type QualifiedAttributeName = QualifiedName<AttributeName>;

impl<N> QualifiedName<N> {
    pub fn new(schema: SchemaName, name: N) -> Self {
        Self { schema, name }
    }
}

impl<N: fmt::Display> fmt::Display for QualifiedName<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

impl<N: FromStr<Err = NameError>> FromStr for QualifiedName<N> {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Local names never contain a dot, so the last one separates the schema name.
        let (schema, name) = s
            .rsplit_once('.')
            .ok_or_else(|| NameError::Qualified { value: s.into() })?;
        Ok(Self {
            schema: schema.parse()?,
            name: name.parse()?,
        })
    }
}
