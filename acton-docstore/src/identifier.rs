//! Entity identifier kinds
//!
//! Entities are keyed by one of five identifier kinds. Numeric kinds are
//! minted from a named counter stored in the sequence collection; the UUID
//! kind is generated locally (random, version 4).
//!
//! The kind of an entity's identifier is fixed at compile time through the
//! [`Identifier`] trait. [`IdentifierKind::from_str`] resolves a kind by name
//! for callers that only know it at runtime, and rejects anything else with
//! an "unsupported identifier kind" error.
//!
//! ```rust
//! use acton_docstore::identifier::IdentifierKind;
//! use std::str::FromStr;
//!
//! assert_eq!(IdentifierKind::from_str("long").unwrap(), IdentifierKind::Int64);
//! assert!(IdentifierKind::from_str("f64").is_err());
//! ```

use serde::{de::DeserializeOwned, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::repository::{RepositoryError, RepositoryResult};

/// Supported identifier kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentifierKind {
    /// Signed 32-bit counter
    Int32,
    /// Unsigned 32-bit counter
    UInt32,
    /// Signed 64-bit counter
    Int64,
    /// Unsigned 64-bit counter
    UInt64,
    /// Random UUID
    Uuid,
}

impl IdentifierKind {
    /// Whether values of this kind come from a stored counter
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        !matches!(self, Self::Uuid)
    }

    /// Largest counter value representable by the kind
    #[must_use]
    pub const fn max_value(self) -> Option<u64> {
        match self {
            Self::Int32 => Some(i32::MAX as u64),
            Self::UInt32 => Some(u32::MAX as u64),
            Self::Int64 => Some(i64::MAX as u64),
            Self::UInt64 => Some(u64::MAX),
            Self::Uuid => None,
        }
    }

    /// Canonical lowercase name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Int32 => "i32",
            Self::UInt32 => "u32",
            Self::Int64 => "i64",
            Self::UInt64 => "u64",
            Self::Uuid => "uuid",
        }
    }

    /// Parse a stored counter value
    ///
    /// Counters are stored as decimal strings. Values outside the kind's
    /// range are rejected.
    pub fn parse_counter(self, raw: &str) -> RepositoryResult<u64> {
        let max = self
            .max_value()
            .ok_or_else(|| RepositoryError::unsupported_identifier_kind(self.as_str()))?;
        let value = raw.trim().parse::<u64>().map_err(|e| {
            RepositoryError::serialization_error(
                crate::repository::RepositoryOperation::NextSequence,
                format!("Stored counter '{}' is not a valid {}: {}", raw, self, e),
            )
        })?;
        if value > max {
            return Err(RepositoryError::sequence_exhausted(format!(
                "Stored counter {} exceeds the {} range",
                value, self
            )));
        }
        Ok(value)
    }

    /// The value following `current`, or an error when the kind would overflow
    pub fn increment(self, current: u64) -> RepositoryResult<u64> {
        let max = self
            .max_value()
            .ok_or_else(|| RepositoryError::unsupported_identifier_kind(self.as_str()))?;
        current
            .checked_add(1)
            .filter(|next| *next <= max)
            .ok_or_else(|| {
                RepositoryError::sequence_exhausted(format!(
                    "{} sequence exhausted at {}",
                    self, current
                ))
            })
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdentifierKind {
    type Err = RepositoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "i32" | "int" | "int32" => Ok(Self::Int32),
            "u32" | "uint" | "uint32" => Ok(Self::UInt32),
            "i64" | "long" | "int64" => Ok(Self::Int64),
            "u64" | "ulong" | "uint64" => Ok(Self::UInt64),
            "uuid" | "guid" => Ok(Self::Uuid),
            _ => Err(RepositoryError::unsupported_identifier_kind(s)),
        }
    }
}

/// A value produced by the sequence generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequenceValue {
    /// Next value of a numeric counter
    Number(u64),
    /// Freshly generated UUID
    Uuid(Uuid),
}

impl fmt::Display for SequenceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Uuid(u) => write!(f, "{}", u),
        }
    }
}

/// A type usable as an entity identifier
pub trait Identifier:
    Clone + fmt::Display + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// The kind minted for this type
    const KIND: IdentifierKind;

    /// Convert a generated value into this identifier type
    fn from_sequence(value: SequenceValue) -> RepositoryResult<Self>;
}

macro_rules! numeric_identifier {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl Identifier for $ty {
                const KIND: IdentifierKind = IdentifierKind::$kind;

                fn from_sequence(value: SequenceValue) -> RepositoryResult<Self> {
                    match value {
                        SequenceValue::Number(n) => <$ty>::try_from(n).map_err(|_| {
                            RepositoryError::sequence_exhausted(format!(
                                "{} does not fit in {}",
                                n,
                                IdentifierKind::$kind
                            ))
                        }),
                        SequenceValue::Uuid(_) => Err(RepositoryError::unsupported_identifier_kind(
                            format!("uuid value for {}", IdentifierKind::$kind),
                        )),
                    }
                }
            }
        )*
    };
}

numeric_identifier!(i32 => Int32, u32 => UInt32, i64 => Int64, u64 => UInt64);

impl Identifier for Uuid {
    const KIND: IdentifierKind = IdentifierKind::Uuid;

    fn from_sequence(value: SequenceValue) -> RepositoryResult<Self> {
        match value {
            SequenceValue::Uuid(u) => Ok(u),
            SequenceValue::Number(_) => Err(RepositoryError::unsupported_identifier_kind(
                "numeric value for uuid",
            )),
        }
    }
}
