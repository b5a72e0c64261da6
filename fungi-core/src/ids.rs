use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};

macro_rules! document_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            pub const fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

document_id!(
    /// Identifier of an `offers/{id}` document.
    OfferId
);
document_id!(
    /// Identifier of a reservation document.
    ReservationId
);
document_id!(
    /// Identifier of a payment or bus-signup record.
    RecordId
);

const MAX_TOUR_ID_LEN: usize = 64;

/// Tenant key. Every collection lives under `tours/{tour}/...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TourId(String);

impl TourId {
    /// Accepts ASCII letters, digits, `-` and `_` so the id is safe as a path prefix.
    pub fn parse(raw: &str) -> LedgerResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(LedgerError::Validation("tour identifier must not be empty".into()));
        }
        if trimmed.len() > MAX_TOUR_ID_LEN {
            return Err(LedgerError::Validation(format!(
                "tour identifier must be at most {} characters",
                MAX_TOUR_ID_LEN
            )));
        }
        if !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(LedgerError::Validation(format!(
                "tour identifier '{}' may only contain letters, digits, '-' and '_'",
                trimmed
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TourId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TourId {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TourId> for String {
    fn from(value: TourId) -> Self {
        value.0
    }
}
