use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{LedgerError, LedgerResult};

/// A participant's self-declared display name.
///
/// Not authenticated. Two identities are equal when their trimmed forms match
/// case-insensitively; the original spelling is kept for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    pub fn parse(raw: &str) -> LedgerResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(LedgerError::Validation("name must not be empty".into()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Comparison key: lowercase of the trimmed name.
    pub fn key(&self) -> String {
        self.0.to_lowercase()
    }

    pub fn matches(&self, other: &Identity) -> bool {
        self.key() == other.key()
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.matches(other)
    }
}

impl Eq for Identity {}

impl Hash for Identity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Identity {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Identity> for String {
    fn from(value: Identity) -> Self {
        value.0
    }
}

/// Decides whether a requester may mutate a resource attributed to `holder`.
///
/// The ledger only ever asks this question, so a real authentication scheme
/// can replace name matching without touching the ledger contract.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self, requester: &Identity, holder: &Identity) -> LedgerResult<()>;
}

/// "Same name, same person."
pub struct NameMatchAuthorizer;

#[async_trait]
impl Authorizer for NameMatchAuthorizer {
    async fn authorize(&self, requester: &Identity, holder: &Identity) -> LedgerResult<()> {
        if requester.matches(holder) {
            return Ok(());
        }

        tracing::debug!("Identity '{}' does not match holder '{}'", requester, holder);
        Err(LedgerError::NotAuthorized(format!(
            "'{}' is not the participant who created this entry",
            requester
        )))
    }
}
