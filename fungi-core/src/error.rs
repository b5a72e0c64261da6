use crate::identity::Identity;
use crate::ids::OfferId;

/// Every way a ledger operation can be rejected.
///
/// Business-rule rejections (`AlreadyClaimed`, `Full`, `NotFound`,
/// `NotAuthorized`) are surfaced verbatim so the caller can tell the user which
/// rule was violated. `StoreUnavailable` is the only retryable variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{claimant} already holds a seat on offer {offer_id}")]
    AlreadyClaimed { offer_id: OfferId, claimant: Identity },
    #[error("Offer {offer_id} is full ({total_seats} of {total_seats} seats taken)")]
    Full { offer_id: OfferId, total_seats: u32 },
    #[error("Not authorized: {0}")]
    NotAuthorized(String),
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl LedgerError {
    /// Stable machine-readable code for the violated rule.
    pub const fn code(&self) -> &'static str {
        match self {
            LedgerError::Validation(_) => "validation_error",
            LedgerError::NotFound(_) => "not_found",
            LedgerError::AlreadyClaimed { .. } => "already_claimed",
            LedgerError::Full { .. } => "full",
            LedgerError::NotAuthorized(_) => "not_authorized",
            LedgerError::StoreUnavailable(_) => "store_unavailable",
        }
    }

    pub const fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::StoreUnavailable(_))
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Failures raised by a `DocumentStore` backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    #[error("Transaction aborted after {0} conflicting attempts")]
    RetriesExhausted(u32),
    #[error("Malformed record: {0}")]
    Malformed(String),
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        LedgerError::StoreUnavailable(err.to_string())
    }
}
