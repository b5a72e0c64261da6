use fungi_core::{Category, Identity, LedgerError, LedgerResult, LedgerRules, NewOffer, MAX_SEATS};
use serde::Deserialize;

/// Raw offer form as submitted by a participant.
#[derive(Debug, Clone, Deserialize)]
pub struct OfferRequest {
    pub owner: String,
    pub total_seats: i64,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub meeting_point: Option<String>,
}

impl OfferRequest {
    /// Check the form locally; nothing invalid ever reaches the store.
    pub fn validate(self, rules: &LedgerRules) -> LedgerResult<NewOffer> {
        let owner = Identity::parse(&self.owner)?;

        if !(1..=i64::from(MAX_SEATS)).contains(&self.total_seats) {
            return Err(LedgerError::Validation(format!(
                "seat count must be between 1 and {}, got {}",
                MAX_SEATS, self.total_seats
            )));
        }
        let total_seats = self.total_seats as u32;

        let meeting_point = match self.meeting_point.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(
                rules
                    .meeting_point(raw)
                    .ok_or_else(|| {
                        LedgerError::Validation(format!("unknown meeting point '{}'", raw))
                    })?
                    .to_string(),
            ),
        };

        if self.category.requires_meeting_point() && meeting_point.is_none() {
            return Err(LedgerError::Validation(
                "a shared shuttle needs a meeting point".into(),
            ));
        }

        Ok(NewOffer {
            owner,
            total_seats,
            category: self.category,
            meeting_point,
        })
    }
}
