use fungi_core::{Identity, LedgerError, LedgerResult, Offer, OfferId, Reservation};

/// The admission rule for one seat claim.
///
/// `offer` and `held` must come from the same transactional read. Checks run
/// in order: the offer still exists, the claimant holds no seat on it yet,
/// and a seat is left.
pub fn admit(
    offer_id: OfferId,
    claimant: &Identity,
    offer: Option<&Offer>,
    held: &[Reservation],
) -> LedgerResult<()> {
    let offer = offer.ok_or_else(|| LedgerError::NotFound(format!("Offer {}", offer_id)))?;

    if held.iter().any(|r| r.claimant.matches(claimant)) {
        return Err(LedgerError::AlreadyClaimed {
            offer_id,
            claimant: claimant.clone(),
        });
    }

    if held.len() >= offer.total_seats as usize {
        return Err(LedgerError::Full {
            offer_id,
            total_seats: offer.total_seats,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fungi_core::{Category, NewOffer, TourId};

    fn offer(seats: u32) -> Offer {
        Offer::create(
            TourId::parse("t").unwrap(),
            NewOffer {
                owner: Identity::parse("Owner").unwrap(),
                total_seats: seats,
                category: Category::PrivateCar,
                meeting_point: None,
            },
        )
    }

    fn seat(offer: &Offer, name: &str) -> Reservation {
        Reservation::for_offer(offer, Identity::parse(name).unwrap())
    }

    #[test]
    fn test_missing_offer() {
        let id = OfferId::new();
        let result = admit(id, &Identity::parse("A").unwrap(), None, &[]);
        assert!(matches!(result, Err(LedgerError::NotFound(_))));
    }

    #[test]
    fn test_duplicate_claim_detected_case_insensitively() {
        let offer = offer(4);
        let held = vec![seat(&offer, "Lucie")];

        let result = admit(offer.id, &Identity::parse(" LUCIE").unwrap(), Some(&offer), &held);
        assert!(matches!(result, Err(LedgerError::AlreadyClaimed { .. })));
    }

    #[test]
    fn test_already_claimed_wins_over_full() {
        let offer = offer(1);
        let held = vec![seat(&offer, "Lucie")];

        let result = admit(offer.id, &Identity::parse("lucie").unwrap(), Some(&offer), &held);
        assert!(matches!(result, Err(LedgerError::AlreadyClaimed { .. })));
    }

    #[test]
    fn test_full() {
        let offer = offer(2);
        let held = vec![seat(&offer, "A"), seat(&offer, "B")];

        let result = admit(offer.id, &Identity::parse("C").unwrap(), Some(&offer), &held);
        assert_eq!(
            result,
            Err(LedgerError::Full { offer_id: offer.id, total_seats: 2 })
        );
    }

    #[test]
    fn test_last_seat_admitted() {
        let offer = offer(2);
        let held = vec![seat(&offer, "A")];

        assert!(admit(offer.id, &Identity::parse("B").unwrap(), Some(&offer), &held).is_ok());
    }
}
