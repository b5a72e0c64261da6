use chrono::{DateTime, Utc};
use fungi_core::{Identity, Occupancy, Offer, OfferId, Reservation, RosterRecord, TourId};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// One offer with the seats currently held on it.
#[derive(Debug, Clone, Serialize)]
pub struct OfferView {
    pub offer: Offer,
    pub reservations: Vec<Reservation>,
    pub occupancy: Occupancy,
}

/// Read model of a tour, rebuilt wholesale from committed state.
#[derive(Debug, Clone, Serialize)]
pub struct Board {
    pub tour: TourId,
    /// Oldest offer first.
    pub offers: Vec<OfferView>,
    /// Reservations whose offer was not in the same snapshot. Not rendered.
    pub unresolved: Vec<Reservation>,
    pub payments: Vec<RosterRecord>,
    pub bus_signups: Vec<RosterRecord>,
    pub built_at: DateTime<Utc>,
}

impl Board {
    pub fn build(
        tour: TourId,
        mut offers: Vec<Offer>,
        reservations: Vec<Reservation>,
        payments: Vec<RosterRecord>,
        bus_signups: Vec<RosterRecord>,
    ) -> Self {
        offers.sort_by_key(|o| (o.created_at, o.id));

        let mut by_offer: HashMap<OfferId, Vec<Reservation>> =
            offers.iter().map(|o| (o.id, Vec::new())).collect();
        let mut unresolved = Vec::new();
        for reservation in reservations {
            match by_offer.get_mut(&reservation.offer_id) {
                Some(held) => held.push(reservation),
                None => unresolved.push(reservation),
            }
        }

        let offers = offers
            .into_iter()
            .map(|offer| {
                let mut reservations = by_offer.remove(&offer.id).unwrap_or_default();
                reservations.sort_by_key(|r| (r.created_at, r.id));
                let occupancy = Occupancy::of(&offer, reservations.len());
                OfferView {
                    offer,
                    reservations,
                    occupancy,
                }
            })
            .collect();

        Self {
            tour,
            offers,
            unresolved,
            payments,
            bus_signups,
            built_at: Utc::now(),
        }
    }

    pub fn offer(&self, id: OfferId) -> Option<&OfferView> {
        self.offers.iter().find(|view| view.offer.id == id)
    }

    pub fn occupancy(&self, id: OfferId) -> Option<Occupancy> {
        self.offer(id).map(|view| view.occupancy)
    }

    /// Advisory only, for disabling a claim control. The ledger re-checks
    /// inside its transaction regardless of what this says.
    pub fn can_claim(&self, id: OfferId, identity: &Identity) -> bool {
        self.offer(id).is_some_and(|view| {
            !view.occupancy.is_full()
                && !view.reservations.iter().any(|r| r.claimant.matches(identity))
        })
    }

    /// Every seat `identity` currently holds, across offers.
    pub fn seats_held_by(&self, identity: &Identity) -> Vec<&Reservation> {
        self.offers
            .iter()
            .flat_map(|view| view.reservations.iter())
            .filter(|r| r.claimant.matches(identity))
            .collect()
    }

    pub fn has_paid(&self, identity: &Identity) -> bool {
        self.payments.iter().any(|p| p.identity.matches(identity))
    }
}

/// What a live subscriber currently sees.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BoardState {
    Loading,
    Ready(Arc<Board>),
    Unavailable { reason: String },
}

impl BoardState {
    pub fn board(&self) -> Option<&Arc<Board>> {
        match self {
            BoardState::Ready(board) => Some(board),
            _ => None,
        }
    }
}
