use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::Identity;
use crate::ids::{OfferId, RecordId, ReservationId, TourId};
use crate::store::Collection;

/// Upper bound on seats a single offer may carry.
pub const MAX_SEATS: u32 = 50;

/// What kind of vehicle an offer is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// A participant's own car.
    #[default]
    PrivateCar,
    /// A rented microbus run shared by the group.
    SharedShuttle,
}

impl Category {
    pub const fn requires_meeting_point(self) -> bool {
        matches!(self, Category::SharedShuttle)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Category::PrivateCar => "private_car",
            Category::SharedShuttle => "shared_shuttle",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "private_car" => Some(Category::PrivateCar),
            "shared_shuttle" => Some(Category::SharedShuttle),
            _ => None,
        }
    }
}

/// A validated request to publish seats. Produced by the ledger's validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOffer {
    pub owner: Identity,
    pub total_seats: u32,
    pub category: Category,
    pub meeting_point: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub tour: TourId,
    pub owner: Identity,
    pub total_seats: u32,
    pub category: Category,
    pub meeting_point: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Offer {
    /// Stamp a draft with a fresh id and the store's clock.
    pub fn create(tour: TourId, draft: NewOffer) -> Self {
        Self {
            id: OfferId::new(),
            tour,
            owner: draft.owner,
            total_seats: draft.total_seats,
            category: draft.category,
            meeting_point: draft.meeting_point,
            created_at: Utc::now(),
        }
    }
}

/// One participant's claim on one seat.
///
/// `offer_owner` and `meeting_point` are copied from the offer at claim time so
/// a reservation can be displayed without resolving its offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub tour: TourId,
    pub offer_id: OfferId,
    pub claimant: Identity,
    pub offer_owner: Option<Identity>,
    pub meeting_point: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    pub fn for_offer(offer: &Offer, claimant: Identity) -> Self {
        Self {
            id: ReservationId::new(),
            tour: offer.tour.clone(),
            offer_id: offer.id,
            claimant,
            offer_owner: Some(offer.owner.clone()),
            meeting_point: offer.meeting_point.clone(),
            created_at: Utc::now(),
        }
    }
}

/// The two append-only marker lists of a tour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RosterKind {
    Payment,
    BusSignup,
}

impl RosterKind {
    pub const fn collection(self) -> Collection {
        match self {
            RosterKind::Payment => Collection::Payments,
            RosterKind::BusSignup => Collection::BusSignups,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            RosterKind::Payment => "payment",
            RosterKind::BusSignup => "bus_signup",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "payment" => Some(RosterKind::Payment),
            "bus_signup" => Some(RosterKind::BusSignup),
            _ => None,
        }
    }
}

/// A payment marker or a bus signup: identity plus timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterRecord {
    pub id: RecordId,
    pub tour: TourId,
    pub kind: RosterKind,
    pub identity: Identity,
    pub created_at: DateTime<Utc>,
}

impl RosterRecord {
    pub fn create(tour: TourId, kind: RosterKind, identity: Identity) -> Self {
        Self {
            id: RecordId::new(),
            tour,
            kind,
            identity,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupancy {
    pub claimed: u32,
    pub total: u32,
}

impl Occupancy {
    pub fn of(offer: &Offer, claimed: usize) -> Self {
        Self {
            claimed: u32::try_from(claimed).unwrap_or(u32::MAX),
            total: offer.total_seats,
        }
    }

    pub const fn available(&self) -> u32 {
        self.total.saturating_sub(self.claimed)
    }

    pub const fn is_full(&self) -> bool {
        self.claimed >= self.total
    }
}
