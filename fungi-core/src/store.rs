use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::error::{LedgerResult, StoreError};
use crate::identity::Identity;
use crate::ids::{OfferId, RecordId, ReservationId, TourId};
use crate::model::{NewOffer, Offer, Reservation, RosterKind, RosterRecord};

/// Collections of a tour, named by their document path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Collection {
    Offers,
    Reservations,
    Payments,
    BusSignups,
}

impl Collection {
    pub const fn path(self) -> &'static str {
        match self {
            Collection::Offers => "offers",
            Collection::Reservations => "reservations",
            Collection::Payments => "payments",
            Collection::BusSignups => "busSignups",
        }
    }
}

/// Published after every committed mutation. Carries no payload: subscribers
/// re-read the collection and replace their view wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeNotice {
    pub tour: TourId,
    pub collection: Collection,
}

/// Admission check evaluated inside a claim transaction against the freshly
/// re-read offer (`None` if it is gone) and its current reservations.
pub type AdmissionCheck = dyn Fn(Option<&Offer>, &[Reservation]) -> LedgerResult<()> + Send + Sync;

/// Durable storage for one or more tours.
///
/// Lists are ordered by creation time ascending. Per-document writes are
/// atomic; `transact_claim` is the only multi-document read-modify-write.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert_offer(&self, tour: &TourId, draft: NewOffer) -> Result<Offer, StoreError>;

    async fn get_offer(&self, tour: &TourId, id: OfferId) -> Result<Option<Offer>, StoreError>;

    async fn list_offers(&self, tour: &TourId) -> Result<Vec<Offer>, StoreError>;

    /// Remove an offer and every reservation referencing it.
    /// Returns the number of reservations removed, `None` if the offer is absent.
    async fn delete_offer_cascade(
        &self,
        tour: &TourId,
        id: OfferId,
    ) -> Result<Option<usize>, StoreError>;

    async fn get_reservation(
        &self,
        tour: &TourId,
        id: ReservationId,
    ) -> Result<Option<Reservation>, StoreError>;

    /// All reservations of the tour, or only those of `offer` when given.
    async fn list_reservations(
        &self,
        tour: &TourId,
        offer: Option<OfferId>,
    ) -> Result<Vec<Reservation>, StoreError>;

    /// Returns `false` when nothing was deleted.
    async fn delete_reservation(&self, tour: &TourId, id: ReservationId) -> Result<bool, StoreError>;

    /// Re-read the offer and its reservations, run `admit`, and insert a
    /// reservation for `claimant` only if it passes, all as one transaction.
    ///
    /// When a conflicting write commits between the read and the insert the
    /// whole sequence is re-run, up to the backend's attempt budget.
    /// Rejections from `admit` are returned unchanged and never retried.
    async fn transact_claim(
        &self,
        tour: &TourId,
        offer_id: OfferId,
        claimant: &Identity,
        admit: &AdmissionCheck,
    ) -> LedgerResult<Reservation>;

    async fn insert_roster(
        &self,
        tour: &TourId,
        kind: RosterKind,
        identity: Identity,
    ) -> Result<RosterRecord, StoreError>;

    async fn get_roster(
        &self,
        tour: &TourId,
        kind: RosterKind,
        id: RecordId,
    ) -> Result<Option<RosterRecord>, StoreError>;

    async fn list_roster(&self, tour: &TourId, kind: RosterKind) -> Result<Vec<RosterRecord>, StoreError>;

    async fn delete_roster(&self, tour: &TourId, kind: RosterKind, id: RecordId) -> Result<bool, StoreError>;

    /// Subscribe to change notices for every tour held by this store.
    fn changes(&self) -> broadcast::Receiver<ChangeNotice>;
}
