use async_trait::async_trait;
use fungi_core::{
    AdmissionCheck, ChangeNotice, Collection, DocumentStore, Identity, LedgerError, LedgerResult,
    NewOffer, Offer, OfferId, RecordId, Reservation, ReservationId, RosterKind, RosterRecord,
    StoreError, TourId,
};
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};

use crate::feed::ChangeFeed;

/// In-process document store.
///
/// Claims use optimistic concurrency: each offer carries a seat version that
/// every reservation insert/delete on it bumps. A claim reads under a shared
/// lock, runs the admission check with no lock held, and commits only if the
/// version it read is still current; otherwise the whole claim is re-run.
pub struct MemoryStore {
    tours: RwLock<HashMap<TourId, TourDocs>>,
    feed: ChangeFeed,
    max_attempts: u32,
}

#[derive(Default)]
struct TourDocs {
    offers: HashMap<OfferId, Offer>,
    reservations: HashMap<ReservationId, Reservation>,
    payments: HashMap<RecordId, RosterRecord>,
    bus_signups: HashMap<RecordId, RosterRecord>,
    seat_versions: HashMap<OfferId, u64>,
}

impl TourDocs {
    fn seat_version(&self, offer_id: OfferId) -> u64 {
        self.seat_versions.get(&offer_id).copied().unwrap_or(0)
    }

    fn bump(&mut self, offer_id: OfferId) {
        *self.seat_versions.entry(offer_id).or_insert(0) += 1;
    }

    fn reservations_of(&self, offer_id: OfferId) -> Vec<Reservation> {
        let mut held: Vec<Reservation> = self
            .reservations
            .values()
            .filter(|r| r.offer_id == offer_id)
            .cloned()
            .collect();
        held.sort_by_key(|r| (r.created_at, r.id));
        held
    }

    fn roster(&self, kind: RosterKind) -> &HashMap<RecordId, RosterRecord> {
        match kind {
            RosterKind::Payment => &self.payments,
            RosterKind::BusSignup => &self.bus_signups,
        }
    }

    fn roster_mut(&mut self, kind: RosterKind) -> &mut HashMap<RecordId, RosterRecord> {
        match kind {
            RosterKind::Payment => &mut self.payments,
            RosterKind::BusSignup => &mut self.bus_signups,
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_attempts(crate::DEFAULT_TRANSACTION_ATTEMPTS)
    }

    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            tours: RwLock::new(HashMap::new()),
            feed: ChangeFeed::new(),
            max_attempts: max_attempts.max(1),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert_offer(&self, tour: &TourId, draft: NewOffer) -> Result<Offer, StoreError> {
        let offer = Offer::create(tour.clone(), draft);
        {
            let mut tours = self.tours.write().await;
            tours.entry(tour.clone()).or_default().offers.insert(offer.id, offer.clone());
        }
        self.feed.publish(tour, Collection::Offers);
        Ok(offer)
    }

    async fn get_offer(&self, tour: &TourId, id: OfferId) -> Result<Option<Offer>, StoreError> {
        let tours = self.tours.read().await;
        Ok(tours.get(tour).and_then(|docs| docs.offers.get(&id).cloned()))
    }

    async fn list_offers(&self, tour: &TourId) -> Result<Vec<Offer>, StoreError> {
        let tours = self.tours.read().await;
        let mut offers: Vec<Offer> = tours
            .get(tour)
            .map(|docs| docs.offers.values().cloned().collect())
            .unwrap_or_default();
        offers.sort_by_key(|o| (o.created_at, o.id));
        Ok(offers)
    }

    async fn delete_offer_cascade(
        &self,
        tour: &TourId,
        id: OfferId,
    ) -> Result<Option<usize>, StoreError> {
        let removed = {
            let mut tours = self.tours.write().await;
            let Some(docs) = tours.get_mut(tour) else {
                return Ok(None);
            };
            if !docs.offers.contains_key(&id) {
                return Ok(None);
            }

            let before = docs.reservations.len();
            docs.reservations.retain(|_, r| r.offer_id != id);
            let removed = before - docs.reservations.len();
            docs.offers.remove(&id);
            // Claims re-check that the offer exists, so its version can go
            docs.seat_versions.remove(&id);
            removed
        };

        if removed > 0 {
            self.feed.publish(tour, Collection::Reservations);
        }
        self.feed.publish(tour, Collection::Offers);
        Ok(Some(removed))
    }

    async fn get_reservation(
        &self,
        tour: &TourId,
        id: ReservationId,
    ) -> Result<Option<Reservation>, StoreError> {
        let tours = self.tours.read().await;
        Ok(tours.get(tour).and_then(|docs| docs.reservations.get(&id).cloned()))
    }

    async fn list_reservations(
        &self,
        tour: &TourId,
        offer: Option<OfferId>,
    ) -> Result<Vec<Reservation>, StoreError> {
        let tours = self.tours.read().await;
        let Some(docs) = tours.get(tour) else {
            return Ok(Vec::new());
        };

        let mut reservations: Vec<Reservation> = docs
            .reservations
            .values()
            .filter(|r| offer.map_or(true, |id| r.offer_id == id))
            .cloned()
            .collect();
        reservations.sort_by_key(|r| (r.created_at, r.id));
        Ok(reservations)
    }

    async fn delete_reservation(&self, tour: &TourId, id: ReservationId) -> Result<bool, StoreError> {
        let deleted = {
            let mut tours = self.tours.write().await;
            match tours.get_mut(tour) {
                Some(docs) => match docs.reservations.remove(&id) {
                    Some(reservation) => {
                        docs.bump(reservation.offer_id);
                        true
                    }
                    None => false,
                },
                None => false,
            }
        };

        if deleted {
            self.feed.publish(tour, Collection::Reservations);
        }
        Ok(deleted)
    }

    async fn transact_claim(
        &self,
        tour: &TourId,
        offer_id: OfferId,
        claimant: &Identity,
        admit: &AdmissionCheck,
    ) -> LedgerResult<Reservation> {
        for attempt in 1..=self.max_attempts {
            // Read phase
            let (offer, held, version) = {
                let tours = self.tours.read().await;
                match tours.get(tour) {
                    Some(docs) => (
                        docs.offers.get(&offer_id).cloned(),
                        docs.reservations_of(offer_id),
                        docs.seat_version(offer_id),
                    ),
                    None => (None, Vec::new(), 0),
                }
            };

            admit(offer.as_ref(), &held)?;
            let offer = offer.ok_or_else(|| LedgerError::NotFound(format!("Offer {}", offer_id)))?;

            // Commit phase
            let reservation = {
                let mut tours = self.tours.write().await;
                let docs = tours.entry(tour.clone()).or_default();
                if docs.seat_version(offer_id) != version || !docs.offers.contains_key(&offer_id) {
                    warn!(
                        "Claim by {} on offer {} conflicted with a concurrent write (attempt {}/{})",
                        claimant, offer_id, attempt, self.max_attempts
                    );
                    continue;
                }

                let reservation = Reservation::for_offer(&offer, claimant.clone());
                docs.reservations.insert(reservation.id, reservation.clone());
                docs.bump(offer_id);
                reservation
            };

            info!("Reservation {} committed on offer {} (attempt {})", reservation.id, offer_id, attempt);
            self.feed.publish(tour, Collection::Reservations);
            return Ok(reservation);
        }

        Err(StoreError::RetriesExhausted(self.max_attempts).into())
    }

    async fn insert_roster(
        &self,
        tour: &TourId,
        kind: RosterKind,
        identity: Identity,
    ) -> Result<RosterRecord, StoreError> {
        let record = RosterRecord::create(tour.clone(), kind, identity);
        {
            let mut tours = self.tours.write().await;
            tours
                .entry(tour.clone())
                .or_default()
                .roster_mut(kind)
                .insert(record.id, record.clone());
        }
        self.feed.publish(tour, kind.collection());
        Ok(record)
    }

    async fn get_roster(
        &self,
        tour: &TourId,
        kind: RosterKind,
        id: RecordId,
    ) -> Result<Option<RosterRecord>, StoreError> {
        let tours = self.tours.read().await;
        Ok(tours.get(tour).and_then(|docs| docs.roster(kind).get(&id).cloned()))
    }

    async fn list_roster(&self, tour: &TourId, kind: RosterKind) -> Result<Vec<RosterRecord>, StoreError> {
        let tours = self.tours.read().await;
        let mut records: Vec<RosterRecord> = tours
            .get(tour)
            .map(|docs| docs.roster(kind).values().cloned().collect())
            .unwrap_or_default();
        records.sort_by_key(|r| (r.created_at, r.id));
        Ok(records)
    }

    async fn delete_roster(&self, tour: &TourId, kind: RosterKind, id: RecordId) -> Result<bool, StoreError> {
        let deleted = {
            let mut tours = self.tours.write().await;
            tours
                .get_mut(tour)
                .map(|docs| docs.roster_mut(kind).remove(&id).is_some())
                .unwrap_or(false)
        };

        if deleted {
            self.feed.publish(tour, kind.collection());
        }
        Ok(deleted)
    }

    fn changes(&self) -> broadcast::Receiver<ChangeNotice> {
        self.feed.subscribe()
    }
}
