use fungi_core::{
    Authorizer, DocumentStore, Identity, LedgerError, LedgerResult, LedgerRules,
    NameMatchAuthorizer, Occupancy, Offer, OfferId, RecordId, Reservation, ReservationId,
    RosterKind, RosterRecord, TourId,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::admission;
use crate::board::{Board, BoardState};
use crate::live::{self, BoardFeeds};
use crate::validation::OfferRequest;

/// Admits and releases seat claims, and owns the tour rosters.
///
/// Identities arrive as raw user input and are validated here, so nothing
/// malformed reaches the store. Every seat claim goes through the store's
/// transactional read-check-insert; there is no cached fast path.
#[derive(Clone)]
pub struct SeatLedger {
    store: Arc<dyn DocumentStore>,
    authorizer: Arc<dyn Authorizer>,
    rules: Arc<LedgerRules>,
    feeds: Arc<BoardFeeds>,
}

impl SeatLedger {
    pub fn new(store: Arc<dyn DocumentStore>, rules: LedgerRules) -> Self {
        let feeds = BoardFeeds::new(store.clone(), rules.resync_interval());
        Self {
            store,
            authorizer: Arc::new(NameMatchAuthorizer),
            rules: Arc::new(rules),
            feeds: Arc::new(feeds),
        }
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    pub fn rules(&self) -> &LedgerRules {
        &self.rules
    }

    pub async fn create_offer(&self, tour: &TourId, request: OfferRequest) -> LedgerResult<Offer> {
        let draft = request.validate(&self.rules)?;
        let offer = self.store.insert_offer(tour, draft).await?;

        info!(
            "Offer {} created on tour {} by {} ({} seats, {})",
            offer.id,
            tour,
            offer.owner,
            offer.total_seats,
            offer.category.as_str()
        );
        Ok(offer)
    }

    pub async fn claim_seat(
        &self,
        tour: &TourId,
        offer_id: OfferId,
        claimant: &str,
    ) -> LedgerResult<Reservation> {
        let claimant = Identity::parse(claimant)?;

        let requester = claimant.clone();
        let check = move |offer: Option<&Offer>, held: &[Reservation]| {
            admission::admit(offer_id, &requester, offer, held)
        };

        match self.store.transact_claim(tour, offer_id, &claimant, &check).await {
            Ok(reservation) => {
                info!("{} claimed a seat on offer {} (reservation {})", claimant, offer_id, reservation.id);
                Ok(reservation)
            }
            Err(e) => {
                warn!("Claim by {} on offer {} rejected: {}", claimant, offer_id, e);
                Err(e)
            }
        }
    }

    pub async fn release_seat(
        &self,
        tour: &TourId,
        reservation_id: ReservationId,
        requester: &str,
    ) -> LedgerResult<()> {
        let requester = Identity::parse(requester)?;
        let reservation = self
            .store
            .get_reservation(tour, reservation_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("Reservation {}", reservation_id)))?;

        self.authorizer.authorize(&requester, &reservation.claimant).await?;

        if !self.store.delete_reservation(tour, reservation_id).await? {
            return Err(LedgerError::NotFound(format!("Reservation {}", reservation_id)));
        }

        info!("{} released reservation {} on offer {}", requester, reservation_id, reservation.offer_id);
        Ok(())
    }

    /// Delete an offer together with every reservation on it.
    /// Returns how many reservations were released.
    pub async fn delete_offer(
        &self,
        tour: &TourId,
        offer_id: OfferId,
        requester: &str,
    ) -> LedgerResult<usize> {
        let requester = Identity::parse(requester)?;
        let offer = self
            .store
            .get_offer(tour, offer_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("Offer {}", offer_id)))?;

        self.authorizer.authorize(&requester, &offer.owner).await?;

        let released = self
            .store
            .delete_offer_cascade(tour, offer_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("Offer {}", offer_id)))?;

        info!("Offer {} deleted by {}, {} reservations released", offer_id, requester, released);
        Ok(released)
    }

    /// Occupancy from committed state.
    pub async fn occupancy(&self, tour: &TourId, offer_id: OfferId) -> LedgerResult<Occupancy> {
        let offer = self
            .store
            .get_offer(tour, offer_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("Offer {}", offer_id)))?;
        let held = self.store.list_reservations(tour, Some(offer_id)).await?;

        Ok(Occupancy::of(&offer, held.len()))
    }

    pub async fn add_roster(
        &self,
        tour: &TourId,
        kind: RosterKind,
        identity: &str,
    ) -> LedgerResult<RosterRecord> {
        let identity = Identity::parse(identity)?;
        let record = self.store.insert_roster(tour, kind, identity).await?;

        info!("{} added to {} list of tour {}", record.identity, kind.as_str(), tour);
        Ok(record)
    }

    pub async fn remove_roster(
        &self,
        tour: &TourId,
        kind: RosterKind,
        record_id: RecordId,
        requester: &str,
    ) -> LedgerResult<()> {
        let requester = Identity::parse(requester)?;
        let record = self
            .store
            .get_roster(tour, kind, record_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("Record {}", record_id)))?;

        self.authorizer.authorize(&requester, &record.identity).await?;

        if !self.store.delete_roster(tour, kind, record_id).await? {
            return Err(LedgerError::NotFound(format!("Record {}", record_id)));
        }

        info!("{} removed from {} list of tour {}", requester, kind.as_str(), tour);
        Ok(())
    }

    pub async fn list_roster(&self, tour: &TourId, kind: RosterKind) -> LedgerResult<Vec<RosterRecord>> {
        Ok(self.store.list_roster(tour, kind).await?)
    }

    /// One-off board of the tour's committed state.
    pub async fn snapshot(&self, tour: &TourId) -> LedgerResult<Board> {
        live::load_board(self.store.as_ref(), tour).await
    }

    /// Live board of `tour`, rebuilt on every committed change. Subscribers
    /// of one tour share a single feed. Must be called from within a tokio
    /// runtime.
    pub fn subscribe(&self, tour: &TourId) -> watch::Receiver<BoardState> {
        self.feeds.subscribe(tour)
    }

    /// Number of tours whose board is currently kept live.
    pub fn live_boards(&self) -> usize {
        self.feeds.live_boards()
    }
}
