use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fungi_core::{
    AdmissionCheck, Category, ChangeNotice, Collection, DocumentStore, Identity, LedgerError,
    LedgerResult, NewOffer, Offer, OfferId, RecordId, Reservation, ReservationId, RosterKind,
    RosterRecord, StoreError, TourId,
};
use sqlx::PgPool;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::feed::ChangeFeed;

/// Postgres-backed document store.
///
/// Claims run as `SERIALIZABLE` transactions; Postgres aborts one of two
/// overlapping read-check-insert sequences with a serialization failure and
/// the loser is re-run from the top.
pub struct PgStore {
    pool: PgPool,
    feed: ChangeFeed,
    max_attempts: u32,
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct OfferRow {
    id: Uuid,
    tour_id: String,
    owner_identity: String,
    total_seats: i32,
    category: String,
    meeting_point: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct ReservationRow {
    id: Uuid,
    tour_id: String,
    offer_id: Uuid,
    claimant_identity: String,
    offer_owner: Option<String>,
    meeting_point: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct RosterRow {
    id: Uuid,
    tour_id: String,
    kind: String,
    identity: String,
    created_at: DateTime<Utc>,
}

fn malformed(err: LedgerError) -> StoreError {
    StoreError::Malformed(err.to_string())
}

impl OfferRow {
    fn into_offer(self) -> Result<Offer, StoreError> {
        let category = Category::parse(&self.category)
            .ok_or_else(|| StoreError::Malformed(format!("unknown category '{}'", self.category)))?;
        let total_seats = u32::try_from(self.total_seats)
            .map_err(|_| StoreError::Malformed(format!("negative seat count on offer {}", self.id)))?;

        Ok(Offer {
            id: OfferId::from_uuid(self.id),
            tour: TourId::parse(&self.tour_id).map_err(malformed)?,
            owner: Identity::parse(&self.owner_identity).map_err(malformed)?,
            total_seats,
            category,
            meeting_point: self.meeting_point,
            created_at: self.created_at,
        })
    }
}

impl ReservationRow {
    fn into_reservation(self) -> Result<Reservation, StoreError> {
        let offer_owner = self
            .offer_owner
            .as_deref()
            .map(Identity::parse)
            .transpose()
            .map_err(malformed)?;

        Ok(Reservation {
            id: ReservationId::from_uuid(self.id),
            tour: TourId::parse(&self.tour_id).map_err(malformed)?,
            offer_id: OfferId::from_uuid(self.offer_id),
            claimant: Identity::parse(&self.claimant_identity).map_err(malformed)?,
            offer_owner,
            meeting_point: self.meeting_point,
            created_at: self.created_at,
        })
    }
}

impl RosterRow {
    fn into_record(self) -> Result<RosterRecord, StoreError> {
        let kind = RosterKind::parse(&self.kind)
            .ok_or_else(|| StoreError::Malformed(format!("unknown roster kind '{}'", self.kind)))?;

        Ok(RosterRecord {
            id: RecordId::from_uuid(self.id),
            tour: TourId::parse(&self.tour_id).map_err(malformed)?,
            kind,
            identity: Identity::parse(&self.identity).map_err(malformed)?,
            created_at: self.created_at,
        })
    }
}

fn unavailable(err: sqlx::Error) -> StoreError {
    error!("Postgres error: {}", err);
    StoreError::Unavailable(err.to_string())
}

/// Serialization failure, deadlock, or a lost race on the one-seat-per-claimant index.
fn is_conflict(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            matches!(db.code().as_deref(), Some("40001") | Some("40P01") | Some("23505"))
        }
        _ => false,
    }
}

enum ClaimFailure {
    Rejected(LedgerError),
    Conflict(sqlx::Error),
    Store(StoreError),
}

impl From<sqlx::Error> for ClaimFailure {
    fn from(err: sqlx::Error) -> Self {
        if is_conflict(&err) {
            ClaimFailure::Conflict(err)
        } else {
            ClaimFailure::Store(unavailable(err))
        }
    }
}

impl PgStore {
    pub fn new(pool: PgPool, max_attempts: u32) -> Self {
        Self {
            pool,
            feed: ChangeFeed::new(),
            max_attempts: max_attempts.max(1),
        }
    }

    async fn try_claim(
        &self,
        tour: &TourId,
        offer_id: OfferId,
        claimant: &Identity,
        admit: &AdmissionCheck,
    ) -> Result<Reservation, ClaimFailure> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;

        let offer = sqlx::query_as::<_, OfferRow>(
            r#"
            SELECT id, tour_id, owner_identity, total_seats, category, meeting_point, created_at
            FROM offers
            WHERE tour_id = $1 AND id = $2
            "#,
        )
        .bind(tour.as_str())
        .bind(offer_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .map(OfferRow::into_offer)
        .transpose()
        .map_err(ClaimFailure::Store)?;

        let held = sqlx::query_as::<_, ReservationRow>(
            r#"
            SELECT id, tour_id, offer_id, claimant_identity, offer_owner, meeting_point, created_at
            FROM reservations
            WHERE tour_id = $1 AND offer_id = $2
            ORDER BY created_at, id
            "#,
        )
        .bind(tour.as_str())
        .bind(offer_id.as_uuid())
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(ReservationRow::into_reservation)
        .collect::<Result<Vec<_>, _>>()
        .map_err(ClaimFailure::Store)?;

        // Dropping `tx` on rejection rolls it back
        admit(offer.as_ref(), &held).map_err(ClaimFailure::Rejected)?;
        let offer = offer.ok_or_else(|| {
            ClaimFailure::Rejected(LedgerError::NotFound(format!("Offer {}", offer_id)))
        })?;

        let draft = Reservation::for_offer(&offer, claimant.clone());
        let row = sqlx::query_as::<_, ReservationRow>(
            r#"
            INSERT INTO reservations (id, tour_id, offer_id, claimant_identity, offer_owner, meeting_point)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, tour_id, offer_id, claimant_identity, offer_owner, meeting_point, created_at
            "#,
        )
        .bind(draft.id.as_uuid())
        .bind(tour.as_str())
        .bind(offer_id.as_uuid())
        .bind(draft.claimant.as_str())
        .bind(draft.offer_owner.as_ref().map(Identity::as_str))
        .bind(draft.meeting_point.as_deref())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        row.into_reservation().map_err(ClaimFailure::Store)
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn insert_offer(&self, tour: &TourId, draft: NewOffer) -> Result<Offer, StoreError> {
        let total_seats = i32::try_from(draft.total_seats)
            .map_err(|_| StoreError::Malformed(format!("seat count {} out of range", draft.total_seats)))?;

        let row = sqlx::query_as::<_, OfferRow>(
            r#"
            INSERT INTO offers (id, tour_id, owner_identity, total_seats, category, meeting_point)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, tour_id, owner_identity, total_seats, category, meeting_point, created_at
            "#,
        )
        .bind(OfferId::new().as_uuid())
        .bind(tour.as_str())
        .bind(draft.owner.as_str())
        .bind(total_seats)
        .bind(draft.category.as_str())
        .bind(draft.meeting_point.as_deref())
        .fetch_one(&self.pool)
        .await
        .map_err(unavailable)?;

        let offer = row.into_offer()?;
        self.feed.publish(tour, Collection::Offers);
        Ok(offer)
    }

    async fn get_offer(&self, tour: &TourId, id: OfferId) -> Result<Option<Offer>, StoreError> {
        sqlx::query_as::<_, OfferRow>(
            r#"
            SELECT id, tour_id, owner_identity, total_seats, category, meeting_point, created_at
            FROM offers
            WHERE tour_id = $1 AND id = $2
            "#,
        )
        .bind(tour.as_str())
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?
        .map(OfferRow::into_offer)
        .transpose()
    }

    async fn list_offers(&self, tour: &TourId) -> Result<Vec<Offer>, StoreError> {
        sqlx::query_as::<_, OfferRow>(
            r#"
            SELECT id, tour_id, owner_identity, total_seats, category, meeting_point, created_at
            FROM offers
            WHERE tour_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(tour.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?
        .into_iter()
        .map(OfferRow::into_offer)
        .collect()
    }

    async fn delete_offer_cascade(
        &self,
        tour: &TourId,
        id: OfferId,
    ) -> Result<Option<usize>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(unavailable)?;

        let removed = sqlx::query("DELETE FROM reservations WHERE tour_id = $1 AND offer_id = $2")
            .bind(tour.as_str())
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(unavailable)?
            .rows_affected();

        let deleted = sqlx::query("DELETE FROM offers WHERE tour_id = $1 AND id = $2")
            .bind(tour.as_str())
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(unavailable)?
            .rows_affected();

        if deleted == 0 {
            tx.rollback().await.map_err(unavailable)?;
            return Ok(None);
        }

        tx.commit().await.map_err(unavailable)?;

        if removed > 0 {
            self.feed.publish(tour, Collection::Reservations);
        }
        self.feed.publish(tour, Collection::Offers);
        Ok(Some(removed as usize))
    }

    async fn get_reservation(
        &self,
        tour: &TourId,
        id: ReservationId,
    ) -> Result<Option<Reservation>, StoreError> {
        sqlx::query_as::<_, ReservationRow>(
            r#"
            SELECT id, tour_id, offer_id, claimant_identity, offer_owner, meeting_point, created_at
            FROM reservations
            WHERE tour_id = $1 AND id = $2
            "#,
        )
        .bind(tour.as_str())
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?
        .map(ReservationRow::into_reservation)
        .transpose()
    }

    async fn list_reservations(
        &self,
        tour: &TourId,
        offer: Option<OfferId>,
    ) -> Result<Vec<Reservation>, StoreError> {
        sqlx::query_as::<_, ReservationRow>(
            r#"
            SELECT id, tour_id, offer_id, claimant_identity, offer_owner, meeting_point, created_at
            FROM reservations
            WHERE tour_id = $1 AND ($2::uuid IS NULL OR offer_id = $2)
            ORDER BY created_at, id
            "#,
        )
        .bind(tour.as_str())
        .bind(offer.map(|id| id.as_uuid()))
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?
        .into_iter()
        .map(ReservationRow::into_reservation)
        .collect()
    }

    async fn delete_reservation(&self, tour: &TourId, id: ReservationId) -> Result<bool, StoreError> {
        let affected = sqlx::query("DELETE FROM reservations WHERE tour_id = $1 AND id = $2")
            .bind(tour.as_str())
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(unavailable)?
            .rows_affected();

        if affected > 0 {
            self.feed.publish(tour, Collection::Reservations);
        }
        Ok(affected > 0)
    }

    async fn transact_claim(
        &self,
        tour: &TourId,
        offer_id: OfferId,
        claimant: &Identity,
        admit: &AdmissionCheck,
    ) -> LedgerResult<Reservation> {
        for attempt in 1..=self.max_attempts {
            match self.try_claim(tour, offer_id, claimant, admit).await {
                Ok(reservation) => {
                    info!("Reservation {} committed on offer {} (attempt {})", reservation.id, offer_id, attempt);
                    self.feed.publish(tour, Collection::Reservations);
                    return Ok(reservation);
                }
                Err(ClaimFailure::Rejected(rejection)) => return Err(rejection),
                Err(ClaimFailure::Store(err)) => return Err(err.into()),
                Err(ClaimFailure::Conflict(err)) => {
                    warn!(
                        "Claim by {} on offer {} conflicted (attempt {}/{}): {}",
                        claimant, offer_id, attempt, self.max_attempts, err
                    );
                    tokio::time::sleep(Duration::from_millis(10 * u64::from(attempt))).await;
                }
            }
        }

        Err(StoreError::RetriesExhausted(self.max_attempts).into())
    }

    async fn insert_roster(
        &self,
        tour: &TourId,
        kind: RosterKind,
        identity: Identity,
    ) -> Result<RosterRecord, StoreError> {
        let row = sqlx::query_as::<_, RosterRow>(
            r#"
            INSERT INTO roster_records (id, tour_id, kind, identity)
            VALUES ($1, $2, $3, $4)
            RETURNING id, tour_id, kind, identity, created_at
            "#,
        )
        .bind(RecordId::new().as_uuid())
        .bind(tour.as_str())
        .bind(kind.as_str())
        .bind(identity.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(unavailable)?;

        let record = row.into_record()?;
        self.feed.publish(tour, kind.collection());
        Ok(record)
    }

    async fn get_roster(
        &self,
        tour: &TourId,
        kind: RosterKind,
        id: RecordId,
    ) -> Result<Option<RosterRecord>, StoreError> {
        sqlx::query_as::<_, RosterRow>(
            r#"
            SELECT id, tour_id, kind, identity, created_at
            FROM roster_records
            WHERE tour_id = $1 AND kind = $2 AND id = $3
            "#,
        )
        .bind(tour.as_str())
        .bind(kind.as_str())
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)?
        .map(RosterRow::into_record)
        .transpose()
    }

    async fn list_roster(&self, tour: &TourId, kind: RosterKind) -> Result<Vec<RosterRecord>, StoreError> {
        sqlx::query_as::<_, RosterRow>(
            r#"
            SELECT id, tour_id, kind, identity, created_at
            FROM roster_records
            WHERE tour_id = $1 AND kind = $2
            ORDER BY created_at, id
            "#,
        )
        .bind(tour.as_str())
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?
        .into_iter()
        .map(RosterRow::into_record)
        .collect()
    }

    async fn delete_roster(&self, tour: &TourId, kind: RosterKind, id: RecordId) -> Result<bool, StoreError> {
        let affected = sqlx::query("DELETE FROM roster_records WHERE tour_id = $1 AND kind = $2 AND id = $3")
            .bind(tour.as_str())
            .bind(kind.as_str())
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(unavailable)?
            .rows_affected();

        if affected > 0 {
            self.feed.publish(tour, kind.collection());
        }
        Ok(affected > 0)
    }

    // TODO: relay Postgres LISTEN/NOTIFY into the feed so boards served by other
    // API processes see this process's writes.
    fn changes(&self) -> broadcast::Receiver<ChangeNotice> {
        self.feed.subscribe()
    }
}
