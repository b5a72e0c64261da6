use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use fungi_core::{Occupancy, Offer, OfferId, Reservation, ReservationId, TourId};
use fungi_ledger::OfferRequest;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ClaimRequest {
    pub claimant: String,
}

/// `?identity=` of the participant asking for a deletion.
#[derive(Debug, Deserialize)]
pub struct Requester {
    pub identity: String,
}

#[derive(Debug, Serialize)]
pub struct OfferDeletedResponse {
    pub offer_id: OfferId,
    pub released_reservations: usize,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/tours/{tour}/offers", post(create_offer))
        .route("/v1/tours/{tour}/offers/{offer_id}", delete(delete_offer))
        .route("/v1/tours/{tour}/offers/{offer_id}/occupancy", get(occupancy))
        .route("/v1/tours/{tour}/offers/{offer_id}/reservations", post(claim_seat))
        .route("/v1/tours/{tour}/reservations/{reservation_id}", delete(release_seat))
}

/// POST /v1/tours/{tour}/offers
async fn create_offer(
    State(state): State<AppState>,
    ApiPath(tour): ApiPath<String>,
    ApiJson(req): ApiJson<OfferRequest>,
) -> Result<(StatusCode, Json<Offer>), AppError> {
    let tour = TourId::parse(&tour)?;
    let offer = state.ledger.create_offer(&tour, req).await?;
    Ok((StatusCode::CREATED, Json(offer)))
}

/// DELETE /v1/tours/{tour}/offers/{offer_id}?identity=
/// Removes the offer and every seat claimed on it.
async fn delete_offer(
    State(state): State<AppState>,
    ApiPath((tour, offer_id)): ApiPath<(String, OfferId)>,
    ApiQuery(requester): ApiQuery<Requester>,
) -> Result<Json<OfferDeletedResponse>, AppError> {
    let tour = TourId::parse(&tour)?;
    let released = state.ledger.delete_offer(&tour, offer_id, &requester.identity).await?;

    Ok(Json(OfferDeletedResponse {
        offer_id,
        released_reservations: released,
    }))
}

async fn occupancy(
    State(state): State<AppState>,
    ApiPath((tour, offer_id)): ApiPath<(String, OfferId)>,
) -> Result<Json<Occupancy>, AppError> {
    let tour = TourId::parse(&tour)?;
    Ok(Json(state.ledger.occupancy(&tour, offer_id).await?))
}

/// POST /v1/tours/{tour}/offers/{offer_id}/reservations
async fn claim_seat(
    State(state): State<AppState>,
    ApiPath((tour, offer_id)): ApiPath<(String, OfferId)>,
    ApiJson(req): ApiJson<ClaimRequest>,
) -> Result<(StatusCode, Json<Reservation>), AppError> {
    let tour = TourId::parse(&tour)?;
    let reservation = state.ledger.claim_seat(&tour, offer_id, &req.claimant).await?;
    Ok((StatusCode::CREATED, Json(reservation)))
}

async fn release_seat(
    State(state): State<AppState>,
    ApiPath((tour, reservation_id)): ApiPath<(String, ReservationId)>,
    ApiQuery(requester): ApiQuery<Requester>,
) -> Result<StatusCode, AppError> {
    let tour = TourId::parse(&tour)?;
    state.ledger.release_seat(&tour, reservation_id, &requester.identity).await?;
    Ok(StatusCode::NO_CONTENT)
}
