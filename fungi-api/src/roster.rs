use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use fungi_core::{RecordId, RosterKind, RosterRecord, TourId};
use serde::Deserialize;

use crate::error::AppError;
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::offers::Requester;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RosterRequest {
    pub identity: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/tours/{tour}/payments", get(list_payments).post(add_payment))
        .route("/v1/tours/{tour}/payments/{record_id}", delete(remove_payment))
        .route("/v1/tours/{tour}/bus-signups", get(list_bus_signups).post(add_bus_signup))
        .route("/v1/tours/{tour}/bus-signups/{record_id}", delete(remove_bus_signup))
}

async fn list_payments(
    State(state): State<AppState>,
    ApiPath(tour): ApiPath<String>,
) -> Result<Json<Vec<RosterRecord>>, AppError> {
    list(&state, &tour, RosterKind::Payment).await
}

async fn add_payment(
    State(state): State<AppState>,
    ApiPath(tour): ApiPath<String>,
    ApiJson(req): ApiJson<RosterRequest>,
) -> Result<(StatusCode, Json<RosterRecord>), AppError> {
    add(&state, &tour, req, RosterKind::Payment).await
}

async fn remove_payment(
    State(state): State<AppState>,
    ApiPath((tour, record_id)): ApiPath<(String, RecordId)>,
    ApiQuery(requester): ApiQuery<Requester>,
) -> Result<StatusCode, AppError> {
    remove(&state, &tour, record_id, requester, RosterKind::Payment).await
}

async fn list_bus_signups(
    State(state): State<AppState>,
    ApiPath(tour): ApiPath<String>,
) -> Result<Json<Vec<RosterRecord>>, AppError> {
    list(&state, &tour, RosterKind::BusSignup).await
}

async fn add_bus_signup(
    State(state): State<AppState>,
    ApiPath(tour): ApiPath<String>,
    ApiJson(req): ApiJson<RosterRequest>,
) -> Result<(StatusCode, Json<RosterRecord>), AppError> {
    add(&state, &tour, req, RosterKind::BusSignup).await
}

async fn remove_bus_signup(
    State(state): State<AppState>,
    ApiPath((tour, record_id)): ApiPath<(String, RecordId)>,
    ApiQuery(requester): ApiQuery<Requester>,
) -> Result<StatusCode, AppError> {
    remove(&state, &tour, record_id, requester, RosterKind::BusSignup).await
}

async fn list(
    state: &AppState,
    tour: &str,
    kind: RosterKind,
) -> Result<Json<Vec<RosterRecord>>, AppError> {
    let tour = TourId::parse(tour)?;
    Ok(Json(state.ledger.list_roster(&tour, kind).await?))
}

async fn add(
    state: &AppState,
    tour: &str,
    req: RosterRequest,
    kind: RosterKind,
) -> Result<(StatusCode, Json<RosterRecord>), AppError> {
    let tour = TourId::parse(tour)?;
    let record = state.ledger.add_roster(&tour, kind, &req.identity).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn remove(
    state: &AppState,
    tour: &str,
    record_id: RecordId,
    requester: Requester,
    kind: RosterKind,
) -> Result<StatusCode, AppError> {
    let tour = TourId::parse(tour)?;
    state.ledger.remove_roster(&tour, kind, record_id, &requester.identity).await?;
    Ok(StatusCode::NO_CONTENT)
}
