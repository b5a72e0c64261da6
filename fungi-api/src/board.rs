use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use futures_util::{future, Stream, StreamExt};
use fungi_core::TourId;
use fungi_ledger::{Board, BoardState};
use tokio_stream::wrappers::WatchStream;

use crate::error::AppError;
use crate::extract::ApiPath;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/tours/{tour}/board", get(board))
        .route("/v1/tours/{tour}/board/stream", get(board_stream))
}

/// GET /v1/tours/{tour}/board
/// Read straight from the store, never from a cached feed.
async fn board(
    State(state): State<AppState>,
    ApiPath(tour): ApiPath<String>,
) -> Result<Json<Board>, AppError> {
    let tour = TourId::parse(&tour)?;
    Ok(Json(state.ledger.snapshot(&tour).await?))
}

/// GET /v1/tours/{tour}/board/stream
///
/// Sends the whole board as a `board` event each time it is rebuilt, and an
/// `unavailable` event while the store cannot be read. A client that
/// reconnects receives the current board first.
async fn board_stream(
    State(state): State<AppState>,
    ApiPath(tour): ApiPath<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    let tour = TourId::parse(&tour)?;
    let rx = state.ledger.subscribe(&tour);
    tracing::debug!("Board stream opened for tour {}", tour);

    let stream = WatchStream::new(rx).filter_map(|current| {
        future::ready(match current {
            BoardState::Loading => None,
            BoardState::Ready(board) => Some(Event::default().event("board").json_data(&*board)),
            BoardState::Unavailable { reason } => Some(
                Event::default()
                    .event("unavailable")
                    .json_data(serde_json::json!({ "reason": reason })),
            ),
        })
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
