use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use fungi_api::{app, AppState};
use fungi_core::LedgerRules;
use fungi_ledger::SeatLedger;
use fungi_store::MemoryStore;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn test_app() -> Router {
    let ledger = SeatLedger::new(Arc::new(MemoryStore::new()), LedgerRules::default());
    app(AppState::new(ledger))
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn create_car(app: &Router, owner: &str, seats: i64) -> String {
    let (status, offer) = call(
        app,
        Method::POST,
        "/v1/tours/autumn/offers",
        Some(json!({ "owner": owner, "total_seats": seats })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    offer["id"].as_str().unwrap().to_string()
}

async fn claim(app: &Router, offer_id: &str, claimant: &str) -> (StatusCode, Value) {
    call(
        app,
        Method::POST,
        &format!("/v1/tours/autumn/offers/{}/reservations", offer_id),
        Some(json!({ "claimant": claimant })),
    )
    .await
}

#[tokio::test]
async fn test_health() {
    let app = test_app();
    let (status, body) = call(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_claim_flow_reports_rule_violated() {
    let app = test_app();
    let offer_id = create_car(&app, "Owner", 2).await;

    let (status, seat) = claim(&app, &offer_id, "A").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(seat["claimant"], "A");
    assert_eq!(seat["offer_owner"], "Owner");

    let (status, err) = claim(&app, &offer_id, "a").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["code"], "already_claimed");

    claim(&app, &offer_id, "B").await;
    let (status, err) = claim(&app, &offer_id, "C").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["code"], "full");

    let (status, occupancy) = call(
        &app,
        Method::GET,
        &format!("/v1/tours/autumn/offers/{}/occupancy", offer_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(occupancy, json!({ "claimed": 2, "total": 2 }));
}

#[tokio::test]
async fn test_invalid_offer_is_bad_request() {
    let app = test_app();

    let (status, err) = call(
        &app,
        Method::POST,
        "/v1/tours/autumn/offers",
        Some(json!({ "owner": "Ana", "total_seats": 51 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["code"], "validation_error");

    let (status, err) = call(
        &app,
        Method::POST,
        "/v1/tours/autumn/offers",
        Some(json!({ "owner": "Ana", "total_seats": 12, "category": "shared_shuttle" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["code"], "validation_error");
}

#[tokio::test]
async fn test_release_and_delete_require_matching_identity() {
    let app = test_app();
    let offer_id = create_car(&app, "Owner", 3).await;
    let (_, seat) = claim(&app, &offer_id, "Lucie").await;
    let reservation_id = seat["id"].as_str().unwrap();

    let (status, err) = call(
        &app,
        Method::DELETE,
        &format!("/v1/tours/autumn/reservations/{}?identity=Mallory", reservation_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(err["code"], "not_authorized");

    let (status, _) = call(
        &app,
        Method::DELETE,
        &format!("/v1/tours/autumn/offers/{}?identity=Mallory", offer_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(
        &app,
        Method::DELETE,
        &format!("/v1/tours/autumn/reservations/{}?identity=lucie", reservation_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_delete_offer_cascades() {
    let app = test_app();
    let offer_id = create_car(&app, "Owner", 3).await;
    let (_, seat) = claim(&app, &offer_id, "A").await;
    let reservation_id = seat["id"].as_str().unwrap();

    let (status, body) = call(
        &app,
        Method::DELETE,
        &format!("/v1/tours/autumn/offers/{}?identity=owner", offer_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["released_reservations"], 1);

    let (status, err) = call(
        &app,
        Method::DELETE,
        &format!("/v1/tours/autumn/reservations/{}?identity=A", reservation_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(err["code"], "not_found");

    let (_, board) = call(&app, Method::GET, "/v1/tours/autumn/board", None).await;
    assert_eq!(board["offers"], json!([]));
}

#[tokio::test]
async fn test_board_and_roster() {
    let app = test_app();
    let offer_id = create_car(&app, "Ana", 4).await;
    claim(&app, &offer_id, "Bo").await;

    let (status, record) = call(
        &app,
        Method::POST,
        "/v1/tours/autumn/payments",
        Some(json!({ "identity": "Bo" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = call(
        &app,
        Method::POST,
        "/v1/tours/autumn/bus-signups",
        Some(json!({ "identity": "Cy" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, board) = call(&app, Method::GET, "/v1/tours/autumn/board", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(board["offers"][0]["occupancy"], json!({ "claimed": 1, "total": 4 }));
    assert_eq!(board["offers"][0]["reservations"][0]["claimant"], "Bo");
    assert_eq!(board["payments"][0]["identity"], "Bo");
    assert_eq!(board["bus_signups"][0]["identity"], "Cy");

    let (status, _) = call(
        &app,
        Method::DELETE,
        &format!("/v1/tours/autumn/payments/{}?identity=Cy", record["id"].as_str().unwrap()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, payments) = call(&app, Method::GET, "/v1/tours/autumn/payments", None).await;
    assert_eq!(payments.as_array().unwrap().len(), 1);

    // Other tours see nothing
    let (_, other) = call(&app, Method::GET, "/v1/tours/spring/board", None).await;
    assert_eq!(other["offers"], json!([]));
}

#[tokio::test]
async fn test_unknown_offer_is_not_found() {
    let app = test_app();
    let missing = uuid::Uuid::new_v4();

    let (status, err) = claim(&app, &missing.to_string(), "A").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(err["code"], "not_found");
}

#[tokio::test]
async fn test_board_stream_is_event_stream() {
    let app = test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/tours/autumn/board/stream")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );
}

#[tokio::test]
async fn test_bad_tour_id_rejected() {
    let app = test_app();
    let (status, err) = call(&app, Method::GET, "/v1/tours/no%20spaces/board", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["code"], "validation_error");
}

#[tokio::test]
async fn test_missing_identity_is_validation_error() {
    let app = test_app();
    let offer_id = create_car(&app, "Owner", 2).await;
    let (_, seat) = claim(&app, &offer_id, "A").await;
    let reservation_id = seat["id"].as_str().unwrap();

    let (status, err) = call(
        &app,
        Method::DELETE,
        &format!("/v1/tours/autumn/reservations/{}", reservation_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["code"], "validation_error");
    assert!(err["error"].as_str().unwrap().contains("identity"));

    let (_, record) = call(
        &app,
        Method::POST,
        "/v1/tours/autumn/bus-signups",
        Some(json!({ "identity": "Cy" })),
    )
    .await;
    let (status, err) = call(
        &app,
        Method::DELETE,
        &format!("/v1/tours/autumn/bus-signups/{}", record["id"].as_str().unwrap()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["code"], "validation_error");

    // Nothing was released
    let (_, occupancy) = call(
        &app,
        Method::GET,
        &format!("/v1/tours/autumn/offers/{}/occupancy", offer_id),
        None,
    )
    .await;
    assert_eq!(occupancy["claimed"], 1);
}

#[tokio::test]
async fn test_malformed_path_id_is_validation_error() {
    let app = test_app();

    let (status, err) = claim(&app, "not-a-uuid", "A").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["code"], "validation_error");

    let (status, err) = call(
        &app,
        Method::DELETE,
        "/v1/tours/autumn/payments/12345?identity=Cy",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["code"], "validation_error");
}

#[tokio::test]
async fn test_malformed_body_is_validation_error() {
    let app = test_app();

    let (status, err) = call(
        &app,
        Method::POST,
        "/v1/tours/autumn/offers",
        Some(json!({ "owner": "Ana", "total_seats": 2.5 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["code"], "validation_error");

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/v1/tours/autumn/offers")
                .body(Body::from("owner=Ana"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let err: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(err["code"], "validation_error");
}
