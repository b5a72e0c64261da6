use fungi_core::{
    Category, DocumentStore, Identity, LedgerError, LedgerRules, Occupancy, Offer, RosterKind,
    TourId,
};
use fungi_ledger::{OfferRequest, SeatLedger};
use fungi_store::MemoryStore;
use std::sync::Arc;

fn tour() -> TourId {
    TourId::parse("autumn-2026").unwrap()
}

fn setup() -> (SeatLedger, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::with_attempts(25));
    let ledger = SeatLedger::new(store.clone(), LedgerRules::default());
    (ledger, store)
}

async fn car(ledger: &SeatLedger, owner: &str, seats: i64) -> Offer {
    ledger
        .create_offer(
            &tour(),
            OfferRequest {
                owner: owner.into(),
                total_seats: seats,
                category: Category::PrivateCar,
                meeting_point: None,
            },
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_duplicate_claim_rejected() {
    let (ledger, _) = setup();
    let offer = car(&ledger, "Owner", 2).await;

    ledger.claim_seat(&tour(), offer.id, "A").await.unwrap();
    assert_eq!(
        ledger.occupancy(&tour(), offer.id).await.unwrap(),
        Occupancy { claimed: 1, total: 2 }
    );

    let again = ledger.claim_seat(&tour(), offer.id, " a ").await;
    assert!(matches!(again, Err(LedgerError::AlreadyClaimed { .. })));
    assert_eq!(ledger.occupancy(&tour(), offer.id).await.unwrap().claimed, 1);
}

#[tokio::test]
async fn test_full_offer_rejects_further_claims() {
    let (ledger, _) = setup();
    let offer = car(&ledger, "Owner", 2).await;

    ledger.claim_seat(&tour(), offer.id, "A").await.unwrap();
    ledger.claim_seat(&tour(), offer.id, "B").await.unwrap();
    assert!(ledger.occupancy(&tour(), offer.id).await.unwrap().is_full());

    let late = ledger.claim_seat(&tour(), offer.id, "C").await;
    assert_eq!(
        late.unwrap_err(),
        LedgerError::Full { offer_id: offer.id, total_seats: 2 }
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_race_for_last_seat_has_one_winner() {
    let (ledger, _) = setup();
    let offer = car(&ledger, "Owner", 2).await;
    ledger.claim_seat(&tour(), offer.id, "A").await.unwrap();

    let c = {
        let ledger = ledger.clone();
        tokio::spawn(async move { ledger.claim_seat(&tour(), offer.id, "C").await })
    };
    let d = {
        let ledger = ledger.clone();
        tokio::spawn(async move { ledger.claim_seat(&tour(), offer.id, "D").await })
    };
    let results = [c.await.unwrap(), d.await.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(LedgerError::Full { .. }))));
    assert_eq!(ledger.occupancy(&tour(), offer.id).await.unwrap().claimed, 2);
}

#[tokio::test]
async fn test_release_frees_seat_for_rejected_claimant() {
    let (ledger, _) = setup();
    let offer = car(&ledger, "Owner", 2).await;

    let a = ledger.claim_seat(&tour(), offer.id, "A").await.unwrap();
    ledger.claim_seat(&tour(), offer.id, "B").await.unwrap();
    assert!(ledger.claim_seat(&tour(), offer.id, "C").await.is_err());

    ledger.release_seat(&tour(), a.id, "A").await.unwrap();
    assert_eq!(ledger.occupancy(&tour(), offer.id).await.unwrap().claimed, 1);

    ledger.claim_seat(&tour(), offer.id, "C").await.unwrap();
    assert_eq!(ledger.occupancy(&tour(), offer.id).await.unwrap().claimed, 2);
}

#[tokio::test]
async fn test_owner_delete_cascades_reservations() {
    let (ledger, store) = setup();
    let offer = car(&ledger, "Owner", 3).await;
    let seat = ledger.claim_seat(&tour(), offer.id, "A").await.unwrap();

    let released = ledger.delete_offer(&tour(), offer.id, " owner").await.unwrap();
    assert_eq!(released, 1);

    assert!(store.list_reservations(&tour(), None).await.unwrap().is_empty());
    assert!(store.get_offer(&tour(), offer.id).await.unwrap().is_none());

    let release = ledger.release_seat(&tour(), seat.id, "A").await;
    assert!(matches!(release, Err(LedgerError::NotFound(_))));
}

#[tokio::test]
async fn test_non_owner_cannot_delete_offer() {
    let (ledger, store) = setup();
    let offer = car(&ledger, "Owner", 3).await;
    ledger.claim_seat(&tour(), offer.id, "A").await.unwrap();

    let result = ledger.delete_offer(&tour(), offer.id, "Mallory").await;
    assert!(matches!(result, Err(LedgerError::NotAuthorized(_))));

    assert!(store.get_offer(&tour(), offer.id).await.unwrap().is_some());
    assert_eq!(store.list_reservations(&tour(), Some(offer.id)).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_only_claimant_can_release() {
    let (ledger, _) = setup();
    let offer = car(&ledger, "Owner", 3).await;
    let seat = ledger.claim_seat(&tour(), offer.id, "Lucie").await.unwrap();

    // The offer owner is not the claimant either
    for requester in ["Owner", "Luc", "Lucie2"] {
        let result = ledger.release_seat(&tour(), seat.id, requester).await;
        assert!(matches!(result, Err(LedgerError::NotAuthorized(_))), "{}", requester);
    }

    ledger.release_seat(&tour(), seat.id, "  LUCIE ").await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_claims_never_overbook() {
    let (ledger, store) = setup();
    let offer = car(&ledger, "Owner", 5).await;

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.claim_seat(&tour(), offer.id, &format!("P{}", i)).await })
        })
        .collect();

    let mut admitted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => admitted += 1,
            Err(LedgerError::Full { .. }) => {}
            Err(e) => panic!("unexpected rejection: {}", e),
        }
    }

    assert_eq!(admitted, 5);
    assert_eq!(store.list_reservations(&tour(), Some(offer.id)).await.unwrap().len(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_same_claimant_racing_gets_one_seat() {
    let (ledger, store) = setup();
    let offer = car(&ledger, "Owner", 10).await;

    let handles: Vec<_> = ["eva", "Eva", "EVA ", " eVa", "Eva"]
        .into_iter()
        .map(|name| {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.claim_seat(&tour(), offer.id, name).await })
        })
        .collect();

    let mut admitted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => admitted += 1,
            Err(LedgerError::AlreadyClaimed { .. }) => {}
            Err(e) => panic!("unexpected rejection: {}", e),
        }
    }

    assert_eq!(admitted, 1);
    assert_eq!(store.list_reservations(&tour(), Some(offer.id)).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_claim_denormalises_offer_details() {
    let (ledger, _) = setup();
    let shuttle = ledger
        .create_offer(
            &tour(),
            OfferRequest {
                owner: "Club".into(),
                total_seats: 20,
                category: Category::SharedShuttle,
                meeting_point: Some("town hall car park".into()),
            },
        )
        .await
        .unwrap();

    let seat = ledger.claim_seat(&tour(), shuttle.id, "Petr").await.unwrap();
    assert_eq!(seat.offer_owner.as_ref().map(|o| o.as_str()), Some("Club"));
    assert_eq!(seat.meeting_point.as_deref(), Some("Town hall car park"));
}

#[tokio::test]
async fn test_invalid_input_rejected_before_store() {
    let (ledger, store) = setup();
    let mut notices = store.changes();

    let bad = ledger
        .create_offer(
            &tour(),
            OfferRequest {
                owner: "Ana".into(),
                total_seats: 0,
                category: Category::PrivateCar,
                meeting_point: None,
            },
        )
        .await;
    assert!(matches!(bad, Err(LedgerError::Validation(_))));

    let offer = car(&ledger, "Ana", 2).await;
    let _ = notices.recv().await.unwrap();
    assert!(matches!(
        ledger.claim_seat(&tour(), offer.id, "   ").await,
        Err(LedgerError::Validation(_))
    ));
    assert!(notices.try_recv().is_err());
}

#[tokio::test]
async fn test_roster_lifecycle() {
    let (ledger, _) = setup();

    let paid = ledger.add_roster(&tour(), RosterKind::Payment, "Ana").await.unwrap();
    ledger.add_roster(&tour(), RosterKind::Payment, "Bo").await.unwrap();
    ledger.add_roster(&tour(), RosterKind::BusSignup, "Ana").await.unwrap();

    let payments = ledger.list_roster(&tour(), RosterKind::Payment).await.unwrap();
    assert_eq!(
        payments.iter().map(|r| r.identity.as_str()).collect::<Vec<_>>(),
        vec!["Ana", "Bo"]
    );

    let denied = ledger.remove_roster(&tour(), RosterKind::Payment, paid.id, "Bo").await;
    assert!(matches!(denied, Err(LedgerError::NotAuthorized(_))));

    // Wrong list for this record id
    let wrong_kind = ledger.remove_roster(&tour(), RosterKind::BusSignup, paid.id, "Ana").await;
    assert!(matches!(wrong_kind, Err(LedgerError::NotFound(_))));

    ledger.remove_roster(&tour(), RosterKind::Payment, paid.id, "ana").await.unwrap();
    assert_eq!(ledger.list_roster(&tour(), RosterKind::Payment).await.unwrap().len(), 1);
    assert_eq!(ledger.list_roster(&tour(), RosterKind::BusSignup).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_snapshot_reflects_committed_state() {
    let (ledger, _) = setup();
    let first = car(&ledger, "Ana", 2).await;
    let second = car(&ledger, "Bo", 4).await;
    ledger.claim_seat(&tour(), second.id, "Cy").await.unwrap();
    ledger.add_roster(&tour(), RosterKind::Payment, "Cy").await.unwrap();

    let board = ledger.snapshot(&tour()).await.unwrap();

    assert_eq!(board.offers.len(), 2);
    assert_eq!(board.offers[0].offer.id, first.id);
    assert_eq!(board.occupancy(second.id), Some(Occupancy { claimed: 1, total: 4 }));
    assert!(board.has_paid(&Identity::parse("cy").unwrap()));
    assert!(board.unresolved.is_empty());

    let other = ledger.snapshot(&TourId::parse("other").unwrap()).await.unwrap();
    assert!(other.offers.is_empty());
}
