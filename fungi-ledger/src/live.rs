use fungi_core::{DocumentStore, LedgerResult, RosterKind, TourId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::board::{Board, BoardState};

type FeedMap = Mutex<HashMap<TourId, Weak<watch::Sender<BoardState>>>>;

/// Read every collection of `tour` and assemble a fresh board.
pub async fn load_board(store: &dyn DocumentStore, tour: &TourId) -> LedgerResult<Board> {
    let (offers, reservations, payments, bus_signups) = tokio::try_join!(
        store.list_offers(tour),
        store.list_reservations(tour, None),
        store.list_roster(tour, RosterKind::Payment),
        store.list_roster(tour, RosterKind::BusSignup),
    )?;

    Ok(Board::build(tour.clone(), offers, reservations, payments, bus_signups))
}

/// One live board per tour, shared by all of its subscribers.
///
/// A feed task owns its sender and deregisters itself once the last
/// receiver is gone, so tours nobody watches cost nothing.
pub struct BoardFeeds {
    store: Arc<dyn DocumentStore>,
    retry_after: Duration,
    feeds: Arc<FeedMap>,
}

impl BoardFeeds {
    pub fn new(store: Arc<dyn DocumentStore>, retry_after: Duration) -> Self {
        Self {
            store,
            retry_after,
            feeds: Arc::default(),
        }
    }

    /// Join the feed of `tour`, starting it if none is running.
    /// Must be called from within a tokio runtime.
    pub fn subscribe(&self, tour: &TourId) -> watch::Receiver<BoardState> {
        let mut feeds = lock(&self.feeds);

        if let Some(tx) = feeds.get(tour).and_then(Weak::upgrade) {
            return tx.subscribe();
        }

        let (tx, rx) = watch::channel(BoardState::Loading);
        let tx = Arc::new(tx);
        feeds.insert(tour.clone(), Arc::downgrade(&tx));
        spawn_board_feed(self.store.clone(), tour.clone(), self.retry_after, tx, self.feeds.clone());
        rx
    }

    /// Number of tours with a running feed.
    pub fn live_boards(&self) -> usize {
        lock(&self.feeds).values().filter(|w| w.strong_count() > 0).count()
    }
}

fn lock(feeds: &FeedMap) -> MutexGuard<'_, HashMap<TourId, Weak<watch::Sender<BoardState>>>> {
    feeds.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drop the registry entry of `tour` if it still points at `tx`.
/// Returns false when a subscriber joined in the meantime.
fn deregister(feeds: &FeedMap, tour: &TourId, tx: &Arc<watch::Sender<BoardState>>, force: bool) -> bool {
    let mut feeds = lock(feeds);
    if !force && tx.receiver_count() > 0 {
        return false;
    }
    if feeds.get(tour).is_some_and(|w| w.as_ptr() == Arc::as_ptr(tx)) {
        feeds.remove(tour);
    }
    true
}

/// Keep the board of `tour` current until its last receiver is dropped.
///
/// Each change notice for the tour triggers a full rebuild. Missed notices
/// (a lagging receiver) trigger one too, so the published board always equals
/// some committed state. A failed rebuild publishes `Unavailable` and is
/// retried after `retry_after`.
fn spawn_board_feed(
    store: Arc<dyn DocumentStore>,
    tour: TourId,
    retry_after: Duration,
    tx: Arc<watch::Sender<BoardState>>,
    feeds: Arc<FeedMap>,
) {
    // Subscribe before the first read so no commit falls between the two
    let mut notices = store.changes();

    tokio::spawn(async move {
        info!("Board feed started for tour {}", tour);
        let mut stale = true;

        loop {
            if stale {
                let next = match load_board(store.as_ref(), &tour).await {
                    Ok(board) => {
                        stale = false;
                        BoardState::Ready(Arc::new(board))
                    }
                    Err(e) => {
                        warn!("Board for tour {} unavailable: {}", tour, e);
                        BoardState::Unavailable { reason: e.to_string() }
                    }
                };
                tx.send_replace(next);
            }

            tokio::select! {
                _ = tx.closed() => {
                    if deregister(&feeds, &tour, &tx, false) {
                        break;
                    }
                }
                notice = notices.recv() => match notice {
                    Ok(notice) if notice.tour == tour => stale = true,
                    Ok(_) => {}
                    Err(RecvError::Lagged(missed)) => {
                        debug!("Board feed for tour {} missed {} notices, resyncing", tour, missed);
                        stale = true;
                    }
                    Err(RecvError::Closed) => {
                        warn!("Change feed closed, board for tour {} is no longer live", tour);
                        tx.send_replace(BoardState::Unavailable {
                            reason: "change feed closed".into(),
                        });
                        deregister(&feeds, &tour, &tx, true);
                        break;
                    }
                },
                _ = tokio::time::sleep(retry_after), if stale => {}
            }
        }

        debug!("Board feed stopped for tour {}", tour);
    });
}
