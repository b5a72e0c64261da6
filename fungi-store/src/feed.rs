use fungi_core::{ChangeNotice, Collection, TourId};
use tokio::sync::broadcast;
use tracing::debug;

const FEED_CAPACITY: usize = 256;

/// Fan-out of change notices to every live board.
#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeNotice>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FEED_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, tour: &TourId, collection: Collection) {
        let notice = ChangeNotice {
            tour: tour.clone(),
            collection,
        };
        // No subscribers is fine: nobody is watching this store right now.
        let receivers = self.tx.send(notice).unwrap_or(0);
        debug!("Change on {}/{} sent to {} watchers", tour, collection.path(), receivers);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeNotice> {
        self.tx.subscribe()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}
