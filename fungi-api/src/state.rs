use fungi_ledger::SeatLedger;
use fungi_store::RedisClient;
use std::sync::Arc;

#[derive(Clone)]
pub struct RateLimit {
    pub client: Arc<RedisClient>,
    pub per_minute: i64,
}

#[derive(Clone)]
pub struct AppState {
    pub ledger: SeatLedger,
    /// Unset when no Redis is configured; requests are then not throttled.
    pub rate_limit: Option<RateLimit>,
}

impl AppState {
    pub fn new(ledger: SeatLedger) -> Self {
        Self {
            ledger,
            rate_limit: None,
        }
    }

    pub fn with_rate_limit(mut self, client: Arc<RedisClient>, per_minute: i64) -> Self {
        self.rate_limit = Some(RateLimit { client, per_minute });
        self
    }
}
