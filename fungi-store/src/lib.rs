pub mod app_config;
pub mod database;
pub mod feed;
pub mod memory_store;
pub mod pg_store;
pub mod redis_repo;

pub use database::DbClient;
pub use feed::ChangeFeed;
pub use memory_store::MemoryStore;
pub use pg_store::PgStore;
pub use redis_repo::RedisClient;

/// Attempts a claim transaction gets before giving up on contention.
pub const DEFAULT_TRANSACTION_ATTEMPTS: u32 = 5;
