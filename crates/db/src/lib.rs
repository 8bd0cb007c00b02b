pub mod cache;
pub mod connection;
pub mod migrations;
pub mod repositories;

pub use cache::{CacheGate, InMemoryResultCacheStore, ResultCacheStore, SqlResultCacheStore};
pub use connection::{connect, connect_with_settings, DbPool};
pub use repositories::{
    InMemoryOptimizationRepository, OptimizationRepository, OptimizationRun, RepositoryError,
    SqlOptimizationRepository,
};
