use async_trait::async_trait;
use thiserror::Error;

use revvy_core::domain::OptimizeReport;

pub mod memory;
pub mod optimization;

pub use memory::InMemoryOptimizationRepository;
pub use optimization::{OptimizationRun, SqlOptimizationRepository};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Durable record of completed pipeline runs, scoped to the owning user.
/// Every completed run is inserted, including early-terminated ones; runs
/// that failed mid-pipeline never complete and are never recorded.
#[async_trait]
pub trait OptimizationRepository: Send + Sync {
    async fn insert(
        &self,
        user_id: i64,
        report: &OptimizeReport,
    ) -> Result<OptimizationRun, RepositoryError>;

    /// Page through one user's runs, newest first.
    async fn list_for_user(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<OptimizationRun>, RepositoryError>;

    /// Fetch one run by id. Returns `None` when the row does not exist or
    /// belongs to a different user; callers cannot tell those apart.
    async fn find_by_id(
        &self,
        id: i64,
        user_id: i64,
    ) -> Result<Option<OptimizationRun>, RepositoryError>;
}
