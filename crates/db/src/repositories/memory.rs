use chrono::Utc;
use tokio::sync::RwLock;

use revvy_core::domain::OptimizeReport;

use super::{OptimizationRepository, OptimizationRun, RepositoryError};

/// Repository backed by a Vec, for tests and wiring that never touches disk.
#[derive(Default)]
pub struct InMemoryOptimizationRepository {
    runs: RwLock<Vec<OptimizationRun>>,
}

#[async_trait::async_trait]
impl OptimizationRepository for InMemoryOptimizationRepository {
    async fn insert(
        &self,
        user_id: i64,
        report: &OptimizeReport,
    ) -> Result<OptimizationRun, RepositoryError> {
        let mut runs = self.runs.write().await;
        let run = OptimizationRun {
            id: runs.iter().map(|run| run.id).max().unwrap_or(0) + 1,
            user_id,
            hotel_name: report.hotel_name.clone(),
            hotel_location: report.hotel_location.clone(),
            provider: report.provider,
            query_type: report.query_type,
            error_message: report.error_message.clone(),
            market_analysis: report.market_analysis.clone(),
            demand_forecast: report.demand_forecast.clone(),
            pricing_strategy: report.pricing_strategy.clone(),
            revenue_plan: report.revenue_plan.clone(),
            execution_times: report.execution_times.clone(),
            model_used: report.model_used.clone(),
            created_at: Utc::now(),
        };
        runs.push(run.clone());
        Ok(run)
    }

    async fn list_for_user(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<OptimizationRun>, RepositoryError> {
        let runs = self.runs.read().await;
        let mut matching: Vec<OptimizationRun> =
            runs.iter().filter(|run| run.user_id == user_id).cloned().collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(matching
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn find_by_id(
        &self,
        id: i64,
        user_id: i64,
    ) -> Result<Option<OptimizationRun>, RepositoryError> {
        let runs = self.runs.read().await;
        Ok(runs.iter().find(|run| run.id == id && run.user_id == user_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use revvy_core::domain::{OptimizeReport, PipelineState, QueryType};
    use revvy_core::OptimizeRequest;

    use crate::repositories::{InMemoryOptimizationRepository, OptimizationRepository};

    fn report(hotel_name: &str) -> OptimizeReport {
        let mut state = PipelineState::from_request(&OptimizeRequest {
            hotel_name: hotel_name.to_string(),
            ..OptimizeRequest::default()
        });
        state.query_type = QueryType::Valid;
        state.revenue_plan = Some("## Plan".to_string());
        OptimizeReport::from(state)
    }

    #[tokio::test]
    async fn in_memory_repo_round_trip() {
        let repo = InMemoryOptimizationRepository::default();

        let inserted = repo.insert(1, &report("Hotel A")).await.expect("insert");
        let fetched = repo.find_by_id(inserted.id, 1).await.expect("find");

        assert_eq!(fetched, Some(inserted));
    }

    #[tokio::test]
    async fn in_memory_repo_scopes_and_pages_like_sql() {
        let repo = InMemoryOptimizationRepository::default();
        for name in ["Hotel A", "Hotel B", "Hotel C"] {
            repo.insert(1, &report(name)).await.expect("insert");
        }
        repo.insert(2, &report("Hotel D")).await.expect("insert");

        let page = repo.list_for_user(1, 2, 1).await.expect("list");
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].hotel_name, "Hotel B");
        assert_eq!(page[1].hotel_name, "Hotel A");

        assert!(repo.find_by_id(4, 1).await.expect("find").is_none());
    }
}
