//! SQLite-backed storage for completed optimization runs.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{sqlite::SqliteRow, Row};

use revvy_core::domain::{OptimizeReport, Provider, QueryType};

use super::{OptimizationRepository, RepositoryError};
use crate::DbPool;

/// One persisted pipeline run, as read back from the database.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OptimizationRun {
    pub id: i64,
    #[serde(skip)]
    pub user_id: i64,
    pub hotel_name: String,
    pub hotel_location: String,
    pub provider: Provider,
    pub query_type: QueryType,
    pub error_message: Option<String>,
    pub market_analysis: Option<String>,
    pub demand_forecast: Option<String>,
    pub pricing_strategy: Option<String>,
    pub revenue_plan: Option<String>,
    pub execution_times: BTreeMap<String, f64>,
    pub model_used: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

pub struct SqlOptimizationRepository {
    pool: DbPool,
}

impl SqlOptimizationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl OptimizationRepository for SqlOptimizationRepository {
    async fn insert(
        &self,
        user_id: i64,
        report: &OptimizeReport,
    ) -> Result<OptimizationRun, RepositoryError> {
        let now = Utc::now();
        let execution_times_json = serde_json::to_string(&report.execution_times)
            .map_err(|e| RepositoryError::Decode(format!("encode execution_times: {e}")))?;
        let model_used_json = serde_json::to_string(&report.model_used)
            .map_err(|e| RepositoryError::Decode(format!("encode model_used: {e}")))?;

        let result = sqlx::query(
            r#"
            INSERT INTO optimization_runs (
                user_id, hotel_name, hotel_location, provider, query_type,
                error_message, market_analysis, demand_forecast, pricing_strategy,
                revenue_plan, execution_times_json, model_used_json, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(&report.hotel_name)
        .bind(&report.hotel_location)
        .bind(report.provider.as_str())
        .bind(report.query_type.as_str())
        .bind(&report.error_message)
        .bind(&report.market_analysis)
        .bind(&report.demand_forecast)
        .bind(&report.pricing_strategy)
        .bind(&report.revenue_plan)
        .bind(&execution_times_json)
        .bind(&model_used_json)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(OptimizationRun {
            id: result.last_insert_rowid(),
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
            created_at: now,
        })
    }

    async fn list_for_user(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<OptimizationRun>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT
                id, user_id, hotel_name, hotel_location, provider, query_type,
                error_message, market_analysis, demand_forecast, pricing_strategy,
                revenue_plan, execution_times_json, model_used_json, created_at
            FROM optimization_runs
            WHERE user_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(optimization_run_from_row).collect()
    }

    async fn find_by_id(
        &self,
        id: i64,
        user_id: i64,
    ) -> Result<Option<OptimizationRun>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT
                id, user_id, hotel_name, hotel_location, provider, query_type,
                error_message, market_analysis, demand_forecast, pricing_strategy,
                revenue_plan, execution_times_json, model_used_json, created_at
            FROM optimization_runs
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| optimization_run_from_row(&r)).transpose()
    }
}

fn optimization_run_from_row(row: &SqliteRow) -> Result<OptimizationRun, RepositoryError> {
    let provider: String = row.try_get("provider")?;
    let query_type: String = row.try_get("query_type")?;
    let execution_times_json: String = row.try_get("execution_times_json")?;
    let model_used_json: String = row.try_get("model_used_json")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(OptimizationRun {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        hotel_name: row.try_get("hotel_name")?,
        hotel_location: row.try_get("hotel_location")?,
        provider: Provider::from_str(&provider)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?,
        query_type: QueryType::from_str(&query_type)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?,
        error_message: row.try_get("error_message")?,
        market_analysis: row.try_get("market_analysis")?,
        demand_forecast: row.try_get("demand_forecast")?,
        pricing_strategy: row.try_get("pricing_strategy")?,
        revenue_plan: row.try_get("revenue_plan")?,
        execution_times: serde_json::from_str(&execution_times_json)
            .map_err(|e| RepositoryError::Decode(format!("invalid execution_times_json: {e}")))?,
        model_used: serde_json::from_str(&model_used_json)
            .map_err(|e| RepositoryError::Decode(format!("invalid model_used_json: {e}")))?,
        created_at: parse_timestamp("created_at", created_at)?,
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp in `{column}`: {e}")))
}

#[cfg(test)]
mod tests {
    use revvy_core::domain::{
        NodeKind, OptimizeReport, PipelineState, Provider, QueryType,
    };
    use revvy_core::OptimizeRequest;

    use super::SqlOptimizationRepository;
    use crate::repositories::OptimizationRepository;
    use crate::{connect_with_settings, migrations, DbPool};

    fn report(hotel_name: &str, query_type: QueryType) -> OptimizeReport {
        let mut state = PipelineState::from_request(&OptimizeRequest {
            hotel_name: hotel_name.to_string(),
            hotel_location: "Bangkok, Thailand".to_string(),
            provider: Provider::Anthropic,
            ..OptimizeRequest::default()
        });
        state.query_type = query_type;
        if query_type == QueryType::Valid {
            state.market_analysis = Some("## Market".to_string());
            state.demand_forecast = Some("## Forecast".to_string());
            state.pricing_strategy = Some("## Pricing".to_string());
            state.revenue_plan = Some("## Plan".to_string());
        } else {
            state.error_message = Some("Not a revenue question.".to_string());
        }
        state.record_execution(NodeKind::Router, 0.51, "claude-haiku-4-5-20251001");
        OptimizeReport::from(state)
    }

    #[tokio::test]
    async fn insert_then_find_round_trips_every_field() {
        let pool = setup_pool().await;
        let repo = SqlOptimizationRepository::new(pool.clone());

        let inserted = repo.insert(7, &report("Dusit Thani", QueryType::Valid)).await.expect("insert");
        let fetched = repo
            .find_by_id(inserted.id, 7)
            .await
            .expect("find")
            .expect("row exists");

        assert_eq!(fetched, inserted);
        assert_eq!(fetched.market_analysis.as_deref(), Some("## Market"));
        assert_eq!(fetched.execution_times.get("router"), Some(&0.51));
        assert_eq!(
            fetched.model_used.get("router").map(String::as_str),
            Some("anthropic/claude-haiku-4-5-20251001")
        );

        pool.close().await;
    }

    #[tokio::test]
    async fn early_terminated_runs_are_recorded_too() {
        let pool = setup_pool().await;
        let repo = SqlOptimizationRepository::new(pool.clone());

        let inserted =
            repo.insert(7, &report("Dusit Thani", QueryType::Booking)).await.expect("insert");
        let fetched = repo.find_by_id(inserted.id, 7).await.expect("find").expect("row exists");

        assert_eq!(fetched.query_type, QueryType::Booking);
        assert_eq!(fetched.error_message.as_deref(), Some("Not a revenue question."));
        assert!(fetched.revenue_plan.is_none());

        pool.close().await;
    }

    #[tokio::test]
    async fn list_is_scoped_to_the_user_and_newest_first() {
        let pool = setup_pool().await;
        let repo = SqlOptimizationRepository::new(pool.clone());

        let first = repo.insert(7, &report("Hotel A", QueryType::Valid)).await.expect("insert");
        let second = repo.insert(7, &report("Hotel B", QueryType::Valid)).await.expect("insert");
        repo.insert(8, &report("Hotel C", QueryType::Valid)).await.expect("insert");

        let runs = repo.list_for_user(7, 20, 0).await.expect("list");
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].id, second.id);
        assert_eq!(runs[1].id, first.id);

        pool.close().await;
    }

    #[tokio::test]
    async fn list_applies_limit_and_offset() {
        let pool = setup_pool().await;
        let repo = SqlOptimizationRepository::new(pool.clone());

        for index in 0..5 {
            repo.insert(7, &report(&format!("Hotel {index}"), QueryType::Valid))
                .await
                .expect("insert");
        }

        let page = repo.list_for_user(7, 2, 1).await.expect("list");
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].hotel_name, "Hotel 3");
        assert_eq!(page[1].hotel_name, "Hotel 2");

        pool.close().await;
    }

    #[tokio::test]
    async fn find_by_id_hides_other_users_rows() {
        let pool = setup_pool().await;
        let repo = SqlOptimizationRepository::new(pool.clone());

        let inserted = repo.insert(7, &report("Hotel A", QueryType::Valid)).await.expect("insert");

        let as_owner = repo.find_by_id(inserted.id, 7).await.expect("find as owner");
        assert!(as_owner.is_some());

        // Another user's lookup of the same id looks exactly like not-found.
        let as_other = repo.find_by_id(inserted.id, 8).await.expect("find as other");
        assert!(as_other.is_none());

        let missing = repo.find_by_id(9_999, 7).await.expect("find missing");
        assert!(missing.is_none());

        pool.close().await;
    }

    async fn setup_pool() -> DbPool {
        let pool =
            connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }
}
