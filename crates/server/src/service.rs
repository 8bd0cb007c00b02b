//! Request-path composition: the cache gate in front of the pipeline, the
//! durable history behind it.
//!
//! `run` serves the synchronous endpoint; `stream` feeds the SSE endpoint
//! through a bounded channel. Both consult the cache first, and a hit costs
//! zero LLM calls. Persistence is best-effort: a failed history write is
//! logged and the caller still gets the report.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use revvy_agent::{replay_events, PipelineError, PipelineEvent, PipelineGraph};
use revvy_core::{request_fingerprint, OptimizeReport, OptimizeRequest, PipelineState};
use revvy_db::{CacheGate, OptimizationRepository, OptimizationRun, RepositoryError};

/// Message returned to API callers when a run fails. The real cause goes to
/// the logs, never over the wire.
pub(crate) const USER_SAFE_ERROR: &str = "an internal error occurred";

const EVENT_CHANNEL_CAPACITY: usize = 8;

#[derive(Clone)]
pub struct OptimizeService {
    graph: Arc<PipelineGraph>,
    repository: Arc<dyn OptimizationRepository>,
    cache: CacheGate,
}

impl OptimizeService {
    pub fn new(
        graph: PipelineGraph,
        repository: Arc<dyn OptimizationRepository>,
        cache: CacheGate,
    ) -> Self {
        Self { graph: Arc::new(graph), repository, cache }
    }

    /// One synchronous optimization run. Cache hits return the stored report
    /// as-is and write no new history row.
    pub async fn run(
        &self,
        user_id: i64,
        request: &OptimizeRequest,
    ) -> Result<OptimizeReport, PipelineError> {
        let correlation_id = Uuid::new_v4();
        let key = request_fingerprint(request);
        info!(
            event_name = "optimize.run_started",
            correlation_id = %correlation_id,
            user_id,
            provider = %request.provider,
            hotel_name = %request.hotel_name,
            "optimization run started"
        );

        if let Some(report) = self.cache.lookup(&key).await {
            info!(
                event_name = "optimize.served_from_cache",
                correlation_id = %correlation_id,
                user_id,
                "returning cached report"
            );
            return Ok(report);
        }

        let state = PipelineState::from_request(request);
        let final_state = self.graph.run(state).await?;
        let report = OptimizeReport::from(final_state);

        self.persist(user_id, &report, correlation_id).await;
        self.cache.store(&key, &report).await;

        info!(
            event_name = "optimize.run_completed",
            correlation_id = %correlation_id,
            user_id,
            query_type = %report.query_type,
            "optimization run completed"
        );
        Ok(report)
    }

    /// One streamed optimization run. The receiver sees the same event
    /// sequence whether the run is live or replayed from cache; dropping it
    /// mid-run abandons the pipeline.
    pub fn stream(&self, user_id: i64, request: OptimizeRequest) -> mpsc::Receiver<PipelineEvent> {
        let (sender, receiver) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let service = self.clone();
        tokio::spawn(async move { service.emit(user_id, request, sender).await });
        receiver
    }

    async fn emit(self, user_id: i64, request: OptimizeRequest, events: mpsc::Sender<PipelineEvent>) {
        let correlation_id = Uuid::new_v4();
        let key = request_fingerprint(&request);
        info!(
            event_name = "optimize.stream_started",
            correlation_id = %correlation_id,
            user_id,
            provider = %request.provider,
            hotel_name = %request.hotel_name,
            "streamed optimization run started"
        );

        if let Some(report) = self.cache.lookup(&key).await {
            for event in replay_events(&report) {
                if events.send(event).await.is_err() {
                    info!(
                        event_name = "optimize.stream_client_gone",
                        correlation_id = %correlation_id,
                        user_id,
                        "client disconnected during cache replay"
                    );
                    return;
                }
            }
            info!(
                event_name = "optimize.served_from_cache",
                correlation_id = %correlation_id,
                user_id,
                "replayed cached report"
            );
            return;
        }

        let state = PipelineState::from_request(&request);
        match self.graph.run_streaming(state, &events).await {
            Ok(final_state) => {
                let report = OptimizeReport::from(final_state);
                self.persist(user_id, &report, correlation_id).await;
                self.cache.store(&key, &report).await;

                let delivered = events
                    .send(PipelineEvent::Result { report })
                    .await
                    .is_ok()
                    && events.send(PipelineEvent::Done).await.is_ok();
                if !delivered {
                    info!(
                        event_name = "optimize.stream_client_gone",
                        correlation_id = %correlation_id,
                        user_id,
                        "client disconnected before the final frames"
                    );
                }
                info!(
                    event_name = "optimize.run_completed",
                    correlation_id = %correlation_id,
                    user_id,
                    "streamed optimization run completed"
                );
            }
            Err(PipelineError::StreamClosed) => {
                info!(
                    event_name = "optimize.stream_abandoned",
                    correlation_id = %correlation_id,
                    user_id,
                    "client disconnected mid-run, nothing persisted"
                );
            }
            Err(failure) => {
                error!(
                    event_name = "optimize.run_failed",
                    correlation_id = %correlation_id,
                    user_id,
                    error = %failure,
                    "pipeline run failed"
                );
                let _ = events
                    .send(PipelineEvent::Error { message: USER_SAFE_ERROR.to_string() })
                    .await;
            }
        }
    }

    pub async fn history(
        &self,
        user_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<OptimizationRun>, RepositoryError> {
        self.repository.list_for_user(user_id, limit, offset).await
    }

    pub async fn history_entry(
        &self,
        user_id: i64,
        id: i64,
    ) -> Result<Option<OptimizationRun>, RepositoryError> {
        self.repository.find_by_id(id, user_id).await
    }

    async fn persist(&self, user_id: i64, report: &OptimizeReport, correlation_id: Uuid) {
        if let Err(failure) = self.repository.insert(user_id, report).await {
            warn!(
                event_name = "optimize.persist_failed",
                correlation_id = %correlation_id,
                user_id,
                error = %failure,
                "failed to persist completed run, continuing"
            );
        }
    }
}
