//! Pipeline executor.
//!
//! The run is a walk over [`NodeKind`]: the router always goes first, and its
//! verdict decides whether the four analysis stages run or the pipeline ends
//! right there. Transitions are a total function of (completed node, verdict),
//! so there is no way to reach an analysis stage without a `valid` verdict and
//! no way to skip a stage once inside the chain.

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

use revvy_core::config::ModelTable;
use revvy_core::domain::{NodeKind, PipelineState, QueryType};

use crate::events::PipelineEvent;
use crate::llm::{LlmError, LlmRouter};
use crate::nodes::{self, NodeContext};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("event stream closed before the run completed")]
    StreamClosed,
}

/// Which stage comes after `completed`, given the router's verdict so far.
/// `None` ends the run.
fn next_node(completed: NodeKind, query_type: QueryType) -> Option<NodeKind> {
    match (completed, query_type) {
        (NodeKind::Router, QueryType::Valid) => Some(NodeKind::MarketAnalyst),
        (NodeKind::Router, _) => None,
        (NodeKind::MarketAnalyst, _) => Some(NodeKind::DemandForecaster),
        (NodeKind::DemandForecaster, _) => Some(NodeKind::PricingStrategist),
        (NodeKind::PricingStrategist, _) => Some(NodeKind::RevenueManager),
        (NodeKind::RevenueManager, _) => None,
    }
}

async fn execute_node(
    node: NodeKind,
    state: &PipelineState,
    ctx: &NodeContext<'_>,
) -> Result<PipelineState, PipelineError> {
    match node {
        NodeKind::Router => nodes::router::run(state, ctx).await,
        NodeKind::MarketAnalyst => nodes::market_analyst::run(state, ctx).await,
        NodeKind::DemandForecaster => nodes::demand_forecaster::run(state, ctx).await,
        NodeKind::PricingStrategist => nodes::pricing_strategist::run(state, ctx).await,
        NodeKind::RevenueManager => nodes::revenue_manager::run(state, ctx).await,
    }
}

/// Payload a node's stream event carries: the router reports its verdict, the
/// analysis stages report the section they just produced.
pub(crate) fn node_event_data(node: NodeKind, state: &PipelineState) -> String {
    match node {
        NodeKind::Router => state.query_type.as_str().to_string(),
        NodeKind::MarketAnalyst => state.market_analysis.clone().unwrap_or_default(),
        NodeKind::DemandForecaster => state.demand_forecast.clone().unwrap_or_default(),
        NodeKind::PricingStrategist => state.pricing_strategy.clone().unwrap_or_default(),
        NodeKind::RevenueManager => state.revenue_plan.clone().unwrap_or_default(),
    }
}

/// Drives one optimization run through the node chain against whichever
/// provider the request is pinned to.
pub struct PipelineGraph {
    llm: LlmRouter,
    models: ModelTable,
}

impl PipelineGraph {
    pub fn new(llm: LlmRouter, models: ModelTable) -> Self {
        Self { llm, models }
    }

    /// Run the pipeline to completion and return the final state. The first
    /// node failure aborts the run; partial results are not reported.
    pub async fn run(&self, state: PipelineState) -> Result<PipelineState, PipelineError> {
        let client = self.llm.client_for(state.provider)?;
        let ctx = NodeContext { client: client.as_ref(), models: &self.models };

        let mut state = state;
        let mut current = Some(NodeKind::Router);
        while let Some(node) = current {
            debug!(event_name = "pipeline.node_started", node = %node, "running node");
            state = execute_node(node, &state, &ctx).await?;
            current = next_node(node, state.query_type);
        }

        info!(
            event_name = "pipeline.run_completed",
            provider = %state.provider,
            query_type = %state.query_type,
            nodes = state.execution_times.len(),
            "pipeline run completed"
        );
        Ok(state)
    }

    /// Same walk as [`PipelineGraph::run`], but sends a node event after each
    /// stage completes. A closed channel means the consumer is gone, so the
    /// run is abandoned instead of billed through to the end.
    pub async fn run_streaming(
        &self,
        state: PipelineState,
        events: &mpsc::Sender<PipelineEvent>,
    ) -> Result<PipelineState, PipelineError> {
        let client = self.llm.client_for(state.provider)?;
        let ctx = NodeContext { client: client.as_ref(), models: &self.models };

        let mut state = state;
        let mut current = Some(NodeKind::Router);
        while let Some(node) = current {
            debug!(event_name = "pipeline.node_started", node = %node, "running node");
            state = execute_node(node, &state, &ctx).await?;

            let event = PipelineEvent::Node { node, data: node_event_data(node, &state) };
            if events.send(event).await.is_err() {
                info!(
                    event_name = "pipeline.stream_abandoned",
                    node = %node,
                    "event receiver dropped mid-run, abandoning pipeline"
                );
                return Err(PipelineError::StreamClosed);
            }
            current = next_node(node, state.query_type);
        }

        info!(
            event_name = "pipeline.run_completed",
            provider = %state.provider,
            query_type = %state.query_type,
            nodes = state.execution_times.len(),
            "pipeline run completed"
        );
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use revvy_core::config::ModelTable;
    use revvy_core::domain::{NodeKind, PipelineState, Provider, QueryType};
    use revvy_core::OptimizeRequest;

    use crate::events::PipelineEvent;
    use crate::llm::{LlmError, LlmRouter};
    use crate::nodes::testing::ScriptedClient;

    use super::{next_node, PipelineError, PipelineGraph};

    fn graph_with(client: Arc<ScriptedClient>) -> PipelineGraph {
        let llm = LlmRouter::with_clients(Some(client), None);
        PipelineGraph::new(llm, ModelTable::default())
    }

    fn request() -> OptimizeRequest {
        OptimizeRequest {
            hotel_name: "The Riverside Bangkok".to_string(),
            hotel_location: "Bangkok, Thailand".to_string(),
            current_adr: "3200 THB".to_string(),
            historical_occupancy: "71%".to_string(),
            target_revpar: "2800 THB".to_string(),
            additional_context: String::new(),
            provider: Provider::Anthropic,
        }
    }

    #[test]
    fn transitions_branch_only_at_the_router() {
        assert_eq!(
            next_node(NodeKind::Router, QueryType::Valid),
            Some(NodeKind::MarketAnalyst)
        );
        for verdict in [QueryType::Irrelevant, QueryType::Booking, QueryType::Insufficient] {
            assert_eq!(next_node(NodeKind::Router, verdict), None);
        }
        // Once inside the chain the verdict no longer matters.
        assert_eq!(
            next_node(NodeKind::MarketAnalyst, QueryType::Valid),
            Some(NodeKind::DemandForecaster)
        );
        assert_eq!(
            next_node(NodeKind::DemandForecaster, QueryType::Valid),
            Some(NodeKind::PricingStrategist)
        );
        assert_eq!(
            next_node(NodeKind::PricingStrategist, QueryType::Valid),
            Some(NodeKind::RevenueManager)
        );
        assert_eq!(next_node(NodeKind::RevenueManager, QueryType::Valid), None);
    }

    #[tokio::test]
    async fn valid_verdict_runs_all_five_nodes() {
        let client = Arc::new(ScriptedClient::replying(&[
            r#"{"query_type": "valid", "error_message": null}"#,
            "## Market Analysis",
            "## Demand Forecast",
            "## Pricing Strategy",
            "## Revenue Plan",
        ]));
        let graph = graph_with(client.clone());

        let state = PipelineState::from_request(&request());
        let final_state = graph.run(state).await.expect("pipeline run");

        assert_eq!(client.calls(), 5);
        assert_eq!(final_state.query_type, QueryType::Valid);
        assert_eq!(final_state.market_analysis.as_deref(), Some("## Market Analysis"));
        assert_eq!(final_state.demand_forecast.as_deref(), Some("## Demand Forecast"));
        assert_eq!(final_state.pricing_strategy.as_deref(), Some("## Pricing Strategy"));
        assert_eq!(final_state.revenue_plan.as_deref(), Some("## Revenue Plan"));
        assert_eq!(final_state.execution_times.len(), 5);
        assert_eq!(final_state.model_used.len(), 5);
    }

    #[tokio::test]
    async fn non_valid_verdict_stops_after_the_router() {
        let client = Arc::new(ScriptedClient::replying(&[
            r#"{"query_type": "irrelevant", "error_message": "Ask me about hotel revenue."}"#,
        ]));
        let graph = graph_with(client.clone());

        let state = PipelineState::from_request(&request());
        let final_state = graph.run(state).await.expect("pipeline run");

        assert_eq!(client.calls(), 1);
        assert_eq!(final_state.query_type, QueryType::Irrelevant);
        assert_eq!(final_state.error_message.as_deref(), Some("Ask me about hotel revenue."));
        assert!(final_state.market_analysis.is_none());
        assert!(final_state.revenue_plan.is_none());
        assert_eq!(final_state.execution_times.len(), 1);
    }

    #[tokio::test]
    async fn node_failure_aborts_the_run() {
        let client = Arc::new(ScriptedClient::new(vec![
            Ok(r#"{"query_type": "valid", "error_message": null}"#.to_string()),
            Ok("## Market Analysis".to_string()),
            Err(LlmError::Api { status: 529, detail: "overloaded".to_string() }),
        ]));
        let graph = graph_with(client.clone());

        let state = PipelineState::from_request(&request());
        let error = graph.run(state).await.expect_err("third node fails");

        assert!(matches!(error, PipelineError::Llm(LlmError::Api { status: 529, .. })));
        // Router, analyst, and the failed forecaster call. Nothing after.
        assert_eq!(client.calls(), 3);
    }

    #[tokio::test]
    async fn unconfigured_provider_fails_before_any_node_runs() {
        let client = Arc::new(ScriptedClient::replying(&[]));
        let graph = graph_with(client.clone());

        let mut request = request();
        request.provider = Provider::Gemini;
        let state = PipelineState::from_request(&request);
        let error = graph.run(state).await.expect_err("gemini has no client");

        assert!(matches!(
            error,
            PipelineError::Llm(LlmError::ProviderNotConfigured(Provider::Gemini))
        ));
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn streaming_emits_one_event_per_completed_node_in_order() {
        let client = Arc::new(ScriptedClient::replying(&[
            r#"{"query_type": "valid", "error_message": null}"#,
            "## Market Analysis",
            "## Demand Forecast",
            "## Pricing Strategy",
            "## Revenue Plan",
        ]));
        let graph = graph_with(client);

        let (sender, mut receiver) = mpsc::channel(8);
        let state = PipelineState::from_request(&request());
        graph.run_streaming(state, &sender).await.expect("streaming run");
        drop(sender);

        let mut events = Vec::new();
        while let Some(event) = receiver.recv().await {
            events.push(event);
        }

        let expected: Vec<(NodeKind, &str)> = vec![
            (NodeKind::Router, "valid"),
            (NodeKind::MarketAnalyst, "## Market Analysis"),
            (NodeKind::DemandForecaster, "## Demand Forecast"),
            (NodeKind::PricingStrategist, "## Pricing Strategy"),
            (NodeKind::RevenueManager, "## Revenue Plan"),
        ];
        assert_eq!(events.len(), expected.len());
        for (event, (node, data)) in events.iter().zip(expected) {
            assert_eq!(*event, PipelineEvent::Node { node, data: data.to_string() });
        }
    }

    #[tokio::test]
    async fn streaming_early_termination_emits_only_the_router_event() {
        let client = Arc::new(ScriptedClient::replying(&[
            r#"{"query_type": "booking", "error_message": "Bookings are handled elsewhere."}"#,
        ]));
        let graph = graph_with(client.clone());

        let (sender, mut receiver) = mpsc::channel(8);
        let state = PipelineState::from_request(&request());
        let final_state = graph.run_streaming(state, &sender).await.expect("streaming run");
        drop(sender);

        assert_eq!(final_state.query_type, QueryType::Booking);
        assert_eq!(client.calls(), 1);

        let event = receiver.recv().await.expect("router event");
        assert_eq!(
            event,
            PipelineEvent::Node { node: NodeKind::Router, data: "booking".to_string() }
        );
        assert!(receiver.recv().await.is_none());
    }

    #[tokio::test]
    async fn dropped_receiver_abandons_the_run() {
        let client = Arc::new(ScriptedClient::replying(&[
            r#"{"query_type": "valid", "error_message": null}"#,
            "## Market Analysis",
            "## Demand Forecast",
            "## Pricing Strategy",
            "## Revenue Plan",
        ]));
        let graph = graph_with(client.clone());

        let (sender, receiver) = mpsc::channel(8);
        drop(receiver);

        let state = PipelineState::from_request(&request());
        let error = graph.run_streaming(state, &sender).await.expect_err("receiver is gone");

        assert!(matches!(error, PipelineError::StreamClosed));
        // The router already ran before the send failed; nothing after it did.
        assert_eq!(client.calls(), 1);
    }
}
