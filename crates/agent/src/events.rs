//! Events emitted over a streamed run.
//!
//! A live run produces one [`PipelineEvent::Node`] per completed stage, then
//! `Result` and `Done`. A cache hit replays the same sequence out of the
//! stored report so clients cannot tell a replayed run from a live one: the
//! router event always appears, and the four analysis events appear only when
//! the stored verdict actually let those stages run.

use revvy_core::domain::{NodeKind, OptimizeReport, QueryType};

/// One frame of a streamed optimization run.
#[derive(Clone, Debug, PartialEq)]
pub enum PipelineEvent {
    /// A stage finished. `data` is the router's verdict or the stage's
    /// markdown section.
    Node { node: NodeKind, data: String },
    /// The completed report, sent once after the last node event.
    Result { report: OptimizeReport },
    /// The run failed. Terminal; no `Done` follows.
    Error { message: String },
    /// End-of-stream marker for a successful run.
    Done,
}

fn replayed_data(node: NodeKind, report: &OptimizeReport) -> String {
    match node {
        NodeKind::Router => report.query_type.as_str().to_string(),
        NodeKind::MarketAnalyst => report.market_analysis.clone().unwrap_or_default(),
        NodeKind::DemandForecaster => report.demand_forecast.clone().unwrap_or_default(),
        NodeKind::PricingStrategist => report.pricing_strategy.clone().unwrap_or_default(),
        NodeKind::RevenueManager => report.revenue_plan.clone().unwrap_or_default(),
    }
}

/// Reconstruct the event sequence a live run of `report` would have produced.
pub fn replay_events(report: &OptimizeReport) -> Vec<PipelineEvent> {
    let nodes: &[NodeKind] = if report.query_type == QueryType::Valid {
        &NodeKind::ALL
    } else {
        &NodeKind::ALL[..1]
    };

    let mut events = Vec::with_capacity(nodes.len() + 2);
    for &node in nodes {
        events.push(PipelineEvent::Node { node, data: replayed_data(node, report) });
    }
    events.push(PipelineEvent::Result { report: report.clone() });
    events.push(PipelineEvent::Done);
    events
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::mpsc;

    use revvy_core::config::ModelTable;
    use revvy_core::domain::{NodeKind, OptimizeReport, PipelineState, Provider, QueryType};
    use revvy_core::OptimizeRequest;

    use crate::graph::PipelineGraph;
    use crate::llm::LlmRouter;
    use crate::nodes::testing::ScriptedClient;

    use super::{replay_events, PipelineEvent};

    fn request() -> OptimizeRequest {
        OptimizeRequest {
            hotel_name: "Dusit Thani".to_string(),
            hotel_location: "Bangkok, Thailand".to_string(),
            current_adr: "4500 THB".to_string(),
            historical_occupancy: "68%".to_string(),
            target_revpar: "3600 THB".to_string(),
            additional_context: String::new(),
            provider: Provider::Anthropic,
        }
    }

    async fn live_run(responses: &[&str]) -> (Vec<PipelineEvent>, OptimizeReport) {
        let client = Arc::new(ScriptedClient::replying(responses));
        let graph = PipelineGraph::new(LlmRouter::with_clients(Some(client), None), ModelTable::default());

        let (sender, mut receiver) = mpsc::channel(8);
        let state = PipelineState::from_request(&request());
        let final_state = graph.run_streaming(state, &sender).await.expect("streaming run");
        let report = OptimizeReport::from(final_state);
        sender.send(PipelineEvent::Result { report: report.clone() }).await.expect("result");
        sender.send(PipelineEvent::Done).await.expect("done");
        drop(sender);

        let mut events = Vec::new();
        while let Some(event) = receiver.recv().await {
            events.push(event);
        }
        (events, report)
    }

    #[tokio::test]
    async fn replay_matches_a_live_valid_run_event_for_event() {
        let (live, report) = live_run(&[
            r#"{"query_type": "valid", "error_message": null}"#,
            "## Market Analysis",
            "## Demand Forecast",
            "## Pricing Strategy",
            "## Revenue Plan",
        ])
        .await;

        assert_eq!(replay_events(&report), live);
    }

    #[tokio::test]
    async fn replay_matches_a_live_early_terminated_run_event_for_event() {
        let (live, report) = live_run(&[
            r#"{"query_type": "irrelevant", "error_message": "Not a revenue question."}"#,
        ])
        .await;

        let replayed = replay_events(&report);
        assert_eq!(replayed, live);
        // Router, result, done. The analysis stages never ran, so no events
        // for them on replay either.
        assert_eq!(replayed.len(), 3);
        assert_eq!(
            replayed[0],
            PipelineEvent::Node { node: NodeKind::Router, data: "irrelevant".to_string() }
        );
    }

    #[test]
    fn replay_of_a_valid_report_walks_every_node_in_order() {
        let mut state = PipelineState::from_request(&request());
        state.query_type = QueryType::Valid;
        state.market_analysis = Some("market".to_string());
        state.demand_forecast = Some("forecast".to_string());
        state.pricing_strategy = Some("pricing".to_string());
        state.revenue_plan = Some("plan".to_string());
        let report = OptimizeReport::from(state);

        let events = replay_events(&report);
        assert_eq!(events.len(), 7);

        let nodes: Vec<NodeKind> = events
            .iter()
            .filter_map(|event| match event {
                PipelineEvent::Node { node, .. } => Some(*node),
                _ => None,
            })
            .collect();
        assert_eq!(nodes, NodeKind::ALL);

        assert_eq!(events[5], PipelineEvent::Result { report: report.clone() });
        assert_eq!(events[6], PipelineEvent::Done);
    }

    #[test]
    fn replay_fills_missing_sections_with_empty_data() {
        // A valid verdict with a hole in the stored report still replays the
        // full chain; the hole becomes an empty data frame.
        let mut state = PipelineState::from_request(&request());
        state.query_type = QueryType::Valid;
        state.market_analysis = Some("market".to_string());
        let report = OptimizeReport::from(state);

        let events = replay_events(&report);
        assert_eq!(
            events[2],
            PipelineEvent::Node { node: NodeKind::DemandForecaster, data: String::new() }
        );
    }
}
