use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::pipeline::{PipelineState, Provider, QueryType};

/// Completed run, as returned to callers and as stored in the result cache.
/// This is also the payload replayed on a cache hit, so it must carry
/// everything a live run would have reported.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptimizeReport {
    pub hotel_name: String,
    pub hotel_location: String,
    pub query_type: QueryType,
    pub provider: Provider,
    pub error_message: Option<String>,
    pub market_analysis: Option<String>,
    pub demand_forecast: Option<String>,
    pub pricing_strategy: Option<String>,
    pub revenue_plan: Option<String>,
    pub execution_times: BTreeMap<String, f64>,
    pub model_used: BTreeMap<String, String>,
}

impl From<PipelineState> for OptimizeReport {
    fn from(state: PipelineState) -> Self {
        Self {
            hotel_name: state.hotel_name,
            hotel_location: state.hotel_location,
            query_type: state.query_type,
            provider: state.provider,
            error_message: state.error_message,
            market_analysis: state.market_analysis,
            demand_forecast: state.demand_forecast,
            pricing_strategy: state.pricing_strategy,
            revenue_plan: state.revenue_plan,
            execution_times: state.execution_times,
            model_used: state.model_used,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::pipeline::{NodeKind, PipelineState, QueryType};
    use crate::domain::request::OptimizeRequest;

    use super::OptimizeReport;

    #[test]
    fn report_carries_state_fields_verbatim() {
        let mut state = PipelineState::from_request(&OptimizeRequest {
            hotel_name: "Centara Grand".to_string(),
            hotel_location: "Bangkok, Thailand".to_string(),
            ..OptimizeRequest::default()
        });
        state.query_type = QueryType::Valid;
        state.market_analysis = Some("## Market".to_string());
        state.record_execution(NodeKind::Router, 0.42, "claude-haiku-4-5-20251001");

        let report = OptimizeReport::from(state.clone());
        assert_eq!(report.hotel_name, state.hotel_name);
        assert_eq!(report.market_analysis.as_deref(), Some("## Market"));
        assert_eq!(report.execution_times, state.execution_times);
    }

    #[test]
    fn report_round_trips_through_json() {
        let mut state = PipelineState::from_request(&OptimizeRequest::default());
        state.query_type = QueryType::Insufficient;
        state.error_message = Some("Could not classify input.".to_string());
        state.record_execution(NodeKind::Router, 1.0, "gemini-2.5-flash");

        let report = OptimizeReport::from(state);
        let encoded = serde_json::to_string(&report).expect("serialize");
        let decoded: OptimizeReport = serde_json::from_str(&encoded).expect("deserialize");
        assert_eq!(decoded, report);
    }
}
