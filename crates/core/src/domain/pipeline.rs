use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::request::OptimizeRequest;
use crate::errors::DomainError;

/// LLM backend a run is pinned to. Every node in one run uses the same provider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    #[default]
    Anthropic,
    Gemini,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "gemini" => Ok(Self::Gemini),
            other => Err(DomainError::UnknownProvider(other.to_string())),
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Router verdict on the inbound request. Only `Valid` continues down the
/// analysis chain; every other verdict terminates the run after the router.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Valid,
    Irrelevant,
    Booking,
    Insufficient,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Irrelevant => "irrelevant",
            Self::Booking => "booking",
            Self::Insufficient => "insufficient",
        }
    }

    pub fn continues_pipeline(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

impl std::str::FromStr for QueryType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "valid" => Ok(Self::Valid),
            "irrelevant" => Ok(Self::Irrelevant),
            "booking" => Ok(Self::Booking),
            "insufficient" => Ok(Self::Insufficient),
            other => Err(DomainError::UnknownQueryType(other.to_string())),
        }
    }
}

impl std::fmt::Display for QueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The five pipeline stages, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Router,
    MarketAnalyst,
    DemandForecaster,
    PricingStrategist,
    RevenueManager,
}

impl NodeKind {
    pub const ALL: [NodeKind; 5] = [
        NodeKind::Router,
        NodeKind::MarketAnalyst,
        NodeKind::DemandForecaster,
        NodeKind::PricingStrategist,
        NodeKind::RevenueManager,
    ];

    /// Snake-case name used for telemetry keys and stream event framing.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Router => "router",
            Self::MarketAnalyst => "market_analyst",
            Self::DemandForecaster => "demand_forecaster",
            Self::PricingStrategist => "pricing_strategist",
            Self::RevenueManager => "revenue_manager",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Working state threaded through the pipeline. Nodes never mutate their
/// input: each one clones, fills in its own output field, and records its
/// telemetry entries. Earlier entries are never dropped or overwritten.
///
/// Telemetry maps are `BTreeMap` so serialized state is byte-stable
/// regardless of node completion order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    pub hotel_name: String,
    pub hotel_location: String,
    pub current_adr: String,
    pub historical_occupancy: String,
    pub target_revpar: String,
    pub additional_context: String,
    pub provider: Provider,
    pub query_type: QueryType,
    pub error_message: Option<String>,
    pub market_analysis: Option<String>,
    pub demand_forecast: Option<String>,
    pub pricing_strategy: Option<String>,
    pub revenue_plan: Option<String>,
    pub execution_times: BTreeMap<String, f64>,
    pub model_used: BTreeMap<String, String>,
}

impl PipelineState {
    /// Initial state for a run. `query_type` starts at `Valid`; the router is
    /// always the first node and overwrites it with the real verdict.
    pub fn from_request(request: &OptimizeRequest) -> Self {
        Self {
            hotel_name: request.hotel_name.clone(),
            hotel_location: request.hotel_location.clone(),
            current_adr: request.current_adr.clone(),
            historical_occupancy: request.historical_occupancy.clone(),
            target_revpar: request.target_revpar.clone(),
            additional_context: request.additional_context.clone(),
            provider: request.provider,
            query_type: QueryType::Valid,
            error_message: None,
            market_analysis: None,
            demand_forecast: None,
            pricing_strategy: None,
            revenue_plan: None,
            execution_times: BTreeMap::new(),
            model_used: BTreeMap::new(),
        }
    }

    /// Record one node's wall time (rounded to centiseconds) and the
    /// `provider/model` label that served it.
    pub fn record_execution(&mut self, node: NodeKind, seconds: f64, model: &str) {
        let rounded = (seconds * 100.0).round() / 100.0;
        self.execution_times.insert(node.as_str().to_string(), rounded);
        self.model_used.insert(node.as_str().to_string(), format!("{}/{model}", self.provider));
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use crate::domain::request::OptimizeRequest;
    use crate::errors::DomainError;

    use super::{NodeKind, PipelineState, Provider, QueryType};

    #[test]
    fn provider_round_trips_through_str() {
        for provider in [Provider::Anthropic, Provider::Gemini] {
            assert_eq!(Provider::from_str(provider.as_str()).expect("parse"), provider);
        }
    }

    #[test]
    fn unknown_provider_is_rejected_not_defaulted() {
        let error = Provider::from_str("mistral").expect_err("unknown provider should fail");
        assert!(matches!(error, DomainError::UnknownProvider(ref value) if value == "mistral"));
    }

    #[test]
    fn only_valid_verdict_continues_the_chain() {
        assert!(QueryType::Valid.continues_pipeline());
        for verdict in [QueryType::Irrelevant, QueryType::Booking, QueryType::Insufficient] {
            assert!(!verdict.continues_pipeline());
        }
    }

    #[test]
    fn node_order_is_router_first_manager_last() {
        assert_eq!(NodeKind::ALL.first(), Some(&NodeKind::Router));
        assert_eq!(NodeKind::ALL.last(), Some(&NodeKind::RevenueManager));
        assert_eq!(NodeKind::ALL.len(), 5);
    }

    #[test]
    fn initial_state_starts_valid_with_empty_outputs() {
        let request = OptimizeRequest {
            hotel_name: "Centara Grand".to_string(),
            hotel_location: "Bangkok".to_string(),
            ..OptimizeRequest::default()
        };
        let state = PipelineState::from_request(&request);

        assert_eq!(state.query_type, QueryType::Valid);
        assert_eq!(state.hotel_name, "Centara Grand");
        assert!(state.market_analysis.is_none());
        assert!(state.revenue_plan.is_none());
        assert!(state.execution_times.is_empty());
        assert!(state.model_used.is_empty());
    }

    #[test]
    fn record_execution_rounds_and_labels() {
        let mut state = PipelineState::from_request(&OptimizeRequest::default());
        state.record_execution(NodeKind::Router, 1.23456, "claude-haiku-4-5-20251001");

        assert_eq!(state.execution_times.get("router"), Some(&1.23));
        assert_eq!(
            state.model_used.get("router").map(String::as_str),
            Some("anthropic/claude-haiku-4-5-20251001")
        );
    }

    #[test]
    fn record_execution_accretes_without_clearing_prior_entries() {
        let mut state = PipelineState::from_request(&OptimizeRequest::default());
        state.record_execution(NodeKind::Router, 0.5, "m1");
        state.record_execution(NodeKind::MarketAnalyst, 2.0, "m2");

        assert_eq!(state.execution_times.len(), 2);
        assert_eq!(state.execution_times.get("router"), Some(&0.5));
        assert_eq!(state.model_used.len(), 2);
    }
}
