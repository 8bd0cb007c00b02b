//! Occupancy and RevPAR trajectory forecasting.

use std::time::Instant;

use revvy_core::domain::{NodeKind, PipelineState};

use crate::graph::PipelineError;
use crate::llm::CompletionRequest;
use crate::nodes::{or_placeholder, NodeContext, ANALYSIS_MAX_TOKENS};

const SYSTEM_PROMPT: &str = r#"You are a hotel demand forecasting specialist with deep expertise in Thai tourism patterns.
Using market analysis and hotel data:
1. Forecast occupancy trends for next 30/60/90 days
2. Identify demand drivers (Songkran, Loy Krathong, Chinese New Year, MICE events, OTA trends)
3. Predict RevPAR trajectory
4. Flag risk periods (low season, competitor promotions)

Express all monetary values in Thai Baht (฿ / THB). Do not use USD or other currencies.
Output structured markdown with clear sections."#;

fn user_message(state: &PipelineState) -> String {
    format!(
        "Hotel: {} in {}\nCurrent ADR: {} | Occupancy: {}\nTarget RevPAR: {}\n\nMarket Analysis:\n{}\n\nProvide a detailed demand forecast.",
        state.hotel_name,
        state.hotel_location,
        state.current_adr,
        state.historical_occupancy,
        state.target_revpar,
        or_placeholder(&state.market_analysis, "No market analysis available."),
    )
}

pub async fn run(
    state: &PipelineState,
    ctx: &NodeContext<'_>,
) -> Result<PipelineState, PipelineError> {
    let started = Instant::now();
    let model = ctx.models.model_for(state.provider, NodeKind::DemandForecaster).to_string();

    let forecast = ctx
        .client
        .complete(CompletionRequest {
            system: SYSTEM_PROMPT.to_string(),
            user: user_message(state),
            model: model.clone(),
            max_tokens: ANALYSIS_MAX_TOKENS,
            json_mode: false,
        })
        .await?;

    let mut next = state.clone();
    next.demand_forecast = Some(forecast);
    next.record_execution(NodeKind::DemandForecaster, started.elapsed().as_secs_f64(), &model);
    Ok(next)
}

#[cfg(test)]
mod tests {
    use revvy_core::config::AppConfig;
    use revvy_core::domain::{OptimizeRequest, PipelineState};

    use crate::nodes::testing::ScriptedClient;
    use crate::nodes::NodeContext;

    use super::{run, user_message};

    fn state_with_analysis() -> PipelineState {
        let mut state = PipelineState::from_request(&OptimizeRequest {
            hotel_name: "Centara Grand".to_string(),
            hotel_location: "Bangkok, Thailand".to_string(),
            ..OptimizeRequest::default()
        });
        state.market_analysis = Some("## Market\nStrong OTA demand.".to_string());
        state
    }

    #[test]
    fn upstream_analysis_is_embedded_in_the_prompt() {
        let message = user_message(&state_with_analysis());
        assert!(message.contains("Market Analysis:\n## Market\nStrong OTA demand."));
    }

    #[tokio::test]
    async fn prior_telemetry_survives_the_update() {
        let client = ScriptedClient::replying(&["## Forecast"]);
        let config = AppConfig::default();
        let ctx = NodeContext { client: &client, models: &config.llm.models };

        let mut state = state_with_analysis();
        state.record_execution(
            revvy_core::domain::NodeKind::Router,
            0.4,
            "claude-haiku-4-5-20251001",
        );

        let next = run(&state, &ctx).await.expect("forecaster run");
        assert_eq!(next.demand_forecast.as_deref(), Some("## Forecast"));
        assert!(next.execution_times.contains_key("router"));
        assert!(next.execution_times.contains_key("demand_forecaster"));
        assert_eq!(next.market_analysis, state.market_analysis);
    }
}
