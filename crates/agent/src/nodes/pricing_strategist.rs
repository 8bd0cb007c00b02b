//! Segment-level rate strategy recommendations.

use std::time::Instant;

use revvy_core::domain::{NodeKind, PipelineState};

use crate::graph::PipelineError;
use crate::llm::CompletionRequest;
use crate::nodes::{or_placeholder, NodeContext, ANALYSIS_MAX_TOKENS};

const SYSTEM_PROMPT: &str = r#"You are a hotel pricing strategist specializing in the Thai market.
Using demand forecasts and market data:
1. Recommend optimal ADR adjustments by segment (FIT, corporate, OTA, direct)
2. Define rate fencing strategy (length of stay, advance purchase restrictions)
3. Suggest promotional periods and discount levels for Agoda/Booking.com/Line Travel
4. Identify upsell and ancillary revenue opportunities

Express all monetary values in Thai Baht (฿ / THB). Do not use USD or other currencies.
Output structured markdown with specific price points in ฿."#;

fn user_message(state: &PipelineState) -> String {
    format!(
        "Hotel: {} in {}\nCurrent ADR: {} | Target RevPAR: {}\n\nMarket Analysis:\n{}\n\nDemand Forecast:\n{}\n\nDevelop a comprehensive pricing strategy.",
        state.hotel_name,
        state.hotel_location,
        state.current_adr,
        state.target_revpar,
        or_placeholder(&state.market_analysis, "N/A"),
        or_placeholder(&state.demand_forecast, "N/A"),
    )
}

pub async fn run(
    state: &PipelineState,
    ctx: &NodeContext<'_>,
) -> Result<PipelineState, PipelineError> {
    let started = Instant::now();
    let model = ctx.models.model_for(state.provider, NodeKind::PricingStrategist).to_string();

    let strategy = ctx
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
    next.pricing_strategy = Some(strategy);
    next.record_execution(NodeKind::PricingStrategist, started.elapsed().as_secs_f64(), &model);
    Ok(next)
}

#[cfg(test)]
mod tests {
    use revvy_core::config::AppConfig;
    use revvy_core::domain::{OptimizeRequest, PipelineState};

    use crate::nodes::testing::ScriptedClient;
    use crate::nodes::NodeContext;

    use super::{run, user_message};

    #[test]
    fn missing_upstream_sections_project_as_na() {
        let state = PipelineState::from_request(&OptimizeRequest::default());
        let message = user_message(&state);
        assert!(message.contains("Market Analysis:\nN/A"));
        assert!(message.contains("Demand Forecast:\nN/A"));
    }

    #[tokio::test]
    async fn output_lands_in_pricing_strategy() {
        let client = ScriptedClient::replying(&["## Rate plan: FIT \u{e3f}4,200"]);
        let config = AppConfig::default();
        let ctx = NodeContext { client: &client, models: &config.llm.models };

        let state = PipelineState::from_request(&OptimizeRequest::default());
        let next = run(&state, &ctx).await.expect("strategist run");
        assert_eq!(next.pricing_strategy.as_deref(), Some("## Rate plan: FIT \u{e3f}4,200"));
        assert!(next.model_used.contains_key("pricing_strategist"));
    }
}
