//! Final synthesis into an actionable revenue plan.

use std::time::Instant;

use revvy_core::domain::{NodeKind, PipelineState};

use crate::graph::PipelineError;
use crate::llm::CompletionRequest;
use crate::nodes::{or_placeholder, NodeContext, ANALYSIS_MAX_TOKENS};

const SYSTEM_PROMPT: &str = r#"You are the head of revenue management for a Thai hotel group.
Synthesize all analyses into an actionable plan:
1. Executive Summary (3 bullet points)
2. Week-by-Week Action Plan (4 weeks)
3. KPIs to track (ADR in ฿, Occupancy %, RevPAR in ฿)
4. Risk mitigation steps

Express all monetary values in Thai Baht (฿ / THB). Do not use USD or other currencies.
Be concise, specific, and actionable. Output structured markdown."#;

fn user_message(state: &PipelineState) -> String {
    format!(
        "Hotel: {} in {}\nCurrent ADR: {} | Target RevPAR: {}\n\nMarket Analysis: {}\nDemand Forecast: {}\nPricing Strategy: {}\n\nCreate the final revenue management plan.",
        state.hotel_name,
        state.hotel_location,
        state.current_adr,
        state.target_revpar,
        or_placeholder(&state.market_analysis, "N/A"),
        or_placeholder(&state.demand_forecast, "N/A"),
        or_placeholder(&state.pricing_strategy, "N/A"),
    )
}

pub async fn run(
    state: &PipelineState,
    ctx: &NodeContext<'_>,
) -> Result<PipelineState, PipelineError> {
    let started = Instant::now();
    let model = ctx.models.model_for(state.provider, NodeKind::RevenueManager).to_string();

    let plan = ctx
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
    next.revenue_plan = Some(plan);
    next.record_execution(NodeKind::RevenueManager, started.elapsed().as_secs_f64(), &model);
    Ok(next)
}

#[cfg(test)]
mod tests {
    use revvy_core::config::AppConfig;
    use revvy_core::domain::{OptimizeRequest, PipelineState, Provider};

    use crate::nodes::testing::ScriptedClient;
    use crate::nodes::NodeContext;

    use super::run;

    #[tokio::test]
    async fn manager_uses_the_deep_tier_model_slot() {
        let client = ScriptedClient::replying(&["## Executive Summary"]);
        let config = AppConfig::default();
        let ctx = NodeContext { client: &client, models: &config.llm.models };

        let mut state = PipelineState::from_request(&OptimizeRequest::default());
        state.provider = Provider::Gemini;

        let next = run(&state, &ctx).await.expect("manager run");
        assert_eq!(next.revenue_plan.as_deref(), Some("## Executive Summary"));
        assert_eq!(
            next.model_used.get("revenue_manager").map(String::as_str),
            Some("gemini/gemini-2.5-pro")
        );

        let requests = client.requests.lock().expect("requests");
        assert_eq!(requests[0].model, "gemini-2.5-pro");
        assert_eq!(requests[0].max_tokens, 4096);
        assert!(!requests[0].json_mode);
    }
}
