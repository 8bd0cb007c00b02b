//! Competitive positioning and market conditions analysis.

use std::time::Instant;

use revvy_core::domain::{NodeKind, PipelineState};

use crate::graph::PipelineError;
use crate::llm::CompletionRequest;
use crate::nodes::{NodeContext, ANALYSIS_MAX_TOKENS};

const SYSTEM_PROMPT: &str = r#"You are a hotel market analyst specializing in the Thai hospitality market.
Given hotel details, analyze:
1. Competitive positioning based on location and ADR
2. Demand pattern indicators (Songkran, high season Nov-Feb, MICE events)
3. Market opportunities and threats
4. External factors (seasonality, Agoda/Booking.com trends, economic conditions)

Express all monetary values in Thai Baht (฿ / THB). Do not use USD or other currencies.
Be specific and data-driven. Output structured markdown."#;

fn user_message(state: &PipelineState) -> String {
    let context = if state.additional_context.trim().is_empty() {
        "None provided"
    } else {
        &state.additional_context
    };
    format!(
        "Hotel: {} in {}\nCurrent ADR: {}\nHistorical Occupancy: {}\nTarget RevPAR: {}\nContext: {}\n\nProvide a thorough market analysis.",
        state.hotel_name,
        state.hotel_location,
        state.current_adr,
        state.historical_occupancy,
        state.target_revpar,
        context,
    )
}

pub async fn run(
    state: &PipelineState,
    ctx: &NodeContext<'_>,
) -> Result<PipelineState, PipelineError> {
    let started = Instant::now();
    let model = ctx.models.model_for(state.provider, NodeKind::MarketAnalyst).to_string();

    let analysis = ctx
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
    next.market_analysis = Some(analysis);
    next.record_execution(NodeKind::MarketAnalyst, started.elapsed().as_secs_f64(), &model);
    Ok(next)
}
