//! Classification node. Decides whether the request is workable before any
//! expensive analysis runs.

use std::time::Instant;

use serde::Deserialize;
use tracing::warn;

use revvy_core::domain::{NodeKind, PipelineState, QueryType};

use crate::graph::PipelineError;
use crate::llm::CompletionRequest;
use crate::nodes::NodeContext;

const ROUTER_MAX_TOKENS: u32 = 2048;

/// Substituted when the model's verdict cannot be parsed. The run still
/// completes, classified as insufficient.
pub const FALLBACK_ERROR_MESSAGE: &str = "Could not classify input.";

const SYSTEM_PROMPT: &str = r#"You are an input classifier for a hotel revenue optimization system operating in Thailand.

Classify the request into one of:
- "valid": has hotel name, location, ADR, and occupancy
- "irrelevant": unrelated to hotel revenue (e.g., booking rooms, restaurant queries)
- "booking": attempting to make a hotel reservation
- "insufficient": missing key fields (hotel name, ADR, or occupancy)

Respond ONLY with valid JSON: {"query_type": "<type>", "error_message": "<message or null>"}"#;

fn user_message(state: &PipelineState) -> String {
    format!(
        "Hotel Name: {}\nLocation: {}\nCurrent ADR: {}\nHistorical Occupancy: {}\nTarget RevPAR: {}\nAdditional Context: {}\n\nClassify this input.",
        state.hotel_name,
        state.hotel_location,
        state.current_adr,
        state.historical_occupancy,
        state.target_revpar,
        state.additional_context,
    )
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    #[serde(default)]
    query_type: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

/// Some models wrap JSON in markdown fences despite instructions. Take the
/// segment inside the first fence pair, dropping an optional `json` tag.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    let mut segments = trimmed.split("```");
    segments.next();
    let inner = segments.next().unwrap_or(trimmed);
    inner.strip_prefix("json").unwrap_or(inner).trim()
}

fn parse_verdict(raw: &str) -> Option<(QueryType, Option<String>)> {
    let verdict: RawVerdict = serde_json::from_str(strip_code_fences(raw)).ok()?;
    let query_type = match verdict.query_type {
        // A parsed object with no verdict field counts as insufficient but
        // keeps whatever message the model attached.
        None => QueryType::Insufficient,
        Some(value) => value.parse().ok()?,
    };
    Some((query_type, verdict.error_message))
}

pub async fn run(
    state: &PipelineState,
    ctx: &NodeContext<'_>,
) -> Result<PipelineState, PipelineError> {
    let started = Instant::now();
    let model = ctx.models.model_for(state.provider, NodeKind::Router).to_string();

    let raw = ctx
        .client
        .complete(CompletionRequest {
            system: SYSTEM_PROMPT.to_string(),
            user: user_message(state),
            model: model.clone(),
            max_tokens: ROUTER_MAX_TOKENS,
            json_mode: true,
        })
        .await?;

    let mut next = state.clone();
    match parse_verdict(&raw) {
        Some((query_type, error_message)) => {
            next.query_type = query_type;
            next.error_message = error_message;
        }
        None => {
            warn!(
                event_name = "pipeline.router.parse_failed",
                provider = %state.provider,
                raw,
                "router verdict was not parseable, classifying as insufficient"
            );
            next.query_type = QueryType::Insufficient;
            next.error_message = Some(FALLBACK_ERROR_MESSAGE.to_string());
        }
    }
    next.record_execution(NodeKind::Router, started.elapsed().as_secs_f64(), &model);
    Ok(next)
}

#[cfg(test)]
mod tests {
    use revvy_core::config::AppConfig;
    use revvy_core::domain::{OptimizeRequest, PipelineState, QueryType};

    use crate::nodes::testing::ScriptedClient;
    use crate::nodes::NodeContext;

    use super::{parse_verdict, run, strip_code_fences, FALLBACK_ERROR_MESSAGE};

    fn state() -> PipelineState {
        PipelineState::from_request(&OptimizeRequest {
            hotel_name: "Centara Grand".to_string(),
            hotel_location: "Bangkok, Thailand".to_string(),
            current_adr: "4500 THB".to_string(),
            historical_occupancy: "72%".to_string(),
            target_revpar: "3800 THB".to_string(),
            ..OptimizeRequest::default()
        })
    }

    #[test]
    fn strips_markdown_fences_with_json_tag() {
        let raw = "```json\n{\"query_type\": \"valid\", \"error_message\": null}\n```";
        assert_eq!(strip_code_fences(raw), "{\"query_type\": \"valid\", \"error_message\": null}");
    }

    #[test]
    fn plain_json_passes_through_untouched() {
        let raw = "  {\"query_type\": \"booking\"}  ";
        assert_eq!(strip_code_fences(raw), "{\"query_type\": \"booking\"}");
    }

    #[test]
    fn missing_verdict_field_counts_as_insufficient_with_model_message() {
        let (query_type, message) =
            parse_verdict(r#"{"error_message": "no ADR given"}"#).expect("parses");
        assert_eq!(query_type, QueryType::Insufficient);
        assert_eq!(message.as_deref(), Some("no ADR given"));
    }

    #[test]
    fn unknown_verdict_value_is_a_parse_failure() {
        assert!(parse_verdict(r#"{"query_type": "spam"}"#).is_none());
        assert!(parse_verdict("not json at all").is_none());
    }

    #[tokio::test]
    async fn valid_verdict_flows_into_state_with_telemetry() {
        let client =
            ScriptedClient::replying(&[r#"{"query_type": "valid", "error_message": null}"#]);
        let config = AppConfig::default();
        let ctx = NodeContext { client: &client, models: &config.llm.models };

        let next = run(&state(), &ctx).await.expect("router run");
        assert_eq!(next.query_type, QueryType::Valid);
        assert!(next.error_message.is_none());
        assert!(next.execution_times.contains_key("router"));
        assert_eq!(
            next.model_used.get("router").map(String::as_str),
            Some("anthropic/claude-haiku-4-5-20251001")
        );
    }

    #[tokio::test]
    async fn unparseable_reply_falls_back_to_insufficient() {
        let client = ScriptedClient::replying(&["I think this looks valid to me!"]);
        let config = AppConfig::default();
        let ctx = NodeContext { client: &client, models: &config.llm.models };

        let next = run(&state(), &ctx).await.expect("router run recovers");
        assert_eq!(next.query_type, QueryType::Insufficient);
        assert_eq!(next.error_message.as_deref(), Some(FALLBACK_ERROR_MESSAGE));
        assert!(next.execution_times.contains_key("router"));
    }

    #[tokio::test]
    async fn router_requests_json_mode_with_reduced_ceiling() {
        let client = ScriptedClient::replying(&[r#"{"query_type": "irrelevant"}"#]);
        let config = AppConfig::default();
        let ctx = NodeContext { client: &client, models: &config.llm.models };

        run(&state(), &ctx).await.expect("router run");
        let requests = client.requests.lock().expect("requests");
        assert_eq!(requests.len(), 1);
        assert!(requests[0].json_mode);
        assert_eq!(requests[0].max_tokens, 2048);
        assert!(requests[0].user.contains("Hotel Name: Centara Grand"));
    }

    #[tokio::test]
    async fn input_state_is_left_untouched() {
        let client = ScriptedClient::replying(&[r#"{"query_type": "valid"}"#]);
        let config = AppConfig::default();
        let ctx = NodeContext { client: &client, models: &config.llm.models };

        let original = state();
        let _ = run(&original, &ctx).await.expect("router run");
        assert!(original.execution_times.is_empty());
        assert_eq!(original.query_type, QueryType::Valid);
    }
}
