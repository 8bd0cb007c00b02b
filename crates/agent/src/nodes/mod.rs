//! The five pipeline stages. Each node is a pure async step over
//! [`PipelineState`]: build a prompt from the state, call the LLM, return a
//! new state carrying exactly this node's output and telemetry. The router
//! classifies; the other four produce the markdown sections of the plan.

pub mod demand_forecaster;
pub mod market_analyst;
pub mod pricing_strategist;
pub mod revenue_manager;
pub mod router;

use revvy_core::config::ModelTable;

use crate::llm::LlmClient;

/// Token ceiling for the analysis nodes. The router uses a smaller one since
/// it only emits a verdict object.
pub(crate) const ANALYSIS_MAX_TOKENS: u32 = 4096;

/// Per-run dependencies handed to every node: the provider-resolved client
/// and the model table to look its own slot up in.
pub struct NodeContext<'a> {
    pub client: &'a dyn LlmClient,
    pub models: &'a ModelTable,
}

pub(crate) fn or_placeholder<'a>(value: &'a Option<String>, placeholder: &'a str) -> &'a str {
    value.as_deref().filter(|text| !text.trim().is_empty()).unwrap_or(placeholder)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::llm::{CompletionRequest, LlmClient, LlmError};

    /// Test double that pops queued responses in order and keeps every
    /// request it saw.
    pub struct ScriptedClient {
        responses: Mutex<Vec<Result<String, LlmError>>>,
        pub requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedClient {
        pub fn new(responses: Vec<Result<String, LlmError>>) -> Self {
            let mut responses = responses;
            responses.reverse();
            Self { responses: Mutex::new(responses), requests: Mutex::new(Vec::new()) }
        }

        pub fn replying(responses: &[&str]) -> Self {
            Self::new(responses.iter().map(|text| Ok((*text).to_string())).collect())
        }

        pub fn calls(&self) -> usize {
            self.requests.lock().map(|requests| requests.len()).unwrap_or(0)
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
            if let Ok(mut requests) = self.requests.lock() {
                requests.push(request);
            }
            match self.responses.lock() {
                Ok(mut responses) => responses.pop().unwrap_or(Err(LlmError::EmptyResponse)),
                Err(_) => Err(LlmError::EmptyResponse),
            }
        }
    }
}
