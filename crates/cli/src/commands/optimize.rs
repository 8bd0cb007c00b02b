use clap::Args;

use crate::commands::CommandResult;
use revvy_agent::{LlmRouter, PipelineGraph};
use revvy_core::config::{AppConfig, LoadOptions};
use revvy_core::domain::Provider;
use revvy_core::{OptimizeReport, OptimizeRequest, PipelineState};

/// Inputs for one pipeline pass. Mirrors the API request body; empty fields
/// are legal and the router decides whether they are enough to work with.
#[derive(Args, Debug)]
pub struct OptimizeArgs {
    #[arg(long, help = "Hotel name the run is about")]
    pub hotel_name: String,
    #[arg(long, help = "City or market the hotel operates in")]
    pub hotel_location: String,
    #[arg(long, default_value = "", help = "Current average daily rate, free-form")]
    pub current_adr: String,
    #[arg(long, default_value = "", help = "Historical occupancy, free-form")]
    pub historical_occupancy: String,
    #[arg(long, default_value = "", help = "Target revenue per available room, free-form")]
    pub target_revpar: String,
    #[arg(long, default_value = "", help = "Extra context passed to every node")]
    pub additional_context: String,
    #[arg(long, default_value = "anthropic", help = "LLM provider: anthropic or gemini")]
    pub provider: Provider,
}

pub fn run(args: OptimizeArgs) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "optimize",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "optimize",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let llm = match LlmRouter::from_config(&config.llm) {
        Ok(llm) => llm,
        Err(error) => {
            return CommandResult::failure(
                "optimize",
                "llm_client",
                format!("llm client construction failed: {error}"),
                4,
            );
        }
    };
    // Missing credentials are an llm_client failure, not a pipeline one.
    if let Err(error) = llm.ensure_configured(args.provider) {
        return CommandResult::failure("optimize", "llm_client", error.to_string(), 4);
    }
    let graph = PipelineGraph::new(llm, config.llm.models.clone());

    let request = OptimizeRequest {
        hotel_name: args.hotel_name,
        hotel_location: args.hotel_location,
        current_adr: args.current_adr,
        historical_occupancy: args.historical_occupancy,
        target_revpar: args.target_revpar,
        additional_context: args.additional_context,
        provider: args.provider,
    };
    let state = PipelineState::from_request(&request);

    match runtime.block_on(graph.run(state)) {
        Ok(final_state) => {
            let report = OptimizeReport::from(final_state);
            match serde_json::to_string_pretty(&report) {
                Ok(output) => CommandResult { exit_code: 0, output },
                Err(error) => CommandResult::failure(
                    "optimize",
                    "serialization",
                    format!("failed to serialize report: {error}"),
                    6,
                ),
            }
        }
        Err(error) => {
            CommandResult::failure("optimize", "pipeline", format!("pipeline run failed: {error}"), 5)
        }
    }
}
