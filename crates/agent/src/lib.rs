//! Agent pipeline - multi-stage LLM revenue analysis
//!
//! This crate is the "brain" of the revvy system - the node chain that turns
//! a hotel's details into a revenue optimization plan:
//! - Classifies the request (`nodes::router`) before spending analysis tokens
//! - Runs the four analysis stages in order, each building on the last
//! - Streams per-stage events to callers that want progress, and replays the
//!   identical sequence from a cached report
//!
//! # Architecture
//!
//! One run is a walk over the node graph:
//! 1. **Router** (`nodes::router`) - Classify the input into a verdict
//! 2. **Analysis chain** (`nodes::*`) - market analysis → demand forecast →
//!    pricing strategy → revenue plan, only for `valid` verdicts
//! 3. **Execution** (`graph`) - Drives the walk, sync or event-streamed
//! 4. **Providers** (`llm`) - Anthropic and Gemini behind one trait
//!
//! # Key Types
//!
//! - `PipelineGraph` - Main executor (see `graph` module)
//! - `LlmClient` - Pluggable provider trait; `LlmRouter` picks per request
//! - `PipelineEvent` - Stream frames; `replay_events` rebuilds them from a
//!   stored report
//!
//! # Provider Principle
//!
//! The provider is picked once per run from the request and pinned. Every
//! node in that run goes to the same backend, so telemetry and billing line
//! up with what the caller asked for.

pub mod events;
pub mod graph;
pub mod llm;
pub mod nodes;

pub use events::{replay_events, PipelineEvent};
pub use graph::{PipelineError, PipelineGraph};
pub use llm::{
    AnthropicClient, CompletionRequest, GeminiClient, LlmClient, LlmError, LlmRouter,
};
