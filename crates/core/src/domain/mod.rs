pub mod pipeline;
pub mod report;
pub mod request;

pub use pipeline::{NodeKind, PipelineState, Provider, QueryType};
pub use report::OptimizeReport;
pub use request::OptimizeRequest;
