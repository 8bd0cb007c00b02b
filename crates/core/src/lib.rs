pub mod config;
pub mod domain;
pub mod errors;
pub mod fingerprint;

pub use config::{
    AppConfig, ApiToken, AuthConfig, CacheConfig, ConfigError, ConfigOverrides, DatabaseConfig,
    LlmConfig, LoadOptions, LogFormat, LoggingConfig, ModelTable, NodeModels, ServerConfig,
};
pub use domain::{
    NodeKind, OptimizeReport, OptimizeRequest, PipelineState, Provider, QueryType,
};
pub use errors::DomainError;
pub use fingerprint::{request_fingerprint, CACHE_KEY_PREFIX};
