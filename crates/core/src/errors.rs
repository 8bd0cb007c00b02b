use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("unsupported llm provider `{0}` (expected anthropic|gemini)")]
    UnknownProvider(String),
    #[error("unknown query classification `{0}` (expected valid|irrelevant|booking|insufficient)")]
    UnknownQueryType(String),
}
