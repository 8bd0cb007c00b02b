use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use revvy_core::config::{AppConfig, LoadOptions};
use revvy_core::domain::{NodeKind, Provider};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    lines.push(render_line(
        "database.url",
        &config.database.url,
        source("database.url", &["REVVY_DATABASE_URL"]),
    ));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        source("database.max_connections", &["REVVY_DATABASE_MAX_CONNECTIONS"]),
    ));
    lines.push(render_line(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        source("database.timeout_secs", &["REVVY_DATABASE_TIMEOUT_SECS"]),
    ));

    let anthropic_key =
        if config.llm.anthropic_api_key.is_some() { "<redacted>" } else { "<unset>" };
    lines.push(render_line(
        "llm.anthropic_api_key",
        anthropic_key,
        source(
            "llm.anthropic_api_key",
            &["REVVY_LLM_ANTHROPIC_API_KEY", "ANTHROPIC_API_KEY"],
        ),
    ));
    let gemini_key = if config.llm.gemini_api_key.is_some() { "<redacted>" } else { "<unset>" };
    lines.push(render_line(
        "llm.gemini_api_key",
        gemini_key,
        source("llm.gemini_api_key", &["REVVY_LLM_GEMINI_API_KEY", "GEMINI_API_KEY"]),
    ));
    lines.push(render_line(
        "llm.anthropic_base_url",
        &config.llm.anthropic_base_url,
        source("llm.anthropic_base_url", &["REVVY_LLM_ANTHROPIC_BASE_URL"]),
    ));
    lines.push(render_line(
        "llm.gemini_base_url",
        &config.llm.gemini_base_url,
        source("llm.gemini_base_url", &["REVVY_LLM_GEMINI_BASE_URL"]),
    ));
    lines.push(render_line(
        "llm.timeout_secs",
        &config.llm.timeout_secs.to_string(),
        source("llm.timeout_secs", &["REVVY_LLM_TIMEOUT_SECS"]),
    ));

    for provider in [Provider::Anthropic, Provider::Gemini] {
        let env_prefix = match provider {
            Provider::Anthropic => "REVVY_MODEL_ANTHROPIC",
            Provider::Gemini => "REVVY_MODEL_GEMINI",
        };
        for node in NodeKind::ALL {
            let key_path = format!("llm.models.{}.{}", provider.as_str(), node.as_str());
            let env_key = format!("{env_prefix}_{}", node.as_str().to_uppercase());
            lines.push(render_line(
                &key_path,
                config.llm.models.model_for(provider, node),
                source(&key_path, &[env_key.as_str()]),
            ));
        }
    }

    lines.push(render_line(
        "cache.enabled",
        &config.cache.enabled.to_string(),
        source("cache.enabled", &["REVVY_CACHE_ENABLED"]),
    ));
    lines.push(render_line(
        "cache.ttl_secs",
        &config.cache.ttl_secs.to_string(),
        source("cache.ttl_secs", &["REVVY_CACHE_TTL_SECS"]),
    ));

    lines.push(render_line(
        "auth.tokens",
        &format!("{} configured", config.auth.tokens.len()),
        source("auth.tokens", &["REVVY_AUTH_TOKENS"]),
    ));

    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        source("server.bind_address", &["REVVY_SERVER_BIND_ADDRESS"]),
    ));
    lines.push(render_line(
        "server.port",
        &config.server.port.to_string(),
        source("server.port", &["REVVY_SERVER_PORT"]),
    ));
    lines.push(render_line(
        "server.graceful_shutdown_secs",
        &config.server.graceful_shutdown_secs.to_string(),
        source("server.graceful_shutdown_secs", &["REVVY_SERVER_GRACEFUL_SHUTDOWN_SECS"]),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", &["REVVY_LOGGING_LEVEL", "REVVY_LOG_LEVEL"]),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", &["REVVY_LOGGING_FORMAT", "REVVY_LOG_FORMAT"]),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("revvy.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/revvy.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    for env_key in env_keys {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
