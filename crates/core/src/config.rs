use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

use crate::domain::{NodeKind, Provider};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub cache: CacheConfig,
    pub auth: AuthConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub anthropic_api_key: Option<SecretString>,
    pub gemini_api_key: Option<SecretString>,
    pub anthropic_base_url: String,
    pub gemini_base_url: String,
    pub timeout_secs: u64,
    pub models: ModelTable,
}

impl LlmConfig {
    pub fn has_key_for(&self, provider: Provider) -> bool {
        let key = match provider {
            Provider::Anthropic => self.anthropic_api_key.as_ref(),
            Provider::Gemini => self.gemini_api_key.as_ref(),
        };
        key.map(|value| !value.expose_secret().trim().is_empty()).unwrap_or(false)
    }
}

/// Model id per pipeline stage, per provider. The router and the three
/// analysis nodes default to the fast tier; the revenue manager, which writes
/// the long synthesis, gets the deeper tier.
#[derive(Clone, Debug)]
pub struct ModelTable {
    pub anthropic: NodeModels,
    pub gemini: NodeModels,
}

#[derive(Clone, Debug)]
pub struct NodeModels {
    pub router: String,
    pub market_analyst: String,
    pub demand_forecaster: String,
    pub pricing_strategist: String,
    pub revenue_manager: String,
}

impl ModelTable {
    pub fn model_for(&self, provider: Provider, node: NodeKind) -> &str {
        let models = match provider {
            Provider::Anthropic => &self.anthropic,
            Provider::Gemini => &self.gemini,
        };
        match node {
            NodeKind::Router => &models.router,
            NodeKind::MarketAnalyst => &models.market_analyst,
            NodeKind::DemandForecaster => &models.demand_forecaster,
            NodeKind::PricingStrategist => &models.pricing_strategist,
            NodeKind::RevenueManager => &models.revenue_manager,
        }
    }
}

impl Default for ModelTable {
    fn default() -> Self {
        Self {
            anthropic: NodeModels {
                router: "claude-haiku-4-5-20251001".to_string(),
                market_analyst: "claude-haiku-4-5-20251001".to_string(),
                demand_forecaster: "claude-haiku-4-5-20251001".to_string(),
                pricing_strategist: "claude-haiku-4-5-20251001".to_string(),
                revenue_manager: "claude-sonnet-4-6".to_string(),
            },
            gemini: NodeModels {
                router: "gemini-2.5-flash".to_string(),
                market_analyst: "gemini-2.5-flash".to_string(),
                demand_forecaster: "gemini-2.5-flash".to_string(),
                pricing_strategist: "gemini-2.5-flash".to_string(),
                revenue_manager: "gemini-2.5-pro".to_string(),
            },
        }
    }
}

#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub tokens: Vec<ApiToken>,
}

/// One opaque bearer token and the account it authenticates as.
#[derive(Clone, Debug)]
pub struct ApiToken {
    pub token: SecretString,
    pub user_id: i64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub cache_enabled: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://revvy.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                anthropic_api_key: None,
                gemini_api_key: None,
                anthropic_base_url: "https://api.anthropic.com".to_string(),
                gemini_base_url: "https://generativelanguage.googleapis.com".to_string(),
                timeout_secs: 120,
                models: ModelTable::default(),
            },
            cache: CacheConfig { enabled: true, ttl_secs: 3600 },
            auth: AuthConfig { tokens: Vec::new() },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("revvy.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(anthropic_api_key) = llm.anthropic_api_key {
                self.llm.anthropic_api_key = Some(secret_value(anthropic_api_key));
            }
            if let Some(gemini_api_key) = llm.gemini_api_key {
                self.llm.gemini_api_key = Some(secret_value(gemini_api_key));
            }
            if let Some(anthropic_base_url) = llm.anthropic_base_url {
                self.llm.anthropic_base_url = anthropic_base_url;
            }
            if let Some(gemini_base_url) = llm.gemini_base_url {
                self.llm.gemini_base_url = gemini_base_url;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(models) = llm.models {
                if let Some(anthropic) = models.anthropic {
                    apply_node_models_patch(&mut self.llm.models.anthropic, anthropic);
                }
                if let Some(gemini) = models.gemini {
                    apply_node_models_patch(&mut self.llm.models.gemini, gemini);
                }
            }
        }

        if let Some(cache) = patch.cache {
            if let Some(enabled) = cache.enabled {
                self.cache.enabled = enabled;
            }
            if let Some(ttl_secs) = cache.ttl_secs {
                self.cache.ttl_secs = ttl_secs;
            }
        }

        if let Some(auth) = patch.auth {
            if let Some(tokens) = auth.tokens {
                self.auth.tokens = tokens
                    .into_iter()
                    .map(|entry| ApiToken {
                        token: secret_value(entry.token),
                        user_id: entry.user_id,
                    })
                    .collect();
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("REVVY_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("REVVY_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("REVVY_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("REVVY_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("REVVY_DATABASE_TIMEOUT_SECS", &value)?;
        }

        let anthropic_key =
            read_env("REVVY_LLM_ANTHROPIC_API_KEY").or_else(|| read_env("ANTHROPIC_API_KEY"));
        if let Some(value) = anthropic_key {
            self.llm.anthropic_api_key = Some(secret_value(value));
        }
        let gemini_key =
            read_env("REVVY_LLM_GEMINI_API_KEY").or_else(|| read_env("GEMINI_API_KEY"));
        if let Some(value) = gemini_key {
            self.llm.gemini_api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("REVVY_LLM_ANTHROPIC_BASE_URL") {
            self.llm.anthropic_base_url = value;
        }
        if let Some(value) = read_env("REVVY_LLM_GEMINI_BASE_URL") {
            self.llm.gemini_base_url = value;
        }
        if let Some(value) = read_env("REVVY_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("REVVY_LLM_TIMEOUT_SECS", &value)?;
        }
        apply_model_env_overrides(&mut self.llm.models.anthropic, "REVVY_MODEL_ANTHROPIC");
        apply_model_env_overrides(&mut self.llm.models.gemini, "REVVY_MODEL_GEMINI");

        if let Some(value) = read_env("REVVY_CACHE_ENABLED") {
            self.cache.enabled = parse_bool("REVVY_CACHE_ENABLED", &value)?;
        }
        if let Some(value) = read_env("REVVY_CACHE_TTL_SECS") {
            self.cache.ttl_secs = parse_u64("REVVY_CACHE_TTL_SECS", &value)?;
        }

        if let Some(value) = read_env("REVVY_AUTH_TOKENS") {
            self.auth.tokens = parse_auth_tokens(&value)?;
        }

        if let Some(value) = read_env("REVVY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("REVVY_SERVER_PORT") {
            self.server.port = parse_u16("REVVY_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("REVVY_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("REVVY_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("REVVY_LOGGING_LEVEL").or_else(|| read_env("REVVY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("REVVY_LOGGING_FORMAT").or_else(|| read_env("REVVY_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(anthropic_api_key) = overrides.anthropic_api_key {
            self.llm.anthropic_api_key = Some(secret_value(anthropic_api_key));
        }
        if let Some(gemini_api_key) = overrides.gemini_api_key {
            self.llm.gemini_api_key = Some(secret_value(gemini_api_key));
        }
        if let Some(cache_enabled) = overrides.cache_enabled {
            self.cache.enabled = cache_enabled;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_cache(&self.cache)?;
        validate_auth(&self.auth)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("revvy.toml"), PathBuf::from("config/revvy.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn apply_node_models_patch(models: &mut NodeModels, patch: NodeModelsPatch) {
    if let Some(router) = patch.router {
        models.router = router;
    }
    if let Some(market_analyst) = patch.market_analyst {
        models.market_analyst = market_analyst;
    }
    if let Some(demand_forecaster) = patch.demand_forecaster {
        models.demand_forecaster = demand_forecaster;
    }
    if let Some(pricing_strategist) = patch.pricing_strategist {
        models.pricing_strategist = pricing_strategist;
    }
    if let Some(revenue_manager) = patch.revenue_manager {
        models.revenue_manager = revenue_manager;
    }
}

fn apply_model_env_overrides(models: &mut NodeModels, prefix: &str) {
    if let Some(value) = read_env(&format!("{prefix}_ROUTER")) {
        models.router = value;
    }
    if let Some(value) = read_env(&format!("{prefix}_MARKET_ANALYST")) {
        models.market_analyst = value;
    }
    if let Some(value) = read_env(&format!("{prefix}_DEMAND_FORECASTER")) {
        models.demand_forecaster = value;
    }
    if let Some(value) = read_env(&format!("{prefix}_PRICING_STRATEGIST")) {
        models.pricing_strategist = value;
    }
    if let Some(value) = read_env(&format!("{prefix}_REVENUE_MANAGER")) {
        models.revenue_manager = value;
    }
}

fn parse_auth_tokens(value: &str) -> Result<Vec<ApiToken>, ConfigError> {
    let mut tokens = Vec::new();
    for entry in value.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
        let invalid = || ConfigError::InvalidEnvOverride {
            key: "REVVY_AUTH_TOKENS".to_string(),
            value: entry.to_string(),
        };
        let (token, user_id) = entry.rsplit_once(':').ok_or_else(invalid)?;
        if token.trim().is_empty() {
            return Err(invalid());
        }
        let user_id = user_id.trim().parse::<i64>().map_err(|_| invalid())?;
        tokens.push(ApiToken { token: secret_value(token.trim().to_string()), user_id });
    }
    Ok(tokens)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if !llm.has_key_for(Provider::Anthropic) && !llm.has_key_for(Provider::Gemini) {
        return Err(ConfigError::Validation(
            "no LLM credentials configured. Set llm.anthropic_api_key or llm.gemini_api_key \
             (env: REVVY_LLM_ANTHROPIC_API_KEY / REVVY_LLM_GEMINI_API_KEY)"
                .to_string(),
        ));
    }

    for (field, url) in
        [("llm.anthropic_base_url", &llm.anthropic_base_url), ("llm.gemini_base_url", &llm.gemini_base_url)]
    {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "{field} must start with http:// or https://"
            )));
        }
    }

    for provider in [Provider::Anthropic, Provider::Gemini] {
        for node in NodeKind::ALL {
            if llm.models.model_for(provider, node).trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "llm.models.{}.{} must not be empty",
                    provider.as_str(),
                    node.as_str()
                )));
            }
        }
    }

    Ok(())
}

fn validate_cache(cache: &CacheConfig) -> Result<(), ConfigError> {
    if cache.enabled && (cache.ttl_secs == 0 || cache.ttl_secs > 86_400) {
        return Err(ConfigError::Validation(
            "cache.ttl_secs must be in range 1..=86400 when the cache is enabled".to_string(),
        ));
    }

    Ok(())
}

fn validate_auth(auth: &AuthConfig) -> Result<(), ConfigError> {
    for entry in &auth.tokens {
        if entry.token.expose_secret().trim().is_empty() {
            return Err(ConfigError::Validation(
                "auth.tokens entries must not have empty token values".to_string(),
            ));
        }
        if entry.user_id < 1 {
            return Err(ConfigError::Validation(
                "auth.tokens entries must map to user_id >= 1".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation(
            "server.port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    cache: Option<CachePatch>,
    auth: Option<AuthPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    anthropic_api_key: Option<String>,
    gemini_api_key: Option<String>,
    anthropic_base_url: Option<String>,
    gemini_base_url: Option<String>,
    timeout_secs: Option<u64>,
    models: Option<ModelTablePatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ModelTablePatch {
    anthropic: Option<NodeModelsPatch>,
    gemini: Option<NodeModelsPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct NodeModelsPatch {
    router: Option<String>,
    market_analyst: Option<String>,
    demand_forecaster: Option<String>,
    pricing_strategist: Option<String>,
    revenue_manager: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CachePatch {
    enabled: Option<bool>,
    ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthPatch {
    tokens: Option<Vec<ApiTokenPatch>>,
}

#[derive(Debug, Deserialize)]
struct ApiTokenPatch {
    token: String,
    user_id: i64,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
