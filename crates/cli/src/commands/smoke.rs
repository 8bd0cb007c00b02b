use std::time::Instant;

use crate::commands::CommandResult;
use revvy_core::config::{AppConfig, LoadOptions};
use revvy_db::{connect_with_settings, migrations, ResultCacheStore, SqlResultCacheStore};
use secrecy::ExposeSecret;
use serde::Serialize;

const CACHE_PROBE_KEY: &str = "smoke:cache_probe";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum SmokeStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: SmokeStatus,
    elapsed_ms: u64,
    message: String,
}

#[derive(Debug, Serialize)]
struct SmokeReport {
    command: &'static str,
    status: SmokeStatus,
    summary: String,
    total_elapsed_ms: u64,
    checks: Vec<SmokeCheck>,
}

pub fn run() -> CommandResult {
    let started = Instant::now();
    let mut checks = Vec::new();

    let config = match timed_check(|| AppConfig::load(LoadOptions::default())) {
        Ok((elapsed_ms, config)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Pass,
                elapsed_ms,
                message: "configuration loaded and validated".to_string(),
            });
            config
        }
        Err((elapsed_ms, error)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Fail,
                elapsed_ms,
                message: error.to_string(),
            });
            checks.push(skipped("llm_credentials"));
            checks.push(skipped("db_connectivity"));
            checks.push(skipped("migration_visibility"));
            checks.push(skipped("cache_round_trip"));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    let credentials_started = Instant::now();
    let anthropic_sane = config
        .llm
        .anthropic_api_key
        .as_ref()
        .map(|key| key.expose_secret().starts_with("sk-ant-"));
    let gemini_sane =
        config.llm.gemini_api_key.as_ref().map(|key| !key.expose_secret().trim().is_empty());
    let any_key = anthropic_sane.is_some() || gemini_sane.is_some();
    let all_sane = anthropic_sane.unwrap_or(true) && gemini_sane.unwrap_or(true);
    checks.push(SmokeCheck {
        name: "llm_credentials",
        status: if any_key && all_sane { SmokeStatus::Pass } else { SmokeStatus::Fail },
        elapsed_ms: credentials_started.elapsed().as_millis() as u64,
        message: if any_key && all_sane {
            "provider api keys look plausible".to_string()
        } else if any_key {
            "expected provider credentials with valid shapes (anthropic sk-ant-*)".to_string()
        } else {
            "no provider api key configured".to_string()
        },
    });

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            checks.push(SmokeCheck {
                name: "db_connectivity",
                status: SmokeStatus::Fail,
                elapsed_ms: 0,
                message: format!("failed to initialize async runtime: {error}"),
            });
            checks.push(skipped("migration_visibility"));
            checks.push(skipped("cache_round_trip"));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    let db_started = Instant::now();
    let db_result = runtime.block_on(async {
        connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
    });

    let pool = match db_result {
        Ok(pool) => {
            checks.push(SmokeCheck {
                name: "db_connectivity",
                status: SmokeStatus::Pass,
                elapsed_ms: db_started.elapsed().as_millis() as u64,
                message: format!("connected using `{}`", config.database.url),
            });
            pool
        }
        Err(error) => {
            checks.push(SmokeCheck {
                name: "db_connectivity",
                status: SmokeStatus::Fail,
                elapsed_ms: db_started.elapsed().as_millis() as u64,
                message: format!("failed to connect: {error}"),
            });
            checks.push(skipped("migration_visibility"));
            checks.push(skipped("cache_round_trip"));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    let migration_started = Instant::now();
    let migration_result = runtime.block_on(async { migrations::run_pending(&pool).await });

    match migration_result {
        Ok(()) => checks.push(SmokeCheck {
            name: "migration_visibility",
            status: SmokeStatus::Pass,
            elapsed_ms: migration_started.elapsed().as_millis() as u64,
            message: "migrations are visible and executable".to_string(),
        }),
        Err(error) => {
            checks.push(SmokeCheck {
                name: "migration_visibility",
                status: SmokeStatus::Fail,
                elapsed_ms: migration_started.elapsed().as_millis() as u64,
                message: format!("migration execution failed: {error}"),
            });
            checks.push(skipped("cache_round_trip"));
            runtime.block_on(async {
                pool.close().await;
            });
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    }

    let cache_started = Instant::now();
    let cache_result = runtime.block_on(async {
        let store = SqlResultCacheStore::new(pool.clone());
        store.store(CACHE_PROBE_KEY, r#"{"probe":true}"#, 60).await?;
        store.lookup(CACHE_PROBE_KEY).await
    });
    runtime.block_on(async {
        pool.close().await;
    });

    match cache_result {
        Ok(Some(_)) => checks.push(SmokeCheck {
            name: "cache_round_trip",
            status: SmokeStatus::Pass,
            elapsed_ms: cache_started.elapsed().as_millis() as u64,
            message: "stored and read back a probe entry".to_string(),
        }),
        Ok(None) => checks.push(SmokeCheck {
            name: "cache_round_trip",
            status: SmokeStatus::Fail,
            elapsed_ms: cache_started.elapsed().as_millis() as u64,
            message: "probe entry was not readable after store".to_string(),
        }),
        Err(error) => checks.push(SmokeCheck {
            name: "cache_round_trip",
            status: SmokeStatus::Fail,
            elapsed_ms: cache_started.elapsed().as_millis() as u64,
            message: format!("cache round-trip failed: {error}"),
        }),
    }

    finalize_report(checks, started.elapsed().as_millis() as u64)
}

fn timed_check<T, E>(check: impl FnOnce() -> Result<T, E>) -> Result<(u64, T), (u64, E)> {
    let started = Instant::now();
    match check() {
        Ok(value) => Ok((started.elapsed().as_millis() as u64, value)),
        Err(error) => Err((started.elapsed().as_millis() as u64, error)),
    }
}

fn skipped(name: &'static str) -> SmokeCheck {
    SmokeCheck {
        name,
        status: SmokeStatus::Skipped,
        elapsed_ms: 0,
        message: "skipped due previous failure".to_string(),
    }
}

fn finalize_report(checks: Vec<SmokeCheck>, total_elapsed_ms: u64) -> CommandResult {
    let passed = checks.iter().filter(|check| check.status == SmokeStatus::Pass).count();
    let total = checks.len();
    let failed = checks.iter().any(|check| check.status == SmokeStatus::Fail);

    let report = SmokeReport {
        command: "smoke",
        status: if failed { SmokeStatus::Fail } else { SmokeStatus::Pass },
        summary: format!("smoke: {passed}/{total} checks passed in {total_elapsed_ms}ms"),
        total_elapsed_ms,
        checks,
    };

    let human = report.summary.clone();
    let machine = serde_json::to_string(&report).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"smoke\",\"status\":\"fail\",\"summary\":\"serialization failed\",\"error\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    });

    CommandResult { exit_code: if failed { 6 } else { 0 }, output: format!("{human}\n{machine}") }
}
