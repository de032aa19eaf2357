//! Process settings read from the environment

use crate::error::OrchestrationError;
use crate::Result;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_ENGINE_TIMEOUT_MS: u64 = 20_000;
const DEFAULT_RUN_TIMEOUT_MS: u64 = 90_000;
const DEFAULT_NARRATIVE_TIMEOUT_MS: u64 = 15_000;

#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub engine_timeout: Duration,
    pub run_timeout: Duration,
    pub narrative_timeout: Duration,
    /// Base URL of the deployed scoring engines. Mock engines when unset.
    pub engine_base_url: Option<String>,
    pub gemini_api_key: Option<String>,
    pub database_url: Option<String>,
    pub strategy_file: Option<PathBuf>,
    /// Funds the local data-flow policy rejects outright.
    pub blocked_funds: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            engine_timeout: Duration::from_millis(DEFAULT_ENGINE_TIMEOUT_MS),
            run_timeout: Duration::from_millis(DEFAULT_RUN_TIMEOUT_MS),
            narrative_timeout: Duration::from_millis(DEFAULT_NARRATIVE_TIMEOUT_MS),
            engine_base_url: None,
            gemini_api_key: None,
            database_url: None,
            strategy_file: None,
            blocked_funds: Vec::new(),
        }
    }
}

impl Settings {
    /// Read settings from the process environment.
    ///
    /// Call `dotenv::dotenv()` first if a `.env` file should be honored.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match non_empty("PORT").or_else(|| non_empty("API_PORT")) {
            Some(raw) => raw.trim().parse::<u16>().map_err(|e| {
                OrchestrationError::ConfigError(format!("Invalid PORT '{}': {}", raw, e))
            })?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            port,
            engine_timeout: parse_millis(&non_empty, "ENGINE_TIMEOUT_MS", DEFAULT_ENGINE_TIMEOUT_MS)?,
            run_timeout: parse_millis(&non_empty, "RUN_TIMEOUT_MS", DEFAULT_RUN_TIMEOUT_MS)?,
            narrative_timeout: parse_millis(
                &non_empty,
                "NARRATIVE_TIMEOUT_MS",
                DEFAULT_NARRATIVE_TIMEOUT_MS,
            )?,
            engine_base_url: non_empty("ENGINE_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string()),
            gemini_api_key: non_empty("GEMINI_API_KEY"),
            database_url: non_empty("POSTGRES_URL").or_else(|| non_empty("DATABASE_URL")),
            strategy_file: non_empty("STRATEGY_FILE").map(PathBuf::from),
            blocked_funds: non_empty("BLOCKED_FUNDS")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|id| !id.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        })
    }
}

fn parse_millis<F>(lookup: &F, key: &str, default: u64) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let millis = match lookup(key) {
        Some(raw) => raw.trim().parse::<u64>().map_err(|e| {
            OrchestrationError::ConfigError(format!("Invalid {} '{}': {}", key, raw, e))
        })?,
        None => default,
    };

    if millis == 0 {
        return Err(OrchestrationError::ConfigError(format!(
            "{} must be greater than zero",
            key
        )));
    }

    Ok(Duration::from_millis(millis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.engine_timeout, Duration::from_secs(20));
        assert!(settings.engine_base_url.is_none());
        assert!(settings.gemini_api_key.is_none());
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("API_PORT", "9000"),
            ("ENGINE_TIMEOUT_MS", "1500"),
            ("ENGINE_BASE_URL", "http://engines.local/"),
            ("DATABASE_URL", "postgres://localhost/deals"),
            ("GEMINI_API_KEY", "  "),
            ("BLOCKED_FUNDS", "fund-a, ,fund-b"),
        ]))
        .unwrap();

        assert_eq!(settings.port, 9000);
        assert_eq!(settings.engine_timeout, Duration::from_millis(1500));
        assert_eq!(settings.engine_base_url.as_deref(), Some("http://engines.local"));
        assert_eq!(settings.database_url.as_deref(), Some("postgres://localhost/deals"));
        assert!(settings.gemini_api_key.is_none());
        assert_eq!(settings.blocked_funds, vec!["fund-a", "fund-b"]);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(Settings::from_lookup(lookup_from(&[("PORT", "eighty")])).is_err());
        assert!(Settings::from_lookup(lookup_from(&[("RUN_TIMEOUT_MS", "0")])).is_err());
    }
}
