//! Process-wide settings
//!
//! Built once at startup from the environment (after `dotenv`) and passed
//! by reference to the components that need it.

use crate::error::OrchestrationError;
use crate::Result;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub endpoint: String,
    pub api_key: String,
    pub deployment: String,
    pub api_version: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub llm: LlmSettings,
    pub bank_base_url: String,
    /// Used when an incoming request carries no `cookie` header
    pub fallback_cookie: Option<String>,
    pub tool_timeout: Duration,
    pub pagination_max_pages: usize,
    pub approval_ttl: Duration,
    /// A running run with no checkpoint write for this long is reported failed
    pub run_stale_after: Duration,
    pub max_replans: u32,
    pub max_plan_steps: usize,
    pub agent_max_tool_rounds: usize,
    pub database_url: Option<String>,
    pub port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            llm: LlmSettings {
                endpoint: String::new(),
                api_key: String::new(),
                deployment: "gpt-4.1".to_string(),
                api_version: "2024-10-21".to_string(),
            },
            bank_base_url: "https://www.abnamro.nl".to_string(),
            fallback_cookie: None,
            tool_timeout: Duration::from_secs(10),
            pagination_max_pages: 50,
            approval_ttl: Duration::from_secs(24 * 60 * 60),
            run_stale_after: Duration::from_secs(30 * 60),
            max_replans: 10,
            max_plan_steps: 20,
            agent_max_tool_rounds: 8,
            database_url: None,
            port: 8080,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let llm = LlmSettings {
            endpoint: env::var("AZURE_OPENAI_ENDPOINT").unwrap_or_default(),
            api_key: env::var("AZURE_OPENAI_API_KEY").unwrap_or_default(),
            deployment: env::var("AZURE_OPENAI_DEPLOYMENT").unwrap_or(defaults.llm.deployment),
            api_version: env::var("AZURE_OPENAI_API_VERSION")
                .unwrap_or(defaults.llm.api_version),
        };

        let fallback_cookie = env::var("BANK_COOKIE")
            .ok()
            .filter(|value| !value.trim().is_empty());

        let database_url = env::var("POSTGRES_URL")
            .or_else(|_| env::var("DATABASE_URL"))
            .ok()
            .filter(|value| !value.trim().is_empty());

        let port = match env::var("PORT").or_else(|_| env::var("API_PORT")) {
            Ok(raw) => parse_value("PORT", &raw)?,
            Err(_) => defaults.port,
        };

        Ok(Self {
            llm,
            bank_base_url: env::var("BANK_API_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.bank_base_url),
            fallback_cookie,
            tool_timeout: Duration::from_secs(env_or("TOOL_TIMEOUT_SECS", 10)?),
            pagination_max_pages: env_or("PAGINATION_MAX_PAGES", defaults.pagination_max_pages)?,
            approval_ttl: Duration::from_secs(env_or("APPROVAL_TTL_SECS", 24 * 60 * 60)?),
            run_stale_after: Duration::from_secs(env_or("RUN_STALE_AFTER_SECS", 30 * 60)?),
            max_replans: env_or("MAX_REPLANS", defaults.max_replans)?,
            max_plan_steps: env_or("MAX_PLAN_STEPS", defaults.max_plan_steps)?,
            agent_max_tool_rounds: env_or("AGENT_MAX_TOOL_ROUNDS", defaults.agent_max_tool_rounds)?,
            database_url,
            port,
        })
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim().parse::<T>().map_err(|_| {
        OrchestrationError::ConfigError(format!("{} has an invalid value: {:?}", key, raw))
    })
}
