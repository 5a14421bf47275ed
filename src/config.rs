use std::{env, path::PathBuf, time::Duration};

use crate::auth::AuthConfig;
use crate::db::DatabaseConfig;

pub const DEFAULT_STORAGE_ROOT: &str = "./uploads";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini-2024-07-18";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

fn var_or(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn opt_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match opt_var(name) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{} has an invalid value '{}': {}", name, raw, e)),
        None => Ok(default),
    }
}

/// Split a comma-separated origin list; empty input means any origin.
pub fn parse_cors_origins(raw: &str) -> Vec<String> {
    let origins: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect();

    if origins.is_empty() {
        vec!["*".to_string()]
    } else {
        origins
    }
}

/// Normalize a route prefix to `""` or `/segment` without a trailing slash.
pub fn normalize_api_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// Settings for the hosted model APIs and local extraction tools.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub google_api_key: Option<String>,
    pub gemini_model: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_embedding_model: String,
    /// Essay score predictor endpoint
    pub essay_scorer_url: Option<String>,
    pub tesseract_bin: String,
    pub pdftotext_bin: String,
    pub pandoc_bin: String,
    pub http_timeout: Duration,
}

impl ModelConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            google_api_key: opt_var("GOOGLE_API_KEY"),
            gemini_model: var_or("GEMINI_MODEL", DEFAULT_GEMINI_MODEL),
            openai_api_key: opt_var("OPENAI_API_KEY"),
            openai_model: var_or("OPENAI_MODEL", DEFAULT_OPENAI_MODEL),
            openai_embedding_model: var_or("OPENAI_EMBEDDING_MODEL", DEFAULT_EMBEDDING_MODEL),
            essay_scorer_url: opt_var("ESSAY_SCORER_URL"),
            tesseract_bin: var_or("TESSERACT_BIN", "tesseract"),
            pdftotext_bin: var_or("PDFTOTEXT_BIN", "pdftotext"),
            pandoc_bin: var_or("PANDOC_BIN", "pandoc"),
            http_timeout: Duration::from_secs(parse_var("MODEL_HTTP_TIMEOUT_SECS", 120u64)?),
        })
    }
}

/// Bounds for the in-process conversation and transcript caches.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub conversation_capacity: usize,
    pub transcript_capacity: usize,
    pub idle_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            conversation_capacity: 1024,
            transcript_capacity: 64,
            idle_ttl: Duration::from_secs(60 * 60),
        }
    }
}

impl CacheConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            conversation_capacity: parse_var(
                "CONVERSATION_CACHE_SIZE",
                defaults.conversation_capacity,
            )?,
            transcript_capacity: parse_var("TRANSCRIPT_CACHE_SIZE", defaults.transcript_capacity)?,
            idle_ttl: Duration::from_secs(parse_var(
                "CACHE_IDLE_TTL_SECS",
                defaults.idle_ttl.as_secs(),
            )?),
        })
    }
}

/// Everything the server reads from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub storage_root: PathBuf,
    pub cors_allow_origins: Vec<String>,
    pub api_prefix: String,
    pub models: ModelConfig,
    pub cache: CacheConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database: DatabaseConfig::default(),
            auth: AuthConfig::from_env()?,
            storage_root: PathBuf::from(var_or("STORAGE_ROOT", DEFAULT_STORAGE_ROOT)),
            cors_allow_origins: parse_cors_origins(&var_or("CORS_ALLOW_ORIGINS", "*")),
            api_prefix: normalize_api_prefix(&var_or("API_PREFIX", "")),
            models: ModelConfig::from_env()?,
            cache: CacheConfig::from_env()?,
        })
    }
}
