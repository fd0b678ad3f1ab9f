use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, Result};

pub const RENTCAST_API_URL: &str = "https://api.rentcast.io/v1";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OPENAI_MODEL: &str = "gpt-4.1-mini";
pub const SHOWMOJO_API_URL: &str = "https://showmojo.com/api/v3";

/// Default and maximum look-back window for a showings sync, in days.
pub const SHOWINGS_DEFAULT_DAYS_BACK: u32 = 30;
pub const SHOWINGS_MAX_DAYS_BACK: u32 = 365;

/// Maximum candidates requested from the provider per query.
pub const PROVIDER_PAGE_LIMIT: usize = 50;

/// Maximum comparables echoed back in the market report.
pub const REPORT_COMPARABLES_LIMIT: usize = 50;

/// Generated rationale is cut to this many characters.
pub const MAX_RATIONALE_CHARS: usize = 600;

/// Webhook retry backoff values in milliseconds, indexed by failed attempt.
pub const WEBHOOK_BACKOFF_MS: &[u64] = &[500, 1000, 2000];

/// Weights used by the coverage score and by the ranker.
pub mod tier_weights {
    pub const PRIMARY: f64 = 3.0;
    pub const SECONDARY: f64 = 1.0;
}

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

/// Comparable filtering and radius expansion.
#[derive(Debug, Clone)]
pub struct SelectionPolicy {
    /// Below this many survivors the selector widens the radius.
    pub min_viable_sample: usize,
    pub min_radius_miles: f64,
    /// Upper bound for both the requested radius and any expansion.
    pub max_radius_miles: f64,
    /// Allowed absolute difference in bedrooms and in bathrooms.
    pub room_tolerance: f64,
    pub max_comparables: usize,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            min_viable_sample: 3,
            min_radius_miles: 0.5,
            max_radius_miles: 5.0,
            room_tolerance: 1.0,
            max_comparables: PROVIDER_PAGE_LIMIT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfidencePolicy {
    pub min_viable_sample: usize,
    pub high_confidence_sample: usize,
    /// Rent coefficient of variation at or above this is "high dispersion".
    pub max_rent_cv: f64,
}

impl Default for ConfidencePolicy {
    fn default() -> Self {
        Self {
            min_viable_sample: 3,
            high_confidence_sample: 5,
            max_rent_cv: 0.25,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProbePolicy {
    /// Deadline for the whole fan-out.
    pub deadline: Duration,
    pub primary_timeout: Duration,
    pub secondary_timeout: Duration,
}

impl Default for ProbePolicy {
    fn default() -> Self {
        Self {
            deadline: Duration::from_millis(20_000),
            primary_timeout: Duration::from_millis(8_000),
            secondary_timeout: Duration::from_millis(15_000),
        }
    }
}

/// Thresholds for listing content gaps.
#[derive(Debug, Clone)]
pub struct ContentPolicy {
    pub min_photos: u32,
    pub min_description_words: usize,
    pub min_title_chars: usize,
}

impl Default for ContentPolicy {
    fn default() -> Self {
        Self {
            min_photos: 15,
            min_description_words: 250,
            min_title_chars: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_ms: Vec<u64>,
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: WEBHOOK_BACKOFF_MS.to_vec(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub api_port: u16,
    pub log_level: String,
    pub rentcast_api_url: String,
    /// RENTCAST_API_KEY. Without it every market analysis is UpstreamUnavailable.
    pub rentcast_api_key: Option<String>,
    pub provider_timeout: Duration,
    /// OPENAI_API_KEY. Without it rationales fall back to canned text.
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub llm_timeout: Duration,
    pub market_webhook_url: Option<String>,
    pub syndication_webhook_url: Option<String>,
    /// Falls back to the market webhook when unset.
    pub showings_webhook_url: Option<String>,
    pub webhook_auth_token: Option<String>,
    pub showmojo_api_url: String,
    /// SHOWMOJO_EMAIL / SHOWMOJO_PASSWORD. Without both, showings syncs are UpstreamUnavailable.
    pub showmojo_credentials: Option<(String, String)>,
    pub showings_timeout: Duration,
    /// JSON catalog file (SYNDICATION_CATALOG_PATH). Built-in catalog when unset.
    pub catalog_path: Option<String>,
    pub selection: SelectionPolicy,
    pub confidence: ConfidencePolicy,
    pub probe: ProbePolicy,
    pub content: ContentPolicy,
    pub retry: RetryPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let min_viable_sample = env_parse("MIN_VIABLE_SAMPLE", 3usize);
        let min_radius_miles = env_parse("MIN_RADIUS_MILES", 0.5f64);
        let max_radius_miles = env_parse("MAX_RADIUS_MILES", 5.0f64);
        if !(min_radius_miles > 0.0 && min_radius_miles <= max_radius_miles) {
            return Err(AppError::Config(format!(
                "radius bounds must satisfy 0 < MIN_RADIUS_MILES <= MAX_RADIUS_MILES (got {min_radius_miles}..{max_radius_miles})"
            )));
        }

        Ok(Self {
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            rentcast_api_url: std::env::var("RENTCAST_API_URL")
                .unwrap_or_else(|_| RENTCAST_API_URL.to_string()),
            rentcast_api_key: env_opt("RENTCAST_API_KEY"),
            provider_timeout: Duration::from_secs(env_parse("PROVIDER_TIMEOUT_SECS", 30)),
            openai_api_key: env_opt("OPENAI_API_KEY"),
            openai_base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| OPENAI_BASE_URL.to_string()),
            openai_model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| OPENAI_MODEL.to_string()),
            llm_timeout: Duration::from_secs(env_parse("LLM_TIMEOUT_SECS", 20)),
            market_webhook_url: env_opt("MARKET_WEBHOOK_URL"),
            syndication_webhook_url: env_opt("SYNDICATION_WEBHOOK_URL"),
            showings_webhook_url: env_opt("SHOWINGS_WEBHOOK_URL")
                .or_else(|| env_opt("MARKET_WEBHOOK_URL")),
            webhook_auth_token: env_opt("WEBHOOK_AUTH_TOKEN"),
            showmojo_api_url: std::env::var("SHOWMOJO_API_URL")
                .unwrap_or_else(|_| SHOWMOJO_API_URL.to_string()),
            showmojo_credentials: env_opt("SHOWMOJO_EMAIL").zip(env_opt("SHOWMOJO_PASSWORD")),
            showings_timeout: Duration::from_secs(env_parse("SHOWINGS_TIMEOUT_SECS", 60)),
            catalog_path: env_opt("SYNDICATION_CATALOG_PATH"),
            selection: SelectionPolicy {
                min_viable_sample,
                min_radius_miles,
                max_radius_miles,
                ..SelectionPolicy::default()
            },
            confidence: ConfidencePolicy {
                min_viable_sample,
                high_confidence_sample: env_parse("HIGH_CONFIDENCE_SAMPLE", 5),
                max_rent_cv: env_parse("MAX_RENT_CV", 0.25),
            },
            probe: ProbePolicy {
                deadline: Duration::from_millis(env_parse("PROBE_DEADLINE_MS", 20_000)),
                primary_timeout: Duration::from_millis(env_parse("PRIMARY_PROBE_TIMEOUT_MS", 8_000)),
                secondary_timeout: Duration::from_millis(env_parse(
                    "SECONDARY_PROBE_TIMEOUT_MS",
                    15_000,
                )),
            },
            content: ContentPolicy::default(),
            retry: RetryPolicy {
                max_attempts: env_parse("WEBHOOK_MAX_ATTEMPTS", 3u32).max(1),
                ..RetryPolicy::default()
            },
        })
    }
}

/// Unset or empty variables are `None`.
fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Unset or unparsable variables fall back to `default`.
fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}
