use std::env;

/// Exposure policy knobs surfaced to admin callers. Configuration only;
/// the public gateway does not enforce these.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ExposureRules {
    pub max_external_percent: u32,
    pub boost_internal_always: bool,
    pub show_description_snippet_only: bool,
    pub show_images: bool,
    pub force_source_link: bool,
    pub auto_expire_days: i64,
}

impl Default for ExposureRules {
    fn default() -> Self {
        Self {
            max_external_percent: 20,
            boost_internal_always: true,
            show_description_snippet_only: true,
            show_images: true,
            force_source_link: true,
            auto_expire_days: 30,
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // External analyzer service
    pub analyzer_url: String,
    pub analyzer_timeout_secs: u64,

    pub exposure: ExposureRules,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            analyzer_url: required_env("ANALYZER_URL"),
            analyzer_timeout_secs: env_or("ANALYZER_TIMEOUT_SECS", 30),
            exposure: ExposureRules {
                max_external_percent: env_or("MAX_EXTERNAL_PERCENT", 20),
                boost_internal_always: env_or("BOOST_INTERNAL", true),
                show_description_snippet_only: env_or("SNIPPET_ONLY", true),
                show_images: env_or("SHOW_IMAGES", true),
                force_source_link: env_or("FORCE_SOURCE_LINK", true),
                auto_expire_days: env_or("AUTO_EXPIRE_DAYS", 30),
            },
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
