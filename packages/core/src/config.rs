use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use dotenvy::dotenv;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub redis_host: String,
    pub redis_port: u16,
    pub port: u16,
    pub data_dir: PathBuf,
    pub cookies_file: PathBuf,
    pub quality_threshold: u32,
    pub vision_model_host: String,
    pub vision_model_name: String,
    pub text_model_name: String,
    pub feed_poll_interval_minutes: u64,
    pub pocketfeed_url: Option<String>,
    pub reader_api_url: Option<String>,
    pub asr_host: String,
    pub social_mirror_host: String,
    /// Consumed by the external webhook notifier; carried here so one env
    /// surface configures the whole deployment.
    pub webhook_url: Option<String>,
    pub privacy_filter_terms: Vec<String>,
    /// External self-healing collaborator toggle and its tool path.
    pub fix_feature_enabled: bool,
    pub fix_tool_path: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Self::validate_env_vars();

        let data_dir = PathBuf::from(env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string()));
        let cookies_file = env::var("COOKIES_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("cookies.txt"));

        Ok(Self {
            redis_host: env::var("REDIS_HOST").context("REDIS_HOST must be set")?,
            redis_port: env::var("REDIS_PORT")
                .context("REDIS_PORT must be set")?
                .parse()
                .context("REDIS_PORT must be a valid port number")?,
            port: env::var("PORT")
                .context("PORT must be set")?
                .parse()
                .context("PORT must be a valid number")?,
            data_dir,
            cookies_file,
            quality_threshold: env::var("QUALITY_THRESHOLD")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .unwrap_or(50),
            vision_model_host: env::var("VISION_MODEL_HOST")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            vision_model_name: env::var("VISION_MODEL_NAME")
                .unwrap_or_else(|_| "llama3.2-vision".to_string()),
            text_model_name: env::var("TEXT_MODEL_NAME")
                .unwrap_or_else(|_| "qwen2.5".to_string()),
            feed_poll_interval_minutes: env::var("FEED_POLL_INTERVAL_MINUTES")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .unwrap_or(15),
            pocketfeed_url: env::var("POCKETFEED_URL").ok().filter(|s| !s.is_empty()),
            reader_api_url: env::var("READER_API_URL").ok().filter(|s| !s.is_empty()),
            asr_host: env::var("ASR_HOST").unwrap_or_else(|_| "http://localhost:9000".to_string()),
            social_mirror_host: env::var("SOCIAL_MIRROR_HOST")
                .unwrap_or_else(|_| "xcancel.com".to_string()),
            webhook_url: env::var("WEBHOOK_URL").ok().filter(|s| !s.is_empty()),
            privacy_filter_terms: env::var("PRIVACY_FILTER_TERMS")
                .unwrap_or_else(|_| "".to_string())
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            fix_feature_enabled: env::var("FIX_FEATURE_ENABLED")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            fix_tool_path: env::var("FIX_TOOL_PATH").ok().filter(|s| !s.is_empty()),
        })
    }

    /// Redis connection URL derived from host + port.
    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}", self.redis_host, self.redis_port)
    }

    /// Directory for failed-conversion debug artifacts.
    pub fn debug_dir(&self) -> PathBuf {
        self.data_dir.join("debug")
    }

    /// Root of the weekly bins.
    pub fn media_dir(&self) -> PathBuf {
        self.data_dir.join("media")
    }

    /// Validate environment variables and print warnings
    fn validate_env_vars() {
        let required_vars = ["REDIS_HOST", "REDIS_PORT", "PORT"];

        let optional_vars = [
            ("DATA_DIR", "./data"),
            ("COOKIES_FILE", "{DATA_DIR}/cookies.txt"),
            ("QUALITY_THRESHOLD", "50"),
            ("VISION_MODEL_HOST", "http://localhost:11434"),
            ("VISION_MODEL_NAME", "llama3.2-vision"),
            ("TEXT_MODEL_NAME", "qwen2.5"),
            ("FEED_POLL_INTERVAL_MINUTES", "15"),
            ("POCKETFEED_URL", "disabled"),
            ("READER_API_URL", "disabled"),
            ("ASR_HOST", "http://localhost:9000"),
            ("SOCIAL_MIRROR_HOST", "xcancel.com"),
            ("WEBHOOK_URL", "disabled"),
            ("PRIVACY_FILTER_TERMS", "empty"),
            ("FIX_FEATURE_ENABLED", "false"),
            ("FIX_TOOL_PATH", "disabled"),
        ];

        let mut missing_required = Vec::new();
        let mut missing_optional = Vec::new();

        for var in &required_vars {
            if env::var(var).is_err() {
                missing_required.push(*var);
            }
        }

        for (var, default) in &optional_vars {
            if env::var(var).is_err() {
                missing_optional.push((*var, *default));
            }
        }

        if !missing_optional.is_empty() {
            tracing::warn!("Optional environment variables not set (using defaults):");
            for (var, default) in missing_optional {
                tracing::warn!("  {} (default: {})", var, default);
            }
        }

        if !missing_required.is_empty() {
            tracing::error!("Required environment variables are missing:");
            for var in &missing_required {
                tracing::error!("  {}", var);
            }
            tracing::error!("The service will fail to start without these variables!");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redis_url_is_built_from_host_and_port() {
        let config = Config {
            redis_host: "cache.internal".to_string(),
            redis_port: 6380,
            port: 3000,
            data_dir: PathBuf::from("./data"),
            cookies_file: PathBuf::from("./data/cookies.txt"),
            quality_threshold: 50,
            vision_model_host: "http://localhost:11434".to_string(),
            vision_model_name: "llama3.2-vision".to_string(),
            text_model_name: "qwen2.5".to_string(),
            feed_poll_interval_minutes: 15,
            pocketfeed_url: None,
            reader_api_url: None,
            asr_host: "http://localhost:9000".to_string(),
            social_mirror_host: "xcancel.com".to_string(),
            webhook_url: None,
            privacy_filter_terms: vec![],
            fix_feature_enabled: false,
            fix_tool_path: None,
        };
        assert_eq!(config.redis_url(), "redis://cache.internal:6380");
        assert_eq!(config.debug_dir(), PathBuf::from("./data/debug"));
    }
}
