use anyhow::{Context, Result};

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    // OpenAI
    pub openai_api_key: String,
    pub openai_model: String,
    /// Override for the OpenAI endpoint (proxies, tests).
    pub openai_base_url: Option<String>,

    // Apify
    pub apify_api_token: String,
    pub apify_base_url: Option<String>,

    // Browserless; pages are fetched directly when unset
    pub browserless_url: Option<String>,
    pub browserless_token: Option<String>,

    // Server
    pub host: String,
    pub port: u16,

    /// Credits granted to an account the first time it is seen.
    pub default_credits: i64,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            openai_api_key: required_env("OPENAI_API_KEY")?,
            openai_model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            openai_base_url: optional_env("OPENAI_BASE_URL"),
            apify_api_token: required_env("APIFY_API_TOKEN")?,
            apify_base_url: optional_env("APIFY_BASE_URL"),
            browserless_url: optional_env("BROWSERLESS_URL"),
            browserless_token: optional_env("BROWSERLESS_TOKEN"),
            host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .context("API_PORT must be a valid port number")?,
            default_credits: std::env::var("DEFAULT_CREDITS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("DEFAULT_CREDITS must be a number")?,
        };

        config.log_keys();
        Ok(config)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Log a redacted preview of each secret.
    fn log_keys(&self) {
        fn preview(val: &str) -> String {
            if val.is_empty() {
                return "(empty)".to_string();
            }
            let n = val.char_indices().nth(4).map(|(i, _)| i).unwrap_or(val.len());
            format!("{}...({} chars)", &val[..n], val.len())
        }

        tracing::info!("Config loaded:");
        tracing::info!("  OPENAI_API_KEY: {}", preview(&self.openai_api_key));
        tracing::info!("  OPENAI_MODEL: {}", self.openai_model);
        tracing::info!("  APIFY_API_TOKEN: {}", preview(&self.apify_api_token));
        match &self.browserless_url {
            Some(url) => tracing::info!("  BROWSERLESS_URL: {url}"),
            None => tracing::info!("  BROWSERLESS_URL: (unset, fetching pages directly)"),
        }
        if let Some(token) = &self.browserless_token {
            tracing::info!("  BROWSERLESS_TOKEN: {}", preview(token));
        }
        tracing::info!("  DEFAULT_CREDITS: {}", self.default_credits);
    }
}

fn required_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("{key} environment variable is required"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
