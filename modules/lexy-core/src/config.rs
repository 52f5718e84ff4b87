use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::identity::Identity;

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the lexy-api service.
    pub api_url: String,

    /// JSON file standing in for browser local storage.
    pub store_path: PathBuf,

    /// Authenticated identity; unset means anonymous.
    pub email: Option<String>,

    /// Results revealed per page and per load-more.
    pub page_size: usize,

    /// Entries kept by the history log. 1 keeps only the latest search.
    pub history_limit: usize,

    /// Starting value of the anonymous credit counter.
    pub anon_credits: i64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:3001".to_string(),
            store_path: PathBuf::from(".lexy/storage.json"),
            email: None,
            page_size: 10,
            history_limit: 1,
            anon_credits: 3,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let config = Self {
            api_url: std::env::var("LEXY_API_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_url),
            store_path: std::env::var("LEXY_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.store_path),
            email: std::env::var("LEXY_EMAIL")
                .ok()
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty()),
            page_size: parse_var("LEXY_PAGE_SIZE", defaults.page_size)?.max(1),
            history_limit: parse_var("LEXY_HISTORY_LIMIT", defaults.history_limit)?.max(1),
            anon_credits: parse_var("LEXY_ANON_CREDITS", defaults.anon_credits)?,
        };

        config.log_keys();
        Ok(config)
    }

    pub fn identity(&self) -> Identity {
        Identity::from_email(self.email.as_deref())
    }

    fn log_keys(&self) {
        fn preview(val: &str) -> String {
            let n = val.char_indices().nth(3).map(|(i, _)| i).unwrap_or(val.len());
            format!("{}...({} chars)", &val[..n], val.len())
        }

        tracing::info!("Config loaded:");
        tracing::info!("  LEXY_API_URL: {}", self.api_url);
        tracing::info!("  LEXY_STORE_PATH: {}", self.store_path.display());
        tracing::info!(
            "  LEXY_EMAIL: {}",
            self.email.as_deref().map(preview).unwrap_or_else(|| "<anonymous>".to_string())
        );
        tracing::info!("  LEXY_PAGE_SIZE: {}", self.page_size);
        tracing::info!("  LEXY_HISTORY_LIMIT: {}", self.history_limit);
        tracing::info!("  LEXY_ANON_CREDITS: {}", self.anon_credits);
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("{name} must be a number, got {raw:?}")),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn defaults_match_single_slot_history() {
        let config = ClientConfig::default();
        assert_eq!(config.history_limit, 1);
        assert_eq!(config.page_size, 10);
        assert_eq!(config.identity(), Identity::Anonymous);
    }

    #[test]
    fn email_makes_identity_authenticated() {
        let config = ClientConfig {
            email: Some("reader@lexy.test".into()),
            ..ClientConfig::default()
        };
        assert!(config.identity().is_authenticated());
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn key_dump_covers_every_setting_and_redacts_email() {
        let config = ClientConfig {
            email: Some("reader@lexy.test".into()),
            anon_credits: 5,
            ..ClientConfig::default()
        };
        let out = Captured::default();
        let writer = out.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, || config.log_keys());

        let logged = String::from_utf8(out.0.lock().unwrap().clone()).unwrap();
        for key in [
            "LEXY_API_URL",
            "LEXY_STORE_PATH",
            "LEXY_EMAIL",
            "LEXY_PAGE_SIZE",
            "LEXY_HISTORY_LIMIT",
            "LEXY_ANON_CREDITS: 5",
        ] {
            assert!(logged.contains(key), "missing {key}");
        }
        assert!(!logged.contains("reader@lexy.test"));
    }

    #[test]
    fn unset_numeric_var_falls_back_to_default() {
        let value: usize = parse_var("LEXY_TEST_SURELY_UNSET_VAR", 7).unwrap();
        assert_eq!(value, 7);
    }
}
