use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// Public base URL of this deployment; pages link back to
    /// `<endpoint_url>/publish/<silo>` to consent to publishing
    pub endpoint_url: String,
    pub http_timeout_secs: u64,
    /// Extra domains to exclude from webmention targeting, on top of the
    /// built-in silo list
    pub deny_domains: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let port: u16 = env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .context("PORT must be a valid number")?;

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port,
            endpoint_url: env::var("ENDPOINT_URL")
                .unwrap_or_else(|_| format!("http://localhost:{}", port)),
            http_timeout_secs: env::var("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "15".to_string())
                .parse()
                .context("HTTP_TIMEOUT_SECS must be a valid number")?,
            deny_domains: env::var("DENY_DOMAINS")
                .map(|v| {
                    v.split(',')
                        .map(|d| d.trim().to_string())
                        .filter(|d| !d.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        })
    }
}
