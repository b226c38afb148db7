pub mod domain;
pub mod ingest;
pub mod recommend;
pub mod storage;

pub mod config {
    use anyhow::Context;

    /// Upstream analyst-ratings feed used when STOCK_API_BASE_URL is not set.
    pub const DEFAULT_STOCK_API_BASE_URL: &str =
        "https://8j5baasof2.execute-api.us-west-2.amazonaws.com/production/swechallenge/list";

    pub const DEFAULT_SERVER_PORT: u16 = 8080;

    #[derive(Debug, Clone, Default)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub stock_api_token: Option<String>,
        pub stock_api_base_url: Option<String>,
        pub server_port: Option<String>,
        pub sentry_dsn: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: non_blank_var("DATABASE_URL"),
                stock_api_token: non_blank_var("STOCK_API_TOKEN"),
                stock_api_base_url: non_blank_var("STOCK_API_BASE_URL"),
                server_port: non_blank_var("SERVER_PORT"),
                sentry_dsn: non_blank_var("SENTRY_DSN"),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_stock_api_token(&self) -> anyhow::Result<&str> {
            self.stock_api_token
                .as_deref()
                .context("STOCK_API_TOKEN is required")
        }

        pub fn stock_api_base_url(&self) -> &str {
            self.stock_api_base_url
                .as_deref()
                .unwrap_or(DEFAULT_STOCK_API_BASE_URL)
        }

        pub fn server_port(&self) -> anyhow::Result<u16> {
            match self.server_port.as_deref() {
                Some(raw) => raw
                    .trim()
                    .parse::<u16>()
                    .with_context(|| format!("SERVER_PORT is not a valid port: {raw}")),
                None => Ok(DEFAULT_SERVER_PORT),
            }
        }
    }

    fn non_blank_var(key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.trim().is_empty())
    }

}
