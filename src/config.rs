//! Configuration for the paygate server.
//!
//! Configuration comes from a JSON file (path via `--config` / `CONFIG`,
//! default `paygate.json`), with serde defaults that fall back to
//! environment variables (`PORT`, `HOST`) and then to hardcoded defaults.
//! When no config file exists the built-in catalog is used, which mirrors
//! the demo tables: a free `weather` API, a call-scoped `ml-inference` API,
//! and two verified publishers.

use std::collections::BTreeMap;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Deserialize;

use crate::money::UsdAmount;
use crate::revenue::RevenueShareBp;

/// CLI arguments for the paygate server.
#[derive(Parser, Debug)]
#[command(name = "paygate")]
#[command(about = "Micropayment gateway HTTP server")]
struct CliArgs {
    /// Path to the JSON configuration file
    #[arg(long, short, env = "CONFIG", default_value = "paygate.json")]
    config: PathBuf,
}

/// Pricing and entitlement shape of one metered API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResourceConfig {
    /// Price per call (or per entitlement window).
    pub amount: UsdAmount,
    /// Free resources skip the payment flow entirely.
    #[serde(default)]
    pub free: bool,
    /// Owner domain credited with the revenue share.
    pub owner: String,
    /// Entitlement window in seconds; absent means call-scoped (single use).
    #[serde(default)]
    pub duration_secs: Option<u64>,
}

/// Pricing for page (ad-free) access.
#[derive(Debug, Clone, Deserialize)]
pub struct PageAccessConfig {
    #[serde(default = "config_defaults::default_page_amount")]
    pub amount: UsdAmount,
    #[serde(default = "config_defaults::default_page_duration_secs")]
    pub duration_secs: u64,
}

impl Default for PageAccessConfig {
    fn default() -> Self {
        Self {
            amount: config_defaults::default_page_amount(),
            duration_secs: config_defaults::default_page_duration_secs(),
        }
    }
}

/// A configured publisher: mock certificate, share, verified flag.
#[derive(Debug, Clone, Deserialize)]
pub struct PublisherConfig {
    pub certificate: String,
    #[serde(default = "config_defaults::default_revenue_share_bp")]
    pub revenue_share_bp: RevenueShareBp,
    #[serde(default)]
    pub verified: bool,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "config_defaults::default_port")]
    port: u16,
    #[serde(default = "config_defaults::default_host")]
    host: IpAddr,
    #[serde(default = "config_defaults::default_revenue_share_bp")]
    default_revenue_share_bp: RevenueShareBp,
    #[serde(default)]
    page_access: PageAccessConfig,
    #[serde(default = "config_defaults::default_resources")]
    resources: BTreeMap<String, ApiResourceConfig>,
    #[serde(default = "config_defaults::default_publishers")]
    publishers: BTreeMap<String, PublisherConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: config_defaults::default_port(),
            host: config_defaults::default_host(),
            default_revenue_share_bp: config_defaults::default_revenue_share_bp(),
            page_access: PageAccessConfig::default(),
            resources: config_defaults::default_resources(),
            publishers: config_defaults::default_publishers(),
        }
    }
}

pub mod config_defaults {
    use std::env;
    use std::net::IpAddr;

    use super::*;

    pub const DEFAULT_PORT: u16 = 8080;
    pub const DEFAULT_HOST: &str = "0.0.0.0";

    /// Default port with fallback: $PORT env var -> 8080
    pub fn default_port() -> u16 {
        env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT)
    }

    /// Default host with fallback: $HOST env var -> "0.0.0.0"
    pub fn default_host() -> IpAddr {
        env::var("HOST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(IpAddr::V4(DEFAULT_HOST.parse().expect("valid address")))
    }

    /// 85% to the resource owner unless configured otherwise.
    pub fn default_revenue_share_bp() -> RevenueShareBp {
        RevenueShareBp::default_share()
    }

    /// $0.001 per page.
    pub fn default_page_amount() -> UsdAmount {
        UsdAmount::from_micros(1_000)
    }

    /// Five minutes of ad-free access per payment.
    pub fn default_page_duration_secs() -> u64 {
        300
    }

    pub fn default_resources() -> BTreeMap<String, ApiResourceConfig> {
        BTreeMap::from([
            (
                "weather".to_string(),
                ApiResourceConfig {
                    amount: UsdAmount::from_micros(1_000),
                    free: true,
                    owner: "openweathermap.org".to_string(),
                    duration_secs: None,
                },
            ),
            (
                "ml-inference".to_string(),
                ApiResourceConfig {
                    amount: UsdAmount::from_micros(10_000),
                    free: false,
                    owner: "example-ml.com".to_string(),
                    duration_secs: None,
                },
            ),
        ])
    }

    pub fn default_publishers() -> BTreeMap<String, PublisherConfig> {
        BTreeMap::from([
            (
                "example.com".to_string(),
                PublisherConfig {
                    certificate: "mock_cert_example_com".to_string(),
                    revenue_share_bp: default_revenue_share_bp(),
                    verified: true,
                },
            ),
            (
                "news-site.com".to_string(),
                PublisherConfig {
                    certificate: "mock_cert_news_site".to_string(),
                    revenue_share_bp: default_revenue_share_bp(),
                    verified: true,
                },
            ),
        ])
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("Failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl Config {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }

    pub fn default_revenue_share_bp(&self) -> RevenueShareBp {
        self.default_revenue_share_bp
    }

    pub fn page_access(&self) -> &PageAccessConfig {
        &self.page_access
    }

    /// The metered API catalog, keyed by API name.
    pub fn resources(&self) -> &BTreeMap<String, ApiResourceConfig> {
        &self.resources
    }

    /// The publisher table, keyed by owner domain.
    pub fn publishers(&self) -> &BTreeMap<String, PublisherConfig> {
        &self.publishers
    }

    /// Load configuration from CLI arguments and JSON file.
    ///
    /// Falls back to the built-in default catalog when the configured file
    /// does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let cli_args = CliArgs::parse();
        if cli_args.config.exists() {
            Self::load_from_path(&cli_args.config)
        } else {
            tracing::info!(
                path = %cli_args.config.display(),
                "No config file found, using built-in defaults"
            );
            Ok(Config::default())
        }
    }

    fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|e| ConfigError::FileRead(path.to_path_buf(), e))?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }
}
