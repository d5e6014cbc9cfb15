//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration files (config/default.toml, config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;

/// Scopes requested on every consent
pub const DEFAULT_SCOPES: &str = "openid profile email accounting.settings accounting.reports.read accounting.journals.read accounting.contacts accounting.attachments accounting.transactions offline_access";

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub provider: ProviderConfig,
    pub session: SessionConfig,
    pub upstream: UpstreamConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (default: 4100)
    pub port: u16,
    /// Public domain (e.g., "books.example.com")
    pub domain: String,
    /// Protocol ("http" or "https")
    pub protocol: String,
    /// Directory of a built frontend, served for unmatched paths
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
}

impl ServerConfig {
    /// Get the public base URL
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.domain)
    }
}

/// OAuth client registration and provider endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// OAuth client id (required)
    #[serde(default)]
    pub client_id: String,
    /// OAuth client secret (required)
    #[serde(default)]
    pub client_secret: String,
    /// Redirect URI registered with the provider (required)
    #[serde(default)]
    pub redirect_uri: String,
    /// Name shown on the landing page
    pub display_name: String,
    /// Space separated scope list
    pub scopes: String,
    pub authorize_url: String,
    pub token_url: String,
    /// Lists the tenants the consent granted
    pub connections_url: String,
    /// Base for accounting endpoints (e.g. `.../api.xro/2.0/`)
    pub accounting_api_url: String,
    /// Base for finance endpoints (e.g. `.../finance.xro/1.0/`)
    pub finance_api_url: String,
}

impl ProviderConfig {
    pub fn scope_list(&self) -> Vec<&str> {
        self.scopes.split_whitespace().collect()
    }
}

/// Session cookie configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Secret used to sign session cookies (32+ bytes)
    ///
    /// When unset, a random secret is generated at startup and sessions
    /// do not survive a restart.
    #[serde(default)]
    pub secret: Option<String>,
    /// Session max age in seconds (default: 86400 = 1 day)
    pub max_age: i64,
    /// Cookie name (default: "ledgerlink_session")
    pub cookie_name: String,
    /// How often expired sessions are purged, in seconds
    pub purge_interval_seconds: u64,
}

/// Upstream HTTP client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Timeout applied to every provider and API call (default: 30)
    pub timeout_seconds: u64,
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub fn filter_directive(&self) -> String {
        format!("ledgerlink={},tower_http=debug", self.level)
    }

    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (LEDGERLINK__*)
    /// 5. CLIENT_ID, CLIENT_SECRET, REDIRECT_URI and PORT
    ///
    /// # Errors
    /// Returns `AppError::Config` if any required value is missing or invalid
    pub fn load() -> Result<Self, AppError> {
        use config::{Config, Environment, File};

        let port = std::env::var("PORT")
            .ok()
            .map(|value| {
                value
                    .parse::<u16>()
                    .map_err(|_| AppError::Config(format!("PORT is not a valid port: {value}")))
            })
            .transpose()?;

        let config = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 4100)?
            .set_default("server.domain", "localhost:4100")?
            .set_default("server.protocol", "http")?
            .set_default("provider.display_name", "Xero")?
            .set_default("provider.scopes", DEFAULT_SCOPES)?
            .set_default(
                "provider.authorize_url",
                "https://login.xero.com/identity/connect/authorize",
            )?
            .set_default(
                "provider.token_url",
                "https://identity.xero.com/connect/token",
            )?
            .set_default("provider.connections_url", "https://api.xero.com/connections")?
            .set_default(
                "provider.accounting_api_url",
                "https://api.xero.com/api.xro/2.0/",
            )?
            .set_default(
                "provider.finance_api_url",
                "https://api.xero.com/finance.xro/1.0/",
            )?
            .set_default("session.max_age", 86400)?
            .set_default("session.cookie_name", "ledgerlink_session")?
            .set_default("session.purge_interval_seconds", 300)?
            .set_default("upstream.timeout_seconds", 30)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("LEDGERLINK")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("provider.client_id", std::env::var("CLIENT_ID").ok())?
            .set_override_option(
                "provider.client_secret",
                std::env::var("CLIENT_SECRET").ok(),
            )?
            .set_override_option("provider.redirect_uri", std::env::var("REDIRECT_URI").ok())?
            .set_override_option("server.port", port.map(i64::from))?
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))?;

        app_config.validate()?;

        Ok(app_config)
    }

    pub fn should_use_secure_cookies(&self) -> bool {
        self.server.protocol.eq_ignore_ascii_case("https")
            || !is_local_server_domain(&self.server.domain)
    }

    /// Check the loaded configuration before the server starts listening
    pub fn validate(&self) -> Result<(), AppError> {
        const MIN_SESSION_SECRET_BYTES: usize = 32;
        const MAX_SESSION_MAX_AGE: i64 = 366 * 24 * 60 * 60;

        let required = [
            ("provider.client_id (CLIENT_ID)", &self.provider.client_id),
            (
                "provider.client_secret (CLIENT_SECRET)",
                &self.provider.client_secret,
            ),
            (
                "provider.redirect_uri (REDIRECT_URI)",
                &self.provider.redirect_uri,
            ),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(AppError::Config(format!(
                "required settings are not set: {}",
                missing.join(", ")
            )));
        }

        for (name, value) in [
            ("provider.redirect_uri", &self.provider.redirect_uri),
            ("provider.authorize_url", &self.provider.authorize_url),
            ("provider.token_url", &self.provider.token_url),
            ("provider.connections_url", &self.provider.connections_url),
            (
                "provider.accounting_api_url",
                &self.provider.accounting_api_url,
            ),
            ("provider.finance_api_url", &self.provider.finance_api_url),
        ] {
            url::Url::parse(value)
                .map_err(|e| AppError::Config(format!("{name} is not a valid URL: {e}")))?;
        }

        if self.provider.scope_list().is_empty() {
            return Err(AppError::Config(
                "provider.scopes must not be empty".to_string(),
            ));
        }

        if let Some(secret) = &self.session.secret {
            if secret.as_bytes().len() < MIN_SESSION_SECRET_BYTES {
                return Err(AppError::Config(format!(
                    "session.secret must be at least {} bytes",
                    MIN_SESSION_SECRET_BYTES
                )));
            }
        }

        if self.session.max_age <= 0 || self.session.max_age > MAX_SESSION_MAX_AGE {
            return Err(AppError::Config(format!(
                "session.max_age must be between 1 and {MAX_SESSION_MAX_AGE} seconds"
            )));
        }

        if let Some(dir) = &self.server.static_dir {
            if !dir.is_dir() {
                return Err(AppError::Config(format!(
                    "server.static_dir is not a directory: {}",
                    dir.display()
                )));
            }
        }

        if !matches!(self.logging.format.to_ascii_lowercase().as_str(), "pretty" | "json") {
            return Err(AppError::Config(format!(
                "logging.format must be pretty or json, got {}",
                self.logging.format
            )));
        }

        if self.upstream.timeout_seconds == 0 {
            return Err(AppError::Config(
                "upstream.timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if !self.should_use_secure_cookies() {
            let host = normalized_server_host(&self.server.domain);
            tracing::warn!(
                host = %host,
                protocol = %self.server.protocol,
                "Using insecure session cookies for local development"
            );
        } else if !self.server.protocol.eq_ignore_ascii_case("https") {
            return Err(AppError::Config(
                "server.protocol must be https for non-local server domains".to_string(),
            ));
        }

        Ok(())
    }
}

fn normalized_server_host(domain: &str) -> String {
    let trimmed = domain.trim();
    let parsed_host = url::Url::parse(&format!("http://{trimmed}"))
        .ok()
        .and_then(|url| url.host_str().map(|host| host.to_string()));
    let host = parsed_host.unwrap_or_else(|| trimmed.to_string());

    host.trim_end_matches('.').to_ascii_lowercase()
}

fn is_local_server_domain(domain: &str) -> bool {
    let host = normalized_server_host(domain);
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return ip.is_loopback() || ip.is_unspecified();
    }

    false
}
