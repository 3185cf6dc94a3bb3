use chrono::NaiveDate;
use serde::Deserialize;
use std::net::IpAddr;
use std::path::PathBuf;
use tracing::warn;
use url::{Host, Url};

use crate::error::{AppError, AppResult};
use crate::utils::fernet::Fernet;

pub const DEFAULT_AUTHORIZE_URL: &str = "https://cloud.ouraring.com/oauth/authorize";
pub const DEFAULT_TOKEN_URL: &str = "https://api.ouraring.com/oauth/token";
pub const DEFAULT_API_BASE_URL: &str = "https://api.ouraring.com";
pub const DEFAULT_OUTPUT_PATH_PATTERN: &str = "sleep_data_from{start}_to{end}.csv";
pub const CALLBACK_PATH: &str = "/callback";

/// Raw settings as read from the environment
#[derive(Deserialize)]
struct RawConfig {
    host: String,
    port: u16,
    public_base_url: String,
    oura_client_id: String,
    oura_client_secret: String,
    oura_authorize_url: String,
    oura_token_url: String,
    oura_api_base_url: String,
    oura_scopes: String,
    start_date: String,
    end_date: String,
    output_path_pattern: String,
    session_secret_key: Option<String>,
    session_ttl_secs: i64,
    secure_cookies: bool,
    http_timeout_secs: u64,
    oauth_insecure_transport: bool,
}

#[derive(Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub public_base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub authorize_url: String,
    pub token_url: String,
    pub api_base_url: String,
    pub scopes: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub output_path_pattern: String,
    pub session_secret_key: String,
    pub session_ttl_secs: i64,
    pub secure_cookies: bool,
    pub http_timeout_secs: u64,
    pub allow_insecure_transport: bool,
}

// Secrets stay out of logs
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("public_base_url", &self.public_base_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("authorize_url", &self.authorize_url)
            .field("token_url", &self.token_url)
            .field("api_base_url", &self.api_base_url)
            .field("scopes", &self.scopes)
            .field("start_date", &self.start_date)
            .field("end_date", &self.end_date)
            .field("output_path_pattern", &self.output_path_pattern)
            .field("session_secret_key", &"<redacted>")
            .field("session_ttl_secs", &self.session_ttl_secs)
            .field("secure_cookies", &self.secure_cookies)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("allow_insecure_transport", &self.allow_insecure_transport)
            .finish()
    }
}

impl Config {
    /// Load configuration from the process environment (after `.env`)
    pub fn from_env() -> AppResult<Self> {
        Self::from_environment(config::Environment::default())
    }

    /// Values stay strings until deserialized, so credentials pass through verbatim
    fn from_environment(env: config::Environment) -> AppResult<Self> {
        let settings = config::Config::builder()
            .set_default("host", "127.0.0.1")
            .and_then(|b| b.set_default("port", 8080))
            .and_then(|b| b.set_default("public_base_url", "http://localhost:8080"))
            .and_then(|b| b.set_default("oura_client_id", ""))
            .and_then(|b| b.set_default("oura_client_secret", ""))
            .and_then(|b| b.set_default("oura_authorize_url", DEFAULT_AUTHORIZE_URL))
            .and_then(|b| b.set_default("oura_token_url", DEFAULT_TOKEN_URL))
            .and_then(|b| b.set_default("oura_api_base_url", DEFAULT_API_BASE_URL))
            .and_then(|b| b.set_default("oura_scopes", ""))
            .and_then(|b| b.set_default("start_date", "2020-01-01"))
            .and_then(|b| b.set_default("end_date", "2020-10-18"))
            .and_then(|b| b.set_default("output_path_pattern", DEFAULT_OUTPUT_PATH_PATTERN))
            .and_then(|b| b.set_default("session_ttl_secs", 3600))
            .and_then(|b| b.set_default("secure_cookies", false))
            .and_then(|b| b.set_default("http_timeout_secs", 30))
            .and_then(|b| b.set_default("oauth_insecure_transport", false))
            .map_err(|e| AppError::Config(e.to_string()))?
            .add_source(env)
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?;

        let raw: RawConfig = settings
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))?;

        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> AppResult<Self> {
        let session_secret_key = match raw.session_secret_key.filter(|k| !k.is_empty()) {
            Some(key) => key,
            None => {
                warn!("SESSION_SECRET_KEY not set, generated a per-process key; sessions will not survive a restart");
                Fernet::generate_key()
            }
        };

        let config = Config {
            host: raw.host,
            port: raw.port,
            public_base_url: raw.public_base_url.trim_end_matches('/').to_string(),
            client_id: raw.oura_client_id,
            client_secret: raw.oura_client_secret,
            authorize_url: raw.oura_authorize_url,
            token_url: raw.oura_token_url,
            api_base_url: raw.oura_api_base_url.trim_end_matches('/').to_string(),
            scopes: raw
                .oura_scopes
                .split_whitespace()
                .map(|s| s.to_string())
                .collect(),
            start_date: parse_date("START_DATE", &raw.start_date)?,
            end_date: parse_date("END_DATE", &raw.end_date)?,
            output_path_pattern: raw.output_path_pattern,
            session_secret_key,
            session_ttl_secs: raw.session_ttl_secs,
            secure_cookies: raw.secure_cookies,
            http_timeout_secs: raw.http_timeout_secs,
            allow_insecure_transport: raw.oauth_insecure_transport,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.client_id.is_empty() {
            return Err(AppError::Config("OURA_CLIENT_ID is required".to_string()));
        }
        if self.client_secret.is_empty() {
            return Err(AppError::Config("OURA_CLIENT_SECRET is required".to_string()));
        }
        if self.session_secret_key == self.client_secret {
            return Err(AppError::Config(
                "SESSION_SECRET_KEY must differ from OURA_CLIENT_SECRET".to_string(),
            ));
        }
        if self.start_date > self.end_date {
            return Err(AppError::Config(format!(
                "START_DATE {} is after END_DATE {}",
                self.start_date, self.end_date
            )));
        }
        if self.session_ttl_secs <= 0 {
            return Err(AppError::Config("SESSION_TTL_SECS must be positive".to_string()));
        }
        if self.http_timeout_secs == 0 {
            return Err(AppError::Config("HTTP_TIMEOUT_SECS must be positive".to_string()));
        }

        if self.allow_insecure_transport {
            warn!("OAUTH_INSECURE_TRANSPORT enabled: plain http allowed for loopback provider endpoints only");
        }
        for (name, endpoint) in [
            ("OURA_AUTHORIZE_URL", &self.authorize_url),
            ("OURA_TOKEN_URL", &self.token_url),
            ("OURA_API_BASE_URL", &self.api_base_url),
        ] {
            check_transport(name, endpoint, self.allow_insecure_transport)?;
        }

        Url::parse(&self.public_base_url)
            .map_err(|e| AppError::Config(format!("PUBLIC_BASE_URL is invalid: {}", e)))?;

        Ok(())
    }

    /// Redirect URI registered with the provider
    pub fn redirect_uri(&self) -> String {
        format!("{}{}", self.public_base_url, CALLBACK_PATH)
    }

    /// Output file for the configured date range; identical ranges share a path
    pub fn output_path(&self) -> PathBuf {
        let start = self.start_date.format("%Y-%m-%d").to_string();
        let end = self.end_date.format("%Y-%m-%d").to_string();
        PathBuf::from(
            self.output_path_pattern
                .replace("{start}", &start)
                .replace("{end}", &end),
        )
    }
}

fn parse_date(name: &str, value: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|e| {
        AppError::Config(format!("{} must be an ISO 8601 date (YYYY-MM-DD): {}", name, e))
    })
}

/// Provider endpoints must be https; http is tolerated only for loopback
/// hosts and only when insecure transport was explicitly enabled.
fn check_transport(name: &str, endpoint: &str, allow_insecure: bool) -> AppResult<()> {
    let url = Url::parse(endpoint)
        .map_err(|e| AppError::Config(format!("{} is not a valid URL: {}", name, e)))?;

    match url.scheme() {
        "https" => Ok(()),
        "http" if allow_insecure && is_loopback(&url) => Ok(()),
        "http" if allow_insecure => Err(AppError::Config(format!(
            "{} uses plain http for a non-loopback host; insecure transport is for local development only",
            name
        ))),
        "http" => Err(AppError::Config(format!(
            "{} must use https (set OAUTH_INSECURE_TRANSPORT for local development)",
            name
        ))),
        other => Err(AppError::Config(format!(
            "{} has unsupported scheme '{}'",
            name, other
        ))),
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => IpAddr::V4(ip).is_loopback(),
        Some(Host::Ipv6(ip)) => IpAddr::V6(ip).is_loopback(),
        None => false,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Configuration pointing every provider endpoint at `provider_base`
    pub(crate) fn test_config(provider_base: &str, output_dir: &std::path::Path) -> Config {
        Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            public_base_url: "http://localhost:8080".to_string(),
            client_id: "test-client".to_string(),
            client_secret: "test-client-secret".to_string(),
            authorize_url: format!("{}/oauth/authorize", provider_base),
            token_url: format!("{}/oauth/token", provider_base),
            api_base_url: provider_base.to_string(),
            scopes: vec![],
            start_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2020, 10, 18).unwrap(),
            output_path_pattern: output_dir
                .join(DEFAULT_OUTPUT_PATH_PATTERN)
                .to_string_lossy()
                .into_owned(),
            session_secret_key: Fernet::generate_key(),
            session_ttl_secs: 3600,
            secure_cookies: false,
            http_timeout_secs: 5,
            allow_insecure_transport: true,
        }
    }

    fn base() -> Config {
        test_config("https://api.ouraring.com", std::path::Path::new("."))
    }

    #[test]
    fn test_output_path_embeds_date_range() {
        let mut config = base();
        config.output_path_pattern = DEFAULT_OUTPUT_PATH_PATTERN.to_string();
        assert_eq!(
            config.output_path(),
            PathBuf::from("sleep_data_from2020-01-01_to2020-10-18.csv")
        );
        assert_eq!(config.output_path(), config.output_path());
    }

    #[test]
    fn test_redirect_uri() {
        assert_eq!(base().redirect_uri(), "http://localhost:8080/callback");
    }

    #[test]
    fn test_https_endpoints_pass() {
        let mut config = base();
        config.allow_insecure_transport = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_http_requires_insecure_flag() {
        let mut config = test_config("http://127.0.0.1:9999", std::path::Path::new("."));
        config.allow_insecure_transport = false;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));

        config.allow_insecure_transport = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_insecure_flag_never_covers_remote_hosts() {
        let mut config = base();
        config.token_url = "http://api.ouraring.com/oauth/token".to_string();
        config.allow_insecure_transport = true;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_session_key_must_differ_from_client_secret() {
        let mut config = base();
        config.session_secret_key = config.client_secret.clone();
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_reversed_date_range_rejected() {
        let mut config = base();
        config.start_date = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_date() {
        assert!(parse_date("START_DATE", "2020-01-01").is_ok());
        assert!(parse_date("START_DATE", "01/01/2020").is_err());
    }

    fn environment(vars: &[(&str, &str)]) -> config::Environment {
        let map: config::Map<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        config::Environment::default().source(Some(map))
    }

    #[test]
    fn test_numeric_looking_credentials_pass_through() {
        let config = Config::from_environment(environment(&[
            ("OURA_CLIENT_ID", "0012345"),
            ("OURA_CLIENT_SECRET", "1e3"),
            ("SESSION_SECRET_KEY", "007"),
            ("PORT", "9090"),
            ("SECURE_COOKIES", "true"),
            ("SESSION_TTL_SECS", "120"),
        ]))
        .unwrap();

        assert_eq!(config.client_id, "0012345");
        assert_eq!(config.client_secret, "1e3");
        assert_eq!(config.session_secret_key, "007");
        assert_eq!(config.port, 9090);
        assert!(config.secure_cookies);
        assert_eq!(config.session_ttl_secs, 120);
    }

    #[test]
    fn test_missing_client_id_rejected() {
        let result = Config::from_environment(environment(&[("OURA_CLIENT_SECRET", "secret")]));
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = base();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("test-client-secret"));
        assert!(!rendered.contains(&config.session_secret_key));
    }
}
