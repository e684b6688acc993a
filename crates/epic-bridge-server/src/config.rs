use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};
use url::Url;

use crate::gateway::GatewayConfig;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// Epic client registration and endpoints
    #[serde(default)]
    pub epic: EpicConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.body_limit_bytes == 0 {
            return Err("server.body_limit_bytes must be > 0".into());
        }
        if self.epic.client_id.trim().is_empty() {
            return Err("epic.client_id is required".into());
        }
        if self.epic.private_key_path.as_os_str().is_empty() {
            return Err("epic.private_key_path is required".into());
        }
        self.epic.token_url()?;
        self.epic.fhir_r4_base()?;
        self.epic.fhir_stu3_base()?;
        if self.epic.default_patient_id.trim().is_empty() {
            return Err("epic.default_patient_id must not be empty".into());
        }
        if self.epic.request_timeout.is_zero() {
            return Err("epic.request_timeout must be > 0".into());
        }
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }

    pub fn addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| format!("invalid server address: {e}"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum accepted request body in bytes
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    3000
}
fn default_body_limit() -> usize {
    2 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpicConfig {
    /// Non-production client id from the Epic app registration
    #[serde(default)]
    pub client_id: String,
    /// `iss` of the client assertion; defaults to the client id
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default = "default_private_key_path")]
    pub private_key_path: PathBuf,
    /// `kid` header; defaults to the key's JWK thumbprint
    #[serde(default)]
    pub key_id: Option<String>,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_r4_base")]
    pub fhir_r4_base: String,
    #[serde(default = "default_stu3_base")]
    pub fhir_stu3_base: String,
    /// Patient served by `GET /patient`
    #[serde(default = "default_patient_id")]
    pub default_patient_id: String,
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
    #[serde(default)]
    pub token_cache: TokenCacheConfig,
}

fn default_private_key_path() -> PathBuf {
    PathBuf::from("keys/privatekey.pem")
}
fn default_token_url() -> String {
    "https://fhir.epic.com/interconnect-fhir-oauth/oauth2/token".into()
}
fn default_r4_base() -> String {
    "https://fhir.epic.com/interconnect-fhir-oauth/api/FHIR/R4/".into()
}
fn default_stu3_base() -> String {
    "https://fhir.epic.com/interconnect-fhir-oauth/api/FHIR/STU3/".into()
}
fn default_patient_id() -> String {
    // Camila Lopez in the Epic sandbox
    "erXuFYUfucBZaryVksYEcMg3".into()
}
fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for EpicConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            issuer: None,
            private_key_path: default_private_key_path(),
            key_id: None,
            token_url: default_token_url(),
            fhir_r4_base: default_r4_base(),
            fhir_stu3_base: default_stu3_base(),
            default_patient_id: default_patient_id(),
            request_timeout: default_request_timeout(),
            token_cache: TokenCacheConfig::default(),
        }
    }
}

impl EpicConfig {
    pub fn token_url(&self) -> Result<Url, String> {
        parse_http_url("epic.token_url", &self.token_url)
    }

    pub fn fhir_r4_base(&self) -> Result<Url, String> {
        parse_http_url("epic.fhir_r4_base", &self.fhir_r4_base)
    }

    pub fn fhir_stu3_base(&self) -> Result<Url, String> {
        parse_http_url("epic.fhir_stu3_base", &self.fhir_stu3_base)
    }

    pub fn gateway_config(&self) -> Result<GatewayConfig, String> {
        Ok(GatewayConfig {
            r4_base: self.fhir_r4_base()?,
            stu3_base: self.fhir_stu3_base()?,
            request_timeout: self.request_timeout,
        })
    }
}

fn parse_http_url(field: &str, raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw.trim()).map_err(|e| format!("{field} is not a valid URL: {e}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("{field} must be an http(s) URL"));
    }
    Ok(url)
}

/// Reuse of access tokens across inbound requests. Off unless enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenCacheConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Tokens are refreshed this long before they expire
    #[serde(default = "default_refresh_skew", with = "humantime_serde")]
    pub refresh_skew: Duration,
}

fn default_refresh_skew() -> Duration {
    epic_bridge_auth::DEFAULT_REFRESH_SKEW
}

impl Default for TokenCacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            refresh_skew: default_refresh_skew(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File, FileFormat};
    use std::path::PathBuf;

    /// Default config file, looked up in the working directory.
    pub const DEFAULT_CONFIG_PATH: &str = "epic-bridge.toml";

    /// Loads configuration from an optional TOML file plus environment
    /// overrides, e.g. `EPIC_BRIDGE__EPIC__CLIENT_ID=...`.
    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        load_config_with_env(
            path,
            Environment::with_prefix("EPIC_BRIDGE")
                .try_parsing(true)
                .separator("__"),
        )
    }

    pub(crate) fn load_config_with_env(
        path: Option<&str>,
        environment: Environment,
    ) -> Result<AppConfig, String> {
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_PATH));

        let mut builder = Config::builder();
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf).format(FileFormat::Toml));
        }
        builder = builder.add_source(environment);

        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}
