use crate::error::{to_env_var, ConfigError, ENV_PREFIX};
use config::{Config, Environment};
use relay::providers::{
    bedrock::BEDROCK_MODEL,
    configs::{AwsCredentials, BedrockProviderConfig, BEDROCK_REGION},
};
use relay::streaming::{ErrorMode, RelayConfig};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_body_limit_bytes")]
    pub body_limit_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: default_static_dir(),
            request_timeout_secs: default_request_timeout_secs(),
            body_limit_bytes: default_body_limit_bytes(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse()
            .map_err(|source| ConfigError::InvalidAddress { addr, source })
    }
}

#[derive(Debug, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    #[serde(default)]
    pub session_token: Option<String>,
}

impl ProviderSettings {
    /// Resolve credentials, falling back to the standard AWS environment variables
    pub fn into_config(self) -> Result<BedrockProviderConfig, ConfigError> {
        let access_key_id = resolve(
            self.access_key_id,
            "provider.access_key_id",
            "AWS_ACCESS_KEY_ID",
        )?;
        let secret_access_key = resolve(
            self.secret_access_key,
            "provider.secret_access_key",
            "AWS_SECRET_ACCESS_KEY",
        )?;
        let session_token = self
            .session_token
            .or_else(|| std::env::var("AWS_SESSION_TOKEN").ok());

        let mut credentials = AwsCredentials::new(access_key_id, secret_access_key);
        if let Some(token) = session_token {
            credentials = credentials.with_session_token(token);
        }

        let config = BedrockProviderConfig::new(self.region, credentials);
        Ok(match self.endpoint {
            Some(endpoint) => config.with_endpoint(endpoint),
            None => config,
        })
    }
}

fn resolve(value: Option<String>, field: &str, fallback: &str) -> Result<String, ConfigError> {
    value
        .or_else(|| std::env::var(fallback).ok())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ConfigError::MissingCredential {
            env_var: to_env_var(field),
            fallback: fallback.to_string(),
        })
}

#[derive(Debug, Deserialize)]
pub struct ModelSettings {
    #[serde(default = "default_model_id")]
    pub id: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_anthropic_version")]
    pub anthropic_version: String,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub provider: ProviderSettings,
    pub model: ModelSettings,
    #[serde(default)]
    pub error_mode: ErrorMode,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Server defaults
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            // Provider and model defaults, these also make both sections always present
            .set_default("provider.region", default_region())?
            .set_default("model.id", default_model_id())?
            // Layer on the environment variables
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(|err| {
            tracing::debug!("Configuration error: {:?}", &err);
            ConfigError::Other(err)
        })
    }

    /// Generation parameters and error policy for the relay
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            model_id: self.model.id.clone(),
            max_tokens: self.model.max_tokens,
            temperature: Some(self.model.temperature),
            anthropic_version: self.model.anthropic_version.clone(),
            error_mode: self.error_mode,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("./static")
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_body_limit_bytes() -> usize {
    20 * 1024 * 1024
}

fn default_region() -> String {
    BEDROCK_REGION.to_string()
}

fn default_model_id() -> String {
    BEDROCK_MODEL.to_string()
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_temperature() -> f64 {
    0.9
}

fn default_anthropic_version() -> String {
    "bedrock-2023-05-31".to_string()
}
