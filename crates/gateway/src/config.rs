//! Configuration for the gateway
//!
//! Loaded from an optional TOML file, then overridden by environment
//! variables prefixed with `SYNCGATE`, using `__` for nesting
//! (e.g. `SYNCGATE__SERVER__BIND_ADDRESS=0.0.0.0:8080`).

use std::time::Duration;

use serde::Deserialize;
use syncgate_auth_core::{KeySetSettings, VerifierSettings};

use crate::error::{GatewayError, Result};
use crate::mutation::AnonymousPolicy;

/// Main configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub auth_service: AuthServiceConfig,
    pub verification: VerificationConfig,
    pub mutations: MutationConfig,
    pub cookies: CookieConfig,
    pub logging: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Request body limit in bytes
    pub body_limit_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthServiceConfig {
    pub base_url: String,
    pub session_path: String,
    pub token_path: String,
    pub sign_out_path: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    pub jwks_url: String,
    pub issuer: Option<String>,
    pub audience: Vec<String>,
    pub leeway_seconds: u64,
    pub key_set_ttl_seconds: u64,
    pub fetch_timeout_ms: u64,
    pub min_refetch_interval_seconds: u64,
    pub require_organization_claim: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MutationConfig {
    pub anonymous_policy: AnonymousPolicy,
    /// Sync engine push endpoint that applies authorized batches
    pub processor_url: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CookieConfig {
    /// Lifetime of the identity cookies. The token inside carries its own,
    /// much shorter, expiry.
    pub max_age_seconds: i64,
    pub secure: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            body_limit_bytes: 1024 * 1024,
        }
    }
}

impl Default for AuthServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            session_path: "/auth/get-session".to_string(),
            token_path: "/auth/token".to_string(),
            sign_out_path: "/auth/sign-out".to_string(),
            timeout_ms: 5000,
        }
    }
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            jwks_url: "http://127.0.0.1:3000/auth/jwks".to_string(),
            issuer: None,
            audience: Vec::new(),
            leeway_seconds: 0,
            key_set_ttl_seconds: 300,
            fetch_timeout_ms: 5000,
            min_refetch_interval_seconds: 30,
            require_organization_claim: false,
        }
    }
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            anonymous_policy: AnonymousPolicy::default(),
            processor_url: "http://127.0.0.1:4848/push".to_string(),
            timeout_ms: 10_000,
        }
    }
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            max_age_seconds: 365 * 24 * 60 * 60,
            secure: false,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl GatewayConfig {
    /// Load configuration from an optional file plus the environment.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let builder = config::Config::builder();

        let builder = if let Some(path) = path {
            builder.add_source(config::File::with_name(path))
        } else {
            builder.add_source(config::File::with_name("syncgate").required(false))
        };

        let builder = builder.add_source(
            config::Environment::with_prefix("SYNCGATE")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("verification.audience")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML text, without the environment.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = config::Config::builder()
            .add_source(config::File::from_str(text, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let required = [
            ("server.bind_address", &self.server.bind_address),
            ("auth_service.base_url", &self.auth_service.base_url),
            ("verification.jwks_url", &self.verification.jwks_url),
            ("mutations.processor_url", &self.mutations.processor_url),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(GatewayError::config(format!("{} must not be empty", name)));
            }
        }

        let timeouts = [
            ("auth_service.timeout_ms", self.auth_service.timeout_ms),
            ("verification.fetch_timeout_ms", self.verification.fetch_timeout_ms),
            ("mutations.timeout_ms", self.mutations.timeout_ms),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                return Err(GatewayError::config(format!("{} must be greater than zero", name)));
            }
        }

        if self.server.body_limit_bytes == 0 {
            return Err(GatewayError::config("server.body_limit_bytes must be greater than zero"));
        }
        if self.cookies.max_age_seconds <= 0 {
            return Err(GatewayError::config("cookies.max_age_seconds must be positive"));
        }

        Ok(())
    }

    pub fn verifier_settings(&self) -> VerifierSettings {
        VerifierSettings {
            issuer: self.verification.issuer.clone(),
            audience: self.verification.audience.clone(),
            leeway_seconds: self.verification.leeway_seconds,
            require_organization_claim: self.verification.require_organization_claim,
        }
    }

    pub fn key_set_settings(&self) -> KeySetSettings {
        KeySetSettings {
            ttl: Duration::from_secs(self.verification.key_set_ttl_seconds),
            fetch_timeout: Duration::from_millis(self.verification.fetch_timeout_ms),
            min_refetch_interval: Duration::from_secs(self.verification.min_refetch_interval_seconds),
        }
    }
}
