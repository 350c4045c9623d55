use std::path::{Path, PathBuf};

use admission_gateway::AuthorizerConfig;
use anyhow::Context;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use static_policy_plugin::StaticPolicyConfig;

/// Prefix for environment overrides; nested keys are separated by `__`.
pub const ENV_PREFIX: &str = "ADMISSION_";

fn default_bind_addr() -> String {
    "127.0.0.1:8181".to_owned()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct ServerConfig {
    pub bind_addr: String,

    /// Serve HTTPS when set, plain HTTP otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,

    pub logging: LoggingConfig,

    pub authorizer: AuthorizerConfig,

    pub policy: StaticPolicyConfig,

    /// JSON or YAML document loaded into the data store at startup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            tls: None,
            logging: LoggingConfig::default(),
            authorizer: AuthorizerConfig::default(),
            policy: StaticPolicyConfig::default(),
            data_path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    /// Trust anchors for client certificates. Required unless
    /// `client_auth` is `none`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ca_path: Option<PathBuf>,
    #[serde(default)]
    pub client_auth: ClientAuth,
}

/// How the listener treats client certificates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuth {
    #[default]
    None,
    /// Verify a certificate if the client sends one.
    Optional,
    Require,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            json: false,
        }
    }
}

impl ServerConfig {
    /// Defaults, then the YAML file (if any), then `ADMISSION_*` variables.
    ///
    /// # Errors
    /// Returns an error if the file is missing or any layer fails to
    /// deserialize.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            anyhow::ensure!(path.exists(), "config file not found: {}", path.display());
            figment = figment.merge(Yaml::file(path));
        }
        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("failed to load server configuration")
    }
}
