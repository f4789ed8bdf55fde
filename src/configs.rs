use anyhow::{bail, Context, Result};
use secrecy::SecretString;
use serde::Serialize;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Deployment-wide certificate mode, fixed for the process lifetime.
///
/// `Private` deployments operate their own server CA and ship its public
/// certificate to connectors; `Public` deployments rely on a publicly
/// trusted chain and only optionally ship the full chain file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CertMode {
    Private,
    Public,
}

impl FromStr for CertMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "private" => Ok(CertMode::Private),
            "public" => Ok(CertMode::Public),
            other => bail!(
                "invalid CERT_MODE {:?} (expected \"private\" or \"public\")",
                other
            ),
        }
    }
}

impl fmt::Display for CertMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CertMode::Private => f.write_str("private"),
            CertMode::Public => f.write_str("public"),
        }
    }
}

/// Application configuration, resolved once at startup from the process
/// environment and passed explicitly into every component that needs it.
#[derive(Debug)]
pub struct AppConfig {
    pub domain: String,
    pub cert_mode: CertMode,
    /// Bearer token for the /admin routes. Optional at startup; admin
    /// requests fail with 500 until one is configured.
    pub admin_token: Option<SecretString>,
    /// Exact origin allowed by CORS. Unset means any origin, without
    /// credentials.
    pub ui_origin: Option<String>,
    pub pki_dir: PathBuf,
    pub mqtt_dir: PathBuf,
    pub ca_common_name: String,
    pub host: String,
    pub port: u16,
}

impl AppConfig {
    /// Load configuration from environment variables, with the same
    /// defaults the deployment manifests assume.
    pub fn from_env() -> Result<Self> {
        let port = match env::var("BIND_PORT") {
            Ok(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("invalid BIND_PORT {:?}", raw))?,
            Err(_) => default_port(),
        };

        let cert_mode = match env::var("CERT_MODE") {
            Ok(raw) => raw.parse()?,
            Err(_) => CertMode::Private,
        };

        Ok(Self {
            domain: env::var("DOMAIN").unwrap_or_else(|_| default_domain()),
            cert_mode,
            admin_token: env::var("ADMIN_TOKEN").ok().map(SecretString::from),
            ui_origin: env::var("UI_ORIGIN").ok(),
            pki_dir: env::var("PKI_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_pki_dir()),
            mqtt_dir: env::var("MQTT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_mqtt_dir()),
            ca_common_name: env::var("CA_COMMON_NAME")
                .unwrap_or_else(|_| default_ca_common_name()),
            host: env::var("BIND_HOST").unwrap_or_else(|_| default_host()),
            port,
        })
    }
}

fn default_domain() -> String {
    "example.com".to_string()
}

fn default_pki_dir() -> PathBuf {
    PathBuf::from("pki")
}

fn default_mqtt_dir() -> PathBuf {
    PathBuf::from("mqtt")
}

fn default_ca_common_name() -> String {
    "Edge Issuing CA".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}
