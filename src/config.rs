//! WinRM client configuration
//!
//! Settings can be built in code or loaded from a TOML file:
//!
//! ```toml
//! endpoint = "http://member1.ansible.vagrant:5985/wsman"
//! principal = "testguy@ANSIBLE.VAGRANT"
//! transport = "kerberos"
//! message_encryption = "always"
//! proxy = "http://192.168.33.51:8888/"
//! timeout = "30s"
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::{WinRmError, WinRmResult};

/// Default WinRM HTTP port
pub const DEFAULT_WINRM_PORT: u16 = 5985;

/// Default WinRM HTTPS port
pub const DEFAULT_WINRM_SSL_PORT: u16 = 5986;

/// Default HTTP request timeout in seconds
pub const DEFAULT_TIMEOUT: u64 = 60;

/// Default WS-Man operation timeout in seconds
pub const DEFAULT_OPERATION_TIMEOUT: u64 = 20;

/// Default maximum envelope size advertised to the server
pub const DEFAULT_MAX_ENVELOPE_SIZE: u32 = 153_600;

/// Default locale for `w:Locale` and `p:DataLocale`
pub const DEFAULT_LOCALE: &str = "en-US";

/// Default service class used to build the target SPN
pub const DEFAULT_SERVICE: &str = "HTTP";

/// Authentication transport. Kerberos is the only supported scheme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportScheme {
    /// Kerberos via an externally negotiated security context
    #[default]
    Kerberos,
}

/// When to apply Kerberos session encryption to messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageEncryption {
    /// Always wrap messages, regardless of the endpoint scheme
    Always,
    /// Never wrap messages
    Never,
    /// Wrap messages over plain `http`, rely on TLS over `https`
    #[default]
    Auto,
}

impl MessageEncryption {
    /// Decide whether messages to `endpoint` must be wrapped.
    pub fn applies_to(self, endpoint: &Url) -> bool {
        match self {
            MessageEncryption::Always => true,
            MessageEncryption::Never => false,
            MessageEncryption::Auto => endpoint.scheme() == "http",
        }
    }
}

impl fmt::Display for MessageEncryption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageEncryption::Always => "always",
            MessageEncryption::Never => "never",
            MessageEncryption::Auto => "auto",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for MessageEncryption {
    type Err = WinRmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "always" => Ok(MessageEncryption::Always),
            "never" => Ok(MessageEncryption::Never),
            "auto" => Ok(MessageEncryption::Auto),
            other => Err(WinRmError::InvalidConfig(format!(
                "unknown message encryption mode '{}' (expected always, never or auto)",
                other
            ))),
        }
    }
}

/// WinRM client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WinRmConfig {
    /// WS-Management endpoint URL, e.g. `http://host:5985/wsman`
    pub endpoint: String,

    /// Client principal (`user@REALM`), informational for the context provider
    #[serde(default)]
    pub principal: Option<String>,

    /// Authentication transport
    #[serde(default)]
    pub transport: TransportScheme,

    /// Message encryption policy
    #[serde(default)]
    pub message_encryption: MessageEncryption,

    /// HTTP proxy URL
    #[serde(default)]
    pub proxy: Option<String>,

    /// Service class of the target SPN
    #[serde(default = "default_service")]
    pub service: String,

    /// HTTP request timeout
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// WS-Man operation timeout sent in `w:OperationTimeout`
    #[serde(default = "default_operation_timeout", with = "humantime_serde")]
    pub operation_timeout: Duration,

    /// Maximum envelope size sent in `w:MaxEnvelopeSize`
    #[serde(default = "default_max_envelope_size")]
    pub max_envelope_size: u32,

    /// Locale sent in `w:Locale` and `p:DataLocale`
    #[serde(default = "default_locale")]
    pub locale: String,

    /// Verify TLS certificates for `https` endpoints
    #[serde(default = "default_true")]
    pub verify_ssl: bool,

    /// Custom CA certificate (PEM)
    #[serde(default)]
    pub ca_cert: Option<PathBuf>,
}

fn default_service() -> String {
    DEFAULT_SERVICE.to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(DEFAULT_TIMEOUT)
}

fn default_operation_timeout() -> Duration {
    Duration::from_secs(DEFAULT_OPERATION_TIMEOUT)
}

fn default_max_envelope_size() -> u32 {
    DEFAULT_MAX_ENVELOPE_SIZE
}

fn default_locale() -> String {
    DEFAULT_LOCALE.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for WinRmConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            principal: None,
            transport: TransportScheme::default(),
            message_encryption: MessageEncryption::default(),
            proxy: None,
            service: default_service(),
            timeout: default_timeout(),
            operation_timeout: default_operation_timeout(),
            max_envelope_size: DEFAULT_MAX_ENVELOPE_SIZE,
            locale: default_locale(),
            verify_ssl: true,
            ca_cert: None,
        }
    }
}

impl WinRmConfig {
    /// Create a new config for an endpoint URL
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Build the conventional endpoint URL for a host
    pub fn for_host(host: &str, use_ssl: bool) -> Self {
        let (scheme, port) = if use_ssl {
            ("https", DEFAULT_WINRM_SSL_PORT)
        } else {
            ("http", DEFAULT_WINRM_PORT)
        };
        Self::new(format!("{}://{}:{}/wsman", scheme, host, port))
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> WinRmResult<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            WinRmError::InvalidConfig(format!(
                "Failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> WinRmResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| WinRmError::InvalidConfig(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the endpoint and proxy are usable
    pub fn validate(&self) -> WinRmResult<()> {
        self.endpoint_url()?;
        if let Some(proxy) = &self.proxy {
            Url::parse(proxy).map_err(|e| {
                WinRmError::InvalidConfig(format!("Invalid proxy URL '{}': {}", proxy, e))
            })?;
        }
        if self.operation_timeout.as_secs() == 0 {
            return Err(WinRmError::InvalidConfig(
                "operation_timeout must be at least one second".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the parsed endpoint URL
    pub fn endpoint_url(&self) -> WinRmResult<Url> {
        let url = Url::parse(&self.endpoint).map_err(|e| {
            WinRmError::InvalidConfig(format!("Invalid endpoint '{}': {}", self.endpoint, e))
        })?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(WinRmError::InvalidConfig(format!(
                    "Unsupported endpoint scheme '{}'",
                    other
                )))
            }
        }
        if url.host_str().is_none() {
            return Err(WinRmError::InvalidConfig(format!(
                "Endpoint '{}' has no host",
                self.endpoint
            )));
        }
        Ok(url)
    }

    /// Target service principal, e.g. `HTTP@member1.ansible.vagrant`
    pub fn target_spn(&self) -> WinRmResult<String> {
        let url = self.endpoint_url()?;
        let host = url.host_str().unwrap_or_default();
        Ok(format!("{}@{}", self.service, host))
    }

    /// Operation timeout as an `xs:duration`, e.g. `PT20S`
    pub fn operation_timeout_xml(&self) -> String {
        format!("PT{}S", self.operation_timeout.as_secs())
    }

    /// Whether requests to the configured endpoint are wrapped
    pub fn encrypts_messages(&self) -> WinRmResult<bool> {
        Ok(self.message_encryption.applies_to(&self.endpoint_url()?))
    }
}
