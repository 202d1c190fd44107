//! Command-line interface for `winrm-identify`

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use winrm_kerberos::{MessageEncryption, WinRmConfig};

/// Send a WS-Management Identify request to a WinRM endpoint
#[derive(Parser, Debug, Clone)]
#[command(name = "winrm-identify")]
#[command(version)]
#[command(about = "Probe a WinRM endpoint with WS-Management Identify", long_about = None)]
pub struct Cli {
    /// WS-Management endpoint URL, e.g. http://host:5985/wsman
    #[arg(short = 'e', long, env = "WINRM_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Path to a TOML configuration file
    #[arg(short = 'c', long, env = "WINRM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Message encryption (always, never, auto)
    #[arg(long)]
    pub encryption: Option<MessageEncryption>,

    /// HTTP proxy URL
    #[arg(long)]
    pub proxy: Option<String>,

    /// HTTP request timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Skip TLS certificate verification
    #[arg(long)]
    pub insecure: bool,

    /// Print the identity as JSON
    #[arg(long)]
    pub json: bool,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Merge the config file (if any) with command-line overrides
    pub fn winrm_config(&self) -> Result<WinRmConfig> {
        let mut config = match &self.config {
            Some(path) => WinRmConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => match &self.endpoint {
                Some(endpoint) => WinRmConfig::new(endpoint.clone()),
                None => bail!("either --endpoint or --config is required"),
            },
        };

        if let Some(endpoint) = &self.endpoint {
            config.endpoint = endpoint.clone();
        }
        if let Some(mode) = self.encryption {
            config.message_encryption = mode;
        }
        if let Some(proxy) = &self.proxy {
            config.proxy = Some(proxy.clone());
        }
        if let Some(secs) = self.timeout {
            config.timeout = Duration::from_secs(secs);
        }
        if self.insecure {
            config.verify_ssl = false;
        }

        config.validate()?;
        Ok(config)
    }
}
