//! winrm-identify
//!
//! Probes a WinRM endpoint with a WS-Management Identify request and prints
//! the server's protocol and product version.
//!
//! The binary carries no Kerberos negotiator, so it only runs with message
//! encryption off (`--encryption never`, or `auto` against an `https`
//! endpoint). Encrypted modes are available through the library.

mod cli;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use winrm_kerberos::TransportClient;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let config = cli.winrm_config()?;

    let result = match TransportClient::from_config(config, None) {
        Ok(client) => client.identify().await,
        Err(e) => Err(e),
    };

    match result {
        Ok(info) => {
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("Protocol version: {}", info.protocol_version);
                println!("Product vendor:   {}", info.product_vendor);
                println!("Product version:  {}", info.product_version);
                for profile in &info.security_profiles {
                    println!("Security profile: {}", profile);
                }
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

/// Initialize logging based on verbosity level
fn init_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(verbosity >= 3).with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}
