//! # winrm-kerberos - Kerberos-encrypted WS-Management transport
//!
//! A WinRM client transport that sends WS-Management SOAP requests over HTTP,
//! optionally wrapped with a Kerberos session security context and framed as
//! `multipart/encrypted` bodies, and parses the responses.
//!
//! ## Core Concepts
//!
//! - **Envelopes**: SOAP 1.2 documents with WS-Addressing/WS-Management headers
//! - **Frames**: the `Encrypted Boundary` multipart body that carries a wrapped envelope
//! - **Security contexts**: an established Kerberos context exposing `wrap`/`unwrap`
//! - **Transports**: plain or encrypted delivery, picked by the message-encryption setting
//! - **Operations**: request kinds such as Identify
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌────────────────┐   ┌──────────────────┐   ┌──────────────────────┐
//! │   Operation    │──▶│  EnvelopeCodec   │──▶│   TransportClient    │
//! │ (Identify ...) │   │   (envelope)     │   │      (client)        │
//! └────────────────┘   └──────────────────┘   └──────────────────────┘
//!                                                        │
//!                               ┌────────────────────────┴──────────┐
//!                               ▼                                   ▼
//!                  ┌──────────────────────┐            ┌──────────────────────┐
//!                  │  EncryptedTransport  │            │    PlainTransport    │
//!                  │ security ─▶ frame    │            │                      │
//!                  └──────────────────────┘            └──────────────────────┘
//!                               │                                   │
//!                               └───────────────┬───────────────────┘
//!                                               ▼
//!                                   ┌──────────────────────┐
//!                                   │  HTTP POST (reqwest) │
//!                                   └──────────────────────┘
//! ```
//!
//! The Kerberos handshake itself is out of scope: callers hand in an
//! established context implementing [`security::SecurityContext`].
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use winrm_kerberos::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> WinRmResult<()> {
//!     let context = negotiate_kerberos("HTTP@member1.ansible.vagrant")?;
//!
//!     let client = TransportClient::builder("http://member1.ansible.vagrant:5985/wsman")
//!         .message_encryption(MessageEncryption::Always)
//!         .security_context(context)
//!         .build()?;
//!
//!     let info = client.identify().await?;
//!     println!("{} {}", info.product_vendor, info.product_version);
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod frame;
pub mod identify;
pub mod security;
pub mod transport;

pub use client::{TransportClient, TransportClientBuilder};
pub use config::{MessageEncryption, WinRmConfig};
pub use error::{WinRmError, WinRmResult};
pub use identify::{identify, IdentifyOperation, IdentityInfo};

/// Convenient re-exports of commonly used types and traits.
pub mod prelude {
    pub use crate::client::{TransportClient, TransportClientBuilder};
    pub use crate::config::{MessageEncryption, TransportScheme, WinRmConfig};
    pub use crate::envelope::{Envelope, Operation};
    pub use crate::error::{WinRmError, WinRmResult};
    pub use crate::identify::{identify, IdentifyOperation, IdentityInfo};
    pub use crate::security::{LoopbackContext, SecurityContext, SessionContext};
    pub use crate::transport::{ExchangeState, Transport};
}

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
