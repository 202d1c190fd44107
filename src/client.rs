//! WS-Management transport client
//!
//! [`TransportClient`] drives one request through the whole pipeline: build
//! the envelope, hand it to the selected [`Transport`], parse the response and
//! surface SOAP faults. Each call is a single HTTP POST; nothing is retried.
//!
//! # Example
//!
//! ```rust,no_run
//! use winrm_kerberos::prelude::*;
//!
//! # async fn example() -> WinRmResult<()> {
//! let client = TransportClient::builder("http://winserver.example.com:5985/wsman")
//!     .message_encryption(MessageEncryption::Always)
//!     .security_context(LoopbackContext::new("HTTP@winserver.example.com", 0x5a))
//!     .build()?;
//!
//! let info = client.identify().await?;
//! println!("{} {}", info.product_vendor, info.product_version);
//! # Ok(())
//! # }
//! ```

use parking_lot::Mutex;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::{MessageEncryption, WinRmConfig};
use crate::envelope::{build_envelope, parse_envelope, Envelope, Operation, RequestHeaders};
use crate::error::{WinRmError, WinRmResult};
use crate::identify::{IdentifyOperation, IdentityInfo};
use crate::security::{SecurityContext, SessionContext};
use crate::transport::{
    EncryptedTransport, Exchange, ExchangeState, HttpPoster, PlainTransport, Transport,
};

/// Client for one WS-Management endpoint
#[derive(Debug)]
pub struct TransportClient {
    config: WinRmConfig,
    headers: RequestHeaders,
    transport: Box<dyn Transport>,
    last_state: Mutex<ExchangeState>,
}

impl TransportClient {
    /// Start a builder for an endpoint URL
    pub fn builder(endpoint: impl Into<String>) -> TransportClientBuilder {
        TransportClientBuilder::new(endpoint)
    }

    /// Create a client from a configuration.
    ///
    /// The message-encryption setting picks the transport. Encryption without
    /// a security context is an [`WinRmError::InvalidConfig`].
    pub fn from_config(config: WinRmConfig, context: Option<SessionContext>) -> WinRmResult<Self> {
        config.validate()?;

        let http = HttpPoster::new(&config)?;
        let transport: Box<dyn Transport> = if config.encrypts_messages()? {
            let context = context.ok_or_else(|| {
                WinRmError::InvalidConfig(format!(
                    "message encryption '{}' for {} requires an established Kerberos security context",
                    config.message_encryption, config.endpoint
                ))
            })?;
            let spn = config.target_spn()?;
            if !context.target_name().eq_ignore_ascii_case(&spn) {
                warn!(
                    context = %context.target_name(),
                    expected = %spn,
                    "Security context was negotiated for a different service principal"
                );
            }
            Box::new(EncryptedTransport::new(http, context))
        } else {
            if context.is_some() {
                debug!(
                    endpoint = %config.endpoint,
                    encryption = %config.message_encryption,
                    "Messages are not wrapped; security context unused"
                );
            }
            Box::new(PlainTransport::new(http))
        };

        Ok(Self::with_transport(config, transport))
    }

    /// Create a client over a caller-supplied transport
    pub fn with_transport(config: WinRmConfig, transport: Box<dyn Transport>) -> Self {
        let headers = RequestHeaders::from_config(&config);
        debug!(
            endpoint = %config.endpoint,
            transport = transport.name(),
            "Created WinRM transport client"
        );
        Self {
            config,
            headers,
            transport,
            last_state: Mutex::new(ExchangeState::Idle),
        }
    }

    fn set_session_id(&mut self, session_id: Uuid) {
        self.headers.session_id = Some(session_id);
    }

    /// Client configuration
    pub fn config(&self) -> &WinRmConfig {
        &self.config
    }

    /// Name of the selected transport
    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    /// Whether requests are wrapped by the security context
    pub fn is_encrypted(&self) -> bool {
        self.transport.is_encrypted()
    }

    /// Final state of the most recent exchange
    pub fn last_exchange_state(&self) -> ExchangeState {
        self.last_state.lock().clone()
    }

    /// Send an operation and return the parsed response envelope.
    ///
    /// A response carrying a SOAP fault fails with [`WinRmError::Fault`].
    pub async fn send(&self, operation: &dyn Operation) -> WinRmResult<Envelope> {
        let envelope = build_envelope(operation, &self.headers);
        self.send_envelope(&envelope).await
    }

    /// Send the Identify request and return the raw response envelope
    pub async fn send_identify(&self) -> WinRmResult<Envelope> {
        self.send(&IdentifyOperation).await
    }

    /// Run Identify and parse the result
    pub async fn identify(&self) -> WinRmResult<IdentityInfo> {
        IdentifyOperation.execute(self).await
    }

    /// Send a prepared envelope
    pub async fn send_envelope(&self, envelope: &Envelope) -> WinRmResult<Envelope> {
        let mut exchange = Exchange::new();
        exchange.advance(ExchangeState::EnvelopeBuilt);

        let result = self.run(&mut exchange, envelope).await;
        if let Err(e) = &result {
            debug!(exchange = %exchange.id(), error = %e, "WS-Man exchange failed");
            exchange.fail(e);
        }

        *self.last_state.lock() = exchange.state().clone();
        result
    }

    async fn run(&self, exchange: &mut Exchange, envelope: &Envelope) -> WinRmResult<Envelope> {
        let request = envelope.to_bytes();
        debug!(
            exchange = %exchange.id(),
            transport = self.transport.name(),
            action = envelope.header.action.as_deref().unwrap_or("(none)"),
            message_id = envelope.header.message_id.as_deref().unwrap_or("(none)"),
            len = request.len(),
            "Sending WS-Man request"
        );

        let response = self.transport.exchange(exchange, &request).await?;
        let parsed = parse_envelope(&response)?;
        exchange.advance(ExchangeState::Parsed);

        if let Some(fault) = parsed.fault() {
            return Err(fault.into());
        }

        if let (Some(sent), Some(related)) =
            (&envelope.header.message_id, &parsed.header.relates_to)
        {
            if sent != related {
                return Err(WinRmError::UnsupportedResponse(format!(
                    "response relates to message {} but request was {}",
                    related, sent
                )));
            }
        }

        exchange.advance(ExchangeState::Done);
        debug!(exchange = %exchange.id(), len = response.len(), "Received WS-Man response");
        Ok(parsed)
    }
}

/// Builder for [`TransportClient`]
pub struct TransportClientBuilder {
    config: WinRmConfig,
    context: Option<SessionContext>,
    session_id: Option<Uuid>,
}

impl TransportClientBuilder {
    /// Create a builder for an endpoint URL
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::from_config(WinRmConfig::new(endpoint))
    }

    /// Start from an existing configuration
    pub fn from_config(config: WinRmConfig) -> Self {
        Self {
            config,
            context: None,
            session_id: None,
        }
    }

    /// Set the message encryption policy
    pub fn message_encryption(mut self, mode: MessageEncryption) -> Self {
        self.config.message_encryption = mode;
        self
    }

    /// Hand over an established security context
    pub fn security_context(mut self, context: impl SecurityContext + 'static) -> Self {
        self.context = Some(SessionContext::new(context));
        self
    }

    /// Hand over an already wrapped session context
    pub fn session_context(mut self, context: SessionContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Set the client principal
    pub fn principal(mut self, principal: impl Into<String>) -> Self {
        self.config.principal = Some(principal.into());
        self
    }

    /// Route requests through a proxy
    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.config.proxy = Some(proxy.into());
        self
    }

    /// Set the HTTP request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the WS-Man operation timeout
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.config.operation_timeout = timeout;
        self
    }

    /// Set the request locale
    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.config.locale = locale.into();
        self
    }

    /// Set the advertised maximum envelope size
    pub fn max_envelope_size(mut self, size: u32) -> Self {
        self.config.max_envelope_size = size;
        self
    }

    /// Send `p:SessionId` with addressed requests
    pub fn session_id(mut self, session_id: Uuid) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Set whether to verify TLS certificates
    pub fn verify_ssl(mut self, verify: bool) -> Self {
        self.config.verify_ssl = verify;
        self
    }

    /// Trust an additional CA certificate (PEM)
    pub fn ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.ca_cert = Some(path.into());
        self
    }

    /// Build the client
    pub fn build(self) -> WinRmResult<TransportClient> {
        let mut client = TransportClient::from_config(self.config, self.context)?;
        if let Some(session_id) = self.session_id {
            client.set_session_id(session_id);
        }
        Ok(client)
    }
}
