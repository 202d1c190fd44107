//! Message transports
//!
//! A [`Transport`] moves one serialized envelope to the endpoint and returns
//! the plaintext response envelope. Two implementations exist:
//!
//! - [`PlainTransport`]: posts the SOAP document as
//!   `application/soap+xml;charset=UTF-8`
//! - [`EncryptedTransport`]: wraps the document with the session's security
//!   context and posts it as a multipart-encrypted body
//!
//! The message-encryption setting picks one of them when the client is built.
//!
//! Each request walks the [`ExchangeState`] machine:
//!
//! ```text
//! Idle → EnvelopeBuilt → Wrapped → Framed → Sent → AwaitingResponse
//!      → Unframed → Unwrapped → Parsed → Done
//! ```
//!
//! The plain transport skips the wrap and frame states. Any state can move to
//! `Failed`.

mod encrypted;
mod http;
mod plain;

pub use encrypted::EncryptedTransport;
pub use http::{HttpExchange, HttpPoster};
pub use plain::PlainTransport;

use async_trait::async_trait;
use std::fmt;
use tracing::trace;
use uuid::Uuid;

use crate::error::{WinRmError, WinRmResult};

/// Per-request progress of an exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeState {
    Idle,
    EnvelopeBuilt,
    Wrapped,
    Framed,
    Sent,
    AwaitingResponse,
    Unframed,
    Unwrapped,
    Parsed,
    Done,
    Failed(String),
}

impl ExchangeState {
    fn ordinal(&self) -> u8 {
        match self {
            ExchangeState::Idle => 0,
            ExchangeState::EnvelopeBuilt => 1,
            ExchangeState::Wrapped => 2,
            ExchangeState::Framed => 3,
            ExchangeState::Sent => 4,
            ExchangeState::AwaitingResponse => 5,
            ExchangeState::Unframed => 6,
            ExchangeState::Unwrapped => 7,
            ExchangeState::Parsed => 8,
            ExchangeState::Done => 9,
            ExchangeState::Failed(_) => u8::MAX,
        }
    }

    /// Whether the exchange has finished, successfully or not
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExchangeState::Done | ExchangeState::Failed(_))
    }
}

impl fmt::Display for ExchangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeState::Failed(reason) => write!(f, "Failed({})", reason),
            other => write!(f, "{:?}", other),
        }
    }
}

/// State tracker for one request/response exchange
#[derive(Debug)]
pub struct Exchange {
    id: Uuid,
    state: ExchangeState,
}

impl Exchange {
    /// Start a new exchange in `Idle`
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: ExchangeState::Idle,
        }
    }

    /// Identifier used in log records
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current state
    pub fn state(&self) -> &ExchangeState {
        &self.state
    }

    /// Move forward to `next`. States only move forward.
    pub fn advance(&mut self, next: ExchangeState) {
        debug_assert!(
            !self.state.is_terminal() && next.ordinal() > self.state.ordinal(),
            "invalid exchange transition {} -> {}",
            self.state,
            next
        );
        trace!(exchange = %self.id, from = %self.state, to = %next, "Exchange transition");
        self.state = next;
    }

    /// Record a failure
    pub fn fail(&mut self, error: &WinRmError) {
        trace!(exchange = %self.id, from = %self.state, error = %error, "Exchange failed");
        self.state = ExchangeState::Failed(error.to_string());
    }
}

impl Default for Exchange {
    fn default() -> Self {
        Self::new()
    }
}

/// Moves serialized envelopes to the endpoint and back
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Whether messages are wrapped by a security context
    fn is_encrypted(&self) -> bool;

    /// Send one envelope and return the plaintext response envelope.
    async fn exchange(&self, exchange: &mut Exchange, envelope: &[u8]) -> WinRmResult<Vec<u8>>;
}
