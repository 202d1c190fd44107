//! Security context adapter
//!
//! The Kerberos handshake happens outside this crate. What arrives here is an
//! established context exposing GSSAPI-style `wrap`/`unwrap`, behind the
//! [`SecurityContext`] trait.
//!
//! Wrap and unwrap advance per-direction sequence numbers, so the order of
//! calls matters: the response to request *n* must be unwrapped with the
//! state left by the wrap of request *n*. [`SessionContext`] owns the context
//! behind an async mutex; holding its [`ContextGuard`] across the whole
//! exchange serializes requests that share a session.
//!
//! A guard that wrapped a request but never unwrapped the matching response
//! (network failure, error status, cancelled future) leaves the context
//! *in flight*. An in-flight context refuses further use: its sequence state
//! no longer matches the server's, and the session has to be re-established.

mod loopback;

pub use loopback::LoopbackContext;

use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{trace, warn};

use crate::error::{WinRmError, WinRmResult};
use crate::frame::WrappedPayload;

/// An established security context (Kerberos via GSSAPI or SSPI).
pub trait SecurityContext: Send {
    /// Service principal the context was negotiated for, e.g. `HTTP@host`
    fn target_name(&self) -> &str;

    /// Whether negotiation has completed
    fn is_established(&self) -> bool {
        true
    }

    /// Encrypt and sign a message. Returns `(ciphertext, signature)`.
    fn wrap(&mut self, plaintext: &[u8]) -> WinRmResult<(Vec<u8>, Vec<u8>)>;

    /// Verify and decrypt a message.
    ///
    /// Fails with [`WinRmError::AuthenticationFailed`] when verification fails.
    fn unwrap(&mut self, signature: &[u8], ciphertext: &[u8]) -> WinRmResult<Vec<u8>>;
}

struct ContextState {
    context: Box<dyn SecurityContext>,
    in_flight: bool,
}

/// Single-owner handle to a session's security context
pub struct SessionContext {
    target_name: Arc<str>,
    state: Mutex<ContextState>,
}

impl SessionContext {
    /// Take ownership of an established context
    pub fn new(context: impl SecurityContext + 'static) -> Self {
        Self::from_boxed(Box::new(context))
    }

    /// Take ownership of a boxed context
    pub fn from_boxed(context: Box<dyn SecurityContext>) -> Self {
        Self {
            target_name: Arc::from(context.target_name()),
            state: Mutex::new(ContextState {
                context,
                in_flight: false,
            }),
        }
    }

    /// Service principal the context is bound to
    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    /// Wait for exclusive access to the context
    pub async fn lock(&self) -> ContextGuard<'_> {
        ContextGuard {
            state: self.state.lock().await,
        }
    }

    /// Whether a previous exchange left the context out of sequence
    pub async fn is_desynchronized(&self) -> bool {
        self.state.lock().await.in_flight
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("target_name", &self.target_name)
            .finish()
    }
}

/// Exclusive access to a session context for one exchange
pub struct ContextGuard<'a> {
    state: MutexGuard<'a, ContextState>,
}

impl ContextGuard<'_> {
    fn usable(&self) -> WinRmResult<()> {
        if self.state.in_flight {
            return Err(WinRmError::AuthenticationFailed(format!(
                "security context for {} is out of sequence after an incomplete exchange; \
                 re-establish the session",
                self.state.context.target_name()
            )));
        }
        if !self.state.context.is_established() {
            return Err(WinRmError::AuthenticationFailed(format!(
                "security context for {} is not established",
                self.state.context.target_name()
            )));
        }
        Ok(())
    }

    /// Wrap a plaintext message. Marks the context in flight until the
    /// matching response is unwrapped.
    pub fn wrap(&mut self, plaintext: &[u8]) -> WinRmResult<WrappedPayload> {
        self.usable()?;
        let (ciphertext, signature) = self.state.context.wrap(plaintext)?;
        self.state.in_flight = true;

        trace!(
            plaintext_len = plaintext.len(),
            ciphertext_len = ciphertext.len(),
            signature_len = signature.len(),
            "Wrapped message"
        );

        Ok(WrappedPayload {
            signature,
            ciphertext,
            original_length: plaintext.len(),
        })
    }

    /// Unwrap a response and truncate it to its declared length.
    pub fn unwrap(&mut self, payload: &WrappedPayload) -> WinRmResult<Vec<u8>> {
        if !self.state.context.is_established() {
            return Err(WinRmError::AuthenticationFailed(format!(
                "security context for {} is not established",
                self.state.context.target_name()
            )));
        }

        let mut plaintext = self
            .state
            .context
            .unwrap(&payload.signature, &payload.ciphertext)?;
        // The context has consumed the response; it is in sequence again.
        self.state.in_flight = false;

        if plaintext.len() < payload.original_length {
            return Err(WinRmError::MalformedFrame(format!(
                "unwrapped {} bytes, but the frame declares {}",
                plaintext.len(),
                payload.original_length
            )));
        }
        if plaintext.len() > payload.original_length {
            trace!(
                padding = plaintext.len() - payload.original_length,
                "Stripping trailing padding"
            );
            plaintext.truncate(payload.original_length);
        }

        Ok(plaintext)
    }

    /// Whether this guard's context awaits a response
    pub fn in_flight(&self) -> bool {
        self.state.in_flight
    }
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        if self.state.in_flight {
            warn!(
                target_name = %self.state.context.target_name(),
                "Security context released with an unanswered request"
            );
        }
    }
}
