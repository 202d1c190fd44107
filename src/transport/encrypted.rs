use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::WinRmResult;
use crate::frame::{self, ENCRYPTED_CONTENT_TYPE};
use crate::security::SessionContext;

use super::http::status_error;
use super::{Exchange, ExchangeState, HttpPoster, Transport};

/// Sends SOAP documents wrapped by the session's security context
#[derive(Debug)]
pub struct EncryptedTransport {
    http: HttpPoster,
    context: SessionContext,
}

impl EncryptedTransport {
    pub fn new(http: HttpPoster, context: SessionContext) -> Self {
        Self { http, context }
    }

    /// The session context used for wrap/unwrap
    pub fn context(&self) -> &SessionContext {
        &self.context
    }
}

#[async_trait]
impl Transport for EncryptedTransport {
    fn name(&self) -> &'static str {
        "kerberos-encrypted"
    }

    fn is_encrypted(&self) -> bool {
        true
    }

    async fn exchange(&self, exchange: &mut Exchange, envelope: &[u8]) -> WinRmResult<Vec<u8>> {
        // Held until the response is unwrapped: unwrap n must follow wrap n.
        let mut guard = self.context.lock().await;

        let wrapped = guard.wrap(envelope)?;
        exchange.advance(ExchangeState::Wrapped);

        let body = frame::encode(&wrapped)?;
        exchange.advance(ExchangeState::Framed);

        debug!(
            exchange = %exchange.id(),
            endpoint = %self.http.endpoint(),
            target = %self.context.target_name(),
            original_length = wrapped.original_length,
            len = body.len(),
            "Sending encrypted WS-Man request"
        );

        let response = self.http.post(exchange, ENCRYPTED_CONTENT_TYPE, body).await?;

        if !response.is_success() {
            // Error responses are usually wrapped too; unwrapping them keeps
            // the context in sequence and exposes the fault text.
            if frame::is_encrypted_content_type(&response.content_type) {
                let fault_body = frame::decode(&response.content_type, &response.body)
                    .and_then(|payload| guard.unwrap(&payload));
                match fault_body {
                    Ok(plaintext) => return Err(status_error(response.status, Some(&plaintext))),
                    Err(e) => warn!(error = %e, "Could not unwrap error response"),
                }
            }
            return response.error_for_status().map(|r| r.body);
        }

        let payload = frame::decode(&response.content_type, &response.body)?;
        exchange.advance(ExchangeState::Unframed);

        let plaintext = guard.unwrap(&payload)?;
        exchange.advance(ExchangeState::Unwrapped);

        Ok(plaintext)
    }
}
