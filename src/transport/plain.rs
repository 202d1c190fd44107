use async_trait::async_trait;
use tracing::debug;

use crate::error::WinRmResult;
use crate::frame::SOAP_CONTENT_TYPE;

use super::{Exchange, HttpPoster, Transport};

/// Sends SOAP documents without message encryption
#[derive(Debug)]
pub struct PlainTransport {
    http: HttpPoster,
}

impl PlainTransport {
    pub fn new(http: HttpPoster) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Transport for PlainTransport {
    fn name(&self) -> &'static str {
        "plain"
    }

    fn is_encrypted(&self) -> bool {
        false
    }

    async fn exchange(&self, exchange: &mut Exchange, envelope: &[u8]) -> WinRmResult<Vec<u8>> {
        debug!(
            exchange = %exchange.id(),
            endpoint = %self.http.endpoint(),
            len = envelope.len(),
            "Sending plain WS-Man request"
        );

        let response = self
            .http
            .post(exchange, SOAP_CONTENT_TYPE, envelope.to_vec())
            .await?
            .error_for_status()?;

        Ok(response.body)
    }
}
