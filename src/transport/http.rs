//! HTTP POST to the WS-Management endpoint

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Proxy};
use url::Url;

use crate::config::WinRmConfig;
use crate::envelope::parse_envelope;
use crate::error::{WinRmError, WinRmResult};

use super::{Exchange, ExchangeState};

/// Longest body excerpt carried in a transport error
const MAX_ERROR_BODY: usize = 512;

/// A completed HTTP exchange
#[derive(Debug, Clone)]
pub struct HttpExchange {
    /// HTTP status code
    pub status: u16,
    /// Response `Content-Type`, empty when absent
    pub content_type: String,
    /// Response body
    pub body: Vec<u8>,
}

impl HttpExchange {
    /// Whether the status is 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Convert a non-2xx response into a transport error
    pub fn error_for_status(self) -> WinRmResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            let soap = self
                .content_type
                .to_ascii_lowercase()
                .starts_with("application/soap+xml");
            let body = if soap { Some(self.body.as_slice()) } else { None };
            Err(status_error(self.status, body))
        }
    }
}

/// Build the error for a non-2xx status, using the SOAP fault when readable.
pub(crate) fn status_error(status: u16, soap_body: Option<&[u8]>) -> WinRmError {
    let reason = reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("unexpected status");

    let detail = soap_body.and_then(|body| {
        match parse_envelope(body).ok().and_then(|e| e.fault()) {
            Some(fault) => Some(format!("{}: {}", fault.code, fault.reason)),
            None => {
                let text = String::from_utf8_lossy(body);
                let text = text.trim();
                if text.is_empty() {
                    None
                } else {
                    Some(text.chars().take(MAX_ERROR_BODY).collect())
                }
            }
        }
    });

    match detail {
        Some(detail) => WinRmError::http_status(status, format!("{} - {}", reason, detail)),
        None => WinRmError::http_status(status, reason),
    }
}

/// Posts request bodies to one endpoint
#[derive(Debug, Clone)]
pub struct HttpPoster {
    client: Client,
    endpoint: Url,
}

impl HttpPoster {
    /// Build an HTTP client from the configuration
    pub fn new(config: &WinRmConfig) -> WinRmResult<Self> {
        let endpoint = config.endpoint_url()?;

        let mut client_builder = Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(!config.verify_ssl);

        if let Some(ca_path) = &config.ca_cert {
            let ca_cert = std::fs::read(ca_path).map_err(|e| {
                WinRmError::InvalidConfig(format!("Failed to read CA cert: {}", e))
            })?;
            let cert = reqwest::Certificate::from_pem(&ca_cert)
                .map_err(|e| WinRmError::InvalidConfig(format!("Invalid CA cert: {}", e)))?;
            client_builder = client_builder.add_root_certificate(cert);
        }

        if let Some(proxy) = &config.proxy {
            let proxy = Proxy::all(proxy.as_str())
                .map_err(|e| WinRmError::InvalidConfig(format!("Invalid proxy: {}", e)))?;
            client_builder = client_builder.proxy(proxy);
        }

        let client = client_builder.build().map_err(|e| {
            WinRmError::InvalidConfig(format!("Failed to create HTTP client: {}", e))
        })?;

        Ok(Self { client, endpoint })
    }

    /// Endpoint URL
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// POST a body and read the whole response.
    ///
    /// Moves the exchange through `Sent` and `AwaitingResponse`. The status is
    /// not checked here.
    pub async fn post(
        &self,
        exchange: &mut Exchange,
        content_type: &str,
        body: Vec<u8>,
    ) -> WinRmResult<HttpExchange> {
        let request = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, content_type)
            .body(body);

        exchange.advance(ExchangeState::Sent);
        let response = request.send().await?;
        exchange.advance(ExchangeState::AwaitingResponse);

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response.bytes().await?.to_vec();

        Ok(HttpExchange {
            status,
            content_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_plain_body() {
        let err = status_error(401, None);
        assert_eq!(err.status(), Some(401));
        assert!(err.to_string().contains("Unauthorized"));

        let err = status_error(500, Some(&b"boom"[..]));
        assert!(err.to_string().ends_with("Internal Server Error - boom"));
    }

    #[test]
    fn test_error_for_status_passes_success() {
        let exchange = HttpExchange {
            status: 200,
            content_type: "application/soap+xml".to_string(),
            body: Vec::new(),
        };
        assert!(exchange.error_for_status().is_ok());
    }

    #[test]
    fn test_poster_rejects_bad_endpoint() {
        let config = WinRmConfig::new("not a url");
        assert!(matches!(
            HttpPoster::new(&config),
            Err(WinRmError::InvalidConfig(_))
        ));
    }
}
