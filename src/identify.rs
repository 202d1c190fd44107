//! WS-Management Identify
//!
//! Identify is the one WS-Man request that carries no addressing headers. The
//! server answers with its protocol version and product details, which makes
//! it a cheap probe that the endpoint is reachable and that the security
//! context can wrap and unwrap messages.

use serde::Serialize;
use tracing::info;

use crate::client::TransportClient;
use crate::envelope::{Envelope, Operation, WSMID_NS};
use crate::error::{WinRmError, WinRmResult};

/// The Identify request
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentifyOperation;

impl Operation for IdentifyOperation {
    fn action(&self) -> Option<&str> {
        None
    }

    fn namespaces(&self) -> Vec<(&'static str, &'static str)> {
        vec![("wsmid", WSMID_NS)]
    }

    fn body(&self) -> String {
        "<wsmid:Identify/>".to_string()
    }
}

impl IdentifyOperation {
    /// Send Identify through a client and parse the response
    pub async fn execute(&self, client: &TransportClient) -> WinRmResult<IdentityInfo> {
        let envelope = client.send(self).await?;
        let identity = IdentityInfo::from_envelope(&envelope)?;
        info!(
            endpoint = %client.config().endpoint,
            vendor = %identity.product_vendor,
            version = %identity.product_version,
            "Identified WinRM endpoint"
        );
        Ok(identity)
    }
}

/// Identity reported by a WS-Management server
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityInfo {
    pub protocol_version: String,
    pub product_vendor: String,
    pub product_version: String,
    /// Authentication profiles the server advertises, if any
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub security_profiles: Vec<String>,
}

impl IdentityInfo {
    /// Extract identity fields from an `IdentifyResponse` envelope
    pub fn from_envelope(envelope: &Envelope) -> WinRmResult<Self> {
        if !envelope.body_contains("IdentifyResponse") {
            return Err(WinRmError::UnsupportedResponse(
                "response body has no IdentifyResponse".to_string(),
            ));
        }

        let required = |name: &str| {
            envelope
                .body_text(name)
                .into_iter()
                .map(|text| text.trim().to_string())
                .find(|text| !text.is_empty())
                .ok_or_else(|| {
                    WinRmError::UnsupportedResponse(format!("IdentifyResponse has no {}", name))
                })
        };

        Ok(Self {
            protocol_version: required("ProtocolVersion")?,
            product_vendor: required("ProductVendor")?,
            product_version: required("ProductVersion")?,
            security_profiles: envelope
                .body_text("SecurityProfileName")
                .into_iter()
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty())
                .collect(),
        })
    }
}

/// Run Identify against the client's endpoint
pub async fn identify(client: &TransportClient) -> WinRmResult<IdentityInfo> {
    IdentifyOperation.execute(client).await
}
