//! Shared test utilities for the winrm-kerberos test suite.
//!
//! This module provides:
//! - A fake WinRM endpoint built on wiremock that unwraps encrypted requests
//!   and wraps its replies with a peer loopback context
//! - Canned SOAP responses
//! - Client constructors for plain and encrypted transports
//!
//! # Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use winrm_kerberos::envelope::parse_envelope;
use winrm_kerberos::frame::{self, WrappedPayload, ENCRYPTED_CONTENT_TYPE, SOAP_CONTENT_TYPE};
use winrm_kerberos::prelude::*;

/// XOR key shared by the client and the fake server
pub const KEY: u8 = 0x5a;

// ============================================================================
// Canned responses
// ============================================================================

pub const PROTOCOL_VERSION: &str = "http://schemas.dmtf.org/wbem/wsman/1/wsman.xsd";
pub const PRODUCT_VENDOR: &str = "Microsoft Corporation";
pub const PRODUCT_VERSION: &str = "OS: 0.0.0 SP: 0.0 Stack: 3.0";

/// IdentifyResponse as returned by a Windows Server 2016 host
pub fn identify_response() -> String {
    format!(
        r#"<s:Envelope xml:lang="en-US" xmlns:s="http://www.w3.org/2003/05/soap-envelope"><s:Header/><s:Body><wsmid:IdentifyResponse xmlns:wsmid="http://schemas.dmtf.org/wbem/wsman/identity/1/wsmanidentity.xsd"><wsmid:ProtocolVersion>{}</wsmid:ProtocolVersion><wsmid:ProductVendor>{}</wsmid:ProductVendor><wsmid:ProductVersion>{}</wsmid:ProductVersion><wsmid:SecurityProfiles><wsmid:SecurityProfileName>http://schemas.dmtf.org/wbem/wsman/1/wsman/secprofile/http/spnego-kerberos</wsmid:SecurityProfileName></wsmid:SecurityProfiles></wsmid:IdentifyResponse></s:Body></s:Envelope>"#,
        PROTOCOL_VERSION, PRODUCT_VENDOR, PRODUCT_VERSION
    )
}

/// A SOAP fault with a WSManFault message
pub fn fault_response(message: &str) -> String {
    format!(
        r#"<s:Envelope xmlns:s="http://www.w3.org/2003/05/soap-envelope" xmlns:a="http://schemas.xmlsoap.org/ws/2004/08/addressing"><s:Header><a:Action>http://schemas.dmtf.org/wbem/wsman/1/wsman/fault</a:Action></s:Header><s:Body><s:Fault><s:Code><s:Value>s:Sender</s:Value><s:Subcode><s:Value>w:InvalidSelectors</s:Value></s:Subcode></s:Code><s:Reason><s:Text xml:lang="en-US">The WS-Management service cannot process the request.</s:Text></s:Reason><s:Detail><f:WSManFault xmlns:f="http://schemas.microsoft.com/wbem/wsman/1/wsmanfault" Code="2150858843"><f:Message>{}</f:Message></f:WSManFault></s:Detail></s:Fault></s:Body></s:Envelope>"#,
        message
    )
}

// ============================================================================
// Frame helpers
// ============================================================================

/// Wrap a plaintext reply with the server context and frame it
pub fn encrypt_reply(server: &mut LoopbackContext, plaintext: &[u8]) -> Vec<u8> {
    let (ciphertext, signature) = server
        .wrap(plaintext)
        .expect("server context wraps the reply");
    frame::encode(&WrappedPayload {
        signature,
        ciphertext,
        original_length: plaintext.len(),
    })
    .expect("reply frame encodes")
}

/// Decode and unwrap a request captured by the mock server
pub fn decrypt_request(server: &mut LoopbackContext, request: &Request) -> Vec<u8> {
    let payload = frame::decode(&content_type(request), &request.body)
        .expect("request is a valid encrypted frame");
    let mut plaintext = server
        .unwrap(&payload.signature, &payload.ciphertext)
        .expect("server context unwraps the request");
    plaintext.truncate(payload.original_length);
    plaintext
}

/// `Content-Type` of a captured request
pub fn content_type(request: &Request) -> String {
    request
        .headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Count non-overlapping occurrences of `needle`
pub fn count_occurrences(haystack: &[u8], needle: &[u8]) -> usize {
    let mut count = 0;
    let mut i = 0;
    while i + needle.len() <= haystack.len() {
        if &haystack[i..i + needle.len()] == needle {
            count += 1;
            i += needle.len();
        } else {
            i += 1;
        }
    }
    count
}

// ============================================================================
// Fake WinRM endpoint
// ============================================================================

/// Server half of the loopback session, shared by every mounted reply
#[derive(Clone)]
pub struct FakeWinRm {
    context: Arc<Mutex<LoopbackContext>>,
}

impl FakeWinRm {
    pub fn new() -> Self {
        Self {
            context: Arc::new(Mutex::new(LoopbackContext::new("HTTP@127.0.0.1", KEY))),
        }
    }

    /// Reply to every encrypted request with `reply`, wrapped
    pub fn replying(&self, status: u16, reply: impl Into<String>) -> EncryptedReply {
        EncryptedReply {
            context: Arc::clone(&self.context),
            status,
            reply: reply.into(),
        }
    }

    /// Requests the server context has unwrapped so far
    pub fn received(&self) -> u64 {
        self.context.lock().receive_sequence()
    }
}

impl Default for FakeWinRm {
    fn default() -> Self {
        Self::new()
    }
}

/// Unwraps each request and answers with a wrapped reply
pub struct EncryptedReply {
    context: Arc<Mutex<LoopbackContext>>,
    status: u16,
    reply: String,
}

impl Respond for EncryptedReply {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let mut context = self.context.lock();
        let plaintext = decrypt_request(&mut context, request);
        assert!(
            parse_envelope(&plaintext).is_ok(),
            "client sent an invalid envelope"
        );
        let body = encrypt_reply(&mut context, self.reply.as_bytes());
        ResponseTemplate::new(self.status).set_body_raw(body, ENCRYPTED_CONTENT_TYPE)
    }
}

/// Plain SOAP reply
pub fn soap_reply(status: u16, body: impl Into<String>) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_raw(body.into().into_bytes(), SOAP_CONTENT_TYPE)
}

/// Mount a responder on `POST /wsman`
pub async fn mount_wsman<R: Respond + 'static>(server: &MockServer, responder: R) {
    Mock::given(method("POST"))
        .and(path("/wsman"))
        .respond_with(responder)
        .mount(server)
        .await;
}

// ============================================================================
// Clients
// ============================================================================

/// Endpoint URL of a mock server
pub fn wsman_endpoint(server: &MockServer) -> String {
    format!("{}/wsman", server.uri())
}

/// Client that always encrypts, using the client half of the loopback session
pub fn encrypted_client(server: &MockServer) -> TransportClient {
    TransportClient::builder(wsman_endpoint(server))
        .message_encryption(MessageEncryption::Always)
        .security_context(LoopbackContext::new("HTTP@127.0.0.1", KEY))
        .timeout(Duration::from_secs(10))
        .build()
        .expect("encrypted client builds")
}

/// Client without message encryption
pub fn plain_client(server: &MockServer) -> TransportClient {
    TransportClient::builder(wsman_endpoint(server))
        .message_encryption(MessageEncryption::Never)
        .timeout(Duration::from_secs(10))
        .build()
        .expect("plain client builds")
}
