//! WinRM multipart-encrypted framing
//!
//! A wrapped SOAP message travels as a two-part body delimited by the literal
//! boundary `Encrypted Boundary`:
//!
//! ```text
//! --Encrypted Boundary\r\n
//! Content-Type: application/HTTP-Kerberos-session-encrypted\r\n
//! OriginalContent: type=application/soap+xml;charset=UTF-8;Length=<n>\r\n
//! --Encrypted Boundary\r\n
//! Content-Type: application/octet-stream\r\n
//! <u32 LE signature length><signature><ciphertext>--Encrypted Boundary--\r\n
//! ```
//!
//! `Length` is the plaintext size before wrapping. The receiver truncates the
//! unwrapped plaintext to it, which strips any mechanism padding.

use once_cell::sync::Lazy;
use regex::bytes::Regex;
use tracing::trace;

use crate::error::{WinRmError, WinRmResult};

// ============================================================================
// Constants
// ============================================================================

/// Multipart boundary token
pub const BOUNDARY: &str = "Encrypted Boundary";

/// Session encryption protocol identifier
pub const KERBEROS_PROTOCOL: &str = "application/HTTP-Kerberos-session-encrypted";

/// Outer content type of an encrypted request
pub const ENCRYPTED_CONTENT_TYPE: &str = "multipart/encrypted;protocol=\"application/HTTP-Kerberos-session-encrypted\";boundary=\"Encrypted Boundary\"";

/// Content type of a plain SOAP message
pub const SOAP_CONTENT_TYPE: &str = "application/soap+xml;charset=UTF-8";

const CLOSING_BOUNDARY: &[u8] = b"--Encrypted Boundary--";

const SIGNATURE_LENGTH_PREFIX: usize = 4;

static SESSION_PART: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i-u)\A\s*--Encrypted Boundary\r?\n[ \t]*Content-Type:[ \t]*application/HTTP-Kerberos-session-encrypted[ \t]*\r?\n[ \t]*OriginalContent:[ \t]*([^\r\n]*)\r?\n",
    )
    .expect("session part pattern is valid")
});

static DATA_PART: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i-u)\A--Encrypted Boundary\r?\n[ \t]*Content-Type:[ \t]*application/octet-stream[ \t]*\r?\n")
        .expect("data part pattern is valid")
});

// ============================================================================
// Payload
// ============================================================================

/// A wrapped message: signature, ciphertext and the plaintext length
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedPayload {
    /// Mechanism signature (GSSAPI header token)
    pub signature: Vec<u8>,
    /// Encrypted message bytes
    pub ciphertext: Vec<u8>,
    /// Plaintext length before wrapping
    pub original_length: usize,
}

// ============================================================================
// Encode
// ============================================================================

/// Serialize a wrapped payload into the multipart-encrypted body.
///
/// Fails with [`WinRmError::MalformedFrame`] when the signature is too long
/// for its u32 length prefix.
pub fn encode(payload: &WrappedPayload) -> WinRmResult<Vec<u8>> {
    let signature_len = signature_length_prefix(payload.signature.len())?;
    let header = format!(
        "--{b}\r\nContent-Type: {p}\r\nOriginalContent: type=application/soap+xml;charset=UTF-8;Length={len}\r\n--{b}\r\nContent-Type: application/octet-stream\r\n",
        b = BOUNDARY,
        p = KERBEROS_PROTOCOL,
        len = payload.original_length,
    );

    let mut body = Vec::with_capacity(
        header.len()
            + SIGNATURE_LENGTH_PREFIX
            + payload.signature.len()
            + payload.ciphertext.len()
            + CLOSING_BOUNDARY.len()
            + 2,
    );
    body.extend_from_slice(header.as_bytes());
    body.extend_from_slice(&signature_len);
    body.extend_from_slice(&payload.signature);
    body.extend_from_slice(&payload.ciphertext);
    body.extend_from_slice(CLOSING_BOUNDARY);
    body.extend_from_slice(b"\r\n");
    Ok(body)
}

fn signature_length_prefix(len: usize) -> WinRmResult<[u8; SIGNATURE_LENGTH_PREFIX]> {
    u32::try_from(len)
        .map(u32::to_le_bytes)
        .map_err(|_| WinRmError::MalformedFrame(format!("signature of {} bytes is too long", len)))
}

// ============================================================================
// Decode
// ============================================================================

/// Check that a response content type announces Kerberos session encryption.
pub fn is_encrypted_content_type(content_type: &str) -> bool {
    let lowered = content_type.to_ascii_lowercase();
    let mut parts = lowered.split(';').map(str::trim);
    if parts.next() != Some("multipart/encrypted") {
        return false;
    }
    parts.any(|param| {
        param
            .strip_prefix("protocol=")
            .map(|v| v.trim_matches('"') == KERBEROS_PROTOCOL.to_ascii_lowercase())
            .unwrap_or(false)
    })
}

/// Parse and validate a multipart-encrypted response body.
pub fn decode(content_type: &str, body: &[u8]) -> WinRmResult<WrappedPayload> {
    if !is_encrypted_content_type(content_type) {
        return Err(WinRmError::UnexpectedContentType(format!(
            "expected multipart/encrypted with protocol {}, got '{}'",
            KERBEROS_PROTOCOL, content_type
        )));
    }

    let session = SESSION_PART.captures(body).ok_or_else(|| {
        WinRmError::MalformedFrame(format!(
            "missing {} part after the first encrypted boundary",
            KERBEROS_PROTOCOL
        ))
    })?;
    let original_length = parse_original_content(&session[1])?;
    let rest = &body[session.get(0).map(|m| m.end()).unwrap_or_default()..];

    let data = DATA_PART.find(rest).ok_or_else(|| {
        WinRmError::MalformedFrame("missing application/octet-stream part".to_string())
    })?;
    let rest = &rest[data.end()..];

    let end = rfind(rest, CLOSING_BOUNDARY).ok_or_else(|| {
        WinRmError::MalformedFrame(
            "Malformed server response, couldn't find encrypted boundary".to_string(),
        )
    })?;
    let data = &rest[..end];

    if data.len() < SIGNATURE_LENGTH_PREFIX {
        return Err(WinRmError::MalformedFrame(format!(
            "encrypted part is {} bytes, too short for the signature length",
            data.len()
        )));
    }
    let (prefix, data) = data.split_at(SIGNATURE_LENGTH_PREFIX);
    let signature_len = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
    if signature_len > data.len() {
        return Err(WinRmError::MalformedFrame(format!(
            "signature length {} exceeds the {} bytes of encrypted data",
            signature_len,
            data.len()
        )));
    }
    let (signature, ciphertext) = data.split_at(signature_len);

    trace!(
        original_length,
        signature_len,
        ciphertext_len = ciphertext.len(),
        "Decoded encrypted frame"
    );

    Ok(WrappedPayload {
        signature: signature.to_vec(),
        ciphertext: ciphertext.to_vec(),
        original_length,
    })
}

/// Parse `type=application/soap+xml;charset=UTF-8;Length=<n>`.
fn parse_original_content(value: &[u8]) -> WinRmResult<usize> {
    let value = String::from_utf8_lossy(value);
    let mut content_type = None;
    let mut length = None;

    for param in value.split(';').map(str::trim) {
        let Some((key, val)) = param.split_once('=') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "type" => content_type = Some(val.trim().to_ascii_lowercase()),
            "length" => {
                length = Some(val.trim().parse::<usize>().map_err(|e| {
                    WinRmError::MalformedFrame(format!("invalid OriginalContent length: {}", e))
                })?)
            }
            _ => {}
        }
    }

    if content_type.as_deref() != Some("application/soap+xml") {
        return Err(WinRmError::MalformedFrame(format!(
            "OriginalContent type is not application/soap+xml: '{}'",
            value
        )));
    }
    length.ok_or_else(|| {
        WinRmError::MalformedFrame(format!("OriginalContent has no Length: '{}'", value))
    })
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(signature: &[u8], ciphertext: &[u8]) -> WrappedPayload {
        WrappedPayload {
            signature: signature.to_vec(),
            ciphertext: ciphertext.to_vec(),
            original_length: ciphertext.len(),
        }
    }

    #[test]
    fn test_encode_layout() {
        let body = encode(&payload(b"SIG", b"DATA")).unwrap();
        let expected: Vec<u8> = [
            &b"--Encrypted Boundary\r\n"[..],
            b"Content-Type: application/HTTP-Kerberos-session-encrypted\r\n",
            b"OriginalContent: type=application/soap+xml;charset=UTF-8;Length=4\r\n",
            b"--Encrypted Boundary\r\n",
            b"Content-Type: application/octet-stream\r\n",
            &[3, 0, 0, 0],
            b"SIGDATA",
            b"--Encrypted Boundary--\r\n",
        ]
        .concat();
        assert_eq!(body, expected);
    }

    #[test]
    fn test_decode_roundtrip() {
        let original = payload(&[0x0a, 0x0d, 0x2d], b"--Encrypted Boundary in the data");
        let decoded = decode(ENCRYPTED_CONTENT_TYPE, &encode(&original).unwrap()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_decode_empty_ciphertext() {
        let original = payload(b"", b"");
        let decoded = decode(ENCRYPTED_CONTENT_TYPE, &encode(&original).unwrap()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_content_type_variants() {
        assert!(is_encrypted_content_type(ENCRYPTED_CONTENT_TYPE));
        assert!(is_encrypted_content_type(
            "Multipart/Encrypted; protocol=\"application/HTTP-Kerberos-session-encrypted\"; boundary=\"Encrypted Boundary\""
        ));
        assert!(is_encrypted_content_type(
            "multipart/encrypted;protocol=application/HTTP-Kerberos-session-encrypted"
        ));
        assert!(!is_encrypted_content_type(SOAP_CONTENT_TYPE));
        assert!(!is_encrypted_content_type(
            "multipart/encrypted;protocol=\"application/HTTP-SPNEGO-session-encrypted\""
        ));
    }

    #[test]
    fn test_decode_wrong_content_type() {
        let body = encode(&payload(b"s", b"c")).unwrap();
        assert!(matches!(
            decode(SOAP_CONTENT_TYPE, &body),
            Err(WinRmError::UnexpectedContentType(_))
        ));
    }

    #[test]
    fn test_decode_missing_closing_boundary() {
        let mut body = encode(&payload(b"s", b"ciphertext")).unwrap();
        body.truncate(body.len() - b"--Encrypted Boundary--\r\n".len());
        match decode(ENCRYPTED_CONTENT_TYPE, &body) {
            Err(WinRmError::MalformedFrame(msg)) => {
                assert!(msg.contains("couldn't find encrypted boundary"))
            }
            other => panic!("expected MalformedFrame, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_missing_session_part() {
        let body = b"--Encrypted Boundary\r\nContent-Type: application/octet-stream\r\n\x00\x00\x00\x00--Encrypted Boundary--\r\n";
        assert!(matches!(
            decode(ENCRYPTED_CONTENT_TYPE, body),
            Err(WinRmError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_decode_wrong_data_part_type() {
        let body = String::from_utf8(encode(&payload(b"s", b"c")).unwrap())
            .unwrap()
            .replace("application/octet-stream", "text/plain");
        assert!(matches!(
            decode(ENCRYPTED_CONTENT_TYPE, body.as_bytes()),
            Err(WinRmError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_decode_bad_original_content() {
        let body = String::from_utf8(encode(&payload(b"s", b"c")).unwrap())
            .unwrap()
            .replace(";Length=1", "");
        assert!(matches!(
            decode(ENCRYPTED_CONTENT_TYPE, body.as_bytes()),
            Err(WinRmError::MalformedFrame(_))
        ));

        let body = String::from_utf8(encode(&payload(b"s", b"c")).unwrap())
            .unwrap()
            .replace("application/soap+xml", "text/html");
        assert!(matches!(
            decode(ENCRYPTED_CONTENT_TYPE, body.as_bytes()),
            Err(WinRmError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_decode_truncated_signature() {
        let mut body = encode(&payload(b"signature", b"")).unwrap();
        // Claim a signature longer than the data.
        let prefix_at = body.len() - b"signature--Encrypted Boundary--\r\n".len() - 4;
        body[prefix_at] = 200;
        assert!(matches!(
            decode(ENCRYPTED_CONTENT_TYPE, &body),
            Err(WinRmError::MalformedFrame(_))
        ));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_signature_length_prefix_overflow() {
        assert_eq!(signature_length_prefix(3).unwrap(), [3, 0, 0, 0]);
        assert!(matches!(
            signature_length_prefix(u32::MAX as usize + 1),
            Err(WinRmError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_decode_accepts_bare_newlines() {
        let mut body = b"--Encrypted Boundary\nContent-Type: application/HTTP-Kerberos-session-encrypted\nOriginalContent: type=application/soap+xml;charset=UTF-8;Length=2\n--Encrypted Boundary\nContent-Type: application/octet-stream\n".to_vec();
        body.extend_from_slice(&[1, 0, 0, 0, b'S', b'h', b'i']);
        body.extend_from_slice(b"--Encrypted Boundary--\n");

        let decoded = decode(ENCRYPTED_CONTENT_TYPE, &body).unwrap();
        assert_eq!(decoded.signature, b"S");
        assert_eq!(decoded.ciphertext, b"hi");
        assert_eq!(decoded.original_length, 2);
    }

    #[test]
    fn test_decode_accepts_indented_part_headers() {
        // Windows servers indent the part headers with a tab.
        let mut body = b"--Encrypted Boundary\r\n\tContent-Type: application/HTTP-Kerberos-session-encrypted\r\n\tOriginalContent: type=application/soap+xml;charset=UTF-8;Length=2\r\n--Encrypted Boundary\r\n\tContent-Type: application/octet-stream\r\n".to_vec();
        body.extend_from_slice(&[1, 0, 0, 0, b'S', b'h', b'i']);
        body.extend_from_slice(b"--Encrypted Boundary--\r\n");

        let decoded = decode(ENCRYPTED_CONTENT_TYPE, &body).unwrap();
        assert_eq!(decoded.signature, b"S");
        assert_eq!(decoded.ciphertext, b"hi");
        assert_eq!(decoded.original_length, 2);
    }
}
