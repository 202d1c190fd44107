//! Error types for the WinRM transport client.
//!
//! Every failure of the envelope, framing, security and transport layers is
//! surfaced as a [`WinRmError`]. Nothing is retried internally: an operation
//! either completes with a fully parsed result or fails with one of these.

use thiserror::Error;

/// Result type alias for WinRM operations.
pub type WinRmResult<T> = std::result::Result<T, WinRmError>;

/// The main error type for the WinRM transport client.
#[derive(Error, Debug)]
pub enum WinRmError {
    // ========================================================================
    // Envelope Errors
    // ========================================================================
    /// The document is not well-formed XML or is not a SOAP envelope.
    #[error("Malformed SOAP envelope: {0}")]
    MalformedEnvelope(String),

    /// The server answered with a SOAP fault.
    #[error("WS-Management fault {code}: {reason}")]
    Fault {
        /// Fault code value (e.g. `s:Sender`)
        code: String,
        /// Fault subcode value, if present
        subcode: Option<String>,
        /// Human-readable reason text
        reason: String,
    },

    /// The response envelope lacks the fields the operation expects.
    #[error("Unsupported response: {0}")]
    UnsupportedResponse(String),

    // ========================================================================
    // Framing Errors
    // ========================================================================
    /// The response content type is not the encrypted multipart protocol.
    #[error("Unexpected content type: {0}")]
    UnexpectedContentType(String),

    /// The multipart encrypted body could not be parsed.
    #[error("Malformed encrypted frame: {0}")]
    MalformedFrame(String),

    // ========================================================================
    // Security Errors
    // ========================================================================
    /// Signature verification failed or the security context is unusable.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// The HTTP exchange failed. `status` is `None` when no response arrived.
    #[error("{}", transport_message(.status, .message))]
    Transport {
        /// HTTP status code, if the server answered
        status: Option<u16>,
        /// Error message
        message: String,
    },

    /// Configuration is invalid or incomplete.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error (reading configuration or certificates).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn transport_message(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("Transport error (HTTP {}): {}", code, message),
        None => format!("Transport error: {}", message),
    }
}

impl WinRmError {
    /// Creates a transport error for a non-success HTTP status.
    pub fn http_status(status: u16, message: impl Into<String>) -> Self {
        Self::Transport {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Creates a transport error for a failure without an HTTP response.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            status: None,
            message: message.into(),
        }
    }

    /// Returns the HTTP status carried by a transport error.
    pub fn status(&self) -> Option<u16> {
        match self {
            WinRmError::Transport { status, .. } => *status,
            _ => None,
        }
    }

    /// Returns the error code for CLI exit status.
    pub fn exit_code(&self) -> i32 {
        match self {
            WinRmError::Transport { .. } => 2,
            WinRmError::AuthenticationFailed(_) => 3,
            WinRmError::MalformedEnvelope(_)
            | WinRmError::MalformedFrame(_)
            | WinRmError::UnexpectedContentType(_) => 4,
            WinRmError::Fault { .. } | WinRmError::UnsupportedResponse(_) => 5,
            WinRmError::InvalidConfig(_) => 6,
            WinRmError::Io(_) => 1,
        }
    }
}

impl From<reqwest::Error> for WinRmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            WinRmError::transport(format!("request timed out: {}", err))
        } else {
            match err.status() {
                Some(status) => WinRmError::http_status(status.as_u16(), err.to_string()),
                None => WinRmError::transport(err.to_string()),
            }
        }
    }
}

impl From<quick_xml::Error> for WinRmError {
    fn from(err: quick_xml::Error) -> Self {
        WinRmError::MalformedEnvelope(err.to_string())
    }
}
