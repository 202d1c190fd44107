//! Deterministic loopback security context.
//!
//! Encrypts with a single-byte XOR key and signs with the 8-byte big-endian
//! sequence number of the message. Send and receive counters are independent,
//! as in GSSAPI, so two loopback contexts with the same key talk to each
//! other the way a client and server context do. It provides no security.

use crate::error::{WinRmError, WinRmResult};

use super::SecurityContext;

const SIGNATURE_LEN: usize = 8;

/// XOR-keyed context with strict sequence checking
#[derive(Debug, Clone)]
pub struct LoopbackContext {
    target_name: String,
    key: u8,
    send_seq: u64,
    recv_seq: u64,
    established: bool,
}

impl LoopbackContext {
    /// Create an established context
    pub fn new(target_name: impl Into<String>, key: u8) -> Self {
        Self {
            target_name: target_name.into(),
            key,
            send_seq: 0,
            recv_seq: 0,
            established: true,
        }
    }

    /// Create a context whose negotiation never completed
    pub fn unestablished(target_name: impl Into<String>) -> Self {
        Self {
            established: false,
            ..Self::new(target_name, 0)
        }
    }

    /// Sequence number the next wrap will use
    pub fn send_sequence(&self) -> u64 {
        self.send_seq
    }

    /// Sequence number the next unwrap expects
    pub fn receive_sequence(&self) -> u64 {
        self.recv_seq
    }

    fn xor(&self, data: &[u8]) -> Vec<u8> {
        data.iter().map(|b| b ^ self.key).collect()
    }

    fn not_established(&self) -> WinRmError {
        WinRmError::AuthenticationFailed(format!(
            "loopback context for {} is not established",
            self.target_name
        ))
    }
}

impl SecurityContext for LoopbackContext {
    fn target_name(&self) -> &str {
        &self.target_name
    }

    fn is_established(&self) -> bool {
        self.established
    }

    fn wrap(&mut self, plaintext: &[u8]) -> WinRmResult<(Vec<u8>, Vec<u8>)> {
        if !self.established {
            return Err(self.not_established());
        }
        let signature = self.send_seq.to_be_bytes().to_vec();
        self.send_seq += 1;
        Ok((self.xor(plaintext), signature))
    }

    fn unwrap(&mut self, signature: &[u8], ciphertext: &[u8]) -> WinRmResult<Vec<u8>> {
        if !self.established {
            return Err(self.not_established());
        }
        let seq: [u8; SIGNATURE_LEN] = signature.try_into().map_err(|_| {
            WinRmError::AuthenticationFailed(format!(
                "signature is {} bytes, expected {}",
                signature.len(),
                SIGNATURE_LEN
            ))
        })?;
        let seq = u64::from_be_bytes(seq);
        if seq != self.recv_seq {
            return Err(WinRmError::AuthenticationFailed(format!(
                "message sequence {} out of order, expected {}",
                seq, self.recv_seq
            )));
        }
        self.recv_seq += 1;
        Ok(self.xor(ciphertext))
    }
}
