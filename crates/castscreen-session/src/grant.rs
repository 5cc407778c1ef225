//! Screen capture grants.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::SessionError;

/// Request code used when asking the user for capture permission.
pub const SCREEN_CAPTURE_REQUEST: i32 = 9000;
/// Result code of a granted permission request.
pub const RESULT_OK: i32 = -1;
/// Result code of a dismissed permission request.
pub const RESULT_CANCELED: i32 = 0;

/// Stable fingerprint of a grant payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GrantToken(String);

impl GrantToken {
    fn from_payload(payload: &[u8]) -> Self {
        let digest = Sha256::digest(payload);
        let hex: String = digest[..8].iter().map(|b| format!("{b:02x}")).collect();
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GrantToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Permission to capture the screen, as delivered by the permission flow.
///
/// Deliberately not `Clone`: a grant is consumed by exactly one
/// `CaptureSource`.
#[derive(Debug)]
pub struct CaptureGrant {
    result_code: i32,
    payload: Vec<u8>,
    token: GrantToken,
}

impl CaptureGrant {
    pub fn new(result_code: i32, payload: Vec<u8>) -> Self {
        let token = GrantToken::from_payload(&payload);
        Self {
            result_code,
            payload,
            token,
        }
    }

    pub fn result_code(&self) -> i32 {
        self.result_code
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn token(&self) -> &GrantToken {
        &self.token
    }

    /// The user granted permission.
    pub fn is_success(&self) -> bool {
        self.result_code == RESULT_OK
    }

    /// Granted and carrying a payload the platform can redeem.
    pub fn is_valid(&self) -> bool {
        self.is_success() && !self.payload.is_empty()
    }
}

/// Process-lifetime record of consumed grants.
#[derive(Debug, Clone, Default)]
pub struct GrantLedger {
    consumed: Arc<Mutex<HashSet<GrantToken>>>,
}

impl GrantLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `token` consumed; fails if it already was.
    pub fn consume(&self, token: &GrantToken) -> Result<(), SessionError> {
        let mut consumed = self.consumed.lock().unwrap_or_else(PoisonError::into_inner);
        if !consumed.insert(token.clone()) {
            return Err(SessionError::GrantReused(token.clone()));
        }
        debug!(grant = %token, "Capture grant consumed");
        Ok(())
    }

    pub fn is_consumed(&self, token: &GrantToken) -> bool {
        self.consumed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(token)
    }
}
