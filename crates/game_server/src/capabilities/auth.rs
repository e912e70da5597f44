//! Signed session tokens.
//!
//! A token has the form `<wallet>.<expiry-unix-secs>.<signature>` where the
//! signature is the hex HMAC-SHA256 of `<wallet>.<expiry>` under a secret
//! shared with the wallet-signature service that issues tokens.

use async_trait::async_trait;
use gambit_rooms::{TimeSource, WalletAddress};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use super::TokenVerifier;
use crate::error::ExternalError;

const BLOCK_SIZE: usize = 64;

pub struct SharedSecretVerifier {
    secret: Vec<u8>,
    time: Arc<dyn TimeSource>,
}

impl SharedSecretVerifier {
    pub fn new(secret: impl Into<Vec<u8>>, time: Arc<dyn TimeSource>) -> Self {
        Self {
            secret: secret.into(),
            time,
        }
    }

    /// Issues a token for `wallet` valid until `expires_at` (unix seconds).
    pub fn issue(&self, wallet: &WalletAddress, expires_at: u64) -> String {
        let claims = format!("{wallet}.{expires_at}");
        let signature = hex::encode(hmac_sha256(&self.secret, claims.as_bytes()));
        format!("{claims}.{signature}")
    }
}

#[async_trait]
impl TokenVerifier for SharedSecretVerifier {
    async fn verify(&self, token: &str) -> Result<WalletAddress, ExternalError> {
        let malformed = || ExternalError::Rejected("malformed token".to_string());

        let (claims, signature) = token.rsplit_once('.').ok_or_else(malformed)?;
        let (wallet, expiry) = claims.rsplit_once('.').ok_or_else(malformed)?;
        let expires_at: u64 = expiry.parse().map_err(|_| malformed())?;
        let provided = hex::decode(signature).map_err(|_| malformed())?;

        let expected = hmac_sha256(&self.secret, claims.as_bytes());
        if !constant_time_eq(&expected, &provided) {
            return Err(ExternalError::Rejected("invalid token signature".to_string()));
        }
        if self.time.now_ms() / 1000 >= expires_at {
            return Err(ExternalError::Rejected("token expired".to_string()));
        }
        WalletAddress::parse(wallet).map_err(|_| malformed())
    }
}

/// Stand-in used when no shared secret is configured. Every token is
/// refused, so sessions stay anonymous.
#[derive(Debug, Default)]
pub struct DisabledVerifier;

#[async_trait]
impl TokenVerifier for DisabledVerifier {
    async fn verify(&self, _token: &str) -> Result<WalletAddress, ExternalError> {
        Err(ExternalError::Unavailable(
            "authentication is not configured".to_string(),
        ))
    }
}

/// RFC 2104 HMAC over SHA-256.
fn hmac_sha256(key: &[u8], message: &[u8]) -> [u8; 32] {
    let mut block = [0u8; BLOCK_SIZE];
    if key.len() > BLOCK_SIZE {
        block[..32].copy_from_slice(&Sha256::digest(key));
    } else {
        block[..key.len()].copy_from_slice(key);
    }

    let mut inner = Sha256::new();
    inner.update(block.map(|b| b ^ 0x36));
    inner.update(message);
    let inner = inner.finalize();

    let mut outer = Sha256::new();
    outer.update(block.map(|b| b ^ 0x5c));
    outer.update(inner);
    let mut mac = [0u8; 32];
    mac.copy_from_slice(&outer.finalize());
    mac
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
