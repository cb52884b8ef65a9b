//! Room token issuance and verification: an opaque signed string that
//! binds a `matchId` to the `userId` it was issued for (`spec.md` §6).
//!
//! Grounded on `examples/Humans-Not-Required-local-agent-chat`'s
//! `hmac`+`sha2`+`hex` pairing-token pattern — no `moltis` crate signs
//! an opaque bearer token of this shape (its device pairing issues
//! random strings, not HMAC-bound claims), so this one construction is
//! borrowed from that repo rather than the teacher.

use crate::RoomTokenClaims;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("invalid signing key")]
    InvalidKey,
    #[error("malformed token")]
    Malformed,
    #[error("signature verification failed")]
    BadSignature,
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

fn mac_over(secret: &[u8], payload_hex: &str) -> Result<HmacSha256, TokenError> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| TokenError::InvalidKey)?;
    mac.update(payload_hex.as_bytes());
    Ok(mac)
}

/// Issue a token binding `claims` to `secret`. Format:
/// `<hex claims json>.<hex hmac-sha256>`.
pub fn issue(secret: &[u8], claims: &RoomTokenClaims) -> Result<String, TokenError> {
    let payload_hex = hex::encode(serde_json::to_vec(claims)?);
    let sig = mac_over(secret, &payload_hex)?.finalize().into_bytes();
    Ok(format!("{payload_hex}.{}", hex::encode(sig)))
}

/// Verify `token` against `secret` and return its claims on success.
pub fn verify(secret: &[u8], token: &str) -> Result<RoomTokenClaims, TokenError> {
    let (payload_hex, sig_hex) = token.split_once('.').ok_or(TokenError::Malformed)?;
    let sig = hex::decode(sig_hex).map_err(|_| TokenError::Malformed)?;
    mac_over(secret, payload_hex)?
        .verify_slice(&sig)
        .map_err(|_| TokenError::BadSignature)?;
    let payload = hex::decode(payload_hex).map_err(|_| TokenError::Malformed)?;
    Ok(serde_json::from_slice(&payload)?)
}
