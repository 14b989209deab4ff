//! `X-Hub-Signature-256` verification.

use crate::error::{ErrorKind, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const PREFIX: &str = "sha256=";

fn mac(secret: &[u8], body: &[u8]) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| exn::Exn::from(ErrorKind::Signature))?;
    mac.update(body);
    Ok(mac)
}

/// The header value a sender holding `secret` would attach to `body`.
pub fn sign(secret: &[u8], body: &[u8]) -> Result<String> {
    Ok(format!("{PREFIX}{}", hex::encode(mac(secret, body)?.finalize().into_bytes())))
}

/// Check `header` against the HMAC-SHA256 of the raw `body`.
///
/// The digest comparison is constant-time. An unset secret rejects every
/// delivery.
pub fn verify(secret: &[u8], body: &[u8], header: Option<&str>) -> Result<()> {
    if secret.is_empty() {
        tracing::warn!("webhook secret is not configured, rejecting delivery");
        exn::bail!(ErrorKind::Signature);
    }
    let expected = header
        .and_then(|h| h.trim().strip_prefix(PREFIX))
        .and_then(|digest| hex::decode(digest).ok())
        .ok_or_else(|| exn::Exn::from(ErrorKind::Signature))?;
    mac(secret, body)?.verify_slice(&expected).map_err(|_| exn::Exn::from(ErrorKind::Signature))
}
