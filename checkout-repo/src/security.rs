//! Keyed-MAC helpers for payout webhook authentication.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Computes the expected `hashed_order` for a withdrawal id:
/// hex(HMAC-SHA256(secret, withdrawal_id)).
pub fn sign_withdrawal_id(secret: &str, withdrawal_id: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(withdrawal_id.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a provider-supplied MAC using constant-time comparison.
pub fn verify_withdrawal_mac(secret: &str, withdrawal_id: &str, supplied_hex: &str) -> bool {
    let expected = sign_withdrawal_id(secret, withdrawal_id);
    expected.as_bytes().ct_eq(supplied_hex.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_is_deterministic_hex() {
        let mac = sign_withdrawal_id("secret", "wd-123");
        assert_eq!(mac.len(), 64);
        assert_eq!(mac, sign_withdrawal_id("secret", "wd-123"));
        assert!(mac.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn test_verify_roundtrip() {
        let mac = sign_withdrawal_id("secret", "wd-123");
        assert!(verify_withdrawal_mac("secret", "wd-123", &mac));
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        let mac = sign_withdrawal_id("other-secret", "wd-123");
        assert!(!verify_withdrawal_mac("secret", "wd-123", &mac));
    }

    #[test]
    fn test_verify_rejects_different_id() {
        let mac = sign_withdrawal_id("secret", "wd-123");
        assert!(!verify_withdrawal_mac("secret", "wd-124", &mac));
    }

    #[test]
    fn test_verify_rejects_truncated_mac() {
        let mac = sign_withdrawal_id("secret", "wd-123");
        assert!(!verify_withdrawal_mac("secret", "wd-123", &mac[..32]));
    }
}
