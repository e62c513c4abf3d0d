use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Verify a hex-encoded HMAC-SHA256 signature over `payload`.
///
/// The comparison is constant-time (`Mac::verify_slice` rejects on length
/// mismatch before comparing). Any internal error, such as malformed hex in
/// the signature header, yields `false` with a logged warning rather than an
/// error: a bad signature and a malformed one are the same outcome to the
/// caller.
pub fn verify(payload: &[u8], signature_hex: &str, secret: &[u8]) -> bool {
    let expected = match hex::decode(signature_hex.trim()) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "signature header is not valid hex");
            return false;
        }
    };

    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(e) => {
            tracing::warn!(error = %e, "failed to initialize hmac from secret");
            return false;
        }
    };
    mac.update(payload);

    mac.verify_slice(&expected).is_ok()
}

/// Hex-encoded HMAC-SHA256 of `payload`. Counterpart of [`verify`], used to
/// produce signatures in tests and tooling.
pub fn sign(payload: &[u8], secret: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("hmac accepts any key length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-webhook-secret";

    #[test]
    fn accepts_signature_from_correct_secret() {
        let payload = b"order_ABC|pay_XYZ";
        let sig = sign(payload, SECRET);
        assert!(verify(payload, &sig, SECRET));
    }

    #[test]
    fn rejects_signature_from_wrong_secret() {
        let payload = b"order_ABC|pay_XYZ";
        let sig = sign(payload, b"some-other-secret");
        assert!(!verify(payload, &sig, SECRET));
    }

    #[test]
    fn rejects_single_bit_flip() {
        let payload = b"{\"event\":\"payment.captured\"}";
        let sig = sign(payload, SECRET);
        let mut bytes = hex::decode(&sig).unwrap();
        bytes[0] ^= 0x01;
        let flipped = hex::encode(bytes);
        assert!(!verify(payload, &flipped, SECRET));
    }

    #[test]
    fn rejects_modified_payload() {
        let sig = sign(b"{\"amount\":100}", SECRET);
        assert!(!verify(b"{\"amount\":999}", &sig, SECRET));
    }

    #[test]
    fn malformed_hex_is_false_not_error() {
        assert!(!verify(b"payload", "not-hex-at-all", SECRET));
        assert!(!verify(b"payload", "", SECRET));
    }

    #[test]
    fn truncated_signature_is_rejected() {
        let sig = sign(b"payload", SECRET);
        assert!(!verify(b"payload", &sig[..32], SECRET));
    }
}
