use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Generate the HMAC-SHA256 hex digest of a raw callback body.
///
/// The payment gateway signs the exact bytes it sends; any re-serialization
/// on our side would break verification, so callers must pass the body
/// untouched.
pub fn sign_payload(secret: &str, body: &str) -> Result<String, anyhow::Error> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("Invalid key length: {}", e))?;

    mac.update(body.as_bytes());
    let result = mac.finalize();

    Ok(hex::encode(result.into_bytes()))
}

/// Verify a callback signature using constant-time comparison.
pub fn verify_payload(secret: &str, body: &str, signature: &str) -> Result<bool, anyhow::Error> {
    let expected = sign_payload(secret, body)?;

    let expected_bytes = expected.as_bytes();
    let signature_bytes = signature.as_bytes();

    if expected_bytes.len() != signature_bytes.len() {
        return Ok(false);
    }

    Ok(expected_bytes.ct_eq(signature_bytes).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let secret = "webhook_secret_key";
        let body = r#"{"eventType":"PAYMENT_APPROVED","data":{"orderId":"RNT-1"}}"#;

        let signature = sign_payload(secret, body).unwrap();
        assert!(!signature.is_empty());

        let is_valid = verify_payload(secret, body, &signature).unwrap();
        assert!(is_valid);
    }

    #[test]
    fn test_invalid_signature() {
        let secret = "webhook_secret_key";
        let body = r#"{"eventType":"PAYMENT_APPROVED"}"#;

        let signature = sign_payload(secret, body).unwrap();
        let invalid_signature = format!("a{}", &signature[1..]);

        let is_valid = verify_payload(secret, body, &invalid_signature).unwrap();
        assert!(!is_valid);
    }

    #[test]
    fn test_tampered_body() {
        let secret = "webhook_secret_key";
        let body = r#"{"data":{"totalAmount":64000}}"#;

        let signature = sign_payload(secret, body).unwrap();

        let modified_body = r#"{"data":{"totalAmount":1}}"#;
        let is_valid = verify_payload(secret, modified_body, &signature).unwrap();
        assert!(!is_valid);
    }

    #[test]
    fn test_wrong_length_signature_rejected() {
        let secret = "webhook_secret_key";
        let body = "{}";

        let is_valid = verify_payload(secret, body, "deadbeef").unwrap();
        assert!(!is_valid);
    }
}
