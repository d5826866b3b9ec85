//! Rapyd request signing.
//!
//! ```text
//! to_sign   = lower(method) + path + salt + timestamp + access_key + secret_key + body
//! signature = base64( hex( HMAC-SHA256(secret_key, to_sign) ) )
//! ```
//!
//! `path` includes the query string and `body` is the exact JSON sent (empty
//! for bodyless requests).

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

use crate::ProviderError;

type HmacSha256 = Hmac<Sha256>;

/// Inputs of one signed request, minus the credentials.
#[derive(Debug, Clone, Copy)]
pub struct SignInput<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub salt: &'a str,
    pub timestamp: &'a str,
    pub body: &'a str,
}

pub fn sign(input: &SignInput<'_>, access_key: &str, secret_key: &str) -> Result<String, ProviderError> {
    let to_sign = format!(
        "{}{}{}{}{}{}{}",
        input.method.to_ascii_lowercase(),
        input.path,
        input.salt,
        input.timestamp,
        access_key,
        secret_key,
        input.body,
    );

    let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes())
        .map_err(|e| ProviderError::Config(format!("rapyd hmac key rejected: {e}")))?;
    mac.update(to_sign.as_bytes());
    let hex_digest = hex::encode(mac.finalize().into_bytes());

    Ok(STANDARD.encode(hex_digest.as_bytes()))
}

/// 16 hex chars from the OS CSPRNG; the nanosecond clock if that fails.
pub fn generate_salt() -> String {
    let mut buf = [0u8; 8];
    match OsRng.try_fill_bytes(&mut buf) {
        Ok(()) => hex::encode(buf),
        Err(e) => {
            tracing::warn!(error = %e, "os rng unavailable, salting rapyd request from clock");
            let nanos = chrono::Utc::now()
                .timestamp_nanos_opt()
                .unwrap_or_default();
            nanos.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input<'a>(body: &'a str) -> SignInput<'a> {
        SignInput {
            method: "POST",
            path: "/v1/checkout",
            salt: "0123456789abcdef",
            timestamp: "1700000000",
            body,
        }
    }

    fn reference(to_sign: &str, secret: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(to_sign.as_bytes());
        STANDARD.encode(hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn signature_matches_concatenation_rule() {
        let sig = sign(&input(r#"{"amount":10}"#), "ak", "sk").unwrap();
        let expected = reference(
            r#"post/v1/checkout0123456789abcdef1700000000aksk{"amount":10}"#,
            "sk",
        );
        assert_eq!(sig, expected);

        // base64 of a 64-char hex digest.
        let decoded = STANDARD.decode(&sig).unwrap();
        assert_eq!(decoded.len(), 64);
        assert!(decoded.iter().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn signature_is_deterministic_and_input_sensitive() {
        let a = sign(&input(""), "ak", "sk").unwrap();
        let b = sign(&input(""), "ak", "sk").unwrap();
        assert_eq!(a, b);

        let mut other_path = input("");
        other_path.path = "/v1/checkout?x=1";
        assert_ne!(a, sign(&other_path, "ak", "sk").unwrap());

        let mut other_salt = input("");
        other_salt.salt = "fedcba9876543210";
        assert_ne!(a, sign(&other_salt, "ak", "sk").unwrap());

        assert_ne!(a, sign(&input("{}"), "ak", "sk").unwrap());
        assert_ne!(a, sign(&input(""), "ak2", "sk").unwrap());
        assert_ne!(a, sign(&input(""), "ak", "sk2").unwrap());
    }

    #[test]
    fn method_is_lowercased() {
        let mut lower = input("");
        lower.method = "post";
        assert_eq!(
            sign(&input(""), "ak", "sk").unwrap(),
            sign(&lower, "ak", "sk").unwrap()
        );
    }

    #[test]
    fn salt_is_sixteen_hex_chars() {
        let s = generate_salt();
        assert_eq!(s.len(), 16);
        assert!(s.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(s, generate_salt());
    }
}
