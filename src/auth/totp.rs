//! TOTP (RFC 6238) second factor.
//!
//! Login verification uses the standard parameters (SHA-1, 6 digits, 30s
//! period) and accepts one step of clock skew in either direction.

use anyhow::{Result, anyhow};
use data_encoding::{BASE32, BASE32_NOPAD};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha1 = Hmac<Sha1>;
type HmacSha256 = Hmac<Sha256>;

/// Supported TOTP HMAC algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TotpAlgorithm {
    Sha1,
    Sha256,
}

/// Default period in seconds.
pub const PERIOD: u32 = 30;

/// Default code length.
pub const DIGITS: u8 = 6;

/// Generate a fresh 160-bit seed, base32-encoded without padding.
pub fn generate_secret() -> String {
    let mut seed = [0u8; 20];
    rand::rng().fill_bytes(&mut seed);
    BASE32_NOPAD.encode(&seed)
}

/// Build the `otpauth://` provisioning URI for authenticator apps.
pub fn provisioning_uri(secret_base32: &str, username: &str, issuer: &str) -> String {
    format!("otpauth://totp/{issuer}:{username}?secret={secret_base32}&issuer={issuer}")
}

/// Generate a TOTP code for the given timestamp.
pub fn generate_code(
    secret_base32: &str,
    algorithm: TotpAlgorithm,
    digits: u8,
    period: u32,
    timestamp: i64,
) -> Result<String> {
    if digits != 6 && digits != 8 {
        return Err(anyhow!("TOTP digits must be 6 or 8"));
    }
    if period == 0 {
        return Err(anyhow!("TOTP period must be greater than 0"));
    }

    let secret = decode_secret(secret_base32)?;
    let counter = (timestamp.max(0) as u64) / period as u64;
    let counter_bytes = counter.to_be_bytes();

    let digest = match algorithm {
        TotpAlgorithm::Sha1 => {
            let mut mac = HmacSha1::new_from_slice(&secret)
                .map_err(|_| anyhow!("Invalid TOTP secret"))?;
            mac.update(&counter_bytes);
            mac.finalize().into_bytes().to_vec()
        }
        TotpAlgorithm::Sha256 => {
            let mut mac = HmacSha256::new_from_slice(&secret)
                .map_err(|_| anyhow!("Invalid TOTP secret"))?;
            mac.update(&counter_bytes);
            mac.finalize().into_bytes().to_vec()
        }
    };

    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    if offset + 3 >= digest.len() {
        return Err(anyhow!("Invalid TOTP digest offset"));
    }

    let binary = ((digest[offset] as u32 & 0x7f) << 24)
        | ((digest[offset + 1] as u32) << 16)
        | ((digest[offset + 2] as u32) << 8)
        | (digest[offset + 3] as u32);

    let modulo = 10u32.pow(digits as u32);
    let code = binary % modulo;
    Ok(format!("{:0width$}", code, width = digits as usize))
}

/// Verify a submitted code against the previous, current and next step.
pub fn verify_code(secret_base32: &str, code: &str, timestamp: i64) -> bool {
    let code = code.trim();
    if code.len() != DIGITS as usize {
        return false;
    }

    for step in [-1_i64, 0, 1] {
        let at = timestamp + step * PERIOD as i64;
        if let Ok(expected) = generate_code(secret_base32, TotpAlgorithm::Sha1, DIGITS, PERIOD, at)
            && bool::from(expected.as_bytes().ct_eq(code.as_bytes()))
        {
            return true;
        }
    }
    false
}

fn decode_secret(secret_base32: &str) -> Result<Vec<u8>> {
    let normalized = secret_base32
        .trim()
        .replace([' ', '-'], "")
        .to_ascii_uppercase();

    let decoded = BASE32_NOPAD
        .decode(normalized.as_bytes())
        .or_else(|_| BASE32.decode(normalized.as_bytes()))
        .map_err(|_| anyhow!("TOTP secret must be valid base32"))?;

    if decoded.is_empty() {
        return Err(anyhow!("TOTP secret cannot decode to empty bytes"));
    }

    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc_sha1_vectors() {
        let secret = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";
        assert_eq!(
            generate_code(secret, TotpAlgorithm::Sha1, 8, 30, 59).unwrap(),
            "94287082"
        );
        assert_eq!(
            generate_code(secret, TotpAlgorithm::Sha1, 8, 30, 1_111_111_109).unwrap(),
            "07081804"
        );
    }

    #[test]
    fn test_rfc_sha256_vectors() {
        let secret = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQGEZA";
        assert_eq!(
            generate_code(secret, TotpAlgorithm::Sha256, 8, 30, 59).unwrap(),
            "46119246"
        );
        assert_eq!(
            generate_code(secret, TotpAlgorithm::Sha256, 8, 30, 1_111_111_109).unwrap(),
            "68084774"
        );
    }

    #[test]
    fn test_verify_accepts_one_step_of_skew() {
        let secret = generate_secret();
        let now = 1_700_000_000_i64;

        let previous = generate_code(&secret, TotpAlgorithm::Sha1, DIGITS, PERIOD, now - 30).unwrap();
        let current = generate_code(&secret, TotpAlgorithm::Sha1, DIGITS, PERIOD, now).unwrap();
        let next = generate_code(&secret, TotpAlgorithm::Sha1, DIGITS, PERIOD, now + 30).unwrap();
        let stale = generate_code(&secret, TotpAlgorithm::Sha1, DIGITS, PERIOD, now - 90).unwrap();

        assert!(verify_code(&secret, &previous, now));
        assert!(verify_code(&secret, &current, now));
        assert!(verify_code(&secret, &next, now));
        // Codes two steps away may collide by chance only; the window itself
        // must not accept them.
        if stale != previous && stale != current && stale != next {
            assert!(!verify_code(&secret, &stale, now));
        }
    }

    #[test]
    fn test_verify_rejects_malformed_codes() {
        let secret = generate_secret();
        assert!(!verify_code(&secret, "", 0));
        assert!(!verify_code(&secret, "12345", 0));
        assert!(!verify_code(&secret, "1234567", 0));
    }

    #[test]
    fn test_generated_secret_is_decodable() {
        let secret = generate_secret();
        assert!(decode_secret(&secret).is_ok());
        assert_eq!(decode_secret(&secret).unwrap().len(), 20);
    }

    #[test]
    fn test_provisioning_uri_shape() {
        let uri = provisioning_uri("JBSWY3DPEHPK3PXP", "alice", "scopekeep");
        assert!(uri.starts_with("otpauth://totp/scopekeep:alice?"));
        assert!(uri.contains("secret=JBSWY3DPEHPK3PXP"));
    }
}
