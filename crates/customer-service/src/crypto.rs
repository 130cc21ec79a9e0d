//! Password encoding for customer credentials.

use crate::config::{MAX_BCRYPT_COST, MIN_BCRYPT_COST};
use crate::errors::CustomerError;
use tracing::instrument;

/// Encodes and verifies customer passwords.
pub trait PasswordEncoder: Send + Sync {
    /// Hash a raw password.
    fn encode(&self, raw: &str) -> Result<String, CustomerError>;

    /// Check a raw password against a previously encoded one.
    fn matches(&self, raw: &str, encoded: &str) -> Result<bool, CustomerError>;
}

/// Bcrypt password encoder.
#[derive(Debug, Clone, Copy)]
pub struct BcryptPasswordEncoder {
    cost: u32,
}

impl BcryptPasswordEncoder {
    /// Create an encoder with the given cost factor.
    ///
    /// # Errors
    ///
    /// Returns `CustomerError::Crypto` if the cost is outside the accepted range.
    pub fn new(cost: u32) -> Result<Self, CustomerError> {
        if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&cost) {
            return Err(CustomerError::Crypto(format!(
                "Invalid bcrypt cost: {} (must be {}-{})",
                cost, MIN_BCRYPT_COST, MAX_BCRYPT_COST
            )));
        }
        Ok(Self { cost })
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }
}

impl PasswordEncoder for BcryptPasswordEncoder {
    #[instrument(skip_all)]
    fn encode(&self, raw: &str) -> Result<String, CustomerError> {
        bcrypt::hash(raw, self.cost)
            .map_err(|e| CustomerError::Crypto(format!("Password hashing failed: {}", e)))
    }

    #[instrument(skip_all)]
    fn matches(&self, raw: &str, encoded: &str) -> Result<bool, CustomerError> {
        bcrypt::verify(raw, encoded)
            .map_err(|e| CustomerError::Crypto(format!("Password verification failed: {}", e)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_BCRYPT_COST;

    #[test]
    fn test_encode_and_match() {
        let encoder = BcryptPasswordEncoder::new(DEFAULT_BCRYPT_COST).unwrap();
        let hash = encoder.encode("correct horse").expect("hashing should succeed");

        assert_ne!(hash, "correct horse");
        assert!(encoder.matches("correct horse", &hash).unwrap());
        assert!(!encoder.matches("wrong horse", &hash).unwrap());
    }

    #[test]
    fn test_hash_carries_configured_cost() {
        let encoder = BcryptPasswordEncoder::new(DEFAULT_BCRYPT_COST).unwrap();
        let hash = encoder.encode("password").unwrap();

        // Bcrypt hash format: $2b$<cost>$<salt+hash>
        let parts: Vec<&str> = hash.split('$').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[2], format!("{:02}", DEFAULT_BCRYPT_COST));
    }

    #[test]
    fn test_hashes_are_salted() {
        let encoder = BcryptPasswordEncoder::new(DEFAULT_BCRYPT_COST).unwrap();
        let first = encoder.encode("password").unwrap();
        let second = encoder.encode("password").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_rejects_out_of_range_cost() {
        assert!(BcryptPasswordEncoder::new(MIN_BCRYPT_COST - 1).is_err());
        assert!(BcryptPasswordEncoder::new(MAX_BCRYPT_COST + 1).is_err());
    }

    #[test]
    fn test_invalid_hash_is_crypto_error() {
        let encoder = BcryptPasswordEncoder::new(DEFAULT_BCRYPT_COST).unwrap();
        let err = encoder.matches("password", "not-a-valid-hash").unwrap_err();
        assert!(
            matches!(err, CustomerError::Crypto(msg) if msg.starts_with("Password verification failed:"))
        );
    }
}
