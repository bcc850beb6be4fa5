//! Session credential signing and verification.

use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation, decode, encode,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use usergate_core::{Identity, Role};

use super::AuthError;

/// JWT claims. Deliberately minimal: no profile data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (account ID).
    pub sub: String,
    /// Account role.
    pub role: Role,
    /// Issued at (Unix timestamp).
    pub iat: i64,
    /// Expiration (Unix timestamp).
    pub exp: i64,
    /// Random credential ID, so two logins never mint the same token.
    pub jti: String,
}

impl Claims {
    /// The identity these claims carry.
    #[must_use]
    pub fn identity(&self) -> Identity {
        Identity::new(self.sub.clone(), self.role)
    }

    /// Expiration as a timestamp.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_default()
    }
}

/// A freshly signed credential.
#[derive(Debug, Clone)]
pub struct IssuedCredential {
    /// Compact JWT.
    pub token: String,
    /// Expiration.
    pub expires_at: DateTime<Utc>,
}

/// JWT manager for creating and validating session credentials.
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl JwtManager {
    /// Create a new JWT manager with a secret key.
    ///
    /// The secret should be at least 32 bytes.
    #[must_use]
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl,
        }
    }

    /// Create a JWT manager from a hex-encoded secret.
    ///
    /// # Errors
    ///
    /// Returns error if hex decoding fails.
    pub fn from_hex_secret(hex_secret: &str, ttl: Duration) -> Result<Self, AuthError> {
        let secret = hex::decode(hex_secret)
            .map_err(|e| AuthError::Config(format!("Invalid hex secret: {e}")))?;
        Ok(Self::new(&secret, ttl))
    }

    /// Generate a random 256-bit secret key.
    #[must_use]
    pub fn generate_secret() -> [u8; 32] {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        bytes
    }

    /// Generate a random secret as hex string.
    #[must_use]
    pub fn generate_hex_secret() -> String {
        hex::encode(Self::generate_secret())
    }

    /// Credential validity window.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sign a credential for `identity`, valid from now.
    ///
    /// # Errors
    ///
    /// Returns error if token encoding fails.
    pub fn issue(&self, identity: &Identity) -> Result<IssuedCredential, AuthError> {
        self.issue_at(identity, Utc::now())
    }

    /// Sign a credential for `identity` as if issued at `issued_at`.
    ///
    /// # Errors
    ///
    /// Returns error if token encoding fails.
    pub fn issue_at(
        &self,
        identity: &Identity,
        issued_at: DateTime<Utc>,
    ) -> Result<IssuedCredential, AuthError> {
        let expires_at = issued_at + chrono::Duration::from_std(self.ttl).unwrap_or_default();

        let mut jti = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut jti);

        let claims = Claims {
            sub: identity.id.to_string(),
            role: identity.role,
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            jti: hex::encode(jti),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Token(format!("Encoding failed: {e}")))?;

        Ok(IssuedCredential { token, expires_at })
    }

    /// Check signature and expiry, returning the claims.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotAuthenticated` for any invalid token.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let data: TokenData<Claims> = decode(token, &self.decoding_key, &self.validation)
            .map_err(|e| {
                tracing::debug!(reason = %e, "Session credential rejected");
                AuthError::NotAuthenticated
            })?;
        Ok(data.claims)
    }
}

impl std::fmt::Debug for JwtManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtManager")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_manager() -> JwtManager {
        JwtManager::new(&JwtManager::generate_secret(), Duration::from_secs(3600))
    }

    #[test]
    fn test_generate_secret() {
        let secret1 = JwtManager::generate_secret();
        let secret2 = JwtManager::generate_secret();
        assert_ne!(secret1, secret2);
        assert_eq!(secret1.len(), 32);
    }

    #[test]
    fn test_issue_verify_round_trip() {
        let manager = create_manager();
        let identity = Identity::new("acct_123", Role::Admin);
        let issued = manager.issue(&identity).unwrap();

        assert!(issued.expires_at > Utc::now());
        let claims = manager.verify(&issued.token).unwrap();
        assert_eq!(claims.identity(), identity);
        assert_eq!(claims.expires_at().timestamp(), issued.expires_at.timestamp());
    }

    #[test]
    fn test_tokens_are_unique() {
        let manager = create_manager();
        let identity = Identity::new("acct_123", Role::User);
        let a = manager.issue(&identity).unwrap();
        let b = manager.issue(&identity).unwrap();
        assert_ne!(a.token, b.token);
    }

    #[test]
    fn test_expired_token() {
        let manager = create_manager();
        let identity = Identity::new("acct_123", Role::User);
        let issued = manager
            .issue_at(&identity, Utc::now() - chrono::Duration::hours(2))
            .unwrap();

        assert!(matches!(
            manager.verify(&issued.token),
            Err(AuthError::NotAuthenticated)
        ));
    }

    #[test]
    fn test_tampered_token() {
        let manager = create_manager();
        let issued = manager.issue(&Identity::new("acct_123", Role::User)).unwrap();

        let parts: Vec<&str> = issued.token.split('.').collect();
        let forged = manager
            .issue(&Identity::new("acct_123", Role::Admin))
            .unwrap();
        let forged_payload = forged.token.split('.').nth(1).unwrap();
        let tampered = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);
        assert!(manager.verify(&tampered).is_err());

        let other = create_manager();
        assert!(other.verify(&issued.token).is_err());
    }

    #[test]
    fn test_invalid_token() {
        let manager = create_manager();
        assert!(matches!(
            manager.verify("invalid.token.here"),
            Err(AuthError::NotAuthenticated)
        ));
    }

    #[test]
    fn test_hex_secret() {
        let hex_secret = JwtManager::generate_hex_secret();
        assert_eq!(hex_secret.len(), 64);

        let manager = JwtManager::from_hex_secret(&hex_secret, Duration::from_secs(60)).unwrap();
        let issued = manager.issue(&Identity::new("acct_1", Role::User)).unwrap();
        assert!(manager.verify(&issued.token).is_ok());

        assert!(JwtManager::from_hex_secret("zz", Duration::from_secs(60)).is_err());
    }
}
