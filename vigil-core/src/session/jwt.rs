//! Access-token JWTs
//!
//! Access tokens are short-lived JWTs tied to a session. Validation is
//! stateless (signature + expiry) except for the revocation-registry check,
//! which the caller performs against `crypto::hash_token(raw_jwt)`.

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{
    account::AccountId,
    error::{AuthError, CryptoError, Error},
    session::SessionId,
};

/// Claims carried by access tokens.
#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject - account ID
    pub sub: String,
    /// Session the token was minted for, if any. Refresh-minted tokens omit it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    /// Issued at (UTC seconds)
    pub iat: i64,
    /// Expiry (UTC seconds)
    pub exp: i64,
    /// Issuer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

impl JwtClaims {
    pub fn account_id(&self) -> AccountId {
        AccountId::new(&self.sub)
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.sid.as_deref().map(SessionId::new)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_else(Utc::now)
    }
}

/// JWT signing algorithm and key material.
#[derive(Debug, Clone)]
pub enum JwtAlgorithm {
    /// RSA with SHA-256 (PEM-encoded keys)
    RS256 {
        private_key: Vec<u8>,
        public_key: Vec<u8>,
    },
    /// HMAC with SHA-256
    HS256 { secret_key: Vec<u8> },
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub algorithm: JwtAlgorithm,
    pub issuer: Option<String>,
}

impl JwtConfig {
    pub fn new_rs256(private_key: Vec<u8>, public_key: Vec<u8>) -> Self {
        Self {
            algorithm: JwtAlgorithm::RS256 {
                private_key,
                public_key,
            },
            issuer: None,
        }
    }

    pub fn new_hs256(secret_key: Vec<u8>) -> Self {
        Self {
            algorithm: JwtAlgorithm::HS256 { secret_key },
            issuer: None,
        }
    }

    /// An HS256 config with a random 256-bit key. Tokens do not survive a
    /// restart; intended for tests and single-process deployments.
    pub fn new_random_hs256() -> Self {
        use rand::{rngs::OsRng, RngCore};

        let mut secret_key = vec![0u8; 32];
        OsRng.fill_bytes(&mut secret_key);
        Self::new_hs256(secret_key)
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    fn jwt_algorithm(&self) -> Algorithm {
        match &self.algorithm {
            JwtAlgorithm::RS256 { .. } => Algorithm::RS256,
            JwtAlgorithm::HS256 { .. } => Algorithm::HS256,
        }
    }

    fn encoding_key(&self) -> Result<EncodingKey, Error> {
        match &self.algorithm {
            JwtAlgorithm::RS256 { private_key, .. } => EncodingKey::from_rsa_pem(private_key)
                .map_err(|e| CryptoError::JwtSigning(format!("invalid RSA private key: {e}")).into()),
            JwtAlgorithm::HS256 { secret_key } => Ok(EncodingKey::from_secret(secret_key)),
        }
    }

    fn decoding_key(&self) -> Result<DecodingKey, Error> {
        match &self.algorithm {
            JwtAlgorithm::RS256 { public_key, .. } => DecodingKey::from_rsa_pem(public_key)
                .map_err(|e| {
                    CryptoError::JwtVerification(format!("invalid RSA public key: {e}")).into()
                }),
            JwtAlgorithm::HS256 { secret_key } => Ok(DecodingKey::from_secret(secret_key)),
        }
    }

    /// Sign claims into a compact JWT.
    pub fn sign(&self, claims: &JwtClaims) -> Result<String, Error> {
        let header = Header::new(self.jwt_algorithm());
        encode(&header, claims, &self.encoding_key()?)
            .map_err(|e| CryptoError::JwtSigning(e.to_string()).into())
    }

    /// Verify a compact JWT and return its claims.
    ///
    /// Expiry is validated against the wall clock by `jsonwebtoken`; callers
    /// that also carry an injected clock re-check `exp` themselves.
    pub fn verify(&self, token: &str) -> Result<JwtClaims, Error> {
        let mut validation = Validation::new(self.jwt_algorithm());
        if let Some(iss) = &self.issuer {
            validation.set_issuer(&[iss]);
        }

        let data =
            decode::<JwtClaims>(token, &self.decoding_key()?, &validation).map_err(|e| {
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                        Error::Auth(AuthError::TokenExpired)
                    }
                    _ => CryptoError::JwtVerification(e.to_string()).into(),
                }
            })?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const TEST_HS256_SECRET: &[u8] = b"this_is_a_test_secret_key_for_hs256_jwt_tokens_not_for_prod";

    fn test_claims(account_id: &AccountId, session_id: &SessionId) -> JwtClaims {
        let now = Utc::now();
        JwtClaims {
            sub: account_id.to_string(),
            sid: Some(session_id.to_string()),
            iat: now.timestamp(),
            exp: (now + Duration::minutes(15)).timestamp(),
            iss: None,
        }
    }

    #[test]
    fn test_hs256_sign_and_verify() {
        let config = JwtConfig::new_hs256(TEST_HS256_SECRET.to_vec());
        let account_id = AccountId::new_random();
        let session_id = SessionId::new_random();

        let token = config.sign(&test_claims(&account_id, &session_id)).unwrap();
        let claims = config.verify(&token).unwrap();

        assert_eq!(claims.account_id(), account_id);
        assert_eq!(claims.session_id(), Some(session_id));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let config = JwtConfig::new_hs256(TEST_HS256_SECRET.to_vec());
        let other = JwtConfig::new_random_hs256();
        let token = config
            .sign(&test_claims(&AccountId::new_random(), &SessionId::new_random()))
            .unwrap();

        assert!(other.verify(&token).is_err());
    }

    #[test]
    fn test_issuer_enforced() {
        let config = JwtConfig::new_hs256(TEST_HS256_SECRET.to_vec()).with_issuer("vigil-test");
        let mut claims = test_claims(&AccountId::new_random(), &SessionId::new_random());
        claims.iss = Some("vigil-test".to_string());

        let token = config.sign(&claims).unwrap();
        assert!(config.verify(&token).is_ok());

        let other = JwtConfig::new_hs256(TEST_HS256_SECRET.to_vec()).with_issuer("someone-else");
        assert!(other.verify(&token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let config = JwtConfig::new_hs256(TEST_HS256_SECRET.to_vec());
        let now = Utc::now();
        let claims = JwtClaims {
            sub: AccountId::new_random().to_string(),
            sid: None,
            iat: (now - Duration::hours(2)).timestamp(),
            exp: (now - Duration::hours(1)).timestamp(),
            iss: None,
        };

        let token = config.sign(&claims).unwrap();
        assert!(matches!(
            config.verify(&token),
            Err(Error::Auth(AuthError::TokenExpired))
        ));
    }
}
