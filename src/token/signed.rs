//! Tokens protected by a message authentication code.
//!
//! Tokens are JWS compact serializations (`header.payload.signature`): any
//! bearer can read the claims, nobody without the secret can alter them.

use std::fmt;
use std::sync::Arc;

use jsonwebtoken::{
    DecodingKey, EncodingKey, Header, Validation, decode, encode,
};

use crate::clock::{Clock, SystemClock};
use crate::crypto::{SecretKey, SigningAlgorithm};
use crate::error::{Result, TokenError};
use crate::token::{Claims, TokenService};

/// Issue readable, tamper-evident tokens.
pub struct SignedTokenService {
    algorithm: SigningAlgorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    clock: Arc<dyn Clock>,
}

impl SignedTokenService {
    /// Create a new [`SignedTokenService`] using `HS256`.
    ///
    /// `secret` bytes are the key: at least 32 bytes are required.
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self> {
        Self::with_algorithm(secret, SigningAlgorithm::default())
    }

    /// Create a new [`SignedTokenService`] using `algorithm`.
    pub fn with_algorithm(
        secret: impl AsRef<[u8]>,
        algorithm: SigningAlgorithm,
    ) -> Result<Self> {
        let key = SecretKey::new(secret);
        algorithm.check_key(&key)?;

        // Only the signature is checked here, claims go through the shared
        // pipeline with millisecond precision.
        let mut validation = Validation::new(algorithm.as_jwt());
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        Ok(Self {
            algorithm,
            encoding_key: EncodingKey::from_secret(key.as_bytes()),
            decoding_key: DecodingKey::from_secret(key.as_bytes()),
            validation,
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }
}

impl TokenService for SignedTokenService {
    fn seal(&self, claims: &Claims) -> Result<String> {
        let header = Header::new(self.algorithm.as_jwt());

        encode(&header, claims, &self.encoding_key)
            .map_err(|err| TokenError::Encoding(err.to_string()))
    }

    fn unseal(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| {
                tracing::debug!(kind = ?err.kind(), "cannot verify signature");
                TokenError::CryptoVerificationFailed
            })
    }

    fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }
}

impl fmt::Debug for SignedTokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedTokenService")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use base64::Engine as _;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use serde_json::{Map, Value, json};

    use super::*;

    const SECRET: &str = "926D96C90030DD58429D2751AC1BDBBC";

    #[test]
    fn test_invalid_key() {
        assert!(matches!(
            SignedTokenService::new("926D96C90030DD58"),
            Err(TokenError::InvalidKeyMaterial { value: 16, .. })
        ));
        // Longer secrets are fine for HMAC.
        assert!(SignedTokenService::new(format!("{SECRET}{SECRET}")).is_ok());
        assert!(
            SignedTokenService::with_algorithm(SECRET, SigningAlgorithm::HS512)
                .is_err()
        );
    }

    #[test]
    fn test_claims_are_readable() {
        let service = SignedTokenService::new(SECRET).unwrap();
        let mut extra = Map::new();
        extra.insert("username".into(), json!("abc@example.com"));
        let token = service.create_token("auth", "subject", 5000, extra).unwrap();

        let parts = token.split('.').collect::<Vec<_>>();
        assert_eq!(parts.len(), 3);

        let header: Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(parts[0]).unwrap())
                .unwrap();
        assert_eq!(header["alg"], "HS256");

        let payload: Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(parts[1]).unwrap())
                .unwrap();
        assert_eq!(payload["sub"], "subject");
        assert_eq!(payload["aud"], "auth");
        assert_eq!(payload["username"], "abc@example.com");
    }

    #[test]
    fn test_forged_payload() {
        let service = SignedTokenService::new(SECRET).unwrap();
        let token = service
            .create_token("auth", "subject", 5000, Map::new())
            .unwrap();
        let parts = token.split('.').collect::<Vec<_>>();

        let mut payload: Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(parts[1]).unwrap())
                .unwrap();
        payload["sub"] = json!("admin");
        let forged = format!(
            "{}.{}.{}",
            parts[0],
            URL_SAFE_NO_PAD.encode(payload.to_string()),
            parts[2]
        );

        assert_eq!(
            service.parse_token(&forged, "auth", None),
            Err(TokenError::CryptoVerificationFailed)
        );
    }

    #[test]
    fn test_algorithm_pinning() {
        let hs256 = SignedTokenService::new(SECRET.repeat(2)).unwrap();
        let hs512 = SignedTokenService::with_algorithm(
            SECRET.repeat(2),
            SigningAlgorithm::HS512,
        )
        .unwrap();

        let token = hs512
            .create_token("auth", "subject", 5000, Map::new())
            .unwrap();
        assert_eq!(
            hs256.parse_token(&token, "auth", None),
            Err(TokenError::CryptoVerificationFailed)
        );
    }
}
