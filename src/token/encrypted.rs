//! Tokens protected by symmetric authenticated encryption.
//!
//! Tokens use the JWE compact serialization with direct key agreement
//! (`"alg": "dir"`): `header..iv.ciphertext.tag`, the encrypted key segment
//! being empty. The encoded header is authenticated as additional data.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::crypto::{EncryptionMethod, SecretKey};
use crate::error::{Result, TokenError};
use crate::token::{Claims, TokenService, decode_segment, encode_segment};

const DIRECT: &str = "dir";

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    enc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    zip: Option<String>,
}

/// Issue tokens whose claims cannot be read without the secret.
pub struct EncryptedTokenService {
    key: SecretKey,
    method: EncryptionMethod,
    header: String,
    clock: Arc<dyn Clock>,
}

impl EncryptedTokenService {
    /// Create a new [`EncryptedTokenService`] using `A128CBC-HS256`.
    ///
    /// `secret` bytes are the key: exactly 32 bytes are required.
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self> {
        Self::with_method(secret, EncryptionMethod::default())
    }

    /// Create a new [`EncryptedTokenService`] using `method`.
    pub fn with_method(
        secret: impl AsRef<[u8]>,
        method: EncryptionMethod,
    ) -> Result<Self> {
        let key = SecretKey::new(secret);
        method.check_key(&key)?;

        let header = serde_json::to_vec(&Header {
            alg: DIRECT.to_owned(),
            enc: method.name().to_owned(),
            zip: None,
        })
        .map_err(|err| TokenError::Encoding(err.to_string()))?;

        Ok(Self {
            key,
            method,
            header: encode_segment(header),
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn method(&self) -> EncryptionMethod {
        self.method
    }

    fn check_header(&self, segment: &str) -> Result<()> {
        let header: Header = serde_json::from_slice(&decode_segment(segment)?)
            .map_err(|_| TokenError::CryptoVerificationFailed)?;

        if header.alg != DIRECT
            || header.enc != self.method.name()
            || header.zip.is_some()
        {
            tracing::debug!(
                alg = %header.alg,
                enc = %header.enc,
                "token rejected: unsupported header"
            );
            return Err(TokenError::CryptoVerificationFailed);
        }

        Ok(())
    }
}

impl TokenService for EncryptedTokenService {
    fn seal(&self, claims: &Claims) -> Result<String> {
        let payload = serde_json::to_vec(claims)
            .map_err(|err| TokenError::Encoding(err.to_string()))?;
        let sealed =
            self.method
                .encrypt(&self.key, self.header.as_bytes(), &payload)?;

        Ok(format!(
            "{}..{}.{}.{}",
            self.header,
            encode_segment(&sealed.iv),
            encode_segment(&sealed.ciphertext),
            encode_segment(&sealed.tag),
        ))
    }

    fn unseal(&self, token: &str) -> Result<Claims> {
        let parts = token.split('.').collect::<Vec<_>>();
        let [header, encrypted_key, iv, ciphertext, tag] = parts.as_slice()
        else {
            return Err(TokenError::CryptoVerificationFailed);
        };

        if !encrypted_key.is_empty() {
            return Err(TokenError::CryptoVerificationFailed);
        }
        self.check_header(header)?;

        let payload = self.method.decrypt(
            &self.key,
            header.as_bytes(),
            &decode_segment(iv)?,
            &decode_segment(ciphertext)?,
            &decode_segment(tag)?,
        )?;

        serde_json::from_slice(&payload)
            .map_err(|_| TokenError::CryptoVerificationFailed)
    }

    fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }
}

impl fmt::Debug for EncryptedTokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedTokenService")
            .field("method", &self.method)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Map, json};

    use super::*;

    const SECRET: &str = "926D96C90030DD58429D2751AC1BDBBC";

    #[test]
    fn test_invalid_key() {
        assert!(matches!(
            EncryptedTokenService::new("too short"),
            Err(TokenError::InvalidKeyMaterial { value: 9, .. })
        ));
        assert!(matches!(
            EncryptedTokenService::new(format!("{SECRET}{SECRET}")),
            Err(TokenError::InvalidKeyMaterial { value: 64, .. })
        ));
        assert!(
            EncryptedTokenService::with_method(
                format!("{SECRET}{SECRET}"),
                EncryptionMethod::A256CbcHs512
            )
            .is_ok()
        );
    }

    #[test]
    fn test_token_layout() {
        let service = EncryptedTokenService::new(SECRET).unwrap();
        let mut extra = Map::new();
        extra.insert("username".into(), json!("abc@example.com"));
        let token = service.create_token("auth", "subject", 5000, extra).unwrap();

        let parts = token.split('.').collect::<Vec<_>>();
        assert_eq!(parts.len(), 5);
        assert!(parts[1].is_empty());
        assert_eq!(
            decode_segment(parts[0]).unwrap(),
            br#"{"alg":"dir","enc":"A128CBC-HS256"}"#
        );
        // 16-byte IV and 16-byte tag.
        assert_eq!(parts[2].len(), 22);
        assert_eq!(parts[4].len(), 22);

        // Claims do not leak.
        assert!(!token.contains("abc@example.com"));
        for part in &parts {
            let decoded = decode_segment(part).unwrap_or_default();
            assert!(!String::from_utf8_lossy(&decoded).contains("abc@example.com"));
        }
    }

    #[test]
    fn test_fresh_iv_per_token() {
        let service = EncryptedTokenService::new(SECRET).unwrap();
        let first = service.create_token("auth", "subject", 5000, Map::new()).unwrap();
        let second = service.create_token("auth", "subject", 5000, Map::new()).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_header_downgrade() {
        let service = EncryptedTokenService::new(SECRET).unwrap();
        let token = service.create_token("auth", "subject", 5000, Map::new()).unwrap();
        let rest = token.split_once('.').map(|(_, rest)| rest).unwrap();

        for header in [
            r#"{"alg":"dir","enc":"A256GCM"}"#,
            r#"{"alg":"none","enc":"A128CBC-HS256"}"#,
            r#"{"alg":"dir","enc":"A128CBC-HS256","zip":"DEF"}"#,
        ] {
            let forged = format!("{}.{rest}", encode_segment(header));
            assert_eq!(
                service.unseal(&forged),
                Err(TokenError::CryptoVerificationFailed)
            );
        }

        let with_key = token.replacen("..", ".AAAA.", 1);
        assert_eq!(
            service.unseal(&with_key),
            Err(TokenError::CryptoVerificationFailed)
        );
    }

    #[test]
    fn test_debug_hides_key() {
        let service = EncryptedTokenService::new(SECRET).unwrap();
        let debug = format!("{service:?}");
        assert!(!debug.contains(SECRET));
        assert!(debug.contains("A128CbcHs256"));
    }
}
