//! Error handler for autha-token.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TokenError>;

/// Enum representing every way token creation or verification can fail.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Secret does not fit the chosen primitive. Fatal at startup.
    #[error("key length is {value} bytes while {expected} is expected")]
    InvalidKeyMaterial { value: usize, expected: String },

    #[error("invalid claim: {0}")]
    InvalidClaim(String),

    #[error("cannot encode token: {0}")]
    Encoding(String),

    #[error("token is corrupted or was not issued with this secret")]
    CryptoVerificationFailed,

    #[error("token audience is {found} while {expected} is expected")]
    AudienceMismatch { expected: String, found: String },

    #[error("token expired at {expired_at}")]
    Expired { expired_at: u64, now: u64 },

    #[error("token issued at {issued_at} predates credentials update at {cutoff}")]
    StaleToken { issued_at: u64, cutoff: u64 },
}

impl TokenError {
    /// Whether the error must be treated as rejected credentials by the
    /// consuming layer.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            TokenError::CryptoVerificationFailed
                | TokenError::AudienceMismatch { .. }
                | TokenError::Expired { .. }
                | TokenError::StaleToken { .. }
        )
    }

    pub(crate) fn invalid_claim(reason: impl Into<String>) -> Self {
        TokenError::InvalidClaim(reason.into())
    }
}

/// Error while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration file is malformed: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("missing `token` entry on configuration file")]
    MissingToken,

    #[error("missing token secret, set `token.secret` or `{0}`")]
    MissingSecret(&'static str),

    #[error(transparent)]
    Token(#[from] TokenError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authentication_failure() {
        assert!(TokenError::CryptoVerificationFailed.is_authentication_failure());
        assert!(
            TokenError::Expired {
                expired_at: 1,
                now: 2
            }
            .is_authentication_failure()
        );
        assert!(
            !TokenError::InvalidKeyMaterial {
                value: 3,
                expected: "32".into()
            }
            .is_authentication_failure()
        );
        assert!(!TokenError::invalid_claim("empty").is_authentication_failure());
    }
}
