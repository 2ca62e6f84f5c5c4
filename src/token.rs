//! Stateless authentication tokens.
//!
//! A [`TokenService`] issues and verifies self-contained tokens protected by a
//! single symmetric secret. Two protections are available:
//! - [`EncryptedTokenService`], claims are unreadable without the secret;
//! - [`SignedTokenService`], claims are readable but tamper-evident.
//!
//! Both share the validation pipeline of [`TokenService::parse_token`].

mod claims;
mod encrypted;
mod signed;
pub mod validation;

pub use claims::{Claims, RESERVED_CLAIMS};
pub use encrypted::EncryptedTokenService;
pub use signed::SignedTokenService;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Map, Value};

use crate::clock::Clock;
use crate::error::{Result, TokenError};

/// Audience of tokens authenticating API requests.
pub const AUTH_AUDIENCE: &str = "auth";
/// Audience of email verification links.
pub const VERIFY_AUDIENCE: &str = "verify";
/// Audience of password reset links.
pub const FORGOT_PASSWORD_AUDIENCE: &str = "forgot-password";
/// Audience of email change confirmation links.
pub const CHANGE_EMAIL_AUDIENCE: &str = "change-email";

/// Issue and verify tokens.
///
/// Implementors only provide the cryptographic step ([`seal`] and
/// [`unseal`]) and a clock; claim construction and validation are shared.
///
/// [`seal`]: TokenService::seal
/// [`unseal`]: TokenService::unseal
pub trait TokenService: Send + Sync {
    /// Protect claims into a compact, URL-safe token.
    fn seal(&self, claims: &Claims) -> Result<String>;

    /// Verify and open a token produced by [`TokenService::seal`].
    ///
    /// Must fail with [`TokenError::CryptoVerificationFailed`] for anything
    /// not sealed with this service's secret.
    fn unseal(&self, token: &str) -> Result<Claims>;

    /// Time source of the service.
    fn clock(&self) -> &dyn Clock;

    /// Create a new token valid `ttl_millis` milliseconds from now.
    fn create_token(
        &self,
        audience: &str,
        subject: &str,
        ttl_millis: u64,
        extra: Map<String, Value>,
    ) -> Result<String> {
        let claims = Claims::new(
            audience,
            subject,
            self.clock().now_millis(),
            ttl_millis,
            extra,
        )?;

        self.seal(&claims)
    }

    /// Decode and check a token.
    ///
    /// Checks run in a fixed order and the first failure is returned:
    /// cryptographic verification, audience, expiry, then `cutoff` if given.
    fn parse_token(
        &self,
        token: &str,
        expected_audience: &str,
        cutoff: Option<u64>,
    ) -> Result<Claims> {
        let claims = self.unseal(token).inspect_err(|err| {
            tracing::debug!(error = %err, "token rejected: verification failed")
        })?;

        validation::validate(
            claims,
            expected_audience,
            cutoff,
            self.clock().now_millis(),
        )
    }

    /// Read one claim of a verified token, skipping audience, expiry and
    /// cutoff checks.
    fn parse_claim(&self, token: &str, name: &str) -> Result<Option<Value>> {
        Ok(self.unseal(token)?.get(name))
    }
}

pub(crate) fn encode_segment(data: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

pub(crate) fn decode_segment(segment: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| TokenError::CryptoVerificationFailed)
}
