//! Stateless authentication tokens for Autha.
//!
//! Tokens are self-contained: every claim needed to authenticate a request
//! travels inside the token, protected by one symmetric secret. A token is
//! bound to an audience, expires, and is revoked as soon as its principal's
//! credentials change.
//!
//! ```no_run
//! use autha_token::{AUTH_AUDIENCE, SignedTokenService, TokenService};
//!
//! let tokens = SignedTokenService::new("926D96C90030DD58429D2751AC1BDBBC")?;
//! let token = tokens.create_token(AUTH_AUDIENCE, "user-1", 60_000, Default::default())?;
//! let claims = tokens.parse_token(&token, AUTH_AUDIENCE, None)?;
//! assert_eq!(claims.subject, "user-1");
//! # Ok::<(), autha_token::TokenError>(())
//! ```
#![forbid(unsafe_code)]

pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;
#[cfg(feature = "axum")]
pub mod middleware;
pub mod token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use crypto::{EncryptionMethod, SigningAlgorithm};
pub use error::{ConfigError, Result, TokenError};
pub use token::{
    AUTH_AUDIENCE, CHANGE_EMAIL_AUDIENCE, Claims, EncryptedTokenService,
    FORGOT_PASSWORD_AUDIENCE, SignedTokenService, TokenService,
    VERIFY_AUDIENCE,
};
