//! Semantic checks run once a token is cryptographically verified.

use crate::error::{Result, TokenError};
use crate::token::Claims;

/// Validate decoded claims, in a fixed order: audience, expiry, then cutoff.
///
/// The first failing check is the one reported. `cutoff` is the time the
/// principal's credentials last changed; tokens issued strictly before it
/// are stale, a token issued exactly at it is still valid.
pub fn validate(
    claims: Claims,
    expected_audience: &str,
    cutoff: Option<u64>,
    now: u64,
) -> Result<Claims> {
    if claims.audience != expected_audience {
        tracing::debug!(
            expected = expected_audience,
            found = %claims.audience,
            "token rejected: wrong audience"
        );
        return Err(TokenError::AudienceMismatch {
            expected: expected_audience.to_owned(),
            found: claims.audience,
        });
    }

    tracing::debug!(
        expires_at = claims.expires_at,
        now,
        "checking token expiration"
    );
    if now >= claims.expires_at {
        return Err(TokenError::Expired {
            expired_at: claims.expires_at,
            now,
        });
    }

    if let Some(cutoff) = cutoff {
        check_cutoff(&claims, cutoff)?;
    }

    Ok(claims)
}

/// Reject tokens issued before the principal's credentials last changed.
pub fn check_cutoff(claims: &Claims, cutoff: u64) -> Result<()> {
    if claims.issued_at < cutoff {
        tracing::debug!(
            issued_at = claims.issued_at,
            cutoff,
            "token rejected: credentials updated after issuance"
        );
        return Err(TokenError::StaleToken {
            issued_at: claims.issued_at,
            cutoff,
        });
    }

    Ok(())
}
