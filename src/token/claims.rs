//! Pieces of information asserted on a token.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, TokenError};

/// Claim names owned by the service. Extra claims cannot use them.
pub const RESERVED_CLAIMS: [&str; 4] = ["sub", "aud", "iat", "exp"];

/// Claims carried by a token.
///
/// Timestamps are Unix timestamps in milliseconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Principal the token was issued to, e.g. a user ID.
    #[serde(rename = "sub")]
    pub subject: String,
    /// Purpose the token was minted for.
    #[serde(rename = "aud")]
    pub audience: String,
    /// Identifies the time at which the token was issued.
    #[serde(rename = "iat")]
    pub issued_at: u64,
    /// Identifies the time on or after which the token must not be accepted.
    #[serde(rename = "exp")]
    pub expires_at: u64,
    /// Caller-supplied claims, in insertion order.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    pub(crate) fn new(
        audience: &str,
        subject: &str,
        issued_at: u64,
        ttl_millis: u64,
        extra: Map<String, Value>,
    ) -> Result<Self> {
        if audience.is_empty() {
            return Err(TokenError::invalid_claim("audience must not be empty"));
        }
        if subject.is_empty() {
            return Err(TokenError::invalid_claim("subject must not be empty"));
        }
        if let Some(name) = extra
            .keys()
            .find(|name| RESERVED_CLAIMS.contains(&name.as_str()))
        {
            return Err(TokenError::invalid_claim(format!(
                "`{name}` is a reserved claim"
            )));
        }

        let expires_at = issued_at
            .checked_add(ttl_millis)
            .ok_or_else(|| TokenError::invalid_claim("ttl overflows"))?;

        Ok(Self {
            subject: subject.to_owned(),
            audience: audience.to_owned(),
            issued_at,
            expires_at,
            extra,
        })
    }

    /// Get any claim, registered or extra, by its serialized name.
    pub fn get(&self, name: &str) -> Option<Value> {
        match name {
            "sub" => Some(Value::from(self.subject.as_str())),
            "aud" => Some(Value::from(self.audience.as_str())),
            "iat" => Some(Value::from(self.issued_at)),
            "exp" => Some(Value::from(self.expires_at)),
            _ => self.extra.get(name).cloned(),
        }
    }

    /// Get an extra claim as `T`.
    ///
    /// Returns `None` if the claim is absent or does not fit `T`.
    pub fn claim<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.extra
            .get(name)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Milliseconds left before expiry.
    pub fn expires_in(&self, now: u64) -> u64 {
        self.expires_at.saturating_sub(now)
    }
}
