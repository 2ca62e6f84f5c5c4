//! Token authentication for axum routers.
//!
//! [`authenticate`] reads the `Authorization: Bearer` header, verifies the
//! token for [`AUTH_AUDIENCE`] and rejects it if the principal's credentials
//! changed after issuance. Verified claims travel with the request as
//! [`Authenticated`], handlers receive them as an extractor.

use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Json;
use axum::extract::{FromRequestParts, OptionalFromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::error::TokenError;
use crate::token::validation::check_cutoff;
use crate::token::{AUTH_AUDIENCE, Claims, TokenService};

pub const TOKEN_PREFIX: &str = "Bearer ";

/// Source of each principal's "credentials last updated" time.
#[async_trait]
pub trait CredentialsStore: Send + Sync {
    /// Unix timestamp, in milliseconds, of the last password or roles
    /// change of `subject`. `None` if the principal does not exist.
    async fn credentials_updated_at(&self, subject: &str) -> Option<u64>;
}

/// Errors returned to clients that failed authentication.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("principal no longer exists")]
    UnknownPrincipal,

    #[error("missing or invalid 'Authorization' header")]
    Unauthorized,
}

/// Structure for detailed error responses.
#[derive(Debug, Serialize)]
struct ResponseError {
    r#type: Option<String>,
    title: String,
    status: u16,
    detail: String,
    instance: Option<String>,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, title) = match &self {
            AuthError::Token(TokenError::Expired { .. }) => (
                StatusCode::UNAUTHORIZED,
                "Token expired, please log in again.",
            ),
            AuthError::Token(err) if !err.is_authentication_failure() => {
                tracing::error!(%err, "token authentication misconfigured");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error.")
            },
            _ => (StatusCode::UNAUTHORIZED, "Authentication failed."),
        };

        let body = ResponseError {
            r#type: None,
            title: title.to_owned(),
            status: status.as_u16(),
            detail: self.to_string(),
            instance: None,
        };

        (status, [(header::WWW_AUTHENTICATE, "Bearer")], Json(body))
            .into_response()
    }
}

/// Verified claims of the request's bearer token.
#[derive(Clone, Debug, PartialEq)]
pub struct Authenticated(pub Claims);

impl<S: Send + Sync> FromRequestParts<S> for Authenticated {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Authenticated>()
            .cloned()
            .ok_or(AuthError::Unauthorized)
    }
}

impl<S: Send + Sync> OptionalFromRequestParts<S> for Authenticated {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<Authenticated>().cloned())
    }
}

/// State of the [`authenticate`] middleware.
#[derive(Clone)]
pub struct TokenAuthenticator {
    tokens: Arc<dyn TokenService>,
    credentials: Arc<dyn CredentialsStore>,
}

impl TokenAuthenticator {
    /// Create a new [`TokenAuthenticator`].
    pub fn new(
        tokens: Arc<dyn TokenService>,
        credentials: Arc<dyn CredentialsStore>,
    ) -> Self {
        Self {
            tokens,
            credentials,
        }
    }

    /// Verify a bearer token and ensure it postdates the principal's last
    /// credentials change.
    pub async fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let claims = self.tokens.parse_token(token, AUTH_AUDIENCE, None)?;

        let cutoff = self
            .credentials
            .credentials_updated_at(&claims.subject)
            .await
            .ok_or(AuthError::UnknownPrincipal)?;
        check_cutoff(&claims, cutoff)?;

        Ok(claims)
    }
}

/// Middleware authenticating requests carrying a bearer token.
///
/// Requests without one pass through unauthenticated.
pub async fn authenticate(
    State(auth): State<TokenAuthenticator>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let Some(token) = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix(TOKEN_PREFIX))
        .map(str::to_owned)
    else {
        tracing::debug!("token authentication skipped");
        return Ok(next.run(req).await);
    };

    let claims = auth.verify(&token).await.inspect_err(
        |err| tracing::debug!(%err, "token authentication failed"),
    )?;
    tracing::debug!(subject = %claims.subject, "token authentication successful");

    req.extensions_mut().insert(Authenticated(claims));
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use axum::Router;
    use axum::body::Body;
    use axum::routing::get;
    use http_body_util::BodyExt;
    use serde_json::{Map, Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::clock::ManualClock;
    use crate::token::{SignedTokenService, VERIFY_AUDIENCE};

    const SECRET: &str = "926D96C90030DD58429D2751AC1BDBBC";
    const NOW: u64 = 1_700_000_000_000;

    #[derive(Default)]
    struct MemoryCredentials(Mutex<HashMap<String, u64>>);

    impl MemoryCredentials {
        fn update(&self, subject: &str, at: u64) {
            if let Ok(mut users) = self.0.lock() {
                users.insert(subject.to_owned(), at);
            }
        }
    }

    #[async_trait]
    impl CredentialsStore for MemoryCredentials {
        async fn credentials_updated_at(&self, subject: &str) -> Option<u64> {
            self.0.lock().ok()?.get(subject).copied()
        }
    }

    async fn me(Authenticated(claims): Authenticated) -> String {
        claims.subject
    }

    async fn public(user: Option<Authenticated>) -> String {
        user.map(|Authenticated(claims)| claims.subject)
            .unwrap_or_else(|| "anonymous".into())
    }

    struct Fixture {
        app: Router,
        tokens: Arc<dyn TokenService>,
        credentials: Arc<MemoryCredentials>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(NOW));
        let tokens: Arc<dyn TokenService> = Arc::new(
            SignedTokenService::new(SECRET)
                .unwrap()
                .with_clock(clock.clone()),
        );
        let credentials = Arc::new(MemoryCredentials::default());
        credentials.update("user-1", NOW - 1_000);

        let auth = TokenAuthenticator::new(tokens.clone(), credentials.clone());
        let app = Router::new()
            .route("/me", get(me))
            .route("/public", get(public))
            .layer(axum::middleware::from_fn_with_state(auth, authenticate));

        Fixture {
            app,
            tokens,
            credentials,
            clock,
        }
    }

    async fn call(
        app: Router,
        path: &str,
        token: Option<&str>,
    ) -> (StatusCode, String) {
        let mut request = axum::http::Request::builder().uri(path);
        if let Some(token) = token {
            request = request
                .header(header::AUTHORIZATION, format!("{TOKEN_PREFIX}{token}"));
        }

        let response = app
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();

        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn title(body: &str) -> Value {
        serde_json::from_str::<Value>(body).unwrap()["title"].clone()
    }

    #[tokio::test]
    async fn test_authenticated() {
        let f = fixture();
        let token = f
            .tokens
            .create_token(AUTH_AUDIENCE, "user-1", 60_000, Map::new())
            .unwrap();

        let (status, body) = call(f.app.clone(), "/me", Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "user-1");

        let (status, body) = call(f.app, "/public", Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "user-1");
    }

    #[tokio::test]
    async fn test_without_token() {
        let f = fixture();

        let (status, body) = call(f.app.clone(), "/public", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "anonymous");

        let (status, _) = call(f.app, "/me", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_rejected_tokens() {
        let f = fixture();

        let (status, body) = call(f.app.clone(), "/public", Some("garbage")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(title(&body), json!("Authentication failed."));

        let wrong_audience = f
            .tokens
            .create_token(VERIFY_AUDIENCE, "user-1", 60_000, Map::new())
            .unwrap();
        let (status, _) =
            call(f.app.clone(), "/public", Some(&wrong_audience)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let unknown = f
            .tokens
            .create_token(AUTH_AUDIENCE, "ghost", 60_000, Map::new())
            .unwrap();
        let (status, _) = call(f.app, "/public", Some(&unknown)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_expired_token() {
        let f = fixture();
        let token = f
            .tokens
            .create_token(AUTH_AUDIENCE, "user-1", 1, Map::new())
            .unwrap();
        f.clock.advance(2);

        let (status, body) = call(f.app, "/me", Some(&token)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(title(&body), json!("Token expired, please log in again."));
    }

    #[tokio::test]
    async fn test_password_change_revokes_tokens() {
        let f = fixture();
        let token = f
            .tokens
            .create_token(AUTH_AUDIENCE, "user-1", 60_000, Map::new())
            .unwrap();

        // Updated at the very millisecond of issuance: still valid.
        f.credentials.update("user-1", NOW);
        let (status, _) = call(f.app.clone(), "/me", Some(&token)).await;
        assert_eq!(status, StatusCode::OK);

        f.clock.advance(10);
        f.credentials.update("user-1", NOW + 5);
        let (status, body) = call(f.app.clone(), "/me", Some(&token)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("predates credentials update"));

        // A token minted after the change works.
        let fresh = f
            .tokens
            .create_token(AUTH_AUDIENCE, "user-1", 60_000, Map::new())
            .unwrap();
        let (status, _) = call(f.app, "/me", Some(&fresh)).await;
        assert_eq!(status, StatusCode::OK);
    }
}
