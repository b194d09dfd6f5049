use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use uuid::Uuid;

use crate::{error::AppError, models::Principal, repository::RepositoryState};

/// Route every rejected admin request is redirected to.
pub const LOGIN_ROUTE: &str = "/login";
/// Redirect target after a successful login, logout, or registration.
pub const ADMIN_INDEX_ROUTE: &str = "/admin/";
/// Session key under which the logged-in identity is stored.
const PRINCIPAL_KEY: &str = "current_user";

/// SessionUser
///
/// The minimal identity persisted in the session store: just enough to find
/// the user row again. Everything else (active flag, roles) is re-read from
/// the repository on each request, so a session cannot outlive a deletion or
/// deactivation of its user.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionUser {
    id: Uuid,
    email: String,
}

// --- Password Hashing ---

/// Hashes a password with Argon2 under a fresh random salt, producing a PHC
/// string suitable for the `users.password` column.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        // Hash construction only fails on malformed parameters, which never
        // carry user data worth echoing back.
        .map_err(|_| AppError::InvalidCredentials)
}

/// Verifies a password against a stored PHC string. Every failure mode maps
/// to the same generic error.
pub fn verify_password(password: &str, hash: &str) -> Result<(), AppError> {
    let parsed = PasswordHash::new(hash).map_err(|_| AppError::InvalidCredentials)?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| AppError::InvalidCredentials)
}

// --- Session Principal ---

/// Records the given user as the session's logged-in identity.
pub async fn set_principal(session: &Session, id: Uuid, email: &str) -> Result<(), AppError> {
    session
        .insert(
            PRINCIPAL_KEY,
            SessionUser {
                id,
                email: email.to_string(),
            },
        )
        .await?;
    Ok(())
}

/// Clears the session's logged-in identity (logout).
pub async fn clear_principal(session: &Session) -> Result<(), AppError> {
    session.remove::<SessionUser>(PRINCIPAL_KEY).await?;
    Ok(())
}

/// resolve_principal
///
/// Resolves the current request to a Principal, or `None` for anonymous
/// requests. The stored session identity is only a pointer: the user row is
/// fetched fresh, and a session pointing at a vanished row resolves to
/// anonymous.
pub async fn resolve_principal(session: &Session, repo: &RepositoryState) -> Option<Principal> {
    let stored: SessionUser = session.get(PRINCIPAL_KEY).await.ok().flatten()?;
    let user = repo.user_by_id(stored.id).await.ok().flatten()?;
    let roles = repo.role_names(user.id).await.unwrap_or_default();
    Some(Principal {
        id: user.id,
        email: user.email,
        active: user.active,
        roles,
    })
}

/// is_accessible
///
/// The single authorization predicate of the whole application: a request
/// may touch admin data exactly when it comes from an authenticated
/// principal whose account is active. Every admin view consults this, and
/// nothing else, before reading or mutating anything.
pub fn is_accessible(principal: Option<&Principal>) -> bool {
    principal.is_some_and(|p| p.active)
}

// --- Extractors ---

/// AuthRedirect
///
/// The rejection produced when the access gate denies a request: a 302 to
/// the login route. Denied admin requests are redirected, never answered
/// with an error page.
#[derive(Debug)]
pub struct AuthRedirect;

impl IntoResponse for AuthRedirect {
    fn into_response(self) -> Response {
        (StatusCode::FOUND, [(header::LOCATION, LOGIN_ROUTE)]).into_response()
    }
}

/// AdminUser
///
/// Extractor implementing the access gate. Any handler that takes an
/// `AdminUser` argument is gated: the request only reaches the handler body
/// if it resolves to an active, authenticated principal. Placing it first in
/// the handler signature guarantees the gate runs before any other
/// extraction or work.
#[derive(Debug, Clone)]
pub struct AdminUser(pub Principal);

impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
{
    type Rejection = AuthRedirect;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        // The session is placed in request extensions by SessionManagerLayer.
        // A missing session means the layer is absent, which fails closed.
        let session = parts.extensions.get::<Session>().cloned().ok_or(AuthRedirect)?;
        let principal = resolve_principal(&session, &repo).await;
        if !is_accessible(principal.as_ref()) {
            return Err(AuthRedirect);
        }
        // The predicate above only passes for Some(_).
        principal.map(AdminUser).ok_or(AuthRedirect)
    }
}

/// MaybePrincipal
///
/// Extractor for views that render for everyone but vary their content by
/// identity, such as the admin index page. Never rejects.
#[derive(Debug, Clone)]
pub struct MaybePrincipal(pub Option<Principal>);

impl<S> FromRequestParts<S> for MaybePrincipal
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let principal = match parts.extensions.get::<Session>().cloned() {
            Some(session) => resolve_principal(&session, &repo).await,
            None => None,
        };
        Ok(MaybePrincipal(principal))
    }
}
