use axum::{
    Form, Router,
    extract::State,
    response::{Html, Redirect},
    routing::get,
};
use std::collections::BTreeMap;
use tower_sessions::Session;

use crate::{
    AppState,
    auth::{self, ADMIN_INDEX_ROUTE},
    error::AppError,
    models::CredentialsForm,
};

/// Minimum accepted password length at registration.
const MIN_PASSWORD_LENGTH: usize = 8;

const LOGIN_HTML: &str = "<!doctype html>\
<html><head><title>Log in</title></head>\
<body>\
<h1>Log in</h1>\
<form method=\"post\" action=\"/login\">\
<label>Email <input type=\"email\" name=\"email\"></label>\
<label>Password <input type=\"password\" name=\"password\"></label>\
<button type=\"submit\">Log in</button>\
</form>\
<p><a href=\"/register\">Register</a></p>\
</body></html>";

const REGISTER_HTML: &str = "<!doctype html>\
<html><head><title>Register</title></head>\
<body>\
<h1>Register</h1>\
<form method=\"post\" action=\"/register\">\
<label>Email <input type=\"email\" name=\"email\"></label>\
<label>Password <input type=\"password\" name=\"password\"></label>\
<button type=\"submit\">Register</button>\
</form>\
<p><a href=\"/login\">Log in</a></p>\
</body></html>";

/// Identity Router Module
///
/// Login, logout, and registration. All three redirect to the admin index
/// on success; the gate on the admin screens takes over from there.
pub fn identity_routes() -> Router<AppState> {
    Router::new()
        .route("/login", get(login_page).post(login))
        .route("/register", get(register_page).post(register))
        // Logout is reachable from a plain link as well as a form.
        .route("/logout", get(logout).post(logout))
}

async fn login_page() -> Html<&'static str> {
    Html(LOGIN_HTML)
}

async fn register_page() -> Html<&'static str> {
    Html(REGISTER_HTML)
}

/// login
///
/// Validates the submitted credentials against the stored hash. All failure
/// modes (unknown email, wrong password, missing credential, inactive
/// account) produce the identical generic error, so the response never
/// reveals whether an email is registered.
#[utoipa::path(
    post,
    path = "/login",
    request_body = CredentialsForm,
    responses(
        (status = 303, description = "Logged in, redirected to the admin index"),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<CredentialsForm>,
) -> Result<Redirect, AppError> {
    let user = state
        .repo
        .user_by_email(&form.email)
        .await?
        .ok_or(AppError::InvalidCredentials)?;
    let hash = user.password.as_deref().ok_or(AppError::InvalidCredentials)?;
    auth::verify_password(&form.password, hash)?;
    if !user.active {
        return Err(AppError::InvalidCredentials);
    }

    auth::set_principal(&session, user.id, &user.email).await?;
    tracing::info!(user = %user.email, "login");
    Ok(Redirect::to(ADMIN_INDEX_ROUTE))
}

/// register
///
/// Creates a new user account. New accounts are active immediately and no
/// verification mail is involved; the session is established in the same
/// request, so registration doubles as a first login.
#[utoipa::path(
    post,
    path = "/register",
    request_body = CredentialsForm,
    responses(
        (status = 303, description = "Registered and logged in, redirected to the admin index"),
        (status = 409, description = "Email already registered"),
        (status = 422, description = "Field validation errors")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<CredentialsForm>,
) -> Result<Redirect, AppError> {
    let mut errors: BTreeMap<String, String> = BTreeMap::new();
    let email = form.email.trim();
    if email.is_empty() || !email.contains('@') {
        errors.insert("email".to_string(), "must be a valid email address".to_string());
    }
    if form.password.len() < MIN_PASSWORD_LENGTH {
        errors.insert(
            "password".to_string(),
            format!("must be at least {} characters", MIN_PASSWORD_LENGTH),
        );
    }
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let hash = auth::hash_password(&form.password)?;
    let user = state.repo.create_user(email, &hash).await?;

    auth::set_principal(&session, user.id, &user.email).await?;
    tracing::info!(user = %user.email, "registered");
    Ok(Redirect::to(ADMIN_INDEX_ROUTE))
}

/// logout
///
/// Clears the session identity. Safe to call when not logged in.
#[utoipa::path(
    post,
    path = "/logout",
    responses((status = 303, description = "Logged out, redirected to the admin index"))
)]
pub async fn logout(session: Session) -> Result<Redirect, AppError> {
    auth::clear_principal(&session).await?;
    Ok(Redirect::to(ADMIN_INDEX_ROUTE))
}
