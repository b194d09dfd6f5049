use admin_portal::{
    auth::{self, AuthRedirect},
    error::AppError,
    models::Principal,
};
use axum::response::IntoResponse;
use uuid::Uuid;

fn principal(active: bool) -> Principal {
    Principal {
        id: Uuid::new_v4(),
        email: "a@example.com".to_string(),
        active,
        roles: vec![],
    }
}

#[test]
fn password_hash_roundtrip() {
    let hash = auth::hash_password("correct-horse-battery").unwrap();
    // PHC string, not the plaintext.
    assert!(hash.starts_with("$argon2"));
    assert!(!hash.contains("correct-horse-battery"));

    assert!(auth::verify_password("correct-horse-battery", &hash).is_ok());
    let err = auth::verify_password("wrong", &hash).unwrap_err();
    assert!(matches!(err, AppError::InvalidCredentials));
}

#[test]
fn hashes_are_salted() {
    let a = auth::hash_password("same-password").unwrap();
    let b = auth::hash_password("same-password").unwrap();
    assert_ne!(a, b);
}

#[test]
fn garbage_hash_is_invalid_credentials() {
    let err = auth::verify_password("anything", "not-a-phc-string").unwrap_err();
    assert!(matches!(err, AppError::InvalidCredentials));
}

#[test]
fn access_gate_predicate() {
    // Anonymous requests never pass.
    assert!(!auth::is_accessible(None));
    // Inactive principals never pass, authenticated or not.
    let inactive = principal(false);
    assert!(!auth::is_accessible(Some(&inactive)));
    // Active, authenticated principals pass.
    let active = principal(true);
    assert!(auth::is_accessible(Some(&active)));
}

#[test]
fn gate_rejection_is_a_302_to_login() {
    let response = AuthRedirect.into_response();
    assert_eq!(response.status(), 302);
    assert_eq!(
        response.headers().get("location").unwrap().to_str().unwrap(),
        auth::LOGIN_ROUTE
    );
}
