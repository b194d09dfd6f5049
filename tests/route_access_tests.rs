use admin_portal::{
    AppConfig, AppState, MemoryRepository, create_router, repository::RepositoryState,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_sessions::{MemoryStore, SessionManagerLayer};

pub struct TestApp {
    pub address: String,
}

/// Boots the full router on a random port, backed by the in-memory
/// repository and an in-memory session store.
async fn spawn_app() -> TestApp {
    let repo = Arc::new(MemoryRepository::new()) as RepositoryState;
    let state = AppState {
        repo,
        config: AppConfig::default(),
    };
    let session_layer = SessionManagerLayer::new(MemoryStore::default()).with_secure(false);
    let router = create_router(state, session_layer);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
    }
}

/// A client with a cookie jar and redirect following disabled, so the exact
/// status codes and Location headers can be asserted.
fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .cookie_store(true)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

async fn register(client: &reqwest::Client, address: &str, email: &str) {
    let resp = client
        .post(format!("{}/register", address))
        .form(&[("email", email), ("password", "correct-horse-battery")])
        .send()
        .await
        .expect("register failed");
    assert_eq!(resp.status(), 303);
}

const GATED_SLUGS: &[&str] = &["users", "roles", "product", "address", "order"];

#[tokio::test]
async fn public_landing_returns_200() {
    let app = spawn_app().await;
    let resp = client()
        .get(format!("{}/", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn health_check() {
    let app = spawn_app().await;
    let resp = client()
        .get(format!("{}/health", app.address))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    assert_eq!(resp.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn admin_index_returns_200_for_anonymous() {
    let app = spawn_app().await;
    let resp = client()
        .get(format!("{}/admin/", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    // Content is gated internally: anonymous visitors get the login prompt.
    assert!(resp.text().await.unwrap().contains("/login"));
}

#[tokio::test]
async fn gated_admin_routes_redirect_anonymous_to_login() {
    let app = spawn_app().await;
    let client = client();
    for slug in GATED_SLUGS {
        let resp = client
            .get(format!("{}/admin/{}/", app.address, slug))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 302, "GET /admin/{}/ should redirect", slug);
        assert_eq!(
            resp.headers().get("location").unwrap().to_str().unwrap(),
            "/login"
        );
    }
}

#[tokio::test]
async fn gated_admin_routes_return_200_when_authenticated() {
    let app = spawn_app().await;
    let client = client();
    register(&client, &app.address, "admin@example.com").await;

    for slug in GATED_SLUGS {
        let resp = client
            .get(format!("{}/admin/{}/", app.address, slug))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200, "GET /admin/{}/ should succeed", slug);
        let rows: Vec<serde_json::Value> = resp.json().await.unwrap();
        // The only row anywhere is the registered user itself.
        let expected = if *slug == "users" { 1 } else { 0 };
        assert_eq!(rows.len(), expected, "unexpected rows for {}", slug);
    }
}

#[tokio::test]
async fn admin_index_shows_menu_when_authenticated() {
    let app = spawn_app().await;
    let client = client();
    register(&client, &app.address, "admin@example.com").await;

    let resp = client
        .get(format!("{}/admin/", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body = resp.text().await.unwrap();
    assert!(body.contains("admin@example.com"));
    assert!(body.contains("/admin/product/"));
}

#[tokio::test]
async fn logout_invalidates_session() {
    let app = spawn_app().await;
    let client = client();
    register(&client, &app.address, "admin@example.com").await;

    let resp = client
        .get(format!("{}/admin/users/", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .get(format!("{}/logout", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 303);
    assert_eq!(
        resp.headers().get("location").unwrap().to_str().unwrap(),
        "/admin/"
    );

    // The previously accessible route redirects again.
    let resp = client
        .get(format!("{}/admin/users/", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 302);
    assert_eq!(
        resp.headers().get("location").unwrap().to_str().unwrap(),
        "/login"
    );
}

#[tokio::test]
async fn mutations_are_gated_before_any_write() {
    let app = spawn_app().await;

    // Anonymous create attempt: redirected, nothing written.
    let anon = client();
    let resp = anon
        .post(format!("{}/admin/product/", app.address))
        .form(&[("name", "Widget")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 302);

    // An authenticated client sees an empty product list.
    let admin = client();
    register(&admin, &app.address, "admin@example.com").await;
    let rows: Vec<serde_json::Value> = admin
        .get(format!("{}/admin/product/", app.address))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(rows.is_empty());
}
