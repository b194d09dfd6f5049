use crate::AppState;
use axum::{Router, response::Html, routing::get};

const LANDING_HTML: &str = "<!doctype html>\
<html><head><title>Shop</title></head>\
<body>\
<h1>Welcome</h1>\
<p><a href=\"/admin/\">Administration</a></p>\
</body></html>";

/// Public Router Module
///
/// Endpoints reachable without any authentication. The landing page renders
/// the same for anonymous and logged-in visitors.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /
        // The public landing page. Always 200, regardless of session state.
        .route("/", get(landing))
        // GET /health
        // Unauthenticated probe for monitoring and load balancer checks.
        .route("/health", get(|| async { "ok" }))
}

async fn landing() -> Html<&'static str> {
    Html(LANDING_HTML)
}
