use axum::{
    Router,
    response::Html,
    routing::{get, post},
};

use crate::{
    AppState,
    auth::{self, MaybePrincipal},
    views::{self, ENTITIES},
};

/// Admin Router Module
///
/// The administrative surface: one index page plus the generic CRUD routes,
/// all served by the handlers in `views`. Every CRUD handler takes the
/// `AdminUser` extractor, so each of these routes redirects anonymous or
/// inactive principals to the login page before doing anything else. The
/// index page itself is the single exception: it renders 200 for everyone
/// and gates its content internally.
pub fn admin_routes() -> Router<AppState> {
    // Surface any descriptor that asks for a credential column. The column
    // is dropped from the projection regardless; the warning makes the
    // misconfiguration visible at startup instead of silently hiding it.
    for desc in ENTITIES {
        for col in desc.columns.iter().filter(|c| c.is_credential()) {
            tracing::warn!(
                entity = desc.slug,
                column = col.name,
                "descriptor requests a credential column; it will not be displayed"
            );
        }
    }

    Router::new()
        // GET /admin/
        // The admin landing page. Renders for everyone.
        .route("/admin/", get(admin_index))
        // The generic screens. One route set serves every registered entity;
        // unknown slugs are a 404 (after the gate).
        .route(
            "/admin/{entity}/",
            get(views::list_entity).post(views::create_entity),
        )
        .route("/admin/{entity}/{id}", post(views::update_entity))
        .route("/admin/{entity}/{id}/delete", post(views::delete_entity))
}

/// admin_index
///
/// Renders the entity menu for an accessible principal and a login prompt
/// for everyone else. Always 200: the gate shapes the content here, not the
/// status code.
async fn admin_index(MaybePrincipal(principal): MaybePrincipal) -> Html<String> {
    let body = match principal.filter(|p| auth::is_accessible(Some(p))) {
        Some(principal) => {
            let mut items = String::new();
            for desc in ENTITIES {
                items.push_str(&format!(
                    "<li><a href=\"{}\">{}</a></li>",
                    desc.list_path(),
                    desc.slug
                ));
            }
            format!(
                "<!doctype html><html><head><title>Admin</title></head><body>\
                 <h1>Admin</h1>\
                 <p>Signed in as {} <a href=\"/logout\">Log out</a></p>\
                 <ul>{}</ul>\
                 </body></html>",
                principal.email, items
            )
        }
        None => "<!doctype html><html><head><title>Admin</title></head><body>\
                 <h1>Admin</h1>\
                 <p><a href=\"/login\">Log in</a> to manage data.</p>\
                 </body></html>"
            .to_string(),
    };
    Html(body)
}
