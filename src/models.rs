use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Core Application Schemas (Mapped to Database) ---

/// Role
///
/// A named role from the `roles` table. Roles are attached to users through
/// the `roles_users` join table; the access gate itself does not branch on
/// them, they only enrich the resolved principal.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, FromRow, Default)]
pub struct Role {
    pub id: Uuid,
    // Unique role name, e.g. "superuser".
    pub name: String,
    pub description: Option<String>,
}

/// User
///
/// The canonical identity record stored in the `users` table.
///
/// The `password` column holds an Argon2 PHC hash and is never serialized:
/// the field is skipped so no response payload can carry it, regardless of
/// which view produced the payload. Rows created through the admin screens
/// have no credential at all (`None`) and cannot authenticate.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, FromRow)]
pub struct User {
    pub id: Uuid,
    // The user's primary identifier. Unique.
    pub email: String,
    #[serde(skip_serializing)]
    #[schema(ignore)]
    pub password: Option<String>,
    // Inactive users fail the access gate and cannot log in.
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Product
///
/// Catalogue row from the `product` table.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, FromRow, Default)]
pub struct Product {
    pub id: Uuid,
    pub name: Option<String>,
    pub color: Option<String>,
    pub price: Option<i64>,
    pub weight: Option<i64>,
}

/// Address
///
/// Shipping address row from the `address` table. The admin list screen for
/// addresses is filterable on all three text columns.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, FromRow, Default)]
pub struct Address {
    pub id: Uuid,
    pub country: Option<String>,
    pub city: Option<String>,
    pub street: Option<String>,
}

/// Order
///
/// A row from the `orders` table. Both foreign keys are mandatory; the
/// referenced Product and Address rows must exist before an order can be
/// created, and cannot be deleted while the order references them.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, FromRow, Default)]
pub struct Order {
    pub id: Uuid,
    pub address_id: Uuid,
    pub product_id: Uuid,
}

// --- Request Payloads (Input Schemas) ---

/// CredentialsForm
///
/// Form payload shared by the login and registration endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CredentialsForm {
    pub email: String,
    pub password: String,
}

// --- Identity Resolution ---

/// Principal
///
/// The resolved identity of an authenticated request: the user row as it
/// exists *now* (not as it was when the session was created) plus the names
/// of the roles attached to it. Anonymous requests have no Principal; they
/// are represented as `None` wherever one is optional.
#[derive(Debug, Clone, Serialize)]
pub struct Principal {
    pub id: Uuid,
    pub email: String,
    pub active: bool,
    pub roles: Vec<String>,
}
