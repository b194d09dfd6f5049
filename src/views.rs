use axum::{
    Form, Json,
    extract::{Path, Query, State},
    response::Redirect,
};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::{AppState, auth::AdminUser, error::AppError};

/// A single projected row, keyed by column name. The dynamic row shape is the
/// price of having one CRUD implementation for every screen.
pub type Row = serde_json::Map<String, Value>;

/// Column names that may never be projected or written through the generic
/// CRUD layer, no matter what a descriptor asks for. Credentials belong to
/// the identity service exclusively.
pub const CREDENTIAL_COLUMNS: &[&str] = &["password", "password_hash"];

/// Default page size for list screens.
pub const DEFAULT_PER_PAGE: u64 = 20;
/// Hard ceiling on the page size a client may request.
pub const MAX_PER_PAGE: u64 = 100;

// --- Entity Descriptors ---

/// ColumnKind
///
/// The wire/storage type of a descriptor column. Drives form parsing, SQL
/// binding and JSON projection for that column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
    Boolean,
    Uuid,
}

/// Default applied when a writable column is omitted from a create form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnDefault {
    None,
    Bool(bool),
}

/// Column
///
/// One column of an admin screen: its name, type, and the constraints the
/// generic layer enforces before the database ever sees a value.
#[derive(Debug)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub required: bool,
    pub unique: bool,
    pub default: ColumnDefault,
}

impl Column {
    pub const fn new(name: &'static str, kind: ColumnKind) -> Self {
        Self {
            name,
            kind,
            required: false,
            unique: false,
            default: ColumnDefault::None,
        }
    }

    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub const fn default_bool(mut self, value: bool) -> Self {
        self.default = ColumnDefault::Bool(value);
        self
    }

    /// True for columns on the credential deny-list. Such columns are
    /// excluded from projection and from the writable set even when a
    /// descriptor lists them.
    pub fn is_credential(&self) -> bool {
        CREDENTIAL_COLUMNS.contains(&self.name)
    }
}

/// A foreign key column and the table it must point into.
#[derive(Debug)]
pub struct ForeignKey {
    pub column: &'static str,
    pub references: &'static str,
}

/// EntityDescriptor
///
/// Everything the generic CRUD layer needs to serve one admin screen: the
/// URL slug, the backing table, the column set, which columns are filterable
/// on the list screen, and which columns are foreign keys. Adding a screen
/// is adding a descriptor; there is no per-entity handler code.
#[derive(Debug)]
pub struct EntityDescriptor {
    pub slug: &'static str,
    pub table: &'static str,
    pub columns: &'static [Column],
    pub filterable: &'static [&'static str],
    pub references: &'static [ForeignKey],
}

/// The registered admin screens. Slugs match the admin URL layout
/// (`/admin/users/`, `/admin/product/`, ...).
///
/// The `users` descriptor deliberately lists the `password` column: the
/// deny-list drops it from projection and the writable set, and the router
/// flags the configuration at startup. Listing it documents the column;
/// showing it would leak credentials.
pub static ENTITIES: &[EntityDescriptor] = &[
    EntityDescriptor {
        slug: "users",
        table: "users",
        columns: &[
            Column::new("email", ColumnKind::Text).required().unique(),
            Column::new("password", ColumnKind::Text),
            Column::new("active", ColumnKind::Boolean).default_bool(true),
        ],
        filterable: &[],
        references: &[],
    },
    EntityDescriptor {
        slug: "roles",
        table: "roles",
        columns: &[
            Column::new("name", ColumnKind::Text).required().unique(),
            Column::new("description", ColumnKind::Text),
        ],
        filterable: &[],
        references: &[],
    },
    EntityDescriptor {
        slug: "product",
        table: "product",
        columns: &[
            Column::new("name", ColumnKind::Text).required(),
            Column::new("color", ColumnKind::Text),
            Column::new("price", ColumnKind::Integer),
            Column::new("weight", ColumnKind::Integer),
        ],
        filterable: &[],
        references: &[],
    },
    EntityDescriptor {
        slug: "address",
        table: "address",
        columns: &[
            Column::new("country", ColumnKind::Text),
            Column::new("city", ColumnKind::Text),
            Column::new("street", ColumnKind::Text),
        ],
        filterable: &["country", "city", "street"],
        references: &[],
    },
    EntityDescriptor {
        slug: "order",
        table: "orders",
        columns: &[
            Column::new("address_id", ColumnKind::Uuid).required(),
            Column::new("product_id", ColumnKind::Uuid).required(),
        ],
        filterable: &[],
        references: &[
            ForeignKey {
                column: "address_id",
                references: "address",
            },
            ForeignKey {
                column: "product_id",
                references: "product",
            },
        ],
    },
];

impl EntityDescriptor {
    /// Looks up a registered screen by its URL slug.
    pub fn by_slug(slug: &str) -> Option<&'static EntityDescriptor> {
        ENTITIES.iter().find(|d| d.slug == slug)
    }

    /// Columns included in the list projection. Credential columns are
    /// filtered out unconditionally.
    pub fn projection(&self) -> impl Iterator<Item = &'static Column> {
        self.columns.iter().filter(|c| !c.is_credential())
    }

    /// Columns a form may set. Identical to the projection: what the screen
    /// shows is what the screen edits.
    pub fn writable(&self) -> impl Iterator<Item = &'static Column> {
        self.projection()
    }

    pub fn foreign_key_for(&self, column: &str) -> Option<&'static ForeignKey> {
        self.references.iter().find(|fk| fk.column == column)
    }

    /// Canonical list URL for this screen, used as the redirect target after
    /// every successful mutation.
    pub fn list_path(&self) -> String {
        format!("/admin/{}/", self.slug)
    }

    /// Projects a full row map down to the visible columns plus `id`.
    pub fn project_row(&self, full: &Row) -> Row {
        let mut out = Row::new();
        if let Some(id) = full.get("id") {
            out.insert("id".to_string(), id.clone());
        }
        for col in self.projection() {
            let value = full.get(col.name).cloned().unwrap_or(Value::Null);
            out.insert(col.name.to_string(), value);
        }
        out
    }
}

// --- Form Parsing ---

/// A parsed form value, typed according to the descriptor column it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Boolean(bool),
    Uuid(Uuid),
    Null,
}

impl FieldValue {
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::Integer(i) => Value::from(*i),
            FieldValue::Boolean(b) => Value::Bool(*b),
            FieldValue::Uuid(u) => Value::String(u.to_string()),
            FieldValue::Null => Value::Null,
        }
    }
}

/// Distinguishes create (required columns must be present) from edit
/// (absent columns are simply left untouched).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMode {
    Create,
    Edit,
}

/// parse_field
///
/// Parses one raw form value against its column. An empty value clears an
/// optional column and is rejected for a required one.
pub fn parse_field(column: &Column, raw: &str) -> Result<FieldValue, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        if column.required {
            return Err("must not be empty".to_string());
        }
        return Ok(FieldValue::Null);
    }
    match column.kind {
        ColumnKind::Text => Ok(FieldValue::Text(raw.to_string())),
        ColumnKind::Integer => raw
            .parse::<i64>()
            .map(FieldValue::Integer)
            .map_err(|_| "must be an integer".to_string()),
        ColumnKind::Boolean => match raw {
            "true" | "on" | "1" => Ok(FieldValue::Boolean(true)),
            "false" | "off" | "0" => Ok(FieldValue::Boolean(false)),
            _ => Err("must be a boolean".to_string()),
        },
        ColumnKind::Uuid => Uuid::parse_str(raw)
            .map(FieldValue::Uuid)
            .map_err(|_| "must be a row id".to_string()),
    }
}

/// parse_form
///
/// Validates a submitted form against a descriptor and returns the typed
/// values to persist. All field problems are collected into one validation
/// error so the caller can re-render the whole form at once.
pub fn parse_form(
    desc: &'static EntityDescriptor,
    form: &HashMap<String, String>,
    mode: FormMode,
) -> Result<Vec<(&'static Column, FieldValue)>, AppError> {
    let mut errors: BTreeMap<String, String> = BTreeMap::new();
    let mut values: Vec<(&'static Column, FieldValue)> = Vec::new();

    for (key, raw) in form {
        match desc.writable().find(|c| c.name == key.as_str()) {
            Some(column) => match parse_field(column, raw) {
                Ok(value) => values.push((column, value)),
                Err(message) => {
                    errors.insert(key.clone(), message);
                }
            },
            None => {
                let message = if CREDENTIAL_COLUMNS.contains(&key.as_str()) {
                    "credential fields are managed by the identity service"
                } else {
                    "unknown field"
                };
                errors.insert(key.clone(), message.to_string());
            }
        }
    }

    if mode == FormMode::Create {
        for column in desc.writable() {
            if column.required && !form.contains_key(column.name) {
                errors.insert(column.name.to_string(), "is required".to_string());
            }
        }
    }

    if errors.is_empty() {
        Ok(values)
    } else {
        Err(AppError::Validation(errors))
    }
}

// --- List Parameters ---

/// Pagination window for list screens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: u64,
    pub per_page: u64,
}

impl Page {
    /// Reads `page` and `per_page` from the query string. Unparsable values
    /// fall back to the defaults; the page size is clamped to `MAX_PER_PAGE`.
    pub fn from_query(params: &HashMap<String, String>) -> Page {
        let number = params
            .get("page")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|n| *n >= 1)
            .unwrap_or(1);
        let per_page = params
            .get("per_page")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|n| *n >= 1)
            .unwrap_or(DEFAULT_PER_PAGE)
            .min(MAX_PER_PAGE);
        Page { number, per_page }
    }

    pub fn offset(&self) -> u64 {
        (self.number - 1) * self.per_page
    }
}

/// One active list filter. Text columns match by case-insensitive substring,
/// everything else by equality.
#[derive(Debug)]
pub struct Filter {
    pub column: &'static Column,
    pub value: FieldValue,
}

/// Extracts the filters a descriptor allows from the raw query string.
/// Query keys that are not configured as filterable are ignored.
pub fn filters_from_query(
    desc: &'static EntityDescriptor,
    params: &HashMap<String, String>,
) -> Result<Vec<Filter>, AppError> {
    let mut filters = Vec::new();
    for name in desc.filterable {
        let Some(raw) = params.get(*name) else {
            continue;
        };
        let Some(column) = desc.projection().find(|c| c.name == *name) else {
            continue;
        };
        match parse_field(column, raw) {
            Ok(FieldValue::Null) => {}
            Ok(value) => filters.push(Filter { column, value }),
            Err(message) => return Err(AppError::invalid_field(name, &message)),
        }
    }
    Ok(filters)
}

// --- Generic CRUD Handlers ---
//
// One handler per operation, shared by every screen. Each takes `AdminUser`
// as its first extractor so the access gate runs before the entity slug is
// even looked at: an anonymous request to any admin URL redirects to /login
// without touching the repository.

/// list_entity
///
/// [Gated] Paginated, filterable list of an entity's rows, projected onto
/// the descriptor's visible columns plus `id`.
#[utoipa::path(
    get,
    path = "/admin/{entity}/",
    params(
        ("entity" = String, Path, description = "Entity slug"),
        ("page" = Option<u64>, Query, description = "1-based page number"),
        ("per_page" = Option<u64>, Query, description = "Page size, capped at 100"),
    ),
    responses(
        (status = 200, description = "JSON array of projected rows"),
        (status = 302, description = "Anonymous or inactive principal, redirected to /login"),
        (status = 404, description = "Unknown entity slug")
    )
)]
pub async fn list_entity(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<Row>>, AppError> {
    let desc = EntityDescriptor::by_slug(&entity).ok_or(AppError::NotFound)?;
    let page = Page::from_query(&params);
    let filters = filters_from_query(desc, &params)?;
    let rows = state.repo.list_rows(desc, &filters, &page).await?;
    Ok(Json(rows))
}

/// create_entity
///
/// [Gated] Inserts a row from a form body. Foreign-key fields must reference
/// existing rows; violations are reported as field-level validation errors
/// before any write happens.
#[utoipa::path(
    post,
    path = "/admin/{entity}/",
    params(("entity" = String, Path, description = "Entity slug")),
    responses(
        (status = 303, description = "Created, redirected to the list screen"),
        (status = 302, description = "Anonymous or inactive principal, redirected to /login"),
        (status = 409, description = "Unique constraint violation"),
        (status = 422, description = "Field validation errors")
    )
)]
pub async fn create_entity(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Redirect, AppError> {
    let desc = EntityDescriptor::by_slug(&entity).ok_or(AppError::NotFound)?;
    let values = parse_form(desc, &form, FormMode::Create)?;
    check_references(&state, desc, &values).await?;
    state.repo.insert_row(desc, &values).await?;
    Ok(Redirect::to(&desc.list_path()))
}

/// update_entity
///
/// [Gated] Partial update: only the submitted fields change. Unknown row ids
/// are a 404, bad fields a 422.
#[utoipa::path(
    post,
    path = "/admin/{entity}/{id}",
    params(
        ("entity" = String, Path, description = "Entity slug"),
        ("id" = String, Path, description = "Row id"),
    ),
    responses(
        (status = 303, description = "Updated, redirected to the list screen"),
        (status = 302, description = "Anonymous or inactive principal, redirected to /login"),
        (status = 404, description = "Unknown slug or row id"),
        (status = 422, description = "Field validation errors")
    )
)]
pub async fn update_entity(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Redirect, AppError> {
    let desc = EntityDescriptor::by_slug(&entity).ok_or(AppError::NotFound)?;
    let id = Uuid::parse_str(&id).map_err(|_| AppError::NotFound)?;
    let values = parse_form(desc, &form, FormMode::Edit)?;
    if !values.is_empty() {
        check_references(&state, desc, &values).await?;
        state.repo.update_row(desc, id, &values).await?;
    }
    Ok(Redirect::to(&desc.list_path()))
}

/// delete_entity
///
/// [Gated] Deletes a row. The restrict policy applies: a row still referenced
/// by a foreign key elsewhere is not deleted and the request fails with 409.
#[utoipa::path(
    post,
    path = "/admin/{entity}/{id}/delete",
    params(
        ("entity" = String, Path, description = "Entity slug"),
        ("id" = String, Path, description = "Row id"),
    ),
    responses(
        (status = 303, description = "Deleted, redirected to the list screen"),
        (status = 302, description = "Anonymous or inactive principal, redirected to /login"),
        (status = 404, description = "Unknown slug or row id"),
        (status = 409, description = "Row is still referenced")
    )
)]
pub async fn delete_entity(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, String)>,
) -> Result<Redirect, AppError> {
    let desc = EntityDescriptor::by_slug(&entity).ok_or(AppError::NotFound)?;
    let id = Uuid::parse_str(&id).map_err(|_| AppError::NotFound)?;
    state.repo.delete_row(desc, id).await?;
    Ok(Redirect::to(&desc.list_path()))
}

/// Verifies that every submitted foreign-key value points at an existing row.
/// Runs before the insert/update so a dangling reference surfaces as a field
/// validation error rather than a database failure.
async fn check_references(
    state: &AppState,
    desc: &'static EntityDescriptor,
    values: &[(&'static Column, FieldValue)],
) -> Result<(), AppError> {
    for (column, value) in values {
        let Some(fk) = desc.foreign_key_for(column.name) else {
            continue;
        };
        if let FieldValue::Uuid(id) = value {
            if !state.repo.row_exists(fk.references, *id).await? {
                return Err(AppError::invalid_field(
                    column.name,
                    "references a missing row",
                ));
            }
        }
    }
    Ok(())
}
