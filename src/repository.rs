use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder, Row as _};
use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::User;
use crate::views::{
    Column, ColumnDefault, ColumnKind, ENTITIES, EntityDescriptor, FieldValue, Filter, Page, Row,
};

/// Repository Trait
///
/// The abstract contract for all persistence operations, shared by the
/// Postgres implementation and the in-memory implementation used in tests.
/// Handlers interact with the data layer exclusively through this trait.
///
/// The CRUD half is descriptor-driven: one set of methods serves every admin
/// screen. The identity half is explicit, because credentials and the active
/// flag must never flow through the generic column machinery.
///
/// **Send + Sync + async_trait** make the trait object (`Arc<dyn Repository>`)
/// safely shareable across Axum's asynchronous task boundaries.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Generic admin CRUD ---

    /// Paginated, filtered listing projected onto the descriptor's visible
    /// columns plus `id`.
    async fn list_rows(
        &self,
        desc: &'static EntityDescriptor,
        filters: &[Filter],
        page: &Page,
    ) -> Result<Vec<Row>, AppError>;

    /// Inserts a row from typed form values and returns the generated id.
    async fn insert_row(
        &self,
        desc: &'static EntityDescriptor,
        values: &[(&'static Column, FieldValue)],
    ) -> Result<Uuid, AppError>;

    /// Partial update of a single row. `NotFound` if the id does not exist.
    async fn update_row(
        &self,
        desc: &'static EntityDescriptor,
        id: Uuid,
        values: &[(&'static Column, FieldValue)],
    ) -> Result<(), AppError>;

    /// Deletes a single row under the restrict policy: a row still referenced
    /// through a foreign key elsewhere is kept and `Conflict` is returned.
    async fn delete_row(
        &self,
        desc: &'static EntityDescriptor,
        id: Uuid,
    ) -> Result<(), AppError>;

    /// Existence probe used to validate submitted foreign-key values.
    async fn row_exists(&self, table: &'static str, id: Uuid) -> Result<bool, AppError>;

    // --- Identity ---

    /// Creates an active, credentialed user. `Conflict` on a duplicate email.
    async fn create_user(&self, email: &str, password_hash: &str) -> Result<User, AppError>;

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    /// Re-reads a user row during principal resolution, so deleted or
    /// deactivated users lose access on their next request.
    async fn user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;

    /// Names of the roles attached to a user through `roles_users`.
    async fn role_names(&self, user_id: Uuid) -> Result<Vec<String>, AppError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the
/// application state.
pub type RepositoryState = Arc<dyn Repository>;

// --- Postgres Implementation ---

/// PostgresRepository
///
/// The production implementation, backed by a PostgreSQL pool. All dynamic
/// SQL is assembled with `QueryBuilder`: column and table names come from
/// static descriptors, values are always bound parameters.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Binds one typed value into a dynamic query. `Null` is pushed as a literal
/// because its column type is not known to the builder.
fn push_value(qb: &mut QueryBuilder<'_, Postgres>, value: &FieldValue) {
    match value {
        FieldValue::Text(s) => {
            qb.push_bind(s.clone());
        }
        FieldValue::Integer(i) => {
            qb.push_bind(*i);
        }
        FieldValue::Boolean(b) => {
            qb.push_bind(*b);
        }
        FieldValue::Uuid(u) => {
            qb.push_bind(*u);
        }
        FieldValue::Null => {
            qb.push("NULL");
        }
    }
}

/// Maps database failures from inserts and updates onto the application
/// taxonomy: unique violations become conflicts, foreign-key violations
/// surface as validation failures (the pre-insert existence check makes this
/// a race-window fallback only).
fn map_write_error(e: sqlx::Error) -> AppError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict("duplicate value for a unique column".to_string())
        }
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            AppError::invalid_field("id", "references a missing row")
        }
        _ => AppError::Database(e),
    }
}

/// Decodes a database row into the JSON projection the list screens serve.
fn row_to_json(desc: &'static EntityDescriptor, row: &sqlx::postgres::PgRow) -> Result<Row, AppError> {
    let mut out = Row::new();
    let id: Uuid = row.try_get("id")?;
    out.insert("id".to_string(), Value::String(id.to_string()));
    for col in desc.projection() {
        let value = match col.kind {
            ColumnKind::Text => row
                .try_get::<Option<String>, _>(col.name)?
                .map(Value::String)
                .unwrap_or(Value::Null),
            ColumnKind::Integer => row
                .try_get::<Option<i64>, _>(col.name)?
                .map(Value::from)
                .unwrap_or(Value::Null),
            ColumnKind::Boolean => row
                .try_get::<Option<bool>, _>(col.name)?
                .map(Value::Bool)
                .unwrap_or(Value::Null),
            ColumnKind::Uuid => row
                .try_get::<Option<Uuid>, _>(col.name)?
                .map(|u| Value::String(u.to_string()))
                .unwrap_or(Value::Null),
        };
        out.insert(col.name.to_string(), value);
    }
    Ok(out)
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn list_rows(
        &self,
        desc: &'static EntityDescriptor,
        filters: &[Filter],
        page: &Page,
    ) -> Result<Vec<Row>, AppError> {
        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new("SELECT id");
        for col in desc.projection() {
            qb.push(", ");
            qb.push(col.name);
        }
        qb.push(" FROM ");
        qb.push(desc.table);

        let mut first = true;
        for filter in filters {
            qb.push(if first { " WHERE " } else { " AND " });
            first = false;
            qb.push(filter.column.name);
            match &filter.value {
                // Substring, case-insensitive, the way list search screens
                // are expected to behave for text columns.
                FieldValue::Text(s) => {
                    qb.push(" ILIKE ");
                    qb.push_bind(format!("%{}%", s));
                }
                other => {
                    qb.push(" = ");
                    push_value(&mut qb, other);
                }
            }
        }

        qb.push(" ORDER BY id LIMIT ");
        qb.push_bind(page.per_page as i64);
        qb.push(" OFFSET ");
        qb.push_bind(page.offset() as i64);

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(|row| row_to_json(desc, row)).collect()
    }

    async fn insert_row(
        &self,
        desc: &'static EntityDescriptor,
        values: &[(&'static Column, FieldValue)],
    ) -> Result<Uuid, AppError> {
        let id = Uuid::new_v4();
        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new("INSERT INTO ");
        qb.push(desc.table);
        qb.push(" (id");
        for (col, _) in values {
            qb.push(", ");
            qb.push(col.name);
        }
        qb.push(") VALUES (");
        qb.push_bind(id);
        for (_, value) in values {
            qb.push(", ");
            push_value(&mut qb, value);
        }
        qb.push(")");

        qb.build().execute(&self.pool).await.map_err(map_write_error)?;
        Ok(id)
    }

    async fn update_row(
        &self,
        desc: &'static EntityDescriptor,
        id: Uuid,
        values: &[(&'static Column, FieldValue)],
    ) -> Result<(), AppError> {
        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new("UPDATE ");
        qb.push(desc.table);
        qb.push(" SET ");
        for (i, (col, value)) in values.iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            qb.push(col.name);
            qb.push(" = ");
            push_value(&mut qb, value);
        }
        qb.push(" WHERE id = ");
        qb.push_bind(id);

        let result = qb.build().execute(&self.pool).await.map_err(map_write_error)?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn delete_row(
        &self,
        desc: &'static EntityDescriptor,
        id: Uuid,
    ) -> Result<(), AppError> {
        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new("DELETE FROM ");
        qb.push(desc.table);
        qb.push(" WHERE id = ");
        qb.push_bind(id);

        let result = qb.build().execute(&self.pool).await.map_err(|e| match &e {
            // ON DELETE RESTRICT in the schema turns referenced deletes into
            // foreign-key violations.
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                AppError::Conflict("row is still referenced".to_string())
            }
            _ => AppError::Database(e),
        })?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn row_exists(&self, table: &'static str, id: Uuid) -> Result<bool, AppError> {
        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new("SELECT 1 FROM ");
        qb.push(table);
        qb.push(" WHERE id = ");
        qb.push_bind(id);
        Ok(qb.build().fetch_optional(&self.pool).await?.is_some())
    }

    async fn create_user(&self, email: &str, password_hash: &str) -> Result<User, AppError> {
        sqlx::query_as::<_, User>(
            "INSERT INTO users (id, email, password, active, created_at) \
             VALUES ($1, $2, $3, TRUE, NOW()) \
             RETURNING id, email, password, active, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Conflict("a user with this email already exists".to_string())
            }
            _ => AppError::Database(e),
        })
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, password, active, created_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, password, active, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn role_names(&self, user_id: Uuid) -> Result<Vec<String>, AppError> {
        let names = sqlx::query_scalar::<_, String>(
            "SELECT r.name FROM roles r \
             JOIN roles_users ru ON ru.role_id = r.id \
             WHERE ru.user_id = $1 \
             ORDER BY r.name",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }
}

// --- In-Memory Implementation (For Tests) ---

#[derive(Default)]
struct MemInner {
    /// table name -> id -> full row (including columns the projection hides).
    tables: HashMap<&'static str, BTreeMap<Uuid, Row>>,
    /// (user_id, role_id) pairs mirroring the `roles_users` join table.
    role_links: Vec<(Uuid, Uuid)>,
}

/// MemoryRepository
///
/// An in-process implementation of `Repository` used by the test suite, so
/// the full HTTP surface can be exercised without a running database. It
/// enforces the same observable behavior as the Postgres implementation:
/// unique columns, foreign-key existence, and restrict-on-delete.
#[derive(Default)]
pub struct MemoryRepository {
    inner: RwLock<MemInner>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, MemInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Test helper: attaches a role to a user, as a `roles_users` row would.
    pub fn assign_role(&self, user_id: Uuid, role_id: Uuid) {
        self.write().role_links.push((user_id, role_id));
    }
}

fn user_from_row(id: Uuid, row: &Row) -> Option<User> {
    Some(User {
        id,
        email: row.get("email")?.as_str()?.to_string(),
        password: row
            .get("password")
            .and_then(Value::as_str)
            .map(str::to_string),
        active: row.get("active").and_then(Value::as_bool).unwrap_or(true),
        created_at: row
            .get("created_at")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(DateTime::UNIX_EPOCH),
    })
}

/// Checks a candidate value against the unique constraint of a column,
/// ignoring the row being updated (if any).
fn violates_unique(
    table: &BTreeMap<Uuid, Row>,
    column: &Column,
    candidate: &Value,
    skip_id: Option<Uuid>,
) -> bool {
    if candidate.is_null() {
        return false;
    }
    table
        .iter()
        .filter(|(id, _)| Some(**id) != skip_id)
        .any(|(_, row)| row.get(column.name) == Some(candidate))
}

fn filter_matches(row: &Row, filter: &Filter) -> bool {
    let current = row.get(filter.column.name).unwrap_or(&Value::Null);
    match &filter.value {
        FieldValue::Text(needle) => current
            .as_str()
            .map(|v| v.to_lowercase().contains(&needle.to_lowercase()))
            .unwrap_or(false),
        other => *current == other.to_json(),
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn list_rows(
        &self,
        desc: &'static EntityDescriptor,
        filters: &[Filter],
        page: &Page,
    ) -> Result<Vec<Row>, AppError> {
        let inner = self.read();
        let Some(table) = inner.tables.get(desc.table) else {
            return Ok(Vec::new());
        };
        let rows = table
            .values()
            .filter(|row| filters.iter().all(|f| filter_matches(row, f)))
            .skip(page.offset() as usize)
            .take(page.per_page as usize)
            .map(|row| desc.project_row(row))
            .collect();
        Ok(rows)
    }

    async fn insert_row(
        &self,
        desc: &'static EntityDescriptor,
        values: &[(&'static Column, FieldValue)],
    ) -> Result<Uuid, AppError> {
        let mut inner = self.write();
        let table = inner.tables.entry(desc.table).or_default();

        for (col, value) in values {
            if col.unique && violates_unique(table, col, &value.to_json(), None) {
                return Err(AppError::Conflict(
                    "duplicate value for a unique column".to_string(),
                ));
            }
        }

        let id = Uuid::new_v4();
        let mut row = Row::new();
        row.insert("id".to_string(), Value::String(id.to_string()));
        for col in desc.writable() {
            let value = values
                .iter()
                .find(|(c, _)| c.name == col.name)
                .map(|(_, v)| v.to_json())
                .unwrap_or(match col.default {
                    ColumnDefault::Bool(b) => Value::Bool(b),
                    ColumnDefault::None => Value::Null,
                });
            row.insert(col.name.to_string(), value);
        }
        table.insert(id, row);
        Ok(id)
    }

    async fn update_row(
        &self,
        desc: &'static EntityDescriptor,
        id: Uuid,
        values: &[(&'static Column, FieldValue)],
    ) -> Result<(), AppError> {
        let mut inner = self.write();
        let Some(table) = inner.tables.get_mut(desc.table) else {
            return Err(AppError::NotFound);
        };
        if !table.contains_key(&id) {
            return Err(AppError::NotFound);
        }

        for (col, value) in values {
            if col.unique && violates_unique(table, col, &value.to_json(), Some(id)) {
                return Err(AppError::Conflict(
                    "duplicate value for a unique column".to_string(),
                ));
            }
        }

        let row = table.get_mut(&id).ok_or(AppError::NotFound)?;
        for (col, value) in values {
            row.insert(col.name.to_string(), value.to_json());
        }
        Ok(())
    }

    async fn delete_row(
        &self,
        desc: &'static EntityDescriptor,
        id: Uuid,
    ) -> Result<(), AppError> {
        let mut inner = self.write();

        let exists = inner
            .tables
            .get(desc.table)
            .map(|t| t.contains_key(&id))
            .unwrap_or(false);
        if !exists {
            return Err(AppError::NotFound);
        }

        // Restrict policy: refuse while any registered screen's rows still
        // reference this one.
        let id_value = Value::String(id.to_string());
        for other in ENTITIES {
            for fk in other.references {
                if fk.references != desc.table {
                    continue;
                }
                let referenced = inner
                    .tables
                    .get(other.table)
                    .map(|t| t.values().any(|row| row.get(fk.column) == Some(&id_value)))
                    .unwrap_or(false);
                if referenced {
                    return Err(AppError::Conflict("row is still referenced".to_string()));
                }
            }
        }
        // The roles_users join table is not an admin screen but restricts all
        // the same.
        let linked = match desc.table {
            "users" => inner.role_links.iter().any(|(u, _)| *u == id),
            "roles" => inner.role_links.iter().any(|(_, r)| *r == id),
            _ => false,
        };
        if linked {
            return Err(AppError::Conflict("row is still referenced".to_string()));
        }

        inner
            .tables
            .get_mut(desc.table)
            .and_then(|t| t.remove(&id))
            .ok_or(AppError::NotFound)?;
        Ok(())
    }

    async fn row_exists(&self, table: &'static str, id: Uuid) -> Result<bool, AppError> {
        Ok(self
            .read()
            .tables
            .get(table)
            .map(|t| t.contains_key(&id))
            .unwrap_or(false))
    }

    async fn create_user(&self, email: &str, password_hash: &str) -> Result<User, AppError> {
        let mut inner = self.write();
        let table = inner.tables.entry("users").or_default();

        let email_value = Value::String(email.to_string());
        if table.values().any(|row| row.get("email") == Some(&email_value)) {
            return Err(AppError::Conflict(
                "a user with this email already exists".to_string(),
            ));
        }

        let id = Uuid::new_v4();
        let created_at = Utc::now();
        let mut row = Row::new();
        row.insert("id".to_string(), Value::String(id.to_string()));
        row.insert("email".to_string(), email_value);
        row.insert(
            "password".to_string(),
            Value::String(password_hash.to_string()),
        );
        row.insert("active".to_string(), Value::Bool(true));
        row.insert(
            "created_at".to_string(),
            Value::String(created_at.to_rfc3339()),
        );
        table.insert(id, row);

        Ok(User {
            id,
            email: email.to_string(),
            password: Some(password_hash.to_string()),
            active: true,
            created_at,
        })
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let inner = self.read();
        let Some(table) = inner.tables.get("users") else {
            return Ok(None);
        };
        let email_value = Value::String(email.to_string());
        Ok(table
            .iter()
            .find(|(_, row)| row.get("email") == Some(&email_value))
            .and_then(|(id, row)| user_from_row(*id, row)))
    }

    async fn user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let inner = self.read();
        Ok(inner
            .tables
            .get("users")
            .and_then(|t| t.get(&id))
            .and_then(|row| user_from_row(id, row)))
    }

    async fn role_names(&self, user_id: Uuid) -> Result<Vec<String>, AppError> {
        let inner = self.read();
        let role_ids: Vec<Uuid> = inner
            .role_links
            .iter()
            .filter(|(u, _)| *u == user_id)
            .map(|(_, r)| *r)
            .collect();
        let Some(roles) = inner.tables.get("roles") else {
            return Ok(Vec::new());
        };
        let mut names: Vec<String> = role_ids
            .iter()
            .filter_map(|id| roles.get(id))
            .filter_map(|row| row.get("name").and_then(Value::as_str))
            .map(str::to_string)
            .collect();
        names.sort();
        Ok(names)
    }
}
