//! Row-level persistence for users and songs.
//!
//! # Responsibility
//! - Translate entities, property change sets and predicates into SQL.
//! - Keep SQL details below the context layer.
//!
//! # Invariants
//! - Updates touch only the columns named in the change set, so concurrent
//!   writers editing different properties of one row never clobber each other.
//! - Read paths reject malformed persisted rows instead of masking them.
//! - Batch deletes never materialize entities; they return identities only.

pub mod song_repo;
pub mod user_repo;

use crate::db::DbError;
use crate::model::{Attribute, Entity, EntityKind, ObjectId, Value};
use crate::query::{BatchDeleteRequest, FetchRequest, KeyPath, Predicate};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type RepoResult<T> = Result<T, RepoError>;

/// Error for row-level persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    InvalidData(String),
    InvalidQuery(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::InvalidQuery(message) => write!(f, "invalid query: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::InvalidData(_) | Self::InvalidQuery(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Fetches every stored entity matching the request's predicate.
///
/// Sorting and limits are applied by the caller after cached objects are
/// merged in, so rows come back in primary-key order.
pub fn fetch_entities(conn: &Connection, request: &FetchRequest) -> RepoResult<Vec<Entity>> {
    if !request.is_valid() {
        return Err(RepoError::InvalidQuery(format!(
            "request does not fit entity `{}`",
            request.entity
        )));
    }

    let mut sql = select_sql(request.entity).to_string();
    let mut bind_values = Vec::new();
    if let Some(predicate) = &request.predicate {
        sql.push_str(" WHERE ");
        compile_predicate(predicate, &mut sql, &mut bind_values);
    }
    sql.push_str(match request.entity {
        EntityKind::User => " ORDER BY u.object_id",
        EntityKind::Song => " ORDER BY s.object_id",
    });

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(bind_values))?;
    let mut entities = Vec::new();
    while let Some(row) = rows.next()? {
        entities.push(match request.entity {
            EntityKind::User => Entity::User(user_repo::parse_user_row(row)?),
            EntityKind::Song => Entity::Song(song_repo::parse_song_row(row)?),
        });
    }
    Ok(entities)
}

/// Loads one entity by identity.
pub fn load_entity(conn: &Connection, object_id: ObjectId) -> RepoResult<Option<Entity>> {
    match object_id.kind() {
        EntityKind::User => Ok(user_repo::get_user(conn, object_id.uuid())?.map(Entity::User)),
        EntityKind::Song => Ok(song_repo::get_song(conn, object_id.uuid())?.map(Entity::Song)),
    }
}

pub fn insert_entity(conn: &Connection, entity: &Entity) -> RepoResult<()> {
    match entity {
        Entity::User(user) => user_repo::insert_user(conn, user),
        Entity::Song(song) => song_repo::insert_song(conn, song),
    }
}

/// Writes only the given properties. Returns `false` when the row is gone.
pub fn update_entity(
    conn: &Connection,
    object_id: ObjectId,
    properties: &[(Attribute, Value)],
) -> RepoResult<bool> {
    if properties.is_empty() {
        return Ok(true);
    }

    let mut assignments = Vec::with_capacity(properties.len());
    let mut bind_values = Vec::with_capacity(properties.len() + 1);
    for (index, (attribute, value)) in properties.iter().enumerate() {
        if attribute.entity() != object_id.kind() || attribute.is_immutable() {
            return Err(RepoError::InvalidQuery(format!(
                "attribute `{attribute}` cannot be updated on {object_id}"
            )));
        }
        assignments.push(format!("{} = ?{}", attribute.column(), index + 1));
        bind_values.push(to_sql_value(value));
    }
    bind_values.push(SqlValue::Text(object_id.uuid().to_string()));

    let sql = format!(
        "UPDATE {} SET {} WHERE object_id = ?{};",
        table_name(object_id.kind()),
        assignments.join(", "),
        bind_values.len()
    );
    let changed = conn.execute(&sql, params_from_iter(bind_values))?;
    Ok(changed > 0)
}

/// Deletes one row. Returns `false` when it was already gone.
pub fn delete_entity(conn: &Connection, object_id: ObjectId) -> RepoResult<bool> {
    let changed = conn.execute(
        &format!(
            "DELETE FROM {} WHERE object_id = ?1;",
            table_name(object_id.kind())
        ),
        [object_id.uuid().to_string()],
    )?;
    Ok(changed > 0)
}

/// Deletes every row matching the request and returns the deleted identities.
///
/// Deleting users also deletes (and reports) the songs they own.
pub fn batch_delete(conn: &Connection, request: &BatchDeleteRequest) -> RepoResult<Vec<ObjectId>> {
    if !request.is_valid() {
        return Err(RepoError::InvalidQuery(format!(
            "batch delete does not fit entity `{}`",
            request.entity
        )));
    }

    let targets = select_ids(conn, request.entity, request.predicate.as_ref())?;
    let mut deleted = Vec::with_capacity(targets.len());

    if request.entity == EntityKind::User {
        for user in &targets {
            let owned = song_repo::song_ids_owned_by(conn, user.uuid())?;
            for song in owned {
                if delete_entity(conn, song)? {
                    deleted.push(song);
                }
            }
        }
    }

    for object_id in targets {
        if delete_entity(conn, object_id)? {
            deleted.push(object_id);
        }
    }
    Ok(deleted)
}

/// Number of stored rows of one kind.
pub fn count_entities(conn: &Connection, kind: EntityKind) -> RepoResult<usize> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {};", table_name(kind)),
        [],
        |row| row.get(0),
    )?;
    Ok(usize::try_from(count).unwrap_or_default())
}

fn select_ids(
    conn: &Connection,
    kind: EntityKind,
    predicate: Option<&Predicate>,
) -> RepoResult<Vec<ObjectId>> {
    let mut sql = match kind {
        EntityKind::User => "SELECT u.object_id FROM users u".to_string(),
        EntityKind::Song => {
            "SELECT s.object_id FROM songs s JOIN users u ON u.object_id = s.user_id".to_string()
        }
    };
    let mut bind_values = Vec::new();
    if let Some(predicate) = predicate {
        sql.push_str(" WHERE ");
        compile_predicate(predicate, &mut sql, &mut bind_values);
    }

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(bind_values))?;
    let mut ids = Vec::new();
    while let Some(row) = rows.next()? {
        let text: String = row.get(0)?;
        ids.push(ObjectId::from_parts(
            kind,
            parse_uuid(&text, table_name(kind), "object_id")?,
        ));
    }
    Ok(ids)
}

fn select_sql(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::User => user_repo::USER_SELECT_SQL,
        EntityKind::Song => song_repo::SONG_SELECT_SQL,
    }
}

pub(crate) fn table_name(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::User => "users",
        EntityKind::Song => "songs",
    }
}

fn table_alias(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::User => "u",
        EntityKind::Song => "s",
    }
}

/// Appends a SQL boolean expression for `predicate`. Callers must have
/// checked `Predicate::is_valid_for` first.
fn compile_predicate(predicate: &Predicate, sql: &mut String, bind_values: &mut Vec<SqlValue>) {
    match predicate {
        Predicate::Equals(key_path, value) => {
            let column = match key_path {
                KeyPath::Attribute(attribute) => {
                    format!("{}.{}", table_alias(attribute.entity()), attribute.column())
                }
                KeyPath::Owner(attribute) => format!("u.{}", attribute.column()),
            };
            bind_values.push(to_sql_value(value));
            sql.push_str(&format!("{column} = ?{}", bind_values.len()));
        }
        Predicate::And(parts) if parts.is_empty() => sql.push_str("1 = 1"),
        Predicate::And(parts) => {
            sql.push('(');
            for (index, part) in parts.iter().enumerate() {
                if index > 0 {
                    sql.push_str(" AND ");
                }
                compile_predicate(part, sql, bind_values);
            }
            sql.push(')');
        }
    }
}

pub(crate) fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Text(text) => SqlValue::Text(text.clone()),
        Value::Integer(number) => SqlValue::Integer(*number),
        Value::Real(number) => SqlValue::Real(*number),
        Value::Bool(flag) => SqlValue::Integer(bool_to_int(*flag)),
        Value::Uuid(uuid) => SqlValue::Text(uuid.to_string()),
        Value::Reference(object_id) => SqlValue::Text(object_id.uuid().to_string()),
    }
}

pub(crate) fn parse_uuid(text: &str, table: &str, column: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(text).map_err(|_| {
        RepoError::InvalidData(format!("invalid uuid value `{text}` in {table}.{column}"))
    })
}

pub(crate) fn int_to_bool(value: i64, table: &str, column: &str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid boolean value `{other}` in {table}.{column}"
        ))),
    }
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
