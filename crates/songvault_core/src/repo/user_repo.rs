//! SQL for the `users` table.

use crate::model::{EntityKind, ObjectId, User};
use crate::repo::{parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};

pub(crate) const USER_SELECT_SQL: &str = "SELECT
    u.object_id,
    u.unique_id,
    u.username,
    u.age
FROM users u";

pub fn insert_user(conn: &Connection, user: &User) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO users (object_id, unique_id, username, age) VALUES (?1, ?2, ?3, ?4);",
        params![
            user.object_id.uuid().to_string(),
            user.unique_id.to_string(),
            user.username.as_str(),
            user.age,
        ],
    )?;
    Ok(())
}

pub fn get_user(conn: &Connection, object_uuid: uuid::Uuid) -> RepoResult<Option<User>> {
    let mut stmt = conn.prepare(&format!("{USER_SELECT_SQL} WHERE u.object_id = ?1;"))?;
    let row = stmt
        .query_row([object_uuid.to_string()], |row| Ok(parse_user_row(row)))
        .optional()?;
    row.transpose()
}

pub(crate) fn parse_user_row(row: &Row<'_>) -> RepoResult<User> {
    let object_text: String = row.get(0)?;
    let unique_text: String = row.get(1)?;
    let age: i64 = row.get(3)?;

    let user = User {
        object_id: ObjectId::from_parts(
            EntityKind::User,
            parse_uuid(&object_text, "users", "object_id")?,
        ),
        unique_id: parse_uuid(&unique_text, "users", "unique_id")?,
        username: row.get(2)?,
        age: i32::try_from(age)
            .map_err(|_| RepoError::InvalidData(format!("invalid age `{age}` in users.age")))?,
    };
    user.validate()
        .map_err(|err| RepoError::InvalidData(format!("user {}: {err}", user.object_id)))?;
    Ok(user)
}
