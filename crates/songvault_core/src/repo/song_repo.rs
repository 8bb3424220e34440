//! SQL for the `songs` table.

use crate::model::{EntityKind, ObjectId, Song};
use crate::repo::{bool_to_int, int_to_bool, parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

pub(crate) const SONG_SELECT_SQL: &str = "SELECT
    s.object_id,
    s.title,
    s.date_recorded,
    s.duration,
    s.is_favorite,
    s.user_id
FROM songs s
JOIN users u ON u.object_id = s.user_id";

pub fn insert_song(conn: &Connection, song: &Song) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO songs (object_id, title, date_recorded, duration, is_favorite, user_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
        params![
            song.object_id.uuid().to_string(),
            song.title.as_str(),
            song.date_recorded,
            song.duration,
            bool_to_int(song.is_favorite),
            song.owner.uuid().to_string(),
        ],
    )?;
    Ok(())
}

pub fn get_song(conn: &Connection, object_uuid: Uuid) -> RepoResult<Option<Song>> {
    let mut stmt = conn.prepare(&format!("{SONG_SELECT_SQL} WHERE s.object_id = ?1;"))?;
    let row = stmt
        .query_row([object_uuid.to_string()], |row| Ok(parse_song_row(row)))
        .optional()?;
    row.transpose()
}

/// Identities of every stored song owned by `user_uuid`.
pub fn song_ids_owned_by(conn: &Connection, user_uuid: Uuid) -> RepoResult<Vec<ObjectId>> {
    let mut stmt = conn.prepare("SELECT object_id FROM songs WHERE user_id = ?1 ORDER BY object_id;")?;
    let mut rows = stmt.query([user_uuid.to_string()])?;
    let mut ids = Vec::new();
    while let Some(row) = rows.next()? {
        let text: String = row.get(0)?;
        ids.push(ObjectId::from_parts(
            EntityKind::Song,
            parse_uuid(&text, "songs", "object_id")?,
        ));
    }
    Ok(ids)
}

pub(crate) fn parse_song_row(row: &Row<'_>) -> RepoResult<Song> {
    let object_text: String = row.get(0)?;
    let owner_text: String = row.get(5)?;

    let song = Song {
        object_id: ObjectId::from_parts(
            EntityKind::Song,
            parse_uuid(&object_text, "songs", "object_id")?,
        ),
        title: row.get(1)?,
        date_recorded: row.get(2)?,
        duration: row.get(3)?,
        is_favorite: int_to_bool(row.get(4)?, "songs", "is_favorite")?,
        owner: ObjectId::from_parts(
            EntityKind::User,
            parse_uuid(&owner_text, "songs", "user_id")?,
        ),
    };
    song.validate()
        .map_err(|err| RepoError::InvalidData(format!("song {}: {err}", song.object_id)))?;
    Ok(song)
}
