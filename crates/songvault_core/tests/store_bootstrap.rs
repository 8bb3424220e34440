use rusqlite::Connection;
use songvault_core::db::migrations::latest_version;
use songvault_core::db::{open_db, open_db_in_memory, DbError, Store, StoreLocation};
use songvault_core::{
    ConfigError, LibraryService, PersistenceController, PersistenceError, StoreConfig,
};

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "users");
    assert_table_exists(&conn, "songs");
    let foreign_keys: i64 = conn
        .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(foreign_keys, 1);
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("SongVault.sqlite3");

    let first = open_db(&path).unwrap();
    assert_eq!(schema_version(&first), latest_version());
    drop(first);

    let second = open_db(&path).unwrap();
    assert_eq!(schema_version(&second), latest_version());
    assert_table_exists(&second, "songs");
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.sqlite3");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    match Store::open(&path) {
        Err(DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        }) => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("newer schema must be rejected"),
    }
}

#[test]
fn store_reports_location_and_starts_at_sequence_zero() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("songs.sqlite3");

    let store = Store::open(&path).unwrap();
    assert_eq!(store.location(), &StoreLocation::File(path));
    assert_eq!(store.commit_sequence(), 0);

    let memory = Store::open_in_memory().unwrap();
    assert_eq!(memory.location(), &StoreLocation::Memory);
}

#[test]
fn controller_rejects_invalid_config_before_touching_disk() {
    let err = PersistenceController::open(&StoreConfig::new("relative/dir"))
        .err()
        .unwrap();
    assert!(matches!(
        err,
        PersistenceError::StoreOpen(DbError::InvalidLocation(ConfigError::RelativeDirectory(_)))
    ));
}

#[test]
fn reopening_file_store_keeps_saved_data() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::new(dir.path()).with_name("Library");

    let song = {
        let mut service = LibraryService::open(&config).unwrap();
        service.add_song("MusicLover123").unwrap()
    };
    assert!(config.database_path().exists());

    let mut reopened = LibraryService::open(&config).unwrap();
    assert_eq!(reopened.songs_for_user("MusicLover123"), vec![song]);
    assert!(reopened.fetch_user("MusicLover123").is_some());
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1);",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "missing table {table_name}");
}
