use std::fs;
use std::path::{Path, PathBuf};

use directories::BaseDirs;
use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Folder name used beneath the user's home directory for application data.
const DATA_DIR_NAME: &str = ".criminal-intent";
/// SQLite file name stored inside the application data directory.
const DB_FILE_NAME: &str = "crimes.sqlite";

/// Open (creating if needed) the database file at `path` and make sure the
/// `crime` table exists.
pub fn open_database(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let conn = Connection::open(path)?;
    ensure_schema(&conn)?;
    Ok(conn)
}

/// Throwaway database used by tests and dry runs.
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    ensure_schema(&conn)?;
    Ok(conn)
}

/// Create the `crime` table if it is missing. Column names follow the layout
/// other tools expect to find in the file, hence the camel-cased `isSolved`.
pub fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS crime (
            id TEXT PRIMARY KEY NOT NULL,
            title TEXT NOT NULL,
            date INTEGER NOT NULL,
            isSolved INTEGER NOT NULL,
            suspect TEXT NOT NULL DEFAULT ''
        )",
        [],
    )?;
    Ok(())
}

/// Resolve the absolute path to the SQLite database inside the user's home.
pub fn default_db_path() -> Result<PathBuf> {
    let base_dirs = BaseDirs::new().ok_or_else(|| {
        StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "could not locate home directory",
        ))
    })?;
    Ok(base_dirs.home_dir().join(DATA_DIR_NAME).join(DB_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_idempotent() {
        let conn = open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'crime'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 1);
    }

    #[test]
    fn open_database_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("crimes.sqlite");

        open_database(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn default_path_lives_under_the_data_dir() {
        if let Ok(path) = default_db_path() {
            assert!(path.ends_with(Path::new(DATA_DIR_NAME).join(DB_FILE_NAME)));
        }
    }
}
