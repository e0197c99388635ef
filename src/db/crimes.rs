use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::models::Crime;

const SELECT_COLUMNS: &str = "SELECT id, title, date, isSolved, suspect FROM crime";

/// Every crime in storage order. Rowids never move on update, so this is the
/// order the crimes were first inserted in.
pub fn fetch_crimes(conn: &Connection) -> Result<Vec<Crime>> {
    let mut stmt = conn.prepare_cached(&format!("{SELECT_COLUMNS} ORDER BY rowid"))?;

    let crimes = stmt
        .query_map([], crime_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(crimes)
}

/// Point read of one crime.
pub fn fetch_crime(conn: &Connection, id: Uuid) -> Result<Crime> {
    let mut stmt = conn.prepare_cached(&format!("{SELECT_COLUMNS} WHERE id = ?1"))?;

    stmt.query_row([id.to_string()], crime_from_row)
        .optional()?
        .ok_or(StoreError::NotFound(id))
}

/// Insert a new crime. An id that is already taken comes back as
/// `DuplicateKey`.
pub fn insert_crime(conn: &Connection, crime: &Crime) -> Result<()> {
    let date = stored_date(crime)?;
    conn.execute(
        "INSERT INTO crime (id, title, date, isSolved, suspect) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            crime.id.to_string(),
            crime.title,
            date,
            crime.is_solved,
            crime.suspect
        ],
    )
    .map_err(|err| StoreError::from_insert(err, crime.id))?;
    Ok(())
}

/// Overwrite every mutable column of an existing crime. Touching zero rows
/// means the id is unknown, which is reported instead of silently ignored.
pub fn update_crime(conn: &Connection, crime: &Crime) -> Result<()> {
    let date = stored_date(crime)?;
    let updated = conn.execute(
        "UPDATE crime SET title = ?1, date = ?2, isSolved = ?3, suspect = ?4 WHERE id = ?5",
        params![
            crime.title,
            date,
            crime.is_solved,
            crime.suspect,
            crime.id.to_string()
        ],
    )?;

    if updated == 0 {
        Err(StoreError::NotFound(crime.id))
    } else {
        Ok(())
    }
}

/// Remove a crime. Returns whether a row was actually deleted; deleting an
/// unknown id is not an error so two racing deletes both succeed.
pub fn delete_crime(conn: &Connection, id: Uuid) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM crime WHERE id = ?1", [id.to_string()])?;
    Ok(deleted > 0)
}

/// Dates are kept as epoch nanoseconds so a crime reads back exactly as it
/// was written.
fn stored_date(crime: &Crime) -> Result<i64> {
    crime
        .date
        .timestamp_nanos_opt()
        .ok_or(StoreError::DateOutOfRange(crime.id))
}

fn crime_from_row(row: &Row<'_>) -> rusqlite::Result<Crime> {
    let id: String = row.get(0)?;
    let id = Uuid::parse_str(&id)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(err)))?;

    Ok(Crime {
        id,
        title: row.get(1)?,
        date: DateTime::<Utc>::from_timestamp_nanos(row.get(2)?),
        is_solved: row.get(3)?,
        suspect: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::db::open_in_memory;

    fn titled(title: &str) -> Crime {
        Crime {
            title: title.into(),
            ..Crime::new()
        }
    }

    #[test]
    fn fetch_returns_insertion_order() {
        let conn = open_in_memory().unwrap();
        let first = titled("first");
        let second = titled("second");
        insert_crime(&conn, &first).unwrap();
        insert_crime(&conn, &second).unwrap();

        // Updating the first row must not move it behind the second.
        update_crime(
            &conn,
            &Crime {
                is_solved: true,
                ..first.clone()
            },
        )
        .unwrap();

        let titles: Vec<_> = fetch_crimes(&conn)
            .unwrap()
            .into_iter()
            .map(|c| c.title)
            .collect();
        assert_eq!(titles, ["first", "second"]);
    }

    #[test]
    fn duplicate_insert_is_reported() {
        let conn = open_in_memory().unwrap();
        let crime = titled("twice");
        insert_crime(&conn, &crime).unwrap();

        let err = insert_crime(&conn, &crime).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(id) if id == crime.id));
    }

    #[test]
    fn update_of_unknown_id_is_not_found() {
        let conn = open_in_memory().unwrap();
        let crime = titled("ghost");

        let err = update_crime(&conn, &crime).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(id) if id == crime.id));
    }

    #[test]
    fn delete_reports_whether_a_row_went_away() {
        let conn = open_in_memory().unwrap();
        let crime = titled("gone");
        insert_crime(&conn, &crime).unwrap();

        assert!(delete_crime(&conn, crime.id).unwrap());
        assert!(!delete_crime(&conn, crime.id).unwrap());
        assert!(matches!(
            fetch_crime(&conn, crime.id),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn dates_keep_sub_millisecond_precision() {
        let conn = open_in_memory().unwrap();
        let date = Utc.timestamp_opt(1_714_588_200, 123_456_789).unwrap();
        let crime = Crime {
            date,
            ..titled("precise")
        };
        insert_crime(&conn, &crime).unwrap();
        assert_eq!(fetch_crime(&conn, crime.id).unwrap(), crime);

        let later = Crime {
            date: date + chrono::Duration::nanoseconds(1),
            ..crime.clone()
        };
        update_crime(&conn, &later).unwrap();
        assert_eq!(fetch_crime(&conn, crime.id).unwrap(), later);
    }

    #[test]
    fn unstorable_dates_are_rejected_without_writing() {
        let conn = open_in_memory().unwrap();
        let crime = Crime {
            date: Utc.with_ymd_and_hms(2300, 1, 1, 0, 0, 0).unwrap(),
            ..titled("far future")
        };

        let err = insert_crime(&conn, &crime).unwrap_err();
        assert!(matches!(err, StoreError::DateOutOfRange(id) if id == crime.id));
        assert!(fetch_crimes(&conn).unwrap().is_empty());
    }

    #[test]
    fn corrupt_rows_surface_as_storage_errors() {
        let conn = open_in_memory().unwrap();
        conn.execute(
            "INSERT INTO crime (id, title, date, isSolved, suspect) VALUES ('nope', '', 0, 0, '')",
            [],
        )
        .unwrap();

        assert!(matches!(
            fetch_crimes(&conn),
            Err(StoreError::StorageUnavailable(_))
        ));
    }
}
