use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use crate::db::error::CatalogError;
use crate::models::Author;

/// Retrieve every author sorted by name. Nullable text columns come back as
/// empty strings so the UI never deals in options.
pub fn fetch_authors(conn: &Connection) -> Result<Vec<Author>> {
    let mut stmt = conn
        .prepare(
            "SELECT Author_ID, Name, Biography, Birth_Date
             FROM AUTHOR
             ORDER BY Name COLLATE NOCASE",
        )
        .context("failed to prepare author query")?;

    let authors = stmt
        .query_map([], |row| {
            Ok(Author {
                id: row.get(0)?,
                name: row.get(1)?,
                biography: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                birth_date: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            })
        })
        .context("failed to load authors")?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to collect authors")?;

    Ok(authors)
}

/// Insert a new author row, returning the hydrated struct so the caller can
/// refresh its list without re-querying.
pub fn create_author(
    conn: &Connection,
    name: &str,
    biography: &str,
    birth_date: &str,
) -> Result<Author> {
    conn.execute(
        "INSERT INTO AUTHOR (Name, Biography, Birth_Date) VALUES (?1, ?2, ?3)",
        params![name, biography, birth_date],
    )
    .context("failed to insert author")?;

    let id = conn.last_insert_rowid();
    Ok(Author {
        id,
        name: name.to_string(),
        biography: biography.to_string(),
        birth_date: birth_date.to_string(),
    })
}

/// Full-row update by id. Zero touched rows means the id never existed, which
/// is surfaced instead of silently continuing.
pub fn update_author(
    conn: &Connection,
    id: i64,
    name: &str,
    biography: &str,
    birth_date: &str,
) -> Result<()> {
    let updated = conn
        .execute(
            "UPDATE AUTHOR SET Name = ?1, Biography = ?2, Birth_Date = ?3 WHERE Author_ID = ?4",
            params![name, biography, birth_date, id],
        )
        .context("failed to update author")?;

    if updated == 0 {
        Err(CatalogError::NotFound {
            what: format!("author {id}"),
        }
        .into())
    } else {
        Ok(())
    }
}

/// Delete an author unless a book still references them. The reference count
/// and the delete run inside one transaction so no book can slip in between
/// the check and the removal.
pub fn delete_author(conn: &mut Connection, id: i64) -> Result<()> {
    let tx = conn
        .transaction()
        .context("failed to begin author delete")?;

    let book_count: i64 = tx
        .query_row(
            "SELECT COUNT(*) FROM BOOK_AUTHOR WHERE Author_ID = ?1",
            params![id],
            |row| row.get(0),
        )
        .context("failed to count author references")?;

    if book_count > 0 {
        return Err(CatalogError::ReferentialIntegrity {
            entity: "author",
            count: book_count,
            dependents: "book(s)",
        }
        .into());
    }

    let deleted = tx
        .execute("DELETE FROM AUTHOR WHERE Author_ID = ?1", params![id])
        .context("failed to delete author")?;

    if deleted == 0 {
        return Err(CatalogError::NotFound {
            what: format!("author {id}"),
        }
        .into());
    }

    tx.commit().context("failed to commit author delete")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::open_memory;
    use crate::db::error::CatalogError;
    use crate::db::{create_book, create_publisher};
    use crate::models::Book;

    #[test]
    fn create_and_list_round_trip() {
        let conn = open_memory().unwrap();
        let created = create_author(&conn, "Ursula K. Le Guin", "", "1929-10-21").unwrap();
        let authors = fetch_authors(&conn).unwrap();
        assert_eq!(authors.len(), 1);
        assert_eq!(authors[0].id, created.id);
        assert_eq!(authors[0].name, "Ursula K. Le Guin");
        assert_eq!(authors[0].biography, "");
    }

    #[test]
    fn update_missing_author_is_not_found() {
        let conn = open_memory().unwrap();
        let err = update_author(&conn, 42, "Nobody", "", "").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CatalogError>(),
            Some(CatalogError::NotFound { .. })
        ));
    }

    #[test]
    fn delete_referenced_author_is_blocked_and_changes_nothing() {
        let mut conn = open_memory().unwrap();
        let author = create_author(&conn, "Octavia Butler", "", "").unwrap();
        let publisher = create_publisher(&conn, "Tor", "", "").unwrap();
        let book = Book {
            isbn: "978-0".to_string(),
            title: "Kindred".to_string(),
            publication_year: 1979,
            edition: String::new(),
            publisher_id: publisher.id,
        };
        create_book(&mut conn, &book, &[author.id], &[], 1).unwrap();

        let err = delete_author(&mut conn, author.id).unwrap_err();
        match err.downcast_ref::<CatalogError>() {
            Some(CatalogError::ReferentialIntegrity { count, .. }) => assert_eq!(*count, 1),
            other => panic!("expected referential integrity error, got {other:?}"),
        }

        let after = fetch_authors(&conn).unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].name, "Octavia Butler");
    }

    #[test]
    fn delete_unreferenced_author_succeeds() {
        let mut conn = open_memory().unwrap();
        let author = create_author(&conn, "Transient", "", "").unwrap();
        delete_author(&mut conn, author.id).unwrap();
        assert!(fetch_authors(&conn).unwrap().is_empty());
    }
}
