use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use crate::db::error::CatalogError;
use crate::models::Publisher;

/// Retrieve every publisher sorted by name.
pub fn fetch_publishers(conn: &Connection) -> Result<Vec<Publisher>> {
    let mut stmt = conn
        .prepare(
            "SELECT Publisher_ID, Name, Address, Contact_Info
             FROM PUBLISHER
             ORDER BY Name COLLATE NOCASE",
        )
        .context("failed to prepare publisher query")?;

    let publishers = stmt
        .query_map([], |row| {
            Ok(Publisher {
                id: row.get(0)?,
                name: row.get(1)?,
                address: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                contact_info: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            })
        })
        .context("failed to load publishers")?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to collect publishers")?;

    Ok(publishers)
}

/// Insert a new publisher row and return the hydrated struct.
pub fn create_publisher(
    conn: &Connection,
    name: &str,
    address: &str,
    contact_info: &str,
) -> Result<Publisher> {
    conn.execute(
        "INSERT INTO PUBLISHER (Name, Address, Contact_Info) VALUES (?1, ?2, ?3)",
        params![name, address, contact_info],
    )
    .context("failed to insert publisher")?;

    let id = conn.last_insert_rowid();
    Ok(Publisher {
        id,
        name: name.to_string(),
        address: address.to_string(),
        contact_info: contact_info.to_string(),
    })
}

/// Full-row update by id; unknown ids are surfaced.
pub fn update_publisher(
    conn: &Connection,
    id: i64,
    name: &str,
    address: &str,
    contact_info: &str,
) -> Result<()> {
    let updated = conn
        .execute(
            "UPDATE PUBLISHER SET Name = ?1, Address = ?2, Contact_Info = ?3
             WHERE Publisher_ID = ?4",
            params![name, address, contact_info, id],
        )
        .context("failed to update publisher")?;

    if updated == 0 {
        Err(CatalogError::NotFound {
            what: format!("publisher {id}"),
        }
        .into())
    } else {
        Ok(())
    }
}

/// Delete a publisher unless a book still carries its foreign key. Check and
/// delete share one transaction.
pub fn delete_publisher(conn: &mut Connection, id: i64) -> Result<()> {
    let tx = conn
        .transaction()
        .context("failed to begin publisher delete")?;

    let book_count: i64 = tx
        .query_row(
            "SELECT COUNT(*) FROM BOOK WHERE Publisher_ID = ?1",
            params![id],
            |row| row.get(0),
        )
        .context("failed to count publisher references")?;

    if book_count > 0 {
        return Err(CatalogError::ReferentialIntegrity {
            entity: "publisher",
            count: book_count,
            dependents: "book(s)",
        }
        .into());
    }

    let deleted = tx
        .execute("DELETE FROM PUBLISHER WHERE Publisher_ID = ?1", params![id])
        .context("failed to delete publisher")?;

    if deleted == 0 {
        return Err(CatalogError::NotFound {
            what: format!("publisher {id}"),
        }
        .into());
    }

    tx.commit().context("failed to commit publisher delete")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::open_memory;
    use crate::db::create_book;
    use crate::models::Book;

    #[test]
    fn delete_with_books_is_blocked() {
        let mut conn = open_memory().unwrap();
        let publisher = create_publisher(&conn, "Orbit", "London", "").unwrap();
        let book = Book {
            isbn: "978-2".to_string(),
            title: "Leviathan Wakes".to_string(),
            publication_year: 2011,
            edition: String::new(),
            publisher_id: publisher.id,
        };
        create_book(&mut conn, &book, &[], &[], 1).unwrap();

        let err = delete_publisher(&mut conn, publisher.id).unwrap_err();
        match err.downcast_ref::<CatalogError>() {
            Some(CatalogError::ReferentialIntegrity { count, .. }) => assert_eq!(*count, 1),
            other => panic!("expected referential integrity error, got {other:?}"),
        }
        assert_eq!(fetch_publishers(&conn).unwrap().len(), 1);
    }

    #[test]
    fn update_round_trip() {
        let conn = open_memory().unwrap();
        let publisher = create_publisher(&conn, "Orbit", "", "").unwrap();
        update_publisher(&conn, publisher.id, "Orbit UK", "London", "info@orbit.uk").unwrap();
        let publishers = fetch_publishers(&conn).unwrap();
        assert_eq!(publishers[0].name, "Orbit UK");
        assert_eq!(publishers[0].contact_info, "info@orbit.uk");
    }
}
