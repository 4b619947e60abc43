use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use crate::db::error::CatalogError;
use crate::models::Category;

/// Retrieve every category sorted by name.
pub fn fetch_categories(conn: &Connection) -> Result<Vec<Category>> {
    let mut stmt = conn
        .prepare("SELECT Category_ID, Name FROM CATEGORY ORDER BY Name COLLATE NOCASE")
        .context("failed to prepare category query")?;

    let categories = stmt
        .query_map([], |row| {
            Ok(Category {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })
        .context("failed to load categories")?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to collect categories")?;

    Ok(categories)
}

/// Insert a new category row and return the hydrated struct.
pub fn create_category(conn: &Connection, name: &str) -> Result<Category> {
    conn.execute("INSERT INTO CATEGORY (Name) VALUES (?1)", params![name])
        .context("failed to insert category")?;

    let id = conn.last_insert_rowid();
    Ok(Category {
        id,
        name: name.to_string(),
    })
}

/// Rename a category; unknown ids are surfaced.
pub fn update_category(conn: &Connection, id: i64, name: &str) -> Result<()> {
    let updated = conn
        .execute(
            "UPDATE CATEGORY SET Name = ?1 WHERE Category_ID = ?2",
            params![name, id],
        )
        .context("failed to update category")?;

    if updated == 0 {
        Err(CatalogError::NotFound {
            what: format!("category {id}"),
        }
        .into())
    } else {
        Ok(())
    }
}

/// Delete a category unless a book is still filed under it. Check and delete
/// share one transaction.
pub fn delete_category(conn: &mut Connection, id: i64) -> Result<()> {
    let tx = conn
        .transaction()
        .context("failed to begin category delete")?;

    let book_count: i64 = tx
        .query_row(
            "SELECT COUNT(*) FROM BOOK_CATEGORY WHERE Category_ID = ?1",
            params![id],
            |row| row.get(0),
        )
        .context("failed to count category references")?;

    if book_count > 0 {
        return Err(CatalogError::ReferentialIntegrity {
            entity: "category",
            count: book_count,
            dependents: "book(s)",
        }
        .into());
    }

    let deleted = tx
        .execute("DELETE FROM CATEGORY WHERE Category_ID = ?1", params![id])
        .context("failed to delete category")?;

    if deleted == 0 {
        return Err(CatalogError::NotFound {
            what: format!("category {id}"),
        }
        .into());
    }

    tx.commit().context("failed to commit category delete")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::open_memory;
    use crate::db::{create_book, create_publisher};
    use crate::models::Book;

    #[test]
    fn delete_with_filed_books_is_blocked() {
        let mut conn = open_memory().unwrap();
        let category = create_category(&conn, "Fantasy").unwrap();
        let publisher = create_publisher(&conn, "Tor", "", "").unwrap();
        let book = Book {
            isbn: "978-3".to_string(),
            title: "The Hobbit".to_string(),
            publication_year: 1937,
            edition: String::new(),
            publisher_id: publisher.id,
        };
        create_book(&mut conn, &book, &[], &[category.id], 1).unwrap();

        let err = delete_category(&mut conn, category.id).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CatalogError>(),
            Some(CatalogError::ReferentialIntegrity { count: 1, .. })
        ));
        assert_eq!(fetch_categories(&conn).unwrap().len(), 1);
    }

    #[test]
    fn delete_unreferenced_category_succeeds() {
        let mut conn = open_memory().unwrap();
        let category = create_category(&conn, "Ephemera").unwrap();
        delete_category(&mut conn, category.id).unwrap();
        assert!(fetch_categories(&conn).unwrap().is_empty());
    }
}
