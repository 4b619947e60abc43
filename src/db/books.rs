use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use crate::db::error::CatalogError;
use crate::models::{Book, BookCopy, BookListing, CopyStatus};

/// Shelf location stamped on copies created in the book-add batch. Individual
/// copies added later carry whatever location the librarian typed.
const DEFAULT_SHELF: &str = "Main Stack";

/// Retrieve every book joined with its publisher name and one category name.
/// The `GROUP BY` collapses books filed under several categories to a single
/// arbitrary one. The listing is display glue, not the source of truth for
/// the category set (the edit form reads the join table instead).
pub fn fetch_books(conn: &Connection) -> Result<Vec<BookListing>> {
    let mut stmt = conn
        .prepare(
            "SELECT b.ISBN, b.Title, b.Publication_Year, b.Edition, b.Publisher_ID,
                    p.Name, c.Name
             FROM BOOK b
             LEFT JOIN PUBLISHER p ON b.Publisher_ID = p.Publisher_ID
             LEFT JOIN BOOK_CATEGORY bc ON b.ISBN = bc.Book_ISBN
             LEFT JOIN CATEGORY c ON bc.Category_ID = c.Category_ID
             GROUP BY b.ISBN
             ORDER BY b.Title COLLATE NOCASE",
        )
        .context("failed to prepare book query")?;

    let books = stmt
        .query_map([], |row| {
            Ok(BookListing {
                isbn: row.get(0)?,
                title: row.get(1)?,
                publication_year: row.get::<_, Option<i64>>(2)?.unwrap_or(0),
                edition: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                publisher_id: row.get(4)?,
                publisher_name: row
                    .get::<_, Option<String>>(5)?
                    .unwrap_or_else(|| "Unknown".to_string()),
                category_name: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
            })
        })
        .context("failed to load books")?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to collect books")?;

    Ok(books)
}

/// All physical copies of one title, in copy-id order.
pub fn fetch_copies(conn: &Connection, isbn: &str) -> Result<Vec<BookCopy>> {
    let mut stmt = conn
        .prepare(
            "SELECT Copy_ID, ISBN, Status, Shelf_Location
             FROM BOOK_COPY
             WHERE ISBN = ?1
             ORDER BY Copy_ID",
        )
        .context("failed to prepare copy query")?;

    let copies = stmt
        .query_map([isbn], |row| {
            Ok(BookCopy {
                id: row.get(0)?,
                isbn: row.get(1)?,
                status: row.get(2)?,
                shelf_location: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            })
        })
        .context("failed to load copies")?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to collect copies")?;

    Ok(copies)
}

/// The author ids currently linked to a book. Feeds the edit form so a save
/// re-submits the full association set.
pub fn fetch_author_ids(conn: &Connection, isbn: &str) -> Result<Vec<i64>> {
    let mut stmt = conn
        .prepare("SELECT Author_ID FROM BOOK_AUTHOR WHERE Book_ISBN = ?1")
        .context("failed to prepare book-author query")?;
    let ids = stmt
        .query_map([isbn], |row| row.get(0))
        .context("failed to load book authors")?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to collect book authors")?;
    Ok(ids)
}

/// The category ids currently linked to a book.
pub fn fetch_category_ids(conn: &Connection, isbn: &str) -> Result<Vec<i64>> {
    let mut stmt = conn
        .prepare("SELECT Category_ID FROM BOOK_CATEGORY WHERE Book_ISBN = ?1")
        .context("failed to prepare book-category query")?;
    let ids = stmt
        .query_map([isbn], |row| row.get(0))
        .context("failed to load book categories")?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to collect book categories")?;
    Ok(ids)
}

/// Insert a book with its author and category associations and an initial
/// batch of copies, all inside one transaction. Any failing step rolls the
/// whole book back out.
pub fn create_book(
    conn: &mut Connection,
    book: &Book,
    author_ids: &[i64],
    category_ids: &[i64],
    copy_count: u32,
) -> Result<()> {
    let tx = conn.transaction().context("failed to begin book insert")?;

    tx.execute(
        "INSERT INTO BOOK (ISBN, Title, Publication_Year, Edition, Publisher_ID)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            book.isbn,
            book.title,
            book.publication_year,
            book.edition,
            book.publisher_id
        ],
    )
    .context("failed to insert book")?;

    for author_id in author_ids {
        tx.execute(
            "INSERT INTO BOOK_AUTHOR (Book_ISBN, Author_ID) VALUES (?1, ?2)",
            params![book.isbn, author_id],
        )
        .context("failed to link author to book")?;
    }

    for category_id in category_ids {
        tx.execute(
            "INSERT INTO BOOK_CATEGORY (Book_ISBN, Category_ID) VALUES (?1, ?2)",
            params![book.isbn, category_id],
        )
        .context("failed to link category to book")?;
    }

    for _ in 0..copy_count {
        tx.execute(
            "INSERT INTO BOOK_COPY (ISBN, Status, Shelf_Location) VALUES (?1, ?2, ?3)",
            params![book.isbn, CopyStatus::Available, DEFAULT_SHELF],
        )
        .context("failed to insert book copy")?;
    }

    tx.commit().context("failed to commit book insert")
}

/// Update a book row and replace both association sets wholesale (delete all,
/// reinsert the submitted ids, not a diff). Copies are untouched. The whole
/// operation is one transaction.
pub fn update_book(
    conn: &mut Connection,
    book: &Book,
    author_ids: &[i64],
    category_ids: &[i64],
) -> Result<()> {
    let tx = conn.transaction().context("failed to begin book update")?;

    let updated = tx
        .execute(
            "UPDATE BOOK
             SET Title = ?1, Publication_Year = ?2, Edition = ?3, Publisher_ID = ?4
             WHERE ISBN = ?5",
            params![
                book.title,
                book.publication_year,
                book.edition,
                book.publisher_id,
                book.isbn
            ],
        )
        .context("failed to update book")?;

    if updated == 0 {
        return Err(CatalogError::NotFound {
            what: format!("book {}", book.isbn),
        }
        .into());
    }

    tx.execute(
        "DELETE FROM BOOK_AUTHOR WHERE Book_ISBN = ?1",
        params![book.isbn],
    )
    .context("failed to clear book authors")?;
    for author_id in author_ids {
        tx.execute(
            "INSERT INTO BOOK_AUTHOR (Book_ISBN, Author_ID) VALUES (?1, ?2)",
            params![book.isbn, author_id],
        )
        .context("failed to relink author to book")?;
    }

    tx.execute(
        "DELETE FROM BOOK_CATEGORY WHERE Book_ISBN = ?1",
        params![book.isbn],
    )
    .context("failed to clear book categories")?;
    for category_id in category_ids {
        tx.execute(
            "INSERT INTO BOOK_CATEGORY (Book_ISBN, Category_ID) VALUES (?1, ?2)",
            params![book.isbn, category_id],
        )
        .context("failed to relink category to book")?;
    }

    tx.commit().context("failed to commit book update")
}

/// Remove a book and everything hanging off it, in dependency order: loans of
/// its copies, the copies, both join sets, then the book row. The cascade is
/// unconditional: loan history for this title dies with it, active or not.
pub fn delete_book(conn: &mut Connection, isbn: &str) -> Result<()> {
    let tx = conn.transaction().context("failed to begin book delete")?;

    tx.execute(
        "DELETE FROM LOAN
         WHERE Book_Copy_ID IN (SELECT Copy_ID FROM BOOK_COPY WHERE ISBN = ?1)",
        params![isbn],
    )
    .context("failed to delete loans for book")?;

    tx.execute("DELETE FROM BOOK_COPY WHERE ISBN = ?1", params![isbn])
        .context("failed to delete book copies")?;

    tx.execute("DELETE FROM BOOK_AUTHOR WHERE Book_ISBN = ?1", params![isbn])
        .context("failed to delete book-author links")?;

    tx.execute(
        "DELETE FROM BOOK_CATEGORY WHERE Book_ISBN = ?1",
        params![isbn],
    )
    .context("failed to delete book-category links")?;

    let deleted = tx
        .execute("DELETE FROM BOOK WHERE ISBN = ?1", params![isbn])
        .context("failed to delete book")?;

    if deleted == 0 {
        return Err(CatalogError::NotFound {
            what: format!("book {isbn}"),
        }
        .into());
    }

    tx.commit().context("failed to commit book delete")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::open_memory;
    use crate::db::{create_author, create_category, create_publisher};

    fn sample_book(publisher_id: i64, isbn: &str) -> Book {
        Book {
            isbn: isbn.to_string(),
            title: "A Wizard of Earthsea".to_string(),
            publication_year: 1968,
            edition: "1st".to_string(),
            publisher_id,
        }
    }

    #[test]
    fn create_with_n_copies_reads_back_n_available() {
        let mut conn = open_memory().unwrap();
        let publisher = create_publisher(&conn, "Parnassus", "", "").unwrap();
        create_book(&mut conn, &sample_book(publisher.id, "978-4"), &[], &[], 3).unwrap();

        let copies = fetch_copies(&conn, "978-4").unwrap();
        assert_eq!(copies.len(), 3);
        assert!(copies.iter().all(|c| c.status == CopyStatus::Available));
        assert!(copies.iter().all(|c| c.shelf_location == DEFAULT_SHELF));
    }

    #[test]
    fn create_rolls_back_wholesale_on_bad_association() {
        let mut conn = open_memory().unwrap();
        let publisher = create_publisher(&conn, "Parnassus", "", "").unwrap();
        // Author id 99 does not exist, so the join insert violates its
        // foreign key after the book row already went in.
        let err = create_book(&mut conn, &sample_book(publisher.id, "978-5"), &[99], &[], 2);
        assert!(err.is_err());

        let books = fetch_books(&conn).unwrap();
        assert!(books.is_empty());
        assert!(fetch_copies(&conn, "978-5").unwrap().is_empty());
    }

    #[test]
    fn listing_joins_publisher_and_category() {
        let mut conn = open_memory().unwrap();
        let publisher = create_publisher(&conn, "Parnassus", "", "").unwrap();
        let category = create_category(&conn, "Fantasy").unwrap();
        create_book(
            &mut conn,
            &sample_book(publisher.id, "978-6"),
            &[],
            &[category.id],
            1,
        )
        .unwrap();

        let books = fetch_books(&conn).unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].publisher_name, "Parnassus");
        assert_eq!(books[0].category_name, "Fantasy");
    }

    #[test]
    fn update_replaces_association_sets() {
        let mut conn = open_memory().unwrap();
        let publisher = create_publisher(&conn, "Parnassus", "", "").unwrap();
        let first = create_author(&conn, "First", "", "").unwrap();
        let second = create_author(&conn, "Second", "", "").unwrap();
        let book = sample_book(publisher.id, "978-7");
        create_book(&mut conn, &book, &[first.id], &[], 1).unwrap();

        update_book(&mut conn, &book, &[second.id], &[]).unwrap();
        assert_eq!(fetch_author_ids(&conn, "978-7").unwrap(), vec![second.id]);

        // Copies survive the update untouched.
        assert_eq!(fetch_copies(&conn, "978-7").unwrap().len(), 1);
    }

    #[test]
    fn update_missing_isbn_is_not_found() {
        let mut conn = open_memory().unwrap();
        let publisher = create_publisher(&conn, "Parnassus", "", "").unwrap();
        let ghost = sample_book(publisher.id, "978-missing");
        let err = update_book(&mut conn, &ghost, &[], &[]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<crate::db::error::CatalogError>(),
            Some(crate::db::error::CatalogError::NotFound { .. })
        ));
    }

    #[test]
    fn delete_cascades_through_loans_copies_and_joins() {
        let mut conn = open_memory().unwrap();
        let publisher = create_publisher(&conn, "Parnassus", "", "").unwrap();
        let author = create_author(&conn, "Le Guin", "", "").unwrap();
        let category = create_category(&conn, "Fantasy").unwrap();
        create_book(
            &mut conn,
            &sample_book(publisher.id, "978-8"),
            &[author.id],
            &[category.id],
            2,
        )
        .unwrap();

        // Put one copy on loan so the cascade has live state to chew through.
        let member_id = crate::db::create_member(
            &conn,
            "Test",
            "Member",
            "",
            "",
            "",
            chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        )
        .unwrap()
        .id;
        let copy_id = fetch_copies(&conn, "978-8").unwrap()[0].id;
        crate::db::issue_loan(
            &mut conn,
            copy_id,
            member_id,
            chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            chrono::NaiveDate::from_ymd_opt(2024, 1, 16).unwrap(),
        )
        .unwrap();

        delete_book(&mut conn, "978-8").unwrap();

        assert!(fetch_books(&conn).unwrap().is_empty());
        assert!(fetch_copies(&conn, "978-8").unwrap().is_empty());
        assert!(fetch_author_ids(&conn, "978-8").unwrap().is_empty());
        assert!(fetch_category_ids(&conn, "978-8").unwrap().is_empty());
        let loans: i64 = conn
            .query_row("SELECT COUNT(*) FROM LOAN", [], |row| row.get(0))
            .unwrap();
        assert_eq!(loans, 0);
    }
}
