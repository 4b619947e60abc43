use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::error::CatalogError;
use crate::models::{AvailableBook, AvailableCopy, BookCopy, CopyStatus, LoanListing};

/// Retrieve every loan joined with the member's name and the copy's title,
/// newest first. Both joins are inner: a loan row without its member or copy
/// would be a bug, not a display case.
pub fn fetch_loans(conn: &Connection) -> Result<Vec<LoanListing>> {
    let mut stmt = conn
        .prepare(
            "SELECT l.Loan_ID, l.Book_Copy_ID, l.Member_ID, l.Loan_Date, l.Due_Date,
                    l.Return_Date, m.First_Name, m.Last_Name, bc.ISBN, b.Title
             FROM LOAN l
             JOIN MEMBER m ON l.Member_ID = m.Member_ID
             JOIN BOOK_COPY bc ON l.Book_Copy_ID = bc.Copy_ID
             JOIN BOOK b ON bc.ISBN = b.ISBN
             ORDER BY l.Loan_ID DESC",
        )
        .context("failed to prepare loan query")?;

    let loans = stmt
        .query_map([], |row| {
            let first: String = row.get(6)?;
            let last: String = row.get(7)?;
            Ok(LoanListing {
                id: row.get(0)?,
                copy_id: row.get(1)?,
                member_id: row.get(2)?,
                loan_date: row.get(3)?,
                due_date: row.get(4)?,
                return_date: row.get(5)?,
                member_name: format!("{first} {last}"),
                isbn: row.get(8)?,
                title: row.get(9)?,
            })
        })
        .context("failed to load loans")?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to collect loans")?;

    Ok(loans)
}

/// Distinct titles with at least one available copy, for the issuance picker.
pub fn fetch_available_books(conn: &Connection) -> Result<Vec<AvailableBook>> {
    let mut stmt = conn
        .prepare(
            "SELECT DISTINCT b.ISBN, b.Title
             FROM BOOK b
             JOIN BOOK_COPY bc ON b.ISBN = bc.ISBN
             WHERE bc.Status = ?1
             ORDER BY b.Title COLLATE NOCASE",
        )
        .context("failed to prepare available-book query")?;

    let books = stmt
        .query_map(params![CopyStatus::Available], |row| {
            Ok(AvailableBook {
                isbn: row.get(0)?,
                title: row.get(1)?,
            })
        })
        .context("failed to load available books")?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to collect available books")?;

    Ok(books)
}

/// Every available copy joined with its title.
pub fn fetch_available_copies(conn: &Connection) -> Result<Vec<AvailableCopy>> {
    let mut stmt = conn
        .prepare(
            "SELECT bc.Copy_ID, bc.ISBN, b.Title
             FROM BOOK_COPY bc
             JOIN BOOK b ON bc.ISBN = b.ISBN
             WHERE bc.Status = ?1
             ORDER BY b.Title COLLATE NOCASE, bc.Copy_ID",
        )
        .context("failed to prepare available-copy query")?;

    let copies = stmt
        .query_map(params![CopyStatus::Available], |row| {
            Ok(AvailableCopy {
                copy_id: row.get(0)?,
                isbn: row.get(1)?,
                title: row.get(2)?,
            })
        })
        .context("failed to load available copies")?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to collect available copies")?;

    Ok(copies)
}

/// An arbitrary (storage-order) available copy of the given title, or `None`
/// when every copy is out or lost. Read-only; issuance re-checks availability
/// atomically, so a stale answer here costs a failed issue, never a double
/// loan.
pub fn first_available_copy(conn: &Connection, isbn: &str) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT Copy_ID FROM BOOK_COPY WHERE ISBN = ?1 AND Status = ?2 LIMIT 1",
        params![isbn, CopyStatus::Available],
        |row| row.get(0),
    )
    .optional()
    .context("failed to find available copy")
}

/// Issue a loan: insert the Active loan row and flip the copy to Loaned in
/// one transaction. The flip is conditional on the copy still being
/// Available; zero affected rows aborts the whole issuance, so a copy can
/// never carry two open loans. Returns the new loan id.
pub fn issue_loan(
    conn: &mut Connection,
    copy_id: i64,
    member_id: i64,
    issue_date: NaiveDate,
    due_date: NaiveDate,
) -> Result<i64> {
    let tx = conn.transaction().context("failed to begin loan issue")?;

    tx.execute(
        "INSERT INTO LOAN (Book_Copy_ID, Member_ID, Loan_Date, Due_Date, Status)
         VALUES (?1, ?2, ?3, ?4, 'Active')",
        params![copy_id, member_id, issue_date, due_date],
    )
    .context("failed to insert loan")?;
    let loan_id = tx.last_insert_rowid();

    let flipped = tx
        .execute(
            "UPDATE BOOK_COPY SET Status = ?1 WHERE Copy_ID = ?2 AND Status = ?3",
            params![CopyStatus::Loaned, copy_id, CopyStatus::Available],
        )
        .context("failed to mark copy loaned")?;

    if flipped == 0 {
        return Err(CatalogError::CopyNotAvailable { copy_id }.into());
    }

    tx.commit().context("failed to commit loan issue")?;
    Ok(loan_id)
}

/// Close a loan: set its return date and flip the copy back to Available in
/// one transaction. Unknown loan ids and already-returned loans are surfaced
/// before anything is written.
pub fn return_loan(conn: &mut Connection, loan_id: i64, return_date: NaiveDate) -> Result<()> {
    let tx = conn.transaction().context("failed to begin loan return")?;

    let loan = tx
        .query_row(
            "SELECT Book_Copy_ID, Return_Date FROM LOAN WHERE Loan_ID = ?1",
            params![loan_id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<NaiveDate>>(1)?,
                ))
            },
        )
        .optional()
        .context("failed to look up loan")?;

    let (copy_id, existing_return) = match loan {
        Some(found) => found,
        None => {
            return Err(CatalogError::NotFound {
                what: format!("loan {loan_id}"),
            }
            .into())
        }
    };
    if existing_return.is_some() {
        return Err(CatalogError::LoanClosed { loan_id }.into());
    }

    tx.execute(
        "UPDATE LOAN SET Return_Date = ?1, Status = 'Returned' WHERE Loan_ID = ?2",
        params![return_date, loan_id],
    )
    .context("failed to close loan")?;

    tx.execute(
        "UPDATE BOOK_COPY SET Status = ?1 WHERE Copy_ID = ?2",
        params![CopyStatus::Available, copy_id],
    )
    .context("failed to mark copy available")?;

    tx.commit().context("failed to commit loan return")
}

/// Append one available copy for a title. Foreign-key validity is the only
/// check; the ISBN must already exist in BOOK.
pub fn add_copy(conn: &Connection, isbn: &str, shelf_location: &str) -> Result<BookCopy> {
    conn.execute(
        "INSERT INTO BOOK_COPY (ISBN, Status, Shelf_Location) VALUES (?1, ?2, ?3)",
        params![isbn, CopyStatus::Available, shelf_location],
    )
    .context("failed to insert book copy")?;

    let id = conn.last_insert_rowid();
    Ok(BookCopy {
        id,
        isbn: isbn.to_string(),
        status: CopyStatus::Available,
        shelf_location: shelf_location.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::open_memory;
    use crate::db::{create_book, create_member, create_publisher, fetch_copies};
    use crate::models::Book;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// One publisher, one member, and one book with the requested number of
    /// copies. Returns the member id.
    fn catalog_with(conn: &mut Connection, isbn: &str, copies: u32) -> i64 {
        let publisher = create_publisher(conn, "Tor", "", "").unwrap();
        let book = Book {
            isbn: isbn.to_string(),
            title: "The Dispossessed".to_string(),
            publication_year: 1974,
            edition: String::new(),
            publisher_id: publisher.id,
        };
        create_book(conn, &book, &[], &[], copies).unwrap();
        create_member(conn, "May", "Reader", "", "", "", day(2024, 1, 1))
            .unwrap()
            .id
    }

    #[test]
    fn issue_and_return_round_trip() {
        let mut conn = open_memory().unwrap();
        let member_id = catalog_with(&mut conn, "978-10", 1);
        let copy_id = first_available_copy(&conn, "978-10").unwrap().unwrap();

        let loan_id =
            issue_loan(&mut conn, copy_id, member_id, day(2024, 3, 1), day(2024, 3, 15)).unwrap();

        let copies = fetch_copies(&conn, "978-10").unwrap();
        assert_eq!(copies[0].status, CopyStatus::Loaned);
        let loans = fetch_loans(&conn).unwrap();
        assert_eq!(loans.len(), 1);
        assert!(loans[0].is_active());

        return_loan(&mut conn, loan_id, day(2024, 3, 10)).unwrap();

        let copies = fetch_copies(&conn, "978-10").unwrap();
        assert_eq!(copies[0].status, CopyStatus::Available);
        let loans = fetch_loans(&conn).unwrap();
        assert_eq!(loans[0].return_date, Some(day(2024, 3, 10)));
    }

    #[test]
    fn issue_on_loaned_copy_fails_and_rolls_back() {
        let mut conn = open_memory().unwrap();
        let member_id = catalog_with(&mut conn, "978-11", 1);
        let copy_id = first_available_copy(&conn, "978-11").unwrap().unwrap();
        issue_loan(&mut conn, copy_id, member_id, day(2024, 3, 1), day(2024, 3, 15)).unwrap();

        let err = issue_loan(&mut conn, copy_id, member_id, day(2024, 3, 2), day(2024, 3, 16))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CatalogError>(),
            Some(CatalogError::CopyNotAvailable { .. })
        ));

        // The failed issuance must not leave a second loan row behind.
        assert_eq!(fetch_loans(&conn).unwrap().len(), 1);
    }

    #[test]
    fn first_available_copy_exhausts_with_stock() {
        let mut conn = open_memory().unwrap();
        let member_id = catalog_with(&mut conn, "978-12", 2);

        let first = first_available_copy(&conn, "978-12").unwrap().unwrap();
        // Idempotent while nothing changes.
        assert_eq!(first_available_copy(&conn, "978-12").unwrap(), Some(first));

        issue_loan(&mut conn, first, member_id, day(2024, 4, 1), day(2024, 4, 15)).unwrap();
        let second = first_available_copy(&conn, "978-12").unwrap().unwrap();
        assert_ne!(first, second);

        issue_loan(&mut conn, second, member_id, day(2024, 4, 1), day(2024, 4, 15)).unwrap();
        assert_eq!(first_available_copy(&conn, "978-12").unwrap(), None);
    }

    #[test]
    fn return_is_one_way() {
        let mut conn = open_memory().unwrap();
        let member_id = catalog_with(&mut conn, "978-13", 1);
        let copy_id = first_available_copy(&conn, "978-13").unwrap().unwrap();
        let loan_id =
            issue_loan(&mut conn, copy_id, member_id, day(2024, 5, 1), day(2024, 5, 15)).unwrap();
        return_loan(&mut conn, loan_id, day(2024, 5, 5)).unwrap();

        let err = return_loan(&mut conn, loan_id, day(2024, 5, 6)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CatalogError>(),
            Some(CatalogError::LoanClosed { .. })
        ));

        // The first return date stands.
        let loans = fetch_loans(&conn).unwrap();
        assert_eq!(loans[0].return_date, Some(day(2024, 5, 5)));
    }

    #[test]
    fn return_of_unknown_loan_writes_nothing() {
        let mut conn = open_memory().unwrap();
        catalog_with(&mut conn, "978-14", 1);

        let err = return_loan(&mut conn, 999, day(2024, 6, 1)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CatalogError>(),
            Some(CatalogError::NotFound { .. })
        ));
        let copies = fetch_copies(&conn, "978-14").unwrap();
        assert_eq!(copies[0].status, CopyStatus::Available);
    }

    #[test]
    fn add_copy_expands_availability() {
        let mut conn = open_memory().unwrap();
        catalog_with(&mut conn, "978-15", 1);
        add_copy(&conn, "978-15", "Annex-02").unwrap();

        let copies = fetch_copies(&conn, "978-15").unwrap();
        assert_eq!(copies.len(), 2);
        assert_eq!(copies[1].shelf_location, "Annex-02");
        assert_eq!(fetch_available_copies(&conn).unwrap().len(), 2);
    }

    #[test]
    fn two_copy_title_exhausts_then_cascades_cleanly() {
        let mut conn = open_memory().unwrap();
        let publisher = create_publisher(&conn, "Tor", "", "").unwrap();
        let author = crate::db::create_author(&conn, "A", "", "").unwrap();
        let category = crate::db::create_category(&conn, "C").unwrap();
        let book = Book {
            isbn: "978-1".to_string(),
            title: "Two Copies".to_string(),
            publication_year: 2020,
            edition: String::new(),
            publisher_id: publisher.id,
        };
        create_book(&mut conn, &book, &[author.id], &[category.id], 2).unwrap();
        let member_id = create_member(&conn, "May", "Reader", "", "", "", day(2024, 1, 1))
            .unwrap()
            .id;

        let copies = fetch_copies(&conn, "978-1").unwrap();
        assert_eq!(copies.len(), 2);
        assert!(copies.iter().all(|c| c.status == CopyStatus::Available));

        let c1 = first_available_copy(&conn, "978-1").unwrap().unwrap();
        issue_loan(&mut conn, c1, member_id, day(2024, 7, 1), day(2024, 7, 15)).unwrap();
        let c2 = first_available_copy(&conn, "978-1").unwrap().unwrap();
        issue_loan(&mut conn, c2, member_id, day(2024, 7, 1), day(2024, 7, 15)).unwrap();
        assert_eq!(first_available_copy(&conn, "978-1").unwrap(), None);

        crate::db::delete_book(&mut conn, "978-1").unwrap();
        assert!(fetch_loans(&conn).unwrap().is_empty());
        assert!(fetch_copies(&conn, "978-1").unwrap().is_empty());
        assert!(crate::db::fetch_author_ids(&conn, "978-1").unwrap().is_empty());
        assert!(crate::db::fetch_category_ids(&conn, "978-1").unwrap().is_empty());
    }
}
