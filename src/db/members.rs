use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection};

use crate::db::error::CatalogError;
use crate::models::Member;

/// Retrieve every member sorted by last name, then first.
pub fn fetch_members(conn: &Connection) -> Result<Vec<Member>> {
    let mut stmt = conn
        .prepare(
            "SELECT Member_ID, First_Name, Last_Name, Email, Phone, Address, Join_Date
             FROM MEMBER
             ORDER BY Last_Name COLLATE NOCASE, First_Name COLLATE NOCASE",
        )
        .context("failed to prepare member query")?;

    let members = stmt
        .query_map([], |row| {
            Ok(Member {
                id: row.get(0)?,
                first_name: row.get(1)?,
                last_name: row.get(2)?,
                email: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                phone: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                address: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                join_date: row.get(6)?,
            })
        })
        .context("failed to load members")?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to collect members")?;

    Ok(members)
}

/// Insert a new member row and return the hydrated struct. Email shape is the
/// form layer's concern; by the time a value reaches here it is either empty
/// or already vetted.
pub fn create_member(
    conn: &Connection,
    first_name: &str,
    last_name: &str,
    email: &str,
    phone: &str,
    address: &str,
    join_date: NaiveDate,
) -> Result<Member> {
    conn.execute(
        "INSERT INTO MEMBER (First_Name, Last_Name, Email, Phone, Address, Join_Date)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![first_name, last_name, email, phone, address, join_date],
    )
    .context("failed to insert member")?;

    let id = conn.last_insert_rowid();
    Ok(Member {
        id,
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        email: email.to_string(),
        phone: phone.to_string(),
        address: address.to_string(),
        join_date,
    })
}

/// Update the editable member fields. The join date is part of the historical
/// record and never rewritten.
pub fn update_member(
    conn: &Connection,
    id: i64,
    first_name: &str,
    last_name: &str,
    email: &str,
    phone: &str,
    address: &str,
) -> Result<()> {
    let updated = conn
        .execute(
            "UPDATE MEMBER
             SET First_Name = ?1, Last_Name = ?2, Email = ?3, Phone = ?4, Address = ?5
             WHERE Member_ID = ?6",
            params![first_name, last_name, email, phone, address, id],
        )
        .context("failed to update member")?;

    if updated == 0 {
        Err(CatalogError::NotFound {
            what: format!("member {id}"),
        }
        .into())
    } else {
        Ok(())
    }
}

/// Delete a member and their loan history. An active loan (null return date)
/// blocks the whole operation; returned-loan history is only purged once
/// nothing is outstanding. Count, purge, and delete share one transaction.
pub fn delete_member(conn: &mut Connection, id: i64) -> Result<()> {
    let tx = conn
        .transaction()
        .context("failed to begin member delete")?;

    let active_loans: i64 = tx
        .query_row(
            "SELECT COUNT(*) FROM LOAN WHERE Member_ID = ?1 AND Return_Date IS NULL",
            params![id],
            |row| row.get(0),
        )
        .context("failed to count active loans")?;

    if active_loans > 0 {
        return Err(CatalogError::ReferentialIntegrity {
            entity: "member",
            count: active_loans,
            dependents: "active loan(s)",
        }
        .into());
    }

    tx.execute("DELETE FROM LOAN WHERE Member_ID = ?1", params![id])
        .context("failed to delete member loan history")?;

    let deleted = tx
        .execute("DELETE FROM MEMBER WHERE Member_ID = ?1", params![id])
        .context("failed to delete member")?;

    if deleted == 0 {
        return Err(CatalogError::NotFound {
            what: format!("member {id}"),
        }
        .into());
    }

    tx.commit().context("failed to commit member delete")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::open_memory;
    use crate::db::{create_book, create_publisher, fetch_copies, issue_loan, return_loan};
    use crate::models::Book;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn member_with_loan(conn: &mut Connection) -> (i64, i64) {
        let publisher = create_publisher(conn, "Tor", "", "").unwrap();
        let book = Book {
            isbn: "978-9".to_string(),
            title: "Borrowed".to_string(),
            publication_year: 2000,
            edition: String::new(),
            publisher_id: publisher.id,
        };
        create_book(conn, &book, &[], &[], 1).unwrap();
        let copy_id = fetch_copies(conn, "978-9").unwrap()[0].id;
        let member = create_member(conn, "May", "Reader", "", "", "", day(2024, 1, 1)).unwrap();
        let loan_id = issue_loan(conn, copy_id, member.id, day(2024, 2, 1), day(2024, 2, 15)).unwrap();
        (member.id, loan_id)
    }

    #[test]
    fn delete_with_active_loan_is_blocked_and_changes_nothing() {
        let mut conn = open_memory().unwrap();
        let (member_id, _) = member_with_loan(&mut conn);

        let err = delete_member(&mut conn, member_id).unwrap_err();
        match err.downcast_ref::<CatalogError>() {
            Some(CatalogError::ReferentialIntegrity { count, .. }) => assert_eq!(*count, 1),
            other => panic!("expected referential integrity error, got {other:?}"),
        }

        assert_eq!(fetch_members(&conn).unwrap().len(), 1);
        let loans: i64 = conn
            .query_row("SELECT COUNT(*) FROM LOAN", [], |row| row.get(0))
            .unwrap();
        assert_eq!(loans, 1);
    }

    #[test]
    fn delete_after_return_purges_history() {
        let mut conn = open_memory().unwrap();
        let (member_id, loan_id) = member_with_loan(&mut conn);
        return_loan(&mut conn, loan_id, day(2024, 2, 10)).unwrap();

        delete_member(&mut conn, member_id).unwrap();

        assert!(fetch_members(&conn).unwrap().is_empty());
        let loans: i64 = conn
            .query_row("SELECT COUNT(*) FROM LOAN", [], |row| row.get(0))
            .unwrap();
        assert_eq!(loans, 0);
    }

    #[test]
    fn join_date_survives_update() {
        let conn = open_memory().unwrap();
        let member = create_member(&conn, "May", "Reader", "", "", "", day(2024, 1, 1)).unwrap();
        update_member(&conn, member.id, "May", "Lender", "m@l.io", "", "").unwrap();
        let members = fetch_members(&conn).unwrap();
        assert_eq!(members[0].last_name, "Lender");
        assert_eq!(members[0].join_date, day(2024, 1, 1));
    }
}
