//! Domain records that mirror the SQLite schema and get passed throughout the
//! TUI. These types stay light-weight data holders so other layers can focus
//! on presentation and persistence logic. Display-oriented joins live in
//! dedicated view structs rather than as mutable navigation graphs hanging off
//! the entities.

use std::fmt;

use chrono::NaiveDate;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::ToSql;

#[derive(Debug, Clone)]
/// A person who wrote one or more books in the catalog. Authors link to books
/// through the BOOK_AUTHOR join table and cannot be deleted while a book still
/// references them.
pub struct Author {
    /// Primary key from the database. Edit/delete flows bubble the id back to
    /// the persistence layer even when the UI only needs display text.
    pub id: i64,
    pub name: String,
    /// Nullable in storage; read back as an empty string.
    pub biography: String,
    /// Kept as free text so partial dates ("c. 1920") survive round trips.
    pub birth_date: String,
}

#[derive(Debug, Clone)]
/// Publishing house referenced by books through a required foreign key.
pub struct Publisher {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub contact_info: String,
}

#[derive(Debug, Clone)]
/// Subject classification linked to books through the BOOK_CATEGORY join
/// table.
pub struct Category {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone)]
/// A catalog title. The ISBN is the natural primary key; physical stock is
/// tracked per `BookCopy`, never on the book itself.
pub struct Book {
    pub isbn: String,
    pub title: String,
    /// Zero when the year is unknown; the form layer only admits numeric
    /// input here.
    pub publication_year: i64,
    pub edition: String,
    /// Required reference into PUBLISHER.
    pub publisher_id: i64,
}

/// Circulation state of a single physical copy. Mutated exclusively by the
/// loan workflow; everything else only reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyStatus {
    Available,
    Loaned,
    Lost,
}

impl CopyStatus {
    /// Storage representation, also used verbatim in the UI.
    pub fn as_str(self) -> &'static str {
        match self {
            CopyStatus::Available => "Available",
            CopyStatus::Loaned => "Loaned",
            CopyStatus::Lost => "Lost",
        }
    }

    pub fn parse(text: &str) -> Option<CopyStatus> {
        match text {
            "Available" => Some(CopyStatus::Available),
            "Loaned" => Some(CopyStatus::Loaned),
            "Lost" => Some(CopyStatus::Lost),
            _ => None,
        }
    }
}

impl fmt::Display for CopyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for CopyStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for CopyStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        CopyStatus::parse(text).ok_or(FromSqlError::InvalidType)
    }
}

#[derive(Debug, Clone)]
/// One physical instance of a book. Copies are created in a batch when the
/// book is added (or singly later) and die with the book.
pub struct BookCopy {
    pub id: i64,
    pub isbn: String,
    pub status: CopyStatus,
    pub shelf_location: String,
}

#[derive(Debug, Clone)]
/// A registered borrower. Members with an open loan cannot be deleted.
pub struct Member {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub join_date: NaiveDate,
}

impl Member {
    /// `First Last` as shown in pickers and the loans table.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone)]
/// A lending record tying one copy to one member. A `None` return date means
/// the loan is still active; setting it is a one-way transition.
pub struct Loan {
    pub id: i64,
    pub copy_id: i64,
    pub member_id: i64,
    pub loan_date: NaiveDate,
    pub due_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
}

impl Loan {
    pub fn is_active(&self) -> bool {
        self.return_date.is_none()
    }
}

#[derive(Debug, Clone)]
/// Book row joined with its publisher name and one category name for the
/// books table. A book filed under several categories shows an arbitrary one
/// of them here; the full set only matters in the edit form, which reads the
/// join table directly.
pub struct BookListing {
    pub isbn: String,
    pub title: String,
    pub publication_year: i64,
    pub edition: String,
    pub publisher_id: i64,
    /// "Unknown" when the publisher row is missing.
    pub publisher_name: String,
    /// Empty when the book has no category.
    pub category_name: String,
}

#[derive(Debug, Clone)]
/// Loan row joined with the member's name and the copy's book title, ready
/// for the loans table.
pub struct LoanListing {
    pub id: i64,
    pub copy_id: i64,
    pub member_id: i64,
    pub loan_date: NaiveDate,
    pub due_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub member_name: String,
    pub isbn: String,
    pub title: String,
}

impl LoanListing {
    pub fn is_active(&self) -> bool {
        self.return_date.is_none()
    }

    /// Active past the due date, as of the supplied day.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.is_active() && self.due_date < today
    }
}

#[derive(Debug, Clone)]
/// Title with at least one copy currently available, used to populate the
/// issuance picker.
pub struct AvailableBook {
    pub isbn: String,
    pub title: String,
}

#[derive(Debug, Clone)]
/// Available copy joined with its book title.
pub struct AvailableCopy {
    pub copy_id: i64,
    pub isbn: String,
    pub title: String,
}

impl AvailableCopy {
    /// `Title (Copy N)` label for pickers where several copies of the same
    /// title appear.
    pub fn label(&self) -> String {
        format!("{} (Copy {})", self.title, self.copy_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_status_round_trips_through_storage_text() {
        for status in [CopyStatus::Available, CopyStatus::Loaned, CopyStatus::Lost] {
            assert_eq!(CopyStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(CopyStatus::parse("Misplaced"), None);
    }

    #[test]
    fn loan_activity_is_defined_by_return_date() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut loan = Loan {
            id: 1,
            copy_id: 1,
            member_id: 1,
            loan_date: date,
            due_date: date,
            return_date: None,
        };
        assert!(loan.is_active());
        loan.return_date = Some(date);
        assert!(!loan.is_active());
    }

    #[test]
    fn overdue_needs_both_active_and_past_due() {
        let due = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let listing = LoanListing {
            id: 1,
            copy_id: 1,
            member_id: 1,
            loan_date: due,
            due_date: due,
            return_date: None,
            member_name: "May Reader".to_string(),
            isbn: "978-1".to_string(),
            title: "Overdue".to_string(),
        };
        let before = NaiveDate::from_ymd_opt(2024, 1, 9).unwrap();
        let after = NaiveDate::from_ymd_opt(2024, 1, 11).unwrap();
        assert!(!listing.is_overdue(before));
        assert!(listing.is_overdue(after));

        let returned = LoanListing {
            return_date: Some(due),
            ..listing
        };
        assert!(!returned.is_overdue(after));
    }
}
