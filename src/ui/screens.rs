use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::Connection;

use crate::db::{fetch_books, fetch_copies, fetch_loans, fetch_members};
use crate::models::{BookCopy, BookListing};

/// Cursor plus row cache shared by every table-style screen. Selection stays
/// clamped to the row range whatever the caller swaps in.
pub(crate) struct TableNav<T> {
    pub(crate) rows: Vec<T>,
    pub(crate) selected: usize,
}

impl<T> TableNav<T> {
    pub(crate) fn new(rows: Vec<T>) -> Self {
        Self { rows, selected: 0 }
    }

    pub(crate) fn current(&self) -> Option<&T> {
        self.rows.get(self.selected)
    }

    pub(crate) fn move_selection(&mut self, offset: isize) {
        if self.rows.is_empty() {
            return;
        }
        let len = self.rows.len() as isize;
        let mut new = self.selected as isize + offset;
        if new < 0 {
            new = 0;
        }
        if new >= len {
            new = len - 1;
        }
        self.selected = new as usize;
    }

    pub(crate) fn set_rows(&mut self, rows: Vec<T>) {
        self.rows = rows;
        self.ensure_in_bounds();
    }

    pub(crate) fn ensure_in_bounds(&mut self) {
        if self.rows.is_empty() {
            self.selected = 0;
        } else if self.selected >= self.rows.len() {
            self.selected = self.rows.len() - 1;
        }
    }
}

/// Books table plus the copy panel for the highlighted title. The copies are
/// re-read whenever the cursor lands on a different row so the panel always
/// reflects live loan state.
pub(crate) struct BooksScreen {
    pub(crate) table: TableNav<BookListing>,
    pub(crate) copies: Vec<BookCopy>,
}

impl BooksScreen {
    pub(crate) fn load(conn: &Connection) -> Result<Self> {
        let mut screen = Self {
            table: TableNav::new(fetch_books(conn)?),
            copies: Vec::new(),
        };
        screen.refresh_copies(conn)?;
        Ok(screen)
    }

    pub(crate) fn refresh_copies(&mut self, conn: &Connection) -> Result<()> {
        self.copies = match self.table.current() {
            Some(book) => fetch_copies(conn, &book.isbn)?,
            None => Vec::new(),
        };
        Ok(())
    }
}

/// The four headline numbers shown on the reports screen, computed from
/// repository reads at open time.
pub(crate) struct ReportSummary {
    pub(crate) total_books: usize,
    pub(crate) total_members: usize,
    pub(crate) active_loans: usize,
    pub(crate) overdue_loans: usize,
}

impl ReportSummary {
    pub(crate) fn load(conn: &Connection, today: NaiveDate) -> Result<Self> {
        let loans = fetch_loans(conn)?;
        Ok(Self {
            total_books: fetch_books(conn)?.len(),
            total_members: fetch_members(conn)?.len(),
            active_loans: loans.iter().filter(|l| l.is_active()).count(),
            overdue_loans: loans.iter().filter(|l| l.is_overdue(today)).count(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_clamps_to_bounds() {
        let mut nav = TableNav::new(vec![1, 2, 3]);
        nav.move_selection(-5);
        assert_eq!(nav.selected, 0);
        nav.move_selection(10);
        assert_eq!(nav.selected, 2);
        nav.set_rows(vec![1]);
        assert_eq!(nav.selected, 0);
    }

    #[test]
    fn empty_rows_have_no_current() {
        let nav: TableNav<i32> = TableNav::new(Vec::new());
        assert!(nav.current().is_none());
    }
}
