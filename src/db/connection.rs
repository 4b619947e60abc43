use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use directories::BaseDirs;
use rusqlite::Connection;

/// Folder name used beneath the user's home directory for application data.
const DATA_DIR_NAME: &str = ".library-catalog-manager";
/// SQLite file name stored inside the application data directory.
const DB_FILE_NAME: &str = "catalog.sqlite";

/// The full table layout in one definition. Foreign keys are declared without
/// ON DELETE clauses: every cascade in this system is an explicit, ordered
/// sequence of deletes inside one transaction, so the dependency rules stay
/// visible in the repository code that enforces them.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS AUTHOR (
    Author_ID INTEGER PRIMARY KEY AUTOINCREMENT,
    Name TEXT NOT NULL,
    Biography TEXT,
    Birth_Date TEXT
);

CREATE TABLE IF NOT EXISTS PUBLISHER (
    Publisher_ID INTEGER PRIMARY KEY AUTOINCREMENT,
    Name TEXT NOT NULL,
    Address TEXT,
    Contact_Info TEXT
);

CREATE TABLE IF NOT EXISTS CATEGORY (
    Category_ID INTEGER PRIMARY KEY AUTOINCREMENT,
    Name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS BOOK (
    ISBN TEXT PRIMARY KEY,
    Title TEXT NOT NULL,
    Publication_Year INTEGER,
    Edition TEXT,
    Publisher_ID INTEGER NOT NULL,
    FOREIGN KEY (Publisher_ID) REFERENCES PUBLISHER(Publisher_ID)
);

CREATE TABLE IF NOT EXISTS BOOK_AUTHOR (
    Book_ISBN TEXT NOT NULL,
    Author_ID INTEGER NOT NULL,
    PRIMARY KEY (Book_ISBN, Author_ID),
    FOREIGN KEY (Book_ISBN) REFERENCES BOOK(ISBN),
    FOREIGN KEY (Author_ID) REFERENCES AUTHOR(Author_ID)
);

CREATE TABLE IF NOT EXISTS BOOK_CATEGORY (
    Book_ISBN TEXT NOT NULL,
    Category_ID INTEGER NOT NULL,
    PRIMARY KEY (Book_ISBN, Category_ID),
    FOREIGN KEY (Book_ISBN) REFERENCES BOOK(ISBN),
    FOREIGN KEY (Category_ID) REFERENCES CATEGORY(Category_ID)
);

CREATE TABLE IF NOT EXISTS BOOK_COPY (
    Copy_ID INTEGER PRIMARY KEY AUTOINCREMENT,
    ISBN TEXT NOT NULL,
    Status TEXT NOT NULL DEFAULT 'Available',
    Shelf_Location TEXT,
    FOREIGN KEY (ISBN) REFERENCES BOOK(ISBN)
);

CREATE TABLE IF NOT EXISTS MEMBER (
    Member_ID INTEGER PRIMARY KEY AUTOINCREMENT,
    First_Name TEXT NOT NULL,
    Last_Name TEXT NOT NULL,
    Email TEXT,
    Phone TEXT,
    Address TEXT,
    Join_Date TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS LOAN (
    Loan_ID INTEGER PRIMARY KEY AUTOINCREMENT,
    Book_Copy_ID INTEGER NOT NULL,
    Member_ID INTEGER NOT NULL,
    Loan_Date TEXT NOT NULL,
    Due_Date TEXT NOT NULL,
    Return_Date TEXT,
    Status TEXT NOT NULL DEFAULT 'Active',
    FOREIGN KEY (Book_Copy_ID) REFERENCES BOOK_COPY(Copy_ID),
    FOREIGN KEY (Member_ID) REFERENCES MEMBER(Member_ID)
);
";

/// Ensure the database file exists in the per-user data directory, create any
/// missing tables, and return a live connection.
pub fn ensure_schema() -> Result<Connection> {
    open_at(db_path()?)
}

/// Open (or create) a catalog database at an explicit path. Also toggles
/// `PRAGMA foreign_keys = ON` so the referential integrity checks in the
/// schema behave the same during tests and production runs.
pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Connection> {
    if let Some(parent) = path.as_ref().parent() {
        fs::create_dir_all(parent).context("failed to create data directory")?;
    }

    let conn = Connection::open(path.as_ref()).context("failed to open SQLite database")?;
    init_connection(conn)
}

/// Open an in-memory catalog database with the full schema. Used by tests and
/// one-off tooling; never by the application binary.
pub fn open_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    init_connection(conn)
}

fn init_connection(conn: Connection) -> Result<Connection> {
    conn.execute("PRAGMA foreign_keys = ON", [])
        .context("failed to enable foreign keys")?;
    conn.execute_batch(SCHEMA)
        .context("failed to create catalog schema")?;
    Ok(conn)
}

/// Insert the demonstration fixture the application ships with: five authors,
/// publishers, categories, and members, five books with one copy each, and
/// three loans (two active, one returned). Runs at most once: any existing
/// author row means a previous run (or real data) is present and the seed is
/// skipped wholesale.
pub fn seed_demo_data(conn: &mut Connection) -> Result<()> {
    let tx = conn
        .transaction()
        .context("failed to begin seed transaction")?;

    let author_count: i64 = tx
        .query_row("SELECT COUNT(*) FROM AUTHOR", [], |row| row.get(0))
        .context("failed to count authors before seeding")?;
    if author_count > 0 {
        return Ok(());
    }

    tx.execute_batch(
        "
        INSERT INTO AUTHOR (Name, Biography) VALUES
            ('J.K. Rowling', 'British author, best known for the Harry Potter series.'),
            ('George R.R. Martin', 'American novelist and short story writer, A Song of Ice and Fire.'),
            ('J.R.R. Tolkien', 'English writer, poet, philologist, and academic, The Lord of the Rings.'),
            ('Agatha Christie', 'English writer known for her sixty-six detective novels.'),
            ('Stephen King', 'American author of horror, supernatural fiction, suspense, crime, science-fiction, and fantasy novels.');

        INSERT INTO PUBLISHER (Name, Address, Contact_Info) VALUES
            ('Bloomsbury', 'London, UK', 'contact@bloomsbury.com'),
            ('Bantam Books', 'New York, USA', 'info@bantam.com'),
            ('Allen & Unwin', 'Sydney, Australia', 'support@allenandunwin.com'),
            ('HarperCollins', 'New York, USA', 'help@harpercollins.com'),
            ('Scribner', 'New York, USA', 'contact@scribner.com');

        INSERT INTO CATEGORY (Name) VALUES
            ('Fantasy'), ('Science Fiction'), ('Mystery'), ('Horror'), ('Adventure');

        INSERT INTO MEMBER (First_Name, Last_Name, Email, Phone, Join_Date) VALUES
            ('John', 'Doe', 'john.doe@email.com', '555-0101', '2023-01-15'),
            ('Jane', 'Smith', 'jane.smith@email.com', '555-0102', '2023-02-20'),
            ('Alice', 'Johnson', 'alice.j@email.com', '555-0103', '2023-03-10'),
            ('Bob', 'Wilson', 'bob.w@email.com', '555-0104', '2023-04-05'),
            ('Eva', 'Brown', 'eva.b@email.com', '555-0105', '2023-05-12');

        INSERT INTO BOOK (ISBN, Title, Publication_Year, Edition, Publisher_ID) VALUES
            ('978-0747532743', 'Harry Potter and the Philosopher''s Stone', 1997, '1st', 1),
            ('978-0553103540', 'A Game of Thrones', 1996, '1st', 2),
            ('978-0618640157', 'The Fellowship of the Ring', 1954, '1st', 3),
            ('978-0007119318', 'Murder on the Orient Express', 1934, '1st', 4),
            ('978-1501142970', 'It', 1986, '1st', 5);

        INSERT INTO BOOK_AUTHOR (Book_ISBN, Author_ID) VALUES
            ('978-0747532743', 1), ('978-0553103540', 2), ('978-0618640157', 3),
            ('978-0007119318', 4), ('978-1501142970', 5);

        INSERT INTO BOOK_CATEGORY (Book_ISBN, Category_ID) VALUES
            ('978-0747532743', 1), ('978-0553103540', 1), ('978-0618640157', 1),
            ('978-0007119318', 3), ('978-1501142970', 4);

        INSERT INTO BOOK_COPY (ISBN, Status, Shelf_Location) VALUES
            ('978-0747532743', 'Available', 'Fantasy-01'),
            ('978-0553103540', 'Available', 'Fantasy-02'),
            ('978-0618640157', 'Available', 'Fantasy-03'),
            ('978-0007119318', 'Available', 'Mystery-01'),
            ('978-1501142970', 'Available', 'Horror-01');

        INSERT INTO LOAN (Book_Copy_ID, Member_ID, Loan_Date, Due_Date, Status) VALUES
            (1, 1, '2023-10-01', '2023-10-15', 'Active');
        UPDATE BOOK_COPY SET Status = 'Loaned' WHERE Copy_ID = 1;

        INSERT INTO LOAN (Book_Copy_ID, Member_ID, Loan_Date, Due_Date, Return_Date, Status) VALUES
            (2, 2, '2023-09-01', '2023-09-15', '2023-09-10', 'Returned');

        INSERT INTO LOAN (Book_Copy_ID, Member_ID, Loan_Date, Due_Date, Status) VALUES
            (3, 3, '2023-08-01', '2023-08-15', 'Active');
        UPDATE BOOK_COPY SET Status = 'Loaned' WHERE Copy_ID = 3;
        ",
    )
    .context("failed to insert seed data")?;

    tx.commit().context("failed to commit seed data")
}

/// Resolve the absolute path to the SQLite database inside the user's home.
fn db_path() -> Result<PathBuf> {
    let base_dirs = BaseDirs::new().ok_or_else(|| anyhow!("could not locate home directory"))?;
    Ok(base_dirs.home_dir().join(DATA_DIR_NAME).join(DB_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_runs_exactly_once() {
        let mut conn = open_memory().unwrap();
        seed_demo_data(&mut conn).unwrap();
        let authors: i64 = conn
            .query_row("SELECT COUNT(*) FROM AUTHOR", [], |row| row.get(0))
            .unwrap();
        assert_eq!(authors, 5);

        seed_demo_data(&mut conn).unwrap();
        let authors_again: i64 = conn
            .query_row("SELECT COUNT(*) FROM AUTHOR", [], |row| row.get(0))
            .unwrap();
        assert_eq!(authors_again, 5);
    }

    #[test]
    fn seed_leaves_two_copies_loaned() {
        let mut conn = open_memory().unwrap();
        seed_demo_data(&mut conn).unwrap();
        let loaned: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM BOOK_COPY WHERE Status = 'Loaned'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(loaned, 2);
        let active: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM LOAN WHERE Return_Date IS NULL",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(active, 2);
    }

    #[test]
    fn foreign_keys_are_enforced() {
        let conn = open_memory().unwrap();
        let result = conn.execute(
            "INSERT INTO BOOK (ISBN, Title, Publisher_ID) VALUES ('x', 'X', 99)",
            [],
        );
        assert!(result.is_err());
    }
}
