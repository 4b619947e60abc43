//! Persistence module split across logical submodules, one per entity family
//! plus the connection/bootstrap machinery and the shared error taxonomy.
//! Reads take `&Connection`; anything that spans multiple statements takes
//! `&mut Connection` and runs inside a single transaction.

mod authors;
mod books;
mod categories;
mod connection;
mod error;
mod loans;
mod members;
mod publishers;

pub use authors::{create_author, delete_author, fetch_authors, update_author};
pub use books::{
    create_book, delete_book, fetch_author_ids, fetch_books, fetch_category_ids, fetch_copies,
    update_book,
};
pub use categories::{create_category, delete_category, fetch_categories, update_category};
pub use connection::{ensure_schema, open_at, open_memory, seed_demo_data};
pub use error::CatalogError;
pub use loans::{
    add_copy, fetch_available_books, fetch_available_copies, fetch_loans, first_available_copy,
    issue_loan, return_loan,
};
pub use members::{create_member, delete_member, fetch_members, update_member};
pub use publishers::{create_publisher, delete_publisher, fetch_publishers, update_publisher};
