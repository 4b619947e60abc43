use anyhow::{anyhow, Context, Result};
use chrono::{Days, NaiveDate};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};

use crate::models::{Author, Book, BookListing, Member, Publisher};

/// One labeled input in a modal form.
#[derive(Clone)]
pub(crate) struct TextField {
    pub(crate) label: &'static str,
    pub(crate) value: String,
    pub(crate) required: bool,
    /// Restrict input to ASCII digits (years, copy counts).
    pub(crate) numeric: bool,
}

impl TextField {
    fn new(label: &'static str, required: bool) -> Self {
        Self {
            label,
            value: String::new(),
            required,
            numeric: false,
        }
    }

    fn numeric(label: &'static str, required: bool) -> Self {
        Self {
            label,
            value: String::new(),
            required,
            numeric: true,
        }
    }

    fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }
}

/// Focus-cycling text form shared by every entity dialog. With six entity
/// families the field list is data instead of one struct per dialog.
#[derive(Clone)]
pub(crate) struct TextForm {
    pub(crate) fields: Vec<TextField>,
    pub(crate) active: usize,
    pub(crate) error: Option<String>,
}

impl TextForm {
    pub(crate) fn new(fields: Vec<TextField>) -> Self {
        Self {
            fields,
            active: 0,
            error: None,
        }
    }

    /// Move focus to the next field, wrapping.
    pub(crate) fn next_field(&mut self) {
        if !self.fields.is_empty() {
            self.active = (self.active + 1) % self.fields.len();
        }
    }

    /// Append a character to the active field, filtering control characters
    /// and enforcing numeric-only fields.
    pub(crate) fn push_char(&mut self, ch: char) -> bool {
        if ch.is_control() {
            return false;
        }
        let Some(field) = self.fields.get_mut(self.active) else {
            return false;
        };
        if field.numeric && !ch.is_ascii_digit() {
            return false;
        }
        field.value.push(ch);
        true
    }

    /// Remove the last character from the active field.
    pub(crate) fn backspace(&mut self) {
        if let Some(field) = self.fields.get_mut(self.active) {
            field.value.pop();
        }
    }

    /// Trimmed value of a field by index.
    pub(crate) fn value(&self, index: usize) -> &str {
        self.fields
            .get(index)
            .map(|f| f.value.as_str())
            .unwrap_or("")
            .trim()
    }

    /// Render one field as a styled line: yellow when focused, dimmed
    /// placeholder when empty.
    pub(crate) fn build_line(&self, index: usize) -> Line<'static> {
        let Some(field) = self.fields.get(index) else {
            return Line::from("");
        };
        let is_active = index == self.active;

        let display = if field.value.is_empty() {
            if field.required {
                "<required>".to_string()
            } else {
                "<optional>".to_string()
            }
        } else {
            field.value.clone()
        };

        let style = if is_active {
            Style::default().fg(Color::Yellow)
        } else if field.value.is_empty() {
            Style::default().fg(Color::DarkGray)
        } else {
            Style::default()
        };

        Line::from(vec![
            Span::raw(format!("{}: ", field.label)),
            Span::styled(display, style),
        ])
    }
}

/// Reject emails that are present but don't look like one. Empty passes
/// because the column is optional.
pub(crate) fn validate_email(email: &str) -> Result<()> {
    if !email.is_empty() && (!email.contains('@') || !email.contains('.')) {
        return Err(anyhow!("Please enter a valid email address."));
    }
    Ok(())
}

/// Author dialog: name required, the rest free text.
pub(crate) fn author_form() -> TextForm {
    TextForm::new(vec![
        TextField::new("Name", true),
        TextField::new("Biography", false),
        TextField::new("Birth date", false),
    ])
}

pub(crate) fn author_form_from(author: &Author) -> TextForm {
    TextForm::new(vec![
        TextField::new("Name", true).with_value(&author.name),
        TextField::new("Biography", false).with_value(&author.biography),
        TextField::new("Birth date", false).with_value(&author.birth_date),
    ])
}

pub(crate) fn parse_author(form: &TextForm) -> Result<(String, String, String)> {
    let name = form.value(0);
    if name.is_empty() {
        return Err(anyhow!("Author name is required."));
    }
    Ok((
        name.to_string(),
        form.value(1).to_string(),
        form.value(2).to_string(),
    ))
}

/// Publisher dialog mirrors the author one.
pub(crate) fn publisher_form() -> TextForm {
    TextForm::new(vec![
        TextField::new("Name", true),
        TextField::new("Address", false),
        TextField::new("Contact info", false),
    ])
}

pub(crate) fn publisher_form_from(publisher: &Publisher) -> TextForm {
    TextForm::new(vec![
        TextField::new("Name", true).with_value(&publisher.name),
        TextField::new("Address", false).with_value(&publisher.address),
        TextField::new("Contact info", false).with_value(&publisher.contact_info),
    ])
}

pub(crate) fn parse_publisher(form: &TextForm) -> Result<(String, String, String)> {
    let name = form.value(0);
    if name.is_empty() {
        return Err(anyhow!("Publisher name is required."));
    }
    Ok((
        name.to_string(),
        form.value(1).to_string(),
        form.value(2).to_string(),
    ))
}

pub(crate) fn category_form() -> TextForm {
    TextForm::new(vec![TextField::new("Name", true)])
}

pub(crate) fn category_form_from(name: &str) -> TextForm {
    TextForm::new(vec![TextField::new("Name", true).with_value(name)])
}

pub(crate) fn parse_category(form: &TextForm) -> Result<String> {
    let name = form.value(0);
    if name.is_empty() {
        return Err(anyhow!("Category name is required."));
    }
    Ok(name.to_string())
}

/// Member dialog. The join date is not a field: it is stamped at creation
/// and immutable afterwards.
pub(crate) fn member_form() -> TextForm {
    TextForm::new(vec![
        TextField::new("First name", true),
        TextField::new("Last name", true),
        TextField::new("Email", false),
        TextField::new("Phone", false),
        TextField::new("Address", false),
    ])
}

pub(crate) fn member_form_from(member: &Member) -> TextForm {
    TextForm::new(vec![
        TextField::new("First name", true).with_value(&member.first_name),
        TextField::new("Last name", true).with_value(&member.last_name),
        TextField::new("Email", false).with_value(&member.email),
        TextField::new("Phone", false).with_value(&member.phone),
        TextField::new("Address", false).with_value(&member.address),
    ])
}

pub(crate) fn parse_member(form: &TextForm) -> Result<(String, String, String, String, String)> {
    let first = form.value(0);
    let last = form.value(1);
    if first.is_empty() || last.is_empty() {
        return Err(anyhow!("First name and last name are required."));
    }
    let email = form.value(2);
    validate_email(email)?;
    Ok((
        first.to_string(),
        last.to_string(),
        email.to_string(),
        form.value(3).to_string(),
        form.value(4).to_string(),
    ))
}

/// Single- or multi-select list used for foreign keys and join sets.
pub(crate) struct Picker<K: Clone + PartialEq> {
    pub(crate) title: &'static str,
    pub(crate) options: Vec<(K, String)>,
    pub(crate) cursor: usize,
    pub(crate) chosen: Vec<K>,
    pub(crate) multi: bool,
}

impl<K: Clone + PartialEq> Picker<K> {
    pub(crate) fn single(title: &'static str, options: Vec<(K, String)>) -> Self {
        Self {
            title,
            options,
            cursor: 0,
            chosen: Vec::new(),
            multi: false,
        }
    }

    pub(crate) fn multi(title: &'static str, options: Vec<(K, String)>, chosen: Vec<K>) -> Self {
        Self {
            title,
            options,
            cursor: 0,
            chosen,
            multi: true,
        }
    }

    pub(crate) fn move_cursor(&mut self, offset: isize) {
        if self.options.is_empty() {
            return;
        }
        let len = self.options.len() as isize;
        let mut new = self.cursor as isize + offset;
        if new < 0 {
            new = 0;
        }
        if new >= len {
            new = len - 1;
        }
        self.cursor = new as usize;
    }

    /// Toggle the highlighted option in or out of the chosen set (multi) or
    /// make it the sole choice (single).
    pub(crate) fn toggle_current(&mut self) {
        let Some((key, _)) = self.options.get(self.cursor) else {
            return;
        };
        if self.multi {
            if let Some(pos) = self.chosen.iter().position(|k| k == key) {
                self.chosen.remove(pos);
            } else {
                self.chosen.push(key.clone());
            }
        } else {
            self.chosen = vec![key.clone()];
        }
    }

    pub(crate) fn is_chosen(&self, key: &K) -> bool {
        self.chosen.contains(key)
    }

    /// The single selection, preferring an explicit toggle over the cursor.
    pub(crate) fn selection(&self) -> Option<K> {
        if let Some(first) = self.chosen.first() {
            return Some(first.clone());
        }
        self.options.get(self.cursor).map(|(key, _)| key.clone())
    }
}

/// Which panel of the book wizard currently has focus.
#[derive(Copy, Clone, PartialEq, Eq)]
pub(crate) enum BookStage {
    Fields,
    Publisher,
    Authors,
    Categories,
}

/// Multi-stage book dialog: text fields, then publisher, author, and
/// category selection. Enter advances; the final Enter submits.
pub(crate) struct BookForm {
    /// `Some(isbn)` when editing; the natural key is immutable, so the
    /// field set omits it.
    pub(crate) isbn_fixed: Option<String>,
    pub(crate) fields: TextForm,
    pub(crate) publisher: Picker<i64>,
    pub(crate) authors: Picker<i64>,
    pub(crate) categories: Picker<i64>,
    pub(crate) stage: BookStage,
}

impl BookForm {
    pub(crate) fn adding(
        publishers: Vec<(i64, String)>,
        authors: Vec<(i64, String)>,
        categories: Vec<(i64, String)>,
    ) -> Self {
        Self {
            isbn_fixed: None,
            fields: TextForm::new(vec![
                TextField::new("ISBN", true),
                TextField::new("Title", true),
                TextField::numeric("Year", true),
                TextField::new("Edition", false),
                TextField::numeric("Copies", true).with_value("1"),
            ]),
            publisher: Picker::single("Publisher", publishers),
            authors: Picker::multi("Authors", authors, Vec::new()),
            categories: Picker::multi("Categories", categories, Vec::new()),
            stage: BookStage::Fields,
        }
    }

    pub(crate) fn editing(
        listing: &BookListing,
        publishers: Vec<(i64, String)>,
        authors: Vec<(i64, String)>,
        author_ids: Vec<i64>,
        categories: Vec<(i64, String)>,
        category_ids: Vec<i64>,
    ) -> Self {
        let mut publisher = Picker::single("Publisher", publishers);
        publisher.chosen = vec![listing.publisher_id];
        if let Some(pos) = publisher
            .options
            .iter()
            .position(|(id, _)| *id == listing.publisher_id)
        {
            publisher.cursor = pos;
        }
        Self {
            isbn_fixed: Some(listing.isbn.clone()),
            fields: TextForm::new(vec![
                TextField::new("Title", true).with_value(&listing.title),
                TextField::numeric("Year", true).with_value(listing.publication_year.to_string()),
                TextField::new("Edition", false).with_value(&listing.edition),
            ]),
            publisher,
            authors: Picker::multi("Authors", authors, author_ids),
            categories: Picker::multi("Categories", categories, category_ids),
            stage: BookStage::Fields,
        }
    }

    pub(crate) fn is_editing(&self) -> bool {
        self.isbn_fixed.is_some()
    }

    /// Validate the text fields before leaving the Fields stage.
    pub(crate) fn check_fields(&self) -> Result<()> {
        if self.isbn_fixed.is_none() && self.fields.value(0).is_empty() {
            return Err(anyhow!("ISBN is required."));
        }
        let (title_idx, year_idx) = self.indices();
        if self.fields.value(title_idx).is_empty() {
            return Err(anyhow!("Title is required."));
        }
        self.fields
            .value(year_idx)
            .parse::<i64>()
            .map_err(|_| anyhow!("Year must be a valid number."))?;
        if !self.is_editing() {
            let copies: u32 = self
                .fields
                .value(4)
                .parse()
                .map_err(|_| anyhow!("Copies must be a valid number."))?;
            if copies == 0 {
                return Err(anyhow!("At least one copy is required."));
            }
        }
        Ok(())
    }

    /// Produce the typed record plus association sets and (when adding) the
    /// copy count.
    pub(crate) fn parse(&self) -> Result<(Book, Vec<i64>, Vec<i64>, u32)> {
        self.check_fields()?;
        let publisher_id = self
            .publisher
            .selection()
            .ok_or_else(|| anyhow!("Please select a publisher."))?;

        let (title_idx, year_idx) = self.indices();
        let isbn = match &self.isbn_fixed {
            Some(fixed) => fixed.clone(),
            None => self.fields.value(0).to_string(),
        };
        let copy_count = if self.is_editing() {
            0
        } else {
            self.fields.value(4).parse().context("Copies must be a valid number.")?
        };

        let book = Book {
            isbn,
            title: self.fields.value(title_idx).to_string(),
            publication_year: self
                .fields
                .value(year_idx)
                .parse()
                .context("Year must be a valid number.")?,
            edition: self.fields.value(title_idx + 2).to_string(),
            publisher_id,
        };
        Ok((
            book,
            self.authors.chosen.clone(),
            self.categories.chosen.clone(),
            copy_count,
        ))
    }

    /// (title, year) field indices differ between add and edit because the
    /// edit form has no ISBN field.
    fn indices(&self) -> (usize, usize) {
        if self.is_editing() {
            (0, 1)
        } else {
            (1, 2)
        }
    }
}

/// Which panel of the issue-loan wizard has focus.
#[derive(Copy, Clone, PartialEq, Eq)]
pub(crate) enum LoanStage {
    Book,
    Member,
    Dates,
}

/// Issue dialog: pick a title with available stock, pick a member, confirm
/// dates. The copy itself is resolved at submit time via
/// `first_available_copy`, like the original issuance flow.
pub(crate) struct LoanForm {
    pub(crate) books: Picker<String>,
    pub(crate) members: Picker<i64>,
    pub(crate) dates: TextForm,
    pub(crate) stage: LoanStage,
}

impl LoanForm {
    pub(crate) fn new(
        books: Vec<(String, String)>,
        members: Vec<(i64, String)>,
        today: NaiveDate,
    ) -> Self {
        let due = today.checked_add_days(Days::new(14)).unwrap_or(today);
        Self {
            books: Picker::single("Book", books),
            members: Picker::single("Member", members),
            dates: TextForm::new(vec![
                TextField::new("Issue date (YYYY-MM-DD)", true).with_value(today.to_string()),
                TextField::new("Due date (YYYY-MM-DD)", true).with_value(due.to_string()),
            ]),
            stage: LoanStage::Book,
        }
    }

    pub(crate) fn parse(&self) -> Result<(String, i64, NaiveDate, NaiveDate)> {
        let isbn = self
            .books
            .selection()
            .ok_or_else(|| anyhow!("Please select a book."))?;
        let member_id = self
            .members
            .selection()
            .ok_or_else(|| anyhow!("Please select a member."))?;
        let issue = parse_date(self.dates.value(0)).context("Issue date must be YYYY-MM-DD.")?;
        let due = parse_date(self.dates.value(1)).context("Due date must be YYYY-MM-DD.")?;
        if due < issue {
            return Err(anyhow!("Due date cannot precede the issue date."));
        }
        Ok((isbn, member_id, issue, due))
    }
}

/// Shelf-location dialog for appending a copy to the highlighted book.
pub(crate) fn copy_form() -> TextForm {
    TextForm::new(vec![TextField::new("Shelf location", false)])
}

pub(crate) fn parse_date(text: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").context("dates use the YYYY-MM-DD format")
}

/// What a pending delete confirmation will remove once accepted.
pub(crate) enum DeleteTarget {
    Author(i64),
    Publisher(i64),
    Category(i64),
    Book(String),
    Member(i64),
}

/// Confirmation dialog state: the target plus the label shown to the user.
pub(crate) struct ConfirmDelete {
    pub(crate) target: DeleteTarget,
    pub(crate) label: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_rule_matches_boundary_contract() {
        assert!(validate_email("").is_ok());
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("user@nodot").is_err());
        assert!(validate_email("nodomain.com").is_err());
    }

    #[test]
    fn member_parse_requires_both_names() {
        let mut form = member_form();
        form.fields[0].value = "Only".to_string();
        assert!(parse_member(&form).is_err());
        form.fields[1].value = "Name".to_string();
        assert!(parse_member(&form).is_ok());
    }

    #[test]
    fn numeric_fields_reject_letters() {
        let mut form = TextForm::new(vec![TextField::numeric("Year", true)]);
        assert!(!form.push_char('x'));
        assert!(form.push_char('1'));
        assert_eq!(form.value(0), "1");
    }

    #[test]
    fn book_form_validates_year_and_copies() {
        let mut form = BookForm::adding(vec![(1, "Tor".into())], Vec::new(), Vec::new());
        form.fields.fields[0].value = "978-x".into();
        form.fields.fields[1].value = "Title".into();
        form.fields.fields[2].value = "199x".into();
        assert!(form.check_fields().is_err());
        form.fields.fields[2].value = "1999".into();
        form.fields.fields[4].value = "0".into();
        assert!(form.check_fields().is_err());
        form.fields.fields[4].value = "2".into();
        assert!(form.check_fields().is_ok());

        form.publisher.toggle_current();
        let (book, _, _, copies) = form.parse().unwrap();
        assert_eq!(book.publisher_id, 1);
        assert_eq!(copies, 2);
    }

    #[test]
    fn loan_form_rejects_inverted_dates() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let mut form = LoanForm::new(
            vec![("978-1".into(), "Title".into())],
            vec![(1, "May Reader".into())],
            today,
        );
        form.dates.fields[1].value = "2024-05-01".into();
        assert!(form.parse().is_err());
        form.dates.fields[1].value = "2024-06-15".into();
        let (isbn, member, issue, due) = form.parse().unwrap();
        assert_eq!(isbn, "978-1");
        assert_eq!(member, 1);
        assert_eq!(issue, today);
        assert_eq!(due, NaiveDate::from_ymd_opt(2024, 6, 15).unwrap());
    }
}
