use std::mem;

use anyhow::Result;
use chrono::{Local, NaiveDate};
use crossterm::event::KeyCode;
use ratatui::layout::{Alignment, Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap};
use ratatui::Frame;
use rusqlite::Connection;

use crate::db::{
    add_copy, create_author, create_book, create_category, create_member, create_publisher,
    delete_author, delete_book, delete_category, delete_member, delete_publisher,
    fetch_author_ids, fetch_authors, fetch_available_books, fetch_books, fetch_categories,
    fetch_category_ids, fetch_loans, fetch_members, fetch_publishers, first_available_copy,
    issue_loan, return_loan, update_author, update_book, update_category, update_member,
    update_publisher,
};
use crate::models::{Author, Category, CopyStatus, LoanListing, Member, Publisher};

use super::forms::{
    author_form, author_form_from, category_form, category_form_from, copy_form, member_form,
    member_form_from, parse_author, parse_category, parse_member, parse_publisher,
    publisher_form, publisher_form_from, BookForm, BookStage, ConfirmDelete, DeleteTarget,
    LoanForm, LoanStage, Picker, TextForm,
};
use super::helpers::{centered_rect, pad_column, surface_error};
use super::screens::{BooksScreen, ReportSummary, TableNav};

/// Footer space reserved for the key hints and status message.
const FOOTER_HEIGHT: u16 = 3;

/// Entries on the main menu, in display order.
#[derive(Copy, Clone, PartialEq, Eq)]
enum MenuItem {
    Books,
    Authors,
    Publishers,
    Categories,
    Members,
    Loans,
    Reports,
}

impl MenuItem {
    const ALL: [MenuItem; 7] = [
        MenuItem::Books,
        MenuItem::Authors,
        MenuItem::Publishers,
        MenuItem::Categories,
        MenuItem::Members,
        MenuItem::Loans,
        MenuItem::Reports,
    ];

    fn label(self) -> &'static str {
        match self {
            MenuItem::Books => "Books",
            MenuItem::Authors => "Authors",
            MenuItem::Publishers => "Publishers",
            MenuItem::Categories => "Categories",
            MenuItem::Members => "Members",
            MenuItem::Loans => "Loans",
            MenuItem::Reports => "Reports",
        }
    }
}

/// High-level navigation states. Keeping this explicit makes it easy to
/// reason about which rendering path runs and what each key should do.
enum Screen {
    Menu(TableNav<MenuItem>),
    Books(BooksScreen),
    Authors(TableNav<Author>),
    Publishers(TableNav<Publisher>),
    Categories(TableNav<Category>),
    Members(TableNav<Member>),
    Loans(TableNav<LoanListing>),
    Reports(ReportSummary),
}

impl Screen {
    fn title(&self) -> &'static str {
        match self {
            Screen::Menu(_) => "Main Menu",
            Screen::Books(_) => "Books",
            Screen::Authors(_) => "Authors",
            Screen::Publishers(_) => "Publishers",
            Screen::Categories(_) => "Categories",
            Screen::Members(_) => "Members",
            Screen::Loans(_) => "Loans",
            Screen::Reports(_) => "Reports",
        }
    }
}

/// Fine-grained modes scoped to the current screen. Forms own their state
/// until they submit or cancel.
enum Mode {
    Normal,
    AuthorForm { id: Option<i64>, form: TextForm },
    PublisherForm { id: Option<i64>, form: TextForm },
    CategoryForm { id: Option<i64>, form: TextForm },
    MemberForm { id: Option<i64>, form: TextForm },
    BookForm(Box<BookForm>),
    LoanForm(Box<LoanForm>),
    CopyForm { isbn: String, form: TextForm },
    ConfirmDelete(ConfirmDelete),
    ConfirmReturn { loan_id: i64, label: String },
}

/// Holds the footer message text plus its severity.
struct StatusMessage {
    text: String,
    kind: StatusKind,
}

enum StatusKind {
    Info,
    Error,
}

impl StatusKind {
    fn style(&self) -> Style {
        match self {
            StatusKind::Info => Style::default().fg(Color::Green),
            StatusKind::Error => Style::default().fg(Color::Red),
        }
    }
}

/// Central application state shared across the TUI. The connection is owned
/// here and handed by reference into every repository call.
pub struct App {
    conn: Connection,
    screen: Screen,
    mode: Mode,
    status: Option<StatusMessage>,
}

impl App {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            screen: Screen::Menu(TableNav::new(MenuItem::ALL.to_vec())),
            mode: Mode::Normal,
            status: None,
        }
    }

    pub fn handle_key(&mut self, code: KeyCode) -> Result<bool> {
        let mut exit = false;
        let mode = mem::replace(&mut self.mode, Mode::Normal);

        self.mode = match mode {
            Mode::Normal => self.handle_normal_key(code, &mut exit)?,
            Mode::AuthorForm { id, form } => self.handle_author_form(code, id, form)?,
            Mode::PublisherForm { id, form } => self.handle_publisher_form(code, id, form)?,
            Mode::CategoryForm { id, form } => self.handle_category_form(code, id, form)?,
            Mode::MemberForm { id, form } => self.handle_member_form(code, id, form)?,
            Mode::BookForm(form) => self.handle_book_form(code, form)?,
            Mode::LoanForm(form) => self.handle_loan_form(code, form)?,
            Mode::CopyForm { isbn, form } => self.handle_copy_form(code, isbn, form)?,
            Mode::ConfirmDelete(confirm) => self.handle_confirm_delete(code, confirm)?,
            Mode::ConfirmReturn { loan_id, label } => {
                self.handle_confirm_return(code, loan_id, label)?
            }
        };

        Ok(exit)
    }

    fn handle_normal_key(&mut self, code: KeyCode, exit: &mut bool) -> Result<Mode> {
        match code {
            KeyCode::Up => self.move_cursor(-1)?,
            KeyCode::Down => self.move_cursor(1)?,
            KeyCode::PageUp => self.move_cursor(-5)?,
            KeyCode::PageDown => self.move_cursor(5)?,
            KeyCode::Char('q') => *exit = true,
            KeyCode::Esc => {
                if matches!(self.screen, Screen::Menu(_)) {
                    *exit = true;
                } else {
                    self.clear_status();
                    self.screen = Screen::Menu(TableNav::new(MenuItem::ALL.to_vec()));
                }
            }
            KeyCode::Enter => {
                if let Screen::Menu(menu) = &self.screen {
                    if let Some(item) = menu.current().copied() {
                        self.clear_status();
                        self.open_menu_item(item)?;
                    }
                }
            }
            KeyCode::Char('+') => return self.begin_add(),
            KeyCode::Char('e') | KeyCode::Char('E') => return self.begin_edit(),
            KeyCode::Char('-') => return self.begin_delete(),
            KeyCode::Char('c') | KeyCode::Char('C') => return self.begin_add_copy(),
            KeyCode::Char('r') | KeyCode::Char('R') => return self.begin_return(),
            _ => {}
        }
        Ok(Mode::Normal)
    }

    fn move_cursor(&mut self, offset: isize) -> Result<()> {
        match &mut self.screen {
            Screen::Menu(nav) => nav.move_selection(offset),
            Screen::Books(books) => {
                books.table.move_selection(offset);
                books.refresh_copies(&self.conn)?;
            }
            Screen::Authors(nav) => nav.move_selection(offset),
            Screen::Publishers(nav) => nav.move_selection(offset),
            Screen::Categories(nav) => nav.move_selection(offset),
            Screen::Members(nav) => nav.move_selection(offset),
            Screen::Loans(nav) => nav.move_selection(offset),
            Screen::Reports(_) => {}
        }
        Ok(())
    }

    fn open_menu_item(&mut self, item: MenuItem) -> Result<()> {
        self.screen = match item {
            MenuItem::Books => Screen::Books(BooksScreen::load(&self.conn)?),
            MenuItem::Authors => Screen::Authors(TableNav::new(fetch_authors(&self.conn)?)),
            MenuItem::Publishers => {
                Screen::Publishers(TableNav::new(fetch_publishers(&self.conn)?))
            }
            MenuItem::Categories => {
                Screen::Categories(TableNav::new(fetch_categories(&self.conn)?))
            }
            MenuItem::Members => Screen::Members(TableNav::new(fetch_members(&self.conn)?)),
            MenuItem::Loans => Screen::Loans(TableNav::new(fetch_loans(&self.conn)?)),
            MenuItem::Reports => Screen::Reports(ReportSummary::load(&self.conn, today())?),
        };
        Ok(())
    }

    /// Re-read the rows of whatever screen is showing, keeping the cursor
    /// near its old position.
    fn refresh_screen(&mut self) -> Result<()> {
        match &mut self.screen {
            Screen::Menu(_) => {}
            Screen::Books(books) => {
                books.table.set_rows(fetch_books(&self.conn)?);
                books.refresh_copies(&self.conn)?;
            }
            Screen::Authors(nav) => nav.set_rows(fetch_authors(&self.conn)?),
            Screen::Publishers(nav) => nav.set_rows(fetch_publishers(&self.conn)?),
            Screen::Categories(nav) => nav.set_rows(fetch_categories(&self.conn)?),
            Screen::Members(nav) => nav.set_rows(fetch_members(&self.conn)?),
            Screen::Loans(nav) => nav.set_rows(fetch_loans(&self.conn)?),
            Screen::Reports(summary) => *summary = ReportSummary::load(&self.conn, today())?,
        }
        Ok(())
    }

    fn begin_add(&mut self) -> Result<Mode> {
        self.clear_status();
        match &self.screen {
            Screen::Authors(_) => Ok(Mode::AuthorForm {
                id: None,
                form: author_form(),
            }),
            Screen::Publishers(_) => Ok(Mode::PublisherForm {
                id: None,
                form: publisher_form(),
            }),
            Screen::Categories(_) => Ok(Mode::CategoryForm {
                id: None,
                form: category_form(),
            }),
            Screen::Members(_) => Ok(Mode::MemberForm {
                id: None,
                form: member_form(),
            }),
            Screen::Books(_) => {
                let publishers = fetch_publishers(&self.conn)?;
                if publishers.is_empty() {
                    self.set_status("Add a publisher before adding books.", StatusKind::Error);
                    return Ok(Mode::Normal);
                }
                let authors = fetch_authors(&self.conn)?;
                let categories = fetch_categories(&self.conn)?;
                Ok(Mode::BookForm(Box::new(BookForm::adding(
                    publishers.into_iter().map(|p| (p.id, p.name)).collect(),
                    authors.into_iter().map(|a| (a.id, a.name)).collect(),
                    categories.into_iter().map(|c| (c.id, c.name)).collect(),
                ))))
            }
            Screen::Loans(_) => {
                let books = fetch_available_books(&self.conn)?;
                if books.is_empty() {
                    self.set_status("No copies are available to lend.", StatusKind::Error);
                    return Ok(Mode::Normal);
                }
                let members = fetch_members(&self.conn)?;
                if members.is_empty() {
                    self.set_status("Register a member before issuing loans.", StatusKind::Error);
                    return Ok(Mode::Normal);
                }
                Ok(Mode::LoanForm(Box::new(LoanForm::new(
                    books.into_iter().map(|b| (b.isbn, b.title)).collect(),
                    members
                        .into_iter()
                        .map(|m| {
                            let name = m.full_name();
                            (m.id, name)
                        })
                        .collect(),
                    today(),
                ))))
            }
            _ => Ok(Mode::Normal),
        }
    }

    fn begin_edit(&mut self) -> Result<Mode> {
        self.clear_status();
        match &self.screen {
            Screen::Authors(nav) => match nav.current() {
                Some(author) => Ok(Mode::AuthorForm {
                    id: Some(author.id),
                    form: author_form_from(author),
                }),
                None => self.nothing_selected(),
            },
            Screen::Publishers(nav) => match nav.current() {
                Some(publisher) => Ok(Mode::PublisherForm {
                    id: Some(publisher.id),
                    form: publisher_form_from(publisher),
                }),
                None => self.nothing_selected(),
            },
            Screen::Categories(nav) => match nav.current() {
                Some(category) => Ok(Mode::CategoryForm {
                    id: Some(category.id),
                    form: category_form_from(&category.name),
                }),
                None => self.nothing_selected(),
            },
            Screen::Members(nav) => match nav.current() {
                Some(member) => Ok(Mode::MemberForm {
                    id: Some(member.id),
                    form: member_form_from(member),
                }),
                None => self.nothing_selected(),
            },
            Screen::Books(books) => {
                let Some(listing) = books.table.current().cloned() else {
                    return self.nothing_selected();
                };
                let publishers = fetch_publishers(&self.conn)?;
                let authors = fetch_authors(&self.conn)?;
                let categories = fetch_categories(&self.conn)?;
                let author_ids = fetch_author_ids(&self.conn, &listing.isbn)?;
                let category_ids = fetch_category_ids(&self.conn, &listing.isbn)?;
                Ok(Mode::BookForm(Box::new(BookForm::editing(
                    &listing,
                    publishers.into_iter().map(|p| (p.id, p.name)).collect(),
                    authors.into_iter().map(|a| (a.id, a.name)).collect(),
                    author_ids,
                    categories.into_iter().map(|c| (c.id, c.name)).collect(),
                    category_ids,
                ))))
            }
            _ => Ok(Mode::Normal),
        }
    }

    fn begin_delete(&mut self) -> Result<Mode> {
        self.clear_status();
        let confirm = match &self.screen {
            Screen::Authors(nav) => nav.current().map(|a| ConfirmDelete {
                target: DeleteTarget::Author(a.id),
                label: format!("Delete author \"{}\"?", a.name),
            }),
            Screen::Publishers(nav) => nav.current().map(|p| ConfirmDelete {
                target: DeleteTarget::Publisher(p.id),
                label: format!("Delete publisher \"{}\"?", p.name),
            }),
            Screen::Categories(nav) => nav.current().map(|c| ConfirmDelete {
                target: DeleteTarget::Category(c.id),
                label: format!("Delete category \"{}\"?", c.name),
            }),
            Screen::Members(nav) => nav.current().map(|m| ConfirmDelete {
                target: DeleteTarget::Member(m.id),
                label: format!("Delete member \"{}\"?", m.full_name()),
            }),
            Screen::Books(books) => books.table.current().map(|b| ConfirmDelete {
                target: DeleteTarget::Book(b.isbn.clone()),
                label: format!(
                    "Delete \"{}\"? All copies and loan history go with it.",
                    b.title
                ),
            }),
            _ => None,
        };

        match confirm {
            Some(confirm) => Ok(Mode::ConfirmDelete(confirm)),
            None => self.nothing_selected(),
        }
    }

    fn begin_add_copy(&mut self) -> Result<Mode> {
        if let Screen::Books(books) = &self.screen {
            let isbn = books.table.current().map(|book| book.isbn.clone());
            let Some(isbn) = isbn else {
                return self.nothing_selected();
            };
            self.clear_status();
            return Ok(Mode::CopyForm {
                isbn,
                form: copy_form(),
            });
        }
        Ok(Mode::Normal)
    }

    fn begin_return(&mut self) -> Result<Mode> {
        if let Screen::Loans(nav) = &self.screen {
            let Some(loan) = nav.current() else {
                return self.nothing_selected();
            };
            let active = loan.is_active();
            let loan_id = loan.id;
            let label = format!("Return \"{}\" for {}?", loan.title, loan.member_name);
            if !active {
                self.set_status("That loan is already returned.", StatusKind::Error);
                return Ok(Mode::Normal);
            }
            self.clear_status();
            return Ok(Mode::ConfirmReturn { loan_id, label });
        }
        Ok(Mode::Normal)
    }

    fn nothing_selected(&mut self) -> Result<Mode> {
        self.set_status("Nothing is selected.", StatusKind::Error);
        Ok(Mode::Normal)
    }

    fn handle_author_form(
        &mut self,
        code: KeyCode,
        id: Option<i64>,
        mut form: TextForm,
    ) -> Result<Mode> {
        match code {
            KeyCode::Esc => return Ok(Mode::Normal),
            KeyCode::Tab => form.next_field(),
            KeyCode::Backspace => form.backspace(),
            KeyCode::Char(ch) => {
                form.push_char(ch);
            }
            KeyCode::Enter => {
                let (name, biography, birth_date) = match parse_author(&form) {
                    Ok(values) => values,
                    Err(err) => {
                        form.error = Some(surface_error(&err));
                        return Ok(Mode::AuthorForm { id, form });
                    }
                };
                let result = match id {
                    Some(id) => {
                        update_author(&self.conn, id, &name, &biography, &birth_date)
                    }
                    None => create_author(&self.conn, &name, &biography, &birth_date).map(|_| ()),
                };
                return self.finish_submit(result, "Author saved.", Mode::AuthorForm { id, form });
            }
            _ => {}
        }
        Ok(Mode::AuthorForm { id, form })
    }

    fn handle_publisher_form(
        &mut self,
        code: KeyCode,
        id: Option<i64>,
        mut form: TextForm,
    ) -> Result<Mode> {
        match code {
            KeyCode::Esc => return Ok(Mode::Normal),
            KeyCode::Tab => form.next_field(),
            KeyCode::Backspace => form.backspace(),
            KeyCode::Char(ch) => {
                form.push_char(ch);
            }
            KeyCode::Enter => {
                let (name, address, contact) = match parse_publisher(&form) {
                    Ok(values) => values,
                    Err(err) => {
                        form.error = Some(surface_error(&err));
                        return Ok(Mode::PublisherForm { id, form });
                    }
                };
                let result = match id {
                    Some(id) => update_publisher(&self.conn, id, &name, &address, &contact),
                    None => create_publisher(&self.conn, &name, &address, &contact).map(|_| ()),
                };
                return self.finish_submit(
                    result,
                    "Publisher saved.",
                    Mode::PublisherForm { id, form },
                );
            }
            _ => {}
        }
        Ok(Mode::PublisherForm { id, form })
    }

    fn handle_category_form(
        &mut self,
        code: KeyCode,
        id: Option<i64>,
        mut form: TextForm,
    ) -> Result<Mode> {
        match code {
            KeyCode::Esc => return Ok(Mode::Normal),
            KeyCode::Tab => form.next_field(),
            KeyCode::Backspace => form.backspace(),
            KeyCode::Char(ch) => {
                form.push_char(ch);
            }
            KeyCode::Enter => {
                let name = match parse_category(&form) {
                    Ok(name) => name,
                    Err(err) => {
                        form.error = Some(surface_error(&err));
                        return Ok(Mode::CategoryForm { id, form });
                    }
                };
                let result = match id {
                    Some(id) => update_category(&self.conn, id, &name),
                    None => create_category(&self.conn, &name).map(|_| ()),
                };
                return self.finish_submit(
                    result,
                    "Category saved.",
                    Mode::CategoryForm { id, form },
                );
            }
            _ => {}
        }
        Ok(Mode::CategoryForm { id, form })
    }

    fn handle_member_form(
        &mut self,
        code: KeyCode,
        id: Option<i64>,
        mut form: TextForm,
    ) -> Result<Mode> {
        match code {
            KeyCode::Esc => return Ok(Mode::Normal),
            KeyCode::Tab => form.next_field(),
            KeyCode::Backspace => form.backspace(),
            KeyCode::Char(ch) => {
                form.push_char(ch);
            }
            KeyCode::Enter => {
                let (first, last, email, phone, address) = match parse_member(&form) {
                    Ok(values) => values,
                    Err(err) => {
                        form.error = Some(surface_error(&err));
                        return Ok(Mode::MemberForm { id, form });
                    }
                };
                let result = match id {
                    Some(id) => {
                        update_member(&self.conn, id, &first, &last, &email, &phone, &address)
                    }
                    None => create_member(
                        &self.conn,
                        &first,
                        &last,
                        &email,
                        &phone,
                        &address,
                        today(),
                    )
                    .map(|_| ()),
                };
                return self.finish_submit(result, "Member saved.", Mode::MemberForm { id, form });
            }
            _ => {}
        }
        Ok(Mode::MemberForm { id, form })
    }

    fn handle_book_form(&mut self, code: KeyCode, mut form: Box<BookForm>) -> Result<Mode> {
        match form.stage {
            BookStage::Fields => match code {
                KeyCode::Esc => return Ok(Mode::Normal),
                KeyCode::Tab => form.fields.next_field(),
                KeyCode::Backspace => form.fields.backspace(),
                KeyCode::Char(ch) => {
                    form.fields.push_char(ch);
                }
                KeyCode::Enter => match form.check_fields() {
                    Ok(()) => {
                        form.fields.error = None;
                        form.stage = BookStage::Publisher;
                    }
                    Err(err) => form.fields.error = Some(surface_error(&err)),
                },
                _ => {}
            },
            BookStage::Publisher => match code {
                KeyCode::Esc => form.stage = BookStage::Fields,
                KeyCode::Up => form.publisher.move_cursor(-1),
                KeyCode::Down => form.publisher.move_cursor(1),
                KeyCode::Char(' ') => form.publisher.toggle_current(),
                KeyCode::Enter => {
                    form.publisher.toggle_current();
                    form.stage = BookStage::Authors;
                }
                _ => {}
            },
            BookStage::Authors => match code {
                KeyCode::Esc => form.stage = BookStage::Publisher,
                KeyCode::Up => form.authors.move_cursor(-1),
                KeyCode::Down => form.authors.move_cursor(1),
                KeyCode::Char(' ') => form.authors.toggle_current(),
                KeyCode::Enter => form.stage = BookStage::Categories,
                _ => {}
            },
            BookStage::Categories => match code {
                KeyCode::Esc => form.stage = BookStage::Authors,
                KeyCode::Up => form.categories.move_cursor(-1),
                KeyCode::Down => form.categories.move_cursor(1),
                KeyCode::Char(' ') => form.categories.toggle_current(),
                KeyCode::Enter => {
                    let (book, author_ids, category_ids, copy_count) = match form.parse() {
                        Ok(values) => values,
                        Err(err) => {
                            form.fields.error = Some(surface_error(&err));
                            form.stage = BookStage::Fields;
                            return Ok(Mode::BookForm(form));
                        }
                    };
                    let editing = form.is_editing();
                    let result = if editing {
                        update_book(&mut self.conn, &book, &author_ids, &category_ids)
                    } else {
                        create_book(
                            &mut self.conn,
                            &book,
                            &author_ids,
                            &category_ids,
                            copy_count,
                        )
                    };
                    return self.finish_submit(result, "Book saved.", Mode::BookForm(form));
                }
                _ => {}
            },
        }
        Ok(Mode::BookForm(form))
    }

    fn handle_loan_form(&mut self, code: KeyCode, mut form: Box<LoanForm>) -> Result<Mode> {
        match form.stage {
            LoanStage::Book => match code {
                KeyCode::Esc => return Ok(Mode::Normal),
                KeyCode::Up => form.books.move_cursor(-1),
                KeyCode::Down => form.books.move_cursor(1),
                KeyCode::Char(' ') => form.books.toggle_current(),
                KeyCode::Enter => {
                    form.books.toggle_current();
                    form.stage = LoanStage::Member;
                }
                _ => {}
            },
            LoanStage::Member => match code {
                KeyCode::Esc => form.stage = LoanStage::Book,
                KeyCode::Up => form.members.move_cursor(-1),
                KeyCode::Down => form.members.move_cursor(1),
                KeyCode::Char(' ') => form.members.toggle_current(),
                KeyCode::Enter => {
                    form.members.toggle_current();
                    form.stage = LoanStage::Dates;
                }
                _ => {}
            },
            LoanStage::Dates => match code {
                KeyCode::Esc => form.stage = LoanStage::Member,
                KeyCode::Tab => form.dates.next_field(),
                KeyCode::Backspace => form.dates.backspace(),
                KeyCode::Char(ch) => {
                    form.dates.push_char(ch);
                }
                KeyCode::Enter => {
                    let (isbn, member_id, issue_date, due_date) = match form.parse() {
                        Ok(values) => values,
                        Err(err) => {
                            form.dates.error = Some(surface_error(&err));
                            return Ok(Mode::LoanForm(form));
                        }
                    };
                    let copy_id = match first_available_copy(&self.conn, &isbn)? {
                        Some(copy_id) => copy_id,
                        None => {
                            form.dates.error =
                                Some("No copy of that title is available.".to_string());
                            return Ok(Mode::LoanForm(form));
                        }
                    };
                    let result =
                        issue_loan(&mut self.conn, copy_id, member_id, issue_date, due_date)
                            .map(|_| ());
                    return self.finish_submit(result, "Loan issued.", Mode::LoanForm(form));
                }
                _ => {}
            },
        }
        Ok(Mode::LoanForm(form))
    }

    fn handle_copy_form(
        &mut self,
        code: KeyCode,
        isbn: String,
        mut form: TextForm,
    ) -> Result<Mode> {
        match code {
            KeyCode::Esc => return Ok(Mode::Normal),
            KeyCode::Backspace => form.backspace(),
            KeyCode::Char(ch) => {
                form.push_char(ch);
            }
            KeyCode::Enter => {
                let location = form.value(0).to_string();
                let result = add_copy(&self.conn, &isbn, &location).map(|_| ());
                return self.finish_submit(result, "Copy added.", Mode::CopyForm { isbn, form });
            }
            _ => {}
        }
        Ok(Mode::CopyForm { isbn, form })
    }

    fn handle_confirm_delete(&mut self, code: KeyCode, confirm: ConfirmDelete) -> Result<Mode> {
        match code {
            KeyCode::Enter | KeyCode::Char('y') | KeyCode::Char('Y') => {
                let result = match &confirm.target {
                    DeleteTarget::Author(id) => delete_author(&mut self.conn, *id),
                    DeleteTarget::Publisher(id) => delete_publisher(&mut self.conn, *id),
                    DeleteTarget::Category(id) => delete_category(&mut self.conn, *id),
                    DeleteTarget::Member(id) => delete_member(&mut self.conn, *id),
                    DeleteTarget::Book(isbn) => delete_book(&mut self.conn, isbn),
                };
                match result {
                    Ok(()) => {
                        self.refresh_screen()?;
                        self.set_status("Deleted.", StatusKind::Info);
                    }
                    Err(err) => {
                        self.set_status(&surface_error(&err), StatusKind::Error);
                    }
                }
                Ok(Mode::Normal)
            }
            KeyCode::Esc | KeyCode::Char('n') | KeyCode::Char('N') => Ok(Mode::Normal),
            _ => Ok(Mode::ConfirmDelete(confirm)),
        }
    }

    fn handle_confirm_return(
        &mut self,
        code: KeyCode,
        loan_id: i64,
        label: String,
    ) -> Result<Mode> {
        match code {
            KeyCode::Enter | KeyCode::Char('y') | KeyCode::Char('Y') => {
                match return_loan(&mut self.conn, loan_id, today()) {
                    Ok(()) => {
                        self.refresh_screen()?;
                        self.set_status("Loan returned.", StatusKind::Info);
                    }
                    Err(err) => {
                        self.set_status(&surface_error(&err), StatusKind::Error);
                    }
                }
                Ok(Mode::Normal)
            }
            KeyCode::Esc | KeyCode::Char('n') | KeyCode::Char('N') => Ok(Mode::Normal),
            _ => Ok(Mode::ConfirmReturn { loan_id, label }),
        }
    }

    /// Common tail of every form submission: on success refresh the screen
    /// and show `message`; on failure keep the dialog open with the root
    /// cause inlined.
    fn finish_submit(
        &mut self,
        result: Result<()>,
        message: &str,
        reopen: Mode,
    ) -> Result<Mode> {
        match result {
            Ok(()) => {
                self.refresh_screen()?;
                self.set_status(message, StatusKind::Info);
                Ok(Mode::Normal)
            }
            Err(err) => {
                let text = surface_error(&err);
                Ok(match reopen {
                    Mode::AuthorForm { id, mut form } => {
                        form.error = Some(text);
                        Mode::AuthorForm { id, form }
                    }
                    Mode::PublisherForm { id, mut form } => {
                        form.error = Some(text);
                        Mode::PublisherForm { id, form }
                    }
                    Mode::CategoryForm { id, mut form } => {
                        form.error = Some(text);
                        Mode::CategoryForm { id, form }
                    }
                    Mode::MemberForm { id, mut form } => {
                        form.error = Some(text);
                        Mode::MemberForm { id, form }
                    }
                    Mode::BookForm(mut form) => {
                        form.fields.error = Some(text);
                        form.stage = BookStage::Fields;
                        Mode::BookForm(form)
                    }
                    Mode::LoanForm(mut form) => {
                        form.dates.error = Some(text);
                        Mode::LoanForm(form)
                    }
                    Mode::CopyForm { isbn, mut form } => {
                        form.error = Some(text);
                        Mode::CopyForm { isbn, form }
                    }
                    other => other,
                })
            }
        }
    }

    fn set_status(&mut self, text: &str, kind: StatusKind) {
        self.status = Some(StatusMessage {
            text: text.to_string(),
            kind,
        });
    }

    fn clear_status(&mut self) {
        self.status = None;
    }

    pub fn draw(&mut self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(4),
                Constraint::Length(FOOTER_HEIGHT),
            ])
            .split(frame.area());

        let header = Paragraph::new(format!("Library Catalog :: {}", self.screen.title()))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL));
        frame.render_widget(header, chunks[0]);

        match &self.screen {
            Screen::Menu(menu) => self.draw_menu(frame, chunks[1], menu),
            Screen::Books(books) => self.draw_books(frame, chunks[1], books),
            Screen::Authors(nav) => self.draw_authors(frame, chunks[1], nav),
            Screen::Publishers(nav) => self.draw_publishers(frame, chunks[1], nav),
            Screen::Categories(nav) => self.draw_categories(frame, chunks[1], nav),
            Screen::Members(nav) => self.draw_members(frame, chunks[1], nav),
            Screen::Loans(nav) => self.draw_loans(frame, chunks[1], nav),
            Screen::Reports(summary) => self.draw_reports(frame, chunks[1], summary),
        }

        self.draw_footer(frame, chunks[2]);
        self.draw_modal(frame);
    }

    fn draw_menu(&self, frame: &mut Frame, area: ratatui::layout::Rect, menu: &TableNav<MenuItem>) {
        let items: Vec<ListItem> = menu
            .rows
            .iter()
            .enumerate()
            .map(|(idx, item)| {
                let selected = idx == menu.selected;
                let style = if selected {
                    Style::default().add_modifier(Modifier::BOLD).fg(Color::Yellow)
                } else {
                    Style::default()
                };
                ListItem::new(Line::from(Span::styled(
                    format!("  {}", item.label()),
                    style,
                )))
            })
            .collect();
        let list =
            List::new(items).block(Block::default().borders(Borders::ALL).title("Catalog"));
        frame.render_widget(list, area);
    }

    fn draw_books(&self, frame: &mut Frame, area: ratatui::layout::Rect, books: &BooksScreen) {
        let halves = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
            .split(area);

        let rows = books.table.rows.iter().map(|book| {
            format!(
                "{} {} {} {} {}",
                pad_column(&book.isbn, 16),
                pad_column(&book.title, 34),
                pad_column(&book.publication_year.to_string(), 5),
                pad_column(&book.publisher_name, 18),
                book.category_name
            )
        });
        let header = format!(
            "{} {} {} {} {}",
            pad_column("ISBN", 16),
            pad_column("Title", 34),
            pad_column("Year", 5),
            pad_column("Publisher", 18),
            "Category"
        );
        self.draw_table(frame, halves[0], "Books", &header, rows, books.table.selected);

        let copy_items: Vec<ListItem> = books
            .copies
            .iter()
            .map(|copy| {
                let style = match copy.status {
                    CopyStatus::Available => Style::default().fg(Color::Green),
                    CopyStatus::Loaned => Style::default().fg(Color::Yellow),
                    CopyStatus::Lost => Style::default().fg(Color::Red),
                };
                ListItem::new(Line::from(vec![
                    Span::raw(format!("#{:<5}", copy.id)),
                    Span::styled(pad_column(copy.status.as_str(), 10), style),
                    Span::raw(copy.shelf_location.clone()),
                ]))
            })
            .collect();
        let copies =
            List::new(copy_items).block(Block::default().borders(Borders::ALL).title("Copies"));
        frame.render_widget(copies, halves[1]);
    }

    fn draw_authors(&self, frame: &mut Frame, area: ratatui::layout::Rect, nav: &TableNav<Author>) {
        let rows = nav.rows.iter().map(|author| {
            format!(
                "{} {} {}",
                pad_column(&author.name, 28),
                pad_column(&author.birth_date, 12),
                author.biography
            )
        });
        let header = format!(
            "{} {} {}",
            pad_column("Name", 28),
            pad_column("Born", 12),
            "Biography"
        );
        self.draw_table(frame, area, "Authors", &header, rows, nav.selected);
    }

    fn draw_publishers(
        &self,
        frame: &mut Frame,
        area: ratatui::layout::Rect,
        nav: &TableNav<Publisher>,
    ) {
        let rows = nav.rows.iter().map(|publisher| {
            format!(
                "{} {} {}",
                pad_column(&publisher.name, 28),
                pad_column(&publisher.address, 30),
                publisher.contact_info
            )
        });
        let header = format!(
            "{} {} {}",
            pad_column("Name", 28),
            pad_column("Address", 30),
            "Contact"
        );
        self.draw_table(frame, area, "Publishers", &header, rows, nav.selected);
    }

    fn draw_categories(
        &self,
        frame: &mut Frame,
        area: ratatui::layout::Rect,
        nav: &TableNav<Category>,
    ) {
        let rows = nav.rows.iter().map(|category| category.name.clone());
        self.draw_table(frame, area, "Categories", "Name", rows, nav.selected);
    }

    fn draw_members(&self, frame: &mut Frame, area: ratatui::layout::Rect, nav: &TableNav<Member>) {
        let rows = nav.rows.iter().map(|member| {
            format!(
                "{} {} {} {}",
                pad_column(&member.full_name(), 26),
                pad_column(&member.email, 26),
                pad_column(&member.phone, 14),
                member.join_date
            )
        });
        let header = format!(
            "{} {} {} {}",
            pad_column("Name", 26),
            pad_column("Email", 26),
            pad_column("Phone", 14),
            "Joined"
        );
        self.draw_table(frame, area, "Members", &header, rows, nav.selected);
    }

    fn draw_loans(
        &self,
        frame: &mut Frame,
        area: ratatui::layout::Rect,
        nav: &TableNav<LoanListing>,
    ) {
        let now = today();
        let items: Vec<ListItem> = std::iter::once(ListItem::new(Line::from(Span::styled(
            format!(
                "{} {} {} {} {} {}",
                pad_column("Loan", 6),
                pad_column("Title", 30),
                pad_column("Member", 22),
                pad_column("Issued", 11),
                pad_column("Due", 11),
                "Returned"
            ),
            Style::default().add_modifier(Modifier::BOLD),
        ))))
        .chain(nav.rows.iter().enumerate().map(|(idx, loan)| {
            let returned = loan
                .return_date
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string());
            let text = format!(
                "{} {} {} {} {} {}",
                pad_column(&loan.id.to_string(), 6),
                pad_column(&loan.title, 30),
                pad_column(&loan.member_name, 22),
                pad_column(&loan.loan_date.to_string(), 11),
                pad_column(&loan.due_date.to_string(), 11),
                returned
            );
            let mut style = if loan.is_overdue(now) {
                Style::default().fg(Color::Red)
            } else if loan.is_active() {
                Style::default()
            } else {
                Style::default().fg(Color::DarkGray)
            };
            if idx == nav.selected {
                style = style.add_modifier(Modifier::REVERSED);
            }
            ListItem::new(Line::from(Span::styled(text, style)))
        }))
        .collect();

        let list = List::new(items).block(Block::default().borders(Borders::ALL).title("Loans"));
        frame.render_widget(list, area);
    }

    fn draw_reports(
        &self,
        frame: &mut Frame,
        area: ratatui::layout::Rect,
        summary: &ReportSummary,
    ) {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(area);
        let top = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(rows[0]);
        let bottom = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(rows[1]);

        let cards = [
            ("Total Books", summary.total_books, Color::Blue, top[0]),
            ("Total Members", summary.total_members, Color::Green, top[1]),
            ("Active Loans", summary.active_loans, Color::Yellow, bottom[0]),
            ("Overdue Loans", summary.overdue_loans, Color::Red, bottom[1]),
        ];
        for (title, value, color, rect) in cards {
            let card = Paragraph::new(Line::from(Span::styled(
                value.to_string(),
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            )))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL).title(title));
            frame.render_widget(card, rect);
        }
    }

    /// Shared table renderer: bold header row, reversed highlight on the
    /// selected row.
    fn draw_table(
        &self,
        frame: &mut Frame,
        area: ratatui::layout::Rect,
        title: &str,
        header: &str,
        rows: impl Iterator<Item = String>,
        selected: usize,
    ) {
        let items: Vec<ListItem> = std::iter::once(ListItem::new(Line::from(Span::styled(
            header.to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        ))))
        .chain(rows.enumerate().map(|(idx, text)| {
            let style = if idx == selected {
                Style::default().add_modifier(Modifier::REVERSED)
            } else {
                Style::default()
            };
            ListItem::new(Line::from(Span::styled(text, style)))
        }))
        .collect();

        let list = List::new(items).block(
            Block::default()
                .borders(Borders::ALL)
                .title(title.to_string()),
        );
        frame.render_widget(list, area);
    }

    fn draw_footer(&self, frame: &mut Frame, area: ratatui::layout::Rect) {
        let hints = match (&self.screen, &self.mode) {
            (_, Mode::Normal) => match &self.screen {
                Screen::Menu(_) => "Up/Down move · Enter open · q quit",
                Screen::Books(_) => {
                    "Up/Down select · + add · e edit · - delete · c add copy · Esc back"
                }
                Screen::Loans(_) => "Up/Down select · + issue · r return · Esc back",
                Screen::Reports(_) => "Esc back · q quit",
                _ => "Up/Down select · + add · e edit · - delete · Esc back",
            },
            (_, Mode::ConfirmDelete(_) | Mode::ConfirmReturn { .. }) => "y confirm · n cancel",
            (_, Mode::BookForm(_) | Mode::LoanForm(_)) => {
                "Tab next field · Space toggle · Enter continue · Esc back"
            }
            _ => "Tab next field · Enter save · Esc cancel",
        };

        let mut lines = vec![Line::from(Span::styled(
            hints,
            Style::default().fg(Color::DarkGray),
        ))];
        if let Some(status) = &self.status {
            lines.push(Line::from(Span::styled(
                status.text.clone(),
                status.kind.style(),
            )));
        }
        let footer = Paragraph::new(lines)
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::TOP));
        frame.render_widget(footer, area);
    }

    fn draw_modal(&self, frame: &mut Frame) {
        match &self.mode {
            Mode::Normal => {}
            Mode::AuthorForm { id, form } => {
                self.draw_text_form(frame, modal_title("Author", id.is_some()), form)
            }
            Mode::PublisherForm { id, form } => {
                self.draw_text_form(frame, modal_title("Publisher", id.is_some()), form)
            }
            Mode::CategoryForm { id, form } => {
                self.draw_text_form(frame, modal_title("Category", id.is_some()), form)
            }
            Mode::MemberForm { id, form } => {
                self.draw_text_form(frame, modal_title("Member", id.is_some()), form)
            }
            Mode::CopyForm { isbn, form } => {
                self.draw_text_form(frame, &format!("Add Copy for {isbn}"), form)
            }
            Mode::BookForm(form) => {
                let editing = form.is_editing();
                match form.stage {
                    BookStage::Fields => self.draw_text_form(
                        frame,
                        modal_title("Book", editing),
                        &form.fields,
                    ),
                    BookStage::Publisher => self.draw_picker(frame, &form.publisher),
                    BookStage::Authors => self.draw_picker(frame, &form.authors),
                    BookStage::Categories => self.draw_picker(frame, &form.categories),
                }
            }
            Mode::LoanForm(form) => match form.stage {
                LoanStage::Book => self.draw_picker(frame, &form.books),
                LoanStage::Member => self.draw_picker(frame, &form.members),
                LoanStage::Dates => self.draw_text_form(frame, "Issue Loan: Dates", &form.dates),
            },
            Mode::ConfirmDelete(confirm) => self.draw_confirm(frame, &confirm.label),
            Mode::ConfirmReturn { label, .. } => self.draw_confirm(frame, label),
        }
    }

    fn draw_text_form(&self, frame: &mut Frame, title: &str, form: &TextForm) {
        let area = centered_rect(60, 50, frame.area());
        frame.render_widget(Clear, area);

        let mut lines: Vec<Line> = (0..form.fields.len()).map(|i| form.build_line(i)).collect();
        if let Some(error) = &form.error {
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                error.clone(),
                Style::default().fg(Color::Red),
            )));
        }

        let dialog = Paragraph::new(lines).wrap(Wrap { trim: false }).block(
            Block::default()
                .borders(Borders::ALL)
                .title(title.to_string()),
        );
        frame.render_widget(dialog, area);
    }

    fn draw_picker<K: Clone + PartialEq>(&self, frame: &mut Frame, picker: &Picker<K>) {
        let area = centered_rect(60, 60, frame.area());
        frame.render_widget(Clear, area);

        let items: Vec<ListItem> = picker
            .options
            .iter()
            .enumerate()
            .map(|(idx, (key, label))| {
                let mark = if picker.is_chosen(key) { "[x]" } else { "[ ]" };
                let style = if idx == picker.cursor {
                    Style::default().fg(Color::Yellow)
                } else {
                    Style::default()
                };
                ListItem::new(Line::from(Span::styled(
                    format!("{mark} {label}"),
                    style,
                )))
            })
            .collect();

        let list = List::new(items).block(
            Block::default()
                .borders(Borders::ALL)
                .title(picker.title.to_string()),
        );
        frame.render_widget(list, area);
    }

    fn draw_confirm(&self, frame: &mut Frame, label: &str) {
        let area = centered_rect(50, 20, frame.area());
        frame.render_widget(Clear, area);

        let dialog = Paragraph::new(vec![
            Line::from(label.to_string()),
            Line::from(""),
            Line::from(Span::styled(
                "y: confirm    n: cancel",
                Style::default().fg(Color::DarkGray),
            )),
        ])
        .wrap(Wrap { trim: true })
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).title("Confirm"));
        frame.render_widget(dialog, area);
    }
}

fn modal_title(entity: &str, editing: bool) -> &'static str {
    match (entity, editing) {
        ("Author", false) => "Add Author",
        ("Author", true) => "Edit Author",
        ("Publisher", false) => "Add Publisher",
        ("Publisher", true) => "Edit Publisher",
        ("Category", false) => "Add Category",
        ("Category", true) => "Edit Category",
        ("Member", false) => "Add Member",
        ("Member", true) => "Edit Member",
        ("Book", false) => "Add Book",
        ("Book", true) => "Edit Book",
        _ => "Edit",
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}
