// 🏛️ Library Aggregate - the only entry point for the presentation layer
//
// Owns the Catalog, the Patron Registry and the Loan Ledger. Every mutation:
// 1. validates its input
// 2. applies the change to the registries (all checks first, then writes)
// 3. bumps the revision and persists the whole state through the Store
//
// A failed persist does not undo step 2: the caller gets a Persistence
// error and the in-memory state keeps the change.

use crate::clock::Clock;
use crate::entities::{
    Author, Book, Catalog, Loan, LoanLedger, Patron, PatronRegistry, MAX_ACTIVE_LOANS,
};
use crate::error::{EntityKind, LibraryError, Result};
use crate::store::{LibrarySnapshot, SnapshotRef, Store};
use crate::validation::{field_error, Context, FieldValidator};
use crate::views::{LoanRow, SearchFilter, ViewState};
use chrono::NaiveDate;
use tracing::{debug, info, warn};

pub struct Library {
    catalog: Catalog,
    patrons: PatronRegistry,
    loans: LoanLedger,
    views: ViewState,
    revision: u64,
    store: Box<dyn Store>,
    clock: Box<dyn Clock>,
    validator: FieldValidator,
}

impl Library {
    /// Restore the last saved state, or start empty
    ///
    /// A missing, unreadable or inconsistent state is never an error here.
    pub fn open(store: Box<dyn Store>, clock: Box<dyn Clock>) -> Self {
        let snapshot = match store.load() {
            Ok(Some(snapshot)) => match snapshot.check_consistency() {
                Ok(()) => {
                    info!(
                        books = snapshot.catalog.len(),
                        patrons = snapshot.patrons.len(),
                        loans = snapshot.loans.len(),
                        "library state restored"
                    );
                    snapshot
                }
                Err(reason) => {
                    warn!(%reason, "saved state is inconsistent, starting empty");
                    LibrarySnapshot::default()
                }
            },
            Ok(None) => {
                info!("no saved state, starting empty");
                LibrarySnapshot::default()
            }
            Err(e) => {
                warn!(error = %e, "saved state could not be read, starting empty");
                LibrarySnapshot::default()
            }
        };

        Library {
            catalog: snapshot.catalog,
            patrons: snapshot.patrons,
            loans: snapshot.loans,
            views: ViewState::default(),
            revision: 0,
            store,
            clock,
            validator: FieldValidator::new(),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn patrons(&self) -> &PatronRegistry {
        &self.patrons
    }

    pub fn loans(&self) -> &LoanLedger {
        &self.loans
    }

    /// Incremented after every committed mutation
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    // ========================================================================
    // FIELD VALIDATION
    // ========================================================================

    pub fn validate_book_fields(
        &self,
        title: &str,
        authors: &[Author],
        year: i32,
        isbn: &str,
        total_copies: u32,
        available_copies: u32,
    ) -> bool {
        self.validator
            .validate_book(title, authors, year, isbn, total_copies, available_copies)
            .is_ok()
    }

    pub fn validate_patron_fields(
        &self,
        first_name: &str,
        last_name: &str,
        matricola: &str,
        email: &str,
        active_loans: i32,
    ) -> bool {
        self.validator
            .validate_patron(first_name, last_name, matricola, email, active_loans)
            .is_ok()
    }

    // ========================================================================
    // BOOKS
    // ========================================================================

    /// Catalogue a new book with every copy on the shelf
    ///
    /// `available_copies` only takes part in validation.
    pub fn add_book(
        &mut self,
        title: &str,
        authors: Vec<Author>,
        year: i32,
        isbn: &str,
        total_copies: u32,
        available_copies: u32,
    ) -> Result<()> {
        self.validator
            .validate_book(title, &authors, year, isbn, total_copies, available_copies)
            .map_err(LibraryError::Validation)?;

        self.catalog
            .add(Book::new(title, authors, year, isbn, total_copies))?;

        info!(isbn, title, "book added");
        self.commit()
    }

    /// Remove a book with no copies out
    ///
    /// When the save fails the book is already gone from memory and the
    /// caller only gets the Persistence error; the removed entry is logged.
    pub fn remove_book(&mut self, isbn: &str) -> Result<Book> {
        let book = self.catalog.remove(isbn)?;

        info!(isbn, "book removed");
        if let Err(e) = self.commit() {
            warn!(%book, "removed book was not saved");
            return Err(e);
        }
        Ok(book)
    }

    /// Overwrite a book; loans follow an ISBN change
    pub fn edit_book(
        &mut self,
        isbn: &str,
        title: &str,
        authors: Vec<Author>,
        year: i32,
        new_isbn: &str,
        total_copies: u32,
    ) -> Result<()> {
        self.validator
            .validate_book(title, &authors, year, new_isbn, total_copies, total_copies)
            .map_err(LibraryError::Validation)?;

        self.catalog
            .edit(isbn, title, authors, year, new_isbn, total_copies)?;
        if new_isbn != isbn {
            self.loans.rekey_book(isbn, new_isbn);
        }

        info!(isbn, new_isbn, "book edited");
        self.commit()
    }

    // ========================================================================
    // PATRONS
    // ========================================================================

    pub fn add_patron(
        &mut self,
        first_name: &str,
        last_name: &str,
        matricola: &str,
        email: &str,
    ) -> Result<()> {
        self.validator
            .validate_patron(first_name, last_name, matricola, email, 0)
            .map_err(LibraryError::Validation)?;

        self.patrons
            .add(Patron::new(first_name, last_name, matricola, email))?;

        info!(matricola, "patron added");
        self.commit()
    }

    /// Remove a patron holding no loans; same save-failure rule as books
    pub fn remove_patron(&mut self, matricola: &str) -> Result<Patron> {
        let patron = self.patrons.remove(matricola)?;

        info!(matricola, "patron removed");
        if let Err(e) = self.commit() {
            warn!(%patron, "removed patron was not saved");
            return Err(e);
        }
        Ok(patron)
    }

    /// Overwrite a patron; loans follow a matricola change
    pub fn edit_patron(
        &mut self,
        matricola: &str,
        first_name: &str,
        last_name: &str,
        new_matricola: &str,
        email: &str,
    ) -> Result<()> {
        self.validator
            .validate_patron(first_name, last_name, new_matricola, email, 0)
            .map_err(LibraryError::Validation)?;

        self.patrons
            .edit(matricola, first_name, last_name, new_matricola, email)?;
        if new_matricola != matricola {
            self.loans.rekey_patron(matricola, new_matricola);
        }

        info!(matricola, new_matricola, "patron edited");
        self.commit()
    }

    // ========================================================================
    // LOANS
    // ========================================================================

    /// Lend one copy of `isbn` to `matricola` until `due_date`
    ///
    /// Checked in order: blank identifiers, unknown patron or book, no copy
    /// left, patron at the cap, same loan already recorded. Counters only
    /// move once every check has passed.
    pub fn create_loan(&mut self, matricola: &str, isbn: &str, due_date: NaiveDate) -> Result<Loan> {
        let mut missing = Vec::new();
        if matricola.trim().is_empty() {
            missing.push(field_error(Context::Loan, "matricola", "is required"));
        }
        if isbn.trim().is_empty() {
            missing.push(field_error(Context::Loan, "isbn", "is required"));
        }
        if !missing.is_empty() {
            return Err(LibraryError::Validation(missing));
        }

        let patron = self
            .patrons
            .get(matricola)
            .ok_or_else(|| LibraryError::not_found(EntityKind::Patron, matricola))?;
        let book = self
            .catalog
            .get(isbn)
            .ok_or_else(|| LibraryError::not_found(EntityKind::Book, isbn))?;

        if !book.is_available() {
            return Err(LibraryError::Capacity {
                isbn: isbn.to_string(),
            });
        }
        if patron.at_loan_limit() {
            return Err(LibraryError::LimitExceeded {
                matricola: matricola.to_string(),
                limit: MAX_ACTIVE_LOANS,
            });
        }

        let loan = self.loans.add(Loan::new(matricola, isbn, due_date))?;

        if let Some(book) = self.catalog.get_mut(isbn) {
            book.check_out()?;
        }
        if let Some(patron) = self.patrons.get_mut(matricola) {
            patron.open_loan()?;
        }

        info!(matricola, isbn, due = %due_date, "loan created");
        self.commit()?;
        Ok(loan)
    }

    /// Close a loan and put the copy back
    ///
    /// A handle returned by `create_loan` stays valid across ISBN and
    /// matricola edits; counters are updated on the entities the loan
    /// references now.
    pub fn return_loan(&mut self, loan: &Loan) -> Result<()> {
        let returned = self.loans.remove(loan)?;

        if let Some(book) = self.catalog.get_mut(returned.isbn()) {
            book.check_in();
        }
        if let Some(patron) = self.patrons.get_mut(returned.matricola()) {
            patron.close_loan();
        }

        info!(
            matricola = returned.matricola(),
            isbn = returned.isbn(),
            "loan returned"
        );
        self.commit()
    }

    // ========================================================================
    // READ VIEWS
    // ========================================================================

    pub fn filter_books(&mut self, query: Option<&str>) {
        self.views.books = SearchFilter::new(query);
        debug!(query = ?self.views.books.query(), "book filter set");
    }

    pub fn filter_patrons(&mut self, query: Option<&str>) {
        self.views.patrons = SearchFilter::new(query);
        debug!(query = ?self.views.patrons.query(), "patron filter set");
    }

    /// Catalog entries passing the book filter, in insertion order
    pub fn books_view(&self) -> Vec<&Book> {
        self.catalog
            .iter()
            .filter(|b| self.views.books.matches_book(b))
            .collect()
    }

    /// Patrons passing the patron filter, in insertion order
    pub fn patrons_view(&self) -> Vec<&Patron> {
        self.patrons
            .iter()
            .filter(|p| self.views.patrons.matches_patron(p))
            .collect()
    }

    /// Every active loan, unfiltered
    pub fn loans_view(&self) -> Vec<LoanRow<'_>> {
        let today = self.today();
        self.loans
            .iter()
            .filter_map(|loan| self.resolve(loan, today))
            .collect()
    }

    /// Active loans past their due date
    pub fn overdue_loans(&self) -> Vec<LoanRow<'_>> {
        self.loans_view().into_iter().filter(|row| row.late).collect()
    }

    fn resolve<'a>(&'a self, loan: &'a Loan, today: NaiveDate) -> Option<LoanRow<'a>> {
        let patron = self.patrons.get(loan.matricola())?;
        let book = self.catalog.get(loan.isbn())?;
        Some(LoanRow::new(loan, patron, book, today))
    }

    // ========================================================================
    // PERSISTENCE
    // ========================================================================

    /// Write Catalog, Patron Registry and Loan Ledger through the store
    pub fn persist(&self) -> Result<()> {
        self.store.save(SnapshotRef {
            catalog: &self.catalog,
            patrons: &self.patrons,
            loans: &self.loans,
        })?;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.revision += 1;
        if let Err(e) = self.persist() {
            warn!(revision = self.revision, error = %e, "state changed in memory but was not saved");
            return Err(e);
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
