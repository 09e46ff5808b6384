// 📚 Book Entity + Catalog
//
// "ISBN is IDENTITY, everything else is a VALUE"
//
// - Title, authors, year and copy counts can change through edits and loans
// - Two books are the same book when their ISBNs match
// - The Catalog keeps an ISBN → position index next to the insertion-ordered
//   list, so uniqueness never depends on generic equality

use crate::entities::Author;
use crate::error::{EntityKind, LibraryError, Result};
use crate::validation::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// BOOK ENTITY
// ============================================================================

/// Catalog entry
///
/// Invariant: `0 <= available_copies <= total_copies`. The counters and the
/// ISBN are private so they only move through the catalog and loan paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    // ========================================================================
    // VALUES (editable)
    // ========================================================================
    pub title: String,
    pub authors: Vec<Author>,
    pub year: i32,

    // ========================================================================
    // IDENTITY + COUNTERS
    // ========================================================================
    isbn: String,
    total_copies: u32,
    available_copies: u32,
}

impl Book {
    /// Create a new entry with every copy on the shelf
    pub fn new(
        title: impl Into<String>,
        authors: Vec<Author>,
        year: i32,
        isbn: impl Into<String>,
        total_copies: u32,
    ) -> Self {
        Book {
            title: title.into(),
            authors,
            year,
            isbn: isbn.into(),
            total_copies,
            available_copies: total_copies,
        }
    }

    /// Rebuild an entry read back from storage
    pub(crate) fn restore(
        title: String,
        authors: Vec<Author>,
        year: i32,
        isbn: String,
        total_copies: u32,
        available_copies: u32,
    ) -> Self {
        Book {
            title,
            authors,
            year,
            isbn,
            total_copies,
            available_copies,
        }
    }

    pub fn isbn(&self) -> &str {
        &self.isbn
    }

    pub fn total_copies(&self) -> u32 {
        self.total_copies
    }

    pub fn available_copies(&self) -> u32 {
        self.available_copies
    }

    /// Copies currently out with patrons
    pub fn copies_on_loan(&self) -> u32 {
        self.total_copies.saturating_sub(self.available_copies)
    }

    /// At least one copy is out
    pub fn is_on_loan(&self) -> bool {
        self.available_copies < self.total_copies
    }

    /// At least one copy can be lent
    pub fn is_available(&self) -> bool {
        self.available_copies > 0
    }

    /// Author names joined for display and search
    pub fn authors_label(&self) -> String {
        self.authors
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Add an author, rejecting one already listed
    pub fn add_author(&mut self, author: Author) -> Result<()> {
        if self.authors.contains(&author) {
            return Err(LibraryError::duplicate(EntityKind::Author, author.to_string()));
        }
        self.authors.push(author);
        Ok(())
    }

    /// Remove a listed author
    pub fn remove_author(&mut self, author: &Author) -> Result<()> {
        let position = self
            .authors
            .iter()
            .position(|a| a == author)
            .ok_or_else(|| LibraryError::not_found(EntityKind::Author, author.to_string()))?;
        self.authors.remove(position);
        Ok(())
    }

    /// Take one copy off the shelf
    pub(crate) fn check_out(&mut self) -> Result<()> {
        if self.available_copies == 0 {
            return Err(LibraryError::Capacity {
                isbn: self.isbn.clone(),
            });
        }
        self.available_copies -= 1;
        Ok(())
    }

    /// Put one copy back; never exceeds the total
    pub(crate) fn check_in(&mut self) {
        if self.available_copies < self.total_copies {
            self.available_copies += 1;
        }
    }
}

impl PartialEq for Book {
    fn eq(&self, other: &Self) -> bool {
        self.isbn == other.isbn
    }
}

impl Eq for Book {}

impl std::hash::Hash for Book {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.isbn.hash(state);
    }
}

impl std::fmt::Display for Book {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (Authors: [{}]) [ISBN: {}]",
            self.title,
            self.authors_label(),
            self.isbn
        )
    }
}

// ============================================================================
// CATALOG
// ============================================================================

/// All catalog entries, unique by ISBN, in insertion order
///
/// Serialized as the ordered list only; the index is rebuilt on load.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(from = "CatalogRecord")]
pub struct Catalog {
    books: Vec<Book>,

    #[serde(skip)]
    index: HashMap<String, usize>,
}

#[derive(Deserialize)]
struct CatalogRecord {
    books: Vec<Book>,
}

impl From<CatalogRecord> for Catalog {
    fn from(record: CatalogRecord) -> Self {
        let mut catalog = Catalog {
            books: record.books,
            index: HashMap::new(),
        };
        catalog.reindex();
        catalog
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from stored entries, keeping their order
    pub(crate) fn from_books(books: Vec<Book>) -> Self {
        Catalog::from(CatalogRecord { books })
    }

    /// Append a book unless its ISBN is already catalogued
    pub fn add(&mut self, book: Book) -> Result<()> {
        if self.contains(&book.isbn) {
            return Err(LibraryError::duplicate(EntityKind::Book, book.isbn.clone()));
        }
        self.index.insert(book.isbn.clone(), self.books.len());
        self.books.push(book);
        Ok(())
    }

    /// Remove a book that has no copies out
    pub fn remove(&mut self, isbn: &str) -> Result<Book> {
        let position = self.position(isbn)?;
        if self.books[position].is_on_loan() {
            return Err(LibraryError::in_use(EntityKind::Book, isbn));
        }
        let book = self.books.remove(position);
        self.reindex();
        Ok(book)
    }

    /// Overwrite the editable fields and the ISBN of an existing entry
    ///
    /// Copies already on loan stay on loan: the available count becomes
    /// `total_copies - copies_on_loan`, and a total below the copies on loan
    /// is rejected. Nothing changes when an error is returned.
    pub fn edit(
        &mut self,
        isbn: &str,
        title: &str,
        authors: Vec<Author>,
        year: i32,
        new_isbn: &str,
        total_copies: u32,
    ) -> Result<()> {
        let position = self.position(isbn)?;

        if new_isbn != isbn && self.contains(new_isbn) {
            return Err(LibraryError::duplicate(EntityKind::Book, new_isbn));
        }

        let on_loan = self.books[position].copies_on_loan();
        if total_copies < on_loan {
            return Err(LibraryError::invalid_field(
                Context::Book,
                "total_copies",
                format!(
                    "{} total copies is fewer than the {} on loan",
                    total_copies, on_loan
                ),
            ));
        }

        let book = &mut self.books[position];
        book.title = title.to_string();
        book.authors = authors;
        book.year = year;
        book.total_copies = total_copies;
        book.available_copies = total_copies - on_loan;

        if new_isbn != isbn {
            book.isbn = new_isbn.to_string();
            self.index.remove(isbn);
            self.index.insert(new_isbn.to_string(), position);
        }

        Ok(())
    }

    /// Membership by ISBN
    pub fn contains(&self, isbn: &str) -> bool {
        self.index.contains_key(isbn)
    }

    pub fn get(&self, isbn: &str) -> Option<&Book> {
        self.index.get(isbn).map(|&i| &self.books[i])
    }

    pub(crate) fn get_mut(&mut self, isbn: &str) -> Option<&mut Book> {
        match self.index.get(isbn) {
            Some(&i) => Some(&mut self.books[i]),
            None => None,
        }
    }

    /// Books in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Book> {
        self.books.iter()
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    /// True when no two entries share an ISBN
    pub(crate) fn has_unique_isbns(&self) -> bool {
        self.index.len() == self.books.len()
    }

    fn position(&self, isbn: &str) -> Result<usize> {
        self.index
            .get(isbn)
            .copied()
            .ok_or_else(|| LibraryError::not_found(EntityKind::Book, isbn))
    }

    fn reindex(&mut self) {
        self.index = self
            .books
            .iter()
            .enumerate()
            .map(|(i, b)| (b.isbn.clone(), i))
            .collect();
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn rose() -> Book {
        Book::new("Il Nome della Rosa", vec![], 1980, "9789510490044", 5)
    }

    fn other(isbn: &str) -> Book {
        Book::new("Titolo1", vec![Author::new("Mario", "Rossi")], 2001, isbn, 2)
    }

    #[test]
    fn test_book_creation_fills_shelf() {
        let book = rose();

        assert_eq!(book.isbn(), "9789510490044");
        assert_eq!(book.total_copies(), 5);
        assert_eq!(book.available_copies(), 5);
        assert!(!book.is_on_loan());
        assert!(book.is_available());
    }

    #[test]
    fn test_book_equality_by_isbn() {
        let a = rose();
        let mut b = Book::new("Another title", vec![], 1999, "9789510490044", 1);
        b.year = 2000;

        assert_eq!(a, b);
        assert_ne!(a, other("1111111111111"));
    }

    #[test]
    fn test_book_check_out_and_in() {
        let mut book = Book::new("Unica", vec![], 2020, "2222222222222", 1);

        book.check_out().unwrap();
        assert!(book.is_on_loan());
        assert!(!book.is_available());

        let err = book.check_out().unwrap_err();
        assert!(matches!(err, LibraryError::Capacity { .. }));

        book.check_in();
        book.check_in(); // already full, stays at total
        assert_eq!(book.available_copies(), 1);
    }

    #[test]
    fn test_book_authors() {
        let mut book = rose();
        let eco = Author::new("Umberto", "Eco");

        book.add_author(eco.clone()).unwrap();
        let err = book.add_author(eco.clone()).unwrap_err();
        assert!(matches!(err, LibraryError::Duplicate { kind: EntityKind::Author, .. }));

        book.add_author(Author::new("Italo", "Calvino")).unwrap();
        assert_eq!(book.authors_label(), "Umberto Eco, Italo Calvino");

        book.remove_author(&eco).unwrap();
        let err = book.remove_author(&eco).unwrap_err();
        assert!(matches!(err, LibraryError::NotFound { kind: EntityKind::Author, .. }));
        assert_eq!(book.authors.len(), 1);
    }

    #[test]
    fn test_book_display() {
        let book = other("1111111111111");
        assert_eq!(
            book.to_string(),
            "Titolo1 (Authors: [Mario Rossi]) [ISBN: 1111111111111]"
        );
    }

    #[test]
    fn test_catalog_add_rejects_duplicate_isbn() {
        let mut catalog = Catalog::new();
        catalog.add(rose()).unwrap();

        let twin = Book::new("Different title", vec![], 1990, "9789510490044", 3);
        let err = catalog.add(twin).unwrap_err();

        assert!(matches!(err, LibraryError::Duplicate { kind: EntityKind::Book, .. }));
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("9789510490044").unwrap().title, "Il Nome della Rosa");
    }

    #[test]
    fn test_catalog_remove() {
        let mut catalog = Catalog::new();
        catalog.add(rose()).unwrap();
        catalog.add(other("1111111111111")).unwrap();

        let removed = catalog.remove("9789510490044").unwrap();
        assert_eq!(removed.isbn(), "9789510490044");
        assert_eq!(catalog.len(), 1);

        // Index still points at the right entry after the shift
        assert_eq!(catalog.get("1111111111111").unwrap().title, "Titolo1");

        let err = catalog.remove("9789510490044").unwrap_err();
        assert!(matches!(err, LibraryError::NotFound { .. }));
    }

    #[test]
    fn test_catalog_remove_refuses_book_on_loan() {
        let mut catalog = Catalog::new();
        catalog.add(rose()).unwrap();
        catalog.get_mut("9789510490044").unwrap().check_out().unwrap();

        let err = catalog.remove("9789510490044").unwrap_err();
        assert!(matches!(err, LibraryError::ReferentialIntegrity { kind: EntityKind::Book, .. }));
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_catalog_edit_overwrites_in_place() {
        let mut catalog = Catalog::new();
        catalog.add(rose()).unwrap();
        catalog.add(other("1111111111111")).unwrap();

        catalog
            .edit(
                "9789510490044",
                "Il Pendolo di Foucault",
                vec![Author::new("Umberto", "Eco")],
                1988,
                "9788845292613",
                7,
            )
            .unwrap();

        assert!(!catalog.contains("9789510490044"));
        let book = catalog.get("9788845292613").unwrap();
        assert_eq!(book.title, "Il Pendolo di Foucault");
        assert_eq!(book.year, 1988);
        assert_eq!(book.total_copies(), 7);
        assert_eq!(book.available_copies(), 7);

        // Position is kept
        let order: Vec<&str> = catalog.iter().map(|b| b.isbn()).collect();
        assert_eq!(order, vec!["9788845292613", "1111111111111"]);
    }

    #[test]
    fn test_catalog_edit_keeps_copies_on_loan() {
        let mut catalog = Catalog::new();
        catalog.add(rose()).unwrap();
        {
            let book = catalog.get_mut("9789510490044").unwrap();
            book.check_out().unwrap();
            book.check_out().unwrap();
        }

        catalog
            .edit("9789510490044", "Il Nome della Rosa", vec![], 1980, "9789510490044", 3)
            .unwrap();
        let book = catalog.get("9789510490044").unwrap();
        assert_eq!(book.total_copies(), 3);
        assert_eq!(book.available_copies(), 1);

        let err = catalog
            .edit("9789510490044", "Il Nome della Rosa", vec![], 1980, "9789510490044", 1)
            .unwrap_err();
        match err {
            LibraryError::Validation(fields) => {
                assert_eq!(fields.len(), 1);
                assert_eq!(fields[0].field, "total_copies");
                assert_eq!(fields[0].context, Context::Book.name());
            }
            other => panic!("expected a validation error, got {:?}", other),
        }
        assert_eq!(catalog.get("9789510490044").unwrap().total_copies(), 3);
    }

    #[test]
    fn test_catalog_edit_errors() {
        let mut catalog = Catalog::new();
        catalog.add(rose()).unwrap();
        catalog.add(other("1111111111111")).unwrap();

        let err = catalog
            .edit("0000000000000", "X", vec![], 2000, "0000000000000", 1)
            .unwrap_err();
        assert!(matches!(err, LibraryError::NotFound { .. }));

        let err = catalog
            .edit("9789510490044", "X", vec![], 2000, "1111111111111", 1)
            .unwrap_err();
        assert!(matches!(err, LibraryError::Duplicate { .. }));
        assert_eq!(catalog.get("9789510490044").unwrap().title, "Il Nome della Rosa");
    }

    #[test]
    fn test_catalog_index_rebuilt_after_decode() {
        let mut catalog = Catalog::new();
        catalog.add(rose()).unwrap();
        catalog.add(other("1111111111111")).unwrap();

        let bytes = bincode::serialize(&catalog).unwrap();
        let decoded: Catalog = bincode::deserialize(&bytes).unwrap();

        assert_eq!(decoded.len(), 2);
        assert!(decoded.contains("9789510490044"));
        assert_eq!(decoded.get("1111111111111").unwrap().title, "Titolo1");
        assert!(decoded.has_unique_isbns());
    }
}
