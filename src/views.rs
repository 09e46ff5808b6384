// 🔎 Read Views - what the presentation layer lists
//
// Views are never stored. Each call walks the registries in insertion order
// and applies the active filter, so every add/edit/remove is visible on the
// next read without a refresh step.

use crate::entities::{Book, Loan, Patron};
use chrono::NaiveDate;

// ============================================================================
// SEARCH FILTER
// ============================================================================

/// Case-insensitive substring predicate; no query matches everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    query: Option<String>,
}

impl SearchFilter {
    pub fn new(query: Option<&str>) -> Self {
        let query = query
            .filter(|q| !q.is_empty())
            .map(|q| q.to_lowercase());
        SearchFilter { query }
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.query.is_some()
    }

    fn hit(&self, haystacks: &[&str]) -> bool {
        match &self.query {
            None => true,
            Some(q) => haystacks.iter().any(|h| h.to_lowercase().contains(q.as_str())),
        }
    }

    /// Title, author names or ISBN
    pub fn matches_book(&self, book: &Book) -> bool {
        let authors = book.authors_label();
        self.hit(&[&book.title, &authors, book.isbn()])
    }

    /// Surname or matricola
    pub fn matches_patron(&self, patron: &Patron) -> bool {
        self.hit(&[&patron.last_name, patron.matricola()])
    }
}

/// Filter predicates currently applied to the book and patron views
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    pub books: SearchFilter,
    pub patrons: SearchFilter,
}

// ============================================================================
// LOAN ROW
// ============================================================================

/// A loan resolved against the live book and patron it references
#[derive(Debug, Clone, Copy)]
pub struct LoanRow<'a> {
    pub loan: &'a Loan,
    pub patron: &'a Patron,
    pub book: &'a Book,
    pub late: bool,
}

impl<'a> LoanRow<'a> {
    pub fn new(loan: &'a Loan, patron: &'a Patron, book: &'a Book, today: NaiveDate) -> Self {
        LoanRow {
            loan,
            patron,
            book,
            late: loan.is_late(today),
        }
    }
}

impl std::fmt::Display for LoanRow<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Loan: {} to {}. --- Due: {} (Late: {})",
            self.book.title,
            self.patron.full_name(),
            self.loan.due_date(),
            if self.late { "YES" } else { "NO" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Author;

    fn rose() -> Book {
        Book::new(
            "Il Nome della Rosa",
            vec![Author::new("Umberto", "Eco")],
            1980,
            "9789510490044",
            5,
        )
    }

    fn bianchi() -> Patron {
        Patron::new("Antonio", "Bianchi", "0612701234", "a.bianchi2@studenti.unisa.it")
    }

    #[test]
    fn test_empty_query_matches_everything() {
        assert!(!SearchFilter::new(None).is_active());
        assert!(!SearchFilter::new(Some("")).is_active());
        assert!(SearchFilter::new(Some("")).matches_book(&rose()));
    }

    #[test]
    fn test_book_filter_fields() {
        let book = rose();

        assert!(SearchFilter::new(Some("ROSA")).matches_book(&book));
        assert!(SearchFilter::new(Some("eco")).matches_book(&book));
        assert!(SearchFilter::new(Some("951049")).matches_book(&book));
        assert!(!SearchFilter::new(Some("calvino")).matches_book(&book));
    }

    #[test]
    fn test_patron_filter_fields() {
        let patron = bianchi();

        assert!(SearchFilter::new(Some("bian")).matches_patron(&patron));
        assert!(SearchFilter::new(Some("06127")).matches_patron(&patron));
        // First name and email are not searched
        assert!(!SearchFilter::new(Some("antonio")).matches_patron(&patron));
        assert!(!SearchFilter::new(Some("studenti")).matches_patron(&patron));
    }

    #[test]
    fn test_loan_row_display() {
        let book = rose();
        let patron = bianchi();
        let due = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let loan = Loan::new(patron.matricola(), book.isbn(), due);

        let on_time = LoanRow::new(&loan, &patron, &book, due);
        assert_eq!(
            on_time.to_string(),
            "Loan: Il Nome della Rosa to Antonio Bianchi. --- Due: 2024-03-10 (Late: NO)"
        );

        let late = LoanRow::new(&loan, &patron, &book, due.succ_opt().unwrap());
        assert!(late.to_string().ends_with("(Late: YES)"));
    }
}
