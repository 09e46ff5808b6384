// 🔖 Loan Entity + Ledger
//
// A loan links one patron and one book with a due date. It stores the
// patron's matricola and the book's ISBN; the aggregate resolves them through
// the registries, so a loan always sees the live counters of the entities it
// references.
//
// - Business identity is the (matricola, isbn, due_date) triple
// - The ledger also stamps each recorded loan with a serial id, so a handle
//   returned at creation still finds its loan after an ISBN or matricola edit

use crate::error::{EntityKind, LibraryError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ============================================================================
// LOAN ENTITY
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loan {
    /// Ledger serial, `None` until recorded
    id: Option<u64>,
    matricola: String,
    isbn: String,
    due_date: NaiveDate,
}

impl Loan {
    pub fn new(matricola: impl Into<String>, isbn: impl Into<String>, due_date: NaiveDate) -> Self {
        Loan {
            id: None,
            matricola: matricola.into(),
            isbn: isbn.into(),
            due_date,
        }
    }

    /// Rebuild a recorded loan read back from storage
    pub(crate) fn restore(id: u64, matricola: String, isbn: String, due_date: NaiveDate) -> Self {
        Loan {
            id: Some(id),
            matricola,
            isbn,
            due_date,
        }
    }

    pub fn id(&self) -> Option<u64> {
        self.id
    }

    pub fn matricola(&self) -> &str {
        &self.matricola
    }

    pub fn isbn(&self) -> &str {
        &self.isbn
    }

    pub fn due_date(&self) -> NaiveDate {
        self.due_date
    }

    /// Late once `today` is strictly after the due date
    pub fn is_late(&self, today: NaiveDate) -> bool {
        today > self.due_date
    }

    /// Human-readable identity, used in error messages and logs
    pub fn key(&self) -> String {
        format!("{}/{}/{}", self.matricola, self.isbn, self.due_date)
    }

    fn same_triple(&self, other: &Loan) -> bool {
        self.matricola == other.matricola
            && self.isbn == other.isbn
            && self.due_date == other.due_date
    }
}

impl PartialEq for Loan {
    fn eq(&self, other: &Self) -> bool {
        self.same_triple(other)
    }
}

impl Eq for Loan {}

impl std::hash::Hash for Loan {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.matricola.hash(state);
        self.isbn.hash(state);
        self.due_date.hash(state);
    }
}

// ============================================================================
// LOAN LEDGER
// ============================================================================

/// Active loans in the order they were opened
///
/// Serialized as the ordered list only; the next serial is rebuilt on load.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(from = "LedgerRecord")]
pub struct LoanLedger {
    loans: Vec<Loan>,

    #[serde(skip)]
    next_id: u64,
}

#[derive(Deserialize)]
struct LedgerRecord {
    loans: Vec<Loan>,
}

impl From<LedgerRecord> for LoanLedger {
    fn from(record: LedgerRecord) -> Self {
        let next_id = record
            .loans
            .iter()
            .filter_map(|l| l.id)
            .max()
            .map_or(0, |max| max + 1);
        LoanLedger {
            loans: record.loans,
            next_id,
        }
    }
}

impl LoanLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_loans(loans: Vec<Loan>) -> Self {
        LoanLedger::from(LedgerRecord { loans })
    }

    /// Record a loan unless the exact triple is already there
    ///
    /// Returns the recorded loan, stamped with its serial id.
    pub fn add(&mut self, mut loan: Loan) -> Result<Loan> {
        if self.contains(&loan) {
            return Err(LibraryError::duplicate(EntityKind::Loan, loan.key()));
        }
        loan.id = Some(self.next_id);
        self.next_id += 1;
        self.loans.push(loan.clone());
        Ok(loan)
    }

    /// Remove a recorded loan
    ///
    /// A loan carrying a serial id is found by that id, even if its patron
    /// or book key changed since; otherwise the exact triple must match.
    /// Returns the loan as it was recorded.
    pub fn remove(&mut self, loan: &Loan) -> Result<Loan> {
        let position = match loan.id {
            Some(id) => self.loans.iter().position(|l| l.id == Some(id)),
            None => self.loans.iter().position(|l| l.same_triple(loan)),
        }
        .ok_or_else(|| LibraryError::not_found(EntityKind::Loan, loan.key()))?;
        Ok(self.loans.remove(position))
    }

    pub fn contains(&self, loan: &Loan) -> bool {
        self.loans.iter().any(|l| l.same_triple(loan))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Loan> {
        self.loans.iter()
    }

    pub fn for_patron<'a>(&'a self, matricola: &'a str) -> impl Iterator<Item = &'a Loan> + 'a {
        self.loans.iter().filter(move |l| l.matricola == matricola)
    }

    pub fn for_book<'a>(&'a self, isbn: &'a str) -> impl Iterator<Item = &'a Loan> + 'a {
        self.loans.iter().filter(move |l| l.isbn == isbn)
    }

    pub fn len(&self) -> usize {
        self.loans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loans.is_empty()
    }

    /// True when every recorded loan has its own serial
    pub(crate) fn has_unique_ids(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        self.loans
            .iter()
            .all(|l| matches!(l.id, Some(id) if seen.insert(id)))
    }

    /// Follow a book whose ISBN was edited
    pub(crate) fn rekey_book(&mut self, old_isbn: &str, new_isbn: &str) {
        for loan in self.loans.iter_mut().filter(|l| l.isbn == old_isbn) {
            loan.isbn = new_isbn.to_string();
        }
    }

    /// Follow a patron whose matricola was edited
    pub(crate) fn rekey_patron(&mut self, old_matricola: &str, new_matricola: &str) {
        for loan in self.loans.iter_mut().filter(|l| l.matricola == old_matricola) {
            loan.matricola = new_matricola.to_string();
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_loan_lateness() {
        let loan = Loan::new("0612701234", "9789510490044", date(2024, 3, 10));

        assert!(!loan.is_late(date(2024, 3, 9)));
        assert!(!loan.is_late(date(2024, 3, 10)));
        assert!(loan.is_late(date(2024, 3, 11)));
    }

    #[test]
    fn test_loan_identity_is_full_triple() {
        let a = Loan::new("0612701234", "9789510490044", date(2024, 3, 10));
        let b = Loan::new("0612701234", "9789510490044", date(2024, 3, 10));
        let later = Loan::new("0612701234", "9789510490044", date(2024, 4, 10));

        assert_eq!(a, b);
        assert_ne!(a, later);
        assert_eq!(a.key(), "0612701234/9789510490044/2024-03-10");
    }

    #[test]
    fn test_ledger_add_and_duplicates() {
        let mut ledger = LoanLedger::new();
        ledger.add(Loan::new("0612701234", "9789510490044", date(2024, 3, 10))).unwrap();
        ledger.add(Loan::new("0612701234", "9789510490044", date(2024, 4, 10))).unwrap();

        let err = ledger
            .add(Loan::new("0612701234", "9789510490044", date(2024, 3, 10)))
            .unwrap_err();
        assert!(matches!(err, LibraryError::Duplicate { kind: EntityKind::Loan, .. }));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_ledger_remove() {
        let mut ledger = LoanLedger::new();
        let loan = Loan::new("0612701234", "9789510490044", date(2024, 3, 10));
        ledger.add(loan.clone()).unwrap();

        let never_added = Loan::new("0612701234", "9789510490044", date(2025, 1, 1));
        let err = ledger.remove(&never_added).unwrap_err();
        assert!(matches!(err, LibraryError::NotFound { kind: EntityKind::Loan, .. }));
        assert_eq!(ledger.len(), 1);

        ledger.remove(&loan).unwrap();
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_ledger_rekey() {
        let mut ledger = LoanLedger::new();
        ledger.add(Loan::new("0612701234", "9789510490044", date(2024, 3, 10))).unwrap();
        ledger.add(Loan::new("0612706543", "9789510490044", date(2024, 3, 12))).unwrap();

        ledger.rekey_book("9789510490044", "9788845292613");
        ledger.rekey_patron("0612701234", "0612709999");

        assert_eq!(ledger.for_book("9788845292613").count(), 2);
        assert_eq!(ledger.for_patron("0612709999").count(), 1);
        assert_eq!(ledger.for_patron("0612701234").count(), 0);
    }

    #[test]
    fn test_ledger_stamps_serial_ids() {
        let mut ledger = LoanLedger::new();
        let first = ledger.add(Loan::new("0612701234", "9789510490044", date(2024, 3, 10))).unwrap();
        let second = ledger.add(Loan::new("0612701234", "9789510490044", date(2024, 4, 10))).unwrap();

        assert_eq!(first.id(), Some(0));
        assert_eq!(second.id(), Some(1));
        assert!(ledger.has_unique_ids());
        assert_eq!(Loan::new("0612701234", "9789510490044", date(2024, 3, 10)).id(), None);
    }

    #[test]
    fn test_recorded_handle_survives_rekey() {
        let mut ledger = LoanLedger::new();
        let handle = ledger.add(Loan::new("0612701234", "9789510490044", date(2024, 3, 10))).unwrap();

        ledger.rekey_patron("0612701234", "0612709999");
        ledger.rekey_book("9789510490044", "9788845292613");

        let removed = ledger.remove(&handle).unwrap();
        assert_eq!(removed.matricola(), "0612709999");
        assert_eq!(removed.isbn(), "9788845292613");
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_next_serial_rebuilt_after_decode() {
        let mut ledger = LoanLedger::new();
        ledger.add(Loan::new("0612701234", "9789510490044", date(2024, 3, 10))).unwrap();
        ledger.add(Loan::new("0612701234", "9789510490044", date(2024, 4, 10))).unwrap();

        let bytes = bincode::serialize(&ledger).unwrap();
        let mut decoded: LoanLedger = bincode::deserialize(&bytes).unwrap();

        let next = decoded.add(Loan::new("0612706543", "9789510490044", date(2024, 5, 10))).unwrap();
        assert_eq!(next.id(), Some(2));
    }
}
