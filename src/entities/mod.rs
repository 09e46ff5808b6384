// Entity Models
//
// Each entity has:
// - A business key that identifies it (ISBN, matricola, loan triple)
// - Mutable values around that key
// - A registry owning the collection and enforcing uniqueness/deletion rules

pub mod author;
pub mod book;
pub mod patron;
pub mod loan;

pub use author::Author;
pub use book::{Book, Catalog};
pub use patron::{Patron, PatronRegistry, MAX_ACTIVE_LOANS};
pub use loan::{Loan, LoanLedger};
