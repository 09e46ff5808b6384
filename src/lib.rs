// Lending Catalog - Core Library
// Exposes all modules for use in the CLI and tests

pub mod entities;   // Author, Book + Catalog, Patron + Registry, Loan + Ledger
pub mod error;      // Error kinds
pub mod validation; // Field rules for book / patron input
pub mod clock;      // Where "today" comes from
pub mod store;      // Persistence port: file, SQLite, memory
pub mod views;      // Read model for the presentation layer
pub mod library;    // The aggregate
pub mod config;     // TOML configuration
pub mod logging;    // tracing subscriber setup

// Re-export commonly used types
pub use entities::{
    Author,
    Book, Catalog,
    Patron, PatronRegistry, MAX_ACTIVE_LOANS,
    Loan, LoanLedger,
};
pub use error::{EntityKind, LibraryError, Result};
pub use validation::{Context, FieldValidator, ValidationError, ValidationResult};
pub use clock::{Clock, FixedClock, SystemClock};
pub use store::{
    FileStore, LibrarySnapshot, MemoryStore, SnapshotRef, SqliteStore, Store, StoreError,
};
pub use views::{LoanRow, SearchFilter, ViewState};
pub use library::Library;
pub use config::{LibraryConfig, LoggingConfig, StorageBackend, StorageConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
