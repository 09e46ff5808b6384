// 💾 Persistence Port - save and restore the whole library state
//
// The state is always the same three records, in the same order:
// Catalog, Patron Registry, Loan Ledger. Loans reference books and patrons
// by ISBN / matricola, so restoring the first two records is enough to
// resolve the third.
//
// Backends:
// - FileStore:   one binary file (bincode), replaced atomically on save
// - SqliteStore: one SQLite database (WAL), rewritten in a transaction
// - MemoryStore: in-process bytes, for tests

use crate::entities::{
    Author, Book, Catalog, Loan, LoanLedger, Patron, PatronRegistry, MAX_ACTIVE_LOANS,
};
use bincode::Options;
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, warn};

/// Upper bound for a single decoded record
const MAX_RECORD_BYTES: u64 = 64 * 1024 * 1024;

// ============================================================================
// STORE ERROR
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Corrupt state: {0}")]
    Corrupt(String),
}

// ============================================================================
// SNAPSHOT
// ============================================================================

/// Borrowed view of the three records, handed to `Store::save`
#[derive(Debug, Clone, Copy)]
pub struct SnapshotRef<'a> {
    pub catalog: &'a Catalog,
    pub patrons: &'a PatronRegistry,
    pub loans: &'a LoanLedger,
}

/// Owned state returned by `Store::load`
#[derive(Debug, Default)]
pub struct LibrarySnapshot {
    pub catalog: Catalog,
    pub patrons: PatronRegistry,
    pub loans: LoanLedger,
}

impl LibrarySnapshot {
    pub fn borrowed(&self) -> SnapshotRef<'_> {
        SnapshotRef {
            catalog: &self.catalog,
            patrons: &self.patrons,
            loans: &self.loans,
        }
    }

    /// Check the cross-entity invariants a restored state must satisfy
    ///
    /// Any failure means the data is incompatible and must not be used.
    pub fn check_consistency(&self) -> Result<(), String> {
        if !self.catalog.has_unique_isbns() {
            return Err("catalog holds the same ISBN twice".to_string());
        }
        if !self.patrons.has_unique_matricolas() {
            return Err("registry holds the same matricola twice".to_string());
        }
        if !self.loans.has_unique_ids() {
            return Err("ledger holds a loan without its own serial id".to_string());
        }

        let mut seen = HashSet::new();
        for loan in self.loans.iter() {
            if !seen.insert(loan) {
                return Err(format!("loan {} recorded twice", loan.key()));
            }
            if !self.catalog.contains(loan.isbn()) {
                return Err(format!("loan {} references an unknown book", loan.key()));
            }
            if !self.patrons.exists(loan.matricola()) {
                return Err(format!("loan {} references an unknown patron", loan.key()));
            }
        }

        for book in self.catalog.iter() {
            if book.available_copies() > book.total_copies() {
                return Err(format!("book {} has more available than total copies", book.isbn()));
            }
            let out = self.loans.for_book(book.isbn()).count();
            if out != book.copies_on_loan() as usize {
                return Err(format!(
                    "book {} has {} copies out but {} loans",
                    book.isbn(),
                    book.copies_on_loan(),
                    out
                ));
            }
        }

        for patron in self.patrons.iter() {
            if patron.active_loans() > MAX_ACTIVE_LOANS {
                return Err(format!("patron {} is over the loan cap", patron.matricola()));
            }
            let held = self.loans.for_patron(patron.matricola()).count();
            if held != patron.active_loans() as usize {
                return Err(format!(
                    "patron {} counts {} loans but holds {}",
                    patron.matricola(),
                    patron.active_loans(),
                    held
                ));
            }
        }

        Ok(())
    }
}

// ============================================================================
// STORE PORT
// ============================================================================

pub trait Store {
    /// Replace whatever was stored with this state
    fn save(&self, snapshot: SnapshotRef<'_>) -> Result<(), StoreError>;

    /// `Ok(None)` when nothing was ever saved
    fn load(&self) -> Result<Option<LibrarySnapshot>, StoreError>;
}

// ============================================================================
// BINARY RECORDS (bincode)
// ============================================================================

fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(MAX_RECORD_BYTES)
}

/// Write the three records in their fixed order
pub fn write_records<W: Write>(mut writer: W, snapshot: SnapshotRef<'_>) -> Result<(), StoreError> {
    codec().serialize_into(&mut writer, snapshot.catalog)?;
    codec().serialize_into(&mut writer, snapshot.patrons)?;
    codec().serialize_into(&mut writer, snapshot.loans)?;
    writer.flush()?;
    Ok(())
}

/// Read exactly three records back; trailing bytes are an error
pub fn read_records<R: Read>(mut reader: R) -> Result<LibrarySnapshot, StoreError> {
    let catalog: Catalog = codec().deserialize_from(&mut reader)?;
    let patrons: PatronRegistry = codec().deserialize_from(&mut reader)?;
    let loans: LoanLedger = codec().deserialize_from(&mut reader)?;

    let mut rest = [0u8; 1];
    if reader.read(&mut rest)? != 0 {
        return Err(StoreError::Corrupt("trailing data after loan ledger".to_string()));
    }

    Ok(LibrarySnapshot {
        catalog,
        patrons,
        loans,
    })
}

// ============================================================================
// FILE STORE
// ============================================================================

/// Single state file, overwritten wholesale on every save
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling file the new state is written to before the rename
    fn staging_path(&self) -> io::Result<PathBuf> {
        sibling(&self.path, ".tmp")
    }
}

/// `path` with `suffix` appended to its file name
fn sibling(path: &Path, suffix: &str) -> io::Result<PathBuf> {
    let name = path.file_name().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "state path has no file name")
    })?;
    let mut renamed = name.to_os_string();
    renamed.push(suffix);
    Ok(path.with_file_name(renamed))
}

impl Store for FileStore {
    fn save(&self, snapshot: SnapshotRef<'_>) -> Result<(), StoreError> {
        let staging = self.staging_path()?;

        let write = || -> Result<(), StoreError> {
            let mut writer = BufWriter::new(File::create(&staging)?);
            write_records(&mut writer, snapshot)?;
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
            fs::rename(&staging, &self.path)?;
            Ok(())
        };

        let result = write();
        if result.is_err() {
            let _ = fs::remove_file(&staging);
        }
        result?;

        debug!(path = %self.path.display(), "library state written");
        Ok(())
    }

    fn load(&self) -> Result<Option<LibrarySnapshot>, StoreError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        read_records(BufReader::new(file)).map(Some)
    }
}

// ============================================================================
// SQLITE STORE
// ============================================================================

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS books (
        position INTEGER NOT NULL,
        isbn TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        year INTEGER NOT NULL,
        total_copies INTEGER NOT NULL,
        available_copies INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS book_authors (
        isbn TEXT NOT NULL,
        position INTEGER NOT NULL,
        first_name TEXT NOT NULL,
        last_name TEXT NOT NULL,
        PRIMARY KEY (isbn, position)
    );
    CREATE TABLE IF NOT EXISTS patrons (
        position INTEGER NOT NULL,
        matricola TEXT PRIMARY KEY,
        first_name TEXT NOT NULL,
        last_name TEXT NOT NULL,
        email TEXT NOT NULL,
        active_loans INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS loans (
        position INTEGER NOT NULL,
        id INTEGER NOT NULL UNIQUE,
        matricola TEXT NOT NULL,
        isbn TEXT NOT NULL,
        due_date TEXT NOT NULL,
        PRIMARY KEY (matricola, isbn, due_date)
    );
    CREATE TABLE IF NOT EXISTS library_meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
";

/// Library state kept in SQLite tables
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        setup_database(&conn)?;
        Ok(SqliteStore { conn })
    }

    /// Open `path`, moving an unreadable database aside and starting fresh
    ///
    /// Only a file SQLite rejects as corrupt or not a database is replaced;
    /// it is kept as `<name>.corrupt` next to the target. Any other failure
    /// is returned unchanged.
    pub fn open_or_recover(path: &Path) -> Result<Self, StoreError> {
        match Self::open(path) {
            Err(StoreError::Database(e)) if is_unreadable(&e) && path.exists() => {
                let aside = sibling(path, ".corrupt")?;
                warn!(
                    path = %path.display(),
                    moved_to = %aside.display(),
                    error = %e,
                    "database unreadable, starting a new one"
                );
                fs::rename(path, &aside)?;
                for journal in ["-wal", "-shm"] {
                    let _ = fs::remove_file(sibling(path, journal)?);
                }
                Self::open(path)
            }
            other => other,
        }
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(SqliteStore { conn })
    }
}

fn is_unreadable(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::NotADatabase || e.code == ErrorCode::DatabaseCorrupt
    )
}

fn setup_database(conn: &Connection) -> rusqlite::Result<()> {
    // WAL keeps the previous state readable if a write is interrupted
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.execute_batch(SCHEMA)
}

impl Store for SqliteStore {
    fn save(&self, snapshot: SnapshotRef<'_>) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;

        tx.execute_batch(
            "DELETE FROM loans;
             DELETE FROM book_authors;
             DELETE FROM books;
             DELETE FROM patrons;",
        )?;

        {
            let mut insert_book = tx.prepare(
                "INSERT INTO books (position, isbn, title, year, total_copies, available_copies)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            let mut insert_author = tx.prepare(
                "INSERT INTO book_authors (isbn, position, first_name, last_name)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (position, book) in snapshot.catalog.iter().enumerate() {
                insert_book.execute(params![
                    position as i64,
                    book.isbn(),
                    book.title,
                    book.year,
                    book.total_copies(),
                    book.available_copies(),
                ])?;
                for (i, author) in book.authors.iter().enumerate() {
                    insert_author.execute(params![
                        book.isbn(),
                        i as i64,
                        author.first_name,
                        author.last_name,
                    ])?;
                }
            }

            let mut insert_patron = tx.prepare(
                "INSERT INTO patrons (position, matricola, first_name, last_name, email, active_loans)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (position, patron) in snapshot.patrons.iter().enumerate() {
                insert_patron.execute(params![
                    position as i64,
                    patron.matricola(),
                    patron.first_name,
                    patron.last_name,
                    patron.email,
                    patron.active_loans(),
                ])?;
            }

            let mut insert_loan = tx.prepare(
                "INSERT INTO loans (position, id, matricola, isbn, due_date)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (position, loan) in snapshot.loans.iter().enumerate() {
                insert_loan.execute(params![
                    position as i64,
                    loan.id().map(|id| id as i64),
                    loan.matricola(),
                    loan.isbn(),
                    loan.due_date().to_string(),
                ])?;
            }
        }

        tx.execute(
            "INSERT OR REPLACE INTO library_meta (key, value) VALUES ('saved_at', ?1)",
            params![Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;

        debug!(
            books = snapshot.catalog.len(),
            patrons = snapshot.patrons.len(),
            loans = snapshot.loans.len(),
            "library state written to sqlite"
        );
        Ok(())
    }

    fn load(&self) -> Result<Option<LibrarySnapshot>, StoreError> {
        let saved_at: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM library_meta WHERE key = 'saved_at'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        if saved_at.is_none() {
            return Ok(None);
        }

        let mut authors: HashMap<String, Vec<Author>> = HashMap::new();
        let mut stmt = self.conn.prepare(
            "SELECT isbn, first_name, last_name FROM book_authors ORDER BY isbn, position",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                Author::new(row.get::<_, String>(1)?, row.get::<_, String>(2)?),
            ))
        })?;
        for row in rows {
            let (isbn, author) = row?;
            authors.entry(isbn).or_default().push(author);
        }

        let mut stmt = self.conn.prepare(
            "SELECT isbn, title, year, total_copies, available_copies
             FROM books ORDER BY position",
        )?;
        let books = stmt
            .query_map([], |row| {
                let isbn: String = row.get(0)?;
                let book_authors = authors.remove(&isbn).unwrap_or_default();
                Ok(Book::restore(
                    row.get(1)?,
                    book_authors,
                    row.get(2)?,
                    isbn,
                    row.get(3)?,
                    row.get(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = self.conn.prepare(
            "SELECT first_name, last_name, matricola, email, active_loans
             FROM patrons ORDER BY position",
        )?;
        let patrons = stmt
            .query_map([], |row| {
                Ok(Patron::restore(
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = self
            .conn
            .prepare("SELECT id, matricola, isbn, due_date FROM loans ORDER BY position")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut loans = Vec::with_capacity(rows.len());
        for (id, matricola, isbn, due) in rows {
            let id = u64::try_from(id)
                .map_err(|_| StoreError::Corrupt(format!("bad loan id {}", id)))?;
            let due_date = NaiveDate::parse_from_str(&due, "%Y-%m-%d")
                .map_err(|e| StoreError::Corrupt(format!("bad due date {:?}: {}", due, e)))?;
            loans.push(Loan::restore(id, matricola, isbn, due_date));
        }

        Ok(Some(LibrarySnapshot {
            catalog: Catalog::from_books(books),
            patrons: PatronRegistry::from_patrons(patrons),
            loans: LoanLedger::from_loans(loans),
        }))
    }
}

// ============================================================================
// MEMORY STORE
// ============================================================================

#[derive(Debug, Default)]
struct MemoryState {
    bytes: Option<Vec<u8>>,
    fail_writes: bool,
    saves: usize,
}

/// Keeps the encoded records in memory
///
/// Clones share the same state, so a test can keep a handle after giving
/// the store to the aggregate.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Rc<RefCell<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following save fail with an IO error
    pub fn fail_writes(&self, fail: bool) {
        self.inner.borrow_mut().fail_writes = fail;
    }

    /// Number of successful saves
    pub fn save_count(&self) -> usize {
        self.inner.borrow().saves
    }

    /// Replace the stored bytes, e.g. with garbage
    pub fn put_raw(&self, bytes: Vec<u8>) {
        self.inner.borrow_mut().bytes = Some(bytes);
    }
}

impl Store for MemoryStore {
    fn save(&self, snapshot: SnapshotRef<'_>) -> Result<(), StoreError> {
        let mut state = self.inner.borrow_mut();
        if state.fail_writes {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::Other,
                "simulated write failure",
            )));
        }

        let mut bytes = Vec::new();
        write_records(&mut bytes, snapshot)?;
        state.bytes = Some(bytes);
        state.saves += 1;
        Ok(())
    }

    fn load(&self) -> Result<Option<LibrarySnapshot>, StoreError> {
        let state = self.inner.borrow();
        state
            .bytes
            .as_deref()
            .map(read_records)
            .transpose()
    }
}

// ============================================================================
// TESTS
// ============================================================================
