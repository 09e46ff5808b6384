// ❗ Error Kinds - one variant per way a catalog operation can fail
//
// Messages are rendering only: callers match on the variant and read the
// offending identifier from its fields.

use crate::store::StoreError;
use crate::validation::{field_error, Context, ValidationError};
use thiserror::Error;

// ============================================================================
// ENTITY KIND
// ============================================================================

/// Which collection a duplicate / missing / in-use error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Author,
    Book,
    Patron,
    Loan,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Author => "Author",
            EntityKind::Book => "Book",
            EntityKind::Patron => "Patron",
            EntityKind::Loan => "Loan",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// LIBRARY ERROR
// ============================================================================

#[derive(Debug, Error)]
pub enum LibraryError {
    /// A book or patron field failed a format or range rule
    #[error("Invalid fields: {}", render_fields(.0))]
    Validation(Vec<ValidationError>),

    /// ISBN, matricola or loan triple already present
    #[error("{kind} already present: {key}")]
    Duplicate { kind: EntityKind, key: String },

    /// Delete attempted on a book still on loan or a patron with active loans
    #[error("Cannot remove {kind} {key}: {}", in_use_reason(.kind))]
    ReferentialIntegrity { kind: EntityKind, key: String },

    /// Edit/remove/return targets something absent from its collection
    #[error("{kind} not found: {key}")]
    NotFound { kind: EntityKind, key: String },

    /// Loan requested against a book with zero available copies
    #[error("No copies available for book {isbn}")]
    Capacity { isbn: String },

    /// Loan requested for a patron already at the active-loan cap
    #[error("Patron {matricola} already holds {limit} active loans")]
    LimitExceeded { matricola: String, limit: u32 },

    /// The state file could not be written or read
    #[error("Failed to save library data: {0}")]
    Persistence(#[from] StoreError),
}

impl LibraryError {
    pub fn duplicate(kind: EntityKind, key: impl Into<String>) -> Self {
        LibraryError::Duplicate {
            kind,
            key: key.into(),
        }
    }

    pub fn not_found(kind: EntityKind, key: impl Into<String>) -> Self {
        LibraryError::NotFound {
            kind,
            key: key.into(),
        }
    }

    pub fn in_use(kind: EntityKind, key: impl Into<String>) -> Self {
        LibraryError::ReferentialIntegrity {
            kind,
            key: key.into(),
        }
    }

    /// Single-field validation failure
    pub fn invalid_field(context: Context, field: &str, message: impl Into<String>) -> Self {
        LibraryError::Validation(vec![field_error(context, field, message)])
    }
}

fn render_fields(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

fn in_use_reason(kind: &EntityKind) -> &'static str {
    match kind {
        EntityKind::Book => "book on loan",
        EntityKind::Patron => "patron has active loans",
        _ => "still referenced",
    }
}

pub type Result<T> = std::result::Result<T, LibraryError>;
