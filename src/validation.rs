// 📐 Field Validation - format and range rules for book and patron input
//
// Every failing field is reported, not just the first one. The aggregate
// turns a non-empty list into LibraryError::Validation.

use crate::entities::Author;
use regex::Regex;

// ============================================================================
// CONTEXT TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Context {
    /// Catalog entry form
    Book,
    /// Patron registration form
    Patron,
    /// Loan request
    Loan,
}

impl Context {
    pub fn name(&self) -> &str {
        match self {
            Context::Book => "Book",
            Context::Patron => "Patron",
            Context::Loan => "Loan",
        }
    }
}

// ============================================================================
// VALIDATION RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
    pub context: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.context, self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), Vec<ValidationError>>;

// ============================================================================
// PATTERNS
// ============================================================================

const ISBN_PATTERN: &str = r"^[0-9]{13}$";
const MATRICOLA_PATTERN: &str = r"^[0-9]{10}$";
const TITLE_PATTERN: &str = r#"^[\p{L}\p{N}'":\-.,?! ]+$"#;
const NAME_PATTERN: &str = r"^[\p{L}' ]+$";
const EMAIL_PATTERN: &str = r"^[A-Za-z]\.[\p{L}']+[0-9]+@studenti\.unisa\.it$";

// ============================================================================
// FIELD VALIDATOR
// ============================================================================

pub struct FieldValidator {
    isbn: Regex,
    matricola: Regex,
    title: Regex,
    name: Regex,
    email: Regex,
}

impl FieldValidator {
    pub fn new() -> Self {
        FieldValidator {
            isbn: Regex::new(ISBN_PATTERN).expect("ISBN pattern compiles"),
            matricola: Regex::new(MATRICOLA_PATTERN).expect("matricola pattern compiles"),
            title: Regex::new(TITLE_PATTERN).expect("title pattern compiles"),
            name: Regex::new(NAME_PATTERN).expect("name pattern compiles"),
            email: Regex::new(EMAIL_PATTERN).expect("email pattern compiles"),
        }
    }

    /// Validate catalog entry fields
    ///
    /// `available_copies` only takes part in the `total >= available` check.
    /// Author names are trimmed before matching, the title too.
    pub fn validate_book(
        &self,
        title: &str,
        authors: &[Author],
        year: i32,
        isbn: &str,
        total_copies: u32,
        available_copies: u32,
    ) -> ValidationResult {
        let mut errors = Vec::new();
        let context = Context::Book;

        if !self.isbn.is_match(isbn) {
            errors.push(field_error(context, "isbn", "must be exactly 13 digits"));
        }

        if total_copies < available_copies {
            errors.push(field_error(
                context,
                "total_copies",
                format!(
                    "{} total copies is fewer than {} available",
                    total_copies, available_copies
                ),
            ));
        }

        if year <= 0 {
            errors.push(field_error(
                context,
                "year",
                format!("must be positive, got {}", year),
            ));
        }

        if !self.title.is_match(title.trim()) {
            errors.push(field_error(
                context,
                "title",
                "must be non-empty and use letters, digits, spaces or ' \" : - . , ? !",
            ));
        }

        for (i, author) in authors.iter().enumerate() {
            if !self.name.is_match(author.first_name.trim()) {
                errors.push(field_error(
                    context,
                    &format!("authors[{}].first_name", i),
                    "must use letters, apostrophes or spaces",
                ));
            }
            if !self.name.is_match(author.last_name.trim()) {
                errors.push(field_error(
                    context,
                    &format!("authors[{}].last_name", i),
                    "must use letters, apostrophes or spaces",
                ));
            }
            if authors[..i].contains(author) {
                errors.push(field_error(
                    context,
                    &format!("authors[{}]", i),
                    format!("{} is listed twice", author),
                ));
            }
        }

        finish(errors)
    }

    /// Validate patron registration fields
    pub fn validate_patron(
        &self,
        first_name: &str,
        last_name: &str,
        matricola: &str,
        email: &str,
        active_loans: i32,
    ) -> ValidationResult {
        let mut errors = Vec::new();
        let context = Context::Patron;

        if !self.name.is_match(first_name) {
            errors.push(field_error(
                context,
                "first_name",
                "must use letters, apostrophes or spaces",
            ));
        }

        if !self.name.is_match(last_name) {
            errors.push(field_error(
                context,
                "last_name",
                "must use letters, apostrophes or spaces",
            ));
        }

        if !self.matricola.is_match(matricola) {
            errors.push(field_error(context, "matricola", "must be exactly 10 digits"));
        }

        if !self.email.is_match(email) {
            errors.push(field_error(
                context,
                "email",
                "must look like x.surname1@studenti.unisa.it",
            ));
        }

        if active_loans < 0 {
            errors.push(field_error(
                context,
                "active_loans",
                format!("cannot be negative, got {}", active_loans),
            ));
        }

        finish(errors)
    }
}

impl Default for FieldValidator {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn field_error(context: Context, field: &str, message: impl Into<String>) -> ValidationError {
    ValidationError {
        field: field.to_string(),
        message: message.into(),
        context: context.name().to_string(),
    }
}

fn finish(errors: Vec<ValidationError>) -> ValidationResult {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

// ============================================================================
// TESTS
// ============================================================================
