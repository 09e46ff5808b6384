// 🎓 Patron Entity + Registry
//
// "Matricola is IDENTITY, name and email are VALUES"
//
// - A patron may hold at most MAX_ACTIVE_LOANS loans at once
// - A patron with active loans cannot be deleted

use crate::error::{EntityKind, LibraryError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Loan cap per patron
pub const MAX_ACTIVE_LOANS: u32 = 3;

// ============================================================================
// PATRON ENTITY
// ============================================================================

/// Registered borrower
///
/// Invariant: `0 <= active_loans <= MAX_ACTIVE_LOANS`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patron {
    pub first_name: String,
    pub last_name: String,
    pub email: String,

    /// Institutional id (10 digits)
    matricola: String,

    /// Loans currently held
    active_loans: u32,
}

impl Patron {
    /// Create a patron with no loans
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        matricola: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Patron {
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: email.into(),
            matricola: matricola.into(),
            active_loans: 0,
        }
    }

    /// Rebuild a patron read back from storage
    pub(crate) fn restore(
        first_name: String,
        last_name: String,
        matricola: String,
        email: String,
        active_loans: u32,
    ) -> Self {
        Patron {
            first_name,
            last_name,
            email,
            matricola,
            active_loans,
        }
    }

    pub fn matricola(&self) -> &str {
        &self.matricola
    }

    pub fn active_loans(&self) -> u32 {
        self.active_loans
    }

    /// Already holding the maximum number of loans
    pub fn at_loan_limit(&self) -> bool {
        self.active_loans >= MAX_ACTIVE_LOANS
    }

    pub fn has_active_loans(&self) -> bool {
        self.active_loans > 0
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub(crate) fn open_loan(&mut self) -> Result<()> {
        if self.at_loan_limit() {
            return Err(LibraryError::LimitExceeded {
                matricola: self.matricola.clone(),
                limit: MAX_ACTIVE_LOANS,
            });
        }
        self.active_loans += 1;
        Ok(())
    }

    pub(crate) fn close_loan(&mut self) {
        self.active_loans = self.active_loans.saturating_sub(1);
    }
}

impl PartialEq for Patron {
    fn eq(&self, other: &Self) -> bool {
        self.matricola == other.matricola
    }
}

impl Eq for Patron {}

impl std::hash::Hash for Patron {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.matricola.hash(state);
    }
}

impl std::fmt::Display for Patron {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} (Matr: {}, Email: {}) - Active loans: {}",
            self.first_name, self.last_name, self.matricola, self.email, self.active_loans
        )
    }
}

// ============================================================================
// PATRON REGISTRY
// ============================================================================

/// All registered patrons, unique by matricola, in insertion order
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(from = "RegistryRecord")]
pub struct PatronRegistry {
    patrons: Vec<Patron>,

    #[serde(skip)]
    index: HashMap<String, usize>,
}

#[derive(Deserialize)]
struct RegistryRecord {
    patrons: Vec<Patron>,
}

impl From<RegistryRecord> for PatronRegistry {
    fn from(record: RegistryRecord) -> Self {
        let mut registry = PatronRegistry {
            patrons: record.patrons,
            index: HashMap::new(),
        };
        registry.reindex();
        registry
    }
}

impl PatronRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_patrons(patrons: Vec<Patron>) -> Self {
        PatronRegistry::from(RegistryRecord { patrons })
    }

    pub fn add(&mut self, patron: Patron) -> Result<()> {
        if self.exists(&patron.matricola) {
            return Err(LibraryError::duplicate(
                EntityKind::Patron,
                patron.matricola.clone(),
            ));
        }
        self.index.insert(patron.matricola.clone(), self.patrons.len());
        self.patrons.push(patron);
        Ok(())
    }

    /// Remove a patron holding no loans
    pub fn remove(&mut self, matricola: &str) -> Result<Patron> {
        let position = self.position(matricola)?;
        if self.patrons[position].has_active_loans() {
            return Err(LibraryError::in_use(EntityKind::Patron, matricola));
        }
        let patron = self.patrons.remove(position);
        self.reindex();
        Ok(patron)
    }

    /// Overwrite name, matricola and email in place
    pub fn edit(
        &mut self,
        matricola: &str,
        first_name: &str,
        last_name: &str,
        new_matricola: &str,
        email: &str,
    ) -> Result<()> {
        let position = self.position(matricola)?;

        if new_matricola != matricola && self.exists(new_matricola) {
            return Err(LibraryError::duplicate(EntityKind::Patron, new_matricola));
        }

        let patron = &mut self.patrons[position];
        patron.first_name = first_name.to_string();
        patron.last_name = last_name.to_string();
        patron.email = email.to_string();

        if new_matricola != matricola {
            patron.matricola = new_matricola.to_string();
            self.index.remove(matricola);
            self.index.insert(new_matricola.to_string(), position);
        }

        Ok(())
    }

    /// Membership by matricola
    pub fn exists(&self, matricola: &str) -> bool {
        self.index.contains_key(matricola)
    }

    pub fn get(&self, matricola: &str) -> Option<&Patron> {
        self.index.get(matricola).map(|&i| &self.patrons[i])
    }

    pub(crate) fn get_mut(&mut self, matricola: &str) -> Option<&mut Patron> {
        match self.index.get(matricola) {
            Some(&i) => Some(&mut self.patrons[i]),
            None => None,
        }
    }

    /// Same as `get`, named after the lookup the front desk does
    pub fn find_by_matricola(&self, matricola: &str) -> Option<&Patron> {
        self.get(matricola)
    }

    /// Patrons whose surname matches, ignoring case
    pub fn find_by_surname(&self, surname: &str) -> Vec<&Patron> {
        let wanted = surname.trim().to_lowercase();
        self.patrons
            .iter()
            .filter(|p| p.last_name.to_lowercase() == wanted)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Patron> {
        self.patrons.iter()
    }

    pub fn len(&self) -> usize {
        self.patrons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patrons.is_empty()
    }

    pub(crate) fn has_unique_matricolas(&self) -> bool {
        self.index.len() == self.patrons.len()
    }

    fn position(&self, matricola: &str) -> Result<usize> {
        self.index
            .get(matricola)
            .copied()
            .ok_or_else(|| LibraryError::not_found(EntityKind::Patron, matricola))
    }

    fn reindex(&mut self) {
        self.index = self
            .patrons
            .iter()
            .enumerate()
            .map(|(i, p)| (p.matricola.clone(), i))
            .collect();
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn bianchi() -> Patron {
        Patron::new("Antonio", "Bianchi", "0612701234", "a.bianchi2@studenti.unisa.it")
    }

    fn tedesco(matricola: &str) -> Patron {
        Patron::new("Maria", "Tedesco", matricola, "m.tedesco1@studenti.unisa.it")
    }

    #[test]
    fn test_patron_creation() {
        let patron = bianchi();

        assert_eq!(patron.matricola(), "0612701234");
        assert_eq!(patron.active_loans(), 0);
        assert!(!patron.has_active_loans());
        assert!(!patron.at_loan_limit());
        assert_eq!(patron.full_name(), "Antonio Bianchi");
    }

    #[test]
    fn test_patron_equality_by_matricola() {
        let mut renamed = bianchi();
        renamed.first_name = "Antonella".to_string();

        assert_eq!(bianchi(), renamed);
        assert_ne!(bianchi(), tedesco("0612706543"));
    }

    #[test]
    fn test_patron_loan_cap() {
        let mut patron = bianchi();

        for _ in 0..MAX_ACTIVE_LOANS {
            patron.open_loan().unwrap();
        }
        assert!(patron.at_loan_limit());

        let err = patron.open_loan().unwrap_err();
        assert!(matches!(err, LibraryError::LimitExceeded { limit: 3, .. }));
        assert_eq!(patron.active_loans(), 3);

        patron.close_loan();
        assert_eq!(patron.active_loans(), 2);
    }

    #[test]
    fn test_patron_close_loan_never_underflows() {
        let mut patron = bianchi();
        patron.close_loan();
        assert_eq!(patron.active_loans(), 0);
    }

    #[test]
    fn test_patron_display() {
        assert_eq!(
            bianchi().to_string(),
            "Antonio Bianchi (Matr: 0612701234, Email: a.bianchi2@studenti.unisa.it) - Active loans: 0"
        );
    }

    #[test]
    fn test_registry_add_rejects_duplicate_matricola() {
        let mut registry = PatronRegistry::new();
        registry.add(bianchi()).unwrap();

        let err = registry
            .add(Patron::new("Other", "Person", "0612701234", "o.person1@studenti.unisa.it"))
            .unwrap_err();

        assert!(matches!(err, LibraryError::Duplicate { kind: EntityKind::Patron, .. }));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registry_remove() {
        let mut registry = PatronRegistry::new();
        registry.add(bianchi()).unwrap();
        registry.add(tedesco("0612706543")).unwrap();

        registry.remove("0612701234").unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("0612706543").unwrap().last_name, "Tedesco");

        let err = registry.remove("0612701234").unwrap_err();
        assert!(matches!(err, LibraryError::NotFound { .. }));
    }

    #[test]
    fn test_registry_remove_refuses_active_loans() {
        let mut registry = PatronRegistry::new();
        registry.add(bianchi()).unwrap();
        registry.get_mut("0612701234").unwrap().open_loan().unwrap();

        let err = registry.remove("0612701234").unwrap_err();
        assert!(matches!(err, LibraryError::ReferentialIntegrity { kind: EntityKind::Patron, .. }));
        assert!(registry.exists("0612701234"));
    }

    #[test]
    fn test_registry_edit() {
        let mut registry = PatronRegistry::new();
        registry.add(bianchi()).unwrap();
        registry.add(tedesco("0612706543")).unwrap();

        registry
            .edit("0612701234", "Antonio", "Verdi", "0612709999", "a.verdi3@studenti.unisa.it")
            .unwrap();

        assert!(!registry.exists("0612701234"));
        let patron = registry.get("0612709999").unwrap();
        assert_eq!(patron.last_name, "Verdi");
        assert_eq!(patron.email, "a.verdi3@studenti.unisa.it");

        let err = registry
            .edit("0612709999", "Antonio", "Verdi", "0612706543", "a.verdi3@studenti.unisa.it")
            .unwrap_err();
        assert!(matches!(err, LibraryError::Duplicate { .. }));

        let err = registry
            .edit("0000000000", "A", "B", "0000000000", "a.b1@studenti.unisa.it")
            .unwrap_err();
        assert!(matches!(err, LibraryError::NotFound { .. }));
    }

    #[test]
    fn test_registry_find_by_surname() {
        let mut registry = PatronRegistry::new();
        registry.add(tedesco("0612706543")).unwrap();
        registry.add(tedesco("0612706545")).unwrap();
        registry.add(bianchi()).unwrap();

        assert_eq!(registry.find_by_surname("tedesco").len(), 2);
        assert_eq!(registry.find_by_surname("BIANCHI").len(), 1);
        assert!(registry.find_by_surname("Rossi").is_empty());
        assert!(registry.find_by_matricola("0612701234").is_some());
    }
}
