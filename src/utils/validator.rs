use std::collections::{BTreeMap, HashSet};
use std::hash::Hash;

use validator::ValidateEmail;

/// Accumule les violations `champ -> message` d'une requête.
///
/// Le premier message enregistré pour un champ est conservé, ce qui permet
/// d'empiler les règles de la plus générale à la plus précise
/// ("must be provided" avant "must contain 10 heroes").
#[derive(Debug, Default, Clone)]
pub struct Validator {
    errors: BTreeMap<String, String>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Vrai si aucune violation n'a été enregistrée
    pub fn valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: &str, message: &str) {
        self.errors
            .entry(field.to_string())
            .or_insert_with(|| message.to_string());
    }

    /// Enregistre `message` pour `field` seulement si `ok` est faux
    pub fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.add_error(field, message);
        }
    }

    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }

    pub fn into_errors(self) -> BTreeMap<String, String> {
        self.errors
    }
}

/// Vrai si `value` fait partie de la liste autorisée
pub fn permitted_value<T: PartialEq>(value: &T, permitted: &[T]) -> bool {
    permitted.iter().any(|p| p == value)
}

/// Vrai si toutes les valeurs sont distinctes
pub fn unique<T: Eq + Hash>(values: &[T]) -> bool {
    let mut seen = HashSet::with_capacity(values.len());
    values.iter().all(|v| seen.insert(v))
}

/// Contrôle de forme d'une adresse email (pas de vérification de délivrabilité)
pub fn is_email(value: &str) -> bool {
    value.validate_email()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_records_only_failures() {
        let mut v = Validator::new();
        v.check(true, "title", "must be provided");
        assert!(v.valid());

        v.check(false, "title", "must be provided");
        assert!(!v.valid());
        assert_eq!(v.errors().get("title").map(String::as_str), Some("must be provided"));
    }

    #[test]
    fn test_first_message_per_field_wins() {
        let mut v = Validator::new();
        v.check(false, "heroes", "must be provided");
        v.check(false, "heroes", "must contain 10 heroes");
        v.check(false, "year", "must be provided");

        let errors = v.into_errors();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors["heroes"], "must be provided");
    }

    #[test]
    fn test_unique() {
        assert!(unique(&["axe", "lina", "lion"]));
        assert!(!unique(&["axe", "lina", "axe"]));
        assert!(unique::<&str>(&[]));
    }

    #[test]
    fn test_permitted_value() {
        let safelist = ["id", "-id", "title"];
        assert!(permitted_value(&"-id", &safelist));
        assert!(!permitted_value(&"id; DROP TABLE replays", &safelist));
    }

    #[test]
    fn test_is_email() {
        assert!(is_email("alice@example.com"));
        assert!(!is_email("alice@"));
        assert!(!is_email("not an email"));
        assert!(!is_email(""));
    }
}
