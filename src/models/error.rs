use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

use crate::utils::password::PasswordError;

/// Erreurs de la couche données.
///
/// `NotFound`, `EditConflict` et `DuplicateEmail` sont des signaux métier que
/// l'appelant doit traiter; `Hashing` et `Persistence` sont des pannes
/// internes à ne jamais détailler au client.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("record not found")]
    NotFound,

    #[error("edit conflict")]
    EditConflict,

    #[error("duplicate email")]
    DuplicateEmail,

    #[error("unsafe sort parameter: {0}")]
    UnsafeSort(String),

    #[error("password hashing failed: {0}")]
    Hashing(#[from] PasswordError),

    #[error("database error: {0}")]
    Persistence(String),
}

impl From<DbErr> for DataError {
    fn from(err: DbErr) -> Self {
        match &err {
            DbErr::RecordNotFound(_) => DataError::NotFound,
            _ => DataError::Persistence(err.to_string()),
        }
    }
}

/// Vrai si l'erreur vient d'une contrainte UNIQUE (users_email_key)
pub fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}
