use std::fmt;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::Hmac;
use pbkdf2::pbkdf2;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

// Coût fixe en production; réduit en test pour garder la suite rapide.
// La vérification relit toujours le nombre d'itérations depuis le hash stocké.
#[cfg(not(test))]
const ITERATIONS: u32 = 260_000;
#[cfg(test)]
const ITERATIONS: u32 = 1_000;

const KEY_LENGTH: usize = 32;
const SALT_LENGTH: usize = 16;
const HASH_PREFIX: &str = "pbkdf2:sha256";

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("PBKDF2 computation failed: {0}")]
    Hashing(String),

    #[error("malformed password hash: {0}")]
    MalformedHash(&'static str),

    #[error("no password hash to compare against")]
    MissingHash,
}

/// Mot de passe d'un utilisateur.
///
/// Seul le hash est persisté. Le texte clair n'existe qu'en mémoire pendant
/// la requête qui l'a fourni (pour la validation de longueur) et il est
/// effacé à la libération.
#[derive(Clone, Default)]
pub struct Password {
    plaintext: Option<Zeroizing<String>>,
    hash: Option<String>,
}

impl Password {
    /// Reconstruit un mot de passe depuis la colonne `password_hash`
    pub fn from_hash(hash: impl Into<String>) -> Self {
        Self {
            plaintext: None,
            hash: Some(hash.into()),
        }
    }

    /// Hash le mot de passe et garde le texte clair pour la durée de la requête
    pub fn set(&mut self, plaintext: &str) -> Result<(), PasswordError> {
        let hash = hash_password(plaintext)?;
        self.plaintext = Some(Zeroizing::new(plaintext.to_string()));
        self.hash = Some(hash);
        Ok(())
    }

    /// Compare un candidat au hash stocké.
    ///
    /// Un mot de passe différent donne `Ok(false)`; une erreur signale
    /// uniquement un hash illisible ou un échec de calcul.
    pub fn matches(&self, plaintext: &str) -> Result<bool, PasswordError> {
        let stored = self.hash.as_deref().ok_or(PasswordError::MissingHash)?;
        verify_password(plaintext, stored)
    }

    pub fn plaintext(&self) -> Option<&str> {
        self.plaintext.as_deref().map(String::as_str)
    }

    pub fn hash(&self) -> Option<&str> {
        self.hash.as_deref()
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Password")
            .field("plaintext", &self.plaintext.as_ref().map(|_| "[redacted]"))
            .field("hash", &self.hash.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

/// Hash un mot de passe avec PBKDF2-HMAC-SHA256 et un salt aléatoire de 16 bytes
/// Format: pbkdf2:sha256:iterations$salt$hash (base64 URL-safe sans padding)
fn hash_password(password: &str) -> Result<String, PasswordError> {
    let mut salt = [0u8; SALT_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut salt);

    let mut key = [0u8; KEY_LENGTH];
    pbkdf2::<HmacSha256>(password.as_bytes(), &salt, ITERATIONS, &mut key)
        .map_err(|e| PasswordError::Hashing(e.to_string()))?;

    Ok(format!(
        "{}:{}${}${}",
        HASH_PREFIX,
        ITERATIONS,
        URL_SAFE_NO_PAD.encode(salt),
        URL_SAFE_NO_PAD.encode(key)
    ))
}

fn verify_password(password: &str, stored_hash: &str) -> Result<bool, PasswordError> {
    // Parser le format: pbkdf2:sha256:iterations$salt$hash
    let mut parts = stored_hash.split('$');
    let (Some(header), Some(salt_str), Some(hash_str), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(PasswordError::MalformedHash("expected three '$' separated parts"));
    };

    let iterations = header
        .strip_prefix(HASH_PREFIX)
        .and_then(|rest| rest.strip_prefix(':'))
        .ok_or(PasswordError::MalformedHash("unknown algorithm"))?
        .parse::<u32>()
        .map_err(|_| PasswordError::MalformedHash("invalid iterations"))?;

    let salt = URL_SAFE_NO_PAD
        .decode(salt_str)
        .map_err(|_| PasswordError::MalformedHash("invalid salt encoding"))?;
    let expected = URL_SAFE_NO_PAD
        .decode(hash_str)
        .map_err(|_| PasswordError::MalformedHash("invalid hash encoding"))?;
    if expected.is_empty() {
        return Err(PasswordError::MalformedHash("empty hash"));
    }

    let mut computed = Zeroizing::new(vec![0u8; expected.len()]);
    pbkdf2::<HmacSha256>(password.as_bytes(), &salt, iterations, &mut computed)
        .map_err(|e| PasswordError::Hashing(e.to_string()))?;

    Ok(computed.ct_eq(&expected).into())
}
