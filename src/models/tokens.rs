// ============================================================================
// MODÈLE : TOKENS
// ============================================================================
//
// Colonnes de la table tokens:
//   - hash (VARCHAR(64), PRIMARY KEY) - sha-256 hex du texte clair
//   - user_id (BIGINT, NOT NULL, FK vers users, ON DELETE CASCADE)
//   - expiry (TIMESTAMPTZ, NOT NULL)
//   - scope (TEXT, NOT NULL) - "activation" ou "authentication"
//
// Workflow:
//   1. TokenModel::new génère 16 octets aléatoires (OsRng)
//   2. Le texte clair (base64url, 22 caractères) est renvoyé UNE fois
//   3. Seul le hash est persisté
//   4. La vérification passe exclusivement par UserModel::get_for_token
//
// Points d'attention:
//   - Un token expiré et un token d'un autre scope sont indiscernables
//   - Après activation, tous les tokens d'activation de l'utilisateur sont
//     révoqués (delete_all_for_user)
//
// ============================================================================

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use sea_orm::entity::prelude::*;
use sea_orm::{DatabaseConnection, Set};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::db::with_timeout;
use crate::models::DataError;
use crate::utils::validator::Validator;

pub const SCOPE_ACTIVATION: &str = "activation";
pub const SCOPE_AUTHENTICATION: &str = "authentication";

const TOKEN_BYTES: usize = 16;
/// Longueur du texte clair encodé (16 octets en base64url sans padding)
pub const TOKEN_PLAINTEXT_LENGTH: usize = 22;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "tokens")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub hash: String,
    pub user_id: i64,
    pub expiry: DateTimeUtc,
    pub scope: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id",
        on_delete = "Cascade"
    )]
    User,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Token émis. Seuls `token` et `expiry` sortent en JSON.
#[derive(Clone, Debug, Serialize)]
pub struct Token {
    #[serde(rename = "token")]
    pub plaintext: String,
    #[serde(skip)]
    pub hash: String,
    #[serde(skip)]
    pub user_id: i64,
    pub expiry: DateTime<Utc>,
    #[serde(skip)]
    pub scope: String,
}

/// sha-256 hex d'un texte clair: la forme persistée et recherchée
pub fn hash_plaintext(plaintext: &str) -> String {
    hex::encode(Sha256::digest(plaintext.as_bytes()))
}

pub fn generate_token(user_id: i64, ttl: Duration, scope: &str) -> Token {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let plaintext = URL_SAFE_NO_PAD.encode(bytes);

    Token {
        hash: hash_plaintext(&plaintext),
        plaintext,
        user_id,
        expiry: Utc::now() + ttl,
        scope: scope.to_string(),
    }
}

pub fn validate_token_plaintext(v: &mut Validator, plaintext: &str) {
    v.check(!plaintext.is_empty(), "token", "must be provided");
    v.check(
        plaintext.len() == TOKEN_PLAINTEXT_LENGTH,
        "token",
        "must be 22 bytes long",
    );
}

#[derive(Clone)]
pub struct TokenModel {
    db: DatabaseConnection,
}

impl TokenModel {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Génère, persiste et renvoie un token (seule occasion de voir le texte clair)
    pub async fn new_token(&self, user_id: i64, ttl: Duration, scope: &str) -> Result<Token, DataError> {
        let token = generate_token(user_id, ttl, scope);
        self.insert(&token).await?;
        Ok(token)
    }

    pub async fn insert(&self, token: &Token) -> Result<(), DataError> {
        let row = ActiveModel {
            hash: Set(token.hash.clone()),
            user_id: Set(token.user_id),
            expiry: Set(token.expiry),
            scope: Set(token.scope.clone()),
        };

        with_timeout(async {
            Entity::insert(row).exec_without_returning(&self.db).await?;
            Ok(())
        })
        .await
    }

    pub async fn delete_all_for_user(&self, scope: &str, user_id: i64) -> Result<(), DataError> {
        with_timeout(async {
            Entity::delete_many()
                .filter(Column::Scope.eq(scope))
                .filter(Column::UserId.eq(user_id))
                .exec(&self.db)
                .await?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_connection;
    use crate::models::users::{User, UserModel};

    async fn insert_user(db: &DatabaseConnection, email: &str) -> User {
        let mut user = User::new("Alice", email);
        user.password.set("pa55word-long").unwrap();
        UserModel::new(db.clone()).insert(&mut user).await.unwrap();
        user
    }

    #[test]
    fn test_generate_token_shape() {
        let token = generate_token(7, Duration::hours(1), SCOPE_AUTHENTICATION);

        assert_eq!(token.plaintext.len(), TOKEN_PLAINTEXT_LENGTH);
        assert_eq!(token.hash, hash_plaintext(&token.plaintext));
        assert_eq!(token.hash.len(), 64);
        assert_eq!(token.user_id, 7);
        assert!(token.expiry > Utc::now());

        let other = generate_token(7, Duration::hours(1), SCOPE_AUTHENTICATION);
        assert_ne!(token.plaintext, other.plaintext);
    }

    #[test]
    fn test_token_json_exposes_only_token_and_expiry() {
        let token = generate_token(1, Duration::days(1), SCOPE_AUTHENTICATION);
        let json = serde_json::to_value(&token).unwrap();
        let object = json.as_object().unwrap();

        assert_eq!(object.len(), 2);
        assert_eq!(object["token"], token.plaintext);
        assert!(object.contains_key("expiry"));
    }

    #[test]
    fn test_validate_token_plaintext() {
        let mut v = Validator::new();
        validate_token_plaintext(&mut v, "");
        assert_eq!(v.errors()["token"], "must be provided");

        let mut v = Validator::new();
        validate_token_plaintext(&mut v, "short");
        assert_eq!(v.errors()["token"], "must be 22 bytes long");

        let mut v = Validator::new();
        validate_token_plaintext(&mut v, &"a".repeat(22));
        assert!(v.valid());
    }

    #[tokio::test]
    async fn test_new_token_resolves_to_user() {
        let db = test_connection().await;
        let user = insert_user(&db, "alice@example.com").await;
        let tokens = TokenModel::new(db.clone());
        let users = UserModel::new(db);

        let token = tokens
            .new_token(user.id, Duration::hours(24), SCOPE_AUTHENTICATION)
            .await
            .unwrap();

        let found = users.get_for_token(SCOPE_AUTHENTICATION, &token.plaintext).await.unwrap();
        assert_eq!(found.id, user.id);

        // mauvais scope: indiscernable d'un token inconnu
        let wrong_scope = users.get_for_token(SCOPE_ACTIVATION, &token.plaintext).await;
        assert!(matches!(wrong_scope, Err(DataError::NotFound)));
    }

    #[tokio::test]
    async fn test_expired_token_is_not_found() {
        let db = test_connection().await;
        let user = insert_user(&db, "bob@example.com").await;
        let tokens = TokenModel::new(db.clone());

        let token = tokens
            .new_token(user.id, Duration::seconds(-1), SCOPE_AUTHENTICATION)
            .await
            .unwrap();

        let result = UserModel::new(db).get_for_token(SCOPE_AUTHENTICATION, &token.plaintext).await;
        assert!(matches!(result, Err(DataError::NotFound)));
    }

    #[tokio::test]
    async fn test_delete_all_for_user_is_scoped() {
        let db = test_connection().await;
        let user = insert_user(&db, "carol@example.com").await;
        let tokens = TokenModel::new(db.clone());
        let users = UserModel::new(db);

        let activation = tokens.new_token(user.id, Duration::days(3), SCOPE_ACTIVATION).await.unwrap();
        let session = tokens.new_token(user.id, Duration::hours(24), SCOPE_AUTHENTICATION).await.unwrap();

        tokens.delete_all_for_user(SCOPE_ACTIVATION, user.id).await.unwrap();

        assert!(matches!(
            users.get_for_token(SCOPE_ACTIVATION, &activation.plaintext).await,
            Err(DataError::NotFound)
        ));
        assert!(users.get_for_token(SCOPE_AUTHENTICATION, &session.plaintext).await.is_ok());
    }
}
