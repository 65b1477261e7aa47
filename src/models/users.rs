// ============================================================================
// MODÈLE : USERS
// ============================================================================
//
// Colonnes de la table users:
//   - id (BIGINT, PRIMARY KEY, auto-incrément)
//   - created_at (TIMESTAMPTZ, NOT NULL)
//   - name (TEXT, NOT NULL)
//   - email (VARCHAR, NOT NULL, UNIQUE via users_email_key)
//   - password_hash (TEXT, NOT NULL) - Format: pbkdf2:sha256:iterations$salt$hash
//   - activated (BOOLEAN, DEFAULT FALSE)
//   - version (INTEGER, DEFAULT 1)
//
// Points d'attention:
//   - password et version ne sortent jamais en JSON
//   - la violation de users_email_key devient DuplicateEmail
//   - get_for_token est le SEUL chemin token -> utilisateur
//
// ============================================================================

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveValue::NotSet, DatabaseConnection, Set};
use serde::Serialize;

use crate::db::with_timeout;
use crate::models::DataError;
use crate::models::error::is_unique_violation;
use crate::models::tokens::{self, hash_plaintext};
use crate::utils::password::{Password, PasswordError};
use crate::utils::validator::{Validator, is_email};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub created_at: DateTimeUtc,
    pub name: String,
    #[sea_orm(unique)]
    pub email: String,
    pub password_hash: String,
    pub activated: bool,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::tokens::Entity")]
    Tokens,

    #[sea_orm(has_many = "super::permissions::users_permissions::Entity")]
    UsersPermissions,
}

impl Related<super::tokens::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tokens.def()
    }
}

impl Related<super::permissions::users_permissions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::UsersPermissions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Clone, Debug, Default, Serialize)]
pub struct User {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password: Password,
    pub activated: bool,
    #[serde(skip)]
    pub version: i32,
}

impl User {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            ..Default::default()
        }
    }
}

impl From<Model> for User {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            created_at: model.created_at,
            name: model.name,
            email: model.email,
            password: Password::from_hash(model.password_hash),
            activated: model.activated,
            version: model.version,
        }
    }
}

/// Identité de la requête courante
#[derive(Clone, Debug)]
pub enum Subject {
    Anonymous,
    User(User),
}

impl Subject {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Subject::Anonymous)
    }
}

pub fn validate_email(v: &mut Validator, email: &str) {
    v.check(!email.is_empty(), "email", "must be provided");
    v.check(is_email(email), "email", "must be a valid email address");
}

pub fn validate_password_plaintext(v: &mut Validator, password: &str) {
    v.check(!password.is_empty(), "password", "must be provided");
    v.check(password.len() >= 8, "password", "must be at least 8 bytes long");
    v.check(password.len() <= 72, "password", "must not be more than 72 bytes long");
}

/// Valide un utilisateur avant écriture.
///
/// # Panics
///
/// Si l'utilisateur n'a pas de hash: c'est un bug de l'appelant, pas une
/// erreur de saisie.
pub fn validate_user(v: &mut Validator, user: &User) {
    v.check(!user.name.is_empty(), "name", "must be provided");
    v.check(user.name.len() <= 500, "name", "must not be more than 500 bytes long");

    validate_email(v, &user.email);

    if let Some(plaintext) = user.password.plaintext() {
        validate_password_plaintext(v, plaintext);
    }

    assert!(
        user.password.hash().is_some(),
        "missing password hash for user {}",
        user.id
    );
}

fn map_write_error(err: DbErr) -> DataError {
    if is_unique_violation(&err) {
        DataError::DuplicateEmail
    } else {
        err.into()
    }
}

#[derive(Clone)]
pub struct UserModel {
    db: DatabaseConnection,
}

impl UserModel {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn insert(&self, user: &mut User) -> Result<(), DataError> {
        let password_hash = user.password.hash().ok_or(PasswordError::MissingHash)?;

        let new_user = ActiveModel {
            id: NotSet,
            created_at: Set(Utc::now()),
            name: Set(user.name.clone()),
            email: Set(user.email.clone()),
            password_hash: Set(password_hash.to_string()),
            activated: Set(user.activated),
            version: Set(1),
        };

        let inserted = with_timeout(async { new_user.insert(&self.db).await.map_err(map_write_error) }).await?;

        user.id = inserted.id;
        user.created_at = inserted.created_at;
        user.version = inserted.version;
        Ok(())
    }

    pub async fn get_by_email(&self, email: &str) -> Result<User, DataError> {
        let found = with_timeout(async {
            Ok(Entity::find()
                .filter(Column::Email.eq(email))
                .one(&self.db)
                .await?)
        })
        .await?;

        found.map(User::from).ok_or(DataError::NotFound)
    }

    /// Même écriture conditionnelle que pour les replays, sur (id, version)
    pub async fn update(&self, user: &mut User) -> Result<(), DataError> {
        let password_hash = user.password.hash().ok_or(PasswordError::MissingHash)?.to_string();

        let result = with_timeout(async {
            Entity::update_many()
                .col_expr(Column::Name, Expr::value(user.name.clone()))
                .col_expr(Column::Email, Expr::value(user.email.clone()))
                .col_expr(Column::PasswordHash, Expr::value(password_hash))
                .col_expr(Column::Activated, Expr::value(user.activated))
                .col_expr(Column::Version, Expr::col(Column::Version).add(1))
                .filter(Column::Id.eq(user.id))
                .filter(Column::Version.eq(user.version))
                .exec(&self.db)
                .await
                .map_err(map_write_error)
        })
        .await?;

        if result.rows_affected == 0 {
            return Err(DataError::EditConflict);
        }

        user.version += 1;
        Ok(())
    }

    /// Résout un token présenté en utilisateur.
    ///
    /// Hash inconnu, mauvais scope ou token expiré: `NotFound` dans tous les cas.
    pub async fn get_for_token(&self, scope: &str, plaintext: &str) -> Result<User, DataError> {
        let hash = hash_plaintext(plaintext);

        let found = with_timeout(async {
            Ok(Entity::find()
                .inner_join(tokens::Entity)
                .filter(tokens::Column::Hash.eq(hash))
                .filter(tokens::Column::Scope.eq(scope))
                .filter(tokens::Column::Expiry.gt(Utc::now()))
                .one(&self.db)
                .await?)
        })
        .await?;

        found.map(User::from).ok_or(DataError::NotFound)
    }
}
