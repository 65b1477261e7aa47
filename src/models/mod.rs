// ============================================================================
// MODELS - MODULE PRINCIPAL
// ============================================================================
//
// Description:
//   Point d'entrée de la couche données. Chaque store encapsule le pool
//   SeaORM et applique le délai de 3s de db::with_timeout.
//
// Liste des modules:
//   - error : DataError, seul type d'erreur de la couche
//   - filters : pagination/tri (Filters, Metadata)
//   - health : réponse du healthcheck
//   - runtime : durée "<n> mins"
//   - replays : replays + verrouillage optimiste
//   - users : utilisateurs, Subject
//   - tokens : tokens opaques (activation, authentification)
//   - permissions : codes de permission par utilisateur
//
// Points d'attention:
//   - Les tables et les codes de permission sont créés par crate::migration
//   - Models est partagé entre les workers actix via web::Data
//
// ============================================================================

pub mod error;
pub mod filters;
pub mod health;
pub mod permissions;
pub mod replays;
pub mod runtime;
pub mod tokens;
pub mod users;

use sea_orm::DatabaseConnection;

pub use error::DataError;

use permissions::PermissionModel;
use replays::ReplayModel;
use tokens::TokenModel;
use users::UserModel;

/// Ensemble des stores, construit une fois au démarrage
#[derive(Clone)]
pub struct Models {
    pub replays: ReplayModel,
    pub permissions: PermissionModel,
    pub tokens: TokenModel,
    pub users: UserModel,
}

impl Models {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            replays: ReplayModel::new(db.clone()),
            permissions: PermissionModel::new(db.clone()),
            tokens: TokenModel::new(db.clone()),
            users: UserModel::new(db),
        }
    }
}
