// ============================================================================
// MODÈLE : PERMISSIONS
// ============================================================================
//
// Tables:
//   - permissions (id BIGINT PK, code VARCHAR UNIQUE)
//     codes créés par la migration: "replays:read", "replays:write"
//   - users_permissions (user_id, permission_id) - clé primaire composite
//
// Points d'attention:
//   - add_for_user est un INSERT ... SELECT: un code inconnu n'est
//     simplement pas accordé, et un code déjà accordé est ignoré
//   - la politique (401/403) vit dans le middleware, pas ici
//
// ============================================================================

use sea_orm::sea_query::{Expr, OnConflict, Query};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use serde::Serialize;

use crate::db::with_timeout;
use crate::models::DataError;

pub const REPLAYS_READ: &str = "replays:read";
pub const REPLAYS_WRITE: &str = "replays:write";

pub mod permission {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "permissions")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        #[sea_orm(unique)]
        pub code: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(has_many = "super::users_permissions::Entity")]
        UsersPermissions,
    }

    impl Related<super::users_permissions::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::UsersPermissions.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod users_permissions {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "users_permissions")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub user_id: i64,
        #[sea_orm(primary_key, auto_increment = false)]
        pub permission_id: i64,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {
        #[sea_orm(
            belongs_to = "crate::models::users::Entity",
            from = "Column::UserId",
            to = "crate::models::users::Column::Id",
            on_delete = "Cascade"
        )]
        User,

        #[sea_orm(
            belongs_to = "super::permission::Entity",
            from = "Column::PermissionId",
            to = "super::permission::Column::Id",
            on_delete = "Cascade"
        )]
        Permission,
    }

    impl Related<crate::models::users::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::User.def()
        }
    }

    impl Related<super::permission::Entity> for Entity {
        fn to() -> RelationDef {
            Relation::Permission.def()
        }
    }

    impl ActiveModelBehavior for ActiveModel {}
}

/// Codes de permission accordés à un utilisateur
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Permissions(pub Vec<String>);

impl Permissions {
    pub fn include(&self, code: &str) -> bool {
        self.0.iter().any(|c| c == code)
    }
}

#[derive(Clone)]
pub struct PermissionModel {
    db: DatabaseConnection,
}

impl PermissionModel {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn get_all_for_user(&self, user_id: i64) -> Result<Permissions, DataError> {
        let codes: Vec<String> = with_timeout(async {
            Ok(permission::Entity::find()
                .select_only()
                .column(permission::Column::Code)
                .inner_join(users_permissions::Entity)
                .filter(users_permissions::Column::UserId.eq(user_id))
                .order_by_asc(permission::Column::Code)
                .into_tuple()
                .all(&self.db)
                .await?)
        })
        .await?;

        Ok(Permissions(codes))
    }

    /// Accorde les codes connus parmi `codes`, en une seule instruction
    pub async fn add_for_user(&self, user_id: i64, codes: &[&str]) -> Result<(), DataError> {
        if codes.is_empty() {
            return Ok(());
        }

        let granted = Query::select()
            .expr(Expr::val(user_id))
            .column((permission::Entity, permission::Column::Id))
            .from(permission::Entity)
            .and_where(permission::Column::Code.is_in(codes.iter().copied()))
            .to_owned();

        let mut insert = Query::insert();
        insert
            .into_table(users_permissions::Entity)
            .columns([
                users_permissions::Column::UserId,
                users_permissions::Column::PermissionId,
            ])
            .select_from(granted)
            .map_err(|e| DataError::Persistence(e.to_string()))?
            .on_conflict(
                OnConflict::columns([
                    users_permissions::Column::UserId,
                    users_permissions::Column::PermissionId,
                ])
                .do_nothing()
                .to_owned(),
            );

        let statement = self.db.get_database_backend().build(&insert);
        with_timeout(async {
            self.db.execute(statement).await?;
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

    async fn setup() -> (PermissionModel, i64) {
        let db = test_connection().await;
        let mut user = User::new("Alice", "alice@example.com");
        user.password.set("pa55word-long").unwrap();
        UserModel::new(db.clone()).insert(&mut user).await.unwrap();
        (PermissionModel::new(db), user.id)
    }

    #[test]
    fn test_include() {
        let permissions = Permissions(vec![REPLAYS_READ.to_string()]);
        assert!(permissions.include(REPLAYS_READ));
        assert!(!permissions.include(REPLAYS_WRITE));
        assert!(!Permissions::default().include(REPLAYS_READ));
    }

    #[tokio::test]
    async fn test_new_user_has_no_permissions() {
        let (model, user_id) = setup().await;
        assert_eq!(model.get_all_for_user(user_id).await.unwrap(), Permissions::default());
    }

    #[tokio::test]
    async fn test_add_for_user() {
        let (model, user_id) = setup().await;

        model.add_for_user(user_id, &[REPLAYS_READ]).await.unwrap();
        let permissions = model.get_all_for_user(user_id).await.unwrap();
        assert!(permissions.include(REPLAYS_READ));
        assert!(!permissions.include(REPLAYS_WRITE));

        model.add_for_user(user_id, &[REPLAYS_WRITE]).await.unwrap();
        let permissions = model.get_all_for_user(user_id).await.unwrap();
        assert_eq!(permissions.0, vec![REPLAYS_READ, REPLAYS_WRITE]);
    }

    #[tokio::test]
    async fn test_add_for_user_is_idempotent_and_skips_unknown_codes() {
        let (model, user_id) = setup().await;

        model.add_for_user(user_id, &[REPLAYS_READ]).await.unwrap();
        model
            .add_for_user(user_id, &[REPLAYS_READ, "replays:admin"])
            .await
            .unwrap();

        let permissions = model.get_all_for_user(user_id).await.unwrap();
        assert_eq!(permissions.0, vec![REPLAYS_READ]);

        model.add_for_user(user_id, &[]).await.unwrap();
    }
}
