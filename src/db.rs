// connexion BD

use std::future::Future;
use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;

use crate::config::DatabaseConfig;
use crate::migration::Migrator;
use crate::models::DataError;

/// Délai maximal d'une opération de stockage
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(3);

pub async fn establish_connection(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .idle_timeout(config.idle_timeout)
        .connect_timeout(Duration::from_secs(5))
        .sqlx_logging(false);

    let db = Database::connect(options).await?;
    Migrator::up(&db, None).await?;
    tracing::info!(max_connections = config.max_connections, "database connection pool established");

    Ok(db)
}

/// Exécute une opération de stockage avec le délai `QUERY_TIMEOUT`.
///
/// Un dépassement est une `Persistence`, jamais réessayé. Abandonner la
/// future abandonne la requête en cours.
pub async fn with_timeout<T, F>(operation: F) -> Result<T, DataError>
where
    F: Future<Output = Result<T, DataError>>,
{
    match tokio::time::timeout(QUERY_TIMEOUT, operation).await {
        Ok(result) => result,
        Err(_) => Err(DataError::Persistence(format!(
            "query timed out after {}s",
            QUERY_TIMEOUT.as_secs()
        ))),
    }
}

/// Base SQLite en mémoire migrée, pour les tests.
///
/// Une seule connexion: chaque connexion `:memory:` aurait sa propre base.
#[cfg(test)]
pub async fn test_connection() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);

    let db = Database::connect(options).await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    db
}
