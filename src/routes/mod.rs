pub mod errors;
pub mod health;
pub mod replays;
pub mod tokens;
pub mod users;

use actix_web::web;

use crate::routes::errors::ApiError;

/// Exécute un calcul coûteux (PBKDF2) sur le pool bloquant d'actix,
/// hors des workers qui servent les requêtes
pub async fn run_blocking<F, R>(f: F) -> Result<R, ApiError>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    web::block(f)
        .await
        .map_err(|err| ApiError::Internal(format!("blocking task failed: {err}")))
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(errors::json_error_handler))
        .app_data(web::QueryConfig::default().error_handler(errors::query_error_handler))
        .service(
            web::scope("/v1")
                .service(health::health_check)
                .service(replays::list_replays)
                .service(replays::create_replay)
                .service(replays::show_replay)
                .service(replays::update_replay)
                .service(replays::delete_replay)
                .service(users::register_user)
                .service(users::activate_user)
                .service(tokens::create_authentication_token),
        );
}
