use actix_web::{HttpResponse, post, web};
use chrono::Duration;
use serde::Deserialize;
use serde_json::json;
use zeroize::Zeroizing;

use crate::models::tokens::SCOPE_AUTHENTICATION;
use crate::models::users::{validate_email, validate_password_plaintext};
use crate::models::{DataError, Models};
use crate::routes::errors::ApiError;
use crate::routes::run_blocking;
use crate::utils::validator::Validator;

const AUTHENTICATION_TTL_HOURS: i64 = 24;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthenticationRequest {
    email: String,
    password: String,
}

/// Échange email + mot de passe contre un token d'authentification (24h).
/// Email inconnu et mauvais mot de passe donnent la même réponse 401.
#[post("/tokens/authentication")]
pub async fn create_authentication_token(
    models: web::Data<Models>,
    request: web::Json<AuthenticationRequest>,
) -> Result<HttpResponse, ApiError> {
    let request = request.into_inner();

    let mut v = Validator::new();
    validate_email(&mut v, &request.email);
    validate_password_plaintext(&mut v, &request.password);
    if !v.valid() {
        return Err(ApiError::Validation(v.into_errors()));
    }

    let user = match models.users.get_by_email(&request.email).await {
        Ok(user) => user,
        Err(DataError::NotFound) => return Err(ApiError::InvalidCredentials),
        Err(err) => return Err(err.into()),
    };

    let password = user.password.clone();
    let candidate = Zeroizing::new(request.password);
    let matches = run_blocking(move || password.matches(&candidate))
        .await?
        .map_err(DataError::from)?;
    if !matches {
        return Err(ApiError::InvalidCredentials);
    }

    let token = models
        .tokens
        .new_token(user.id, Duration::hours(AUTHENTICATION_TTL_HOURS), SCOPE_AUTHENTICATION)
        .await?;
    tracing::info!(user_id = user.id, "authentication token issued");

    Ok(HttpResponse::Created().json(json!({ "authentication_token": token })))
}
