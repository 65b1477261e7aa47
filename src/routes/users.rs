use actix_web::{HttpResponse, post, put, web};
use chrono::Duration;
use serde::Deserialize;
use serde_json::json;
use zeroize::Zeroizing;

use crate::mailer::Mailer;
use crate::models::permissions::REPLAYS_READ;
use crate::models::tokens::{SCOPE_ACTIVATION, validate_token_plaintext};
use crate::models::users::{User, validate_user};
use crate::models::{DataError, Models};
use crate::routes::errors::ApiError;
use crate::routes::run_blocking;
use crate::utils::password::Password;
use crate::utils::validator::Validator;

const ACTIVATION_TTL_DAYS: i64 = 3;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegisterUserRequest {
    name: String,
    email: String,
    password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ActivateUserRequest {
    token: String,
}

/// Inscription: compte inactif, permission de lecture, token d'activation
#[post("/users")]
pub async fn register_user(
    models: web::Data<Models>,
    mailer: web::Data<Mailer>,
    request: web::Json<RegisterUserRequest>,
) -> Result<HttpResponse, ApiError> {
    let request = request.into_inner();

    let mut user = User::new(request.name, request.email);
    let plaintext = Zeroizing::new(request.password);
    user.password = run_blocking(move || {
        let mut password = Password::default();
        password.set(&plaintext).map(|_| password)
    })
    .await?
    .map_err(DataError::from)?;

    let mut v = Validator::new();
    validate_user(&mut v, &user);
    if !v.valid() {
        return Err(ApiError::Validation(v.into_errors()));
    }

    models.users.insert(&mut user).await?;
    models.permissions.add_for_user(user.id, &[REPLAYS_READ]).await?;

    let token = models
        .tokens
        .new_token(user.id, Duration::days(ACTIVATION_TTL_DAYS), SCOPE_ACTIVATION)
        .await?;

    mailer.send_activation(&user.email, user.id, &token.plaintext, token.expiry);
    tracing::info!(user_id = user.id, "user registered");

    Ok(HttpResponse::Accepted().json(json!({ "user": user })))
}

#[put("/users/activated")]
pub async fn activate_user(
    models: web::Data<Models>,
    request: web::Json<ActivateUserRequest>,
) -> Result<HttpResponse, ApiError> {
    let plaintext = request.into_inner().token;

    let mut v = Validator::new();
    validate_token_plaintext(&mut v, &plaintext);
    if !v.valid() {
        return Err(ApiError::Validation(v.into_errors()));
    }

    let mut user = match models.users.get_for_token(SCOPE_ACTIVATION, &plaintext).await {
        Ok(user) => user,
        Err(DataError::NotFound) => {
            return Err(ApiError::field("token", "invalid or expired activation token"));
        }
        Err(err) => return Err(err.into()),
    };

    user.activated = true;
    models.users.update(&mut user).await?;
    models.tokens.delete_all_for_user(SCOPE_ACTIVATION, user.id).await?;
    tracing::info!(user_id = user.id, "user activated");

    Ok(HttpResponse::Ok().json(json!({ "user": user })))
}
