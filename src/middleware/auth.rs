use actix_web::dev::Payload;
use actix_web::http::header::AUTHORIZATION;
use actix_web::{FromRequest, HttpRequest, web};
use futures::future::LocalBoxFuture;

use crate::models::tokens::{SCOPE_AUTHENTICATION, validate_token_plaintext};
use crate::models::users::{Subject, User};
use crate::models::{DataError, Models};
use crate::routes::errors::ApiError;
use crate::utils::validator::Validator;

/// Extrait le token d'un header `Authorization: Bearer <token>`
fn bearer_token(header: &str) -> Option<&str> {
    match header.split_once(' ') {
        Some(("Bearer", token)) if !token.is_empty() => Some(token),
        _ => None,
    }
}

/// Résout le sujet de la requête.
///
/// Pas de header Authorization: `Subject::Anonymous`. Header présent mais
/// mal formé, token inconnu ou expiré: 401 avec `WWW-Authenticate: Bearer`.
async fn authenticate(models: &Models, header: Option<String>) -> Result<Subject, ApiError> {
    let Some(header) = header else {
        return Ok(Subject::Anonymous);
    };

    let token = bearer_token(&header).ok_or(ApiError::InvalidAuthenticationToken)?;

    let mut v = Validator::new();
    validate_token_plaintext(&mut v, token);
    if !v.valid() {
        return Err(ApiError::InvalidAuthenticationToken);
    }

    match models.users.get_for_token(SCOPE_AUTHENTICATION, token).await {
        Ok(user) => Ok(Subject::User(user)),
        Err(DataError::NotFound) => Err(ApiError::InvalidAuthenticationToken),
        Err(err) => Err(err.into()),
    }
}

impl FromRequest for Subject {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let header = req
            .headers()
            .get(AUTHORIZATION)
            .map(|value| value.to_str().unwrap_or_default().to_string());
        let models = req.app_data::<web::Data<Models>>().cloned();

        Box::pin(async move {
            let models = models.ok_or_else(|| ApiError::Internal("models not configured".into()))?;
            let subject = authenticate(&models, header).await?;
            tracing::debug!(anonymous = subject.is_anonymous(), "request subject resolved");
            Ok(subject)
        })
    }
}

pub fn require_authenticated_user(subject: &Subject) -> Result<&User, ApiError> {
    match subject {
        Subject::Anonymous => Err(ApiError::AuthenticationRequired),
        Subject::User(user) => Ok(user),
    }
}

pub fn require_activated_user(subject: &Subject) -> Result<&User, ApiError> {
    let user = require_authenticated_user(subject)?;
    if !user.activated {
        return Err(ApiError::InactiveAccount);
    }
    Ok(user)
}

/// Anonyme: 401. Compte inactif ou code absent: 403.
pub async fn require_permission<'a>(
    models: &Models,
    subject: &'a Subject,
    code: &str,
) -> Result<&'a User, ApiError> {
    let user = require_activated_user(subject)?;

    let permissions = models.permissions.get_all_for_user(user.id).await?;
    if !permissions.include(code) {
        return Err(ApiError::NotPermitted);
    }
    Ok(user)
}
