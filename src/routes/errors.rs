use std::collections::BTreeMap;

use actix_web::http::StatusCode;
use actix_web::http::header::WWW_AUTHENTICATE;
use actix_web::{HttpRequest, HttpResponse, ResponseError, error};
use serde_json::json;
use thiserror::Error;

use crate::models::DataError;

/// Erreurs renvoyées par les handlers.
///
/// Le corps est toujours `{"error": ...}`; les pannes internes sont
/// journalisées et remplacées par un message opaque.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("failed validation")]
    Validation(BTreeMap<String, String>),

    #[error("{0}")]
    BadRequest(String),

    #[error("the requested resource could not be found")]
    NotFound,

    #[error("unable to update the record due to an edit conflict, please try again")]
    EditConflict,

    #[error("invalid authentication credentials")]
    InvalidCredentials,

    #[error("invalid or missing authentication token")]
    InvalidAuthenticationToken,

    #[error("you must be authenticated to access this resource")]
    AuthenticationRequired,

    #[error("your user account must be activated to access this resource")]
    InactiveAccount,

    #[error("your user account doesn't have the necessary permissions to access this resource")]
    NotPermitted,

    #[error("internal error: {0}")]
    Internal(String),
}

pub(crate) const SERVER_ERROR_MESSAGE: &str = "the server encountered a problem and could not process your request";

impl ApiError {
    /// Erreur de validation sur un seul champ
    pub fn field(field: &str, message: &str) -> Self {
        let mut errors = BTreeMap::new();
        errors.insert(field.to_string(), message.to_string());
        ApiError::Validation(errors)
    }
}

impl From<DataError> for ApiError {
    fn from(err: DataError) -> Self {
        match err {
            DataError::NotFound => ApiError::NotFound,
            DataError::EditConflict => ApiError::EditConflict,
            DataError::DuplicateEmail => {
                ApiError::field("email", "a user with this email address already exists")
            }
            DataError::UnsafeSort(_) => ApiError::field("sort", "invalid sort value"),
            DataError::Hashing(_) | DataError::Persistence(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::EditConflict => StatusCode::CONFLICT,
            ApiError::InvalidCredentials
            | ApiError::InvalidAuthenticationToken
            | ApiError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            ApiError::InactiveAccount | ApiError::NotPermitted => StatusCode::FORBIDDEN,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut builder = HttpResponse::build(self.status_code());

        match self {
            ApiError::Validation(errors) => builder.json(json!({ "error": errors })),
            ApiError::InvalidAuthenticationToken => builder
                .insert_header((WWW_AUTHENTICATE, "Bearer"))
                .json(json!({ "error": self.to_string() })),
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "request failed");
                builder.json(json!({ "error": SERVER_ERROR_MESSAGE }))
            }
            _ => builder.json(json!({ "error": self.to_string() })),
        }
    }
}

/// Corps JSON illisible: 400 plutôt que l'erreur texte par défaut d'actix
pub fn json_error_handler(err: error::JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::BadRequest(err.to_string()).into()
}

pub fn query_error_handler(err: error::QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::BadRequest(err.to_string()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    async fn body_json(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.error_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body()).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[actix_web::test]
    async fn test_data_error_mapping() {
        let (status, body) = body_json(DataError::NotFound.into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "the requested resource could not be found");

        let (status, _) = body_json(DataError::EditConflict.into()).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = body_json(DataError::DuplicateEmail.into()).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["email"], "a user with this email address already exists");
    }

    #[actix_web::test]
    async fn test_internal_errors_are_opaque() {
        let (status, body) = body_json(DataError::Persistence("connection refused on 10.0.0.3".into()).into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], SERVER_ERROR_MESSAGE);
    }

    #[actix_web::test]
    async fn test_invalid_token_sets_www_authenticate() {
        let response = ApiError::InvalidAuthenticationToken.error_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers().get(WWW_AUTHENTICATE).unwrap(), "Bearer");
    }
}
