use std::any::Any;
use std::panic::AssertUnwindSafe;

use actix_web::body::MessageBody;
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::http::header::{CONNECTION, HeaderValue};
use actix_web::middleware::Next;
use actix_web::{Error, ResponseError};
use futures::FutureExt;

use crate::routes::errors::ApiError;

/// Transforme la panique d'un handler en 500 opaque.
///
/// La connexion est fermée après la réponse: l'état de la requête qui a
/// paniqué n'est plus fiable.
pub async fn recover_panic(
    req: ServiceRequest,
    next: Next<impl MessageBody + 'static>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    let http_req = req.request().clone();

    match AssertUnwindSafe(next.call(req)).catch_unwind().await {
        Ok(res) => res.map(ServiceResponse::map_into_left_body),
        Err(payload) => {
            let detail = format!(
                "panic while serving {}: {}",
                http_req.path(),
                panic_message(payload.as_ref())
            );
            let mut resp = ApiError::Internal(detail).error_response();
            resp.headers_mut().insert(CONNECTION, HeaderValue::from_static("close"));
            Ok(ServiceResponse::new(http_req, resp).map_into_right_body())
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}
