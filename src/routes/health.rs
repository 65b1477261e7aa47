use actix_web::{HttpResponse, get, web};

use crate::config::Config;
use crate::models::health::{HealthResponse, SystemInfo};

#[get("/healthcheck")]
pub async fn health_check(config: web::Data<Config>) -> HttpResponse {
    let response = HealthResponse {
        status: "available",
        system_info: SystemInfo {
            environment: config.env.clone(),
            version: env!("CARGO_PKG_VERSION"),
        },
    };

    HttpResponse::Ok().json(response)
}
