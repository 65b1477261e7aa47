mod config;
mod db;
mod mailer;
mod middleware;
mod migration;
mod models;
mod routes;
mod utils;

use actix_governor::{Governor, GovernorConfigBuilder};
use actix_web::middleware::{Condition, from_fn};
use actix_web::{App, HttpServer, web};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::mailer::Mailer;
use crate::middleware::recover_panic;
use crate::models::Models;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env().map_err(std::io::Error::other)?;

    tracing::info!(env = %config.env, "connecting to database");
    let db = db::establish_connection(&config.database)
        .await
        .map_err(std::io::Error::other)?;

    let models = web::Data::new(Models::new(db));
    let mailer = web::Data::new(Mailer::new(config.mail_sender.clone()));
    let port = config.port;

    let limiter_enabled = config.limiter.enabled;
    let limiter = GovernorConfigBuilder::default()
        .period(config.limiter.period())
        .burst_size(config.limiter.burst)
        .finish()
        .ok_or_else(|| std::io::Error::other("invalid rate limiter settings"))?;
    tracing::info!(
        enabled = limiter_enabled,
        rps = config.limiter.rps,
        burst = config.limiter.burst,
        "rate limiter configured"
    );

    let config = web::Data::new(config);

    tracing::info!(port, "starting server");

    HttpServer::new(move || {
        App::new()
            .app_data(models.clone())
            .app_data(mailer.clone())
            .app_data(config.clone())
            .configure(routes::configure_routes)
            .wrap(Condition::new(limiter_enabled, Governor::new(&limiter)))
            .wrap(from_fn(recover_panic))
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
