use actix_web::http::header::LOCATION;
use actix_web::{HttpRequest, HttpResponse, delete, get, patch, post, web};
use serde::Deserialize;
use serde_json::json;

use crate::middleware::require_permission;
use crate::models::Models;
use crate::models::filters::{Filters, validate_filters};
use crate::models::permissions::{REPLAYS_READ, REPLAYS_WRITE};
use crate::models::replays::{Replay, validate_replay};
use crate::models::runtime::Runtime;
use crate::models::users::Subject;
use crate::routes::errors::ApiError;
use crate::utils::validator::Validator;

const EXPECTED_VERSION_HEADER: &str = "X-Expected-Version";

#[derive(Debug, Default, Deserialize)]
pub struct ListReplaysQuery {
    title: Option<String>,
    heroes: Option<String>,
    page: Option<String>,
    page_size: Option<String>,
    sort: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CreateReplayRequest {
    title: String,
    year: i32,
    runtime: Runtime,
    heroes: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpdateReplayRequest {
    title: Option<String>,
    year: Option<i32>,
    runtime: Option<Runtime>,
    heroes: Option<Vec<String>>,
}

/// Identifiant de chemin: non numérique ou < 1 donne 404
fn parse_id(raw: &str) -> Result<i64, ApiError> {
    match raw.parse::<i64>() {
        Ok(id) if id >= 1 => Ok(id),
        _ => Err(ApiError::NotFound),
    }
}

fn read_int(v: &mut Validator, raw: Option<&str>, field: &str, default: u64) -> u64 {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => default,
        Some(value) => match value.parse::<i64>() {
            // négatif: laissé à 0 pour "must be greater than zero"
            Ok(n) => u64::try_from(n).unwrap_or(0),
            Err(_) => {
                v.add_error(field, "must be an integer value");
                default
            }
        },
    }
}

fn read_csv(raw: Option<&str>) -> Vec<String> {
    raw.map(|csv| {
        csv.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

#[get("/replays")]
pub async fn list_replays(
    models: web::Data<Models>,
    subject: Subject,
    query: web::Query<ListReplaysQuery>,
) -> Result<HttpResponse, ApiError> {
    require_permission(&models, &subject, REPLAYS_READ).await?;

    let query = query.into_inner();
    let mut v = Validator::new();

    let title = query.title.unwrap_or_default();
    let heroes = read_csv(query.heroes.as_deref());
    let filters = Filters::new(
        read_int(&mut v, query.page.as_deref(), "page", 1),
        read_int(&mut v, query.page_size.as_deref(), "page_size", 20),
        query.sort.unwrap_or_else(|| "id".to_string()),
    );

    validate_filters(&mut v, &filters);
    if !v.valid() {
        return Err(ApiError::Validation(v.into_errors()));
    }

    let (replays, metadata) = models.replays.get_all(&title, &heroes, &filters).await?;
    Ok(HttpResponse::Ok().json(json!({ "replays": replays, "metadata": metadata })))
}

#[post("/replays")]
pub async fn create_replay(
    models: web::Data<Models>,
    subject: Subject,
    request: web::Json<CreateReplayRequest>,
) -> Result<HttpResponse, ApiError> {
    require_permission(&models, &subject, REPLAYS_WRITE).await?;

    let request = request.into_inner();
    let mut replay = Replay {
        title: request.title,
        year: request.year,
        runtime: request.runtime,
        heroes: request.heroes,
        ..Default::default()
    };

    let mut v = Validator::new();
    validate_replay(&mut v, &replay);
    if !v.valid() {
        return Err(ApiError::Validation(v.into_errors()));
    }

    models.replays.insert(&mut replay).await?;
    tracing::info!(replay_id = replay.id, "replay created");

    Ok(HttpResponse::Created()
        .insert_header((LOCATION, format!("/v1/replays/{}", replay.id)))
        .json(json!({ "replay": replay })))
}

#[get("/replays/{id}")]
pub async fn show_replay(
    models: web::Data<Models>,
    subject: Subject,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    require_permission(&models, &subject, REPLAYS_READ).await?;

    let id = parse_id(&path)?;
    let replay = models.replays.get(id).await?;
    Ok(HttpResponse::Ok().json(json!({ "replay": replay })))
}

/// Mise à jour partielle: seuls les champs présents sont remplacés.
/// `X-Expected-Version`, si fourni, doit correspondre à la version lue.
#[patch("/replays/{id}")]
pub async fn update_replay(
    req: HttpRequest,
    models: web::Data<Models>,
    subject: Subject,
    path: web::Path<String>,
    request: web::Json<UpdateReplayRequest>,
) -> Result<HttpResponse, ApiError> {
    require_permission(&models, &subject, REPLAYS_WRITE).await?;

    let id = parse_id(&path)?;
    let mut replay = models.replays.get(id).await?;

    if let Some(expected) = req.headers().get(EXPECTED_VERSION_HEADER) {
        if expected.to_str().ok() != Some(replay.version.to_string().as_str()) {
            return Err(ApiError::EditConflict);
        }
    }

    let request = request.into_inner();
    if let Some(title) = request.title {
        replay.title = title;
    }
    if let Some(year) = request.year {
        replay.year = year;
    }
    if let Some(runtime) = request.runtime {
        replay.runtime = runtime;
    }
    if let Some(heroes) = request.heroes {
        replay.heroes = heroes;
    }

    let mut v = Validator::new();
    validate_replay(&mut v, &replay);
    if !v.valid() {
        return Err(ApiError::Validation(v.into_errors()));
    }

    models.replays.update(&mut replay).await?;
    Ok(HttpResponse::Ok().json(json!({ "replay": replay })))
}

#[delete("/replays/{id}")]
pub async fn delete_replay(
    models: web::Data<Models>,
    subject: Subject,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    require_permission(&models, &subject, REPLAYS_WRITE).await?;

    let id = parse_id(&path)?;
    models.replays.delete(id).await?;
    tracing::info!(replay_id = id, "replay deleted");

    Ok(HttpResponse::Ok().json(json!({ "message": "replay successfully deleted" })))
}
