// ============================================================================
// MODÈLE : REPLAYS
// ============================================================================
//
// Colonnes de la table replays:
//   - id (BIGINT, PRIMARY KEY, auto-incrément)
//   - created_at (TIMESTAMPTZ, NOT NULL) - assigné par le store
//   - title (TEXT, NOT NULL)
//   - year (INTEGER, NOT NULL, >= 2011)
//   - runtime (INTEGER, NOT NULL, minutes)
//   - heroes (TEXT, NOT NULL) - tableau JSON de 10 héros
//   - version (INTEGER, NOT NULL, DEFAULT 1)
//
// Points d'attention:
//   - version n'est jamais fournie par le client: elle sert uniquement au
//     verrouillage optimiste (UPDATE ... WHERE id = ? AND version = ?)
//   - aucune relecture/retry interne: un EditConflict remonte à l'appelant
//   - get_all renvoie la page ET le total filtré en une seule requête
//
// ============================================================================

use chrono::{DateTime, Datelike, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveValue::NotSet, DatabaseBackend, DatabaseConnection, FromQueryResult, Order, Set,
    Statement, Value,
};
use serde::Serialize;

use crate::db::with_timeout;
use crate::models::DataError;
use crate::models::filters::{Filters, Metadata, calculate_metadata};
use crate::models::runtime::Runtime;
use crate::utils::validator::{Validator, unique};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "replays")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub created_at: DateTimeUtc,
    pub title: String,
    pub year: i32,
    pub runtime: i32,
    #[sea_orm(column_type = "Text")]
    pub heroes: String,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Replay tel qu'exposé par l'API
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Replay {
    pub id: i64,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
    pub title: String,
    #[serde(skip_serializing_if = "is_zero_year")]
    pub year: i32,
    #[serde(skip_serializing_if = "Runtime::is_zero")]
    pub runtime: Runtime,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub heroes: Vec<String>,
    pub version: i32,
}

fn is_zero_year(year: &i32) -> bool {
    *year == 0
}

/// Une colonne heroes illisible est une panne de stockage, pas une liste vide
impl TryFrom<Model> for Replay {
    type Error = DataError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let heroes = serde_json::from_str(&model.heroes).map_err(|e| {
            DataError::Persistence(format!("replay {}: unreadable heroes column: {e}", model.id))
        })?;

        Ok(Self {
            id: model.id,
            created_at: model.created_at,
            title: model.title,
            year: model.year,
            runtime: Runtime(model.runtime),
            heroes,
            version: model.version,
        })
    }
}

fn heroes_json(heroes: &[String]) -> String {
    serde_json::to_string(heroes).unwrap_or_else(|_| "[]".to_string())
}

pub fn validate_replay(v: &mut Validator, replay: &Replay) {
    v.check(!replay.title.is_empty(), "title", "must be provided");
    v.check(replay.title.len() <= 500, "title", "must not be more than 500 bytes long");

    v.check(replay.year != 0, "year", "must be provided");
    v.check(replay.year >= 2011, "year", "must be greater than 2011");
    v.check(replay.year <= Utc::now().year(), "year", "must not be in the future");

    v.check(!replay.runtime.is_zero(), "runtime", "must be provided");
    v.check(replay.runtime.minutes() > 0, "runtime", "must be a positive integer");

    v.check(!replay.heroes.is_empty(), "heroes", "must be provided");
    v.check(replay.heroes.len() == 10, "heroes", "must contain 10 heroes");
    v.check(unique(&replay.heroes), "heroes", "must not contain duplicate values");
}

/// Ligne de `get_all`: une page de replays jointe au total filtré.
/// Les colonnes du replay sont nulles quand la page est vide.
#[derive(Debug, FromQueryResult)]
struct ReplayPageRow {
    total_records: i64,
    id: Option<i64>,
    created_at: Option<DateTime<Utc>>,
    title: Option<String>,
    year: Option<i32>,
    runtime: Option<i32>,
    heroes: Option<String>,
    version: Option<i32>,
}

impl ReplayPageRow {
    /// `None` pour la ligne sans replay d'une page vide
    fn into_model(self) -> Option<Model> {
        Some(Model {
            id: self.id?,
            created_at: self.created_at?,
            title: self.title?,
            year: self.year?,
            runtime: self.runtime?,
            heroes: self.heroes?,
            version: self.version?,
        })
    }
}

/// Paramètres liés d'une requête SQL brute, numérotés selon le backend
struct SqlParams {
    backend: DatabaseBackend,
    values: Vec<Value>,
}

impl SqlParams {
    fn new(backend: DatabaseBackend) -> Self {
        Self {
            backend,
            values: Vec::new(),
        }
    }

    fn bind(&mut self, value: impl Into<Value>) -> String {
        self.values.push(value.into());
        match self.backend {
            DatabaseBackend::Postgres => format!("${}", self.values.len()),
            _ => "?".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct ReplayModel {
    db: DatabaseConnection,
}

impl ReplayModel {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Insère le replay et lui assigne id, created_at et version
    pub async fn insert(&self, replay: &mut Replay) -> Result<(), DataError> {
        let new_replay = ActiveModel {
            id: NotSet,
            created_at: Set(Utc::now()),
            title: Set(replay.title.clone()),
            year: Set(replay.year),
            runtime: Set(replay.runtime.minutes()),
            heroes: Set(heroes_json(&replay.heroes)),
            version: Set(1),
        };

        let inserted = with_timeout(async { Ok(new_replay.insert(&self.db).await?) }).await?;

        replay.id = inserted.id;
        replay.created_at = inserted.created_at;
        replay.version = inserted.version;
        Ok(())
    }

    pub async fn get(&self, id: i64) -> Result<Replay, DataError> {
        if id < 1 {
            return Err(DataError::NotFound);
        }

        let found = with_timeout(async { Ok(Entity::find_by_id(id).one(&self.db).await?) }).await?;
        found.ok_or(DataError::NotFound)?.try_into()
    }

    /// Écriture conditionnelle sur (id, version).
    ///
    /// Zéro ligne modifiée signifie qu'un autre écrivain a déjà incrémenté la
    /// version (ou que le replay a disparu): `EditConflict`. En cas de succès
    /// `replay.version` porte la nouvelle version.
    pub async fn update(&self, replay: &mut Replay) -> Result<(), DataError> {
        let result = with_timeout(async {
            Ok(Entity::update_many()
                .col_expr(Column::Title, Expr::value(replay.title.clone()))
                .col_expr(Column::Year, Expr::value(replay.year))
                .col_expr(Column::Runtime, Expr::value(replay.runtime.minutes()))
                .col_expr(Column::Heroes, Expr::value(heroes_json(&replay.heroes)))
                .col_expr(Column::Version, Expr::col(Column::Version).add(1))
                .filter(Column::Id.eq(replay.id))
                .filter(Column::Version.eq(replay.version))
                .exec(&self.db)
                .await?)
        })
        .await?;

        if result.rows_affected == 0 {
            return Err(DataError::EditConflict);
        }

        replay.version += 1;
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> Result<(), DataError> {
        if id < 1 {
            return Err(DataError::NotFound);
        }

        let result = with_timeout(async { Ok(Entity::delete_by_id(id).exec(&self.db).await?) }).await?;

        if result.rows_affected == 0 {
            return Err(DataError::NotFound);
        }
        Ok(())
    }

    /// Liste filtrée, triée et paginée, avec les métadonnées de pagination.
    ///
    /// - `title` vide: pas de filtre; sinon recherche plein texte sur le titre
    ///   (un titre sans aucun mot ne correspond à rien)
    /// - `heroes` vide: pas de filtre; sinon le replay doit contenir tous ces héros
    /// - tri par la colonne validée puis `id ASC` pour une pagination stable
    ///
    /// Le total est calculé dans une table dérivée jointe à la page: une page
    /// au-delà de la dernière renvoie zéro replay mais le bon total.
    pub async fn get_all(
        &self,
        title: &str,
        heroes: &[String],
        filters: &Filters,
    ) -> Result<(Vec<Replay>, Metadata), DataError> {
        let statement = list_statement(self.db.get_database_backend(), title, heroes, filters)?;

        let rows = with_timeout(async {
            Ok(ReplayPageRow::find_by_statement(statement)
                .all(&self.db)
                .await?)
        })
        .await?;

        let total_records = rows
            .first()
            .map(|row| u64::try_from(row.total_records).unwrap_or(0))
            .unwrap_or(0);
        let replays = rows
            .into_iter()
            .filter_map(ReplayPageRow::into_model)
            .map(Replay::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let metadata = calculate_metadata(total_records, filters.page, filters.page_size);
        Ok((replays, metadata))
    }
}

/// Construit la clause WHERE des filtres titre/héros.
/// Appelée deux fois (total et page): chaque appel lie ses propres paramètres.
fn filter_clause(params: &mut SqlParams, title: &str, heroes: &[String]) -> String {
    let mut conditions = vec!["1 = 1".to_string()];

    if !title.is_empty() {
        match params.backend {
            DatabaseBackend::Postgres => {
                let p = params.bind(title.to_string());
                conditions.push(format!(
                    "to_tsvector('simple', title) @@ plainto_tsquery('simple', {p})"
                ));
            }
            _ => {
                // sans plein texte: chaque mot doit apparaître dans le titre.
                // Un filtre sans aucun mot ne correspond à rien, comme plainto_tsquery.
                let words = title_words(title);
                if words.is_empty() {
                    conditions.push("1 = 0".to_string());
                }
                for word in words {
                    let p = params.bind(format!("%{word}%"));
                    conditions.push(format!("lower(title) LIKE {p}"));
                }
            }
        }
    }

    if !heroes.is_empty() {
        match params.backend {
            DatabaseBackend::Postgres => {
                let p = params.bind(heroes_json(heroes));
                conditions.push(format!("CAST(heroes AS jsonb) @> CAST({p} AS jsonb)"));
            }
            _ => {
                for hero in heroes {
                    let p = params.bind(hero.clone());
                    conditions.push(format!(
                        "EXISTS (SELECT 1 FROM json_each(replays.heroes) WHERE json_each.value = {p})"
                    ));
                }
            }
        }
    }

    conditions.join(" AND ")
}

/// Mots en minuscules du filtre titre, sans ponctuation (donc sans joker LIKE)
fn title_words(title: &str) -> Vec<String> {
    title
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn list_statement(
    backend: DatabaseBackend,
    title: &str,
    heroes: &[String],
    filters: &Filters,
) -> Result<Statement, DataError> {
    let column = filters.sort_column()?;
    let direction = match filters.sort_direction() {
        Order::Desc => "DESC",
        _ => "ASC",
    };
    let limit = i64::try_from(filters.limit()).map_err(|_| DataError::Persistence("page size out of range".into()))?;
    let offset = i64::try_from(filters.offset()).map_err(|_| DataError::Persistence("page out of range".into()))?;

    let mut params = SqlParams::new(backend);
    let count_where = filter_clause(&mut params, title, heroes);
    let page_where = filter_clause(&mut params, title, heroes);
    let limit_p = params.bind(limit);
    let offset_p = params.bind(offset);

    let sql = format!(
        "SELECT totals.total_records, page.id, page.created_at, page.title, page.year, \
                page.runtime, page.heroes, page.version \
         FROM (SELECT count(*) AS total_records FROM replays WHERE {count_where}) AS totals \
         LEFT JOIN ( \
             SELECT id, created_at, title, year, runtime, heroes, version \
             FROM replays \
             WHERE {page_where} \
             ORDER BY {column} {direction}, id ASC \
             LIMIT {limit_p} OFFSET {offset_p} \
         ) AS page ON 1 = 1 \
         ORDER BY page.{column} {direction}, page.id ASC"
    );

    Ok(Statement::from_sql_and_values(backend, sql, params.values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_connection;

    fn heroes(names: &[&str]) -> Vec<String> {
        names.iter().map(|h| String::from(*h)).collect()
    }

    fn ten_heroes(first: &str) -> Vec<String> {
        let mut list = vec![first.to_string()];
        list.extend((1..10).map(|i| format!("hero-{i}")));
        list
    }

    fn sample_replay(title: &str) -> Replay {
        Replay {
            title: title.to_string(),
            year: 2019,
            runtime: Runtime(45),
            heroes: ten_heroes("axe"),
            ..Default::default()
        }
    }

    async fn setup() -> ReplayModel {
        ReplayModel::new(test_connection().await)
    }

    #[test]
    fn test_validate_replay_ok() {
        let mut v = Validator::new();
        validate_replay(&mut v, &sample_replay("TI9 Grand Final"));
        assert!(v.valid(), "{:?}", v.errors());
    }

    #[test]
    fn test_validate_replay_reports_first_violation_per_field() {
        let mut v = Validator::new();
        validate_replay(&mut v, &Replay::default());

        let errors = v.into_errors();
        assert_eq!(errors["title"], "must be provided");
        assert_eq!(errors["year"], "must be provided");
        assert_eq!(errors["runtime"], "must be provided");
        assert_eq!(errors["heroes"], "must be provided");
    }

    #[test]
    fn test_validate_replay_domain_bounds() {
        let mut replay = sample_replay(&"x".repeat(501));
        replay.year = 2010;
        replay.runtime = Runtime(-3);
        replay.heroes = heroes(&["axe", "axe"]);

        let mut v = Validator::new();
        validate_replay(&mut v, &replay);
        let errors = v.into_errors();
        assert_eq!(errors["title"], "must not be more than 500 bytes long");
        assert_eq!(errors["year"], "must be greater than 2011");
        assert_eq!(errors["runtime"], "must be a positive integer");
        assert_eq!(errors["heroes"], "must contain 10 heroes");

        let mut replay = sample_replay("future");
        replay.year = Utc::now().year() + 1;
        replay.heroes[1] = "axe".to_string();
        let mut v = Validator::new();
        validate_replay(&mut v, &replay);
        assert_eq!(v.errors()["year"], "must not be in the future");
        assert_eq!(v.errors()["heroes"], "must not contain duplicate values");
    }

    #[tokio::test]
    async fn test_insert_then_get() {
        let model = setup().await;

        let mut replay = sample_replay("TI9 Grand Final");
        model.insert(&mut replay).await.unwrap();
        assert!(replay.id > 0);
        assert_eq!(replay.version, 1);

        let fetched = model.get(replay.id).await.unwrap();
        assert_eq!(fetched.title, replay.title);
        assert_eq!(fetched.year, replay.year);
        assert_eq!(fetched.runtime, replay.runtime);
        assert_eq!(fetched.heroes, replay.heroes);
        assert_eq!(fetched.version, 1);
    }

    #[tokio::test]
    async fn test_get_invalid_or_missing_id() {
        let model = setup().await;
        assert!(matches!(model.get(0).await, Err(DataError::NotFound)));
        assert!(matches!(model.get(-7).await, Err(DataError::NotFound)));
        assert!(matches!(model.get(999).await, Err(DataError::NotFound)));
    }

    #[tokio::test]
    async fn test_update_increments_version() {
        let model = setup().await;
        let mut replay = sample_replay("before");
        model.insert(&mut replay).await.unwrap();

        replay.title = "after".to_string();
        model.update(&mut replay).await.unwrap();
        assert_eq!(replay.version, 2);

        let fetched = model.get(replay.id).await.unwrap();
        assert_eq!(fetched.title, "after");
        assert_eq!(fetched.version, 2);
    }

    #[tokio::test]
    async fn test_concurrent_updates_exactly_one_wins() {
        let model = setup().await;
        let mut replay = sample_replay("contended");
        model.insert(&mut replay).await.unwrap();

        // deux lecteurs de la même version
        let mut first = model.get(replay.id).await.unwrap();
        let mut second = model.get(replay.id).await.unwrap();
        first.title = "first writer".to_string();
        second.title = "second writer".to_string();

        let (a, b) = tokio::join!(model.update(&mut first), model.update(&mut second));

        let outcomes = [a.is_ok(), b.is_ok()];
        assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
        let loser = if a.is_err() { a } else { b };
        assert!(matches!(loser, Err(DataError::EditConflict)));

        let stored = model.get(replay.id).await.unwrap();
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn test_stale_version_is_edit_conflict() {
        let model = setup().await;
        let mut replay = sample_replay("stale");
        model.insert(&mut replay).await.unwrap();

        let mut stale = replay.clone();
        model.update(&mut replay).await.unwrap();

        stale.title = "too late".to_string();
        assert!(matches!(model.update(&mut stale).await, Err(DataError::EditConflict)));
        assert_eq!(stale.version, 1);
    }

    #[tokio::test]
    async fn test_delete_twice() {
        let model = setup().await;
        let mut replay = sample_replay("doomed");
        model.insert(&mut replay).await.unwrap();

        model.delete(replay.id).await.unwrap();
        assert!(matches!(model.delete(replay.id).await, Err(DataError::NotFound)));
        assert!(matches!(model.get(replay.id).await, Err(DataError::NotFound)));
    }

    #[tokio::test]
    async fn test_delete_never_inserted_or_invalid() {
        let model = setup().await;
        assert!(matches!(model.delete(42).await, Err(DataError::NotFound)));
        assert!(matches!(model.delete(0).await, Err(DataError::NotFound)));
    }

    #[tokio::test]
    async fn test_get_all_pagination() {
        let model = setup().await;
        for i in 0..45 {
            model.insert(&mut sample_replay(&format!("match {i}"))).await.unwrap();
        }

        let (page, metadata) = model.get_all("", &[], &Filters::new(1, 20, "id")).await.unwrap();
        assert_eq!(page.len(), 20);
        assert_eq!(metadata.last_page, 3);
        assert_eq!(metadata.total_records, 45);

        let (page, _) = model.get_all("", &[], &Filters::new(3, 20, "id")).await.unwrap();
        assert_eq!(page.len(), 5);

        let (page, metadata) = model.get_all("", &[], &Filters::new(4, 20, "id")).await.unwrap();
        assert!(page.is_empty());
        assert_eq!(metadata.last_page, 3);
        assert_eq!(metadata.current_page, 4);
    }

    #[tokio::test]
    async fn test_get_all_pages_are_disjoint_and_stable() {
        let model = setup().await;
        for _ in 0..7 {
            // même année partout: le tri secondaire par id départage
            model.insert(&mut sample_replay("same")).await.unwrap();
        }

        let filters = |page| Filters::new(page, 3, "-year");
        let (p1, _) = model.get_all("", &[], &filters(1)).await.unwrap();
        let (p2, _) = model.get_all("", &[], &filters(2)).await.unwrap();
        let (p1_again, _) = model.get_all("", &[], &filters(1)).await.unwrap();

        assert_eq!(p1, p1_again);
        let ids: Vec<i64> = p1.iter().chain(p2.iter()).map(|r| r.id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(ids, sorted);
    }

    #[tokio::test]
    async fn test_get_all_sorting() {
        let model = setup().await;
        for (title, year) in [("b", 2015), ("a", 2020), ("c", 2012)] {
            let mut replay = sample_replay(title);
            replay.year = year;
            model.insert(&mut replay).await.unwrap();
        }

        let (replays, _) = model.get_all("", &[], &Filters::new(1, 20, "-year")).await.unwrap();
        let years: Vec<i32> = replays.iter().map(|r| r.year).collect();
        assert_eq!(years, vec![2020, 2015, 2012]);

        let (replays, _) = model.get_all("", &[], &Filters::new(1, 20, "title")).await.unwrap();
        let titles: Vec<&str> = replays.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_get_all_heroes_superset() {
        let model = setup().await;
        let mut both = sample_replay("both");
        both.heroes[1] = "b".to_string();
        both.heroes[0] = "a".to_string();
        model.insert(&mut both).await.unwrap();

        let mut only_a = sample_replay("only a");
        only_a.heroes[0] = "a".to_string();
        model.insert(&mut only_a).await.unwrap();

        let (found, metadata) = model
            .get_all("", &heroes(&["a", "b"]), &Filters::default())
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, both.id);
        assert_eq!(metadata.total_records, 1);
        assert!(found.iter().all(|r| r.heroes.contains(&"a".to_string())
            && r.heroes.contains(&"b".to_string())));

        let (found, _) = model.get_all("", &[], &Filters::default()).await.unwrap();
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn test_get_all_title_filter() {
        let model = setup().await;
        model.insert(&mut sample_replay("The International Grand Final")).await.unwrap();
        model.insert(&mut sample_replay("Major qualifier")).await.unwrap();

        let (found, _) = model.get_all("grand final", &[], &Filters::default()).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "The International Grand Final");

        let (found, metadata) = model.get_all("nothing", &[], &Filters::default()).await.unwrap();
        assert!(found.is_empty());
        assert_eq!(metadata, Metadata::default());
    }

    #[tokio::test]
    async fn test_get_all_title_without_words_matches_nothing() {
        let model = setup().await;
        model.insert(&mut sample_replay("Grand Final")).await.unwrap();

        for title in ["!!!", "   ", "-"] {
            let (found, metadata) = model.get_all(title, &[], &Filters::default()).await.unwrap();
            assert!(found.is_empty(), "{title:?}");
            assert_eq!(metadata, Metadata::default());
        }
    }

    #[tokio::test]
    async fn test_unreadable_heroes_column_is_a_persistence_error() {
        let db = test_connection().await;
        let model = ReplayModel::new(db.clone());

        let corrupt = ActiveModel {
            id: NotSet,
            created_at: Set(Utc::now()),
            title: Set("Corrupt".to_string()),
            year: Set(2019),
            runtime: Set(45),
            heroes: Set("not json".to_string()),
            version: Set(1),
        }
        .insert(&db)
        .await
        .unwrap();

        assert!(matches!(model.get(corrupt.id).await, Err(DataError::Persistence(_))));
        assert!(matches!(
            model.get_all("", &[], &Filters::default()).await,
            Err(DataError::Persistence(_))
        ));
    }

    #[tokio::test]
    async fn test_get_all_refuses_unsafe_sort() {
        let model = setup().await;
        let result = model.get_all("", &[], &Filters::new(1, 20, "id; DROP TABLE replays")).await;
        assert!(matches!(result, Err(DataError::UnsafeSort(_))));
    }

    #[test]
    fn test_list_statement_postgres_placeholders() {
        let statement = list_statement(
            DatabaseBackend::Postgres,
            "grand final",
            &heroes(&["axe"]),
            &Filters::new(2, 10, "-runtime"),
        )
        .unwrap();

        assert!(statement.sql.contains("plainto_tsquery('simple', $1)"));
        assert!(statement.sql.contains("ORDER BY runtime DESC, id ASC"));
        assert!(statement.sql.contains("LIMIT $5 OFFSET $6"));
    }

    #[test]
    fn test_title_words() {
        assert_eq!(title_words("Grand-Final: TI9%"), vec!["grand", "final", "ti9"]);
        assert!(title_words("  ").is_empty());
    }
}
