use sea_orm::Order;
use serde::Serialize;

use crate::models::DataError;
use crate::utils::validator::{Validator, permitted_value};

/// Clés de tri acceptées pour la liste des replays.
/// Un `-` en tête demande l'ordre décroissant.
pub const REPLAY_SORT_SAFELIST: &[&str] = &[
    "id", "title", "year", "runtime", "-id", "-title", "-year", "-runtime",
];

/// Colonnes triables: la seule source des noms interpolés dans ORDER BY
const SORT_COLUMNS: &[(&str, &str)] = &[
    ("id", "id"),
    ("title", "title"),
    ("year", "year"),
    ("runtime", "runtime"),
];

const MAX_PAGE: u64 = 10_000_000;
const MAX_PAGE_SIZE: u64 = 100;

#[derive(Debug, Clone)]
pub struct Filters {
    pub page: u64,
    pub page_size: u64,
    pub sort: String,
    pub sort_safelist: &'static [&'static str],
}

impl Filters {
    pub fn new(page: u64, page_size: u64, sort: impl Into<String>) -> Self {
        Self {
            page,
            page_size,
            sort: sort.into(),
            sort_safelist: REPLAY_SORT_SAFELIST,
        }
    }

    /// Colonne SQL du tri. Refuse toute clé absente de la liste autorisée.
    pub fn sort_column(&self) -> Result<&'static str, DataError> {
        if !permitted_value(&self.sort.as_str(), self.sort_safelist) {
            return Err(DataError::UnsafeSort(self.sort.clone()));
        }

        let key = self.sort.trim_start_matches('-');
        SORT_COLUMNS
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, column)| *column)
            .ok_or_else(|| DataError::UnsafeSort(self.sort.clone()))
    }

    pub fn sort_direction(&self) -> Order {
        if self.sort.starts_with('-') {
            Order::Desc
        } else {
            Order::Asc
        }
    }

    pub fn limit(&self) -> u64 {
        self.page_size
    }

    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.page_size)
    }
}

impl Default for Filters {
    fn default() -> Self {
        Self::new(1, 20, "id")
    }
}

pub fn validate_filters(v: &mut Validator, filters: &Filters) {
    v.check(filters.page > 0, "page", "must be greater than zero");
    v.check(filters.page <= MAX_PAGE, "page", "must be a maximum of 10 million");
    v.check(filters.page_size > 0, "page_size", "must be greater than zero");
    v.check(filters.page_size <= MAX_PAGE_SIZE, "page_size", "must be a maximum of 100");
    v.check(
        permitted_value(&filters.sort.as_str(), filters.sort_safelist),
        "sort",
        "invalid sort value",
    );
}

/// Métadonnées de pagination d'une liste.
/// Tous les champs restent à zéro (et sont omis en JSON) quand rien ne correspond.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    #[serde(skip_serializing_if = "is_zero")]
    pub current_page: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub page_size: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub first_page: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub last_page: u64,
    #[serde(skip_serializing_if = "is_zero")]
    pub total_records: u64,
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}

pub fn calculate_metadata(total_records: u64, page: u64, page_size: u64) -> Metadata {
    if total_records == 0 || page_size == 0 {
        return Metadata::default();
    }

    Metadata {
        current_page: page,
        page_size,
        first_page: 1,
        last_page: total_records.div_ceil(page_size),
        total_records,
    }
}
