//! Data behind the read routes
//!
//! The server reads statistics through the [`DataSource`] trait. The
//! shipped implementation, [`FileDataSource`], serves a JSON dataset:
//!
//! ```json
//! {
//!   "country": { "details": {...}, "crime_history": [...] },
//!   "departements": { "75": { "details": {...}, "contacts": {...} } }
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::{Error, Result};

/// Something statistics are published for
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Entity {
    /// The whole country
    Country,
    /// One department, by code
    Department(String),
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Country => f.write_str("country"),
            Self::Department(code) => write!(f, "dept:{code}"),
        }
    }
}

/// Dataset families served per entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    /// Population and area
    Details,
    /// Yearly crime series
    CrimeHistory,
    /// Yearly first-name series (the NAT1 family)
    NamesHistory,
    /// Latest crime figures
    CrimeCurrent,
    /// Latest first-name figures (the NAT1 family)
    NamesCurrent,
    /// Administrative contacts, departments only
    Contacts,
}

impl DataKind {
    /// Every kind, in warm-up order
    pub const ALL: [Self; 6] = [
        Self::Details,
        Self::CrimeHistory,
        Self::NamesHistory,
        Self::CrimeCurrent,
        Self::NamesCurrent,
        Self::Contacts,
    ];

    /// Stable identifier, also the dataset field name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Details => "details",
            Self::CrimeHistory => "crime_history",
            Self::NamesHistory => "names_history",
            Self::CrimeCurrent => "crime_current",
            Self::NamesCurrent => "names_current",
            Self::Contacts => "contacts",
        }
    }

    /// Route segment(s) under the entity path
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Details => "details",
            Self::CrimeHistory => "crime/history",
            Self::NamesHistory => "names/history",
            Self::CrimeCurrent => "crime/current",
            Self::NamesCurrent => "names/current",
            Self::Contacts => "contacts",
        }
    }

    /// Parse a route path such as `crime/history`
    #[must_use]
    pub fn from_path(path: &str) -> Option<Self> {
        let path = path.trim_matches('/');
        Self::ALL.into_iter().find(|kind| kind.path() == path)
    }

    /// Kinds published for `entity`
    #[must_use]
    pub fn for_entity(entity: &Entity) -> Vec<Self> {
        Self::ALL
            .into_iter()
            .filter(|kind| matches!(entity, Entity::Department(_)) || *kind != Self::Contacts)
            .collect()
    }

    /// Whether this is a "current" snapshot rather than a long-lived series
    #[must_use]
    pub const fn is_snapshot(self) -> bool {
        matches!(self, Self::CrimeCurrent | Self::NamesCurrent)
    }

    /// Whether a read-through miss re-populates the preload cache
    #[must_use]
    pub const fn caches_on_miss(self) -> bool {
        matches!(self, Self::NamesHistory | Self::NamesCurrent)
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read access to the statistics dataset
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Codes of every department present in the dataset, sorted
    async fn departments(&self) -> Result<Vec<String>>;

    /// Load one dataset family for one entity
    async fn load(&self, entity: &Entity, kind: DataKind) -> Result<Value>;
}

/// Deserialized dataset file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Dataset {
    /// Country-level families
    pub country: BTreeMap<DataKind, Value>,
    /// Department-level families, by department code
    pub departements: BTreeMap<String, BTreeMap<DataKind, Value>>,
}

/// [`DataSource`] over an in-memory [`Dataset`] loaded from JSON
#[derive(Debug, Clone, Default)]
pub struct FileDataSource {
    dataset: Dataset,
}

impl FileDataSource {
    /// Wrap an already-parsed dataset
    #[must_use]
    pub fn new(dataset: Dataset) -> Self {
        Self { dataset }
    }

    /// Read and parse a dataset file
    pub async fn open(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            Error::Config(format!("Cannot read dataset {}: {e}", path.display()))
        })?;
        let dataset: Dataset = serde_json::from_slice(&bytes)?;
        info!(
            path = %path.display(),
            departments = dataset.departements.len(),
            "Dataset loaded"
        );
        Ok(Self::new(dataset))
    }
}

#[async_trait]
impl DataSource for FileDataSource {
    async fn departments(&self) -> Result<Vec<String>> {
        Ok(self.dataset.departements.keys().cloned().collect())
    }

    async fn load(&self, entity: &Entity, kind: DataKind) -> Result<Value> {
        let families = match entity {
            Entity::Country => Some(&self.dataset.country),
            Entity::Department(code) => self.dataset.departements.get(code),
        };
        families
            .and_then(|families| families.get(&kind))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("{kind} for {entity}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn source() -> FileDataSource {
        let dataset: Dataset = serde_json::from_value(json!({
            "country": {"details": {"population": 68_000_000}},
            "departements": {
                "75": {"details": {"dep": "75"}, "contacts": {"prefecture": "Paris"}},
                "13": {"details": {"dep": "13"}}
            }
        }))
        .expect("dataset");
        FileDataSource::new(dataset)
    }

    #[test]
    fn kinds_round_trip_through_paths() {
        for kind in DataKind::ALL {
            assert_eq!(DataKind::from_path(kind.path()), Some(kind));
        }
        assert_eq!(DataKind::from_path("/crime/history/"), Some(DataKind::CrimeHistory));
        assert_eq!(DataKind::from_path("crime"), None);
    }

    #[test]
    fn country_has_no_contacts() {
        assert!(!DataKind::for_entity(&Entity::Country).contains(&DataKind::Contacts));
        assert_eq!(DataKind::for_entity(&Entity::Department("75".into())).len(), 6);
    }

    #[test]
    fn only_names_family_caches_on_miss() {
        let caching: Vec<_> = DataKind::ALL
            .into_iter()
            .filter(|k| k.caches_on_miss())
            .collect();
        assert_eq!(caching, vec![DataKind::NamesHistory, DataKind::NamesCurrent]);
    }

    #[test]
    fn entity_display() {
        assert_eq!(Entity::Country.to_string(), "country");
        assert_eq!(Entity::Department("2A".into()).to_string(), "dept:2A");
    }

    #[tokio::test]
    async fn departments_are_sorted() {
        assert_eq!(source().departments().await.expect("list"), vec!["13", "75"]);
    }

    #[tokio::test]
    async fn load_finds_and_misses() {
        let source = source();
        assert_eq!(
            source
                .load(&Entity::Department("75".into()), DataKind::Contacts)
                .await
                .expect("present"),
            json!({"prefecture": "Paris"})
        );

        let err = source
            .load(&Entity::Department("99".into()), DataKind::Details)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn open_reports_missing_file() {
        let err = FileDataSource::open(Path::new("/nonexistent/dataset.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
