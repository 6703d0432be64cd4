use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::cache::MemoCache;
use crate::client::{JsonFetcher, fetch_all_values};
use crate::error::OdataError;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DatasetInfo {
    pub identifier: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub catalog: Option<String>,
    #[serde(default)]
    pub modified: Option<String>,
    #[serde(default)]
    pub observations_modified: Option<String>,
    #[serde(default)]
    pub observation_count: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DatasetInfo {
    pub fn modified_at(&self) -> Option<DateTime<FixedOffset>> {
        self.modified.as_deref().and_then(parse_timestamp)
    }

    pub fn observations_modified_at(&self) -> Option<DateTime<FixedOffset>> {
        self.observations_modified
            .as_deref()
            .and_then(parse_timestamp)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CatalogInfo {
    pub identifier: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn parse_timestamp(value: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(value).ok().or_else(|| {
        NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc().fixed_offset())
    })
}

fn decode<T: for<'de> Deserialize<'de>>(values: Vec<Value>, what: &str) -> Result<Vec<T>, OdataError> {
    values
        .into_iter()
        .map(|value| {
            serde_json::from_value(value).map_err(|err| OdataError::Json(format!("{what}: {err}")))
        })
        .collect()
}

pub fn fetch_datasets(
    fetcher: &dyn JsonFetcher,
    base_url: &str,
) -> Result<Vec<DatasetInfo>, OdataError> {
    let values = fetch_all_values(fetcher, &format!("{}/Datasets", base_url.trim_end_matches('/')))?;
    decode(values, "Datasets")
}

pub fn fetch_catalogs(
    fetcher: &dyn JsonFetcher,
    base_url: &str,
) -> Result<Vec<CatalogInfo>, OdataError> {
    let values = fetch_all_values(fetcher, &format!("{}/Catalogs", base_url.trim_end_matches('/')))?;
    decode(values, "Catalogs")
}

#[derive(Debug, Default)]
pub struct DatasetIndex {
    entries: MemoCache<String, Vec<DatasetInfo>>,
}

impl DatasetIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn datasets(
        &self,
        fetcher: &dyn JsonFetcher,
        base_url: &str,
        catalog: Option<&str>,
    ) -> Result<Vec<DatasetInfo>, OdataError> {
        let all = self
            .entries
            .get_or_try_insert_with(base_url.to_string(), || fetch_datasets(fetcher, base_url))?;
        Ok(all
            .iter()
            .filter(|info| catalog.is_none() || info.catalog.as_deref() == catalog)
            .cloned()
            .collect())
    }

    pub fn contains(
        &self,
        fetcher: &dyn JsonFetcher,
        base_url: &str,
        catalog: &str,
        id: &str,
    ) -> Result<bool, OdataError> {
        Ok(self
            .datasets(fetcher, base_url, Some(catalog))?
            .iter()
            .any(|info| info.identifier == id))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_timestamps_with_and_without_offset() {
        let info: DatasetInfo = serde_json::from_value(json!({
            "Identifier": "81575NED",
            "Modified": "2024-03-01T02:00:00+01:00",
            "ObservationsModified": "2024-03-01T01:00:00",
            "Status": "Regulier"
        }))
        .unwrap();
        assert_eq!(info.modified_at(), info.observations_modified_at());
        assert_eq!(info.extra.get("Status"), Some(&json!("Regulier")));
    }

    #[test]
    fn garbage_timestamp_is_absent() {
        assert_eq!(parse_timestamp("yesterday"), None);
    }
}
