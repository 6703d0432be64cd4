use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::cache::MemoCache;
use crate::client::{JsonFetcher, page_values};
use crate::error::OdataError;

pub const PROPERTIES: &str = "Properties";
pub const DIMENSIONS: &str = "Dimensions";
pub const MEASURE_CODES: &str = "MeasureCodes";
pub const MEASURE_COLUMN: &str = "Measure";
pub const TIME_DIMENSION_KIND: &str = "TimeDimension";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Dimension {
    pub identifier: String,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

impl Dimension {
    pub fn is_time(&self) -> bool {
        self.kind.as_deref() == Some(TIME_DIMENSION_KIND)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CodeRecord {
    identifier: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    unit: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeMapping {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl CodeMapping {
    pub fn get(&self, code: &str) -> Option<&str> {
        self.index
            .get(code)
            .map(|&position| self.entries[position].1.as_str())
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(code, _)| code.as_str())
    }

    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(_, text)| text.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(c, t)| (c.as_str(), t.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<C: Into<String>, T: Into<String>> FromIterator<(C, T)> for CodeMapping {
    fn from_iter<I: IntoIterator<Item = (C, T)>>(iter: I) -> Self {
        let mut mapping = CodeMapping::default();
        for (code, text) in iter {
            let code = code.into();
            if mapping.index.contains_key(&code) {
                continue;
            }
            mapping.index.insert(code.clone(), mapping.entries.len());
            mapping.entries.push((code, text.into()));
        }
        mapping
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    properties: Map<String, Value>,
    sections: BTreeMap<String, Vec<Value>>,
    dimensions: Vec<Dimension>,
    measure_titles: CodeMapping,
    measure_units: CodeMapping,
    labels: BTreeMap<String, CodeMapping>,
}

impl Metadata {
    pub fn from_sections(
        properties: Map<String, Value>,
        sections: BTreeMap<String, Vec<Value>>,
    ) -> Result<Self, OdataError> {
        let dimensions = match sections.get(DIMENSIONS) {
            Some(values) => values
                .iter()
                .map(|value| {
                    Dimension::deserialize(value)
                        .map_err(|err| OdataError::Json(format!("{DIMENSIONS}: {err}")))
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        let measure_records = code_records(&sections, MEASURE_CODES)?.unwrap_or_default();
        let measure_titles = titles(&measure_records);
        let measure_units = measure_records
            .iter()
            .filter_map(|record| {
                let unit = record.unit.as_deref()?.trim();
                (!unit.is_empty()).then(|| (record.identifier.clone(), unit.to_string()))
            })
            .collect::<CodeMapping>();

        let mut labels = BTreeMap::new();
        labels.insert(MEASURE_COLUMN.to_string(), measure_titles.clone());
        for dimension in &dimensions {
            let section = format!("{}Codes", dimension.identifier);
            if let Some(records) = code_records(&sections, &section)? {
                labels.insert(dimension.identifier.clone(), titles(&records));
            }
        }

        Ok(Self {
            properties,
            sections,
            dimensions,
            measure_titles,
            measure_units,
            labels,
        })
    }

    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    pub fn section(&self, name: &str) -> Option<&[Value]> {
        self.sections.get(name).map(Vec::as_slice)
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    pub fn dimension_identifiers(&self) -> Vec<&str> {
        self.dimensions
            .iter()
            .map(|dimension| dimension.identifier.as_str())
            .collect()
    }

    pub fn time_dimension_identifier(&self) -> Option<&str> {
        self.dimensions
            .iter()
            .find(|dimension| dimension.is_time())
            .map(|dimension| dimension.identifier.as_str())
    }

    pub fn measurecode_mapping(&self) -> &CodeMapping {
        &self.measure_titles
    }

    pub fn unit_mapping(&self) -> &CodeMapping {
        &self.measure_units
    }

    pub fn label_mapping(&self, column: &str) -> Option<&CodeMapping> {
        self.labels.get(column)
    }

    pub fn identifier(&self) -> Option<&str> {
        self.properties.get("Identifier").and_then(Value::as_str)
    }

    pub fn title(&self) -> Option<&str> {
        self.properties.get("Title").and_then(Value::as_str)
    }

    pub fn observation_count(&self) -> Option<u64> {
        self.properties
            .get("ObservationCount")
            .and_then(Value::as_u64)
    }
}

impl fmt::Display for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}': \"{}\" dimensions: {}",
            self.identifier().unwrap_or("Unknown"),
            self.title().unwrap_or("Unknown"),
            self.dimension_identifiers().join(", ")
        )
    }
}

fn code_records(
    sections: &BTreeMap<String, Vec<Value>>,
    name: &str,
) -> Result<Option<Vec<CodeRecord>>, OdataError> {
    let Some(values) = sections.get(name) else {
        return Ok(None);
    };
    values
        .iter()
        .map(|value| {
            CodeRecord::deserialize(value).map_err(|err| OdataError::Json(format!("{name}: {err}")))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

fn titles(records: &[CodeRecord]) -> CodeMapping {
    records
        .iter()
        .map(|record| {
            let title = record.title.clone().unwrap_or_else(|| record.identifier.clone());
            (record.identifier.clone(), title)
        })
        .collect()
}

pub fn dataset_url(base_url: &str, catalog: &str, id: &str) -> String {
    format!("{}/{catalog}/{id}", base_url.trim_end_matches('/'))
}

pub fn fetch_metadata(
    fetcher: &dyn JsonFetcher,
    id: &str,
    catalog: &str,
    base_url: &str,
) -> Result<Metadata, OdataError> {
    let path = dataset_url(base_url, catalog, id);
    tracing::info!("Fetching metadata for dataset {id}");
    let directory = fetcher.fetch_json(&path)?;

    let mut names = vec![DIMENSIONS.to_string()];
    for field in page_values(&directory) {
        let Some(name) = field.get("name").and_then(Value::as_str) else {
            continue;
        };
        if (name.ends_with("Codes") || name.ends_with("Groups")) && !names.iter().any(|n| n == name)
        {
            names.push(name.to_string());
        }
    }

    let mut sections = BTreeMap::new();
    for name in names {
        let section = fetcher.fetch_json(&format!("{path}/{name}"))?;
        sections.insert(name, page_values(&section).to_vec());
    }

    let properties = match fetcher.fetch_json(&format!("{path}/{PROPERTIES}"))? {
        Value::Object(map) => map,
        other => {
            return Err(OdataError::Json(format!(
                "{PROPERTIES} of {id} is not an object: {other}"
            )));
        }
    };

    Metadata::from_sections(properties, sections)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetadataKey {
    pub id: String,
    pub catalog: String,
    pub base_url: String,
}

#[derive(Debug, Default)]
pub struct MetadataCache {
    entries: MemoCache<MetadataKey, Metadata>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_metadata(
        &self,
        fetcher: &dyn JsonFetcher,
        id: &str,
        catalog: &str,
        base_url: &str,
    ) -> Result<Arc<Metadata>, OdataError> {
        let key = MetadataKey {
            id: id.to_string(),
            catalog: catalog.to_string(),
            base_url: base_url.to_string(),
        };
        self.entries
            .get_or_try_insert_with(key, || fetch_metadata(fetcher, id, catalog, base_url))
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
