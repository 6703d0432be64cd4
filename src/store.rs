use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tempfile::NamedTempFile;

use crate::error::OdataError;
use crate::metadata::{Metadata, PROPERTIES};
use crate::table::{Cell, Table};

pub const OBSERVATIONS_DIR: &str = "Observations";
pub const SUCCESS_MARKER: &str = "_SUCCESS";
const PARTITION_PREFIX: &str = "partition_";
const PARTITION_EXT: &str = "json";

#[derive(Debug, Clone)]
pub struct Store {
    root: Utf8PathBuf,
}

impl Store {
    pub fn new() -> Result<Self, OdataError> {
        let root = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache").join("cbs-odata4")).ok()
            })
            .ok_or_else(|| {
                OdataError::Filesystem("unable to resolve cache directory".to_string())
            })?;
        Ok(Self { root })
    }

    pub fn new_with_root(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn dataset_dir(&self, catalog: &str, id: &str) -> Utf8PathBuf {
        self.root.join(catalog).join(id)
    }

    pub fn observations_dir(dataset_dir: &Utf8Path) -> Utf8PathBuf {
        dataset_dir.join(OBSERVATIONS_DIR)
    }

    pub fn write_metadata(dataset_dir: &Utf8Path, meta: &Metadata) -> Result<(), OdataError> {
        write_json_atomic(
            &dataset_dir.join(format!("{PROPERTIES}.json")),
            &Value::Object(meta.properties().clone()),
        )?;
        for name in meta.section_names() {
            let values = meta.section(name).unwrap_or(&[]).to_vec();
            write_json_atomic(
                &dataset_dir.join(format!("{name}.json")),
                &Value::Array(values),
            )?;
        }
        Ok(())
    }
}

pub fn write_json_atomic(path: &Utf8Path, value: &Value) -> Result<(), OdataError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| OdataError::Filesystem(err.to_string()))?;
    }
    let tmp_path = path.with_extension("json.tmp");
    let content = serde_json::to_vec_pretty(value)
        .map_err(|err| OdataError::Filesystem(err.to_string()))?;
    fs::write(tmp_path.as_std_path(), &content)
        .map_err(|err| OdataError::Filesystem(err.to_string()))?;
    fs::rename(tmp_path.as_std_path(), path.as_std_path())
        .map_err(|err| OdataError::Filesystem(err.to_string()))?;
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Partition {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Partition {
    pub fn from_records(records: &[Value]) -> Result<Self, OdataError> {
        let objects = records
            .iter()
            .map(|record| {
                record.as_object().ok_or_else(|| {
                    OdataError::Json(format!("observation record is not an object: {record}"))
                })
            })
            .collect::<Result<Vec<&Map<String, Value>>, _>>()?;

        let mut columns: Vec<String> = Vec::new();
        for object in &objects {
            for key in object.keys() {
                if !columns.iter().any(|column| column == key) {
                    columns.push(key.clone());
                }
            }
        }
        let rows = objects
            .iter()
            .map(|object| {
                columns
                    .iter()
                    .map(|column| object.get(column).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();
        Ok(Self { columns, rows })
    }

    pub fn empty(columns: &[String]) -> Self {
        Self {
            columns: columns.to_vec(),
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_table(self) -> Result<Table, OdataError> {
        let mut table = Table::new(self.columns);
        for row in self.rows {
            table.push_row(row.into_iter().map(Cell::from).collect())?;
        }
        Ok(table)
    }
}

pub fn partition_path(dir: &Utf8Path, number: usize) -> Utf8PathBuf {
    dir.join(format!("{PARTITION_PREFIX}{number}.{PARTITION_EXT}"))
}

fn parse_partition_number(file_name: &str) -> Option<usize> {
    file_name
        .strip_prefix(PARTITION_PREFIX)?
        .strip_suffix(PARTITION_EXT)?
        .strip_suffix('.')?
        .parse()
        .ok()
}

pub fn list_partitions(dir: &Utf8Path) -> Result<Vec<(usize, Utf8PathBuf)>, OdataError> {
    if !dir.as_std_path().is_dir() {
        return Ok(Vec::new());
    }
    let entries =
        fs::read_dir(dir.as_std_path()).map_err(|err| OdataError::Filesystem(err.to_string()))?;
    let mut partitions = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| OdataError::Filesystem(err.to_string()))?;
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if let Some(number) = parse_partition_number(&name) {
            partitions.push((number, dir.join(name)));
        }
    }
    partitions.sort_by_key(|(number, _)| *number);
    Ok(partitions)
}

/// Writes partition `number` through a temp file; an existing partition is never replaced.
pub fn write_partition(
    dir: &Utf8Path,
    number: usize,
    partition: &Partition,
) -> Result<Utf8PathBuf, OdataError> {
    fs::create_dir_all(dir.as_std_path()).map_err(|err| OdataError::Filesystem(err.to_string()))?;
    let path = partition_path(dir, number);
    let temp = NamedTempFile::new_in(dir.as_std_path())
        .map_err(|err| OdataError::Filesystem(err.to_string()))?;
    serde_json::to_writer(temp.as_file(), partition)
        .map_err(|err| OdataError::Filesystem(err.to_string()))?;
    temp.persist_noclobber(path.as_std_path())
        .map_err(|err| OdataError::Filesystem(format!("write {path}: {}", err.error)))?;
    Ok(path)
}

pub fn read_partition(path: &Utf8Path) -> Result<Partition, OdataError> {
    let content =
        fs::read(path.as_std_path()).map_err(|err| OdataError::Filesystem(format!("{path}: {err}")))?;
    serde_json::from_slice(&content).map_err(|err| OdataError::Json(format!("{path}: {err}")))
}

// The marker holds the URL the partitions were downloaded from.
pub fn mark_complete(dir: &Utf8Path, source_url: &str) -> Result<(), OdataError> {
    fs::write(dir.join(SUCCESS_MARKER).as_std_path(), source_url)
        .map_err(|err| OdataError::Filesystem(err.to_string()))
}

pub fn completed_url(dir: &Utf8Path) -> Option<String> {
    let content = fs::read_to_string(dir.join(SUCCESS_MARKER).as_std_path()).ok()?;
    let url = content.trim();
    (!url.is_empty()).then(|| url.to_string())
}

pub fn is_complete(dir: &Utf8Path) -> bool {
    dir.join(SUCCESS_MARKER).as_std_path().is_file()
}

pub fn clear_partitions(dir: &Utf8Path) -> Result<(), OdataError> {
    for (_, path) in list_partitions(dir)? {
        fs::remove_file(path.as_std_path())
            .map_err(|err| OdataError::Filesystem(err.to_string()))?;
    }
    let marker = dir.join(SUCCESS_MARKER);
    if marker.as_std_path().exists() {
        fs::remove_file(marker.as_std_path())
            .map_err(|err| OdataError::Filesystem(err.to_string()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn temp_dir() -> (tempfile::TempDir, Utf8PathBuf) {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        (temp, path)
    }

    #[test]
    fn layout_paths() {
        let store = Store::new_with_root(Utf8PathBuf::from("/data"));
        let dir = store.dataset_dir("CBS", "81575NED");
        assert!(dir.ends_with("CBS/81575NED"));
        assert!(Store::observations_dir(&dir).ends_with("81575NED/Observations"));
        assert!(partition_path(&dir, 3).ends_with("partition_3.json"));
    }

    #[test]
    fn partition_numbers_sort_numerically() {
        let (_temp, dir) = temp_dir();
        for number in [10, 2, 0, 1] {
            write_partition(&dir, number, &Partition::default()).unwrap();
        }
        fs::write(dir.join("partition_x.json").as_std_path(), b"{}").unwrap();
        let numbers = list_partitions(&dir)
            .unwrap()
            .into_iter()
            .map(|(n, _)| n)
            .collect::<Vec<_>>();
        assert_eq!(numbers, vec![0, 1, 2, 10]);
    }

    #[test]
    fn closed_partition_is_not_rewritten() {
        let (_temp, dir) = temp_dir();
        let first = Partition::from_records(&[json!({"Id": 1})]).unwrap();
        write_partition(&dir, 0, &first).unwrap();
        assert!(write_partition(&dir, 0, &Partition::default()).is_err());
        assert_eq!(read_partition(&partition_path(&dir, 0)).unwrap(), first);
    }

    #[test]
    fn records_must_be_objects() {
        assert!(Partition::from_records(&[json!(1)]).is_err());
    }

    #[test]
    fn missing_directory_has_no_partitions() {
        let (_temp, dir) = temp_dir();
        assert!(list_partitions(&dir.join("nope")).unwrap().is_empty());
    }
}
