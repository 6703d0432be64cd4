use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use crate::error::OdataError;
use crate::metadata::{CodeMapping, MEASURE_COLUMN};
use crate::observations::VALUE_COLUMN;
use crate::table::{Cell, MetaTable, Table};

/// Long to wide. When several records share a (tuple, measure) key the first
/// value wins, and rows and measure columns keep their first-occurrence order.
pub fn pivot(long: &MetaTable, name_measure_columns: bool) -> Result<MetaTable, OdataError> {
    let meta = long.require_meta("pivot to wide format")?;
    let dimensions = meta.dimension_identifiers();
    if dimensions.is_empty() {
        return Err(OdataError::Validation(
            "no dimensions found in metadata".to_string(),
        ));
    }
    let mapping = meta.measurecode_mapping();

    if long.table.is_empty() {
        let columns = measure_columns(Vec::new(), mapping.codes(), mapping, name_measure_columns)?;
        return Ok(MetaTable::new(Table::new(columns), meta.clone()));
    }

    let required = |name: &str| {
        long.table.column_index(name).ok_or_else(|| {
            OdataError::Validation(format!("column '{name}' not found in observations"))
        })
    };
    let dimension_positions = dimensions
        .iter()
        .map(|dimension| required(*dimension))
        .collect::<Result<Vec<_>, _>>()?;
    let measure_position = required(MEASURE_COLUMN)?;
    let value_position = required(VALUE_COLUMN)?;

    let mut row_keys: Vec<Vec<Cell>> = Vec::new();
    let mut row_index: HashMap<Vec<Option<String>>, usize> = HashMap::new();
    let mut measures: Vec<String> = Vec::new();
    let mut measure_index: HashMap<String, usize> = HashMap::new();
    let mut values: HashMap<(usize, usize), Cell> = HashMap::new();

    for row in long.table.rows() {
        let Some(measure) = row[measure_position].code() else {
            continue;
        };
        let key = dimension_positions
            .iter()
            .map(|&position| row[position].code())
            .collect::<Vec<_>>();
        let row_number = match row_index.entry(key) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                row_keys.push(
                    dimension_positions
                        .iter()
                        .map(|&position| row[position].clone())
                        .collect(),
                );
                *entry.insert(row_keys.len() - 1)
            }
        };
        let measure_number = match measure_index.entry(measure) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                measures.push(entry.key().clone());
                *entry.insert(measures.len() - 1)
            }
        };
        values
            .entry((row_number, measure_number))
            .or_insert_with(|| row[value_position].clone());
    }

    let columns = measure_columns(
        dimensions
            .iter()
            .map(|dimension| dimension.to_string())
            .collect(),
        measures.iter().map(String::as_str),
        mapping,
        name_measure_columns,
    )?;

    let mut wide = Table::new(columns);
    for (row_number, key) in row_keys.into_iter().enumerate() {
        let mut cells = key;
        cells.extend((0..measures.len()).map(|measure_number| {
            values
                .remove(&(row_number, measure_number))
                .unwrap_or(Cell::Null)
        }));
        wide.push_row(cells)?;
    }

    Ok(MetaTable::new(wide, meta.clone()))
}

// A title already used by an earlier column falls back to the measure code.
fn measure_columns<'a>(
    mut columns: Vec<String>,
    codes: impl Iterator<Item = &'a str>,
    mapping: &CodeMapping,
    name_measure_columns: bool,
) -> Result<Vec<String>, OdataError> {
    let mut used = columns.iter().cloned().collect::<HashSet<_>>();
    for code in codes {
        let name = match mapping.get(code).filter(|_| name_measure_columns) {
            Some(title) if !used.contains(title) => title.to_string(),
            _ => code.to_string(),
        };
        if !used.insert(name.clone()) {
            return Err(OdataError::Validation(format!(
                "measure column '{name}' would appear twice in wide format"
            )));
        }
        columns.push(name);
    }
    Ok(columns)
}
