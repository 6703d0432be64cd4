use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Number, Value};

use crate::error::OdataError;
use crate::metadata::Metadata;

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
}

impl Cell {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Int(value) => Some(*value as f64),
            Cell::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn code(&self) -> Option<String> {
        match self {
            Cell::Null => None,
            Cell::Text(text) => Some(text.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Cell::Null => Value::Null,
            Cell::Bool(value) => Value::Bool(*value),
            Cell::Int(value) => Value::from(*value),
            Cell::Float(value) => Number::from_f64(*value)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Cell::Text(text) => Value::String(text.clone()),
            Cell::Date(date) => Value::String(date.format("%Y-%m-%d").to_string()),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => Ok(()),
            Cell::Bool(value) => write!(f, "{value}"),
            Cell::Int(value) => write!(f, "{value}"),
            Cell::Float(value) => write!(f, "{value}"),
            Cell::Text(text) => f.write_str(text),
            Cell::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
        }
    }
}

impl From<Value> for Cell {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Cell::Null,
            Value::Bool(value) => Cell::Bool(value),
            Value::Number(number) => match number.as_i64() {
                Some(value) => Cell::Int(value),
                None => number.as_f64().map(Cell::Float).unwrap_or(Cell::Null),
            },
            Value::String(text) => Cell::Text(text),
            other => Cell::Text(other.to_string()),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Int(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Float(value)
    }
}

impl From<NaiveDate> for Cell {
    fn from(value: NaiveDate) -> Self {
        Cell::Date(value)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Cell::Null)
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn from_records(records: &[Map<String, Value>]) -> Self {
        let mut table = Table::default();
        for record in records {
            for key in record.keys() {
                if !table.has_column(key) {
                    table.columns.push(key.clone());
                }
            }
        }
        table.rows = records
            .iter()
            .map(|record| {
                table
                    .columns
                    .iter()
                    .map(|column| record.get(column).cloned().map(Cell::from).unwrap_or(Cell::Null))
                    .collect()
            })
            .collect();
        table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &Cell>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| &row[index]))
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&Cell> {
        let index = self.column_index(column)?;
        self.rows.get(row).map(|cells| &cells[index])
    }

    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<(), OdataError> {
        if row.len() != self.columns.len() {
            return Err(OdataError::Validation(format!(
                "row has {} cells but table has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Inserts `name` at `position`; fails without touching the table when the
    /// column exists or `values` does not match the row count.
    pub fn insert_column(
        &mut self,
        position: usize,
        name: &str,
        values: Vec<Cell>,
    ) -> Result<(), OdataError> {
        if self.has_column(name) {
            return Err(OdataError::Validation(format!(
                "column '{name}' already exists"
            )));
        }
        if values.len() != self.rows.len() {
            return Err(OdataError::Validation(format!(
                "column '{name}' has {} values but table has {} rows",
                values.len(),
                self.rows.len()
            )));
        }
        let position = position.min(self.columns.len());
        self.columns.insert(position, name.to_string());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.insert(position, value);
        }
        Ok(())
    }

    pub fn insert_column_after(
        &mut self,
        anchor: &str,
        name: &str,
        values: Vec<Cell>,
    ) -> Result<(), OdataError> {
        let index = self
            .column_index(anchor)
            .ok_or_else(|| OdataError::Validation(format!("column '{anchor}' not found")))?;
        self.insert_column(index + 1, name, values)
    }

    pub fn drop_column(&mut self, name: &str) -> bool {
        let Some(index) = self.column_index(name) else {
            return false;
        };
        self.columns.remove(index);
        for row in &mut self.rows {
            row.remove(index);
        }
        true
    }

    pub fn append(&mut self, other: Table) {
        for column in &other.columns {
            if !self.has_column(column) {
                self.columns.push(column.clone());
                for row in &mut self.rows {
                    row.push(Cell::Null);
                }
            }
        }
        let positions = self
            .columns
            .iter()
            .map(|column| other.column_index(column))
            .collect::<Vec<_>>();
        for mut row in other.rows {
            let cells = positions
                .iter()
                .map(|position| match position {
                    Some(index) => std::mem::replace(&mut row[*index], Cell::Null),
                    None => Cell::Null,
                })
                .collect();
            self.rows.push(cells);
        }
    }
}

impl Serialize for Table {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeSeq;
        let mut seq = serializer.serialize_seq(Some(self.rows.len()))?;
        for row in &self.rows {
            seq.serialize_element(&RowRef {
                columns: &self.columns,
                cells: row,
            })?;
        }
        seq.end()
    }
}

struct RowRef<'a> {
    columns: &'a [String],
    cells: &'a [Cell],
}

impl Serialize for RowRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, cell) in self.columns.iter().zip(self.cells) {
            map.serialize_entry(column, cell)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone)]
pub struct MetaTable {
    pub table: Table,
    pub meta: Option<Arc<Metadata>>,
}

impl MetaTable {
    pub fn new(table: Table, meta: Arc<Metadata>) -> Self {
        Self {
            table,
            meta: Some(meta),
        }
    }

    pub fn bare(table: Table) -> Self {
        Self { table, meta: None }
    }

    pub fn require_meta(&self, operation: &str) -> Result<&Arc<Metadata>, OdataError> {
        self.meta
            .as_ref()
            .ok_or_else(|| OdataError::MissingMetadata(operation.to_string()))
    }
}
