use crate::error::OdataError;
use crate::metadata::MEASURE_COLUMN;
use crate::observations::VALUE_COLUMN;
use crate::table::{Cell, MetaTable};

pub const UNIT_COLUMN: &str = "Unit";

pub fn add_unit_column(data: &MetaTable) -> Result<MetaTable, OdataError> {
    let meta = data.require_meta("add_unit_column")?;
    let mapping = meta.unit_mapping();

    let measures = match data.table.column(MEASURE_COLUMN) {
        Some(measures) if data.table.has_column(VALUE_COLUMN) => measures,
        _ => {
            tracing::debug!("no {MEASURE_COLUMN}/{VALUE_COLUMN} columns; units not added");
            return Ok(data.clone());
        }
    };
    if mapping.is_empty() {
        tracing::debug!("no measure declares a unit");
        return Ok(data.clone());
    }

    let units = measures
        .map(|code| {
            code.code()
                .and_then(|code| mapping.get(&code).map(Cell::from))
                .unwrap_or(Cell::Null)
        })
        .collect::<Vec<_>>();

    let mut table = data.table.clone();
    table.insert_column_after(VALUE_COLUMN, UNIT_COLUMN, units)?;
    Ok(MetaTable::new(table, meta.clone()))
}
