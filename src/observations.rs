use camino::Utf8Path;

use crate::error::OdataError;
use crate::metadata::{MEASURE_COLUMN, Metadata};
use crate::store;
use crate::table::Table;

pub const ID_COLUMN: &str = "Id";
pub const VALUE_ATTRIBUTE_COLUMN: &str = "ValueAttribute";
pub const VALUE_COLUMN: &str = "Value";

pub fn empty_selection(meta: &Metadata) -> Vec<String> {
    let mut columns = [
        ID_COLUMN,
        MEASURE_COLUMN,
        VALUE_ATTRIBUTE_COLUMN,
        VALUE_COLUMN,
    ]
    .iter()
    .map(|column| column.to_string())
    .collect::<Vec<_>>();
    columns.extend(meta.dimension_identifiers().into_iter().map(str::to_string));
    columns
}

pub fn read_observations(dir: &Utf8Path) -> Result<(Table, usize), OdataError> {
    let partitions = store::list_partitions(dir)?;
    if partitions.is_empty() {
        return Err(OdataError::ObservationsNotFound(dir.to_string()));
    }
    let count = partitions.len();
    let mut table = Table::default();
    for (_, path) in partitions {
        table.append(store::read_partition(&path)?.into_table()?);
    }
    Ok((table, count))
}
