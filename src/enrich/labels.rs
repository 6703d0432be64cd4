use crate::error::OdataError;
use crate::metadata::MEASURE_COLUMN;
use crate::table::{Cell, MetaTable};

pub fn add_label_columns(data: &MetaTable) -> Result<MetaTable, OdataError> {
    let meta = data.require_meta("add_label_columns")?;

    let mut candidates = vec![MEASURE_COLUMN];
    candidates.extend(meta.dimension_identifiers());

    let mut additions = Vec::new();
    for column in candidates {
        let Some(mapping) = meta.label_mapping(column) else {
            continue;
        };
        let Some(codes) = data.table.column(column) else {
            continue;
        };
        let label = format!("{column}Label");
        if data.table.has_column(&label) {
            return Err(OdataError::Validation(format!(
                "column '{label}' already exists"
            )));
        }
        let labels = codes
            .map(|code| {
                code.code()
                    .and_then(|code| mapping.get(&code).map(Cell::from))
                    .unwrap_or(Cell::Null)
            })
            .collect::<Vec<_>>();
        additions.push((column, label, labels));
    }

    let mut table = data.table.clone();
    for (column, label, labels) in additions {
        table.insert_column_after(column, &label, labels)?;
    }
    Ok(MetaTable::new(table, meta.clone()))
}
