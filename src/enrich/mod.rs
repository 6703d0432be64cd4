mod labels;
mod period;
mod units;

pub use labels::add_label_columns;
pub use period::{DATE_COLUMN, FREQ_COLUMN, NUMERIC_COLUMN, Period, PeriodKind, add_date_column};
pub use units::{UNIT_COLUMN, add_unit_column};
