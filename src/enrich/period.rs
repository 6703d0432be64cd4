use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate, Weekday};
use regex::Regex;

use crate::domain::{DateType, Frequency};
use crate::error::OdataError;
use crate::table::{Cell, MetaTable};

pub const DATE_COLUMN: &str = "period_Date";
pub const NUMERIC_COLUMN: &str = "period_numeric";
pub const FREQ_COLUMN: &str = "period_freq";

static PERIOD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{4})(\w{2})(\d{2})").expect("valid period pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodKind {
    Year,
    Quarter,
    Month,
    Week,
    WeekPart,
    Day { month: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    pub year: i32,
    pub kind: PeriodKind,
    pub number: u32,
}

impl Period {
    pub fn parse(code: &str) -> Option<Self> {
        let captures = PERIOD_PATTERN.captures(code)?;
        let year = captures[1].parse().ok()?;
        let number = captures[3].parse().ok()?;
        let kind = match &captures[2] {
            "JJ" => PeriodKind::Year,
            "KW" => PeriodKind::Quarter,
            "MM" => PeriodKind::Month,
            "W1" => PeriodKind::Week,
            "X0" => PeriodKind::WeekPart,
            other if other.bytes().all(|b| b.is_ascii_digit()) => PeriodKind::Day {
                month: other.parse().ok()?,
            },
            _ => return None,
        };
        Some(Self { year, kind, number })
    }

    pub fn frequency(&self) -> Frequency {
        match self.kind {
            PeriodKind::Year => Frequency::Year,
            PeriodKind::Quarter => Frequency::Quarter,
            PeriodKind::Month => Frequency::Month,
            PeriodKind::Week => Frequency::Week,
            PeriodKind::WeekPart => Frequency::WeekPart,
            PeriodKind::Day { .. } => Frequency::Day,
        }
    }

    pub fn start_date(&self) -> Option<NaiveDate> {
        let year = self.year;
        match self.kind {
            PeriodKind::Year | PeriodKind::WeekPart => NaiveDate::from_ymd_opt(year, 1, 1),
            PeriodKind::Quarter => {
                let quarter = self.valid_number(1..=4)?;
                NaiveDate::from_ymd_opt(year, 3 * (quarter - 1) + 1, 1)
            }
            PeriodKind::Month => NaiveDate::from_ymd_opt(year, self.valid_number(1..=12)?, 1),
            PeriodKind::Day { month } => NaiveDate::from_ymd_opt(year, month, self.number),
            PeriodKind::Week => NaiveDate::from_isoywd_opt(year, self.number, Weekday::Mon),
        }
    }

    pub fn numeric(&self) -> Option<f64> {
        let year = f64::from(self.year);
        match self.kind {
            PeriodKind::Year => Some(year + 0.5),
            PeriodKind::Quarter => {
                let quarter = f64::from(self.valid_number(1..=4)?);
                Some(year + (3.0 * (quarter - 1.0) + 2.0) / 12.0)
            }
            PeriodKind::Month => {
                let month = f64::from(self.valid_number(1..=12)?);
                Some(year + (month - 0.5) / 12.0)
            }
            PeriodKind::Week => {
                self.start_date()?;
                let week = f64::from(self.number);
                Some(year + (week - 0.5) / 53.0)
            }
            PeriodKind::WeekPart => Some(year),
            PeriodKind::Day { .. } => {
                let date = self.start_date()?;
                let days = NaiveDate::from_ymd_opt(self.year, 12, 31)?.ordinal();
                Some(year + (f64::from(date.ordinal()) - 0.5) / f64::from(days))
            }
        }
    }

    fn valid_number(&self, range: std::ops::RangeInclusive<u32>) -> Option<u32> {
        range.contains(&self.number).then_some(self.number)
    }
}

pub fn add_date_column(data: &MetaTable, date_type: DateType) -> Result<MetaTable, OdataError> {
    let meta = data.require_meta("add_date_column")?;

    let Some(period_column) = meta.time_dimension_identifier() else {
        tracing::warn!("No time dimension found!");
        return Ok(data.clone());
    };
    let Some(codes) = data.table.column(period_column) else {
        tracing::warn!("Time dimension column {period_column} not found in data");
        return Ok(data.clone());
    };

    let value_column = match date_type {
        DateType::Date => DATE_COLUMN,
        DateType::Numeric => NUMERIC_COLUMN,
    };
    for column in [value_column, FREQ_COLUMN] {
        if data.table.has_column(column) {
            return Err(OdataError::Validation(format!(
                "column '{column}' already exists"
            )));
        }
    }

    let periods = codes
        .map(|cell| cell.code().and_then(|code| Period::parse(&code)))
        .collect::<Vec<_>>();

    let values = match date_type {
        DateType::Date => periods
            .iter()
            .map(|period| Cell::from(period.and_then(|p| p.start_date())))
            .collect::<Vec<_>>(),
        DateType::Numeric => {
            let all_years = periods
                .iter()
                .all(|period| matches!(period, Some(p) if p.kind == PeriodKind::Year));
            periods
                .iter()
                .map(|period| match period {
                    Some(p) if all_years => Cell::Int(i64::from(p.year)),
                    Some(p) => Cell::from(p.numeric()),
                    None => Cell::Null,
                })
                .collect()
        }
    };
    let frequencies = periods
        .iter()
        .map(|period| Cell::from(period.map(|p| p.frequency().tag())))
        .collect::<Vec<_>>();

    let mut table = data.table.clone();
    table.insert_column_after(period_column, value_column, values)?;
    table.insert_column_after(value_column, FREQ_COLUMN, frequencies)?;
    Ok(MetaTable::new(table, meta.clone()))
}
