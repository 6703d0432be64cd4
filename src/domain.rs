use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::OdataError;

pub const DEFAULT_BASE_URL: &str = "https://odata4.cbs.nl";
pub const DEFAULT_CATALOG: &str = "CBS";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetId(String);

impl DatasetId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DatasetId {
    type Err = OdataError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_string();
        let is_valid = !normalized.is_empty()
            && normalized
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-');
        if !is_valid {
            return Err(OdataError::InvalidDatasetId(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum DateType {
    #[value(name = "date", alias = "Date")]
    Date,
    #[value(name = "numeric")]
    Numeric,
}

impl fmt::Display for DateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateType::Date => write!(f, "Date"),
            DateType::Numeric => write!(f, "numeric"),
        }
    }
}

impl FromStr for DateType {
    type Err = OdataError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "Date" | "date" => Ok(DateType::Date),
            "numeric" | "Numeric" => Ok(DateType::Numeric),
            _ => Err(OdataError::InvalidDateType(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Frequency {
    #[serde(rename = "Y")]
    Year,
    #[serde(rename = "Q")]
    Quarter,
    #[serde(rename = "M")]
    Month,
    #[serde(rename = "D")]
    Day,
    #[serde(rename = "W")]
    Week,
    #[serde(rename = "X")]
    WeekPart,
}

impl Frequency {
    pub fn tag(self) -> &'static str {
        match self {
            Frequency::Year => "Y",
            Frequency::Quarter => "Q",
            Frequency::Month => "M",
            Frequency::Day => "D",
            Frequency::Week => "W",
            Frequency::WeekPart => "X",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}
