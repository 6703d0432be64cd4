use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum OdataError {
    #[error("invalid dataset id: {0}")]
    InvalidDatasetId(String),

    #[error("invalid filter (expected Column=value[,value...]): {0}")]
    InvalidFilter(String),

    #[error("invalid date type (expected Date or numeric): {0}")]
    InvalidDateType(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("table '{id}' cannot be found in catalog '{catalog}'")]
    DatasetNotFound { id: String, catalog: String },

    #[error("no observation partitions found in {0}; download the dataset first")]
    ObservationsNotFound(String),

    #[error("{0} requires metadata attached to the table")]
    MissingMetadata(String),

    #[error("{0}")]
    Validation(String),

    #[error("request failed: {0}")]
    Http(String),

    #[error("{url} returned status {status}: {message}")]
    HttpStatus {
        status: u16,
        url: String,
        message: String,
    },

    #[error("malformed JSON payload: {0}")]
    Json(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl OdataError {
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            OdataError::Http(_) | OdataError::HttpStatus { .. } | OdataError::Json(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            OdataError::DatasetNotFound { .. } | OdataError::ObservationsNotFound(_)
        )
    }
}
