use std::io::{self, Write};

use serde::Serialize;

use crate::app::{DownloadResult, ProgressEvent, ProgressSink};
use crate::catalog::{CatalogInfo, DatasetInfo};
use crate::metadata::Metadata;
use crate::table::Table;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Quiet,
    Progress,
}

impl OutputMode {
    pub fn sink(self) -> &'static dyn ProgressSink {
        match self {
            OutputMode::Quiet => &JsonOutput,
            OutputMode::Progress => &StderrProgress,
        }
    }
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_catalogs(catalogs: &[CatalogInfo]) -> io::Result<()> {
        Self::print_json(&catalogs)
    }

    pub fn print_datasets(datasets: &[DatasetInfo]) -> io::Result<()> {
        Self::print_json(&datasets)
    }

    pub fn print_download(result: &DownloadResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_table(table: &Table) -> io::Result<()> {
        Self::print_json(table)
    }

    pub fn print_metadata(meta: &Metadata) -> io::Result<()> {
        let mut stdout = io::stdout();
        writeln!(stdout, "{meta}")
    }

    fn print_json<T: Serialize + ?Sized>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

pub struct StderrProgress;

impl ProgressSink for StderrProgress {
    fn event(&self, event: ProgressEvent) {
        let line = match event.elapsed {
            Some(elapsed) => format!("[{:>6.1}s] {}", elapsed.as_secs_f64(), event.message),
            None => event.message,
        };
        let _ = writeln!(io::stderr(), "{line}");
    }
}
