use camino::Utf8Path;
use serde::Serialize;

use crate::client::{JsonFetcher, next_link, page_values};
use crate::error::OdataError;
use crate::store::{self, Partition};

/// What to do with a directory that has partitions but no completion marker,
/// i.e. an earlier download that failed halfway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PartialDownloadPolicy {
    #[default]
    TreatAsComplete,
    Restart,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DownloadSummary {
    pub partitions: usize,
    pub records: usize,
    pub skipped: bool,
    pub warnings: Vec<String>,
}

pub struct PartitionedDownloader<'a> {
    fetcher: &'a dyn JsonFetcher,
    policy: PartialDownloadPolicy,
}

impl<'a> PartitionedDownloader<'a> {
    pub fn new(fetcher: &'a dyn JsonFetcher) -> Self {
        Self {
            fetcher,
            policy: PartialDownloadPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: PartialDownloadPolicy) -> Self {
        self.policy = policy;
        self
    }

    // Pages are fetched in sequence and partition `n` is the `n`-th page.
    // A transport error leaves the partitions written so far in place.
    pub fn download(
        &self,
        url: &str,
        output_dir: &Utf8Path,
        empty_schema: &[String],
        mut progress: Option<&mut dyn FnMut(usize)>,
    ) -> Result<DownloadSummary, OdataError> {
        let existing = store::list_partitions(output_dir)?;
        if !existing.is_empty() {
            if store::is_complete(output_dir) {
                tracing::info!("{output_dir} already holds {} partitions", existing.len());
                let mut summary = skipped(existing.len());
                if let Some(previous) = store::completed_url(output_dir)
                    .filter(|previous| previous.as_str() != url)
                {
                    let message = format!(
                        "{output_dir} was downloaded from {previous}, not {url}; \
                         keeping the existing partitions, remove the directory \
                         or pick another one to download this query"
                    );
                    tracing::warn!("{message}");
                    summary.warnings.push(message);
                }
                return Ok(summary);
            }
            match self.policy {
                PartialDownloadPolicy::TreatAsComplete => {
                    let message = format!(
                        "{output_dir} holds {} partitions from an unfinished download; \
                         remove the directory to download again",
                        existing.len()
                    );
                    tracing::warn!("{message}");
                    let mut summary = skipped(existing.len());
                    summary.warnings.push(message);
                    return Ok(summary);
                }
                PartialDownloadPolicy::Restart => {
                    tracing::warn!("discarding partial download in {output_dir}");
                    store::clear_partitions(output_dir)?;
                }
            }
        }

        let mut partition = 0usize;
        let mut records = 0usize;
        let mut next = Some(url.to_string());
        while let Some(url) = next {
            tracing::info!("Retrieving {url}");
            let page = self.fetcher.fetch_json(&url)?;
            let values = page_values(&page);
            let data = if values.is_empty() && partition == 0 {
                Partition::empty(empty_schema)
            } else {
                Partition::from_records(values)?
            };
            store::write_partition(output_dir, partition, &data)?;
            records += data.len();
            if let Some(callback) = progress.as_deref_mut() {
                callback(data.len());
            }
            next = next_link(&page).map(str::to_string);
            partition += 1;
        }
        store::mark_complete(output_dir, url)?;

        Ok(DownloadSummary {
            partitions: partition,
            records,
            skipped: false,
            warnings: Vec::new(),
        })
    }
}

fn skipped(partitions: usize) -> DownloadSummary {
    DownloadSummary {
        partitions,
        skipped: true,
        ..DownloadSummary::default()
    }
}
