use std::sync::Arc;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use serde::Serialize;

use crate::catalog::{CatalogInfo, DatasetIndex, DatasetInfo, fetch_catalogs};
use crate::client::JsonFetcher;
use crate::config::ResolvedConfig;
use crate::domain::{DEFAULT_BASE_URL, DEFAULT_CATALOG, DatasetId};
use crate::download::{DownloadSummary, PartialDownloadPolicy, PartitionedDownloader};
use crate::error::OdataError;
use crate::metadata::{Metadata, MetadataCache, dataset_url};
use crate::observations::{ID_COLUMN, empty_selection, read_observations};
use crate::query::{Filters, QueryPlan};
use crate::reshape::pivot;
use crate::store::Store;
use crate::table::MetaTable;

#[derive(Debug, Clone)]
pub struct ObservationRequest {
    pub id: DatasetId,
    pub catalog: Option<String>,
    pub download_dir: Option<Utf8PathBuf>,
    pub query: Option<String>,
    pub select: Option<Vec<String>>,
    pub filters: Filters,
    pub policy: PartialDownloadPolicy,
}

impl ObservationRequest {
    pub fn new(id: DatasetId) -> Self {
        Self {
            id,
            catalog: None,
            download_dir: None,
            query: None,
            select: None,
            filters: Filters::new(),
            policy: PartialDownloadPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadResult {
    #[serde(skip)]
    pub metadata: Arc<Metadata>,
    pub id: String,
    pub catalog: String,
    pub url: String,
    pub directory: String,
    pub partitions: usize,
    pub records: usize,
    pub skipped: bool,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<F: JsonFetcher> {
    fetcher: F,
    store: Store,
    base_url: String,
    catalog: String,
    metadata: MetadataCache,
    datasets: DatasetIndex,
}

impl<F: JsonFetcher> App<F> {
    pub fn new(store: Store, fetcher: F) -> Self {
        Self {
            fetcher,
            store,
            base_url: DEFAULT_BASE_URL.to_string(),
            catalog: DEFAULT_CATALOG.to_string(),
            metadata: MetadataCache::new(),
            datasets: DatasetIndex::new(),
        }
    }

    pub fn from_config(config: &ResolvedConfig, fetcher: F) -> Self {
        Self::new(config.store(), fetcher)
            .with_base_url(&config.base_url)
            .with_catalog(&config.catalog)
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_catalog(mut self, catalog: &str) -> Self {
        self.catalog = catalog.to_string();
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn get_metadata(&self, id: &DatasetId, catalog: Option<&str>) -> Result<Arc<Metadata>, OdataError> {
        let catalog = catalog.unwrap_or(&self.catalog);
        self.metadata
            .get_metadata(&self.fetcher, id.as_str(), catalog, &self.base_url)
    }

    pub fn get_catalogs(&self) -> Result<Vec<CatalogInfo>, OdataError> {
        fetch_catalogs(&self.fetcher, &self.base_url)
    }

    pub fn get_datasets(&self, catalog: Option<&str>) -> Result<Vec<DatasetInfo>, OdataError> {
        self.datasets
            .datasets(&self.fetcher, &self.base_url, catalog)
    }

    pub fn download(
        &self,
        request: &ObservationRequest,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadResult, OdataError> {
        let catalog = request.catalog.as_deref().unwrap_or(&self.catalog);
        let id = request.id.as_str();
        let dataset_dir = request
            .download_dir
            .clone()
            .unwrap_or_else(|| self.store.dataset_dir(catalog, id));

        sink.event(ProgressEvent {
            message: format!("phase=Resolve; metadata for {id}"),
            elapsed: None,
        });
        let meta = self.get_metadata(&request.id, Some(catalog))?;
        Store::write_metadata(&dataset_dir, &meta)?;

        let plan = QueryPlan::resolve(
            request.query.as_deref(),
            &request.filters,
            request.select.as_deref(),
        );
        for warning in &plan.warnings {
            sink.event(ProgressEvent {
                message: format!("warning: {warning}"),
                elapsed: None,
            });
        }
        let url = plan
            .url(&format!("{}/Observations", dataset_url(&self.base_url, catalog, id)))?
            .to_string();

        let total = meta.observation_count();
        let start = Instant::now();
        let mut received = 0usize;
        let mut report = |count: usize| {
            received += count;
            let message = match total {
                Some(total) => format!("phase=Download; rows {received}/{total}"),
                None => format!("phase=Download; rows {received}"),
            };
            sink.event(ProgressEvent {
                message,
                elapsed: Some(start.elapsed()),
            });
        };

        let observations_dir = Store::observations_dir(&dataset_dir);
        let summary: DownloadSummary = PartitionedDownloader::new(&self.fetcher)
            .with_policy(request.policy)
            .download(&url, &observations_dir, &empty_selection(&meta), Some(&mut report))?;
        if summary.skipped {
            sink.event(ProgressEvent {
                message: "phase=Store; observations already downloaded".to_string(),
                elapsed: None,
            });
        }
        for warning in &summary.warnings {
            sink.event(ProgressEvent {
                message: format!("warning: {warning}"),
                elapsed: None,
            });
        }
        let mut warnings = plan.warnings;
        warnings.extend(summary.warnings);

        Ok(DownloadResult {
            metadata: meta,
            id: id.to_string(),
            catalog: catalog.to_string(),
            url,
            directory: dataset_dir.to_string(),
            partitions: summary.partitions,
            records: summary.records,
            skipped: summary.skipped,
            warnings,
        })
    }

    pub fn get_observations(
        &self,
        request: &ObservationRequest,
        include_id: bool,
        sink: &dyn ProgressSink,
    ) -> Result<MetaTable, OdataError> {
        let catalog = request.catalog.as_deref().unwrap_or(&self.catalog);
        if !self
            .datasets
            .contains(&self.fetcher, &self.base_url, catalog, request.id.as_str())?
        {
            return Err(OdataError::DatasetNotFound {
                id: request.id.to_string(),
                catalog: catalog.to_string(),
            });
        }

        let downloaded = self.download(request, sink)?;
        let observations_dir = Store::observations_dir(&Utf8PathBuf::from(&downloaded.directory));
        let (mut table, partitions) = read_observations(&observations_dir)?;
        tracing::debug!("read {} rows from {partitions} partitions", table.len());
        if !include_id {
            table.drop_column(ID_COLUMN);
        }
        Ok(MetaTable::new(table, downloaded.metadata))
    }

    pub fn get_wide_data(
        &self,
        request: &ObservationRequest,
        name_measure_columns: bool,
        sink: &dyn ProgressSink,
    ) -> Result<MetaTable, OdataError> {
        let observations = self.get_observations(request, false, sink)?;
        pivot(&observations, name_measure_columns)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use serde_json::{Value, json};

    use super::*;
    use crate::output::JsonOutput;

    struct Canned {
        responses: HashMap<String, Value>,
        calls: Mutex<Vec<String>>,
    }

    impl JsonFetcher for Canned {
        fn fetch_json(&self, url: &str) -> Result<Value, OdataError> {
            self.calls.lock().unwrap().push(url.to_string());
            self.responses
                .get(url)
                .cloned()
                .ok_or_else(|| OdataError::HttpStatus {
                    status: 404,
                    url: url.to_string(),
                    message: "not found".to_string(),
                })
        }
    }

    #[test]
    fn unknown_dataset_is_not_found() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let mut responses = HashMap::new();
        responses.insert(
            "https://odata4.cbs.nl/Datasets".to_string(),
            json!({"value": [{"Identifier": "OTHER", "Catalog": "CBS"}]}),
        );
        let app = App::new(
            Store::new_with_root(root),
            Canned {
                responses,
                calls: Mutex::new(Vec::new()),
            },
        );

        let request = ObservationRequest::new("81575NED".parse().unwrap());
        let err = app.get_observations(&request, true, &JsonOutput).unwrap_err();
        assert!(err.is_not_found());
    }
}
