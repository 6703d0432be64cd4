use std::collections::HashMap;
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use serde_json::{Value, json};

use cbs_odata4::app::{App, ObservationRequest, ProgressEvent, ProgressSink};
use cbs_odata4::client::JsonFetcher;
use cbs_odata4::error::OdataError;
use cbs_odata4::output::JsonOutput;
use cbs_odata4::query::Filters;
use cbs_odata4::store::Store;
use cbs_odata4::table::Cell;

const DATASET: &str = "https://odata4.cbs.nl/CBS/81575NED";

struct MockService {
    responses: HashMap<String, Value>,
    calls: Mutex<Vec<String>>,
}

impl MockService {
    fn new() -> Self {
        let mut responses = HashMap::new();
        responses.insert(
            "https://odata4.cbs.nl/Datasets".to_string(),
            json!({"value": [
                {"Identifier": "81575NED", "Catalog": "CBS", "Title": "Bevolking"},
                {"Identifier": "99999NED", "Catalog": "CBS-asd", "Title": "Elders"}
            ]}),
        );
        responses.insert(
            DATASET.to_string(),
            json!({"value": [
                {"name": "Observations", "url": "Observations"},
                {"name": "Dimensions", "url": "Dimensions"},
                {"name": "MeasureCodes", "url": "MeasureCodes"},
                {"name": "PeriodenCodes", "url": "PeriodenCodes"},
                {"name": "RegioSCodes", "url": "RegioSCodes"},
                {"name": "RegioSGroups", "url": "RegioSGroups"},
                {"name": "Properties", "url": "Properties"}
            ]}),
        );
        responses.insert(
            format!("{DATASET}/Dimensions"),
            json!({"value": [
                {"Identifier": "RegioS", "Kind": "GeoDimension", "Title": "Regio's"},
                {"Identifier": "Perioden", "Kind": "TimeDimension", "Title": "Perioden"}
            ]}),
        );
        responses.insert(
            format!("{DATASET}/MeasureCodes"),
            json!({"value": [
                {"Identifier": "M1", "Title": "Inwoners", "Unit": "aantal"},
                {"Identifier": "M2", "Title": "Huishoudens", "Unit": "aantal"}
            ]}),
        );
        responses.insert(
            format!("{DATASET}/PeriodenCodes"),
            json!({"value": [
                {"Identifier": "2022JJ00", "Title": "2022"},
                {"Identifier": "2023JJ00", "Title": "2023"}
            ]}),
        );
        responses.insert(
            format!("{DATASET}/RegioSCodes"),
            json!({"value": [{"Identifier": "NL01", "Title": "Nederland"}]}),
        );
        responses.insert(format!("{DATASET}/RegioSGroups"), json!({"value": []}));
        responses.insert(
            format!("{DATASET}/Properties"),
            json!({"Identifier": "81575NED", "Title": "Bevolking", "ObservationCount": 4}),
        );
        responses.insert(
            format!("{DATASET}/Observations"),
            json!({
                "value": [
                    observation(0, "M1", "NL01", "2022JJ00", 100),
                    observation(1, "M2", "NL01", "2022JJ00", 40)
                ],
                "@odata.nextLink": format!("{DATASET}/Observations?$skip=2")
            }),
        );
        responses.insert(
            format!("{DATASET}/Observations?$skip=2"),
            json!({"value": [
                observation(2, "M1", "NL01", "2023JJ00", 110),
                observation(3, "M2", "NL01", "2023JJ00", 45)
            ]}),
        );
        Self {
            responses,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn with(mut self, url: &str, response: Value) -> Self {
        self.responses.insert(url.to_string(), response);
        self
    }

    fn calls_matching(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|url| url.contains(needle))
            .count()
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl JsonFetcher for MockService {
    fn fetch_json(&self, url: &str) -> Result<Value, OdataError> {
        self.calls.lock().unwrap().push(url.to_string());
        self.responses
            .get(url)
            .cloned()
            .ok_or_else(|| OdataError::HttpStatus {
                status: 404,
                url: url.to_string(),
                message: "no such resource".to_string(),
            })
    }
}

fn observation(id: i64, measure: &str, region: &str, period: &str, value: i64) -> Value {
    json!({
        "Id": id,
        "Measure": measure,
        "ValueAttribute": "None",
        "Value": value,
        "RegioS": region,
        "Perioden": period
    })
}

#[derive(Default)]
struct RecordingSink {
    messages: Mutex<Vec<String>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.messages.lock().unwrap().push(event.message);
    }
}

fn temp_root() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, root)
}

fn request() -> ObservationRequest {
    ObservationRequest::new("81575NED".parse().unwrap())
}

#[test]
fn download_writes_metadata_and_partitions() {
    let (_temp, root) = temp_root();
    let service = MockService::new();
    let app = App::new(Store::new_with_root(root.clone()), &service);

    let result = app.download(&request(), &JsonOutput).unwrap();
    assert_eq!(result.partitions, 2);
    assert_eq!(result.records, 4);
    assert!(!result.skipped);
    assert_eq!(result.url, format!("{DATASET}/Observations"));

    let dataset_dir = root.join("CBS").join("81575NED");
    assert_eq!(result.directory, dataset_dir.to_string());
    for file in [
        "Properties.json",
        "Dimensions.json",
        "MeasureCodes.json",
        "RegioSGroups.json",
        "Observations/partition_0.json",
        "Observations/partition_1.json",
        "Observations/_SUCCESS",
    ] {
        assert!(dataset_dir.join(file).exists(), "{file} missing");
    }
}

#[test]
fn observations_are_downloaded_once_and_metadata_fetched_once() {
    let (_temp, root) = temp_root();
    let service = MockService::new();
    let app = App::new(Store::new_with_root(root), &service);

    let first = app.get_observations(&request(), true, &JsonOutput).unwrap();
    let second = app.get_observations(&request(), true, &JsonOutput).unwrap();

    assert_eq!(first.table.len(), 4);
    assert_eq!(second.table.len(), 4);
    assert_eq!(service.calls_matching("/Observations"), 2);
    assert_eq!(service.calls_matching("/Properties"), 1);
    assert_eq!(service.calls_matching("/Datasets"), 1);
    assert_eq!(
        second.meta.as_ref().and_then(|meta| meta.title()),
        Some("Bevolking")
    );
}

#[test]
fn include_id_controls_id_column() {
    let (_temp, root) = temp_root();
    let service = MockService::new();
    let app = App::new(Store::new_with_root(root), &service);

    let with_id = app.get_observations(&request(), true, &JsonOutput).unwrap();
    assert!(with_id.table.has_column("Id"));
    let without_id = app.get_observations(&request(), false, &JsonOutput).unwrap();
    assert!(!without_id.table.has_column("Id"));
    assert!(without_id.table.has_column("Value"));
}

#[test]
fn wide_data_has_one_column_per_measure() {
    let (_temp, root) = temp_root();
    let service = MockService::new();
    let app = App::new(Store::new_with_root(root), &service);

    let wide = app.get_wide_data(&request(), true, &JsonOutput).unwrap();
    assert_eq!(
        wide.table.columns(),
        ["RegioS", "Perioden", "Inwoners", "Huishoudens"]
    );
    assert_eq!(wide.table.len(), 2);
    assert_eq!(wide.table.cell(0, "Perioden"), Some(&Cell::from("2022JJ00")));
    assert_eq!(wide.table.cell(1, "Inwoners"), Some(&Cell::Int(110)));
    assert_eq!(wide.table.cell(1, "Huishoudens"), Some(&Cell::Int(45)));

    let by_code = app.get_wide_data(&request(), false, &JsonOutput).unwrap();
    assert_eq!(by_code.table.columns(), ["RegioS", "Perioden", "M1", "M2"]);
}

#[test]
fn dataset_outside_catalog_is_not_found() {
    let (_temp, root) = temp_root();
    let service = MockService::new();
    let app = App::new(Store::new_with_root(root), &service);

    let request = ObservationRequest::new("99999NED".parse().unwrap());
    let err = app.get_observations(&request, true, &JsonOutput).unwrap_err();
    assert_matches!(err, OdataError::DatasetNotFound { ref id, ref catalog }
        if id == "99999NED" && catalog == "CBS");
    assert_eq!(service.calls_matching("/Observations"), 0);
}

#[test]
fn filters_become_the_observations_query() {
    let (_temp, root) = temp_root();
    let filtered = format!("{DATASET}/Observations?%24filter=%28Perioden+eq+%272023JJ00%27%29");
    let service = MockService::new().with(
        &filtered,
        json!({"value": [observation(2, "M1", "NL01", "2023JJ00", 110)]}),
    );
    let app = App::new(Store::new_with_root(root.clone()), &service);

    let request = ObservationRequest {
        filters: Filters::new().with("Perioden", "2023JJ00"),
        download_dir: Some(root.join("filtered")),
        ..request()
    };
    let data = app.get_observations(&request, true, &JsonOutput).unwrap();
    assert_eq!(data.table.len(), 1);
    assert!(service.calls().contains(&filtered));
    assert!(root.join("filtered/Observations/partition_0.json").exists());
}

#[test]
fn reserved_characters_in_filter_values_are_encoded() {
    let (_temp, root) = temp_root();
    let encoded = format!("{DATASET}/Observations?%24filter=%28RegioS+eq+%27A%26B+%231%27%29");
    let service = MockService::new().with(
        &encoded,
        json!({"value": [observation(0, "M1", "A&B #1", "2022JJ00", 7)]}),
    );
    let app = App::new(Store::new_with_root(root.clone()), &service);

    let request = ObservationRequest {
        filters: Filters::new().with("RegioS", "A&B #1"),
        download_dir: Some(root.join("regio")),
        ..request()
    };
    let result = app.download(&request, &JsonOutput).unwrap();
    assert_eq!(result.url, encoded);
    assert_eq!(result.records, 1);

    let url = reqwest::Url::parse(&result.url).unwrap();
    assert_eq!(url.fragment(), None);
    let pairs = url.query_pairs().into_owned().collect::<Vec<_>>();
    assert_eq!(
        pairs,
        [("$filter".to_string(), "(RegioS eq 'A&B #1')".to_string())]
    );
}

#[test]
fn reusing_a_directory_for_another_query_warns() {
    let (_temp, root) = temp_root();
    let filtered = format!("{DATASET}/Observations?%24filter=%28Perioden+eq+%272023JJ00%27%29");
    let service = MockService::new().with(
        &filtered,
        json!({"value": [observation(2, "M1", "NL01", "2023JJ00", 110)]}),
    );
    let app = App::new(Store::new_with_root(root), &service);
    app.get_observations(&request(), true, &JsonOutput).unwrap();

    let sink = RecordingSink::default();
    let request = ObservationRequest {
        filters: Filters::new().with("Perioden", "2023JJ00"),
        ..request()
    };
    let result = app.download(&request, &sink).unwrap();
    assert!(result.skipped);
    assert_eq!(result.url, filtered);
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].contains(&format!("{DATASET}/Observations,")));
    assert!(!service.calls().contains(&filtered));
    assert!(
        sink.messages
            .lock()
            .unwrap()
            .iter()
            .any(|message| message.starts_with("warning:") && message.contains(&filtered))
    );
}

#[test]
fn raw_query_wins_and_warns() {
    let (_temp, root) = temp_root();
    let raw = format!("{DATASET}/Observations?$top=1");
    let service = MockService::new().with(
        &raw,
        json!({"value": [observation(0, "M1", "NL01", "2022JJ00", 100)]}),
    );
    let app = App::new(Store::new_with_root(root), &service);
    let sink = RecordingSink::default();

    let request = ObservationRequest {
        query: Some("?$top=1".to_string()),
        filters: Filters::new().with("Perioden", "2023JJ00"),
        ..request()
    };
    let result = app.download(&request, &sink).unwrap();
    assert_eq!(result.url, raw);
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].contains("Perioden"));
    assert!(
        sink.messages
            .lock()
            .unwrap()
            .iter()
            .any(|message| message.starts_with("warning:"))
    );
}

#[test]
fn progress_counts_rows_against_observation_count() {
    let (_temp, root) = temp_root();
    let service = MockService::new();
    let app = App::new(Store::new_with_root(root), &service);
    let sink = RecordingSink::default();

    app.download(&request(), &sink).unwrap();
    let messages = sink.messages.lock().unwrap();
    assert!(messages.iter().any(|m| m.ends_with("rows 2/4")));
    assert!(messages.iter().any(|m| m.ends_with("rows 4/4")));
}

#[test]
fn listings_filter_by_catalog() {
    let (_temp, root) = temp_root();
    let service = MockService::new().with(
        "https://odata4.cbs.nl/Catalogs",
        json!({"value": [{"Identifier": "CBS", "Title": "CBS databank StatLine"}]}),
    );
    let app = App::new(Store::new_with_root(root), &service);

    assert_eq!(app.get_datasets(None).unwrap().len(), 2);
    let cbs = app.get_datasets(Some("CBS")).unwrap();
    assert_eq!(cbs.len(), 1);
    assert_eq!(cbs[0].identifier, "81575NED");
    assert_eq!(service.calls_matching("/Datasets"), 1);

    let catalogs = app.get_catalogs().unwrap();
    assert_eq!(catalogs[0].identifier, "CBS");
}

#[test]
fn transport_failure_surfaces_unchanged() {
    let (_temp, root) = temp_root();
    let mut service = MockService::new();
    service.responses.remove(&format!("{DATASET}/Properties"));
    let app = App::new(Store::new_with_root(root), &service);

    let err = app.download(&request(), &JsonOutput).unwrap_err();
    assert_matches!(err, OdataError::HttpStatus { status: 404, .. });
    assert!(err.is_transport());
}
