use assert_matches::assert_matches;

use cbs_odata4::error::OdataError;
use cbs_odata4::query::{
    FilterArg, FilterValue, Filters, QueryPlan, and_filter, build_filter, build_query, contains,
    endswith, eq, or_filter, startswith,
};

#[test]
fn list_filter_is_a_disjunction_of_equalities() {
    let filters = Filters::new().with("Perioden", ["2020JJ00", "2021JJ00"]);
    assert_eq!(
        build_filter(&filters).as_deref(),
        Some("((Perioden eq '2020JJ00' or Perioden eq '2021JJ00'))")
    );
}

#[test]
fn columns_are_conjoined_in_insertion_order() {
    let filters = Filters::new()
        .with("RegioS", "NL01")
        .with("Perioden", vec!["2020JJ00", "2021JJ00"]);
    assert_eq!(
        build_filter(&filters).as_deref(),
        Some("(RegioS eq 'NL01') and ((Perioden eq '2020JJ00' or Perioden eq '2021JJ00'))")
    );
}

#[test]
fn empty_filters_build_nothing() {
    assert_eq!(build_filter(&Filters::new()), None);
    let only_empty = Filters::new().with("Perioden", Vec::<String>::new());
    assert_eq!(build_filter(&only_empty), None);
}

#[test]
fn quotes_are_doubled() {
    assert_eq!(eq("Regio", "'s-Gravenhage"), "Regio eq '''s-Gravenhage'");
}

#[test]
fn string_functions() {
    assert_eq!(contains("Title", "wijk"), "contains(Title, 'wijk')");
    assert_eq!(startswith("RegioS", "GM"), "startswith(RegioS, 'GM')");
    assert_eq!(endswith("Perioden", "JJ00"), "endswith(Perioden, 'JJ00')");
    assert_eq!(
        or_filter([startswith("RegioS", "GM"), startswith("RegioS", "WK")]),
        "(startswith(RegioS, 'GM')) or (startswith(RegioS, 'WK'))"
    );
    assert_eq!(and_filter(["a eq 'b'"]), "(a eq 'b')");
}

#[test]
fn query_string_parts() {
    let select = vec!["Measure".to_string(), "Value".to_string()];
    assert_eq!(build_query(None, None), "");
    assert_eq!(build_query(Some("x eq '1'"), None), "?$filter=x eq '1'");
    assert_eq!(build_query(None, Some(select.as_slice())), "?$select=Measure,Value");
    assert_eq!(
        build_query(Some("x eq '1'"), Some(select.as_slice())),
        "?$filter=x eq '1'&$select=Measure,Value"
    );
}

#[test]
fn raw_query_overrides_filters_with_warning() {
    let filters = Filters::new().with("RegioS", "NL01");
    let plan = QueryPlan::resolve(Some("$top=10"), &filters, None);
    assert_eq!(plan.query, "?$top=10");
    assert_eq!(plan.warnings.len(), 1);

    let quiet = QueryPlan::resolve(Some("?$top=10"), &Filters::new(), None);
    assert_eq!(quiet.query, "?$top=10");
    assert!(quiet.warnings.is_empty());
}

#[test]
fn filter_arguments_parse() {
    let single: FilterArg = "RegioS=NL01".parse().unwrap();
    assert_eq!(single.column, "RegioS");
    assert_eq!(single.value, FilterValue::One("NL01".to_string()));

    let several: FilterArg = "Perioden = 2020JJ00, 2021JJ00".parse().unwrap();
    assert_eq!(
        several.value,
        FilterValue::AnyOf(vec!["2020JJ00".to_string(), "2021JJ00".to_string()])
    );

    assert_matches!("Perioden".parse::<FilterArg>(), Err(OdataError::InvalidFilter(_)));
    assert_matches!("=x".parse::<FilterArg>(), Err(OdataError::InvalidFilter(_)));
}

#[test]
fn later_filter_on_same_column_replaces_earlier() {
    let filters: Filters = ["RegioS=NL01", "RegioS=GM0363"]
        .iter()
        .map(|arg| arg.parse::<FilterArg>().unwrap())
        .collect();
    assert_eq!(filters.len(), 1);
    assert_eq!(
        build_filter(&filters).as_deref(),
        Some("(RegioS eq 'GM0363')")
    );
}

#[test]
fn plan_url_encodes_options_but_keeps_raw_query() {
    const ENDPOINT: &str = "https://odata4.cbs.nl/CBS/81575NED/Observations";
    let select = vec!["Measure".to_string(), "Value".to_string()];
    let filters = Filters::new().with("RegioS", "A&B #1+2");
    let plan = QueryPlan::resolve(None, &filters, Some(select.as_slice()));
    let url = plan.url(ENDPOINT).unwrap();
    assert_eq!(url.fragment(), None);
    let pairs = url.query_pairs().into_owned().collect::<Vec<_>>();
    assert_eq!(
        pairs,
        [
            ("$filter".to_string(), "(RegioS eq 'A&B #1+2')".to_string()),
            ("$select".to_string(), "Measure,Value".to_string()),
        ]
    );

    let raw = QueryPlan::resolve(Some("$top=1&$skip=2"), &Filters::new(), None);
    assert_eq!(raw.url(ENDPOINT).unwrap().as_str(), format!("{ENDPOINT}?$top=1&$skip=2"));

    let bare = QueryPlan::resolve(None, &Filters::new(), None);
    assert_eq!(bare.url(ENDPOINT).unwrap().as_str(), ENDPOINT);
    assert_matches!(bare.url("not a url"), Err(OdataError::Validation(_)));
}
