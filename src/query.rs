use std::str::FromStr;

use reqwest::Url;

use crate::error::OdataError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    One(String),
    AnyOf(Vec<String>),
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::One(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::One(value)
    }
}

impl From<Vec<String>> for FilterValue {
    fn from(values: Vec<String>) -> Self {
        FilterValue::AnyOf(values)
    }
}

impl From<Vec<&str>> for FilterValue {
    fn from(values: Vec<&str>) -> Self {
        FilterValue::AnyOf(values.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for FilterValue {
    fn from(values: [&str; N]) -> Self {
        FilterValue::AnyOf(values.iter().map(|v| v.to_string()).collect())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters(Vec<(String, FilterValue)>);

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<FilterValue>) {
        let column = column.into();
        let value = value.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == column) {
            Some(slot) => slot.1 = value,
            None => self.0.push((column, value)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FilterValue)> {
        self.0.iter().map(|(column, value)| (column.as_str(), value))
    }

    pub fn columns(&self) -> Vec<&str> {
        self.0.iter().map(|(column, _)| column.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterArg {
    pub column: String,
    pub value: FilterValue,
}

impl FromStr for FilterArg {
    type Err = OdataError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (column, rest) = value
            .split_once('=')
            .ok_or_else(|| OdataError::InvalidFilter(value.to_string()))?;
        let column = column.trim();
        if column.is_empty() {
            return Err(OdataError::InvalidFilter(value.to_string()));
        }
        let values = rest
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>();
        let value = match values.len() {
            0 => return Err(OdataError::InvalidFilter(value.to_string())),
            1 => FilterValue::One(values.into_iter().next().unwrap_or_default()),
            _ => FilterValue::AnyOf(values),
        };
        Ok(Self {
            column: column.to_string(),
            value,
        })
    }
}

impl FromIterator<FilterArg> for Filters {
    fn from_iter<T: IntoIterator<Item = FilterArg>>(iter: T) -> Self {
        let mut filters = Filters::new();
        for arg in iter {
            filters.insert(arg.column, arg.value);
        }
        filters
    }
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub fn eq(column: &str, values: impl Into<FilterValue>) -> String {
    match values.into() {
        FilterValue::One(value) => format!("{column} eq {}", quote(&value)),
        FilterValue::AnyOf(values) => {
            let conditions = values
                .iter()
                .map(|value| format!("{column} eq {}", quote(value)))
                .collect::<Vec<_>>();
            format!("({})", conditions.join(" or "))
        }
    }
}

pub fn contains(column: &str, substring: &str) -> String {
    format!("contains({column}, {})", quote(substring))
}

pub fn startswith(column: &str, prefix: &str) -> String {
    format!("startswith({column}, {})", quote(prefix))
}

pub fn endswith(column: &str, suffix: &str) -> String {
    format!("endswith({column}, {})", quote(suffix))
}

pub fn and_filter<I, S>(filters: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    join_clauses(filters, " and ")
}

pub fn or_filter<I, S>(filters: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    join_clauses(filters, " or ")
}

fn join_clauses<I, S>(filters: I, separator: &str) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    filters
        .into_iter()
        .map(|clause| format!("({})", clause.as_ref()))
        .collect::<Vec<_>>()
        .join(separator)
}

pub fn build_filter(filters: &Filters) -> Option<String> {
    let clauses = filters
        .iter()
        .filter(|(_, value)| !matches!(value, FilterValue::AnyOf(values) if values.is_empty()))
        .map(|(column, value)| eq(column, value.clone()))
        .collect::<Vec<_>>();
    if clauses.is_empty() {
        return None;
    }
    Some(and_filter(clauses))
}

pub fn build_query(filter: Option<&str>, select: Option<&[String]>) -> String {
    let mut parts = Vec::new();
    if let Some(filter) = filter.filter(|f| !f.is_empty()) {
        parts.push(format!("$filter={filter}"));
    }
    if let Some(select) = select.filter(|s| !s.is_empty()) {
        parts.push(format!("$select={}", select.join(",")));
    }
    if parts.is_empty() {
        return String::new();
    }
    format!("?{}", parts.join("&"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum QueryParts {
    Raw(String),
    Options {
        filter: Option<String>,
        select: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    pub query: String,
    pub warnings: Vec<String>,
    parts: QueryParts,
}

impl QueryPlan {
    pub fn resolve(raw: Option<&str>, filters: &Filters, select: Option<&[String]>) -> Self {
        match raw {
            Some(raw) => {
                let mut warnings = Vec::new();
                if !filters.is_empty() {
                    let message = format!(
                        "query argument is used, so ignoring filters on {}",
                        filters.columns().join(", ")
                    );
                    tracing::warn!("{message}");
                    warnings.push(message);
                }
                let raw = raw.trim().trim_start_matches('?');
                let query = if raw.is_empty() {
                    String::new()
                } else {
                    format!("?{raw}")
                };
                Self {
                    query,
                    warnings,
                    parts: QueryParts::Raw(raw.to_string()),
                }
            }
            None => {
                let filter = build_filter(filters);
                let select = select.filter(|s| !s.is_empty());
                Self {
                    query: build_query(filter.as_deref(), select),
                    warnings: Vec::new(),
                    parts: QueryParts::Options {
                        filter,
                        select: select.map(|columns| columns.join(",")),
                    },
                }
            }
        }
    }

    // Filter values are free text, so options are form-encoded as pairs.
    // A raw query is taken as written and only gets characters that are
    // illegal in a query escaped.
    pub fn url(&self, endpoint: &str) -> Result<Url, OdataError> {
        let mut url = Url::parse(endpoint)
            .map_err(|err| OdataError::Validation(format!("invalid url {endpoint}: {err}")))?;
        match &self.parts {
            QueryParts::Raw(raw) if raw.is_empty() => {}
            QueryParts::Raw(raw) => url.set_query(Some(raw.as_str())),
            QueryParts::Options {
                filter: None,
                select: None,
            } => {}
            QueryParts::Options { filter, select } => {
                let mut pairs = url.query_pairs_mut();
                if let Some(filter) = filter {
                    pairs.append_pair("$filter", filter);
                }
                if let Some(select) = select {
                    pairs.append_pair("$select", select);
                }
            }
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn eq_scalar_and_list() {
        assert_eq!(eq("Perioden", "2023JJ00"), "Perioden eq '2023JJ00'");
        assert_eq!(
            eq("Perioden", ["2022JJ00", "2023JJ00"]),
            "(Perioden eq '2022JJ00' or Perioden eq '2023JJ00')"
        );
    }

    #[test]
    fn quotes_are_doubled() {
        assert_eq!(eq("Regio", "'s-Hertogenbosch"), "Regio eq '''s-Hertogenbosch'");
    }

    #[test]
    fn string_functions() {
        assert_eq!(contains("Title", "bouw"), "contains(Title, 'bouw')");
        assert_eq!(startswith("Regio", "GM"), "startswith(Regio, 'GM')");
        assert_eq!(endswith("Perioden", "JJ00"), "endswith(Perioden, 'JJ00')");
        assert_eq!(or_filter(["a eq '1'", "b eq '2'"]), "(a eq '1') or (b eq '2')");
    }

    #[test]
    fn parse_filter_arg() {
        let arg: FilterArg = "Perioden=2022JJ00,2023JJ00".parse().unwrap();
        assert_eq!(arg.column, "Perioden");
        assert_eq!(arg.value, FilterValue::from(["2022JJ00", "2023JJ00"]));

        let arg: FilterArg = "Geslacht=T001038".parse().unwrap();
        assert_eq!(arg.value, FilterValue::One("T001038".to_string()));

        assert_matches!("Perioden".parse::<FilterArg>(), Err(OdataError::InvalidFilter(_)));
        assert_matches!("=x".parse::<FilterArg>(), Err(OdataError::InvalidFilter(_)));
    }

    #[test]
    fn later_filter_replaces_earlier() {
        let filters = Filters::new().with("A", "1").with("B", "2").with("A", "3");
        assert_eq!(filters.len(), 2);
        assert_eq!(
            build_filter(&filters).unwrap(),
            "(A eq '3') and (B eq '2')"
        );
    }

    #[test]
    fn empty_list_contributes_nothing() {
        let filters = Filters::new().with("A", Vec::<String>::new());
        assert_eq!(build_filter(&filters), None);
    }
}
