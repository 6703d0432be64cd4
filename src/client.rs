use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;

use crate::error::OdataError;

pub const NEXT_LINK: &str = "@odata.nextLink";

pub trait JsonFetcher: Send + Sync {
    fn fetch_json(&self, url: &str) -> Result<Value, OdataError>;
}

impl<T: JsonFetcher + ?Sized> JsonFetcher for &T {
    fn fetch_json(&self, url: &str) -> Result<Value, OdataError> {
        (**self).fetch_json(url)
    }
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, OdataError> {
        Self::with_timeout(Duration::from_secs(60))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, OdataError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("cbs4/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| OdataError::Http(err.to_string()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| OdataError::Http(err.to_string()))?;
        Ok(Self { client })
    }

    fn send_with_retries(&self, url: &str) -> Result<reqwest::blocking::Response, OdataError> {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            let response = self.client.get(url).send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        tracing::debug!(status, attempt, "retrying {url}");
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        tracing::debug!(attempt, "retrying {url}: {err}");
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(OdataError::Http(err.to_string()));
                }
            }
        }
    }
}

impl JsonFetcher for HttpFetcher {
    fn fetch_json(&self, url: &str) -> Result<Value, OdataError> {
        let response = self.send_with_retries(url)?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "request failed".to_string());
            return Err(OdataError::HttpStatus {
                status,
                url: url.to_string(),
                message,
            });
        }
        response
            .json::<Value>()
            .map_err(|err| OdataError::Json(format!("{url}: {err}")))
    }
}

pub fn page_values(page: &Value) -> &[Value] {
    page.get("value")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

pub fn next_link(page: &Value) -> Option<&str> {
    page.get(NEXT_LINK)
        .and_then(Value::as_str)
        .filter(|link| !link.is_empty())
}

pub fn fetch_all_values(fetcher: &dyn JsonFetcher, url: &str) -> Result<Vec<Value>, OdataError> {
    let mut values = Vec::new();
    let mut next = Some(url.to_string());
    while let Some(url) = next {
        tracing::info!("Retrieving {url}");
        let page = fetcher.fetch_json(&url)?;
        values.extend(page_values(&page).iter().cloned());
        next = next_link(&page).map(str::to_string);
    }
    Ok(values)
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn page_helpers() {
        let page = json!({"value": [{"Id": 1}], "@odata.nextLink": "https://next"});
        assert_eq!(page_values(&page).len(), 1);
        assert_eq!(next_link(&page), Some("https://next"));

        let last = json!({"value": [], "@odata.nextLink": null});
        assert!(page_values(&last).is_empty());
        assert_eq!(next_link(&last), None);
        assert!(page_values(&json!({})).is_empty());
    }

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(503));
        assert!(!is_retryable_status(404));
    }
}
