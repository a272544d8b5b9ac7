use std::thread;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;

use crate::error::BatcherError;

/// Upstream collaborator: the listing endpoint and the image hosts it points at.
pub trait ImageSource: Send + Sync {
    /// Raw listing items. Anything other than a JSON array is an error.
    fn fetch_listing(&self) -> Result<Vec<Value>, BatcherError>;
    fn download(&self, url: &str) -> Result<Vec<u8>, BatcherError>;
}

/// Pulls the `image_url` string out of a listing item. Missing, null,
/// non-string and empty values all yield `None`.
pub fn image_url(item: &Value) -> Option<&str> {
    item.get("image_url")
        .and_then(Value::as_str)
        .filter(|url| !url.trim().is_empty())
}

#[derive(Clone)]
pub struct HttpImageSource {
    client: Client,
    endpoint: String,
}

impl HttpImageSource {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, BatcherError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("image-batcher/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| BatcherError::UpstreamHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| BatcherError::UpstreamHttp(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn send_with_retries(
        &self,
        url: &str,
    ) -> Result<reqwest::blocking::Response, reqwest::Error> {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match self.client.get(url).send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }
}

impl ImageSource for HttpImageSource {
    fn fetch_listing(&self) -> Result<Vec<Value>, BatcherError> {
        let response = self
            .send_with_retries(&self.endpoint)
            .map_err(|err| BatcherError::UpstreamHttp(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .unwrap_or_else(|_| "listing request failed".to_string());
            return Err(handle_listing_status(status, message));
        }
        let body = response
            .bytes()
            .map_err(|err| BatcherError::UpstreamHttp(err.to_string()))?;
        parse_listing_body(&body)
    }

    fn download(&self, url: &str) -> Result<Vec<u8>, BatcherError> {
        let response = self
            .send_with_retries(url)
            .map_err(|err| BatcherError::DownloadHttp {
                url: url.to_string(),
                message: err.to_string(),
            })?;
        handle_download_status(url, response.status())?;
        let bytes = response.bytes().map_err(|err| BatcherError::DownloadHttp {
            url: url.to_string(),
            message: err.to_string(),
        })?;
        Ok(bytes.to_vec())
    }
}

fn handle_listing_status(status: StatusCode, message: String) -> BatcherError {
    BatcherError::UpstreamStatus {
        status: status.as_u16(),
        message,
    }
}

fn handle_download_status(url: &str, status: StatusCode) -> Result<(), BatcherError> {
    if status.is_success() {
        return Ok(());
    }
    Err(BatcherError::DownloadStatus {
        url: url.to_string(),
        status: status.as_u16(),
    })
}

/// Decodes a listing response body. Invalid JSON and non-array documents are
/// both upstream body errors.
pub fn parse_listing_body(body: &[u8]) -> Result<Vec<Value>, BatcherError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|err| BatcherError::UpstreamBody(err.to_string()))?;
    parse_listing(value)
}

pub fn parse_listing(body: Value) -> Result<Vec<Value>, BatcherError> {
    match body {
        Value::Array(items) => Ok(items),
        other => Err(BatcherError::UpstreamBody(format!(
            "expected array, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn extracts_string_urls_only() {
        assert_eq!(image_url(&json!({"image_url": "http://x/a.png"})), Some("http://x/a.png"));
        assert_eq!(image_url(&json!({"image_url": null})), None);
        assert_eq!(image_url(&json!({"image_url": 42})), None);
        assert_eq!(image_url(&json!({"image_url": "  "})), None);
        assert_eq!(image_url(&json!({"title": "no url"})), None);
        assert_eq!(image_url(&json!("http://x/a.png")), None);
    }

    #[test]
    fn listing_must_be_an_array() {
        let items = parse_listing(json!([{"image_url": "http://x/a.png"}, {}])).unwrap();
        assert_eq!(items.len(), 2);

        let err = parse_listing(json!({"images": []})).unwrap_err();
        assert_matches!(err, BatcherError::UpstreamBody(message) if message.contains("object"));
    }

    #[test]
    fn listing_error_status_maps_to_upstream_status() {
        let err = handle_listing_status(StatusCode::INTERNAL_SERVER_ERROR, "down".to_string());
        assert!(err.is_upstream());
        assert_matches!(
            err,
            BatcherError::UpstreamStatus { status: 500, message } if message == "down"
        );
    }

    #[test]
    fn download_status_mapping() {
        assert!(handle_download_status("http://x/a.png", StatusCode::OK).is_ok());
        let err = handle_download_status("http://x/a.png", StatusCode::NOT_FOUND).unwrap_err();
        assert!(!err.is_upstream());
        assert_matches!(
            err,
            BatcherError::DownloadStatus { url, status: 404 } if url == "http://x/a.png"
        );
    }

    #[test]
    fn listing_body_must_be_a_json_array() {
        let items = parse_listing_body(br#"[{"image_url": "http://x/a.png"}]"#).unwrap();
        assert_eq!(items.len(), 1);
        assert!(parse_listing_body(b"[]").unwrap().is_empty());

        let err = parse_listing_body(br#"{"images": []}"#).unwrap_err();
        assert_matches!(err, BatcherError::UpstreamBody(message) if message.contains("object"));
        let err = parse_listing_body(b"<html>oops</html>").unwrap_err();
        assert!(err.is_upstream());
        assert_matches!(err, BatcherError::UpstreamBody(_));
    }

    #[test]
    fn retry_policy() {
        assert!(is_retryable_status(503));
        assert!(!is_retryable_status(404));
    }
}
