//! Realtime-database REST client.
//!
//! Reads are `GET <url><path>.json`. The transaction loop reads with
//! `X-Firebase-ETag: true`, then writes with `if-match: <etag>`; a `412`
//! means another writer got there first and the loop starts over.

use ::async_trait::async_trait;
use hackhub_core::{DataError, DataResult, ErrorKind};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::Value as JsonValue;

use super::path::TreePath;
use super::store::{TreeStore, TreeUpdateFn};
use crate::config::TreeStoreConfig;

const ETAG_REQUEST_HEADER: &str = "X-Firebase-ETag";

/// [`TreeStore`] over the realtime database REST API.
#[derive(Debug, Clone)]
pub struct RestTreeStore {
    client: Client,
    base_url: String,
    auth: Option<String>,
    max_retries: u32,
}

impl RestTreeStore {
    pub fn new(config: &TreeStoreConfig) -> DataResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                DataError::unavailable("Failed to build realtime database client").with_detail(e.to_string())
            })?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            auth: config.auth.clone(),
            max_retries: config.max_retries.max(1),
        })
    }

    fn url(&self, path: &TreePath) -> String {
        if path.is_root() {
            format!("{}/.json", self.base_url)
        } else {
            format!("{}{}.json", self.base_url, path)
        }
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Some(token) => builder.query(&[("auth", token.as_str())]),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> DataResult<Response> {
        self.request(builder).send().await.map_err(transport_error)
    }

    async fn read_with_etag(&self, path: &TreePath) -> DataResult<(String, JsonValue)> {
        let response = self
            .send(self.client.get(self.url(path)).header(ETAG_REQUEST_HEADER, "true"))
            .await?;
        let response = check_status(response).await?;
        let etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| DataError::unknown("Realtime database omitted the ETag header"))?;
        let value = response.json::<JsonValue>().await.map_err(transport_error)?;
        Ok((etag, value))
    }
}

fn transport_error(err: reqwest::Error) -> DataError {
    let kind = if err.is_connect() || err.is_timeout() {
        ErrorKind::Unavailable
    } else {
        ErrorKind::Unknown
    };
    DataError::from_kind(kind).with_detail(err.to_string())
}

fn status_kind(status: StatusCode) -> ErrorKind {
    match status {
        StatusCode::BAD_REQUEST => ErrorKind::Validation,
        StatusCode::NOT_FOUND => ErrorKind::NotFound,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ErrorKind::Forbidden,
        s if s.is_server_error() => ErrorKind::Unavailable,
        _ => ErrorKind::Unknown,
    }
}

async fn check_status(response: Response) -> DataResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(DataError::from_kind(status_kind(status)).with_detail(format!("HTTP {}: {}", status, body)))
}

#[async_trait]
impl TreeStore for RestTreeStore {
    async fn read_once(&self, path: &TreePath) -> DataResult<Option<JsonValue>> {
        let response = self.send(self.client.get(self.url(path))).await?;
        let value = check_status(response)
            .await?
            .json::<JsonValue>()
            .await
            .map_err(transport_error)?;
        Ok((!value.is_null()).then_some(value))
    }

    async fn transaction(&self, path: &TreePath, update: TreeUpdateFn<'_>) -> DataResult<JsonValue> {
        for attempt in 1..=self.max_retries {
            let (etag, current) = self.read_with_etag(path).await?;
            let next = update((!current.is_null()).then_some(&current));

            let response = self
                .send(
                    self.client
                        .put(self.url(path))
                        .header(reqwest::header::IF_MATCH, etag)
                        .json(&next),
                )
                .await?;
            if response.status() == StatusCode::PRECONDITION_FAILED {
                tracing::debug!(path = %path, attempt, "conditional write lost a race, retrying");
                continue;
            }
            check_status(response).await?;
            return Ok(next);
        }
        Err(DataError::unavailable("Realtime database transaction did not commit")
            .with_detail(format!("{} attempts exhausted for {}", self.max_retries, path)))
    }

    async fn remove(&self, path: &TreePath) -> DataResult<()> {
        let response = self.send(self.client.delete(self.url(path))).await?;
        check_status(response).await?;
        Ok(())
    }

    fn ref_url(&self, path: &TreePath) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn store(url: &str) -> RestTreeStore {
        RestTreeStore::new(&TreeStoreConfig {
            url: url.to_string(),
            auth: None,
            request_timeout: Duration::from_secs(1),
            max_retries: 3,
        })
        .unwrap()
    }

    #[test]
    fn test_urls() {
        let store = store("https://db.example.com/");
        let path = TreePath::parse("/updates/h1").unwrap();
        assert_eq!(store.url(&path), "https://db.example.com/updates/h1.json");
        assert_eq!(store.url(&TreePath::root()), "https://db.example.com/.json");
        assert_eq!(store.ref_url(&path), "https://db.example.com/updates/h1");
    }

    #[test]
    fn test_status_kinds() {
        assert_eq!(status_kind(StatusCode::UNAUTHORIZED), ErrorKind::Forbidden);
        assert_eq!(status_kind(StatusCode::SERVICE_UNAVAILABLE), ErrorKind::Unavailable);
        assert_eq!(status_kind(StatusCode::IM_A_TEAPOT), ErrorKind::Unknown);
    }
}
