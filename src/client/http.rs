use super::config::ClientConfig;
use super::{ResourceStore, UpdateMode, validate_collection_name};
use crate::core::{DashboardError, Record, RecordKey, Result};
use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Instant;
use tracing::{debug, warn};

/// REST client for a json-server style store.
///
/// ```no_run
/// # use ecole221::{ClientConfig, HttpResourceClient, ResourceStore};
/// # async fn demo() -> ecole221::Result<()> {
/// let client = HttpResourceClient::new(ClientConfig::new("http://localhost:3000"))?;
/// let classes = client.fetch_collection("classes").await?;
/// println!("{} classes", classes.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpResourceClient {
    http: reqwest::Client,
    base: Url,
    config: ClientConfig,
}

impl HttpResourceClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate().map_err(DashboardError::InvalidInput)?;

        let base = Url::parse(&config.base_url).map_err(|e| {
            DashboardError::InvalidInput(format!("invalid base_url '{}': {e}", config.base_url))
        })?;
        if base.cannot_be_a_base() {
            return Err(DashboardError::InvalidInput(format!(
                "base_url '{}' cannot carry a path",
                config.base_url
            )));
        }

        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone());
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(|e| {
            DashboardError::InvalidInput(format!("cannot build HTTP client: {e}"))
        })?;

        Ok(Self { http, base, config })
    }

    /// Client configured from `ECOLE_API_BASE_URL` / `ECOLE_API_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self> {
        let config = ClientConfig::from_env().map_err(DashboardError::InvalidInput)?;
        Self::new(config)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn url(&self, collection: &str, id: Option<&RecordKey>) -> Result<Url> {
        validate_collection_name(collection)?;
        let mut url = self.base.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                DashboardError::InvalidInput(format!(
                    "base_url '{}' cannot carry a path",
                    self.config.base_url
                ))
            })?;
            segments.pop_if_empty().push(collection);
            if let Some(id) = id {
                segments.push(id.as_str());
            }
        }
        Ok(url)
    }

    /// Sends one request and returns the status with the full body.
    async fn send(
        &self,
        method: Method,
        url: Url,
        query: &[(String, String)],
        body: Option<&Record>,
    ) -> Result<(StatusCode, Vec<u8>)> {
        let target = format!("{method} {}", url.path());
        let started = Instant::now();

        let mut request = self.http.request(method.clone(), url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| transport_error(&target, e))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_error(&target, e))?;

        debug!(
            target: "ecole221::client",
            request = %target,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            bytes = bytes.len(),
            "store request"
        );

        Ok((status, bytes.to_vec()))
    }
}

fn transport_error(target: &str, err: reqwest::Error) -> DashboardError {
    let message = if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    };
    warn!(target: "ecole221::client", request = %target, error = %message, "store request failed");
    DashboardError::network(target, message)
}

/// Parses the whole body or fails; a malformed body is a network error.
fn decode<T: DeserializeOwned>(target: &str, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| DashboardError::network(target, format!("malformed response body: {e}")))
}

fn ensure_success(target: &str, status: StatusCode) -> Result<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(DashboardError::http_status(target, status.as_u16()))
    }
}

#[async_trait]
impl ResourceStore for HttpResourceClient {
    async fn fetch_collection(&self, name: &str) -> Result<Vec<Record>> {
        self.fetch_where(name, &[]).await
    }

    async fn fetch_where(&self, name: &str, filters: &[(String, String)]) -> Result<Vec<Record>> {
        let url = self.url(name, None)?;
        let target = format!("GET /{name}");
        let (status, body) = self.send(Method::GET, url, filters, None).await?;
        if status == StatusCode::NOT_FOUND {
            return Err(DashboardError::CollectionNotFound(name.to_string()));
        }
        ensure_success(&target, status)?;
        decode(&target, &body)
    }

    async fn fetch_one(&self, name: &str, id: &RecordKey) -> Result<Record> {
        let url = self.url(name, Some(id))?;
        let target = format!("GET /{name}/{id}");
        let (status, body) = self.send(Method::GET, url, &[], None).await?;
        if status == StatusCode::NOT_FOUND {
            return Err(DashboardError::not_found(name, id));
        }
        ensure_success(&target, status)?;
        decode(&target, &body)
    }

    async fn create(&self, name: &str, payload: Record) -> Result<Record> {
        let url = self.url(name, None)?;
        let target = format!("POST /{name}");
        let (status, body) = self.send(Method::POST, url, &[], Some(&payload)).await?;
        if status == StatusCode::NOT_FOUND {
            return Err(DashboardError::CollectionNotFound(name.to_string()));
        }
        ensure_success(&target, status)?;
        decode(&target, &body)
    }

    async fn update(&self, name: &str, id: &RecordKey, payload: Record, mode: UpdateMode) -> Result<Record> {
        let url = self.url(name, Some(id))?;
        let method = match mode {
            UpdateMode::Partial => Method::PATCH,
            UpdateMode::Full => Method::PUT,
        };
        let target = format!("{method} /{name}/{id}");
        let (status, body) = self.send(method, url, &[], Some(&payload)).await?;
        if status == StatusCode::NOT_FOUND {
            return Err(DashboardError::not_found(name, id));
        }
        ensure_success(&target, status)?;
        decode(&target, &body)
    }

    async fn remove(&self, name: &str, id: &RecordKey) -> Result<()> {
        let url = self.url(name, Some(id))?;
        let target = format!("DELETE /{name}/{id}");
        let (status, _) = self.send(Method::DELETE, url, &[], None).await?;
        if status == StatusCode::NOT_FOUND {
            debug!(target: "ecole221::client", request = %target, "record already deleted");
            return Ok(());
        }
        ensure_success(&target, status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_built_from_segments() {
        let client = HttpResourceClient::new(ClientConfig::new("http://localhost:3000/api")).unwrap();
        let url = client.url("classes", Some(&RecordKey::from(5))).unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/api/classes/5");

        let root = HttpResourceClient::new(ClientConfig::default()).unwrap();
        assert_eq!(
            root.url("etudiants", None).unwrap().as_str(),
            "http://localhost:3000/etudiants"
        );
    }

    #[test]
    fn ids_are_percent_encoded() {
        let client = HttpResourceClient::new(ClientConfig::default()).unwrap();
        let url = client.url("cours", Some(&RecordKey::from("a/b"))).unwrap();
        assert_eq!(url.path(), "/cours/a%2Fb");
    }

    #[test]
    fn bad_collection_names_never_reach_the_network() {
        let client = HttpResourceClient::new(ClientConfig::default()).unwrap();
        assert!(client.url("../admin", None).is_err());
    }

    #[test]
    fn malformed_bodies_are_network_errors() {
        let err = decode::<Vec<Record>>("GET /classes", b"[{\"id\": 1}, 3]").unwrap_err();
        assert_eq!(err.kind(), crate::core::ErrorKind::Network);
    }
}
