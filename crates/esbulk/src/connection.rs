//! 🔌 Connection — one HTTP endpoint, one encoder, one version.
//!
//! A [`Connection`] owns everything needed to talk to a single server:
//! the reqwest client built from [`TransportConfig`], the body encoder
//! picked by compression level, preconfigured headers and query
//! parameters, and the server version learned at `connect` time. Methods
//! take `&mut self` because the encoder buffer is reused across calls;
//! one connection serves one caller at a time, and concurrency comes
//! from running more connections (see [`ConnectionPool`]).
//!
//! [`ConnectionPool`]: crate::pool::ConnectionPool

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use semver::Version;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::bulk::BulkResult;
use crate::encoder::{BodyEncoder, Doc, EncodeError, Encoder};
use crate::transport::TransportConfig;

// ===== Errors =====

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// Non-2xx response. `status` renders with its canonical reason
    /// phrase, e.g. `500 Internal Server Error`.
    #[error("server returned {status}: {body}")]
    Http { status: StatusCode, body: String },
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Response(#[from] crate::bulk::ResponseError),
    #[error("invalid connection config: {0}")]
    InvalidConfig(String),
    #[error("server version unknown, connect first")]
    MissingVersion,
    #[error("temporary bulk send failure")]
    TempBulkFailure,
}

// ===== Config =====

/// Everything needed to establish one connection, figment-friendly.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Server URL, scheme and optional path prefix included. Credentials
    /// embedded in the URL are extracted and used for basic auth.
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// API key credentials as `id:api_key`; sent base64-encoded in an
    /// `Authorization: ApiKey` header. Mutually exclusive with
    /// username/password.
    pub api_key: Option<String>,
    /// Extra headers stamped on every request.
    pub headers: HashMap<String, String>,
    /// Query parameters stamped on every request; per-call parameters
    /// override these on key collision.
    pub parameters: HashMap<String, String>,
    /// 0 disables compression, 1-9 select the gzip level.
    pub compression_level: u32,
    /// Escape `<`, `>` and `&` in encoded string values.
    pub escape_html: bool,
    pub transport: TransportConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            url: "http://localhost:9200".to_string(),
            username: None,
            password: None,
            api_key: None,
            headers: HashMap::new(),
            parameters: HashMap::new(),
            compression_level: 0,
            escape_html: false,
            transport: TransportConfig::default(),
        }
    }
}

impl ConnectionConfig {
    /// Reject contradictory auth settings up front, before any request
    /// is attempted.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.api_key.is_some() && (self.username.is_some() || self.password.is_some()) {
            return Err(ClientError::InvalidConfig(
                "api_key and username/password are mutually exclusive".to_string(),
            ));
        }
        Ok(())
    }
}

// ===== Connection =====

pub struct Connection {
    url: Url,
    username: Option<String>,
    password: Option<String>,
    /// Pre-encoded `ApiKey <base64>` header value.
    api_key_header: Option<HeaderValue>,
    headers: HeaderMap,
    params: HashMap<String, String>,
    http: reqwest::Client,
    encoder: Encoder,
    version: Option<Version>,
}

impl Connection {
    pub fn new(config: ConnectionConfig) -> Result<Self, ClientError> {
        config.validate()?;

        let mut url = Url::parse(&config.url)
            .map_err(|err| ClientError::InvalidConfig(format!("invalid url: {err}")))?;

        // credentials embedded in the URL win over the config fields and
        // are stripped so they never appear in logs or request lines
        let mut username = config.username;
        let mut password = config.password;
        if !url.username().is_empty() {
            username = Some(url.username().to_string());
            password = url.password().map(str::to_string);
            url.set_username("")
                .and_then(|()| url.set_password(None))
                .map_err(|()| ClientError::InvalidConfig("cannot strip url credentials".into()))?;
        }

        let api_key_header = config
            .api_key
            .as_deref()
            .map(|key| {
                let encoded = format!("ApiKey {}", BASE64.encode(key));
                HeaderValue::from_str(&encoded)
                    .map_err(|err| ClientError::InvalidConfig(format!("invalid api key: {err}")))
            })
            .transpose()?;

        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| ClientError::InvalidConfig(format!("invalid header name: {err}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|err| ClientError::InvalidConfig(format!("invalid header value: {err}")))?;
            headers.insert(name, value);
        }

        Ok(Connection {
            url,
            username,
            password,
            api_key_header,
            headers,
            params: config.parameters,
            http: config.transport.build()?,
            encoder: Encoder::for_level(config.compression_level, config.escape_html)?,
            version: None,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Server version learned by [`connect`](Self::connect), if any.
    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    /// Probe the root endpoint and remember the server version.
    pub async fn connect(&mut self) -> Result<&Version, ClientError> {
        let (status, body) = self.execute(Method::GET, "/", &HashMap::new(), None).await?;
        if !status.is_success() {
            return Err(ClientError::Http {
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        #[derive(Deserialize)]
        struct Root {
            version: RootVersion,
        }
        #[derive(Deserialize)]
        struct RootVersion {
            number: String,
        }

        let root: Root = serde_json::from_slice(&body).map_err(|err| {
            ClientError::InvalidConfig(format!("unparseable root response: {err}"))
        })?;
        let version = Version::parse(&root.version.number).map_err(|err| {
            ClientError::InvalidConfig(format!(
                "unparseable server version {:?}: {err}",
                root.version.number
            ))
        })?;
        info!(url = %self.url, version = %version, "connected");
        Ok(self.version.insert(version))
    }

    /// Cheap liveness check. Does not touch the cached version.
    pub async fn ping(&mut self) -> Result<StatusCode, ClientError> {
        let (status, _) = self.execute(Method::HEAD, "/", &HashMap::new(), None).await?;
        Ok(status)
    }

    /// Send one bulk request.
    ///
    /// `body` alternates action meta lines and documents as prepared by
    /// the caller. An empty body short-circuits to `(0, None)` without
    /// touching the network. A 429 maps to [`ClientError::TempBulkFailure`]
    /// so callers can retry the whole batch; other non-2xx statuses are
    /// [`ClientError::Http`].
    pub async fn bulk(
        &mut self,
        index: &str,
        doc_type: Option<&str>,
        params: &HashMap<String, String>,
        body: &[Doc],
    ) -> Result<(u16, Option<BulkResult>), ClientError> {
        if body.is_empty() {
            return Ok((0, None));
        }

        self.encoder.reset();
        for doc in body {
            self.encoder.add_raw(doc)?;
        }
        let payload = self.encoder.finish()?;
        debug!(
            docs = body.len(),
            raw_bytes = self.encoder.raw_len(),
            wire_bytes = payload.len(),
            "sending bulk request"
        );

        let path = bulk_path(index, doc_type);
        let (status, response) = self
            .execute(Method::POST, &path, params, Some(payload))
            .await?;
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ClientError::TempBulkFailure);
        }
        if !status.is_success() {
            return Err(ClientError::Http {
                status,
                body: String::from_utf8_lossy(&response).into_owned(),
            });
        }
        Ok((status.as_u16(), Some(BulkResult::new(response))))
    }

    /// Send a monitoring bulk request to the version-appropriate path,
    /// connecting first if the version is not yet known.
    pub async fn send_monitoring_bulk(
        &mut self,
        params: &HashMap<String, String>,
        body: &[Doc],
    ) -> Result<(u16, Option<BulkResult>), ClientError> {
        if body.is_empty() {
            return Ok((0, None));
        }
        if self.version.is_none() {
            self.connect().await?;
        }
        let version = self.version.as_ref().ok_or(ClientError::MissingVersion)?;
        let path = if version.major < 7 {
            "/_xpack/monitoring/_bulk"
        } else {
            "/_monitoring/bulk"
        };

        self.encoder.reset();
        for doc in body {
            self.encoder.add_raw(doc)?;
        }
        let payload = self.encoder.finish()?;

        let (status, response) = self
            .execute(Method::POST, path, params, Some(payload))
            .await?;
        if !status.is_success() {
            return Err(ClientError::Http {
                status,
                body: String::from_utf8_lossy(&response).into_owned(),
            });
        }
        Ok((status.as_u16(), Some(BulkResult::new(response))))
    }

    /// Generic single-document request, for everything that is not bulk
    /// (index creation, template installs, deletes).
    pub async fn request(
        &mut self,
        method: Method,
        path: &str,
        params: &HashMap<String, String>,
        body: Option<&Doc>,
    ) -> Result<(StatusCode, Vec<u8>), ClientError> {
        let payload = match body {
            Some(doc) => {
                self.encoder.marshal(doc)?;
                Some(self.encoder.finish()?)
            }
            None => None,
        };
        let (status, response) = self.execute(method, path, params, payload).await?;
        if !status.is_success() {
            return Err(ClientError::Http {
                status,
                body: String::from_utf8_lossy(&response).into_owned(),
            });
        }
        Ok((status, response))
    }

    // ===== internals =====

    async fn execute(
        &mut self,
        method: Method,
        path: &str,
        params: &HashMap<String, String>,
        payload: Option<Vec<u8>>,
    ) -> Result<(StatusCode, Vec<u8>), ClientError> {
        let url = join_path(&self.url, path);
        let mut request = self.http.request(method, url).headers(self.headers.clone());

        let merged = self.merged_params(params);
        if !merged.is_empty() {
            request = request.query(&merged);
        }

        // api key wins when both are somehow present
        if let Some(api_key) = &self.api_key_header {
            request = request.header(AUTHORIZATION, api_key.clone());
        } else if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_deref());
        }

        if let Some(payload) = payload {
            let mut body_headers = HeaderMap::new();
            self.encoder.apply_headers(&mut body_headers);
            request = request.headers(body_headers).body(payload);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?.to_vec();
        Ok((status, body))
    }

    /// Per-call parameters override the preconfigured ones.
    fn merged_params(&self, local: &HashMap<String, String>) -> Vec<(String, String)> {
        let mut merged = self.params.clone();
        for (key, value) in local {
            merged.insert(key.clone(), value.clone());
        }
        let mut pairs: Vec<(String, String)> = merged.into_iter().collect();
        pairs.sort();
        pairs
    }
}

/// `/_bulk`, scoped by index and legacy document type when given.
fn bulk_path(index: &str, doc_type: Option<&str>) -> String {
    match (index, doc_type) {
        ("", _) => "/_bulk".to_string(),
        (index, None) => format!("/{index}/_bulk"),
        (index, Some(doc_type)) => format!("/{index}/{doc_type}/_bulk"),
    }
}

/// Append `path` to the configured URL, preserving any path prefix.
fn join_path(base: &Url, path: &str) -> String {
    format!("{}{}", base.as_str().trim_end_matches('/'), path)
}
