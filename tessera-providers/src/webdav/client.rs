// SPDX-License-Identifier: AGPL-3.0-or-later
//! WebDAV sessions over HTTP (reqwest)

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, Client, Method, RequestBuilder, Response, StatusCode};
use tessera_core::{ConnectionFactory, Configuration, NativeError, NativeResult, PersistenceError, PersistenceResult};

use super::multistatus::{failed_status, parse_multistatus, propfind_body, proppatch_body};
use super::{DavResource, WebdavSession};

/// WebDAV authentication method
#[derive(Clone)]
pub enum WebdavAuth {
    /// No authentication
    None,
    /// Basic authentication
    Basic { username: String, password: String },
    /// Bearer token (OAuth)
    Bearer(String),
}

impl std::fmt::Debug for WebdavAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WebdavAuth::None => f.write_str("None"),
            WebdavAuth::Basic { username, .. } => f.debug_struct("Basic").field("username", username).finish(),
            WebdavAuth::Bearer(_) => f.write_str("Bearer(<redacted>)"),
        }
    }
}

/// Opens HTTP sessions to one WebDAV server.
#[derive(Debug, Clone)]
pub struct HttpWebdavConnector {
    /// `scheme://host[:port]`, without path
    origin: String,
    auth: WebdavAuth,
    headers: Vec<(String, String)>,
}

impl HttpWebdavConnector {
    pub fn new(origin: impl Into<String>, auth: WebdavAuth) -> Self {
        Self {
            origin: origin.into().trim_end_matches('/').to_string(),
            auth,
            headers: Vec::new(),
        }
    }

    /// `webdav` maps to `http`, `webdavs` to `https`.
    pub fn from_config(config: &Configuration) -> PersistenceResult<Self> {
        let scheme = match config.scheme.to_ascii_lowercase().as_str() {
            "webdav" | "http" => "http",
            "webdavs" | "https" => "https",
            other => {
                return Err(PersistenceError::Configuration(format!("'{}' is not a WebDAV scheme", other)));
            }
        };
        let host = config.require_host()?;
        let origin = match config.port {
            Some(port) => format!("{}://{}:{}", scheme, host, port),
            None => format!("{}://{}", scheme, host),
        };
        let auth = match (&config.username, &config.password) {
            (Some(username), Some(password)) => WebdavAuth::Basic {
                username: username.clone(),
                password: password.clone(),
            },
            _ => WebdavAuth::None,
        };
        Ok(Self::new(origin, auth))
    }

    /// Extra header sent with every request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }
}

#[async_trait]
impl ConnectionFactory for HttpWebdavConnector {
    type Connection = HttpWebdavSession;

    async fn create_connection(&self) -> PersistenceResult<HttpWebdavSession> {
        let http = Client::builder()
            .build()
            .map_err(|e| PersistenceError::connection(&self.origin, NativeError::Other(e.to_string())))?;
        tracing::debug!(origin = %self.origin, "opened WebDAV session");
        Ok(HttpWebdavSession { http, connector: self.clone() })
    }
}

/// HTTP client bound to one WebDAV server
pub struct HttpWebdavSession {
    http: Client,
    connector: HttpWebdavConnector,
}

fn dav_method(name: &'static str) -> NativeResult<Method> {
    Method::from_bytes(name.as_bytes()).map_err(|e| NativeError::Other(format!("{}: {}", name, e)))
}

fn transport(err: reqwest::Error) -> NativeError {
    if err.is_connect() || err.is_timeout() {
        NativeError::ConnectionLost(err.to_string())
    } else {
        NativeError::Other(err.to_string())
    }
}

/// Map a non-success status to the native vocabulary.
async fn check(response: Response, path: &str) -> NativeResult<Response> {
    let status = response.status();
    if status.is_success() || status == StatusCode::MULTI_STATUS {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(NativeError::NotFound(path.to_string()));
    }
    let message = response.text().await.unwrap_or_default();
    Err(NativeError::Status {
        code: u32::from(status.as_u16()),
        message: format!("{}: {}", status, message.trim()),
    })
}

impl HttpWebdavSession {
    /// Build authenticated request
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.connector.origin, path);
        let mut request = self.http.request(method, &url);

        match &self.connector.auth {
            WebdavAuth::None => {}
            WebdavAuth::Basic { username, password } => {
                request = request.basic_auth(username, Some(password));
            }
            WebdavAuth::Bearer(token) => {
                request = request.bearer_auth(token);
            }
        }

        for (key, value) in &self.connector.headers {
            request = request.header(key, value);
        }

        request
    }

    fn destination(&self, path: &str) -> String {
        format!("{}{}", self.connector.origin, path)
    }

    async fn send(&self, request: RequestBuilder, path: &str) -> NativeResult<Response> {
        let response = request.send().await.map_err(transport)?;
        check(response, path).await
    }
}

#[async_trait]
impl WebdavSession for HttpWebdavSession {
    async fn resource_types(&mut self, path: &str, with_members: bool) -> NativeResult<Vec<DavResource>> {
        let request = self
            .request(dav_method("PROPFIND")?, path)
            .header("Depth", if with_members { "1" } else { "0" })
            .header(header::CONTENT_TYPE, "application/xml")
            .body(propfind_body());
        let response = self.send(request, path).await?;
        let text = response.text().await.map_err(transport)?;
        parse_multistatus(&text)
    }

    async fn make_collection(&mut self, path: &str) -> NativeResult<()> {
        let request = self.request(dav_method("MKCOL")?, path);
        self.send(request, path).await.map(|_| ())
    }

    async fn put(&mut self, path: &str, content: Bytes) -> NativeResult<()> {
        let request = self.request(Method::PUT, path).body(content);
        self.send(request, path).await.map(|_| ())
    }

    async fn get(&mut self, path: &str) -> NativeResult<Bytes> {
        let request = self.request(Method::GET, path);
        let response = self.send(request, path).await?;
        response.bytes().await.map_err(transport)
    }

    async fn delete(&mut self, path: &str) -> NativeResult<()> {
        let request = self.request(Method::DELETE, path);
        self.send(request, path).await.map(|_| ())
    }

    async fn move_to(&mut self, path: &str, destination: &str) -> NativeResult<()> {
        let request = self
            .request(dav_method("MOVE")?, path)
            .header("Destination", self.destination(destination))
            .header("Overwrite", "T");
        self.send(request, path).await.map(|_| ())
    }

    async fn copy_to(&mut self, path: &str, destination: &str) -> NativeResult<()> {
        let request = self
            .request(dav_method("COPY")?, path)
            .header("Destination", self.destination(destination))
            .header("Depth", "infinity")
            .header("Overwrite", "T");
        self.send(request, path).await.map(|_| ())
    }

    async fn set_property(&mut self, path: &str, namespace: &str, name: &str, value: &str) -> NativeResult<()> {
        let request = self
            .request(dav_method("PROPPATCH")?, path)
            .header(header::CONTENT_TYPE, "application/xml")
            .body(proppatch_body(namespace, name, value));
        let response = self.send(request, path).await?;
        // PROPPATCH reports per-property failures inside a 207
        let text = response.text().await.map_err(transport)?;
        match failed_status(&text) {
            None => Ok(()),
            Some(status) => Err(NativeError::Status {
                code: u32::from(StatusCode::MULTI_STATUS.as_u16()),
                message: format!("PROPPATCH of {} rejected: {}", path, status),
            }),
        }
    }
}
