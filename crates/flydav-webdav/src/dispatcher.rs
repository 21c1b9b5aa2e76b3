//! Request dispatch.
//!
//! Every request walks the same pipeline: authenticate, clean the path,
//! authorize, resolve metadata, then serve or mutate. Any step can fail
//! with a [`DavError`], which is turned into exactly one status code.
//!
//! File content is streamed from storage in chunks. Upload bodies are
//! buffered up to the configured limit and rejected with 413 beyond it.

use crate::access::{Authorizer, Permission, Principal};
use crate::body::{self, DavBody};
use crate::config::{Config, DEFAULT_MAX_BODY_SIZE};
use crate::cors::CorsPolicy;
use crate::credentials::{AuthError, Authenticator, BasicCredentials};
use crate::error::{DavError, DavResult};
use crate::listing;
use crate::paths;
use crate::range::parse_range;
use crate::ui::UiMount;
use flydav_storage::{Metadata, Storage};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::header::{self, HeaderMap, HeaderName, HeaderValue};
use hyper::{Method, Request, Response, StatusCode};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use std::fmt;
use std::sync::Arc;
use tracing::{Instrument, Span, debug, error, field, info, info_span, warn};

/// Verbs served, in the order advertised by `Allow`.
pub const ALLOWED_METHODS: &str = "OPTIONS, GET, HEAD, PUT, DELETE, MKCOL, COPY, MOVE";

static DAV: HeaderName = HeaderName::from_static("dav");
static DESTINATION: HeaderName = HeaderName::from_static("destination");
static OVERWRITE: HeaderName = HeaderName::from_static("overwrite");

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The supported verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Get,
    Head,
    Put,
    Delete,
    Mkcol,
    Copy,
    Move,
}

impl Verb {
    fn from_method(method: &Method) -> Option<Self> {
        match method.as_str() {
            "GET" => Some(Verb::Get),
            "HEAD" => Some(Verb::Head),
            "PUT" => Some(Verb::Put),
            "DELETE" => Some(Verb::Delete),
            "MKCOL" => Some(Verb::Mkcol),
            "COPY" => Some(Verb::Copy),
            "MOVE" => Some(Verb::Move),
            _ => None,
        }
    }
}

/// Routes authenticated, authorized requests to storage.
#[derive(Clone)]
pub struct Dispatcher {
    storage: Arc<dyn Storage>,
    authenticator: Arc<dyn Authenticator>,
    authorizer: Arc<Authorizer>,
    mount_prefix: String,
    realm: String,
    max_body_size: u64,
    cors: Option<CorsPolicy>,
    ui: Option<UiMount>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("storage", &self.storage.backend_name())
            .field("mount_prefix", &self.mount_prefix)
            .field("realm", &self.realm)
            .field("max_body_size", &self.max_body_size)
            .field("cors", &self.cors.is_some())
            .field("ui", &self.ui.as_ref().map(UiMount::prefix))
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(
        storage: Arc<dyn Storage>,
        authenticator: Arc<dyn Authenticator>,
        authorizer: Arc<Authorizer>,
    ) -> Self {
        Self {
            storage,
            authenticator,
            authorizer,
            mount_prefix: "/".to_string(),
            realm: "flydav".to_string(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            cors: None,
            ui: None,
        }
    }

    /// Build a dispatcher from a validated configuration.
    ///
    /// The `[ui]` mount needs an opened directory and is attached
    /// separately with [`Dispatcher::with_ui`].
    pub fn from_config(config: &Config, storage: Arc<dyn Storage>) -> Self {
        let dispatcher = Self::new(
            storage,
            Arc::new(config.authenticator()),
            Arc::new(config.authorizer()),
        )
        .with_mount_prefix(&config.server.prefix)
        .with_realm(&config.server.realm)
        .with_max_body_size(config.server.max_body_size);
        match config.cors_policy() {
            Some(policy) => dispatcher.with_cors(policy),
            None => dispatcher,
        }
    }

    /// URL path under which the service is exposed.
    #[must_use]
    pub fn with_mount_prefix(mut self, prefix: &str) -> Self {
        let trimmed = prefix.trim_end_matches('/');
        self.mount_prefix = if trimmed.is_empty() {
            "/".to_string()
        } else {
            trimmed.to_string()
        };
        self
    }

    #[must_use]
    pub fn with_realm(mut self, realm: &str) -> Self {
        self.realm = realm.to_string();
        self
    }

    /// Largest accepted PUT body in bytes.
    #[must_use]
    pub fn with_max_body_size(mut self, limit: u64) -> Self {
        self.max_body_size = limit;
        self
    }

    /// Add CORS headers to responses for allowed origins.
    #[must_use]
    pub fn with_cors(mut self, policy: CorsPolicy) -> Self {
        self.cors = Some(policy);
        self
    }

    /// Serve static assets from `ui` ahead of the WebDAV verbs.
    #[must_use]
    pub fn with_ui(mut self, ui: UiMount) -> Self {
        self.ui = Some(ui);
        self
    }

    pub fn mount_prefix(&self) -> &str {
        &self.mount_prefix
    }

    /// Handle one request. Never fails: errors become status codes.
    pub async fn handle<B>(&self, req: Request<B>) -> Response<DavBody>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        let span = info_span!(
            "request",
            method = %req.method(),
            path = %req.uri().path(),
            user = field::Empty,
        );
        let origin = req.headers().get(header::ORIGIN).cloned();
        let preflight = req.method() == Method::OPTIONS;

        async move {
            let result = match &self.ui {
                Some(ui) if ui.claims(req.method(), req.uri().path()) => {
                    ui.serve(req.uri().path(), req.method() == Method::HEAD).await
                }
                _ => self.dispatch(req).await,
            };
            let mut response = match result {
                Ok(response) => response,
                Err(e) => self.error_response(&e),
            };
            if let Some(cors) = &self.cors {
                cors.apply(origin.as_ref(), preflight, response.headers_mut());
            }
            debug!(status = response.status().as_u16(), "response");
            response
        }
        .instrument(span)
        .await
    }

    async fn dispatch<B>(&self, req: Request<B>) -> DavResult<Response<DavBody>>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        if req.method() == Method::OPTIONS {
            return Ok(options_response());
        }
        let verb = Verb::from_method(req.method())
            .ok_or_else(|| DavError::MethodNotAllowed(req.method().to_string()))?;

        let principal = self.authenticate(req.headers()).await?;
        Span::current().record("user", principal.username());

        let path = paths::request_path(req.uri().path(), &self.mount_prefix)?;

        match verb {
            Verb::Get => self.get(&principal, &path, req.headers(), false).await,
            Verb::Head => self.get(&principal, &path, req.headers(), true).await,
            Verb::Put => self.put(&principal, &path, req.into_body()).await,
            Verb::Delete => self.delete(&principal, &path).await,
            Verb::Mkcol => self.mkcol(&principal, &path).await,
            Verb::Copy | Verb::Move => {
                self.copy_or_move(&principal, &path, req.headers(), verb == Verb::Move)
                    .await
            }
        }
    }

    async fn authenticate(&self, headers: &HeaderMap) -> DavResult<Arc<Principal>> {
        let value = headers
            .get(header::AUTHORIZATION)
            .ok_or(DavError::Unauthorized)?
            .to_str()
            .map_err(|_| DavError::Unauthorized)?;
        let creds = BasicCredentials::from_header(value).map_err(|e| {
            debug!(error = %e, "rejecting credentials");
            DavError::Unauthorized
        })?;

        // bcrypt verification is CPU-bound
        let authenticator = Arc::clone(&self.authenticator);
        let username = creds.username.clone();
        let result = tokio::task::spawn_blocking(move || {
            authenticator.authenticate(&creds.username, &creds.password)
        })
        .await
        .map_err(|e| DavError::Internal(format!("authentication task failed: {e}")))?;

        match result {
            Ok(principal) => Ok(principal),
            Err(AuthError::Verification(msg)) => {
                warn!(user = %username, error = %msg, "stored password could not be verified");
                Err(DavError::Unauthorized)
            }
            Err(e) => {
                info!(user = %username, error = %e, "authentication failed");
                Err(DavError::Unauthorized)
            }
        }
    }

    fn require(&self, principal: &Principal, path: &str, permission: Permission) -> DavResult<()> {
        if self.authorizer.authorize(principal, path, permission) {
            Ok(())
        } else {
            Err(DavError::Forbidden(format!("{permission} on {path}")))
        }
    }

    async fn get(
        &self,
        principal: &Principal,
        path: &str,
        headers: &HeaderMap,
        head_only: bool,
    ) -> DavResult<Response<DavBody>> {
        self.require(principal, path, Permission::Read)?;
        let key = paths::storage_key(principal.root_dir(), path);
        let meta = self.storage.stat(&key).await?;

        if meta.is_dir {
            return self.list_directory(path, &key, headers, head_only).await;
        }
        self.serve_file(path, &key, &meta, headers, head_only).await
    }

    async fn list_directory(
        &self,
        path: &str,
        key: &str,
        headers: &HeaderMap,
        head_only: bool,
    ) -> DavResult<Response<DavBody>> {
        let children = self.storage.list(key).await?;
        let rows = listing::entries(path, &children);

        let wants_html = headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("text/html"));

        let (body, content_type) = if wants_html {
            (
                listing::render_html(path, &rows, &self.mount_prefix),
                "text/html; charset=utf-8",
            )
        } else {
            let json = listing::render_json(&rows)
                .map_err(|e| DavError::Internal(format!("listing serialization: {e}")))?;
            (json, "application/json")
        };
        debug!(entries = rows.len(), html = wants_html, "directory listed");

        let len = body.len() as u64;
        let body = if head_only { body::empty() } else { body::full(body) };
        let mut response = with_status(StatusCode::OK, body);
        let h = response.headers_mut();
        h.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        h.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
        Ok(response)
    }

    async fn serve_file(
        &self,
        path: &str,
        key: &str,
        meta: &Metadata,
        headers: &HeaderMap,
        head_only: bool,
    ) -> DavResult<Response<DavBody>> {
        let range = match headers.get(header::RANGE) {
            Some(value) => {
                let value = value
                    .to_str()
                    .map_err(|_| DavError::MalformedRange("non-ASCII Range header".to_string()))?;
                Some(parse_range(value, meta.size)?)
            }
            None => None,
        };

        let (status, offset, length) = match range {
            Some(range) => {
                debug!(start = range.start, end = range.end, "serving range");
                (StatusCode::PARTIAL_CONTENT, range.start, range.len())
            }
            None => (StatusCode::OK, 0, meta.size),
        };
        let body = if head_only {
            body::empty()
        } else {
            body::file(Arc::clone(&self.storage), key.to_string(), offset, length)
        };

        let mut response = with_status(status, body);
        let h = response.headers_mut();
        h.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        h.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        );
        h.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
        h.insert(
            header::CONTENT_DISPOSITION,
            content_disposition(paths::file_name(path))?,
        );
        if let Some(range) = range {
            h.insert(
                header::CONTENT_RANGE,
                header_value(&range.content_range(meta.size))?,
            );
        }
        Ok(response)
    }

    async fn put<B>(
        &self,
        principal: &Principal,
        path: &str,
        body: B,
    ) -> DavResult<Response<DavBody>>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        self.require(principal, path, Permission::Write)?;
        let too_large = DavError::PayloadTooLarge {
            limit: self.max_body_size,
        };
        if body.size_hint().lower() > self.max_body_size {
            return Err(too_large);
        }
        let key = paths::storage_key(principal.root_dir(), path);

        let existed = match self.storage.stat(&key).await {
            Ok(meta) if meta.is_dir => {
                return Err(DavError::Conflict(format!("{path} is a directory")));
            }
            Ok(_) => true,
            Err(e) if e.is_not_found() => false,
            Err(e) => return Err(e.into()),
        };

        // Bodies without a declared length are cut off while streaming
        let limit = usize::try_from(self.max_body_size).unwrap_or(usize::MAX);
        let data = match Limited::new(body, limit).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.is::<LengthLimitError>() => return Err(too_large),
            Err(e) => {
                return Err(DavError::BadRequest(format!(
                    "failed to read request body: {e}"
                )));
            }
        };
        let len = data.len();
        self.storage.write_all(&key, data).await?;
        info!(bytes = len, replaced = existed, "file written");

        Ok(empty_response(if existed {
            StatusCode::NO_CONTENT
        } else {
            StatusCode::OK
        }))
    }

    async fn delete(&self, principal: &Principal, path: &str) -> DavResult<Response<DavBody>> {
        if path == "/" {
            return Err(DavError::Forbidden("refusing to delete the root".to_string()));
        }
        self.require(principal, path, Permission::Write)?;
        let key = paths::storage_key(principal.root_dir(), path);
        self.storage.delete(&key).await?;
        info!("resource deleted");
        Ok(empty_response(StatusCode::NO_CONTENT))
    }

    async fn mkcol(&self, principal: &Principal, path: &str) -> DavResult<Response<DavBody>> {
        self.require(principal, path, Permission::Write)?;
        let key = paths::storage_key(principal.root_dir(), path);
        self.storage.create_directory(&key).await?;
        info!("collection created");
        Ok(empty_response(StatusCode::OK))
    }

    async fn copy_or_move(
        &self,
        principal: &Principal,
        src: &str,
        headers: &HeaderMap,
        is_move: bool,
    ) -> DavResult<Response<DavBody>> {
        let destination = headers
            .get(&DESTINATION)
            .ok_or_else(|| DavError::BadRequest("missing Destination header".to_string()))?
            .to_str()
            .map_err(|_| DavError::BadRequest("non-ASCII Destination header".to_string()))?;
        let dst = paths::destination_path(destination, &self.mount_prefix)?;

        self.require(principal, src, Permission::Write)?;
        self.require(principal, &dst, Permission::Write)?;

        if paths::is_within(src, &dst) || paths::is_within(&dst, src) {
            return Err(DavError::BadRequest(format!(
                "source {src} and destination {dst} overlap"
            )));
        }

        let overwrite = headers
            .get(&OVERWRITE)
            .and_then(|v| v.to_str().ok())
            .is_none_or(|v| !v.trim().eq_ignore_ascii_case("f"));

        let src_key = paths::storage_key(principal.root_dir(), src);
        let dst_key = paths::storage_key(principal.root_dir(), &dst);

        self.storage.stat(&src_key).await?;
        let replaced = self.storage.exists(&dst_key).await?;
        if replaced && !overwrite {
            return Err(DavError::PreconditionFailed(format!("{dst} exists")));
        }

        if is_move {
            self.storage.rename(&src_key, &dst_key).await?;
            info!(destination = %dst, replaced, "resource moved");
        } else {
            let bytes = self.storage.copy(&src_key, &dst_key).await?;
            info!(destination = %dst, replaced, bytes, "resource copied");
        }

        Ok(empty_response(if replaced {
            StatusCode::NO_CONTENT
        } else {
            StatusCode::OK
        }))
    }

    fn error_response(&self, e: &DavError) -> Response<DavBody> {
        let status = e.status();
        match e {
            DavError::MalformedRange(h) => debug!(header = %h, "malformed Range header"),
            DavError::RangeNotSatisfiable { size } => {
                debug!(size, "requested range not satisfiable");
            }
            DavError::Unauthorized => debug!("authentication required"),
            _ if status.is_server_error() => error!(error = %e, "request failed"),
            _ => info!(status = status.as_u16(), error = %e, "request rejected"),
        }

        let mut response = with_status(status, body::full(format!("{e}\n")));
        let h = response.headers_mut();
        h.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        match e {
            DavError::Unauthorized => {
                let challenge = format!("Basic realm=\"{}\"", self.realm.replace('"', "'"));
                let value = HeaderValue::from_str(&challenge)
                    .unwrap_or_else(|_| HeaderValue::from_static("Basic realm=\"flydav\""));
                h.insert(header::WWW_AUTHENTICATE, value);
            }
            DavError::MethodNotAllowed(_) => {
                h.insert(header::ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
            }
            DavError::RangeNotSatisfiable { size } => {
                if let Ok(value) = HeaderValue::from_str(&format!("bytes */{size}")) {
                    h.insert(header::CONTENT_RANGE, value);
                }
            }
            _ => {}
        }
        response
    }
}

fn with_status(status: StatusCode, body: DavBody) -> Response<DavBody> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
}

fn empty_response(status: StatusCode) -> Response<DavBody> {
    with_status(status, body::empty())
}

fn options_response() -> Response<DavBody> {
    let mut response = empty_response(StatusCode::OK);
    let h = response.headers_mut();
    h.insert(header::ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
    h.insert(DAV.clone(), HeaderValue::from_static("1"));
    h.insert(header::CONTENT_LENGTH, HeaderValue::from(0u64));
    response
}

fn header_value(value: &str) -> DavResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| DavError::Internal(format!("invalid header {value:?}: {e}")))
}

/// `attachment; filename="..."`, with an RFC 5987 `filename*` for non-ASCII names.
fn content_disposition(name: &str) -> DavResult<HeaderValue> {
    let fallback: String = name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let mut value = format!("attachment; filename=\"{fallback}\"");
    if !name.is_ascii() {
        value.push_str("; filename*=UTF-8''");
        value.extend(utf8_percent_encode(name, NON_ALPHANUMERIC));
    }
    header_value(&value)
}
