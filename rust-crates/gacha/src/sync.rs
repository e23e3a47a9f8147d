use crate::{
    events::{
        Dispatcher,
        EventKind,
        Origin,
    },
    session::Session,
};
use reqwest::header::CONTENT_TYPE;
use serde::{
    Serialize,
    de::DeserializeOwned,
};
use serde_json::Value;
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{
            AtomicU64,
            Ordering,
        },
    },
};
use thiserror::Error;

pub const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncIntent {
    Create,
    Update,
    Patch,
    Delete,
    Read,
}

impl SyncIntent {
    /// Every write intent goes out as a POST.
    pub fn method(self) -> Method {
        match self {
            SyncIntent::Create | SyncIntent::Update | SyncIntent::Patch => Method::Post,
            SyncIntent::Delete => Method::Delete,
            SyncIntent::Read => Method::Get,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Post,
    Delete,
    Get,
}

impl Method {
    /// Path segment naming the verb in the request URL.
    pub fn keyword(self) -> &'static str {
        match self {
            Method::Post => "post",
            Method::Delete => "delete",
            Method::Get => "get",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.keyword().to_uppercase())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Post => reqwest::Method::POST,
            Method::Delete => reqwest::Method::DELETE,
            Method::Get => reqwest::Method::GET,
        }
    }
}

/// Identifies one in-flight request for observers of `request` events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHandle {
    pub id: u64,
    pub method: Method,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to build HTTP client: {source}")]
    Client {
        #[source]
        source: reqwest::Error,
    },
    #[error("request failed: {source}")]
    Request {
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to read response body: {source}")]
    Body {
        #[source]
        source: reqwest::Error,
    },
    #[error("endpoint responded with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("{message}")]
    Other { message: String },
}

/// Moves one request over the wire and hands back the raw response body.
/// Timeouts and status handling live here, below the sync adapter.
pub trait Transport {
    fn send(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<String, TransportError>>;
}

#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|source| TransportError::Client { source })?;
        Ok(Self { http })
    }
}

impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<String, TransportError> {
        let response = self
            .http
            .request(request.method.into(), request.url.as_str())
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .body(request.body)
            .send()
            .await
            .map_err(|source| TransportError::Request {
                source: source.without_url(),
            })?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| TransportError::Body {
                source: source.without_url(),
            })?;
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("there was an error talking with the object: null response from {url}")]
    NullResponse { url: String },
    #[error("transport failure talking to {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: TransportError,
    },
    #[error("response from {url} is not valid JSON: {source}")]
    InvalidBody {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("response from {url} has an unexpected shape: {source}")]
    UnexpectedBody {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode request body for {url}: {source}")]
    Encode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type ErrorHandler = Arc<dyn Fn(&SyncError) + Send + Sync>;

/// Stream that sees `request` events while the request is still in flight.
#[derive(Debug, Clone)]
pub struct RequestObserver {
    dispatcher: Dispatcher,
    origin: Origin,
}

impl RequestObserver {
    pub fn new(dispatcher: Dispatcher, origin: Origin) -> Self {
        Self { dispatcher, origin }
    }
}

#[derive(Clone, Default)]
pub struct SyncOptions {
    /// Explicit request body, used instead of the resource's own.
    pub attrs: Option<Value>,
    /// Whether admin-only sub-resources should be loaded by an aggregate fetch.
    pub load_admin: bool,
    pub on_error: Option<ErrorHandler>,
    /// When set, `request` events go straight to this stream instead of the
    /// resource's outbox.
    pub observer: Option<RequestObserver>,
}

impl SyncOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attrs(mut self, attrs: Value) -> Self {
        self.attrs = Some(attrs);
        self
    }

    pub fn load_admin(mut self, load_admin: bool) -> Self {
        self.load_admin = load_admin;
        self
    }

    pub fn on_error(mut self, handler: impl Fn(&SyncError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(handler));
        self
    }

    pub fn observed_by(mut self, observer: RequestObserver) -> Self {
        self.observer = Some(observer);
        self
    }
}

impl fmt::Debug for SyncOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncOptions")
            .field("attrs", &self.attrs)
            .field("load_admin", &self.load_admin)
            .field("on_error", &self.on_error.is_some())
            .field("observer", &self.observer)
            .finish()
    }
}

pub trait SyncResource {
    /// Path of the resource relative to the verb segment.
    fn url(&self) -> String;

    /// Body sent when the caller supplies no explicit `attrs`.
    fn to_post_json(
        &self,
        _options: &SyncOptions,
        _intent: SyncIntent,
        _method: Method,
    ) -> Value {
        Value::Null
    }

    fn emit(&mut self, event: EventKind);
}

pub struct SyncAdapter<T> {
    transport: T,
    session: Session,
    next_request: AtomicU64,
}

impl<T: Transport> SyncAdapter<T> {
    pub fn new(transport: T, session: Session) -> Self {
        Self {
            transport,
            session,
            next_request: AtomicU64::new(0),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// `<document path>[<admin key>/]<verb>/<resource path>`
    pub fn request_url(&self, method: Method, resource_url: &str) -> String {
        let key_segment = self
            .session
            .admin_key()
            .map(|key| format!("{key}/"))
            .unwrap_or_default();
        format!(
            "{}{}{}/{}",
            self.session.document_path(),
            key_segment,
            method.keyword(),
            resource_url
        )
    }

    /// Sends `intent` for `resource` and decodes the response body.
    ///
    /// A body of exactly `null` is a failure even though the transport
    /// succeeded. Every failure is emitted as an `error` event on the
    /// resource, passed to `options.on_error` when one is set, and returned.
    pub async fn sync<D, R>(
        &self,
        intent: SyncIntent,
        resource: &mut R,
        options: &SyncOptions,
    ) -> Result<D, SyncError>
    where
        D: DeserializeOwned,
        R: SyncResource + ?Sized,
    {
        let method = intent.method();
        let url = self.request_url(method, &resource.url());
        let logged_url = self.session.redact(&url);
        let payload = match &options.attrs {
            Some(attrs) => attrs.clone(),
            None => resource.to_post_json(options, intent, method),
        };
        let body = match serde_json::to_string(&payload) {
            Ok(body) => body,
            Err(source) => {
                let error = SyncError::Encode {
                    url: logged_url,
                    source,
                };
                return Err(self.fail(resource, options, error));
            }
        };

        let handle = RequestHandle {
            id: self.next_request.fetch_add(1, Ordering::Relaxed),
            method,
            url: url.clone(),
        };
        tracing::debug!("sync {method} {logged_url}");
        let response = self.transport.send(HttpRequest { method, url, body });
        match &options.observer {
            Some(RequestObserver { dispatcher, origin }) => {
                dispatcher.publish(*origin, EventKind::Request(handle));
            }
            None => resource.emit(EventKind::Request(handle)),
        }

        let raw = match response.await {
            Ok(raw) => raw,
            Err(source) => {
                let error = SyncError::Transport {
                    url: logged_url,
                    source,
                };
                return Err(self.fail(resource, options, error));
            }
        };
        let value: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(source) => {
                let error = SyncError::InvalidBody {
                    url: logged_url,
                    source,
                };
                return Err(self.fail(resource, options, error));
            }
        };
        if value.is_null() {
            let error = SyncError::NullResponse { url: logged_url };
            return Err(self.fail(resource, options, error));
        }
        let decoded = match serde_json::from_value(value) {
            Ok(decoded) => decoded,
            Err(source) => {
                let error = SyncError::UnexpectedBody {
                    url: logged_url,
                    source,
                };
                return Err(self.fail(resource, options, error));
            }
        };
        resource.emit(EventKind::Sync);
        Ok(decoded)
    }

    fn fail<R: SyncResource + ?Sized>(
        &self,
        resource: &mut R,
        options: &SyncOptions,
        error: SyncError,
    ) -> SyncError {
        tracing::warn!("{error}");
        resource.emit(EventKind::Error {
            message: error.to_string(),
        });
        if let Some(handler) = &options.on_error {
            handler(&error);
        }
        error
    }
}

impl<T> fmt::Display for SyncAdapter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.session.redact(self.session.document_path()))
    }
}
