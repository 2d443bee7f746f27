use std::marker::PhantomData;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{ACCEPT_ENCODING, CONTENT_TYPE, HeaderValue, USER_AGENT};
use http::{HeaderMap, Method, StatusCode, Version};
use serde::Serialize;
use url::Url;

use crate::cookie::Cookie;
use crate::decode::TargetKind;
use crate::error::Error;
use crate::multipart::Multipart;
use crate::retry::{AbortSignal, NoRetry, RetryPolicy};
use crate::tee::TeeBuffer;
use crate::transport::{ProxyConfig, Transport, default_transport};
use crate::util::{parse_header_name, parse_header_value, redact_uri_for_logs, validate_proxy};

pub(crate) const DEFAULT_ACCEPT_ENCODING: &str = "gzip, deflate, br, zstd";
pub(crate) const DEFAULT_USER_AGENT: &str = concat!("fluentreq/", env!("CARGO_PKG_VERSION"));

const STANDARD_METHODS: [Method; 9] = [
    Method::GET,
    Method::HEAD,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
    Method::CONNECT,
    Method::OPTIONS,
    Method::TRACE,
];

/// Status line and headers of the most recent response. The body is never kept.
#[derive(Clone, Debug)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub version: Version,
    pub headers: HeaderMap,
}

#[derive(Clone, Debug)]
pub(crate) enum State {
    Ready,
    Failed(Error),
}

#[derive(Clone, Debug)]
pub(crate) enum RequestBody {
    Empty,
    Raw(Bytes),
    /// Serialized JSON; sent with `Content-Type: application/json` unless the
    /// caller sets that header afterwards.
    Json(Bytes),
    Multipart(Multipart),
}

/// Fluent description of one HTTP call whose response decodes into `T`.
///
/// Configuration methods never fail directly. The first error is latched; from
/// then on every configuration call is a no-op and [`Request::fetch`] returns it.
///
/// ```no_run
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Status {
///     ok: bool,
/// }
///
/// let mut request = fluentreq::Request::<Status>::new("https://api.example.com")
///     .path("/status")
///     .param("verbose", "1");
/// let status = request.fetch()?;
/// assert!(status.ok);
/// # Ok::<(), fluentreq::Error>(())
/// ```
pub struct Request<T> {
    pub(crate) url: Option<Url>,
    pub(crate) method: Method,
    pub(crate) default_headers: HeaderMap,
    pub(crate) headers: HeaderMap,
    pub(crate) cookies: Vec<Cookie>,
    pub(crate) body: RequestBody,
    pub(crate) proxy: Option<ProxyConfig>,
    pub(crate) retry_policy: Arc<dyn RetryPolicy>,
    pub(crate) tee: Option<TeeBuffer>,
    pub(crate) abort: Option<AbortSignal>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) last_response: Option<ResponseHead>,
    pub(crate) state: State,
    target_kind: TargetKind,
    _target: PhantomData<fn() -> T>,
}

impl<T> Clone for Request<T> {
    fn clone(&self) -> Self {
        Self {
            url: self.url.clone(),
            method: self.method.clone(),
            default_headers: self.default_headers.clone(),
            headers: self.headers.clone(),
            cookies: self.cookies.clone(),
            body: self.body.clone(),
            proxy: self.proxy.clone(),
            retry_policy: Arc::clone(&self.retry_policy),
            tee: self.tee.as_ref().map(TeeBuffer::detach),
            abort: self.abort.clone(),
            transport: Arc::clone(&self.transport),
            last_response: self.last_response.clone(),
            state: self.state.clone(),
            target_kind: self.target_kind,
            _target: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Request<T> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Request")
            .field(
                "url",
                &self.url.as_ref().map(|url| redact_uri_for_logs(url.as_str())),
            )
            .field("method", &self.method)
            .field("target_kind", &self.target_kind)
            .field("headers", &self.headers)
            .field("cookies", &self.cookies.len())
            .field("proxy", &self.proxy.is_some())
            .field("state", &self.state)
            .finish()
    }
}

impl<T: 'static> Request<T> {
    pub fn new(url: &str) -> Self {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            ACCEPT_ENCODING,
            HeaderValue::from_static(DEFAULT_ACCEPT_ENCODING),
        );
        default_headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));

        let (url, state) = match Url::parse(url) {
            Ok(url) => (Some(url), State::Ready),
            Err(error) => (
                None,
                State::Failed(Error::InvalidUri {
                    uri: redact_uri_for_logs(url),
                    message: error.to_string(),
                }),
            ),
        };

        Self {
            url,
            method: Method::GET,
            default_headers,
            headers: HeaderMap::new(),
            cookies: Vec::new(),
            body: RequestBody::Empty,
            proxy: None,
            retry_policy: Arc::new(NoRetry),
            tee: None,
            abort: None,
            transport: default_transport(),
            last_response: None,
            state,
            target_kind: TargetKind::of::<T>(),
            _target: PhantomData,
        }
    }
}

impl<T> Request<T> {
    pub fn client(mut self, transport: Arc<dyn Transport>) -> Self {
        if !self.is_failed() {
            self.transport = transport;
        }
        self
    }

    pub fn path(mut self, path: &str) -> Self {
        if !self.is_failed()
            && let Some(url) = self.url.as_mut()
        {
            url.set_path(path);
        }
        self
    }

    /// Adds query parameters from a flat `key, value, key, value` list.
    ///
    /// A key that currently has exactly one value is overwritten; otherwise the
    /// pair is appended, so repeated parameters stay repeated.
    pub fn params<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.is_failed() {
            return self;
        }
        let items: Vec<S> = items.into_iter().collect();
        if items.len() % 2 != 0 {
            return self.fail(Error::UnpairedArguments {
                what: "query parameter",
                count: items.len(),
            });
        }
        let Some(url) = self.url.as_mut() else {
            return self;
        };

        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        for pair in items.chunks(2) {
            let (key, value) = (pair[0].as_ref(), pair[1].as_ref());
            let existing = pairs.iter().filter(|(name, _)| name == key).count();
            if existing == 1
                && let Some(slot) = pairs.iter_mut().find(|(name, _)| name == key)
            {
                slot.1 = value.to_owned();
            } else {
                pairs.push((key.to_owned(), value.to_owned()));
            }
        }

        if pairs.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(&pairs);
        }
        self
    }

    pub fn param(self, key: &str, value: &str) -> Self {
        self.params([key, value])
    }

    /// Appends headers from a flat `name, value, name, value` list. Values for the
    /// same name accumulate.
    pub fn headers<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.is_failed() {
            return self;
        }
        let items: Vec<S> = items.into_iter().collect();
        if items.len() % 2 != 0 {
            return self.fail(Error::UnpairedArguments {
                what: "header",
                count: items.len(),
            });
        }
        for pair in items.chunks(2) {
            let parsed = parse_header_name(pair[0].as_ref()).and_then(|name| {
                let value = parse_header_value(name.as_str(), pair[1].as_ref())?;
                Ok((name, value))
            });
            match parsed {
                Ok((name, value)) => {
                    self.headers.append(name, value);
                }
                Err(error) => return self.fail(error),
            }
        }
        self
    }

    pub fn header(self, name: &str, value: &str) -> Self {
        self.headers([name, value])
    }

    /// Sets the method. Only the nine standard methods are accepted, spelled in
    /// upper case.
    pub fn method(mut self, method: &str) -> Self {
        if self.is_failed() {
            return self;
        }
        match STANDARD_METHODS
            .iter()
            .find(|standard| standard.as_str() == method)
        {
            Some(standard) => self.method = standard.clone(),
            None => {
                return self.fail(Error::InvalidMethod {
                    method: method.to_owned(),
                });
            }
        }
        self
    }

    /// Serializes `body` as the JSON payload and switches to POST.
    ///
    /// Any `Content-Type` set earlier is dropped; one set later wins.
    pub fn body_json<B>(mut self, body: &B) -> Self
    where
        B: Serialize + ?Sized,
    {
        if self.is_failed() {
            return self;
        }
        match serde_json::to_vec(body) {
            Ok(encoded) => {
                self.body = RequestBody::Json(Bytes::from(encoded));
                self.headers.remove(CONTENT_TYPE);
                self.method = Method::POST;
                self
            }
            Err(source) => self.fail(Error::SerializeJson {
                source: Arc::new(source),
            }),
        }
    }

    pub fn body_multipart(mut self, multipart: Multipart) -> Self {
        if !self.is_failed() {
            self.body = RequestBody::Multipart(multipart);
            self.method = Method::POST;
        }
        self
    }

    pub fn body_raw(mut self, body: impl Into<Bytes>) -> Self {
        if !self.is_failed() {
            self.body = RequestBody::Raw(body.into());
            self.method = Method::POST;
        }
        self
    }

    /// Routes the request through `proxy`. An empty string removes the proxy.
    pub fn proxy(mut self, proxy: &str) -> Self {
        if self.is_failed() {
            return self;
        }
        let proxy = proxy.trim();
        if proxy.is_empty() {
            self.proxy = None;
            return self;
        }
        match validate_proxy(proxy) {
            Ok(_) => {
                self.proxy = Some(ProxyConfig {
                    uri: proxy.to_owned(),
                });
                self
            }
            Err(error) => self.fail(error),
        }
    }

    /// Copies the decoded response body into `tee` as it is read.
    pub fn to_body(mut self, tee: &TeeBuffer) -> Self {
        if !self.is_failed() {
            self.tee = Some(tee.clone());
        }
        self
    }

    pub fn cookies(mut self, cookies: impl IntoIterator<Item = Cookie>) -> Self {
        if !self.is_failed() {
            self.cookies = cookies.into_iter().collect();
        }
        self
    }

    pub fn retry(mut self, policy: impl RetryPolicy + 'static) -> Self {
        if !self.is_failed() {
            self.retry_policy = Arc::new(policy);
        }
        self
    }

    /// Stops retrying once `signal` is raised. Checked before every attempt.
    pub fn abort_on(mut self, signal: &AbortSignal) -> Self {
        if !self.is_failed() {
            self.abort = Some(signal.clone());
        }
        self
    }

    pub fn error(&self) -> Option<&Error> {
        match &self.state {
            State::Failed(error) => Some(error),
            State::Ready => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, State::Failed(_))
    }

    /// Cookies that will be sent; after a fetch these are the response's cookies.
    pub fn current_cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    pub fn current_method(&self) -> &Method {
        &self.method
    }

    pub fn target_kind(&self) -> TargetKind {
        self.target_kind
    }

    pub fn tee_buffer(&self) -> Option<&TeeBuffer> {
        self.tee.as_ref()
    }

    pub fn last_response(&self) -> Option<&ResponseHead> {
        self.last_response.as_ref()
    }

    fn fail(mut self, error: Error) -> Self {
        self.latch(error);
        self
    }

    /// Records `error` as terminal unless an earlier error already is.
    pub(crate) fn latch(&mut self, error: Error) -> Error {
        if let State::Ready = self.state {
            self.state = State::Failed(error.clone());
        }
        error
    }
}
