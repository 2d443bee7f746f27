use std::any::Any;
use std::sync::Arc;

use http::{Method, StatusCode};
use thiserror::Error;

pub(crate) type SharedError = Arc<dyn std::error::Error + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransportErrorKind {
    Dns,
    Connect,
    Tls,
    Timeout,
    Read,
    Other,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Dns => "dns",
            Self::Connect => "connect",
            Self::Tls => "tls",
            Self::Timeout => "timeout",
            Self::Read => "read",
            Self::Other => "other",
        };
        formatter.write_str(text)
    }
}

/// Failure reported by a [`Transport`](crate::Transport) for a single attempt.
#[derive(Clone, Debug, Error)]
#[error("{kind} error: {source}")]
pub struct TransportError {
    kind: TransportErrorKind,
    #[source]
    source: SharedError,
}

impl TransportError {
    pub fn new<E>(kind: TransportErrorKind, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            kind,
            source: Arc::new(source),
        }
    }

    pub fn from_message(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, std::io::Error::other(message.into()))
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    pub(crate) fn into_source(self) -> SharedError {
        self.source
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorCode {
    InvalidUri,
    InvalidMethod,
    UnpairedArguments,
    InvalidHeaderName,
    InvalidHeaderValue,
    InvalidProxy,
    SerializeJson,
    MultipartFile,
    MultipartConsumed,
    RequestBuild,
    Transport,
    Aborted,
    DecodeContentEncoding,
    ReadBody,
    Deserialize,
    ParseBody,
    HttpStatus,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidUri => "invalid_uri",
            Self::InvalidMethod => "invalid_method",
            Self::UnpairedArguments => "unpaired_arguments",
            Self::InvalidHeaderName => "invalid_header_name",
            Self::InvalidHeaderValue => "invalid_header_value",
            Self::InvalidProxy => "invalid_proxy",
            Self::SerializeJson => "serialize_json",
            Self::MultipartFile => "multipart_file",
            Self::MultipartConsumed => "multipart_consumed",
            Self::RequestBuild => "request_build",
            Self::Transport => "transport",
            Self::Aborted => "aborted",
            Self::DecodeContentEncoding => "decode_content_encoding",
            Self::ReadBody => "read_body",
            Self::Deserialize => "deserialize",
            Self::ParseBody => "parse_body",
            Self::HttpStatus => "http_status",
        }
    }
}

/// Decoded response value kept on a status error.
#[derive(Clone)]
pub struct DecodedValue(Arc<dyn Any + Send + Sync>);

impl DecodedValue {
    pub(crate) fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl std::fmt::Debug for DecodedValue {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str("DecodedValue(..)")
    }
}

#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid request uri {uri}: {message}")]
    InvalidUri { uri: String, message: String },
    #[error("method incorrect: {method}")]
    InvalidMethod { method: String },
    #[error("incompatible {what} arguments: expected key/value pairs, got {count} items")]
    UnpairedArguments { what: &'static str, count: usize },
    #[error("invalid header name {name}: {source}")]
    InvalidHeaderName {
        name: String,
        #[source]
        source: Arc<http::header::InvalidHeaderName>,
    },
    #[error("invalid header value for {name}: {source}")]
    InvalidHeaderValue {
        name: String,
        #[source]
        source: Arc<http::header::InvalidHeaderValue>,
    },
    #[error("invalid proxy {proxy}: {message}")]
    InvalidProxy { proxy: String, message: String },
    #[error("failed to serialize request json: {source}")]
    SerializeJson {
        #[source]
        source: Arc<serde_json::Error>,
    },
    #[error("failed to attach multipart file {path}: {source}")]
    MultipartFile {
        path: String,
        #[source]
        source: Arc<std::io::Error>,
    },
    #[error("multipart body was already materialized")]
    MultipartConsumed,
    #[error("failed to build http request: {source}")]
    RequestBuild {
        #[source]
        source: Arc<http::Error>,
    },
    #[error("http transport error ({kind}) for {method} {uri}: {source}")]
    Transport {
        kind: TransportErrorKind,
        method: Method,
        uri: String,
        #[source]
        source: SharedError,
    },
    #[error("request aborted before attempt {attempt} for {method} {uri}")]
    Aborted {
        attempt: usize,
        method: Method,
        uri: String,
    },
    #[error("failed to decode response content-encoding {encoding}: {message}")]
    DecodeContentEncoding { encoding: String, message: String },
    #[error("failed to read response body: {source}")]
    ReadBody {
        #[source]
        source: Arc<std::io::Error>,
    },
    #[error("failed to decode response json: {source}")]
    Deserialize {
        #[source]
        source: Arc<serde_json::Error>,
    },
    #[error("failed to parse response body as {target}: {message}; body={body}")]
    ParseBody {
        target: &'static str,
        body: String,
        message: String,
    },
    #[error("{}", http_status_message(.status, .decode_error))]
    HttpStatus {
        status: StatusCode,
        body: String,
        decode_error: Option<Box<Error>>,
        decoded: Option<DecodedValue>,
    },
}

fn http_status_message(status: &StatusCode, decode_error: &Option<Box<Error>>) -> String {
    match decode_error.as_deref() {
        Some(decode_error) => {
            format!("{status}: status code incorrect, error decode body: {decode_error}")
        }
        None => format!("{status}: status code incorrect"),
    }
}

impl Error {
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidUri { .. } => ErrorCode::InvalidUri,
            Self::InvalidMethod { .. } => ErrorCode::InvalidMethod,
            Self::UnpairedArguments { .. } => ErrorCode::UnpairedArguments,
            Self::InvalidHeaderName { .. } => ErrorCode::InvalidHeaderName,
            Self::InvalidHeaderValue { .. } => ErrorCode::InvalidHeaderValue,
            Self::InvalidProxy { .. } => ErrorCode::InvalidProxy,
            Self::SerializeJson { .. } => ErrorCode::SerializeJson,
            Self::MultipartFile { .. } => ErrorCode::MultipartFile,
            Self::MultipartConsumed => ErrorCode::MultipartConsumed,
            Self::RequestBuild { .. } => ErrorCode::RequestBuild,
            Self::Transport { .. } => ErrorCode::Transport,
            Self::Aborted { .. } => ErrorCode::Aborted,
            Self::DecodeContentEncoding { .. } => ErrorCode::DecodeContentEncoding,
            Self::ReadBody { .. } => ErrorCode::ReadBody,
            Self::Deserialize { .. } => ErrorCode::Deserialize,
            Self::ParseBody { .. } => ErrorCode::ParseBody,
            Self::HttpStatus { .. } => ErrorCode::HttpStatus,
        }
    }

    /// Status of the response that failed validation, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Value decoded from a non-2xx response body.
    ///
    /// Decoding runs before status validation, so an error body that matched the
    /// requested type is still reachable here.
    pub fn decoded<T: 'static>(&self) -> Option<&T> {
        match self {
            Self::HttpStatus {
                decoded: Some(decoded),
                ..
            } => decoded.downcast_ref::<T>(),
            _ => None,
        }
    }
}
