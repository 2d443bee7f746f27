use std::io::{self, Read};
use std::sync::Arc;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, COOKIE};
use http::{HeaderMap, Method};
use tracing::{debug, info_span, warn};

use crate::content_encoding::{BoxedReader, decoding_reader, should_decode_content_encoded_body};
use crate::cookie::{cookie_header, response_cookies};
use crate::decode::{ResponseTarget, TargetKind, decode_body, decode_json_stream};
use crate::error::{DecodedValue, Error, TransportError};
use crate::request::{Request, RequestBody, ResponseHead, State};
use crate::retry::{AttemptOutcome, RetryPolicy};
use crate::tee::{TeeBuffer, TeeReader};
use crate::transport::{ProxyConfig, ResponseBody};
use crate::util::{merge_headers, parse_header_value, redact_uri_for_logs, truncate_body};

const JSON_CONTENT_TYPE: &str = "application/json";

/// Everything needed to rebuild the outgoing request for each attempt.
struct Prepared {
    method: Method,
    uri: String,
    headers: HeaderMap,
    body: Bytes,
    proxy: Option<ProxyConfig>,
}

impl Prepared {
    fn to_http(&self) -> Result<http::Request<Bytes>, Error> {
        let mut builder = http::Request::builder()
            .method(self.method.clone())
            .uri(self.uri.as_str());
        if let Some(headers) = builder.headers_mut() {
            *headers = self.headers.clone();
        }
        if let Some(proxy) = &self.proxy {
            builder = builder.extension(proxy.clone());
        }
        builder
            .body(self.body.clone())
            .map_err(|source| Error::RequestBuild {
                source: Arc::new(source),
            })
    }
}

type AttemptResult = Result<http::Response<ResponseBody>, TransportError>;

fn should_repeat(policy: &dyn RetryPolicy, outcome: &AttemptResult) -> bool {
    match outcome {
        Ok(response) => policy.should_repeat(AttemptOutcome::Response {
            status: response.status(),
            headers: response.headers(),
        }),
        Err(error) => policy.should_repeat(AttemptOutcome::Error(error)),
    }
}

impl<T> Request<T> {
    /// Renders the request as HTTP/1.1 text without sending it. A multipart body
    /// is previewed, not consumed.
    pub fn dump(&self) -> crate::Result<Vec<u8>> {
        if let State::Failed(error) = &self.state {
            return Err(error.clone());
        }
        let (content_type, body) = match &self.body {
            RequestBody::Empty => (None, Bytes::new()),
            RequestBody::Raw(body) => (None, body.clone()),
            RequestBody::Json(body) => (Some(JSON_CONTENT_TYPE.to_owned()), body.clone()),
            RequestBody::Multipart(multipart) => {
                let (content_type, body) = multipart.preview()?;
                (Some(content_type), body)
            }
        };
        let prepared = self.prepare(content_type, body)?;
        let Some(url) = self.url.as_ref() else {
            return Err(missing_url());
        };

        let target = &url[url::Position::BeforePath..url::Position::AfterQuery];
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_owned(),
            (None, _) => String::new(),
        };

        let mut out = Vec::with_capacity(prepared.body.len() + 256);
        out.extend_from_slice(format!("{} {target} HTTP/1.1\r\n", prepared.method).as_bytes());
        out.extend_from_slice(format!("Host: {host}\r\n").as_bytes());
        for (name, value) in &prepared.headers {
            out.extend_from_slice(name.as_str().as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&prepared.body);
        Ok(out)
    }

    fn prepare(&self, content_type: Option<String>, body: Bytes) -> Result<Prepared, Error> {
        let url = self.url.as_ref().ok_or_else(missing_url)?;

        let mut base = self.default_headers.clone();
        if let Some(content_type) = content_type {
            base.insert(
                CONTENT_TYPE,
                parse_header_value(CONTENT_TYPE.as_str(), &content_type)?,
            );
        }
        if let Some(cookies) = cookie_header(&self.cookies) {
            base.insert(COOKIE, parse_header_value(COOKIE.as_str(), &cookies)?);
        }

        Ok(Prepared {
            method: self.method.clone(),
            uri: url.as_str().to_owned(),
            headers: merge_headers(&base, &self.headers),
            body,
            proxy: self.proxy.clone(),
        })
    }

    fn materialize(&mut self) -> Result<Prepared, Error> {
        let materialized = match &mut self.body {
            RequestBody::Empty => Ok((None, Bytes::new())),
            RequestBody::Raw(body) => Ok((None, body.clone())),
            RequestBody::Json(body) => Ok((Some(JSON_CONTENT_TYPE.to_owned()), body.clone())),
            RequestBody::Multipart(multipart) => multipart
                .materialize()
                .map(|(content_type, body)| (Some(content_type), body)),
        };
        let (content_type, body) = materialized?;
        self.prepare(content_type, body)
    }

    fn check_abort(&self, attempt: usize, uri: &str) -> Result<(), Error> {
        if let Some(signal) = &self.abort
            && signal.is_aborted()
        {
            return Err(Error::Aborted {
                attempt,
                method: self.method.clone(),
                uri: uri.to_owned(),
            });
        }
        Ok(())
    }
}

impl<T: ResponseTarget> Request<T> {
    /// Sends the request and decodes the response into `T`.
    ///
    /// The body is decoded before the status is checked: a non-2xx response
    /// fails with [`Error::HttpStatus`], which still carries the decoded value
    /// when decoding succeeded. Any failure is latched.
    pub fn fetch(&mut self) -> crate::Result<T> {
        if let State::Failed(error) = &self.state {
            return Err(error.clone());
        }
        let uri = self
            .url
            .as_ref()
            .map(|url| redact_uri_for_logs(url.as_str()))
            .unwrap_or_default();
        let span = info_span!(
            "fluentreq.fetch",
            method = %self.method,
            uri = %uri,
            decode_as = self.target_kind().as_str()
        );
        let _enter = span.enter();

        self.run(&uri).map_err(|error| self.latch(error))
    }

    fn run(&mut self, uri: &str) -> Result<T, Error> {
        let prepared = self.materialize()?;
        let policy = Arc::clone(&self.retry_policy);
        let transport = Arc::clone(&self.transport);

        let mut attempt = 1;
        self.check_abort(attempt, uri)?;
        debug!(attempt, "sending request");
        let mut outcome = transport.execute(prepared.to_http()?);
        while should_repeat(policy.as_ref(), &outcome) {
            self.check_abort(attempt + 1, uri)?;
            if !policy.delay_before_next_attempt(attempt) {
                break;
            }
            attempt += 1;
            match &outcome {
                Ok(response) => warn!(
                    attempt,
                    status = response.status().as_u16(),
                    "retrying request after status"
                ),
                Err(error) => warn!(attempt, error = %error, "retrying request after transport error"),
            }
            outcome = transport.execute(prepared.to_http()?);
        }

        let response = outcome.map_err(|error| Error::Transport {
            kind: error.kind(),
            method: prepared.method.clone(),
            uri: uri.to_owned(),
            source: error.into_source(),
        })?;
        let (parts, body) = response.into_parts();
        let status = parts.status;
        debug!(status = status.as_u16(), attempts = attempt, "request completed");
        self.last_response = Some(ResponseHead {
            status,
            version: parts.version,
            headers: parts.headers.clone(),
        });

        let mut reader: BoxedReader =
            if should_decode_content_encoded_body(&prepared.method, status) {
                decoding_reader(body.into_reader(), &parts.headers)?
            } else {
                body.into_reader()
            };
        if let Some(tee) = &self.tee {
            reader = Box::new(TeeReader::new(reader, tee.clone()));
        }
        self.cookies = response_cookies(&parts.headers);

        let error_body = (!status.is_success()).then(TeeBuffer::new);
        if let Some(capture) = &error_body {
            reader = Box::new(TeeReader::new(reader, capture.clone()));
        }

        let decoded = match self.target_kind() {
            TargetKind::Json => {
                let decoded = decode_json_stream::<T, _>(&mut reader);
                if let Err(error) = io::copy(&mut reader, &mut io::sink()) {
                    debug!(error = %error, "failed to drain response body");
                }
                decoded
            }
            kind => {
                let mut body = Vec::new();
                match reader.read_to_end(&mut body) {
                    Ok(_) => decode_body::<T>(kind, body),
                    Err(source) => Err(Error::ReadBody {
                        source: Arc::new(source),
                    }),
                }
            }
        };

        if status.is_success() {
            return decoded;
        }
        let body = error_body
            .map(|capture| truncate_body(&capture.contents()))
            .unwrap_or_default();
        let (decoded, decode_error) = match decoded {
            Ok(value) => (Some(DecodedValue::new(value)), None),
            Err(error) => (None, Some(Box::new(error))),
        };
        Err(Error::HttpStatus {
            status,
            body,
            decode_error,
            decoded,
        })
    }
}

fn missing_url() -> Error {
    Error::InvalidUri {
        uri: String::new(),
        message: "request has no url".to_owned(),
    }
}
