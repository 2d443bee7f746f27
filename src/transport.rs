use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use bytes::Bytes;
use tracing::debug;

use crate::error::{TransportError, TransportErrorKind};
use crate::util::{lock_unpoisoned, redact_uri_for_logs};

/// Executes one HTTP exchange. Retries, decompression and decoding happen above
/// this layer.
pub trait Transport: Send + Sync {
    fn execute(
        &self,
        request: http::Request<Bytes>,
    ) -> Result<http::Response<ResponseBody>, TransportError>;
}

/// Proxy a request should be routed through, carried in the request extensions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxyConfig {
    pub uri: String,
}

/// Streaming response body handed back by a [`Transport`].
pub struct ResponseBody {
    reader: Box<dyn Read + Send>,
}

impl ResponseBody {
    pub fn new(reader: impl Read + Send + 'static) -> Self {
        Self {
            reader: Box::new(reader),
        }
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self::new(Cursor::new(bytes.into()))
    }

    pub fn empty() -> Self {
        Self::from_bytes(Bytes::new())
    }

    pub(crate) fn into_reader(self) -> Box<dyn Read + Send> {
        self.reader
    }
}

impl Read for ResponseBody {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str("ResponseBody(..)")
    }
}

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 8;
const DEFAULT_POOL_MAX_IDLE_CONNECTIONS: usize = 16;
const DEFAULT_CLIENT_NAME: &str = "fluentreq";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UreqTransportConfig {
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub pool_idle_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub pool_max_idle_connections: usize,
    pub client_name: String,
}

impl Default for UreqTransportConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            pool_idle_timeout: DEFAULT_POOL_IDLE_TIMEOUT,
            pool_max_idle_per_host: DEFAULT_POOL_MAX_IDLE_PER_HOST,
            pool_max_idle_connections: DEFAULT_POOL_MAX_IDLE_CONNECTIONS,
            client_name: DEFAULT_CLIENT_NAME.to_owned(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct UreqTransportBuilder {
    config: UreqTransportConfig,
}

impl UreqTransportBuilder {
    pub fn request_timeout(mut self, request_timeout: Duration) -> Self {
        self.config.request_timeout = request_timeout.max(Duration::from_millis(1));
        self
    }

    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.config.connect_timeout = connect_timeout.max(Duration::from_millis(1));
        self
    }

    pub fn pool_idle_timeout(mut self, pool_idle_timeout: Duration) -> Self {
        self.config.pool_idle_timeout = pool_idle_timeout;
        self
    }

    pub fn pool_max_idle_per_host(mut self, max_idle: usize) -> Self {
        self.config.pool_max_idle_per_host = max_idle;
        self
    }

    pub fn pool_max_idle_connections(mut self, max_idle: usize) -> Self {
        self.config.pool_max_idle_connections = max_idle;
        self
    }

    pub fn client_name(mut self, client_name: impl Into<String>) -> Self {
        self.config.client_name = client_name.into();
        self
    }

    pub fn build(self) -> UreqTransport {
        let direct = make_agent(&self.config, None);
        UreqTransport {
            config: self.config,
            direct,
            proxied: Mutex::new(HashMap::new()),
        }
    }
}

/// Blocking [`Transport`] backed by a pooled `ureq` agent.
///
/// Requests carrying a [`ProxyConfig`] go through an agent built for that proxy;
/// those agents are created on first use and kept.
pub struct UreqTransport {
    config: UreqTransportConfig,
    direct: ureq::Agent,
    proxied: Mutex<HashMap<String, ureq::Agent>>,
}

impl std::fmt::Debug for UreqTransport {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("UreqTransport")
            .field("config", &self.config)
            .field("proxy_agents", &lock_unpoisoned(&self.proxied).len())
            .finish()
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UreqTransport {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> UreqTransportBuilder {
        UreqTransportBuilder::default()
    }

    pub fn config(&self) -> &UreqTransportConfig {
        &self.config
    }

    fn agent_for(&self, proxy: Option<&ProxyConfig>) -> Result<ureq::Agent, TransportError> {
        let Some(proxy) = proxy else {
            return Ok(self.direct.clone());
        };

        let mut proxied = lock_unpoisoned(&self.proxied);
        if let Some(agent) = proxied.get(&proxy.uri) {
            return Ok(agent.clone());
        }
        let ureq_proxy = ureq::Proxy::new(&proxy.uri).map_err(|error| {
            TransportError::new(classify_ureq_transport_error(&error), error)
        })?;
        debug!(proxy = %redact_uri_for_logs(&proxy.uri), "creating proxy agent");
        let agent = make_agent(&self.config, Some(ureq_proxy));
        proxied.insert(proxy.uri.clone(), agent.clone());
        Ok(agent)
    }
}

impl Transport for UreqTransport {
    fn execute(
        &self,
        request: http::Request<Bytes>,
    ) -> Result<http::Response<ResponseBody>, TransportError> {
        let agent = self.agent_for(request.extensions().get::<ProxyConfig>())?;
        let request = request.map(|body| body.to_vec());
        let response = agent.run(request).map_err(|error| {
            let kind = classify_ureq_transport_error(&error);
            TransportError::new(kind, error)
        })?;
        Ok(response.map(|body| ResponseBody::new(body.into_reader())))
    }
}

fn make_agent(config: &UreqTransportConfig, proxy: Option<ureq::Proxy>) -> ureq::Agent {
    ureq::Agent::config_builder()
        .http_status_as_error(false)
        .user_agent(config.client_name.as_str())
        .timeout_global(Some(config.request_timeout))
        .timeout_connect(Some(config.connect_timeout))
        .max_idle_age(config.pool_idle_timeout)
        .max_idle_connections_per_host(config.pool_max_idle_per_host)
        .max_idle_connections(config.pool_max_idle_connections)
        .proxy(proxy)
        .build()
        .new_agent()
}

/// Process-wide transport used by requests that never called `client`.
pub fn default_transport() -> Arc<dyn Transport> {
    static DEFAULT_TRANSPORT: OnceLock<Arc<dyn Transport>> = OnceLock::new();
    DEFAULT_TRANSPORT
        .get_or_init(|| Arc::new(UreqTransport::new()))
        .clone()
}

pub(crate) fn classify_ureq_transport_error(error: &ureq::Error) -> TransportErrorKind {
    match error {
        ureq::Error::Timeout(_) => TransportErrorKind::Timeout,
        ureq::Error::HostNotFound => TransportErrorKind::Dns,
        ureq::Error::Tls(_) | ureq::Error::Rustls(_) | ureq::Error::Pem(_) => {
            TransportErrorKind::Tls
        }
        ureq::Error::ConnectProxyFailed(_) | ureq::Error::ConnectionFailed => {
            TransportErrorKind::Connect
        }
        ureq::Error::Io(source) => classify_io_error(source),
        _ => TransportErrorKind::Other,
    }
}

fn classify_io_error(error: &std::io::Error) -> TransportErrorKind {
    match error.kind() {
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
            TransportErrorKind::Timeout
        }
        std::io::ErrorKind::NotFound => TransportErrorKind::Dns,
        std::io::ErrorKind::ConnectionRefused
        | std::io::ErrorKind::ConnectionAborted
        | std::io::ErrorKind::NotConnected
        | std::io::ErrorKind::AddrNotAvailable => TransportErrorKind::Connect,
        std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::UnexpectedEof => TransportErrorKind::Read,
        _ => TransportErrorKind::Other,
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::time::Duration;

    use super::{ResponseBody, UreqTransport, classify_io_error, classify_ureq_transport_error};
    use crate::error::TransportErrorKind;

    #[test]
    fn builder_applies_overrides_over_defaults() {
        let transport = UreqTransport::builder()
            .request_timeout(Duration::from_secs(3))
            .pool_max_idle_per_host(2)
            .client_name("probe")
            .build();
        let config = transport.config();
        assert_eq!(config.request_timeout, Duration::from_secs(3));
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.pool_idle_timeout, Duration::from_secs(90));
        assert_eq!(config.pool_max_idle_per_host, 2);
        assert_eq!(config.pool_max_idle_connections, 16);
        assert_eq!(config.client_name, "probe");
    }

    #[test]
    fn classifies_transport_failures() {
        assert_eq!(
            classify_ureq_transport_error(&ureq::Error::HostNotFound),
            TransportErrorKind::Dns
        );
        assert_eq!(
            classify_ureq_transport_error(&ureq::Error::ConnectionFailed),
            TransportErrorKind::Connect
        );
        let refused = std::io::Error::from(std::io::ErrorKind::ConnectionRefused);
        assert_eq!(classify_io_error(&refused), TransportErrorKind::Connect);
        let timed_out = std::io::Error::from(std::io::ErrorKind::TimedOut);
        assert_eq!(classify_io_error(&timed_out), TransportErrorKind::Timeout);
    }

    #[test]
    fn response_body_reads_from_bytes() {
        let mut body = ResponseBody::from_bytes("payload");
        let mut text = String::new();
        body.read_to_string(&mut text).expect("read body");
        assert_eq!(text, "payload");

        let mut empty = Vec::new();
        ResponseBody::empty()
            .read_to_end(&mut empty)
            .expect("read empty body");
        assert!(empty.is_empty());
    }
}
