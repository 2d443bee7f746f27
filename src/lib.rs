//! `fluentreq` is a fluent, typed HTTP request builder for blocking callers.
//!
//! A [`Request<T>`] collects the method, path, query, headers, cookies, body,
//! proxy and retry policy of one call; [`Request::fetch`] sends it, undoes the
//! response's content encoding and decodes the body into `T`.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use fluentreq::prelude::{Request, StandardRetry};
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! struct Item {
//!     id: String,
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut request = Request::<Vec<Item>>::new("https://api.example.com")
//!         .path("/v1/items")
//!         .params(["page", "1", "per_page", "50"])
//!         .header("authorization", "Bearer token")
//!         .retry(
//!             StandardRetry::new()
//!                 .max_retries(3)
//!                 .retryable_status_codes([429, 502, 503])
//!                 .base_backoff(Duration::from_millis(200)),
//!         );
//!
//!     for item in request.fetch()? {
//!         println!("item id={}", item.id);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Result types
//!
//! - `Vec<u8>` and `bytes::Bytes` receive the body as is.
//! - `String` requires UTF-8.
//! - Primitive integers and `bool` are parsed from the trimmed body.
//! - Everything else is deserialized from JSON.
//!
//! A non-2xx status is always an error, but only after decoding, so
//! [`Error::decoded`] can still hand out a typed error payload.

mod content_encoding;
mod cookie;
mod decode;
mod error;
mod execute;
mod multipart;
mod request;
mod retry;
mod tee;
mod transport;
mod util;

pub use crate::cookie::Cookie;
pub use crate::decode::{ResponseTarget, TargetKind};
pub use crate::error::{DecodedValue, Error, ErrorCode, TransportError, TransportErrorKind};
pub use crate::multipart::{FileSource, FsFileSource, Multipart};
pub use crate::request::{Request, ResponseHead};
pub use crate::retry::{AbortSignal, AttemptOutcome, NoRetry, RetryPolicy, StandardRetry};
pub use crate::tee::TeeBuffer;
pub use crate::transport::{
    ProxyConfig, ResponseBody, Transport, UreqTransport, UreqTransportBuilder,
    UreqTransportConfig, default_transport,
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub mod prelude {
    pub use crate::{
        AbortSignal, AttemptOutcome, Cookie, Error, ErrorCode, Multipart, NoRetry, Request,
        ResponseHead, RetryPolicy, StandardRetry, TargetKind, TeeBuffer, Transport,
        TransportError, TransportErrorKind, UreqTransport,
    };
}
