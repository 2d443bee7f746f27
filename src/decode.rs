use std::any::{Any, TypeId};
use std::io::{self, Read};
use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::error::Error;
use crate::util::truncate_body;

/// Types a request can decode its response into.
pub trait ResponseTarget: DeserializeOwned + Send + Sync + 'static {}

impl<T> ResponseTarget for T where T: DeserializeOwned + Send + Sync + 'static {}

/// How a response body is turned into the requested type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// `Vec<u8>` or `Bytes`: the body as is.
    Bytes,
    /// `String`: the body as UTF-8.
    Text,
    /// Any primitive integer, parsed from the trimmed body.
    Integer,
    Boolean,
    /// Everything else, deserialized from JSON.
    Json,
}

impl TargetKind {
    pub fn of<T: 'static>() -> Self {
        let id = TypeId::of::<T>();
        if id == TypeId::of::<Vec<u8>>() || id == TypeId::of::<Bytes>() {
            Self::Bytes
        } else if id == TypeId::of::<String>() {
            Self::Text
        } else if id == TypeId::of::<bool>() {
            Self::Boolean
        } else if is_integer(id) {
            Self::Integer
        } else {
            Self::Json
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bytes => "bytes",
            Self::Text => "string",
            Self::Integer => "integer",
            Self::Boolean => "bool",
            Self::Json => "json",
        }
    }
}

fn is_integer(id: TypeId) -> bool {
    [
        TypeId::of::<i8>(),
        TypeId::of::<i16>(),
        TypeId::of::<i32>(),
        TypeId::of::<i64>(),
        TypeId::of::<i128>(),
        TypeId::of::<isize>(),
        TypeId::of::<u8>(),
        TypeId::of::<u16>(),
        TypeId::of::<u32>(),
        TypeId::of::<u64>(),
        TypeId::of::<u128>(),
        TypeId::of::<usize>(),
    ]
    .contains(&id)
}

fn cast<T: 'static, U: 'static>(value: U) -> Option<T> {
    let boxed: Box<dyn Any> = Box::new(value);
    boxed.downcast::<T>().ok().map(|value| *value)
}

/// Decodes the first JSON value from `reader`; trailing bytes are left unread.
pub(crate) fn decode_json_stream<T, R>(reader: &mut R) -> Result<T, Error>
where
    T: DeserializeOwned,
    R: Read,
{
    let mut deserializer = serde_json::Deserializer::from_reader(reader);
    T::deserialize(&mut deserializer).map_err(|error| {
        if error.is_io() {
            Error::ReadBody {
                source: Arc::new(io::Error::from(error)),
            }
        } else {
            Error::Deserialize {
                source: Arc::new(error),
            }
        }
    })
}

pub(crate) fn decode_body<T>(kind: TargetKind, body: Vec<u8>) -> Result<T, Error>
where
    T: DeserializeOwned + 'static,
{
    match kind {
        TargetKind::Json => serde_json::from_slice(&body).map_err(|error| Error::Deserialize {
            source: Arc::new(error),
        }),
        TargetKind::Bytes => {
            let decoded = if TypeId::of::<T>() == TypeId::of::<Bytes>() {
                cast(Bytes::from(body))
            } else {
                cast(body)
            };
            decoded.ok_or_else(|| mismatch(kind))
        }
        TargetKind::Text => {
            let text = utf8(kind, body)?;
            cast(text).ok_or_else(|| mismatch(kind))
        }
        TargetKind::Integer => {
            let text = utf8(kind, body)?;
            decode_integer(text.trim()).map_err(|message| Error::ParseBody {
                target: kind.as_str(),
                body: truncate_body(text.as_bytes()),
                message,
            })
        }
        TargetKind::Boolean => {
            let text = utf8(kind, body)?;
            let parsed = parse_bool(text.trim()).ok_or_else(|| Error::ParseBody {
                target: kind.as_str(),
                body: truncate_body(text.as_bytes()),
                message: "invalid syntax".to_owned(),
            })?;
            cast(parsed).ok_or_else(|| mismatch(kind))
        }
    }
}

fn utf8(kind: TargetKind, body: Vec<u8>) -> Result<String, Error> {
    String::from_utf8(body).map_err(|error| Error::ParseBody {
        target: kind.as_str(),
        body: truncate_body(error.as_bytes()),
        message: error.utf8_error().to_string(),
    })
}

fn mismatch(kind: TargetKind) -> Error {
    Error::ParseBody {
        target: kind.as_str(),
        body: String::new(),
        message: "requested type does not match its classification".to_owned(),
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    match text {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

fn parse_as<T, I>(text: &str) -> Option<Result<T, String>>
where
    T: 'static,
    I: FromStr + 'static,
    I::Err: std::fmt::Display,
{
    if TypeId::of::<T>() != TypeId::of::<I>() {
        return None;
    }
    Some(
        text.parse::<I>()
            .map_err(|error| error.to_string())
            .and_then(|value| cast(value).ok_or_else(|| "integer type mismatch".to_owned())),
    )
}

macro_rules! try_integer_types {
    ($text:expr, $($ty:ty),+ $(,)?) => {
        $(
            if let Some(parsed) = parse_as::<T, $ty>($text) {
                return parsed;
            }
        )+
    };
}

fn decode_integer<T: 'static>(text: &str) -> Result<T, String> {
    try_integer_types!(text, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);
    Err("not an integer type".to_owned())
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read};

    use bytes::Bytes;
    use serde::Deserialize;

    use super::{TargetKind, decode_body, decode_json_stream};
    use crate::error::ErrorCode;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Payload {
        ok: bool,
    }

    #[test]
    fn target_kind_classifies_types() {
        assert_eq!(TargetKind::of::<Vec<u8>>(), TargetKind::Bytes);
        assert_eq!(TargetKind::of::<Bytes>(), TargetKind::Bytes);
        assert_eq!(TargetKind::of::<String>(), TargetKind::Text);
        assert_eq!(TargetKind::of::<i64>(), TargetKind::Integer);
        assert_eq!(TargetKind::of::<u8>(), TargetKind::Integer);
        assert_eq!(TargetKind::of::<usize>(), TargetKind::Integer);
        assert_eq!(TargetKind::of::<bool>(), TargetKind::Boolean);
        assert_eq!(TargetKind::of::<Payload>(), TargetKind::Json);
        assert_eq!(TargetKind::of::<serde_json::Value>(), TargetKind::Json);
        assert_eq!(TargetKind::of::<Vec<u16>>(), TargetKind::Json);
    }

    #[test]
    fn bytes_and_text_are_returned_verbatim() {
        let raw: Vec<u8> = decode_body(TargetKind::Bytes, b"\x00\xffraw".to_vec()).expect("bytes");
        assert_eq!(raw, b"\x00\xffraw");
        let shared: Bytes = decode_body(TargetKind::Bytes, b"shared".to_vec()).expect("bytes");
        assert_eq!(shared, Bytes::from_static(b"shared"));
        let text: String = decode_body(TargetKind::Text, b" hello ".to_vec()).expect("text");
        assert_eq!(text, " hello ");
    }

    #[test]
    fn invalid_utf8_text_is_a_parse_error() {
        let error = decode_body::<String>(TargetKind::Text, vec![0xff, 0xfe])
            .expect_err("invalid utf-8 must fail");
        assert_eq!(error.code(), ErrorCode::ParseBody);
    }

    #[test]
    fn integers_are_parsed_from_trimmed_text() {
        let value: i32 = decode_body(TargetKind::Integer, b" 42\n".to_vec()).expect("i32");
        assert_eq!(value, 42);
        let value: i64 = decode_body(TargetKind::Integer, b"+7".to_vec()).expect("signed plus");
        assert_eq!(value, 7);
        let value: u64 = decode_body(TargetKind::Integer, b"18446744073709551615".to_vec())
            .expect("u64 max");
        assert_eq!(value, u64::MAX);

        let error = decode_body::<u8>(TargetKind::Integer, b"300".to_vec())
            .expect_err("out of range must fail");
        assert_eq!(error.code(), ErrorCode::ParseBody);
        let error = decode_body::<i32>(TargetKind::Integer, b"forty".to_vec())
            .expect_err("words must fail");
        assert!(error.to_string().contains("forty"));
    }

    #[test]
    fn booleans_accept_the_documented_tokens() {
        for token in ["1", "t", "T", "TRUE", "true", "True"] {
            let value: bool = decode_body(TargetKind::Boolean, token.as_bytes().to_vec())
                .expect("truthy token");
            assert!(value, "{token}");
        }
        for token in ["0", "f", "F", "FALSE", "false", "False"] {
            let value: bool = decode_body(TargetKind::Boolean, token.as_bytes().to_vec())
                .expect("falsy token");
            assert!(!value, "{token}");
        }
        let error = decode_body::<bool>(TargetKind::Boolean, b"yes".to_vec())
            .expect_err("yes is not a bool token");
        assert_eq!(error.code(), ErrorCode::ParseBody);
    }

    #[test]
    fn json_stream_leaves_trailing_bytes_unread() {
        let mut reader = Cursor::new(br#"{"ok":true} trailing"#.to_vec());
        let payload: Payload = decode_json_stream(&mut reader).expect("json");
        assert_eq!(payload, Payload { ok: true });

        let mut rest = String::new();
        reader.read_to_string(&mut rest).expect("remainder");
        assert!(rest.ends_with("trailing"));
    }

    #[test]
    fn malformed_json_is_a_deserialize_error() {
        let mut reader = Cursor::new(b"{\"ok\":".to_vec());
        let error = decode_json_stream::<Payload, _>(&mut reader).expect_err("truncated json");
        assert_eq!(error.code(), ErrorCode::Deserialize);
    }
}
