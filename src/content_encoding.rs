use std::io::{BufReader, Read};

use http::header::CONTENT_ENCODING;
use http::{HeaderMap, Method, StatusCode};

use crate::error::Error;

pub(crate) type BoxedReader = Box<dyn Read + Send>;

const BROTLI_BUFFER_SIZE: usize = 4096;

/// Responses that carry no payload by definition are never run through a decoder.
pub(crate) fn should_decode_content_encoded_body(method: &Method, status: StatusCode) -> bool {
    if *method == Method::HEAD {
        return false;
    }
    !(status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED)
}

/// Listed codings in the order they were applied by the sender.
pub(crate) fn content_encodings(headers: &HeaderMap) -> Result<Vec<String>, Error> {
    let mut encodings = Vec::new();
    for value in headers.get_all(CONTENT_ENCODING) {
        let value = value.to_str().map_err(|error| Error::DecodeContentEncoding {
            encoding: "content-encoding".to_owned(),
            message: error.to_string(),
        })?;
        encodings.extend(
            value
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_ascii_lowercase),
        );
    }
    Ok(encodings)
}

/// Wraps `body` in one decoder per listed coding, outermost coding first.
///
/// `identity` and codings this crate does not know pass the bytes through untouched.
pub(crate) fn decoding_reader(body: BoxedReader, headers: &HeaderMap) -> Result<BoxedReader, Error> {
    let mut reader = body;
    for encoding in content_encodings(headers)?.iter().rev() {
        reader = match encoding.as_str() {
            "gzip" | "x-gzip" => Box::new(flate2::read::MultiGzDecoder::new(reader)),
            "deflate" => Box::new(flate2::read::ZlibDecoder::new(reader)),
            "br" => Box::new(brotli::Decompressor::new(reader, BROTLI_BUFFER_SIZE)),
            "zstd" => {
                let decoder = zstd::stream::read::Decoder::with_buffer(BufReader::new(reader))
                    .map_err(|error| Error::DecodeContentEncoding {
                        encoding: encoding.clone(),
                        message: error.to_string(),
                    })?;
                Box::new(decoder)
            }
            _ => reader,
        };
    }
    Ok(reader)
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read, Write};

    use http::header::CONTENT_ENCODING;
    use http::{HeaderMap, HeaderValue, Method, StatusCode};

    use super::{BoxedReader, decoding_reader, should_decode_content_encoded_body};
    use crate::error::ErrorCode;

    const PAYLOAD: &[u8] = br#"{"ok":true,"items":[1,2,3]}"#;

    fn headers_with(encoding: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static(encoding));
        headers
    }

    fn decode(body: Vec<u8>, headers: &HeaderMap) -> Vec<u8> {
        let reader: BoxedReader = Box::new(Cursor::new(body));
        let mut decoded = Vec::new();
        decoding_reader(reader, headers)
            .expect("decoder should build")
            .read_to_end(&mut decoded)
            .expect("body should decode");
        decoded
    }

    fn gzip(input: &[u8]) -> Vec<u8> {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(input).expect("gzip write");
        encoder.finish().expect("gzip finish")
    }

    fn brotli(input: &[u8]) -> Vec<u8> {
        let mut encoded = Vec::new();
        {
            let mut encoder = brotli::CompressorWriter::new(&mut encoded, 4096, 5, 22);
            encoder.write_all(input).expect("brotli write");
        }
        encoded
    }

    #[test]
    fn gzip_body_is_decoded() {
        assert_eq!(decode(gzip(PAYLOAD), &headers_with("gzip")), PAYLOAD);
        assert_eq!(decode(gzip(PAYLOAD), &headers_with("x-gzip")), PAYLOAD);
    }

    #[test]
    fn deflate_body_is_decoded() {
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(PAYLOAD).expect("deflate write");
        let encoded = encoder.finish().expect("deflate finish");
        assert_eq!(decode(encoded, &headers_with("deflate")), PAYLOAD);
    }

    #[test]
    fn brotli_body_is_decoded() {
        assert_eq!(decode(brotli(PAYLOAD), &headers_with("br")), PAYLOAD);
    }

    #[test]
    fn zstd_body_is_decoded() {
        let encoded = zstd::stream::encode_all(PAYLOAD, 3).expect("zstd encode");
        assert_eq!(decode(encoded, &headers_with("zstd")), PAYLOAD);
    }

    #[test]
    fn stacked_encodings_are_undone_in_reverse_order() {
        let encoded = brotli(&gzip(PAYLOAD));
        assert_eq!(decode(encoded, &headers_with("gzip, br")), PAYLOAD);
    }

    #[test]
    fn identity_and_unknown_encodings_pass_through() {
        assert_eq!(decode(PAYLOAD.to_vec(), &headers_with("identity")), PAYLOAD);
        assert_eq!(decode(PAYLOAD.to_vec(), &headers_with("compress-x")), PAYLOAD);
        assert_eq!(decode(PAYLOAD.to_vec(), &HeaderMap::new()), PAYLOAD);
    }

    #[test]
    fn non_ascii_header_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_ENCODING,
            HeaderValue::from_bytes(b"gzip\xff").expect("opaque header bytes"),
        );
        let reader: BoxedReader = Box::new(Cursor::new(Vec::new()));
        let error = match decoding_reader(reader, &headers) {
            Ok(_) => panic!("malformed content-encoding must fail"),
            Err(error) => error,
        };
        assert_eq!(error.code(), ErrorCode::DecodeContentEncoding);
    }

    #[test]
    fn bodyless_responses_skip_decoding() {
        assert!(!should_decode_content_encoded_body(&Method::HEAD, StatusCode::OK));
        assert!(!should_decode_content_encoded_body(&Method::GET, StatusCode::NO_CONTENT));
        assert!(!should_decode_content_encoded_body(&Method::GET, StatusCode::NOT_MODIFIED));
        assert!(should_decode_content_encoded_body(&Method::GET, StatusCode::OK));
    }
}
