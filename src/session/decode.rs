use bytes::Bytes;
use flate2::read::MultiGzDecoder;
use reqwest::header::{CONTENT_ENCODING, HeaderMap};
use std::io::Read;

use crate::error::SessionError;
use crate::transport::ResponseDescriptor;

/// Buffer a response body, gunzipping it when `Content-Encoding` says gzip.
///
/// Every concatenated gzip member is decoded; bytes after the last member
/// that do not form a valid member are a decode error. Any other encoding is
/// passed through as received.
pub fn read_body(response: ResponseDescriptor) -> Result<Bytes, SessionError> {
    if !is_gzip(&response.headers) || response.body.is_empty() {
        return Ok(response.body);
    }

    let mut decoder = MultiGzDecoder::new(response.body.as_ref());
    let mut out = Vec::with_capacity(response.body.len() * 2);
    decoder.read_to_end(&mut out).map_err(SessionError::Decode)?;
    Ok(Bytes::from(out))
}

fn is_gzip(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            let v = v.trim();
            v.eq_ignore_ascii_case("gzip") || v.eq_ignore_ascii_case("x-gzip")
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use reqwest::StatusCode;
    use reqwest::header::HeaderValue;
    use std::io::Write;
    use url::Url;

    fn response(encoding: Option<&'static str>, body: impl Into<Bytes>) -> ResponseDescriptor {
        let mut headers = HeaderMap::new();
        if let Some(enc) = encoding {
            headers.insert(CONTENT_ENCODING, HeaderValue::from_static(enc));
        }
        ResponseDescriptor {
            status: StatusCode::OK,
            url: Url::parse("https://example.com/").unwrap(),
            headers,
            body: body.into(),
        }
    }

    fn gzip(payload: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(payload).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn test_gzip_body_is_decoded() {
        let payload = b"<html>hello gzip</html>".repeat(50);
        let out = read_body(response(Some("gzip"), gzip(&payload))).unwrap();
        assert_eq!(out.as_ref(), payload.as_slice());
    }

    #[test]
    fn test_encoding_name_is_case_insensitive() {
        let out = read_body(response(Some("GZIP"), gzip(b"abc"))).unwrap();
        assert_eq!(out.as_ref(), b"abc");
    }

    #[test]
    fn test_plain_body_passes_through() {
        let out = read_body(response(None, "plain text")).unwrap();
        assert_eq!(out.as_ref(), b"plain text");

        let out = read_body(response(Some("br"), "opaque")).unwrap();
        assert_eq!(out.as_ref(), b"opaque");
    }

    #[test]
    fn test_malformed_gzip_is_decode_error() {
        let err = read_body(response(Some("gzip"), "definitely not gzip")).unwrap_err();
        assert!(matches!(err, SessionError::Decode(_)));
    }

    #[test]
    fn test_truncated_gzip_is_decode_error() {
        let mut data = gzip(&b"truncate me please".repeat(20));
        data.truncate(data.len() / 2);
        let err = read_body(response(Some("gzip"), data)).unwrap_err();
        assert!(matches!(err, SessionError::Decode(_)));
    }

    #[test]
    fn test_concatenated_members_are_all_decoded() {
        let mut body = gzip(b"hello ");
        body.extend(gzip(b"world"));
        let out = read_body(response(Some("gzip"), body)).unwrap();
        assert_eq!(out.as_ref(), b"hello world");
    }

    #[test]
    fn test_trailing_garbage_is_decode_error() {
        let mut body = gzip(b"hello");
        body.extend_from_slice(b"GARBAGE-NOT-GZIP");
        let err = read_body(response(Some("gzip"), body)).unwrap_err();
        assert!(matches!(err, SessionError::Decode(_)));
    }

    #[test]
    fn test_empty_gzip_body() {
        let out = read_body(response(Some("gzip"), Bytes::new())).unwrap();
        assert!(out.is_empty());
    }
}
