//! Response-time compression of dynamically rendered bodies.
//!
//! # Responsibilities
//! - Negotiate `br` or `gzip` from `Accept-Encoding`
//! - Decide whether a response is eligible for re-encoding
//! - Rewrite headers and stream the body through an encoder
//!
//! # Design Decisions
//! - Negotiation is substring matching; q-values are not parsed
//! - The body is pulled chunk by chunk through the encoder, so a slow
//!   client backpressures the upstream read instead of buffering
//! - A read or encoder failure is logged and aborts the response body;
//!   nothing is retried once headers are on the wire

use std::io;
use std::sync::LazyLock;

use async_compression::tokio::bufread::{BrotliEncoder, GzipEncoder};
use async_compression::Level;
use axum::body::{Body, Bytes, HttpBody};
use axum::http::header::{CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, VARY};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::Response;
use futures_util::{Stream, TryStreamExt};
use regex::Regex;
use tokio_util::io::{ReaderStream, StreamReader};

/// Brotli quality: balanced between speed and ratio.
const BROTLI_QUALITY: i32 = 4;

/// Gzip level: zlib's usual default.
const GZIP_LEVEL: i32 = 6;

/// Text-based content types that benefit from compression.
static COMPRESSIBLE_CONTENT_TYPES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:text/|application/(?:json|javascript|xml|x-www-form-urlencoded)|[a-z]+/[a-z0-9.-]*\+(?:json|xml))",
    )
    .expect("compressible content type pattern is valid")
});

/// A negotiated content coding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Brotli,
    Gzip,
}

impl Encoding {
    /// Pick an encoding from an `Accept-Encoding` value, preferring Brotli.
    pub fn negotiate(accept_encoding: Option<&str>) -> Option<Self> {
        let accept = accept_encoding?;
        if accept.contains("br") {
            Some(Encoding::Brotli)
        } else if accept.contains("gzip") {
            Some(Encoding::Gzip)
        } else {
            None
        }
    }

    /// Token used in `Content-Encoding`.
    pub fn as_str(self) -> &'static str {
        match self {
            Encoding::Brotli => "br",
            Encoding::Gzip => "gzip",
        }
    }
}

/// Whether a `Content-Type` value is worth compressing.
pub fn is_compressible(content_type: &str) -> bool {
    COMPRESSIBLE_CONTENT_TYPES.is_match(content_type)
}

/// Decide the encoding to apply to `response`, if any.
pub fn select_encoding(
    request_method: &Method,
    accept_encoding: Option<&str>,
    response: &Response<Body>,
) -> Option<Encoding> {
    let encoding = Encoding::negotiate(accept_encoding)?;
    let headers = response.headers();

    let compressible = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(is_compressible);
    if !compressible || headers.contains_key(CONTENT_ENCODING) {
        return None;
    }

    has_body(request_method, response).then_some(encoding)
}

fn has_body(request_method: &Method, response: &Response<Body>) -> bool {
    let status = response.status();
    *request_method != Method::HEAD
        && status != StatusCode::NO_CONTENT
        && status != StatusCode::NOT_MODIFIED
        && !status.is_informational()
        && !response.body().is_end_stream()
}

/// Compress `response` when eligible, else return it untouched.
pub fn compress_response(
    request_method: &Method,
    accept_encoding: Option<&str>,
    response: Response<Body>,
) -> Response<Body> {
    match select_encoding(request_method, accept_encoding, &response) {
        Some(encoding) => encode(encoding, response),
        None => response,
    }
}

/// Re-encode a response body with `encoding`.
pub fn encode(encoding: Encoding, response: Response<Body>) -> Response<Body> {
    let (mut parts, body) = response.into_parts();
    rewrite_headers(&mut parts.headers, encoding);
    Response::from_parts(parts, encode_body(encoding, body))
}

fn rewrite_headers(headers: &mut HeaderMap, encoding: Encoding) {
    headers.insert(CONTENT_ENCODING, HeaderValue::from_static(encoding.as_str()));
    headers.remove(CONTENT_LENGTH);
    headers.append(VARY, HeaderValue::from_static("Accept-Encoding"));
}

fn encode_body(encoding: Encoding, body: Body) -> Body {
    let reader = StreamReader::new(body.into_data_stream().map_err(io::Error::other));

    match encoding {
        Encoding::Brotli => {
            let encoder = BrotliEncoder::with_quality(reader, Level::Precise(BROTLI_QUALITY));
            Body::from_stream(log_failures(encoding, ReaderStream::new(encoder)))
        }
        Encoding::Gzip => {
            let encoder = GzipEncoder::with_quality(reader, Level::Precise(GZIP_LEVEL));
            Body::from_stream(log_failures(encoding, ReaderStream::new(encoder)))
        }
    }
}

fn log_failures<S>(encoding: Encoding, stream: S) -> impl Stream<Item = io::Result<Bytes>>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    stream.inspect_err(move |e| {
        tracing::error!(encoding = encoding.as_str(), error = %e, "Compression stream failed");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use std::io::Read;

    fn response(content_type: &str, body: &'static str) -> Response<Body> {
        Response::builder()
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, body.len())
            .body(Body::from(body))
            .unwrap()
    }

    #[test]
    fn test_negotiation_prefers_brotli() {
        assert_eq!(Encoding::negotiate(Some("gzip, deflate, br")), Some(Encoding::Brotli));
        assert_eq!(Encoding::negotiate(Some("gzip")), Some(Encoding::Gzip));
        assert_eq!(Encoding::negotiate(Some("deflate, identity")), None);
        assert_eq!(Encoding::negotiate(None), None);
    }

    #[test]
    fn test_compressible_types() {
        for ct in [
            "text/html; charset=utf-8",
            "text/css",
            "application/json",
            "application/javascript",
            "application/xml",
            "application/x-www-form-urlencoded",
            "application/ld+json",
            "application/rss+xml",
            "image/svg+xml",
            "TEXT/PLAIN",
        ] {
            assert!(is_compressible(ct), "{ct} should be compressible");
        }
        for ct in ["image/png", "application/octet-stream", "video/mp4", "font/woff2"] {
            assert!(!is_compressible(ct), "{ct} should not be compressible");
        }
    }

    #[test]
    fn test_png_is_never_compressed() {
        let res = response("image/png", "binary");
        assert_eq!(select_encoding(&Method::GET, Some("br, gzip"), &res), None);
    }

    #[test]
    fn test_existing_encoding_is_left_alone() {
        let mut res = response("text/html", "<p>hi</p>");
        res.headers_mut().insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        assert_eq!(select_encoding(&Method::GET, Some("br"), &res), None);
    }

    #[test]
    fn test_empty_bodies_are_skipped() {
        let res = Response::builder()
            .header(CONTENT_TYPE, "text/html")
            .body(Body::empty())
            .unwrap();
        assert_eq!(select_encoding(&Method::GET, Some("gzip"), &res), None);

        let res = response("text/html", "<p>hi</p>");
        assert_eq!(select_encoding(&Method::HEAD, Some("gzip"), &res), None);
    }

    #[tokio::test]
    async fn test_brotli_round_trip() {
        let json = r#"{"message":"hello","items":[1,2,3]}"#;
        let res = compress_response(&Method::GET, Some("br, gzip"), response("application/json", json));

        assert_eq!(res.headers()[CONTENT_ENCODING], "br");
        assert!(res.headers().get(CONTENT_LENGTH).is_none());
        assert_eq!(res.headers()[VARY], "Accept-Encoding");

        let compressed = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let mut decoded = Vec::new();
        brotli::Decompressor::new(&compressed[..], 4096)
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, json.as_bytes());
    }

    #[tokio::test]
    async fn test_gzip_round_trip_keeps_existing_vary() {
        let html = "<html><body>hello world</body></html>";
        let mut res = response("text/html", html);
        res.headers_mut().insert(VARY, HeaderValue::from_static("Cookie"));

        let res = compress_response(&Method::GET, Some("gzip"), res);
        assert_eq!(res.headers()[CONTENT_ENCODING], "gzip");
        let vary: Vec<_> = res
            .headers()
            .get_all(VARY)
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(vary, vec!["Cookie", "Accept-Encoding"]);

        let compressed = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let mut decoded = String::new();
        flate2::read::GzDecoder::new(&compressed[..])
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, html);
    }

    #[tokio::test]
    async fn test_streamed_chunks_stay_in_order() {
        let chunks: Vec<Result<&'static str, io::Error>> =
            vec![Ok("first,"), Ok("second,"), Ok("third")];
        let res = Response::builder()
            .header(CONTENT_TYPE, "text/plain")
            .body(Body::from_stream(futures_util::stream::iter(chunks)))
            .unwrap();

        let res = compress_response(&Method::GET, Some("gzip"), res);
        let compressed = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let mut decoded = String::new();
        flate2::read::GzDecoder::new(&compressed[..])
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, "first,second,third");
    }

    #[tokio::test]
    async fn test_upstream_failure_aborts_body() {
        let chunks: Vec<Result<&'static str, io::Error>> =
            vec![Ok("partial"), Err(io::Error::other("upstream reset"))];
        let res = Response::builder()
            .header(CONTENT_TYPE, "text/plain")
            .body(Body::from_stream(futures_util::stream::iter(chunks)))
            .unwrap();

        let res = compress_response(&Method::GET, Some("br"), res);
        assert!(to_bytes(res.into_body(), usize::MAX).await.is_err());
    }
}
