//! HTTP range-request adapter: turns a [`LocalStream`] into an `axum` response honoring `Range`
//! headers, the way a DLNA player or a browser's `<video>` tag expects. Layered entirely outside
//! the core: nothing in [`crate::stream`] or [`crate::picker`] knows HTTP exists.

use std::io::SeekFrom;

use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, StatusCode};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt};

use crate::error::Error;
use crate::stream::LocalStream;

const DLNA_TRANSFER_MODE: &str = "transferMode.dlna.org";
const DLNA_GET_CONTENT_FEATURES: &str = "getcontentFeatures.dlna.org";
const DLNA_CONTENT_FEATURES: &str = "contentFeatures.dlna.org";

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Error::Conflict => StatusCode::CONFLICT,
            Error::InvalidState(_) => StatusCode::CONFLICT,
            Error::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            Error::Geometry(_) => StatusCode::BAD_REQUEST,
            Error::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

/// Parses a single-range `Range: bytes=start-end` header into `(start, exclusive_end)`. Multi-
/// range requests aren't supported, matching what most streaming clients send anyway.
fn parse_range(headers: &HeaderMap) -> Option<(u64, Option<u64>)> {
    headers
        .get(http::header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("bytes="))
        .and_then(|v| v.split_once('-'))
        .and_then(|(start, end)| {
            let start = start.parse::<u64>().ok()?;
            let end = if end.is_empty() {
                None
            } else {
                Some(end.parse::<u64>().ok()?.saturating_add(1))
            };
            Some((start, end))
        })
}

/// Builds an HTTP response serving `stream`, honoring a `Range` header if present.
///
/// `mime_type` should come from [`mime_guess::from_path`] against the file's name; callers that
/// don't know the file's name can pass `None` and clients will sniff the content themselves.
pub async fn range_response(
    mut stream: LocalStream,
    mime_type: Option<&str>,
    headers: &HeaderMap,
) -> Result<Response, Error> {
    let total_len = stream.len();
    let mut status = StatusCode::OK;
    let mut output_headers = HeaderMap::new();
    output_headers.insert("Accept-Ranges", HeaderValue::from_static("bytes"));

    if headers
        .get(DLNA_TRANSFER_MODE)
        .map(|v| matches!(v.as_bytes(), b"Streaming" | b"streaming"))
        .unwrap_or(false)
    {
        output_headers.insert(DLNA_TRANSFER_MODE, HeaderValue::from_static("Streaming"));
    }
    if headers
        .get(DLNA_GET_CONTENT_FEATURES)
        .map(|v| v.as_bytes() == b"1")
        .unwrap_or(false)
    {
        output_headers.insert(DLNA_CONTENT_FEATURES, HeaderValue::from_static("DLNA.ORG_OP=01"));
    }
    if let Some(mime) = mime_type {
        if let Ok(value) = HeaderValue::from_str(mime) {
            output_headers.insert(http::header::CONTENT_TYPE, value);
        }
    }

    let range = parse_range(headers);
    let body: Box<dyn AsyncRead + Send + Unpin> = if let Some((start, end)) = range {
        if start >= total_len || end.is_some_and(|end| end <= start || end > total_len) {
            return Ok((StatusCode::RANGE_NOT_SATISFIABLE, "bad range").into_response());
        }
        status = StatusCode::PARTIAL_CONTENT;
        let end = end.unwrap_or(total_len);

        stream
            .seek(SeekFrom::Start(start))
            .await
            .map_err(|e| Error::Storage(e.into()))?;

        let to_take = end - start;
        output_headers.insert(
            http::header::CONTENT_LENGTH,
            HeaderValue::from_maybe_shared(Bytes::from(to_take.to_string())).unwrap(),
        );
        output_headers.insert(
            http::header::CONTENT_RANGE,
            HeaderValue::from_maybe_shared(Bytes::from(format!(
                "bytes {}-{}/{}",
                start,
                end.saturating_sub(1),
                total_len
            )))
            .unwrap(),
        );
        Box::new(stream.take(to_take))
    } else {
        output_headers.insert(
            http::header::CONTENT_LENGTH,
            HeaderValue::from_maybe_shared(Bytes::from(total_len.to_string())).unwrap(),
        );
        Box::new(stream)
    };

    let body_stream = tokio_util::io::ReaderStream::with_capacity(body, 65536);
    Ok((status, (output_headers, axum::body::Body::from_stream(body_stream))).into_response())
}

/// Picks a MIME type for `file_name` the way a file browser does: by extension, falling back to
/// an octet stream for anything unrecognized.
pub fn guess_mime_type(file_name: &str) -> String {
    mime_guess::from_path(file_name)
        .first_or_octet_stream()
        .essence_str()
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bounded_range() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::RANGE, HeaderValue::from_static("bytes=100-199"));
        assert_eq!(parse_range(&headers), Some((100, Some(200))));
    }

    #[test]
    fn parses_open_ended_range() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::RANGE, HeaderValue::from_static("bytes=100-"));
        assert_eq!(parse_range(&headers), Some((100, None)));
    }

    #[test]
    fn absent_range_header_parses_to_none() {
        assert_eq!(parse_range(&HeaderMap::new()), None);
    }

    #[test]
    fn guesses_common_video_mime_type() {
        assert_eq!(guess_mime_type("movie.mp4"), "video/mp4");
    }
}
