//! HTTP/1.1 message heads on the wire.
//!
//! Request heads are serialized by hand (they are small and fully known
//! up front); response heads are parsed with `httparse`.

use http::header::{CONNECTION, CONTENT_LENGTH, HOST, TRANSFER_ENCODING, USER_AGENT};
use http::{request, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Version};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::error::TransportError;
use crate::http::request::Target;

/// Upper bound on the size of a response head.
pub const MAX_HEAD_BYTES: usize = 64 * 1024;

/// Upper bound on the number of response headers.
pub const MAX_HEADERS: usize = 100;

const DEFAULT_USER_AGENT: &str = concat!("simple-transport/", env!("CARGO_PKG_VERSION"));

/// Parsed status line and headers of a response.
#[derive(Debug)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub version: Version,
    pub headers: HeaderMap,
}

/// Serialize the request line and headers.
///
/// `Content-Length` and `Transfer-Encoding` from the caller are replaced by a
/// length computed from the buffered body.
pub fn encode_request_head(parts: &request::Parts, target: &Target, body_len: usize) -> Vec<u8> {
    let mut head = Vec::with_capacity(256);
    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .filter(|pq| !pq.is_empty())
        .unwrap_or("/");

    head.extend_from_slice(parts.method.as_str().as_bytes());
    head.push(b' ');
    head.extend_from_slice(path.as_bytes());
    head.extend_from_slice(b" HTTP/1.1\r\n");

    if !parts.headers.contains_key(HOST) {
        push_header(&mut head, HOST.as_str(), target.authority().as_bytes());
    }
    for (name, value) in &parts.headers {
        if name == CONTENT_LENGTH || name == TRANSFER_ENCODING {
            continue;
        }
        push_header(&mut head, name.as_str(), value.as_bytes());
    }
    if body_len > 0 || expects_body(&parts.method) {
        push_header(&mut head, CONTENT_LENGTH.as_str(), body_len.to_string().as_bytes());
    }
    if !parts.headers.contains_key(CONNECTION) {
        push_header(&mut head, CONNECTION.as_str(), b"close");
    }
    if !parts.headers.contains_key(USER_AGENT) {
        push_header(&mut head, USER_AGENT.as_str(), DEFAULT_USER_AGENT.as_bytes());
    }

    head.extend_from_slice(b"\r\n");
    head
}

fn expects_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

fn push_header(head: &mut Vec<u8>, name: &str, value: &[u8]) {
    head.extend_from_slice(name.as_bytes());
    head.extend_from_slice(b": ");
    head.extend_from_slice(value);
    head.extend_from_slice(b"\r\n");
}

/// Read the next final (non-interim) response head.
///
/// `100 Continue` and other informational responses are skipped; `101` is
/// returned as-is.
pub async fn read_response_head<R>(reader: &mut R) -> Result<ResponseHead, TransportError>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let raw = read_head_bytes(reader).await?;
        let head = parse_head(&raw)?;
        if head.status.is_informational() && head.status != StatusCode::SWITCHING_PROTOCOLS {
            tracing::trace!(status = %head.status, "Skipping interim response");
            continue;
        }
        return Ok(head);
    }
}

async fn read_head_bytes<R>(reader: &mut R) -> Result<Vec<u8>, TransportError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::with_capacity(1024);
    loop {
        let start = buf.len();
        // One byte past the cap is enough to reject an overlong head.
        let limit = (MAX_HEAD_BYTES - start + 1) as u64;
        let n = (&mut *reader)
            .take(limit)
            .read_until(b'\n', &mut buf)
            .await
            .map_err(TransportError::read)?;
        if n == 0 {
            return Err(if buf.is_empty() {
                TransportError::Read(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed before response head",
                ))
            } else {
                TransportError::MalformedResponse("truncated response head".into())
            });
        }
        if buf.len() > MAX_HEAD_BYTES {
            return Err(TransportError::MalformedResponse(format!(
                "response head exceeds {MAX_HEAD_BYTES} bytes"
            )));
        }
        let line = &buf[start..];
        if line == b"\r\n" || line == b"\n" {
            if start == 0 {
                // Stray blank line ahead of the status line.
                buf.clear();
                continue;
            }
            return Ok(buf);
        }
    }
}

fn parse_head(raw: &[u8]) -> Result<ResponseHead, TransportError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut response = httparse::Response::new(&mut headers);
    match response.parse(raw) {
        Ok(httparse::Status::Complete(_)) => {}
        Ok(httparse::Status::Partial) => {
            return Err(TransportError::MalformedResponse("incomplete response head".into()))
        }
        Err(err) => return Err(TransportError::MalformedResponse(err.to_string())),
    }

    let code = response.code.unwrap_or_default();
    let status = StatusCode::from_u16(code)
        .map_err(|_| TransportError::MalformedResponse(format!("invalid status code {code}")))?;
    let version = match response.version {
        Some(0) => Version::HTTP_10,
        _ => Version::HTTP_11,
    };

    let mut map = HeaderMap::with_capacity(response.headers.len());
    for header in response.headers.iter() {
        let name = HeaderName::from_bytes(header.name.as_bytes())
            .map_err(|err| TransportError::MalformedResponse(err.to_string()))?;
        let value = HeaderValue::from_bytes(header.value)
            .map_err(|err| TransportError::MalformedResponse(err.to_string()))?;
        map.append(name, value);
    }

    Ok(ResponseHead {
        status,
        version,
        headers: map,
    })
}
