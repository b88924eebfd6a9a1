//! HTTP/1.1 message framing over an async stream.
//!
//! `read_message` returns two views of the same message: `raw`, the
//! exact bytes as they arrived on the wire (what gets forwarded
//! unchanged upstream or downstream), and
//! `decoded_body`, a dechunked, size-capped copy used only for C4
//! inspection. Header parsing is delegated to `httparse`; chunked and
//! content-length framing are handled here since `httparse` only
//! parses the head.

use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt};

const MAX_HEADERS: usize = 64;
const HEAD_READ_CHUNK: usize = 4096;

/// Callers MUST read through a buffering wrapper (`tokio::io::BufReader`)
/// for the lifetime of the connection, not a fresh one per message:
/// `read_head` only consumes up to the header terminator and relies on
/// bytes read-ahead past it staying in the shared buffer for the body
/// read that follows.

#[derive(Debug)]
pub struct ParsedMessage {
    /// Exact bytes of the message (head + body) as received.
    pub raw: Vec<u8>,
    pub method: Option<String>,
    pub path: Option<String>,
    pub status: Option<u16>,
    pub headers: Vec<(String, String)>,
    /// Dechunked body, capped at the configured inspection limit.
    pub decoded_body: Vec<u8>,
    pub body_truncated: bool,
}

impl ParsedMessage {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_connection_close(&self) -> bool {
        self.header("connection")
            .map(|v| v.eq_ignore_ascii_case("close"))
            .unwrap_or(false)
    }
}

/// Read one HTTP request or response off `reader`. Returns `Ok(None)`
/// if the peer closed the connection cleanly before sending any bytes
/// of a new message (the ordinary end of a keep-alive loop).
pub async fn read_message<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    is_request: bool,
    max_inspect_bytes: usize,
) -> io::Result<Option<ParsedMessage>> {
    let Some(head) = read_head(reader).await? else {
        return Ok(None);
    };

    let (method, path, status, headers) = parse_head(&head, is_request)?;

    let mut raw = head.clone();
    let content_length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse::<usize>().ok());
    let is_chunked = headers
        .iter()
        .any(|(k, v)| k.eq_ignore_ascii_case("transfer-encoding") && v.to_ascii_lowercase().contains("chunked"));
    let connection_close = headers
        .iter()
        .any(|(k, v)| k.eq_ignore_ascii_case("connection") && v.eq_ignore_ascii_case("close"));
    let no_body_status = status.map(|s| s < 200 || s == 204 || s == 304).unwrap_or(false);

    let (decoded_body, truncated) = if is_request && !is_chunked && content_length.is_none() {
        (Vec::new(), false)
    } else if no_body_status {
        (Vec::new(), false)
    } else if is_chunked {
        read_chunked_body(reader, &mut raw, max_inspect_bytes).await?
    } else if let Some(len) = content_length {
        read_fixed_body(reader, &mut raw, len, max_inspect_bytes).await?
    } else if !is_request && connection_close {
        read_to_eof_body(reader, &mut raw, max_inspect_bytes).await?
    } else {
        (Vec::new(), false)
    };

    Ok(Some(ParsedMessage {
        raw,
        method,
        path,
        status,
        headers,
        decoded_body,
        body_truncated: truncated,
    }))
}

async fn read_head<R: AsyncBufRead + Unpin>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut head = Vec::new();
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return if head.is_empty() {
                Ok(None)
            } else {
                Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed mid-header",
                ))
            };
        }

        // Search across the head-so-far plus what's newly available so
        // a terminator split across fill_buf calls is still found.
        let search_start = head.len().saturating_sub(3);
        let mut probe = head[search_start..].to_vec();
        probe.extend_from_slice(available);

        if let Some(pos_in_probe) = probe.windows(4).position(|w| w == b"\r\n\r\n") {
            let terminator_end = pos_in_probe + 4;
            let needed_from_available = terminator_end - (head.len() - search_start);
            head.extend_from_slice(&available[..needed_from_available]);
            reader.consume(needed_from_available);
            return Ok(Some(head));
        }

        let n = available.len();
        head.extend_from_slice(available);
        reader.consume(n);
    }
}

fn parse_head(
    head: &[u8],
    is_request: bool,
) -> io::Result<(Option<String>, Option<String>, Option<u16>, Vec<(String, String)>)> {
    let mut header_storage = [httparse::EMPTY_HEADER; MAX_HEADERS];

    if is_request {
        let mut req = httparse::Request::new(&mut header_storage);
        match req.parse(head) {
            Ok(httparse::Status::Complete(_)) | Ok(httparse::Status::Partial) => {
                let method = req.method.map(str::to_string);
                let path = req.path.map(str::to_string);
                let headers = collect_headers(req.headers);
                Ok((method, path, None, headers))
            }
            Err(e) => Err(io::Error::new(io::ErrorKind::InvalidData, e.to_string())),
        }
    } else {
        let mut resp = httparse::Response::new(&mut header_storage);
        match resp.parse(head) {
            Ok(httparse::Status::Complete(_)) | Ok(httparse::Status::Partial) => {
                let status = resp.code;
                let headers = collect_headers(resp.headers);
                Ok((None, None, status, headers))
            }
            Err(e) => Err(io::Error::new(io::ErrorKind::InvalidData, e.to_string())),
        }
    }
}

fn collect_headers(headers: &[httparse::Header<'_>]) -> Vec<(String, String)> {
    headers
        .iter()
        .filter(|h| !h.name.is_empty())
        .map(|h| (h.name.to_string(), String::from_utf8_lossy(h.value).into_owned()))
        .collect()
}

async fn read_fixed_body<R: AsyncRead + Unpin>(
    reader: &mut R,
    raw: &mut Vec<u8>,
    len: usize,
    max_inspect_bytes: usize,
) -> io::Result<(Vec<u8>, bool)> {
    let mut remaining = len;
    let mut decoded = Vec::with_capacity(len.min(max_inspect_bytes));
    let mut truncated = false;
    let mut chunk = [0u8; HEAD_READ_CHUNK];

    while remaining > 0 {
        let want = remaining.min(chunk.len());
        let n = reader.read(&mut chunk[..want]).await?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "body shorter than content-length"));
        }
        raw.extend_from_slice(&chunk[..n]);
        if decoded.len() < max_inspect_bytes {
            let take = (max_inspect_bytes - decoded.len()).min(n);
            decoded.extend_from_slice(&chunk[..take]);
            if take < n {
                truncated = true;
            }
        } else {
            truncated = true;
        }
        remaining -= n;
    }
    Ok((decoded, truncated))
}

async fn read_chunked_body<R: AsyncRead + Unpin>(
    reader: &mut R,
    raw: &mut Vec<u8>,
    max_inspect_bytes: usize,
) -> io::Result<(Vec<u8>, bool)> {
    let mut decoded = Vec::new();
    let mut truncated = false;

    loop {
        let size_line = read_line(reader).await?;
        raw.extend_from_slice(&size_line);
        let size_text = std::str::from_utf8(&size_line)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "non-utf8 chunk size"))?;
        let size_text = size_text.trim_end_matches("\r\n");
        let size_text = size_text.split(';').next().unwrap_or(size_text);
        let size = usize::from_str_radix(size_text.trim(), 16)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "malformed chunk size"))?;

        if size == 0 {
            // Trailers, terminated by an empty line.
            loop {
                let trailer = read_line(reader).await?;
                raw.extend_from_slice(&trailer);
                if trailer == b"\r\n" {
                    break;
                }
            }
            break;
        }

        let mut remaining = size;
        let mut buf = [0u8; HEAD_READ_CHUNK];
        while remaining > 0 {
            let want = remaining.min(buf.len());
            let n = reader.read(&mut buf[..want]).await?;
            if n == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated chunk body"));
            }
            raw.extend_from_slice(&buf[..n]);
            if decoded.len() < max_inspect_bytes {
                let take = (max_inspect_bytes - decoded.len()).min(n);
                decoded.extend_from_slice(&buf[..take]);
                if take < n {
                    truncated = true;
                }
            } else {
                truncated = true;
            }
            remaining -= n;
        }

        let crlf = read_line(reader).await?;
        raw.extend_from_slice(&crlf);
    }

    Ok((decoded, truncated))
}

async fn read_to_eof_body<R: AsyncRead + Unpin>(
    reader: &mut R,
    raw: &mut Vec<u8>,
    max_inspect_bytes: usize,
) -> io::Result<(Vec<u8>, bool)> {
    let mut decoded = Vec::new();
    let mut truncated = false;
    let mut chunk = [0u8; HEAD_READ_CHUNK];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&chunk[..n]);
        if decoded.len() < max_inspect_bytes {
            let take = (max_inspect_bytes - decoded.len()).min(n);
            decoded.extend_from_slice(&chunk[..take]);
            if take < n {
                truncated = true;
            }
        } else {
            truncated = true;
        }
    }
    Ok((decoded, truncated))
}

async fn read_line<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = reader.read(&mut byte).await?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated chunk framing"));
        }
        line.push(byte[0]);
        if line.ends_with(b"\r\n") {
            return Ok(line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn reads_fixed_length_request_body() {
        let wire = b"POST /collect HTTP/1.1\r\nHost: x\r\nContent-Length: 13\r\n\r\n{\"event\":\"a\"}";
        let mut reader = BufReader::new(Cursor::new(wire.to_vec()));
        let msg = read_message(&mut reader, true, 1024).await.unwrap().unwrap();

        assert_eq!(msg.method.as_deref(), Some("POST"));
        assert_eq!(msg.decoded_body, br#"{"event":"a"}"#);
        assert_eq!(msg.raw, wire);
    }

    #[tokio::test]
    async fn reads_chunked_response_body() {
        let wire = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\n\r\n";
        let mut reader = BufReader::new(Cursor::new(wire.to_vec()));
        let msg = read_message(&mut reader, false, 1024).await.unwrap().unwrap();

        assert_eq!(msg.status, Some(200));
        assert_eq!(msg.decoded_body, b"hello");
        assert_eq!(msg.raw, wire);
    }

    #[tokio::test]
    async fn request_without_length_or_chunking_has_empty_body() {
        let wire = b"GET /x HTTP/1.1\r\nHost: x\r\n\r\n";
        let mut reader = BufReader::new(Cursor::new(wire.to_vec()));
        let msg = read_message(&mut reader, true, 1024).await.unwrap().unwrap();
        assert!(msg.decoded_body.is_empty());
    }

    #[tokio::test]
    async fn second_message_on_same_buffer_reads_correctly() {
        let wire = b"POST /a HTTP/1.1\r\nContent-Length: 2\r\n\r\nhiPOST /b HTTP/1.1\r\nContent-Length: 2\r\n\r\nyo";
        let mut reader = BufReader::new(Cursor::new(wire.to_vec()));

        let first = read_message(&mut reader, true, 1024).await.unwrap().unwrap();
        assert_eq!(first.path.as_deref(), Some("/a"));
        assert_eq!(first.decoded_body, b"hi");

        let second = read_message(&mut reader, true, 1024).await.unwrap().unwrap();
        assert_eq!(second.path.as_deref(), Some("/b"));
        assert_eq!(second.decoded_body, b"yo");
    }

    #[tokio::test]
    async fn clean_eof_between_messages_yields_none() {
        let mut reader = BufReader::new(Cursor::new(Vec::new()));
        assert!(read_message(&mut reader, true, 1024).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn body_beyond_inspection_cap_is_truncated_but_raw_is_complete() {
        let body = "x".repeat(100);
        let wire = format!("POST /x HTTP/1.1\r\nContent-Length: 100\r\n\r\n{body}");
        let mut reader = BufReader::new(Cursor::new(wire.clone().into_bytes()));
        let msg = read_message(&mut reader, true, 10).await.unwrap().unwrap();

        assert_eq!(msg.decoded_body.len(), 10);
        assert!(msg.body_truncated);
        assert_eq!(msg.raw, wire.into_bytes());
    }
}
