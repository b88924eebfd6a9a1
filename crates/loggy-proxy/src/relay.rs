//! Per-connection request/response relay shared by the plain-HTTP and
//! CONNECT/MITM code paths.
//!
//! Serves any number of HTTP/1.1 request/response pairs over one
//! client<->upstream pair of streams, in lockstep (no pipelining):
//! read one request from the client, forward its exact wire bytes
//! upstream, tee a decoded copy to the extractor if it looks like an
//! analytics POST/PUT, then relay the matching response back
//! unchanged. Loops until either side closes, sends `Connection:
//! close`, or the client goes idle past the configured timeout.

use crate::compress;
use crate::http_message::{self, ParsedMessage};
use loggy_core::event::EventRingBuffer;
use loggy_registry::SourceRegistry;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Which side ended the connection, so the listener can log the exact
/// terminal state of the per-CONNECT state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    ClientEof,
    UpstreamEof,
    /// Either side asked for the connection to close after a
    /// request/response pair completed normally.
    Done,
}

pub struct RelayContext {
    pub registry: Arc<SourceRegistry>,
    pub buffer: Arc<Mutex<EventRingBuffer>>,
    pub max_body_bytes: usize,
    pub idle_timeout: Duration,
    pub scheme: &'static str,
    /// Host to assume when an inner request uses origin-form
    /// (`/path`) and carries no `Host` header - the CONNECT target.
    pub default_host: Option<String>,
}

/// Relay a fresh pair of streams, reading the first request from
/// scratch.
pub async fn relay<C, U>(client: C, upstream: U, ctx: &RelayContext) -> io::Result<CloseReason>
where
    C: AsyncRead + AsyncWrite + Unpin,
    U: AsyncRead + AsyncWrite + Unpin,
{
    let mut client = BufReader::new(client);
    let mut upstream = BufReader::new(upstream);
    drive(&mut client, &mut upstream, ctx, None).await
}

/// Relay a connection whose first request has already been read off
/// `client` (the listener peeks at it to classify plain-HTTP vs
/// CONNECT). `client` must be the same buffered reader used for that
/// peek, so any bytes read ahead of the message boundary aren't lost.
pub async fn relay_with_first<C, U>(
    client: BufReader<C>,
    upstream: U,
    ctx: &RelayContext,
    first: ParsedMessage,
) -> io::Result<CloseReason>
where
    C: AsyncRead + AsyncWrite + Unpin,
    U: AsyncRead + AsyncWrite + Unpin,
{
    let mut client = client;
    let mut upstream = BufReader::new(upstream);
    drive(&mut client, &mut upstream, ctx, Some(first)).await
}

async fn drive<C, U>(
    client: &mut BufReader<C>,
    upstream: &mut BufReader<U>,
    ctx: &RelayContext,
    mut pending: Option<ParsedMessage>,
) -> io::Result<CloseReason>
where
    C: AsyncRead + AsyncWrite + Unpin,
    U: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let request = match pending.take() {
            Some(request) => request,
            None => {
                let read = http_message::read_message(client, true, ctx.max_body_bytes);
                match tokio::time::timeout(ctx.idle_timeout, read).await {
                    Ok(Ok(Some(request))) => request,
                    Ok(Ok(None)) => {
                        debug!("client closed connection");
                        return Ok(CloseReason::ClientEof);
                    }
                    Ok(Err(e)) => return Err(e),
                    Err(_) => {
                        debug!("idle connection timed out");
                        return Ok(CloseReason::ClientEof);
                    }
                }
            }
        };

        let full_url = reconstruct_url(ctx.scheme, ctx.default_host.as_deref(), &request);

        upstream.write_all(&request.raw).await?;
        upstream.flush().await?;

        if let Some(url) = &full_url {
            if matches!(request.method.as_deref(), Some("POST") | Some("PUT")) && !request.decoded_body.is_empty() {
                inspect_request(ctx, url, &request).await;
            }
        }

        let request_wants_close = request.is_connection_close();

        let Some(response) = http_message::read_message(upstream, false, ctx.max_body_bytes).await? else {
            warn!("upstream closed connection before sending a response");
            return Ok(CloseReason::UpstreamEof);
        };

        client.write_all(&response.raw).await?;
        client.flush().await?;

        if request_wants_close || response.is_connection_close() {
            return Ok(CloseReason::Done);
        }
    }
}

fn reconstruct_url(scheme: &str, default_host: Option<&str>, request: &ParsedMessage) -> Option<String> {
    let path = request.path.as_deref()?;
    if path.starts_with("http://") || path.starts_with("https://") {
        return Some(path.to_string());
    }
    let host = request.header("host").or(default_host)?;
    Some(format!("{scheme}://{host}{path}"))
}

async fn inspect_request(ctx: &RelayContext, url: &str, request: &ParsedMessage) {
    let content_encoding = request.header("content-encoding");
    let decompressed = match compress::decompress(content_encoding, &request.decoded_body) {
        Ok(bytes) => bytes,
        Err(err) => {
            debug!(url, error = %err, "failed to decompress request body, forwarding unchanged");
            return;
        }
    };

    match ctx.registry.match_url(url).await {
        Some(source) => {
            let events = loggy_extract::extract(&decompressed, &source, url);
            if events.is_empty() {
                return;
            }
            ctx.registry.record_capture(&source.id).await;
            let mut buffer = ctx.buffer.lock().await;
            for event in events {
                buffer.push(event);
            }
        }
        None => {
            let payload = serde_json::from_slice(&decompressed).unwrap_or(serde_json::Value::Null);
            ctx.registry.track_unmatched(url, payload).await;
        }
    }
}
