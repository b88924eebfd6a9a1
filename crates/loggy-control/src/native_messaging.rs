//! Native-messaging stdio protocol: each message is a
//! 4-byte little-endian length prefix followed by that many bytes of
//! UTF-8 JSON, in both directions. One process services messages
//! sequentially on stdin/stdout until stdin hits EOF.

use crate::supervisor::Supervisor;
use serde_json::{json, Value};
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Read one framed message, or `None` on a clean EOF before any bytes
/// of the next frame arrive.
pub async fn read_message<R: AsyncReadExt + Unpin>(reader: &mut R) -> io::Result<Option<Value>> {
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = u32::from_le_bytes(len_bytes) as usize;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    let value = serde_json::from_slice(&payload).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(Some(value))
}

/// Write one framed message.
pub async fn write_message<W: AsyncWriteExt + Unpin>(writer: &mut W, message: &Value) -> io::Result<()> {
    let payload = serde_json::to_vec(message).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writer.write_all(&(payload.len() as u32).to_le_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await
}

/// Service stdin/stdout until EOF, dispatching each request to the
/// supervisor. Never returns an `Err` for a malformed or unknown
/// request - those become `{success: false, error}` responses. The
/// supervisor must never crash on a malformed request.
pub async fn run(supervisor: &Supervisor) -> io::Result<()> {
    let mut stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();

    loop {
        let request = match read_message(&mut stdin).await {
            Ok(Some(request)) => request,
            Ok(None) => return Ok(()),
            Err(e) => return Err(e),
        };

        let response = dispatch(supervisor, &request).await;
        write_message(&mut stdout, &response).await?;
    }
}

async fn dispatch(supervisor: &Supervisor, request: &Value) -> Value {
    let action = request.get("action").and_then(Value::as_str).unwrap_or("");
    match action {
        "ping" => supervisor.ping(),
        "startProxy" => supervisor.start_proxy().await,
        "stopProxy" => supervisor.stop_proxy().await,
        "getStatus" => supervisor.get_status().await,
        other => json!({"success": false, "error": format!("unknown action: {other}")}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn reads_back_a_written_frame() {
        let mut buf = Vec::new();
        write_message(&mut buf, &json!({"action": "ping"})).await.unwrap();

        let mut cursor = Cursor::new(buf);
        let message = read_message(&mut cursor).await.unwrap().unwrap();
        assert_eq!(message["action"], "ping");
    }

    #[tokio::test]
    async fn clean_eof_before_a_frame_is_none() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        assert!(read_message(&mut cursor).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn dispatch_ping_succeeds() {
        let supervisor = Supervisor::new(loggy_core::config::LoggyConfig::default());
        let response = dispatch(&supervisor, &json!({"action": "ping"})).await;
        assert_eq!(response["success"], true);
    }

    #[tokio::test]
    async fn dispatch_unknown_action_reports_an_error() {
        let supervisor = Supervisor::new(loggy_core::config::LoggyConfig::default());
        let response = dispatch(&supervisor, &json!({"action": "doSomethingElse"})).await;
        assert_eq!(response["success"], false);
        assert!(response["error"].as_str().unwrap().contains("doSomethingElse"));
    }
}
