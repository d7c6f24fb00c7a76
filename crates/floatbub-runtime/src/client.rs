//! UDS JSON-RPC client for CLI subcommands.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use crate::server::BUBBLE_EVENT_METHOD;

async fn connect(socket_path: &str) -> anyhow::Result<UnixStream> {
    UnixStream::connect(socket_path)
        .await
        .map_err(|e| anyhow::anyhow!("cannot connect to daemon at {socket_path}: {e}"))
}

fn request_line(method: &str, params: serde_json::Value) -> anyhow::Result<String> {
    let request = serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": 1,
    });
    let mut req = serde_json::to_string(&request)?;
    req.push('\n');
    Ok(req)
}

/// Send one request and wait for its response. Deferred permission
/// requests block here until the OS callback arrives.
pub(crate) async fn rpc_call(
    socket_path: &str,
    method: &str,
    params: serde_json::Value,
) -> anyhow::Result<serde_json::Value> {
    let stream = connect(socket_path).await?;
    let (reader, mut writer) = stream.into_split();

    // Write half stays open until the reply arrives; the daemon treats
    // EOF as the caller going away.
    writer
        .write_all(request_line(method, params)?.as_bytes())
        .await?;

    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    let response: serde_json::Value = serde_json::from_str(line.trim())?;

    if let Some(error) = response.get("error") {
        anyhow::bail!("RPC error: {error}");
    }

    Ok(response["result"].clone())
}

/// `floatbub call <method>`: print the result as pretty JSON.
pub async fn cmd_call(socket_path: &str, method: &str, params: &str) -> anyhow::Result<()> {
    let params: serde_json::Value =
        serde_json::from_str(params).map_err(|e| anyhow::anyhow!("--params is not JSON: {e}"))?;
    let result = rpc_call(socket_path, method, params).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// `floatbub listen`: bind as the requester context and print one line per
/// interaction event until the daemon goes away.
pub async fn cmd_listen(socket_path: &str) -> anyhow::Result<()> {
    let stream = connect(socket_path).await?;
    let (reader, mut writer) = stream.into_split();
    writer
        .write_all(request_line("attach", serde_json::Value::Null)?.as_bytes())
        .await?;

    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        let msg: serde_json::Value = serde_json::from_str(line.trim())?;
        if let Some(error) = msg.get("error") {
            anyhow::bail!("attach failed: {error}");
        }
        if msg["method"] == BUBBLE_EVENT_METHOD {
            println!("{}", format_event(&msg["params"]));
        } else if let Some(ctx) = msg["result"]["context"].as_u64() {
            println!("attached as requester context {ctx}");
        }
    }
    Ok(())
}

/// Pure formatting logic for listen output, separated for testability.
pub(crate) fn format_event(params: &serde_json::Value) -> String {
    let kind = params["type"].as_str().unwrap_or("?");
    match (params["x"].as_f64(), params["y"].as_f64()) {
        (Some(x), Some(y)) => format!("{kind:<8} x={x:.1} y={y:.1}"),
        _ => kind.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_event_pads_kind_and_rounds() {
        let line = format_event(&serde_json::json!({"type": "move", "x": 10.26, "y": 3.0}));
        assert_eq!(line, "move     x=10.3 y=3.0");
    }

    #[test]
    fn format_event_without_coordinates() {
        assert_eq!(format_event(&serde_json::json!({"type": "tap"})), "tap");
        assert_eq!(format_event(&serde_json::json!({})), "?");
    }

    #[test]
    fn request_line_is_newline_terminated_json() {
        let line = request_line("isRunning", serde_json::Value::Null).unwrap();
        assert!(line.ends_with('\n'));
        let parsed: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(parsed["method"], "isRunning");
        assert_eq!(parsed["id"], 1);
    }

    #[tokio::test]
    async fn rpc_call_reports_unreachable_daemon() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.sock");
        let err = rpc_call(path.to_str().unwrap(), "isRunning", serde_json::Value::Null)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cannot connect to daemon"));
    }
}
