//! UDS JSON-RPC server: newline-delimited JSON over long-lived connections.
//!
//! Any connection may issue commands. A connection that calls `attach`
//! becomes the requester context: it receives `bubble_event` pushes until
//! it closes, and closing it tears the bubble session down.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use floatbub_core::{
    BubbleHost, ContextId, DispatchOutcome, InteractionEvent, PermissionReply, RawBroadcast,
    RequestCode, Resolution, SimulatedPlatform, TaggedError,
};

/// Push method carrying interaction events.
pub const BUBBLE_EVENT_METHOD: &str = "bubble_event";

const PARSE_ERROR: i32 = -32700;
const INVALID_PARAMS: i32 = -32602;
const METHOD_NOT_FOUND: i32 = -32601;
const HANDLER_FAILURE: i32 = -32000;
const REQUEST_ABANDONED: i32 = -32001;
const SPURIOUS_RESULT: i32 = -32002;
const CONTEXT_UNAVAILABLE: i32 = -32003;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Everything a connection handler needs: the host, plus the simulated
/// device so `platform/*` methods can play the OS role.
pub struct ServerState {
    pub host: BubbleHost,
    pub platform: Arc<SimulatedPlatform>,
}

impl ServerState {
    pub fn new(platform: Arc<SimulatedPlatform>) -> Self {
        Self {
            host: BubbleHost::new(Arc::clone(&platform)),
            platform,
        }
    }
}

// ---------------------------------------------------------------------------
// JSON-RPC types
// ---------------------------------------------------------------------------

fn default_jsonrpc() -> String {
    "2.0".into()
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,
    pub id: Option<u64>,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    fn ok(id: Option<u64>, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: default_jsonrpc(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn err(id: Option<u64>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: default_jsonrpc(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// Handler failure: tag travels in `error.data`.
    fn tagged(id: Option<u64>, tagged: TaggedError) -> Self {
        Self {
            jsonrpc: default_jsonrpc(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code: HANDLER_FAILURE,
                message: tagged.message,
                data: Some(serde_json::json!({ "tag": tagged.tag })),
            }),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Server-initiated push (no `id`).
#[derive(Debug, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    pub params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct PermissionResultParams {
    request_code: i32,
    /// Dialog answer to apply to the simulated device before the callback.
    #[serde(default)]
    granted: Option<bool>,
    #[serde(default)]
    result_code: i32,
}

// ---------------------------------------------------------------------------
// Server loop
// ---------------------------------------------------------------------------

type Outbox = mpsc::UnboundedSender<String>;

/// Run the UDS JSON-RPC server.
pub async fn run_server(socket_path: &str, state: Arc<ServerState>) -> anyhow::Result<()> {
    let socket_dir = std::path::Path::new(socket_path)
        .parent()
        .ok_or_else(|| anyhow::anyhow!("invalid socket path"))?;

    std::fs::create_dir_all(socket_dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_dir, std::fs::Permissions::from_mode(0o700))?;
    }

    // Check for stale socket
    if std::path::Path::new(socket_path).exists() {
        if UnixStream::connect(socket_path).await.is_err() {
            std::fs::remove_file(socket_path)?;
            tracing::info!("removed stale socket at {socket_path}");
        } else {
            anyhow::bail!("another daemon is already running at {socket_path}");
        }
    }

    let listener = UnixListener::bind(socket_path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
    }

    tracing::info!("UDS server listening on {socket_path}");
    serve(listener, state).await
}

/// Accept connections on an already-bound listener.
pub async fn serve(listener: UnixListener, state: Arc<ServerState>) -> anyhow::Result<()> {
    loop {
        let (stream, _) = listener.accept().await?;
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, state).await {
                tracing::debug!("connection error: {e}");
            }
        });
    }
}

async fn handle_connection(stream: UnixStream, state: Arc<ServerState>) -> anyhow::Result<()> {
    let (reader, writer) = stream.into_split();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let writer_task = tokio::spawn(write_lines(writer, out_rx));

    let mut context: Option<ContextId> = None;
    let mut deferred = JoinSet::new();
    let mut lines = BufReader::new(reader).lines();
    let read_result = async {
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            while deferred.try_join_next().is_some() {}
            match serde_json::from_str::<JsonRpcRequest>(line) {
                Ok(request) => handle_request(request, &state, &out_tx, &mut context, &mut deferred),
                Err(e) => send(&out_tx, &JsonRpcResponse::err(None, PARSE_ERROR, format!("parse error: {e}"))),
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    if let Some(id) = context {
        state.host.context_destroyed(id);
    }
    // Peer is gone: nobody is left to read outstanding deferred replies.
    if !deferred.is_empty() {
        tracing::debug!(outstanding = deferred.len(), "dropping deferred replies of closed connection");
    }
    deferred.shutdown().await;
    drop(out_tx);
    writer_task.await??;
    read_result
}

async fn write_lines(mut writer: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<String>) -> std::io::Result<()> {
    while let Some(mut line) = rx.recv().await {
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
    }
    writer.shutdown().await
}

fn send<T: Serialize>(out: &Outbox, message: &T) {
    match serde_json::to_string(message) {
        Ok(line) => {
            if out.send(line).is_err() {
                tracing::debug!("connection writer closed, dropping message");
            }
        }
        Err(e) => tracing::warn!("failed to serialize message: {e}"),
    }
}

// ---------------------------------------------------------------------------
// Request handling
// ---------------------------------------------------------------------------

fn handle_request(
    request: JsonRpcRequest,
    state: &Arc<ServerState>,
    out: &Outbox,
    context: &mut Option<ContextId>,
    deferred: &mut JoinSet<()>,
) {
    let id = request.id;
    let response = match request.method.as_str() {
        "attach" => attach(state, out, context, id),
        "platform/permission_result" => permission_result(state, request.params, id),
        "platform/emit" => match serde_json::from_value::<RawBroadcast>(request.params) {
            Ok(raw) => {
                let delivered = state.platform.emit(&raw);
                JsonRpcResponse::ok(id, serde_json::json!({ "delivered": delivered }))
            }
            Err(e) => JsonRpcResponse::err(id, INVALID_PARAMS, format!("invalid broadcast: {e}")),
        },
        method => match state.host.dispatch(method, &request.params) {
            DispatchOutcome::Success(value) => JsonRpcResponse::ok(id, value),
            DispatchOutcome::Error(tagged) => JsonRpcResponse::tagged(id, tagged),
            DispatchOutcome::NotImplemented => {
                JsonRpcResponse::err(id, METHOD_NOT_FOUND, format!("method not found: {method}"))
            }
            DispatchOutcome::Deferred(mut reply) => match reply.try_outcome() {
                Some(granted) => JsonRpcResponse::ok(id, serde_json::Value::Bool(granted)),
                None => {
                    deferred.spawn(deliver_deferred(reply, id, out.clone()));
                    return;
                }
            },
        },
    };
    send(out, &response);
}

fn attach(
    state: &Arc<ServerState>,
    out: &Outbox,
    context: &mut Option<ContextId>,
    id: Option<u64>,
) -> JsonRpcResponse {
    let (push_tx, push_rx) = mpsc::unbounded_channel();
    match state.host.context_available(push_tx) {
        Ok(ctx) => {
            *context = Some(ctx);
            tokio::spawn(forward_pushes(push_rx, out.clone()));
            JsonRpcResponse::ok(id, serde_json::json!({ "context": ctx.0 }))
        }
        Err(e) => JsonRpcResponse::err(id, CONTEXT_UNAVAILABLE, e.to_string()),
    }
}

fn permission_result(state: &Arc<ServerState>, params: serde_json::Value, id: Option<u64>) -> JsonRpcResponse {
    let params: PermissionResultParams = match serde_json::from_value(params) {
        Ok(p) => p,
        Err(e) => return JsonRpcResponse::err(id, INVALID_PARAMS, format!("invalid params: {e}")),
    };
    let code = RequestCode(params.request_code);
    if let Some(granted) = params.granted {
        state.platform.apply_grant(code, granted);
    }
    match state.host.on_permission_result(code, params.result_code) {
        Ok(resolution) => JsonRpcResponse::ok(id, resolution_json(resolution)),
        Err(e) => JsonRpcResponse::err(id, SPURIOUS_RESULT, e.to_string()),
    }
}

pub(crate) fn resolution_json(resolution: Resolution) -> serde_json::Value {
    match resolution {
        Resolution::Delivered { kind, granted } => serde_json::json!({
            "resolution": "delivered", "kind": kind, "granted": granted,
        }),
        Resolution::Abandoned { kind } => serde_json::json!({
            "resolution": "abandoned", "kind": kind,
        }),
        Resolution::StatusUpdated { granted } => serde_json::json!({
            "resolution": "status_updated", "granted": granted,
        }),
        Resolution::Ignored => serde_json::json!({ "resolution": "ignored" }),
    }
}

async fn deliver_deferred(reply: PermissionReply, id: Option<u64>, out: Outbox) {
    let response = match reply.outcome().await {
        Some(granted) => JsonRpcResponse::ok(id, serde_json::Value::Bool(granted)),
        None => JsonRpcResponse::err(id, REQUEST_ABANDONED, "permission request abandoned"),
    };
    send(&out, &response);
}

async fn forward_pushes(mut rx: mpsc::UnboundedReceiver<InteractionEvent>, out: Outbox) {
    while let Some(event) = rx.recv().await {
        let params = match serde_json::to_value(event) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("failed to encode interaction event: {e}");
                continue;
            }
        };
        send(
            &out,
            &JsonRpcNotification {
                jsonrpc: default_jsonrpc(),
                method: BUBBLE_EVENT_METHOD.to_string(),
                params,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use floatbub_core::{InteractionKind, OVERLAY_PERMISSION_REQUEST_CODE, PermissionKind};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
    use tokio::net::unix::OwnedReadHalf;

    fn spawn_server(platform: SimulatedPlatform) -> (tempfile::TempDir, std::path::PathBuf, Arc<ServerState>) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("floatbub.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let state = Arc::new(ServerState::new(Arc::new(platform)));
        tokio::spawn(serve(listener, Arc::clone(&state)));
        (dir, path, state)
    }

    struct Client {
        lines: Lines<BufReader<OwnedReadHalf>>,
        writer: OwnedWriteHalf,
    }

    impl Client {
        async fn connect(path: &std::path::Path) -> Self {
            let stream = UnixStream::connect(path).await.unwrap();
            let (reader, writer) = stream.into_split();
            Self {
                lines: BufReader::new(reader).lines(),
                writer,
            }
        }

        async fn send(&mut self, id: u64, method: &str, params: serde_json::Value) {
            let req = serde_json::json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
            let mut line = serde_json::to_string(&req).unwrap();
            line.push('\n');
            self.writer.write_all(line.as_bytes()).await.unwrap();
        }

        async fn recv(&mut self) -> serde_json::Value {
            let line = self.lines.next_line().await.unwrap().expect("line");
            serde_json::from_str(&line).unwrap()
        }

        async fn call(&mut self, id: u64, method: &str, params: serde_json::Value) -> serde_json::Value {
            self.send(id, method, params).await;
            self.recv().await
        }
    }

    #[tokio::test]
    async fn start_and_query_over_socket() {
        let (_dir, path, _state) = spawn_server(SimulatedPlatform::new().with_overlay_granted(true));
        let mut client = Client::connect(&path).await;

        let resp = client.call(1, "startBubble", serde_json::json!({"bubbleOptions": {"bubbleSize": 50.0}})).await;
        assert_eq!(resp["id"], 1);
        assert_eq!(resp["result"], true);

        let resp = client.call(2, "isRunning", serde_json::Value::Null).await;
        assert_eq!(resp["result"], true);
    }

    #[tokio::test]
    async fn unknown_method_and_tagged_error_are_distinct() {
        let (_dir, path, _state) = spawn_server(SimulatedPlatform::new());
        let mut client = Client::connect(&path).await;

        let resp = client.call(1, "openSettings", serde_json::Value::Null).await;
        assert_eq!(resp["error"]["code"], -32601);
        assert!(resp["error"].get("data").is_none());

        let resp = client
            .call(2, "startBubble", serde_json::json!({"bubbleOptions": {"opacity": -1.0}}))
            .await;
        assert_eq!(resp["error"]["code"], -32000);
        assert_eq!(resp["error"]["data"]["tag"], "BUBBLE_ERROR");

        let resp = client.call(3, "hasOverlayPermission", serde_json::Value::Null).await;
        assert_eq!(resp["result"], false);
    }

    #[tokio::test]
    async fn deferred_request_answered_after_simulated_callback() {
        let (_dir, path, state) = spawn_server(SimulatedPlatform::new());
        let mut requester = Client::connect(&path).await;
        let mut os = Client::connect(&path).await;

        requester
            .send(7, "requestOverlayPermission", serde_json::Value::Null)
            .await;
        // Wait until the registration is visible before playing the OS.
        let mut registered = false;
        for i in 0..100 {
            let status = os.call(100 + i, "bubbleStatus", serde_json::Value::Null).await;
            if status["result"]["pendingRequests"][0]["kind"] == "overlay" {
                registered = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(registered);

        let resp = os
            .call(
                2,
                "platform/permission_result",
                serde_json::json!({"request_code": OVERLAY_PERMISSION_REQUEST_CODE.0, "granted": true}),
            )
            .await;
        assert_eq!(resp["result"]["resolution"], "delivered");

        let answer = requester.recv().await;
        assert_eq!(answer["id"], 7);
        assert_eq!(answer["result"], true);
        assert!(state.host.arbiter().is_granted(PermissionKind::Overlay));
    }

    #[tokio::test]
    async fn deferred_reply_is_dropped_when_requester_disconnects() {
        let (_dir, path, _state) = spawn_server(SimulatedPlatform::new());
        let mut first = Client::connect(&path).await;
        first
            .send(1, "requestOverlayPermission", serde_json::Value::Null)
            .await;
        drop(first);

        // Retry until the first registration is released; a deferred call
        // gets no immediate answer, an occupied slot gets an error.
        let mut second = Client::connect(&path).await;
        let mut deferred_id = None;
        for id in 10..110 {
            second
                .send(id, "requestOverlayPermission", serde_json::Value::Null)
                .await;
            match tokio::time::timeout(std::time::Duration::from_millis(100), second.recv()).await {
                Ok(resp) => {
                    assert_eq!(resp["id"], id);
                    assert_eq!(resp["error"]["code"], -32000);
                    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                }
                Err(_) => {
                    deferred_id = Some(id);
                    break;
                }
            }
        }
        let deferred_id = deferred_id.expect("slot released after disconnect");

        let mut os = Client::connect(&path).await;
        let resp = os
            .call(
                1,
                "platform/permission_result",
                serde_json::json!({"request_code": OVERLAY_PERMISSION_REQUEST_CODE.0, "granted": true}),
            )
            .await;
        assert_eq!(resp["result"]["resolution"], "delivered");

        let answer = second.recv().await;
        assert_eq!(answer["id"], deferred_id);
        assert_eq!(answer["result"], true);
    }

    #[tokio::test]
    async fn attached_connection_receives_pushes() {
        let (_dir, path, _state) = spawn_server(SimulatedPlatform::new());
        let mut listener = Client::connect(&path).await;
        let mut surface = Client::connect(&path).await;

        let resp = listener.call(1, "attach", serde_json::Value::Null).await;
        assert!(resp["result"]["context"].as_u64().is_some());

        for (i, kind) in [InteractionKind::Move, InteractionKind::Tap].into_iter().enumerate() {
            let resp = surface
                .call(
                    i as u64 + 1,
                    "platform/emit",
                    serde_json::json!({"action": kind.action(), "extras": {"x": 5.0, "y": 6.0}}),
                )
                .await;
            assert_eq!(resp["result"]["delivered"], 1);
        }

        let first = listener.recv().await;
        let second = listener.recv().await;
        assert_eq!(first["method"], BUBBLE_EVENT_METHOD);
        assert_eq!(first["params"]["type"], "move");
        assert_eq!(second["params"]["type"], "tap");
        assert_eq!(second["params"]["x"], 5.0);
    }

    #[tokio::test]
    async fn closing_attached_connection_stops_bubble() {
        let (_dir, path, state) = spawn_server(SimulatedPlatform::new().with_overlay_granted(true));
        let mut requester = Client::connect(&path).await;
        requester.call(1, "attach", serde_json::Value::Null).await;
        let resp = requester.call(2, "startBubble", serde_json::Value::Null).await;
        assert_eq!(resp["result"], true);

        drop(requester);
        for _ in 0..100 {
            if !state.host.controller().is_running() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(!state.host.controller().is_running());
        assert_eq!(state.platform.live_overlay_count(), 0);
    }

    #[test]
    fn resolution_json_shapes() {
        let v = resolution_json(Resolution::Delivered {
            kind: PermissionKind::PostNotifications,
            granted: false,
        });
        assert_eq!(v["kind"], "post_notifications");
        assert_eq!(v["granted"], false);
        assert_eq!(resolution_json(Resolution::Ignored)["resolution"], "ignored");
    }

    #[test]
    fn parse_error_response_has_no_id() {
        let resp = JsonRpcResponse::err(None, PARSE_ERROR, "parse error");
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("id").is_none());
        assert_eq!(json["error"]["code"], PARSE_ERROR);
    }
}
