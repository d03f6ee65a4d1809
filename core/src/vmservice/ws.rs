//! A [`VmService`] implementation over a plain JSON-RPC 2.0 connection
//! carried on a `tokio-tungstenite` WebSocket, feature-gated behind
//! `ws-transport` since the collector itself (spec.md §6, "Injected
//! capabilities") has no opinion on the transport.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::{CollectError, Result};
use crate::vmservice::connect::connect_with_retry;
use crate::vmservice::types::{
    Class, Func, Isolate, IsolateGroup, Library, Script, ScriptRef, SourceReport, SourceReportKind,
    SourceReportParams, VmInfo, VmVersion,
};
use crate::vmservice::VmService;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingMap = Mutex<HashMap<u64, oneshot::Sender<Result<Value>>>>;

/// A live VM Service connection. A background task owns the read half of
/// the socket and dispatches each decoded response to the caller awaiting
/// it by request id; `call` owns the write half directly.
pub struct WsVmService {
    sink: AsyncMutex<SplitSink<WsStream, Message>>,
    pending: Arc<PendingMap>,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
}

#[derive(Deserialize)]
struct RpcEnvelope {
    id: Option<u64>,
    result: Option<Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

impl WsVmService {
    /// Connects to `uri` (an `http(s)`/`ws(s)` VM Service URI), retrying
    /// every 200ms until the socket handshake succeeds or `timeout` elapses
    /// (spec.md §4.3's connection lifecycle). Liveness beyond the handshake
    /// is confirmed by the caller's first `getVersion` call.
    pub async fn connect(uri: &str, timeout: Duration) -> Result<Self> {
        connect_with_retry(uri, timeout, |url| async move {
            let (stream, _) = tokio_tungstenite::connect_async(url.as_str())
                .await
                .map_err(|err| CollectError::Rpc(format!("websocket connect failed: {err}")))?;
            let (sink, read) = stream.split();
            let pending: Arc<PendingMap> = Arc::new(Mutex::new(HashMap::new()));
            let reader = tokio::spawn(read_loop(read, Arc::clone(&pending)));
            Ok(Self {
                sink: AsyncMutex::new(sink),
                pending,
                next_id: AtomicU64::new(1),
                reader,
            })
        })
        .await
    }

    async fn call(&self, method: &str, sentinel_isolate: Option<&str>, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id, tx);

        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        {
            let mut sink = self.sink.lock().await;
            sink.send(Message::Text(request.to_string()))
                .await
                .map_err(|err| CollectError::Rpc(format!("send failed: {err}")))?;
        }

        let value = rx
            .await
            .map_err(|_| CollectError::Rpc("connection closed before response arrived".into()))??;

        // A VM Service "Sentinel" is a *successful* RPC response whose
        // result carries `"type": "Sentinel"`, not a JSON-RPC error — the
        // object or isolate existed when referenced but has since gone away.
        if let Some(isolate_id) = sentinel_isolate {
            if value.get("type").and_then(Value::as_str) == Some("Sentinel") {
                return Err(CollectError::StaleIsolate(isolate_id.to_string()));
            }
        }
        Ok(value)
    }

    fn deserialize<T: for<'de> Deserialize<'de>>(value: Value) -> Result<T> {
        serde_json::from_value(value).map_err(CollectError::Json)
    }
}

impl Drop for WsVmService {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Reads frames off `read` until the socket closes, decoding each as an
/// [`RpcEnvelope`] and handing it to [`dispatch_envelope`]. Frames that
/// aren't valid JSON-RPC (stray text, binary pings) are ignored rather than
/// tearing down the connection.
async fn read_loop(mut read: SplitStream<WsStream>, pending: Arc<PendingMap>) {
    while let Some(message) = read.next().await {
        let Ok(Message::Text(text)) = message else {
            continue;
        };
        let Ok(envelope) = serde_json::from_str::<RpcEnvelope>(&text) else {
            continue;
        };
        dispatch_envelope(&pending, envelope);
    }
    // Socket closed: wake any still-pending caller with a clear error
    // rather than leaving it to hang forever.
    let mut pending = pending.lock().unwrap();
    for (_, tx) in pending.drain() {
        let _ = tx.send(Err(CollectError::Rpc("vm service connection closed".into())));
    }
}

fn dispatch_envelope(pending: &PendingMap, envelope: RpcEnvelope) {
    let Some(id) = envelope.id else { return };
    let Some(tx) = pending.lock().unwrap().remove(&id) else {
        return;
    };
    let outcome = match (envelope.result, envelope.error) {
        (Some(result), _) => Ok(result),
        (None, Some(error)) => Err(CollectError::Rpc(format!("{} (code {})", error.message, error.code))),
        (None, None) => Err(CollectError::Rpc("malformed rpc response".into())),
    };
    let _ = tx.send(outcome);
}

#[async_trait]
impl VmService for WsVmService {
    async fn get_version(&self) -> Result<VmVersion> {
        let value = self.call("getVersion", None, json!({})).await?;
        Self::deserialize(value)
    }

    async fn get_vm(&self) -> Result<VmInfo> {
        let value = self.call("getVM", None, json!({})).await?;
        Self::deserialize(value)
    }

    async fn get_isolate(&self, isolate_id: &str) -> Result<Isolate> {
        let value = self
            .call("getIsolate", Some(isolate_id), json!({ "isolateId": isolate_id }))
            .await?;
        Self::deserialize(value)
    }

    async fn get_isolate_group(&self, group_id: &str) -> Result<IsolateGroup> {
        let value = self
            .call("getIsolateGroup", None, json!({ "isolateGroupId": group_id }))
            .await?;
        Self::deserialize(value)
    }

    async fn get_scripts(&self, isolate_id: &str) -> Result<Vec<ScriptRef>> {
        let value = self
            .call("getScripts", Some(isolate_id), json!({ "isolateId": isolate_id }))
            .await?;
        #[derive(Deserialize)]
        struct ScriptsResponse {
            #[serde(default)]
            scripts: Vec<ScriptRef>,
        }
        Ok(Self::deserialize::<ScriptsResponse>(value)?.scripts)
    }

    async fn get_script(&self, isolate_id: &str, script_id: &str) -> Result<Script> {
        let value = self
            .call(
                "getObject",
                Some(isolate_id),
                json!({ "isolateId": isolate_id, "objectId": script_id }),
            )
            .await?;
        Self::deserialize(value)
    }

    async fn get_library(&self, isolate_id: &str, library_id: &str) -> Result<Library> {
        let value = self
            .call(
                "getObject",
                Some(isolate_id),
                json!({ "isolateId": isolate_id, "objectId": library_id }),
            )
            .await?;
        Self::deserialize(value)
    }

    async fn get_class(&self, isolate_id: &str, class_id: &str) -> Result<Class> {
        let value = self
            .call(
                "getObject",
                Some(isolate_id),
                json!({ "isolateId": isolate_id, "objectId": class_id }),
            )
            .await?;
        Self::deserialize(value)
    }

    async fn get_function(&self, isolate_id: &str, function_id: &str) -> Result<Func> {
        let value = self
            .call(
                "getObject",
                Some(isolate_id),
                json!({ "isolateId": isolate_id, "objectId": function_id }),
            )
            .await?;
        Self::deserialize(value)
    }

    async fn get_source_report(
        &self,
        isolate_id: &str,
        kinds: &[SourceReportKind],
        params: SourceReportParams,
    ) -> Result<SourceReport> {
        let mut rpc_params = serde_json::Map::new();
        rpc_params.insert("isolateId".into(), json!(isolate_id));
        rpc_params.insert(
            "reports".into(),
            json!(kinds.iter().map(SourceReportKind::as_str).collect::<Vec<_>>()),
        );
        rpc_params.insert("forceCompile".into(), json!(params.force_compile));
        rpc_params.insert("reportLines".into(), json!(params.report_lines));
        if let Some(script_id) = &params.script_id {
            rpc_params.insert("scriptId".into(), json!(script_id));
        }
        if let Some(filters) = &params.library_filters {
            rpc_params.insert("libraryFilters".into(), json!(filters));
        }
        if let Some(compiled) = &params.libraries_already_compiled {
            rpc_params.insert("librariesAlreadyCompiled".into(), json!(compiled));
        }

        let value = self
            .call("getSourceReport", Some(isolate_id), Value::Object(rpc_params))
            .await?;
        Self::deserialize(value)
    }

    async fn resume(&self, isolate_id: &str) -> Result<()> {
        self.call("resume", None, json!({ "isolateId": isolate_id }))
            .await
            .map(|_| ())
            .map_err(|err| CollectError::ResumeFailed(isolate_id.to_string(), err.to_string()))
    }

    async fn dispose(&self) -> Result<()> {
        self.reader.abort();
        let mut sink = self.sink.lock().await;
        sink.close()
            .await
            .map_err(|err| CollectError::Rpc(format!("close failed: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_sends_result_to_waiting_caller() {
        let pending: PendingMap = Mutex::new(HashMap::new());
        let (tx, rx) = oneshot::channel();
        pending.lock().unwrap().insert(1, tx);

        dispatch_envelope(
            &pending,
            RpcEnvelope {
                id: Some(1),
                result: Some(json!({"type": "Version", "major": 3, "minor": 60})),
                error: None,
            },
        );

        let value = rx.try_recv().unwrap().unwrap();
        assert_eq!(value["major"], 3);
    }

    #[test]
    fn dispatch_surfaces_rpc_errors() {
        let pending: PendingMap = Mutex::new(HashMap::new());
        let (tx, rx) = oneshot::channel();
        pending.lock().unwrap().insert(7, tx);

        dispatch_envelope(
            &pending,
            RpcEnvelope {
                id: Some(7),
                result: None,
                error: Some(RpcErrorBody {
                    code: 106,
                    message: "Feature is disabled".to_string(),
                }),
            },
        );

        let err = rx.try_recv().unwrap().unwrap_err();
        assert!(matches!(err, CollectError::Rpc(_)));
    }
}
