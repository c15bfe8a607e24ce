//! JSON-RPC correlation over one WebSocket connection

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use idlewatch_api::{RpcRequest, RpcResponse};
use idlewatch_util::RequestId;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

use crate::{RpcError, RpcResult};

/// Default upper bound on waiting for a single response
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How long `close` waits for the close frame to be flushed
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

type Waiter = oneshot::Sender<RpcResult<Value>>;

/// State shared between callers and the reader/writer tasks
struct Shared {
    peer: String,
    alive: AtomicBool,
    /// Pending request table: one entry per in-flight request id
    pending: Mutex<HashMap<RequestId, Waiter>>,
    lost_reason: Mutex<Option<String>>,
}

impl Shared {
    fn lock_pending(&self) -> MutexGuard<'_, HashMap<RequestId, Waiter>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lost_error(&self) -> RpcError {
        let reason = self
            .lost_reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_else(|| "connection closed".into());
        RpcError::TransportLost(reason)
    }

    /// Mark the connection dead and fail every pending call
    fn mark_lost(&self, reason: String) {
        if self.alive.swap(false, Ordering::SeqCst) {
            warn!(peer = %self.peer, reason = %reason, "Connection lost");
            *self.lost_reason.lock().unwrap_or_else(PoisonError::into_inner) = Some(reason.clone());
        }

        let drained: Vec<Waiter> = self.lock_pending().drain().map(|(_, tx)| tx).collect();
        for waiter in drained {
            let _ = waiter.send(Err(RpcError::TransportLost(reason.clone())));
        }
    }

    /// Route one incoming text frame to its waiting caller
    fn dispatch(&self, text: &str) {
        let response: RpcResponse = match serde_json::from_str(text) {
            Ok(response) => response,
            Err(e) => {
                warn!(peer = %self.peer, error = %e, "Discarding malformed message");
                return;
            }
        };

        if response.is_notification() {
            debug!(method = ?response.method, "Ignoring server notification");
            return;
        }
        let Some(id) = response.id else {
            warn!(peer = %self.peer, "Discarding response without an id");
            return;
        };

        let waiter = self.lock_pending().remove(&id);
        match waiter {
            Some(waiter) => {
                let _ = waiter.send(response.into_result().map_err(RpcError::from));
            }
            None => {
                debug!(id = %id, "Discarding response for unknown request id");
            }
        }
    }
}

struct Inner {
    shared: Arc<Shared>,
    next_id: AtomicU64,
    request_timeout: Duration,
    outbound: mpsc::UnboundedSender<Message>,
    writer: Mutex<Option<JoinHandle<()>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        for slot in [&self.reader, &self.writer] {
            if let Some(handle) = slot.lock().unwrap_or_else(PoisonError::into_inner).take() {
                handle.abort();
            }
        }
    }
}

/// A live connection to the management server.
///
/// Cheap to clone; all clones share the same socket and request table.
/// Request ids start at 1 for every new connection.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.inner.shared.peer)
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl Connection {
    /// Wrap an established WebSocket stream and start its reader and writer tasks
    pub fn from_stream<S>(stream: S, peer: impl Into<String>, request_timeout: Duration) -> Self
    where
        S: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Send + Unpin + 'static,
    {
        let shared = Arc::new(Shared {
            peer: peer.into(),
            alive: AtomicBool::new(true),
            pending: Mutex::new(HashMap::new()),
            lost_reason: Mutex::new(None),
        });

        let (sink, source) = stream.split();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();

        let writer = tokio::spawn(write_loop(sink, outbound_rx, shared.clone()));
        let reader = tokio::spawn(read_loop(source, shared.clone()));

        Self {
            inner: Arc::new(Inner {
                shared,
                next_id: AtomicU64::new(1),
                request_timeout,
                outbound,
                writer: Mutex::new(Some(writer)),
                reader: Mutex::new(Some(reader)),
            }),
        }
    }

    pub fn peer(&self) -> &str {
        &self.inner.shared.peer
    }

    pub fn is_alive(&self) -> bool {
        self.inner.shared.alive.load(Ordering::SeqCst)
    }

    /// Send one request and wait for the response carrying the same id
    pub async fn call(&self, method: &str, params: Option<Value>) -> RpcResult<Value> {
        let shared = &self.inner.shared;
        let id = RequestId::new(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = oneshot::channel();

        {
            let mut pending = shared.lock_pending();
            if !self.is_alive() {
                return Err(shared.lost_error());
            }
            pending.insert(id, tx);
        }

        let text = match serde_json::to_string(&RpcRequest::new(id, method, params)) {
            Ok(text) => text,
            Err(e) => {
                shared.lock_pending().remove(&id);
                return Err(RpcError::Encode(e));
            }
        };

        debug!(id = %id, method, "Sending request");

        if self.inner.outbound.send(Message::Text(text)).is_err() {
            shared.lock_pending().remove(&id);
            shared.mark_lost("writer task stopped".into());
            return Err(shared.lost_error());
        }

        match tokio::time::timeout(self.inner.request_timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            // Waiter dropped without an answer: the table was drained
            Ok(Err(_)) => Err(shared.lost_error()),
            Err(_) => {
                shared.lock_pending().remove(&id);
                Err(RpcError::Timeout {
                    method: method.to_string(),
                    after: self.inner.request_timeout,
                })
            }
        }
    }

    /// Call and deserialize the result into `T`
    pub async fn call_typed<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> RpcResult<T> {
        let value = self.call(method, params).await?;
        serde_json::from_value(value).map_err(|source| RpcError::InvalidResult {
            method: method.to_string(),
            source,
        })
    }

    /// Number of calls currently awaiting a response
    pub fn pending_count(&self) -> usize {
        self.inner.shared.lock_pending().len()
    }

    /// Send a close frame and stop the background tasks.
    /// Pending calls fail with `TransportLost`.
    pub async fn close(&self) {
        let close_queued = self.is_alive()
            && self.inner.outbound.send(Message::Close(None)).is_ok();
        if close_queued {
            info!(peer = %self.peer(), "Closing connection to server");
        }
        self.inner.shared.mark_lost("connection closed locally".into());

        let writer = self
            .inner
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut writer) = writer {
            // Without a queued close frame the writer would wait on the
            // channel forever
            if !close_queued || writer.is_finished() {
                writer.abort();
            } else if tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, &mut writer).await.is_err() {
                writer.abort();
            }
        }

        let reader = self
            .inner
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(reader) = reader {
            reader.abort();
        }
    }
}

async fn write_loop<W>(mut sink: W, mut outbound: mpsc::UnboundedReceiver<Message>, shared: Arc<Shared>)
where
    W: Sink<Message, Error = WsError> + Unpin,
{
    while let Some(message) = outbound.recv().await {
        let closing = matches!(message, Message::Close(_));
        if let Err(e) = sink.send(message).await {
            shared.mark_lost(format!("write failed: {e}"));
            return;
        }
        if closing {
            break;
        }
    }
    let _ = sink.close().await;
}

async fn read_loop<R>(mut source: R, shared: Arc<Shared>)
where
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    loop {
        match source.next().await {
            Some(Ok(Message::Text(text))) => shared.dispatch(&text),
            Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                Ok(text) => shared.dispatch(text),
                Err(_) => warn!(len = bytes.len(), "Discarding non-UTF-8 binary frame"),
            },
            Some(Ok(Message::Close(frame))) => {
                let reason = match frame {
                    Some(frame) => format!("server closed connection ({}: {})", frame.code, frame.reason),
                    None => "server closed connection".to_string(),
                };
                shared.mark_lost(reason);
                return;
            }
            // Ping/pong are handled by the WebSocket layer
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                shared.mark_lost(format!("read failed: {e}"));
                return;
            }
            None => {
                shared.mark_lost("connection closed by peer".into());
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::DuplexStream;
    use tokio_tungstenite::WebSocketStream;
    use tokio_tungstenite::tungstenite::protocol::Role;

    /// A connection wired to an in-memory server socket the test drives by hand
    async fn pair() -> (Connection, WebSocketStream<DuplexStream>) {
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
        let server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
        (
            Connection::from_stream(client, "test", Duration::from_secs(5)),
            server,
        )
    }

    async fn next_request(server: &mut WebSocketStream<DuplexStream>) -> RpcRequest {
        loop {
            match server.next().await {
                Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
                Some(Ok(_)) => continue,
                other => panic!("server stream ended: {other:?}"),
            }
        }
    }

    async fn reply(server: &mut WebSocketStream<DuplexStream>, response: Value) {
        server.send(Message::Text(response.to_string())).await.unwrap();
    }

    #[tokio::test]
    async fn call_receives_matching_result() {
        let (conn, mut server) = pair().await;

        let call = tokio::spawn({
            let conn = conn.clone();
            async move { conn.call("minecraft:players", None).await }
        });

        let request = next_request(&mut server).await;
        assert_eq!(request.jsonrpc, "2.0");
        assert_eq!(request.method, "minecraft:players");
        assert_eq!(request.id, RequestId::new(1));
        assert!(request.params.is_none());

        reply(&mut server, json!({"jsonrpc": "2.0", "id": 1, "result": [{"id": "a", "name": "Alex"}]})).await;

        let result = call.await.unwrap().unwrap();
        assert_eq!(result, json!([{"id": "a", "name": "Alex"}]));
        assert_eq!(conn.pending_count(), 0);
    }

    #[tokio::test]
    async fn ids_are_monotonic_per_connection() {
        let (conn, mut server) = pair().await;

        for expected in 1..=3u64 {
            let call = tokio::spawn({
                let conn = conn.clone();
                async move { conn.call("ping", None).await }
            });
            let request = next_request(&mut server).await;
            assert_eq!(request.id.get(), expected);
            reply(&mut server, json!({"jsonrpc": "2.0", "id": expected, "result": true})).await;
            call.await.unwrap().unwrap();
        }
    }

    #[tokio::test]
    async fn unknown_ids_and_notifications_do_not_disturb_pending_call() {
        let (conn, mut server) = pair().await;

        let call = tokio::spawn({
            let conn = conn.clone();
            async move { conn.call("minecraft:players", None).await }
        });
        let request = next_request(&mut server).await;
        let id = request.id.get();

        reply(&mut server, json!({"jsonrpc": "2.0", "id": id + 100, "result": "stray"})).await;
        reply(&mut server, json!({"jsonrpc": "2.0", "method": "minecraft:notification/server/saving"})).await;
        server.send(Message::Text("not json".into())).await.unwrap();
        reply(&mut server, json!({"jsonrpc": "2.0", "id": id, "result": []})).await;

        assert_eq!(call.await.unwrap().unwrap(), json!([]));
        assert!(conn.is_alive());
    }

    #[tokio::test]
    async fn concurrent_calls_matched_out_of_order() {
        let (conn, mut server) = pair().await;

        let first = tokio::spawn({
            let conn = conn.clone();
            async move { conn.call("first", None).await }
        });
        let r1 = next_request(&mut server).await;
        let second = tokio::spawn({
            let conn = conn.clone();
            async move { conn.call("second", None).await }
        });
        let r2 = next_request(&mut server).await;
        assert_eq!(conn.pending_count(), 2);

        reply(&mut server, json!({"jsonrpc": "2.0", "id": r2.id, "result": "two"})).await;
        reply(&mut server, json!({"jsonrpc": "2.0", "id": r1.id, "result": "one"})).await;

        assert_eq!(first.await.unwrap().unwrap(), json!("one"));
        assert_eq!(second.await.unwrap().unwrap(), json!("two"));
    }

    #[tokio::test]
    async fn error_object_becomes_protocol_fault() {
        let (conn, mut server) = pair().await;

        let call = tokio::spawn({
            let conn = conn.clone();
            async move { conn.call("minecraft:nope", None).await }
        });
        let request = next_request(&mut server).await;
        reply(
            &mut server,
            json!({"jsonrpc": "2.0", "id": request.id, "error": {"code": -32601, "message": "Method not found", "data": "minecraft:nope"}}),
        )
        .await;

        match call.await.unwrap() {
            Err(RpcError::Protocol { code, message, data }) => {
                assert_eq!(code, -32601);
                assert_eq!(message, "Method not found");
                assert_eq!(data.as_deref(), Some("minecraft:nope"));
            }
            other => panic!("expected protocol fault, got {other:?}"),
        }
        assert!(conn.is_alive());
    }

    #[tokio::test]
    async fn server_disconnect_fails_pending_call_as_transport_lost() {
        let (conn, mut server) = pair().await;

        let call = tokio::spawn({
            let conn = conn.clone();
            async move { conn.call("minecraft:players", None).await }
        });
        let _ = next_request(&mut server).await;
        drop(server);

        let error = call.await.unwrap().unwrap_err();
        assert!(error.is_transport_lost(), "got {error:?}");
        assert!(!conn.is_alive());
        assert_eq!(conn.pending_count(), 0);

        let again = conn.call("minecraft:players", None).await.unwrap_err();
        assert!(again.is_transport_lost());
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_call_times_out_and_is_removed() {
        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
        let mut server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
        let conn = Connection::from_stream(client, "test", Duration::from_secs(3));

        let call = tokio::spawn({
            let conn = conn.clone();
            async move { conn.call("slow", None).await }
        });
        let _ = next_request(&mut server).await;

        let error = call.await.unwrap().unwrap_err();
        assert!(matches!(error, RpcError::Timeout { after, .. } if after == Duration::from_secs(3)));
        assert_eq!(conn.pending_count(), 0);
    }

    #[tokio::test]
    async fn call_typed_reports_shape_mismatch() {
        let (conn, mut server) = pair().await;

        let call = tokio::spawn({
            let conn = conn.clone();
            async move { conn.call_typed::<Vec<String>>("list", None).await }
        });
        let request = next_request(&mut server).await;
        reply(&mut server, json!({"jsonrpc": "2.0", "id": request.id, "result": {"not": "a list"}})).await;

        assert!(matches!(call.await.unwrap(), Err(RpcError::InvalidResult { .. })));
    }

    #[tokio::test]
    async fn close_after_peer_hang_up_returns_promptly() {
        let (conn, server) = pair().await;
        drop(server);

        while conn.is_alive() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let started = std::time::Instant::now();
        conn.close().await;
        assert!(
            started.elapsed() < CLOSE_FLUSH_TIMEOUT / 4,
            "close took {:?}",
            started.elapsed()
        );
    }

    #[tokio::test]
    async fn close_sends_close_frame() {
        let (conn, mut server) = pair().await;

        conn.close().await;
        assert!(!conn.is_alive());

        let mut saw_close = false;
        while let Some(Ok(message)) = server.next().await {
            if matches!(message, Message::Close(_)) {
                saw_close = true;
                break;
            }
        }
        assert!(saw_close);
    }
}
