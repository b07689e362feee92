//! Tool-call correlation: pairing outbound callback dispatches with the
//! inbound results that may arrive in any order.
//!
//! Each broker is owned by exactly one session and torn down with it, so the
//! pending map never outlives the connection and no caller is left suspended
//! past session teardown.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::debug;
use uuid::Uuid;

use crate::error::RelayError;
use crate::relay::frames::OutboundFrame;

/// Frames queued for the session's socket writer task.
#[derive(Debug)]
pub enum WsOutbound {
    Frame(OutboundFrame),
    /// Plain text frame (error reporting).
    Text(String),
    /// Close the socket with the given code and stop the writer.
    Close(u16),
}

/// Per-session tool-call correlator.
///
/// `dispatch` issues a fresh correlation id, records the suspended caller and
/// sends the callback frame; `resolve` completes the matching caller. Ids are
/// never reused within a session, and resolving an unknown or already-resolved
/// id is deliberately a no-op (duplicate and late frames are expected).
pub struct CallBroker {
    pending: Mutex<HashMap<String, oneshot::Sender<Value>>>,
    outbound: mpsc::Sender<WsOutbound>,
    dispatch_timeout: Duration,
}

impl CallBroker {
    pub fn new(outbound: mpsc::Sender<WsOutbound>, dispatch_timeout: Duration) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            outbound,
            dispatch_timeout,
        }
    }

    /// Send a callback frame to the client and suspend until the matching
    /// result arrives, the session closes, or the bounded wait expires.
    ///
    /// Safe to call concurrently: every dispatch gets its own id and entry.
    pub async fn dispatch(
        &self,
        function_name: &str,
        function_args: Value,
    ) -> Result<Value, RelayError> {
        let request_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();

        self.pending.lock().await.insert(request_id.clone(), tx);

        debug!(request_id, function = function_name, "Dispatching tool call");

        let frame = OutboundFrame::Callback {
            function_name: function_name.to_string(),
            function_args,
            request_id: request_id.clone(),
        };
        if self.outbound.send(WsOutbound::Frame(frame)).await.is_err() {
            // Writer gone: the connection is already down.
            self.pending.lock().await.remove(&request_id);
            return Err(RelayError::Disconnected);
        }

        match tokio::time::timeout(self.dispatch_timeout, rx).await {
            Ok(Ok(result)) => Ok(result),
            // Sender dropped without a value: the session failed all pending
            // calls during teardown.
            Ok(Err(_)) => Err(RelayError::SessionClosed),
            Err(_) => {
                self.pending.lock().await.remove(&request_id);
                Err(RelayError::ToolCallTimeout(request_id))
            }
        }
    }

    /// Complete the pending call for `request_id`, if any.
    ///
    /// Unknown ids and second resolutions are silently discarded; that is not
    /// an error condition for the sender.
    pub async fn resolve(&self, request_id: &str, result: Value) {
        match self.pending.lock().await.remove(request_id) {
            Some(tx) => {
                // The caller may have timed out in the meantime; a failed send
                // is the same late-frame case and is ignored.
                let _ = tx.send(result);
            }
            None => {
                debug!(request_id, "Discarding result for unknown or resolved call");
            }
        }
    }

    /// Unblock every waiting caller with a failure. Called on session
    /// teardown so no dispatch stays suspended after the connection is gone.
    pub async fn fail_all(&self) {
        let mut pending = self.pending.lock().await;
        let count = pending.len();
        // Dropping the senders wakes each waiter with a closed-channel error,
        // which dispatch maps to SessionClosed.
        pending.clear();
        if count > 0 {
            debug!(count, "Failed pending tool calls on teardown");
        }
    }

    /// Number of calls currently awaiting a result.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn broker_with_channel(timeout: Duration) -> (Arc<CallBroker>, mpsc::Receiver<WsOutbound>) {
        let (tx, rx) = mpsc::channel(8);
        (Arc::new(CallBroker::new(tx, timeout)), rx)
    }

    async fn next_request_id(rx: &mut mpsc::Receiver<WsOutbound>) -> String {
        match rx.recv().await {
            Some(WsOutbound::Frame(OutboundFrame::Callback { request_id, .. })) => request_id,
            other => panic!("expected callback frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dispatch_resolves_with_matching_result() {
        let (broker, mut rx) = broker_with_channel(Duration::from_secs(5));

        let b = broker.clone();
        let call = tokio::spawn(async move { b.dispatch("fn_a", json!({})).await });

        let id = next_request_id(&mut rx).await;
        broker.resolve(&id, json!("forty-two")).await;

        assert_eq!(call.await.unwrap().unwrap(), json!("forty-two"));
        assert_eq!(broker.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_out_of_order_resolution() {
        let (broker, mut rx) = broker_with_channel(Duration::from_secs(5));

        let b = broker.clone();
        let call_a = tokio::spawn(async move { b.dispatch("fn_a", json!({})).await });
        let id_a = next_request_id(&mut rx).await;

        let b = broker.clone();
        let call_b = tokio::spawn(async move { b.dispatch("fn_b", json!({})).await });
        let id_b = next_request_id(&mut rx).await;

        assert_ne!(id_a, id_b);

        // Resolve in reverse dispatch order; each caller must still get its own.
        broker.resolve(&id_b, json!("result_b")).await;
        broker.resolve(&id_a, json!("result_a")).await;

        assert_eq!(call_a.await.unwrap().unwrap(), json!("result_a"));
        assert_eq!(call_b.await.unwrap().unwrap(), json!("result_b"));
    }

    #[tokio::test]
    async fn test_resolve_unknown_id_is_noop() {
        let (broker, _rx) = broker_with_channel(Duration::from_secs(5));
        broker.resolve("never-dispatched", json!(1)).await;
        assert_eq!(broker.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_second_resolve_is_discarded() {
        let (broker, mut rx) = broker_with_channel(Duration::from_secs(5));

        let b = broker.clone();
        let call = tokio::spawn(async move { b.dispatch("fn_a", json!({})).await });
        let id = next_request_id(&mut rx).await;

        broker.resolve(&id, json!("first")).await;
        broker.resolve(&id, json!("second")).await;

        assert_eq!(call.await.unwrap().unwrap(), json!("first"));
    }

    #[tokio::test]
    async fn test_fail_all_unblocks_every_pending_call() {
        let (broker, mut rx) = broker_with_channel(Duration::from_secs(60));

        let mut calls = Vec::new();
        for i in 0..3 {
            let b = broker.clone();
            calls.push(tokio::spawn(
                async move { b.dispatch(&format!("fn_{i}"), json!({})).await },
            ));
            next_request_id(&mut rx).await;
        }
        assert_eq!(broker.pending_count().await, 3);

        broker.fail_all().await;

        for call in calls {
            assert!(matches!(call.await.unwrap(), Err(RelayError::SessionClosed)));
        }
        assert_eq!(broker.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_dispatch_times_out() {
        let (broker, mut rx) = broker_with_channel(Duration::from_millis(10));

        let b = broker.clone();
        let call = tokio::spawn(async move { b.dispatch("fn_slow", json!({})).await });
        next_request_id(&mut rx).await;

        assert!(matches!(
            call.await.unwrap(),
            Err(RelayError::ToolCallTimeout(_))
        ));
        assert_eq!(broker.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_dispatch_fails_when_writer_gone() {
        let (broker, rx) = broker_with_channel(Duration::from_secs(5));
        drop(rx);

        let err = broker.dispatch("fn_a", json!({})).await.unwrap_err();
        assert!(matches!(err, RelayError::Disconnected));
        assert_eq!(broker.pending_count().await, 0);
    }
}
