//! Per-connection handler: dispatch inbound frames to the room registry
//! and clean up membership on disconnect.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use huddle_protocol::{classify, ClientFrame, ServerEvent};

use crate::room::{ConnId, OutboundTx, RoomRegistry};

/// Frames queued per connection before the relay starts dropping.
const OUTBOUND_BUFFER: usize = 256;

/// Handle a single WebSocket connection until it closes.
pub async fn handle_connection<S>(ws: WebSocketStream<S>, addr: SocketAddr, registry: RoomRegistry)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut sink, mut stream) = ws.split();
    let conn = ConnId::next();
    let (tx, mut rx) = mpsc::channel::<String>(OUTBOUND_BUFFER);
    // The room this connection joined. Set at most once per connection
    // lifetime; there is no room switching.
    let mut joined: Option<String> = None;

    tracing::info!(peer = %addr, conn = %conn, "new connection");

    loop {
        tokio::select! {
            // Frames routed to this connection → its WebSocket.
            Some(frame) = rx.recv() => {
                if sink.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }

            // Frames from this connection → the router.
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        handle_frame(&text, conn, &tx, &mut joined, &registry).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(peer = %addr, conn = %conn, error = %e, "websocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    if let Some(room) = joined.take() {
        registry.leave(&room, conn).await;
    }
    tracing::info!(peer = %addr, conn = %conn, "connection closed");
}

/// Route one inbound text frame. Every failure is contained here: bad
/// frames are logged and dropped, the connection stays open.
async fn handle_frame(
    raw: &str,
    conn: ConnId,
    tx: &OutboundTx,
    joined: &mut Option<String>,
    registry: &RoomRegistry,
) {
    match classify(raw) {
        Err(e) => {
            tracing::warn!(conn = %conn, error = %e, "discarding malformed frame");
        }
        Ok(ClientFrame::Join { room_id: None }) => {
            tracing::warn!(conn = %conn, "rejecting join without a roomId");
            reject(tx, "join requires a roomId");
        }
        Ok(ClientFrame::Join {
            room_id: Some(room),
        }) => match joined {
            Some(current) => {
                tracing::warn!(
                    conn = %conn,
                    current = %current,
                    requested = %room,
                    "rejecting repeat join"
                );
                reject(tx, "already joined a room");
            }
            None => {
                registry.join(&room, conn, tx.clone()).await;
                *joined = Some(room);
            }
        },
        Ok(ClientFrame::Signal { room_id, payload }) => {
            registry.broadcast(&room_id, conn, &payload).await;
        }
        Ok(ClientFrame::Untargeted) => {
            tracing::debug!(conn = %conn, "dropping untargeted frame");
        }
    }
}

fn reject(tx: &OutboundTx, message: &str) {
    let event = ServerEvent::Error {
        message: message.into(),
    };
    let _ = tx.try_send(event.to_json());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::{json, Value};
    use tokio::io::DuplexStream;
    use tokio_tungstenite::client_async;

    type Client = WebSocketStream<DuplexStream>;

    /// Connect a client to a freshly spawned handler over an in-process
    /// duplex pipe, with a real WebSocket handshake on both ends.
    async fn connect(registry: &RoomRegistry) -> Client {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let registry = registry.clone();
        tokio::spawn(async move {
            let ws = tokio_tungstenite::accept_async(server_io).await.unwrap();
            handle_connection(ws, "127.0.0.1:0".parse().unwrap(), registry).await;
        });
        let (ws, _) = client_async("ws://huddle.test", client_io).await.unwrap();
        ws
    }

    async fn send(client: &mut Client, value: Value) {
        client
            .send(Message::Text(value.to_string().into()))
            .await
            .unwrap();
    }

    async fn recv(client: &mut Client) -> Value {
        let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("websocket error");
        match frame {
            Message::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    async fn wait_until_empty(registry: &RoomRegistry) {
        for _ in 0..100 {
            if registry.room_count().await == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("registry still has rooms");
    }

    /// Joins from different connections race; park until the room has the
    /// expected member count before moving on.
    async fn wait_for_members(registry: &RoomRegistry, room: &str, n: usize) {
        for _ in 0..100 {
            if registry.member_count(room).await == Some(n) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("room {room} never reached {n} members");
    }

    #[tokio::test]
    async fn call_setup_roundtrip() {
        let registry = RoomRegistry::new();
        let mut a = connect(&registry).await;
        let mut b = connect(&registry).await;

        send(&mut a, json!({"type": "join", "roomId": "abc"})).await;
        wait_for_members(&registry, "abc", 1).await;
        send(&mut b, json!({"type": "join", "roomId": "abc"})).await;
        assert_eq!(recv(&mut a).await, json!({"type": "ready_to_call"}));

        let offer = json!({"type": "offer", "roomId": "abc", "sdp": "v=0"});
        send(&mut a, offer.clone()).await;
        assert_eq!(recv(&mut b).await, offer);

        // B hangs up. A's next frame is user_left, which also proves the
        // offer was never echoed back to A in between.
        b.close(None).await.unwrap();
        assert_eq!(recv(&mut a).await, json!({"type": "user_left"}));

        // Last member out deletes the room.
        a.close(None).await.unwrap();
        wait_until_empty(&registry).await;
    }

    #[tokio::test]
    async fn malformed_input_is_inert() {
        let registry = RoomRegistry::new();
        let mut a = connect(&registry).await;
        let mut b = connect(&registry).await;

        send(&mut a, json!({"type": "join", "roomId": "r"})).await;
        wait_for_members(&registry, "r", 1).await;
        send(&mut b, json!({"type": "join", "roomId": "r"})).await;
        assert_eq!(recv(&mut a).await, json!({"type": "ready_to_call"}));

        a.send(Message::Text("this is not json {{{".into()))
            .await
            .unwrap();

        // The connection survives and the garbage produced no output: the
        // first thing B sees is the probe sent afterwards.
        let probe = json!({"roomId": "r", "seq": 1});
        send(&mut a, probe.clone()).await;
        assert_eq!(recv(&mut b).await, probe);
    }

    #[tokio::test]
    async fn join_without_room_is_rejected() {
        let registry = RoomRegistry::new();
        let mut a = connect(&registry).await;

        send(&mut a, json!({"type": "join"})).await;

        let reply = recv(&mut a).await;
        assert_eq!(reply["type"], "error");
        assert_eq!(registry.room_count().await, 0);
    }

    #[tokio::test]
    async fn repeat_join_is_rejected() {
        let registry = RoomRegistry::new();
        let mut a = connect(&registry).await;

        send(&mut a, json!({"type": "join", "roomId": "first"})).await;
        send(&mut a, json!({"type": "join", "roomId": "second"})).await;

        let reply = recv(&mut a).await;
        assert_eq!(reply["type"], "error");
        // Membership is unchanged; no second room was created.
        assert_eq!(registry.member_count("first").await, Some(1));
        assert_eq!(registry.member_count("second").await, None);
    }

    #[tokio::test]
    async fn disconnect_without_join_is_a_noop() {
        let registry = RoomRegistry::new();
        let mut a = connect(&registry).await;
        send(&mut a, json!({"type": "ping"})).await;
        a.close(None).await.unwrap();
        wait_until_empty(&registry).await;
    }
}
