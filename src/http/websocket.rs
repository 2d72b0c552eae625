//! Websocket subscription handling.
//!
//! # Responsibilities
//! - Complete the upgrade, then ask the gateway for a subscription
//! - Forward each tailed line as one text frame
//! - Answer gateway control signals (ping, terminate)
//! - Release the subscription on every exit path
//!
//! # Data Flow
//! ```text
//! tail watch ──── lines ────→ socket task ──── text frames ────→ subscriber
//! gateway   ──── control ──→ socket task ──── ping ──────────→ subscriber
//!                            socket task ←─── pong / close ─── subscriber
//! ```
//!
//! # Design Decisions
//! - Rejections are sent as a close frame (1003) after the upgrade, so the
//!   client sees the reason
//! - Terminate drops the socket without a close handshake
//! - Every send races the control channel, so a peer that stopped reading
//!   cannot keep the task parked in a full send buffer past a terminate

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures_util::{Sink, SinkExt};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::gateway::{Control, Subscription, SubscriptionGateway};
use crate::http::server::AppState;
use crate::sinks::Namespace;

/// Maximum close-frame reason length in bytes.
pub const MAX_CLOSE_REASON: usize = 123;

/// `GET /service/{service}` (upgrade)
pub async fn subscribe_service(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> Response {
    ws.on_upgrade(move |socket| serve_subscription(socket, state.gateway, Namespace::Service, service))
}

/// `GET /request/{request}` (upgrade)
pub async fn subscribe_request(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(request): Path<String>,
) -> Response {
    ws.on_upgrade(move |socket| serve_subscription(socket, state.gateway, Namespace::Request, request))
}

/// Cut `reason` to the close-frame limit on a char boundary.
pub fn close_reason(reason: &str) -> &str {
    if reason.len() <= MAX_CLOSE_REASON {
        return reason;
    }
    let mut end = MAX_CLOSE_REASON;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    &reason[..end]
}

async fn serve_subscription(
    mut socket: WebSocket,
    gateway: Arc<SubscriptionGateway>,
    namespace: Namespace,
    entity: String,
) {
    let Subscription {
        connection,
        mut lines,
        mut control,
    } = match gateway.subscribe(namespace, &entity).await {
        Ok(subscription) => subscription,
        Err(e) => {
            tracing::info!(
                namespace = %namespace,
                entity = %entity,
                kind = e.kind(),
                error = %e,
                "Subscription rejected"
            );
            let reason = e.to_string();
            let frame = CloseFrame {
                code: close_code::UNSUPPORTED,
                reason: close_reason(&reason).to_string().into(),
            };
            let _ = socket.send(Message::Close(Some(frame))).await;
            return;
        }
    };

    let reason = loop {
        tokio::select! {
            line = lines.recv() => match line {
                Some(line) => {
                    if let Err(reason) = send_or_terminate(&mut socket, &mut control, Message::Text(line.into())).await {
                        break reason;
                    }
                }
                None => break "watch_ended",
            },
            signal = control.recv() => match signal {
                Some(Control::Ping) => {
                    if let Err(reason) = send_or_terminate(&mut socket, &mut control, Message::Ping(Bytes::new())).await {
                        break reason;
                    }
                }
                Some(Control::Terminate) | None => break "terminated",
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Pong(_))) => connection.mark_alive(),
                Some(Ok(Message::Close(_))) | None => break "disconnect",
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(connection_id = %connection.id(), error = %e, "Websocket transport error");
                    break "transport_error";
                }
            },
        }
    };

    gateway.release(&connection, reason);
}

/// Send one frame unless the gateway terminates the connection first.
///
/// A ping requested while the send is stalled is skipped; the missing pong
/// is what the next sweep acts on.
async fn send_or_terminate<S, M>(
    sink: &mut S,
    control: &mut UnboundedReceiver<Control>,
    message: M,
) -> Result<(), &'static str>
where
    S: Sink<M> + Unpin,
{
    let send = sink.send(message);
    tokio::pin!(send);

    loop {
        tokio::select! {
            result = &mut send => return result.map_err(|_| "send_failed"),
            signal = control.recv() => match signal {
                Some(Control::Ping) => {}
                Some(Control::Terminate) | None => return Err("terminated"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;

    use tokio::sync::mpsc;

    /// A peer that never drains its receive buffer.
    struct Stalled;

    impl Sink<String> for Stalled {
        type Error = Infallible;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
            Poll::Pending
        }

        fn start_send(self: Pin<&mut Self>, _item: String) -> Result<(), Infallible> {
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
            Poll::Pending
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
            Poll::Pending
        }
    }

    #[tokio::test]
    async fn test_terminate_interrupts_stalled_send() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            send_or_terminate(&mut Stalled, &mut rx, "line".to_string()).await
        });

        tx.send(Control::Ping).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_finished(), "a ping must not end a stalled send");

        tx.send(Control::Terminate).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("stalled send was not interrupted")
            .unwrap();
        assert_eq!(result, Err("terminated"));
    }

    #[tokio::test]
    async fn test_send_completes_without_control() {
        let (_tx, mut rx) = mpsc::unbounded_channel();
        let mut sink = futures_util::sink::drain::<String>();
        assert_eq!(send_or_terminate(&mut sink, &mut rx, "line".to_string()).await, Ok(()));
    }

    #[test]
    fn test_close_reason_truncation() {
        assert_eq!(close_reason("short"), "short");

        let long = "x".repeat(200);
        assert_eq!(close_reason(&long).len(), MAX_CLOSE_REASON);

        // 'é' is two bytes; the cut must not split it
        let multibyte = format!("{}é", "a".repeat(MAX_CLOSE_REASON - 1));
        let cut = close_reason(&multibyte);
        assert_eq!(cut.len(), MAX_CLOSE_REASON - 1);
        assert!(cut.chars().all(|c| c == 'a'));
    }
}
