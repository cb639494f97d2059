//! WebSocket session lifecycle: one authenticated client from upgrade
//! through disconnect.

use std::time::Instant;

use axum::extract::ws::Message;
use beacon_core::ClientId;
use futures::{Sink, Stream, StreamExt};
use metrics::{counter, histogram};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::pumps::{CloseReason, InboundContext, inbound_pump, outbound_pump};
use crate::config::SessionConfig;
use crate::hub::{HubHandle, SessionHandle};
use crate::metrics::{WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL, WS_SESSION_DURATION_SECONDS};

/// Run a session for an upgraded connection.
///
/// 1. Allocates a session id and registers with the coordinator
/// 2. Spawns the outbound pump (mailbox drain plus heartbeat)
/// 3. Runs the inbound pump on this task until it stops
/// 4. Unregisters, cancels the outbound pump, and waits for its close frame
///
/// `cancel` should be a child of the server shutdown token; the coordinator
/// fires it when a newer session for the same identity registers.
#[instrument(skip_all, fields(client_id = %client_id, session_id))]
pub async fn run_session<S>(
    socket: S,
    client_id: ClientId,
    hub: HubHandle,
    config: SessionConfig,
    cancel: CancellationToken,
) where
    S: Stream<Item = Result<Message, axum::Error>>
        + Sink<Message, Error = axum::Error>
        + Send
        + 'static,
{
    let session_id = hub.next_session_id();
    let _ = tracing::Span::current().record("session_id", session_id.get());

    let (mailbox_tx, mailbox_rx) = mpsc::channel(config.mailbox_capacity);
    let handle = SessionHandle::new(client_id, session_id, mailbox_tx, cancel.clone());
    if hub.register(handle).await.is_err() {
        warn!("hub not running, dropping connection");
        return;
    }

    let started = Instant::now();
    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);

    let (write, read) = socket.split();
    let outbound = tokio::spawn(outbound_pump(
        write,
        mailbox_rx,
        cancel.clone(),
        config.heartbeat_interval,
        config.write_timeout,
    ));

    let ctx = InboundContext {
        client_id,
        session_id,
        read_timeout: config.read_timeout,
        max_message_size: config.max_message_size,
    };
    let inbound_reason = inbound_pump(read, &ctx, &hub, &cancel).await;

    hub.unregister(client_id, session_id).await;
    cancel.cancel();
    let outbound_reason = match outbound.await {
        Ok(reason) => Some(reason),
        Err(e) => {
            warn!(error = %e, "outbound pump task failed");
            None
        }
    };

    info!(
        inbound = inbound_reason.as_str(),
        outbound = outbound_reason.map(CloseReason::as_str),
        "client disconnected"
    );
    counter!(WS_DISCONNECTIONS_TOTAL, "reason" => inbound_reason.as_str()).increment(1);
    histogram!(WS_SESSION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::hub::channel;
    use futures::channel::mpsc as fmpsc;
    use futures::SinkExt;

    /// In-memory duplex: a stream fed by `inbound`, a sink recorded to `outbound`.
    struct Duplex {
        read: fmpsc::UnboundedReceiver<Result<Message, axum::Error>>,
        write: fmpsc::UnboundedSender<Message>,
    }

    impl Stream for Duplex {
        type Item = Result<Message, axum::Error>;

        fn poll_next(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Option<Self::Item>> {
            self.read.poll_next_unpin(cx)
        }
    }

    impl Sink<Message> for Duplex {
        type Error = axum::Error;

        fn poll_ready(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Result<(), Self::Error>> {
            self.write.poll_ready_unpin(cx).map_err(axum::Error::new)
        }

        fn start_send(mut self: std::pin::Pin<&mut Self>, item: Message) -> Result<(), Self::Error> {
            self.write.start_send_unpin(item).map_err(axum::Error::new)
        }

        fn poll_flush(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Result<(), Self::Error>> {
            self.write.poll_flush_unpin(cx).map_err(axum::Error::new)
        }

        fn poll_close(
            mut self: std::pin::Pin<&mut Self>,
            cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Result<(), Self::Error>> {
            self.write.poll_close_unpin(cx).map_err(axum::Error::new)
        }
    }

    fn duplex() -> (
        Duplex,
        fmpsc::UnboundedSender<Result<Message, axum::Error>>,
        fmpsc::UnboundedReceiver<Message>,
    ) {
        let (in_tx, in_rx) = fmpsc::unbounded();
        let (out_tx, out_rx) = fmpsc::unbounded();
        (
            Duplex {
                read: in_rx,
                write: out_tx,
            },
            in_tx,
            out_rx,
        )
    }

    async fn next_text(out: &mut fmpsc::UnboundedReceiver<Message>) -> serde_json::Value {
        loop {
            match out.next().await.unwrap() {
                Message::Text(t) => return serde_json::from_str(t.as_str()).unwrap(),
                Message::Ping(_) => {}
                other => panic!("unexpected frame: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn session_registers_routes_and_unregisters() {
        let (hub, handle) = channel(16, CancellationToken::new());
        let _coordinator = tokio::spawn(hub.run());

        let (socket, inbound, mut outbound) = duplex();
        let session = tokio::spawn(run_session(
            socket,
            ClientId::new(5),
            handle.clone(),
            SessionConfig::default(),
            CancellationToken::new(),
        ));

        inbound
            .unbounded_send(Ok(Message::Text(r#"{"type":"join","room_id":"bridge"}"#.into())))
            .unwrap();
        let presence = next_text(&mut outbound).await;
        assert_eq!(presence["type"], "room-presence");
        assert_eq!(presence["user_ids"], serde_json::json!([5]));

        inbound.unbounded_send(Ok(Message::Close(None))).unwrap();
        tokio::time::timeout(Duration::from_secs(2), session)
            .await
            .unwrap()
            .unwrap();

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.clients, 0);
        assert!(snapshot.rooms.is_empty());
    }

    #[tokio::test]
    async fn eviction_closes_socket() {
        let (hub, handle) = channel(16, CancellationToken::new());
        let _coordinator = tokio::spawn(hub.run());

        let (socket, _inbound, mut outbound) = duplex();
        let session = tokio::spawn(run_session(
            socket,
            ClientId::new(5),
            handle.clone(),
            SessionConfig::default(),
            CancellationToken::new(),
        ));
        // Wait until the first session is registered.
        while handle.snapshot().await.unwrap().clients == 0 {
            tokio::task::yield_now().await;
        }

        // A second session for the same identity.
        let (tx, _rx) = mpsc::channel::<axum::extract::ws::Utf8Bytes>(4);
        handle
            .register(SessionHandle::new(
                ClientId::new(5),
                handle.next_session_id(),
                tx,
                CancellationToken::new(),
            ))
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(2), session)
            .await
            .unwrap()
            .unwrap();
        let frames: Vec<Message> = outbound.by_ref().collect().await;
        assert!(matches!(frames.last(), Some(Message::Close(_))));
        assert_eq!(handle.snapshot().await.unwrap().clients, 1);
    }

    #[tokio::test]
    async fn session_without_hub_returns_immediately() {
        let (hub, handle) = channel(16, CancellationToken::new());
        drop(hub);
        let (socket, _inbound, _outbound) = duplex();
        tokio::time::timeout(
            Duration::from_secs(2),
            run_session(
                socket,
                ClientId::new(1),
                handle,
                SessionConfig::default(),
                CancellationToken::new(),
            ),
        )
        .await
        .unwrap();
    }
}
