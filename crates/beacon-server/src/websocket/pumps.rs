//! Inbound and outbound pumps for one session.
//!
//! Both are generic over the socket halves so tests can drive them with
//! in-memory streams and sinks.

use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, Utf8Bytes};
use beacon_core::{ClientId, Envelope, SessionId};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::hub::HubHandle;

/// Why a pump stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The session token was cancelled (eviction, shutdown, or the other pump).
    Cancelled,
    /// The client sent a close frame.
    ClientClosed,
    /// The stream ended without a close frame.
    StreamEnded,
    /// Nothing arrived before the read deadline.
    ReadTimeout,
    /// The transport reported an error while reading.
    ReadError,
    /// A frame exceeded the size limit.
    Oversized,
    /// A frame was not a JSON object (or not UTF-8).
    Malformed,
    /// The coordinator stopped accepting commands.
    HubClosed,
    /// The coordinator dropped this session's mailbox.
    MailboxClosed,
    /// A write failed.
    WriteFailed,
    /// A write did not finish before the write deadline.
    WriteTimeout,
}

impl CloseReason {
    /// Short label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::ClientClosed => "client_closed",
            Self::StreamEnded => "stream_ended",
            Self::ReadTimeout => "read_timeout",
            Self::ReadError => "read_error",
            Self::Oversized => "oversized",
            Self::Malformed => "malformed",
            Self::HubClosed => "hub_closed",
            Self::MailboxClosed => "mailbox_closed",
            Self::WriteFailed => "write_failed",
            Self::WriteTimeout => "write_timeout",
        }
    }
}

/// Identity and limits the inbound pump needs.
#[derive(Debug, Clone)]
pub struct InboundContext {
    /// Authenticated identity.
    pub client_id: ClientId,
    /// This connection.
    pub session_id: SessionId,
    /// Close after this long without any frame.
    pub read_timeout: Duration,
    /// Largest accepted frame in bytes.
    pub max_message_size: usize,
}

/// Read frames and forward envelopes to the coordinator.
///
/// Any frame (including pings and pongs) refreshes the read deadline. Every
/// exit path is fatal to the session; the caller unregisters afterwards.
pub async fn inbound_pump<S>(
    mut read: S,
    ctx: &InboundContext,
    hub: &HubHandle,
    cancel: &CancellationToken,
) -> CloseReason
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let deadline = tokio::time::sleep(ctx.read_timeout);
    tokio::pin!(deadline);

    loop {
        let msg = tokio::select! {
            () = cancel.cancelled() => return CloseReason::Cancelled,
            () = &mut deadline => {
                warn!(timeout = ?ctx.read_timeout, "read deadline expired");
                return CloseReason::ReadTimeout;
            }
            msg = read.next() => msg,
        };

        let msg = match msg {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                debug!(error = %e, "websocket read error");
                return CloseReason::ReadError;
            }
            None => return CloseReason::StreamEnded,
        };

        deadline
            .as_mut()
            .reset(Instant::now() + ctx.read_timeout);

        let envelope = match &msg {
            Message::Text(text) => decode(text.as_str(), ctx),
            Message::Binary(data) => match std::str::from_utf8(data) {
                Ok(text) => decode(text, ctx),
                Err(_) => {
                    warn!(len = data.len(), "non-UTF-8 binary frame");
                    Err(CloseReason::Malformed)
                }
            },
            Message::Ping(_) | Message::Pong(_) => {
                trace!("control frame");
                continue;
            }
            Message::Close(_) => return CloseReason::ClientClosed,
        };

        let mut envelope = match envelope {
            Ok(envelope) => envelope,
            Err(reason) => return reason,
        };
        envelope.stamp_sender(ctx.client_id);

        if hub
            .submit(ctx.client_id, ctx.session_id, envelope)
            .await
            .is_err()
        {
            return CloseReason::HubClosed;
        }
    }
}

fn decode(text: &str, ctx: &InboundContext) -> Result<Envelope, CloseReason> {
    if text.len() > ctx.max_message_size {
        warn!(
            len = text.len(),
            limit = ctx.max_message_size,
            "frame exceeds size limit"
        );
        return Err(CloseReason::Oversized);
    }
    Envelope::parse(text).map_err(|e| {
        warn!(error = %e, "undecodable frame");
        CloseReason::Malformed
    })
}

/// Drain the mailbox onto the socket and send periodic pings.
///
/// Cancels `cancel` on exit so the inbound pump stops too, then attempts a
/// close frame.
pub async fn outbound_pump<S>(
    mut write: S,
    mut mailbox: mpsc::Receiver<Utf8Bytes>,
    cancel: CancellationToken,
    heartbeat: Duration,
    write_timeout: Duration,
) -> CloseReason
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    let mut ping = tokio::time::interval(heartbeat);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Skip the immediate first tick
    let _ = ping.tick().await;

    let reason = loop {
        tokio::select! {
            () = cancel.cancelled() => break CloseReason::Cancelled,
            frame = mailbox.recv() => {
                let Some(frame) = frame else {
                    break CloseReason::MailboxClosed;
                };
                if let Err(reason) =
                    write_with_deadline(&mut write, Message::Text(frame), write_timeout).await
                {
                    break reason;
                }
            }
            _ = ping.tick() => {
                if let Err(reason) =
                    write_with_deadline(&mut write, Message::Ping(Bytes::new()), write_timeout).await
                {
                    break reason;
                }
            }
        }
    };

    cancel.cancel();
    let _ = tokio::time::timeout(write_timeout, write.send(Message::Close(None))).await;
    reason
}

async fn write_with_deadline<S>(
    write: &mut S,
    msg: Message,
    deadline: Duration,
) -> Result<(), CloseReason>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    match tokio::time::timeout(deadline, write.send(msg)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            debug!(error = %e, "websocket write failed");
            Err(CloseReason::WriteFailed)
        }
        Err(_) => {
            warn!(timeout = ?deadline, "websocket write timed out");
            Err(CloseReason::WriteTimeout)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::{SessionHandle, channel};
    use futures::{sink, stream};

    fn ctx() -> InboundContext {
        InboundContext {
            client_id: ClientId::new(7),
            session_id: SessionId::new(1),
            read_timeout: Duration::from_secs(60),
            max_message_size: 64,
        }
    }

    fn frames(items: Vec<Message>) -> impl Stream<Item = Result<Message, axum::Error>> + Unpin {
        stream::iter(items.into_iter().map(Ok)).chain(stream::pending())
    }

    /// A sink that forwards written frames to a channel.
    fn recording_sink(
        tx: mpsc::UnboundedSender<Message>,
    ) -> impl Sink<Message, Error = axum::Error> + Unpin {
        Box::pin(sink::unfold(tx, |tx, msg: Message| async move {
            let _ = tx.send(msg);
            Ok::<_, axum::Error>(tx)
        }))
    }

    #[tokio::test]
    async fn inbound_forwards_stamped_envelopes() {
        let (hub, handle) = channel(8, CancellationToken::new());
        let _coordinator = tokio::spawn(hub.run());

        // Register the reading session and a direct target.
        let (own_tx, _own_rx) = mpsc::channel(8);
        let (target_tx, mut target_rx) = mpsc::channel(8);
        let mut reader = ctx();
        reader.session_id = handle.next_session_id();
        handle
            .register(SessionHandle::new(
                reader.client_id,
                reader.session_id,
                own_tx,
                CancellationToken::new(),
            ))
            .await
            .unwrap();
        handle
            .register(SessionHandle::new(
                ClientId::new(8),
                handle.next_session_id(),
                target_tx,
                CancellationToken::new(),
            ))
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let read = frames(vec![
            Message::Ping(Bytes::new()),
            Message::Text(r#"{"type":"offer","target_id":8,"sender_id":1}"#.into()),
            Message::Close(None),
        ]);
        let reason = inbound_pump(read, &reader, &handle, &cancel).await;
        assert_eq!(reason, CloseReason::ClientClosed);

        let frame = target_rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(frame.as_str()).unwrap();
        assert_eq!(value["sender_id"], 7);
        assert_eq!(value["type"], "offer");
    }

    #[tokio::test]
    async fn inbound_stops_when_hub_is_gone() {
        let (hub, handle) = channel(8, CancellationToken::new());
        drop(hub);
        let cancel = CancellationToken::new();
        let read = frames(vec![Message::Text(r#"{"type":"x","room_id":"r"}"#.into())]);
        assert_eq!(
            inbound_pump(read, &ctx(), &handle, &cancel).await,
            CloseReason::HubClosed
        );
    }

    #[tokio::test]
    async fn inbound_stops_on_cancel() {
        let (_hub, handle) = channel(8, CancellationToken::new());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let read = stream::pending::<Result<Message, axum::Error>>();
        assert_eq!(
            inbound_pump(read, &ctx(), &handle, &cancel).await,
            CloseReason::Cancelled
        );
    }

    #[tokio::test]
    async fn inbound_rejects_oversized_frame() {
        let (_hub, handle) = channel(8, CancellationToken::new());
        let cancel = CancellationToken::new();
        let big = format!(r#"{{"type":"x","pad":"{}"}}"#, "a".repeat(100));
        let read = frames(vec![Message::Text(big.into())]);
        assert_eq!(
            inbound_pump(read, &ctx(), &handle, &cancel).await,
            CloseReason::Oversized
        );
    }

    #[tokio::test]
    async fn inbound_rejects_malformed_frames() {
        let (_hub, handle) = channel(8, CancellationToken::new());
        let cancel = CancellationToken::new();
        for msg in [
            Message::Text("not json".into()),
            Message::Text("[1,2]".into()),
            Message::Binary(Bytes::from_static(&[0xff, 0xfe])),
        ] {
            assert_eq!(
                inbound_pump(frames(vec![msg]), &ctx(), &handle, &cancel).await,
                CloseReason::Malformed
            );
        }
    }

    #[tokio::test]
    async fn inbound_stops_at_stream_end() {
        let (_hub, handle) = channel(8, CancellationToken::new());
        let cancel = CancellationToken::new();
        let read = stream::iter(Vec::<Result<Message, axum::Error>>::new());
        assert_eq!(
            inbound_pump(read, &ctx(), &handle, &cancel).await,
            CloseReason::StreamEnded
        );
    }

    #[tokio::test]
    async fn inbound_stops_on_read_error() {
        let (_hub, handle) = channel(8, CancellationToken::new());
        let cancel = CancellationToken::new();
        let read = stream::iter(vec![Err(axum::Error::new(std::io::Error::other("reset")))]);
        assert_eq!(
            inbound_pump(read, &ctx(), &handle, &cancel).await,
            CloseReason::ReadError
        );
    }

    #[tokio::test(start_paused = true)]
    async fn inbound_times_out_on_silence() {
        let (_hub, handle) = channel(8, CancellationToken::new());
        let cancel = CancellationToken::new();
        let read = stream::pending::<Result<Message, axum::Error>>();
        assert_eq!(
            inbound_pump(read, &ctx(), &handle, &cancel).await,
            CloseReason::ReadTimeout
        );
    }

    #[tokio::test(start_paused = true)]
    async fn inbound_deadline_resets_on_pong() {
        let (_hub, handle) = channel(8, CancellationToken::new());
        let cancel = CancellationToken::new();
        let timeout = ctx().read_timeout;

        // A pong just before the deadline, then silence.
        let delayed = stream::once(async move {
            tokio::time::sleep(timeout - Duration::from_secs(1)).await;
            Ok(Message::Pong(Bytes::new()))
        });
        let read = Box::pin(delayed.chain(stream::pending()));

        let start = Instant::now();
        let reason = inbound_pump(read, &ctx(), &handle, &cancel).await;
        assert_eq!(reason, CloseReason::ReadTimeout);
        assert!(start.elapsed() >= timeout * 2 - Duration::from_secs(1));
    }

    #[tokio::test]
    async fn outbound_writes_mailbox_in_order() {
        let (sink_tx, mut sink_rx) = mpsc::unbounded_channel();
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        tx.send(Utf8Bytes::from("one")).await.unwrap();
        tx.send(Utf8Bytes::from("two")).await.unwrap();
        drop(tx);

        let reason = outbound_pump(
            recording_sink(sink_tx),
            rx,
            cancel.clone(),
            Duration::from_secs(10),
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(reason, CloseReason::MailboxClosed);
        assert!(cancel.is_cancelled());

        let mut written = Vec::new();
        while let Ok(msg) = sink_rx.try_recv() {
            written.push(msg);
        }
        assert!(matches!(&written[0], Message::Text(t) if t.as_str() == "one"));
        assert!(matches!(&written[1], Message::Text(t) if t.as_str() == "two"));
        assert!(matches!(written[2], Message::Close(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn outbound_sends_heartbeat_pings() {
        let (sink_tx, mut sink_rx) = mpsc::unbounded_channel();
        let (_tx, rx) = mpsc::channel::<Utf8Bytes>(8);
        let cancel = CancellationToken::new();

        let pump = tokio::spawn(outbound_pump(
            recording_sink(sink_tx),
            rx,
            cancel.clone(),
            Duration::from_secs(10),
            Duration::from_secs(1),
        ));

        let first = sink_rx.recv().await.unwrap();
        assert!(matches!(first, Message::Ping(_)));
        let second = sink_rx.recv().await.unwrap();
        assert!(matches!(second, Message::Ping(_)));

        cancel.cancel();
        assert_eq!(pump.await.unwrap(), CloseReason::Cancelled);
        assert!(matches!(sink_rx.recv().await, Some(Message::Close(_))));
    }

    fn broken_pipe() -> axum::Error {
        axum::Error::new(std::io::Error::from(std::io::ErrorKind::BrokenPipe))
    }

    /// A sink whose peer is gone. Every call fails, including the close
    /// frame sent after the first failure.
    struct BrokenSink {
        attempts: usize,
    }

    impl Sink<Message> for BrokenSink {
        type Error = axum::Error;

        fn poll_ready(
            mut self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Result<(), Self::Error>> {
            self.attempts += 1;
            std::task::Poll::Ready(Err(broken_pipe()))
        }

        fn start_send(self: std::pin::Pin<&mut Self>, _item: Message) -> Result<(), Self::Error> {
            Err(broken_pipe())
        }

        fn poll_flush(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Result<(), Self::Error>> {
            std::task::Poll::Ready(Err(broken_pipe()))
        }

        fn poll_close(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<Result<(), Self::Error>> {
            std::task::Poll::Ready(Err(broken_pipe()))
        }
    }

    #[tokio::test]
    async fn outbound_write_failure_cancels_session() {
        let mut broken = BrokenSink { attempts: 0 };
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        tx.send(Utf8Bytes::from("x")).await.unwrap();

        let reason = outbound_pump(
            &mut broken,
            rx,
            cancel.clone(),
            Duration::from_secs(10),
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(reason, CloseReason::WriteFailed);
        assert!(cancel.is_cancelled());
        // The frame write and the close frame both reached the sink.
        assert_eq!(broken.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn outbound_write_timeout_is_fatal() {
        let stalled = Box::pin(sink::unfold((), |(), _msg: Message| async move {
            futures::future::pending::<()>().await;
            Ok::<_, axum::Error>(())
        }));
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        tx.send(Utf8Bytes::from("x")).await.unwrap();

        let reason = outbound_pump(
            stalled,
            rx,
            cancel,
            Duration::from_secs(10),
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(reason, CloseReason::WriteTimeout);
    }

    #[test]
    fn reason_labels_are_snake_case() {
        for reason in [
            CloseReason::Cancelled,
            CloseReason::ReadTimeout,
            CloseReason::WriteTimeout,
            CloseReason::MailboxClosed,
        ] {
            assert!(reason.as_str().chars().all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }
}
