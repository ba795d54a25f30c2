//! Single reader of a connection
//!
//! Every incoming frame goes to exactly one place: the pending request, if
//! it is waiting for that type, or the event queue otherwise. Heartbeats are
//! swallowed here after they reset the idle deadline.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::protocol::{Message, MessageType};
use crate::store::SessionStore;
use crate::transport::FrameReader;

/// The link died with nobody waiting for a response
#[derive(Debug)]
pub(crate) struct LinkFailure {
    /// Connection the failure belongs to
    pub(crate) generation: u64,
    pub(crate) error: Error,
}

struct Expectation {
    accepted: Vec<MessageType>,
    tx: oneshot::Sender<Result<Message>>,
}

#[derive(Default)]
struct Slot {
    expectation: Option<Expectation>,
    /// Set once the reader loop has exited; nothing will resolve a new expectation
    closed: bool,
}

/// Handle to the reader task of one connection
#[derive(Clone)]
pub(crate) struct Dispatcher {
    generation: u64,
    slot: Arc<Mutex<Slot>>,
    cancel: CancellationToken,
}

impl Dispatcher {
    pub(crate) fn new(generation: u64) -> Self {
        Self {
            generation,
            slot: Arc::new(Mutex::new(Slot::default())),
            cancel: CancellationToken::new(),
        }
    }

    /// Arm the expectation slot
    ///
    /// The first received frame whose type is in `accepted` resolves the
    /// returned receiver. If the link fails first, it resolves with the
    /// error instead. On a dispatcher that already exited it resolves with
    /// `ConnectionClosed` right away.
    pub(crate) fn expect(&self, accepted: &[MessageType]) -> oneshot::Receiver<Result<Message>> {
        let (tx, rx) = oneshot::channel();
        let mut slot = self.slot();
        if slot.closed {
            debug!(generation = self.generation, "Expecting on a closed link");
            let _ = tx.send(Err(Error::ConnectionClosed));
            return rx;
        }

        trace!(?accepted, "Expecting response");
        let replaced = slot.expectation.replace(Expectation {
            accepted: accepted.to_vec(),
            tx,
        });
        if replaced.is_some() {
            warn!("Replaced an unresolved expectation");
        }
        rx
    }

    /// Disarm the slot after the requester gave up
    pub(crate) fn clear_expectation(&self) {
        self.slot().expectation.take();
    }

    /// Start reading frames from `reader`
    ///
    /// Events go to `events` in arrival order. A failure nobody is waiting
    /// for is reported on `failures`. Nothing is reported after [`stop`].
    ///
    /// [`stop`]: Dispatcher::stop
    pub(crate) fn spawn(
        &self,
        reader: FrameReader,
        idle_timeout: Duration,
        events: mpsc::UnboundedSender<Message>,
        failures: mpsc::UnboundedSender<LinkFailure>,
        store: SessionStore,
    ) {
        tokio::spawn(self.clone().run(reader, idle_timeout, events, failures, store));
    }

    pub(crate) fn stop(&self) {
        self.cancel.cancel();
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run(
        self,
        mut reader: FrameReader,
        idle_timeout: Duration,
        events: mpsc::UnboundedSender<Message>,
        failures: mpsc::UnboundedSender<LinkFailure>,
        store: SessionStore,
    ) {
        debug!(generation = self.generation, "Dispatcher started");
        let mut last_frame = Instant::now();

        let error = loop {
            let deadline = last_frame + idle_timeout;
            let received = tokio::select! {
                _ = self.cancel.cancelled() => break None,
                received = tokio::time::timeout_at(deadline, reader.receive_frame()) => received,
            };

            let message = match received {
                Ok(Ok(message)) => message,
                Ok(Err(e)) => break Some(e),
                Err(_) => {
                    warn!(
                        generation = self.generation,
                        idle_ms = idle_timeout.as_millis() as u64,
                        "No frame within idle timeout"
                    );
                    break Some(Error::Timeout);
                }
            };

            last_frame = Instant::now();
            store.touch();

            if message.kind() == MessageType::KeepAlive {
                continue;
            }

            if let Some(message) = self.resolve(message) {
                trace!(message = %message, "Queued event");
                if events.send(message).is_err() {
                    debug!("Event queue closed, dropping event");
                }
            }
        };

        // Anyone still waiting learns why the link is gone; after a stop the
        // waiter only sees its channel close
        let pending = {
            let mut slot = self.slot();
            slot.closed = true;
            slot.expectation.take()
        };
        let Some(error) = error else {
            debug!(generation = self.generation, "Dispatcher stopped");
            return;
        };
        if self.cancel.is_cancelled() {
            return;
        }

        // A requester that went away cannot escalate, so the supervisor must
        let error = match pending {
            Some(expectation) => {
                debug!(generation = self.generation, error = %error, "Failing pending request");
                match expectation.tx.send(Err(error)) {
                    Ok(()) => return,
                    Err(Err(error)) => error,
                    Err(Ok(_)) => return,
                }
            }
            None => error,
        };

        warn!(generation = self.generation, error = %error, "Link failed");
        let _ = failures.send(LinkFailure {
            generation: self.generation,
            error,
        });
    }

    /// Hand `message` to the pending request if it wants it, otherwise give it back
    fn resolve(&self, message: Message) -> Option<Message> {
        let mut slot = self.slot();
        let wanted = slot
            .expectation
            .as_ref()
            .is_some_and(|e| e.accepted.contains(&message.kind()));
        if !wanted {
            return Some(message);
        }

        if let Some(expectation) = slot.expectation.take() {
            trace!(message = %message, "Resolved expectation");
            if expectation.tx.send(Ok(message)).is_err() {
                debug!("Requester gone before its response arrived");
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Transport;
    use tokio::io::{AsyncWriteExt, DuplexStream};

    struct Harness {
        dispatcher: Dispatcher,
        server: DuplexStream,
        events: mpsc::UnboundedReceiver<Message>,
        failures: mpsc::UnboundedReceiver<LinkFailure>,
        store: SessionStore,
        _transport: Transport,
    }

    fn harness(idle_timeout: Duration) -> Harness {
        let (client, server) = tokio::io::duplex(4096);
        let (read, write) = tokio::io::split(client);
        let (transport, reader) = Transport::from_parts("test", read, write);
        let (events_tx, events) = mpsc::unbounded_channel();
        let (failures_tx, failures) = mpsc::unbounded_channel();
        let store = SessionStore::new();
        let dispatcher = Dispatcher::new(7);
        dispatcher.spawn(reader, idle_timeout, events_tx, failures_tx, store.clone());
        Harness {
            dispatcher,
            server,
            events,
            failures,
            store,
            _transport: transport,
        }
    }

    #[tokio::test]
    async fn test_routes_response_and_events_in_order() {
        let mut h = harness(Duration::from_secs(5));
        let response = h.dispatcher.expect(&[MessageType::RoomCreated, MessageType::LimitRooms]);

        h.server
            .write_all(b"KEEP_ALIVE\nOPPONENT_BOARD_READY\nROOM_CREATED|1234\nKEEP_ALIVE\nTURN_SET|YOU\n")
            .await
            .unwrap();

        let response = response.await.unwrap().unwrap();
        assert_eq!(response.kind(), MessageType::RoomCreated);
        assert_eq!(response.param(0), "1234");

        let first = h.events.recv().await.unwrap();
        let second = h.events.recv().await.unwrap();
        assert_eq!(first.kind(), MessageType::OpponentBoardReady);
        assert_eq!(second.kind(), MessageType::TurnSet);
        assert!(h.events.try_recv().is_err());
        assert!(h.store.read(|s| s.last_activity.is_some()));
    }

    #[tokio::test]
    async fn test_unexpected_type_goes_to_events() {
        let mut h = harness(Duration::from_secs(5));
        let mut response = h.dispatcher.expect(&[MessageType::Ack]);

        h.server.write_all(b"GAME_BEGIN|bob\n").await.unwrap();

        let event = h.events.recv().await.unwrap();
        assert_eq!(event.kind(), MessageType::GameBegin);
        assert!(response.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failure_resolves_pending_request() {
        let mut h = harness(Duration::from_secs(5));
        let response = h.dispatcher.expect(&[MessageType::Ack]);

        drop(h.server);

        let result = response.await.unwrap();
        assert!(matches!(result, Err(Error::ConnectionClosed)));
        // Reported to the waiter only; the task then ends and drops its sender
        assert!(h.failures.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_idle_timeout_reports_failure() {
        let mut h = harness(Duration::from_millis(100));

        let failure = h.failures.recv().await.unwrap();
        assert_eq!(failure.generation, 7);
        assert!(matches!(failure.error, Error::Timeout));
    }

    #[tokio::test]
    async fn test_heartbeats_keep_link_alive() {
        let mut h = harness(Duration::from_millis(200));

        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            h.server.write_all(b"KEEP_ALIVE\n").await.unwrap();
        }
        assert!(h.failures.try_recv().is_err());
        assert!(h.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_garbled_frame_reports_failure() {
        let mut h = harness(Duration::from_secs(5));

        h.server.write_all(b"ACK|unexpected\n").await.unwrap();

        let failure = h.failures.recv().await.unwrap();
        assert!(matches!(failure.error, Error::Protocol(_)));
    }

    #[tokio::test]
    async fn test_abandoned_request_reports_failure() {
        let mut h = harness(Duration::from_secs(5));
        let response = h.dispatcher.expect(&[MessageType::Ack]);
        drop(response);

        drop(h.server);

        let failure = tokio::time::timeout(Duration::from_secs(1), h.failures.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(failure.generation, 7);
        assert!(matches!(failure.error, Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_expect_after_exit_resolves_closed() {
        let mut h = harness(Duration::from_millis(100));
        h.failures.recv().await.unwrap();

        let response = h.dispatcher.expect(&[MessageType::Ack]);
        let result = tokio::time::timeout(Duration::from_secs(1), response)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_stop_reports_nothing() {
        let mut h = harness(Duration::from_millis(100));
        let response = h.dispatcher.expect(&[MessageType::Ack]);

        h.dispatcher.stop();

        assert!(response.await.is_err());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(h.failures.try_recv().is_err());
    }
}
