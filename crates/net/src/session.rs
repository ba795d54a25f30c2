//! Client session
//!
//! [`Session`] is what front ends talk to. It owns the connection and its
//! workers, runs one request/response exchange at a time, and reconnects
//! on its own when the link dies.
//!
//! A connection and everything running on it form a link. Each link
//! gets a new generation number, so a failure report from a link that has
//! already been replaced is recognised and ignored.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, Weak};

use bship_core::{Board, Cell, ConnectionStatus, ServerEndpoint, SessionConfig, SessionState};
use tokio::sync::{mpsc, oneshot, watch, Mutex, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dispatcher::{Dispatcher, LinkFailure};
use crate::error::{Error, Result};
use crate::events::{EventProcessor, ShotResult};
use crate::liveness::LivenessProbe;
use crate::notify::{Alert, Notification, Notifier, Scene};
use crate::protocol::{Message, MessageType};
use crate::store::SessionStore;
use crate::transport::Transport;

/// Room codes are this many decimal digits
pub const ROOM_CODE_LENGTH: usize = 4;

/// Players per room, reported when a join finds the room full
const ROOM_CAPACITY: usize = 2;

/// How the server took us in after NICKNAME_SET
#[derive(Debug, Clone, PartialEq, Eq)]
enum Handshake {
    Fresh,
    /// We were in a game; the server put us back in this room
    Rejoined { room_code: String },
}

impl Handshake {
    fn scene(&self) -> Scene {
        match self {
            Handshake::Fresh => Scene::Lobby,
            Handshake::Rejoined { .. } => Scene::Room,
        }
    }
}

/// One live connection and the workers running on it
struct Link {
    generation: u64,
    transport: Transport,
    dispatcher: Dispatcher,
    queue: Option<mpsc::UnboundedReceiver<Message>>,
    processor: Option<EventProcessor>,
    liveness: Option<LivenessProbe>,
}

impl Link {
    fn start_workers(&mut self, store: &SessionStore, notifier: &Notifier, config: &SessionConfig) {
        if let Some(queue) = self.queue.take() {
            self.processor = Some(EventProcessor::start(
                queue,
                store.clone(),
                notifier.clone(),
            ));
        }
        self.liveness = Some(LivenessProbe::start(
            self.transport.clone(),
            config.keep_alive_interval(),
        ));
    }

    /// Signal every worker; none of them reports a failure afterwards
    fn stop(&self) {
        if let Some(liveness) = &self.liveness {
            liveness.stop();
        }
        if let Some(processor) = &self.processor {
            processor.stop();
        }
        self.dispatcher.stop();
    }

    async fn close(self) {
        self.stop();
        self.transport.shutdown().await;
        debug!(generation = self.generation, "Link closed");
    }
}

/// Why an exchange produced no response
struct Failed {
    error: Error,
    /// The dispatcher is gone, so the connection needs replacing
    link_failed: bool,
}

impl From<Failed> for Error {
    fn from(failed: Failed) -> Self {
        failed.error
    }
}

struct Inner {
    config: SessionConfig,
    store: SessionStore,
    notifier: Notifier,
    link: RwLock<Option<Link>>,
    /// Held for a whole exchange, and for a whole reconnect
    requests: Mutex<()>,
    generation: AtomicU64,
    failures: mpsc::UnboundedSender<LinkFailure>,
    /// Cancelled by `disconnect`; replaced with a fresh token right after
    shutdown: StdMutex<CancellationToken>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
        if let Some(link) = self.link.get_mut() {
            link.stop();
        }
    }
}

/// Handle to a client session
///
/// Cheap to clone; all clones drive the same session. Operations that must
/// not block a caller can be spawned onto the runtime.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    /// Create a disconnected session
    ///
    /// Must be called from within a tokio runtime. The receiver yields
    /// navigation requests and alerts for the presentation layer.
    pub fn new(config: SessionConfig) -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(Inner {
            config,
            store: SessionStore::new(),
            notifier: Notifier::new(notify_tx),
            link: RwLock::new(None),
            requests: Mutex::new(()),
            generation: AtomicU64::new(0),
            failures: failures_tx,
            shutdown: StdMutex::new(CancellationToken::new()),
        });
        tokio::spawn(supervise(Arc::downgrade(&inner), failures_rx));

        (Self { inner }, notify_rx)
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        self.inner.store.snapshot()
    }

    /// Watch the session state for changes
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.store.subscribe()
    }

    /// Connect to a server and register `nickname`
    ///
    /// If the server remembers the nickname from an unfinished game, the
    /// session lands straight back in that room.
    pub async fn connect(&self, address: &str, port: u16, nickname: &str) -> Result<()> {
        validate_nickname(nickname)?;
        let inner = &self.inner;
        let _guard = inner.requests.lock().await;

        let status = inner.store.read(|s| s.connection);
        if status != ConnectionStatus::Disconnected || inner.link.read().await.is_some() {
            return Err(Error::IllegalState(format!(
                "cannot connect while {:?}",
                status
            )));
        }

        let endpoint = ServerEndpoint {
            address: address.to_string(),
            port,
        };
        let shutdown = inner.shutdown_token();
        inner
            .store
            .update(|s| s.connection = ConnectionStatus::Connecting);

        let (link, handshake) = match inner.establish(&endpoint, nickname).await {
            Ok(established) => established,
            Err(e) => {
                warn!(server = %endpoint, error = %e, "Connect failed");
                inner
                    .store
                    .update(|s| s.connection = ConnectionStatus::Disconnected);
                return Err(e);
            }
        };

        info!(server = %endpoint, nickname, "Connected");
        let nickname = nickname.to_string();
        let installed = inner
            .install(link, &handshake, &shutdown, |s| {
                s.server = Some(endpoint);
                s.player.nickname = nickname;
            })
            .await;
        if !installed {
            return Err(Error::IllegalState("disconnected while connecting".into()));
        }

        inner.notifier.navigate(handshake.scene());
        Ok(())
    }

    /// Open a new room; its code ends up in the session state
    pub async fn create_room(&self) -> Result<()> {
        let response = self
            .request(
                Message::room_create(),
                &[MessageType::RoomCreated, MessageType::LimitRooms],
            )
            .await?;

        match response.kind() {
            MessageType::RoomCreated => {
                let code = response.param(0).to_string();
                info!(room = %code, "Room created");
                self.inner.store.update(|s| {
                    s.room_code = code;
                    s.opponent.responding = true;
                });
                Ok(())
            }
            _ => {
                let limit = parse_limit(&response)?;
                info!(limit, "Room limit reached");
                Err(Error::LimitReached(limit))
            }
        }
    }

    /// Join an existing room by its code
    pub async fn join_room(&self, code: &str) -> Result<()> {
        if code.len() != ROOM_CODE_LENGTH || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidArgument(format!(
                "room code must be {} digits",
                ROOM_CODE_LENGTH
            )));
        }

        self.inner.ensure_controls()?;
        self.inner.store.update(|s| s.opponent.responding = true);
        let response = self
            .request(
                Message::room_join(code),
                &[
                    MessageType::Ack,
                    MessageType::RoomFull,
                    MessageType::RoomNotExists,
                ],
            )
            .await?;

        match response.kind() {
            MessageType::Ack => {
                info!(room = code, "Joined room");
                self.inner.store.update(|s| s.room_code = code.to_string());
                Ok(())
            }
            MessageType::RoomFull => Err(Error::LimitReached(ROOM_CAPACITY)),
            _ => Err(Error::NotFound),
        }
    }

    pub async fn leave_room(&self) -> Result<()> {
        self.request(Message::room_leave(), &[MessageType::Ack])
            .await?;
        info!("Left room");
        self.inner.store.update(SessionState::leave_room);
        Ok(())
    }

    /// Place the fleet
    ///
    /// The layout is checked locally first; nothing is sent for an illegal
    /// one.
    pub async fn submit_board(&self, board: &Board) -> Result<()> {
        board.validate_fleet()?;
        let request = Message::board_ready(&board.ship_cells())?;

        let response = self
            .request(request, &[MessageType::Ack, MessageType::BoardIllegal])
            .await?;

        match response.kind() {
            MessageType::Ack => {
                info!("Board accepted");
                let board = board.clone();
                self.inner.store.update(|s| {
                    s.player.board = board;
                    s.player.board_ready = true;
                });
                Ok(())
            }
            _ => Err(Error::Rejected("board layout rejected".into())),
        }
    }

    /// Fire at the opponent's board
    pub async fn submit_turn(&self, row: usize, col: usize) -> Result<()> {
        let cell = Cell::new(row, col)?;
        if self.inner.store.read(|s| s.opponent.board.get(cell).is_resolved()) {
            return Err(Error::InvalidArgument(format!(
                "cell {} was already played",
                cell
            )));
        }

        let response = self
            .request(
                Message::turn(cell),
                &[
                    MessageType::TurnResult,
                    MessageType::TurnIllegal,
                    MessageType::TurnNotYou,
                ],
            )
            .await?;

        match response.kind() {
            MessageType::TurnResult => {
                let result: ShotResult = response.param(1).parse()?;
                debug!(cell = %cell, ?result, "Turn result");
                self.inner
                    .store
                    .update(|s| s.opponent.board.set(cell, result.field()));
                Ok(())
            }
            MessageType::TurnIllegal => Err(Error::Rejected(format!("turn {} rejected", cell))),
            _ => Err(Error::IllegalState("not your turn".into())),
        }
    }

    /// Close the connection and forget the session
    ///
    /// Also aborts a reconnect in progress. No alert is emitted.
    pub async fn disconnect(&self) {
        info!("Disconnecting");
        let inner = &self.inner;
        let old = {
            let mut token = inner.shutdown.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *token, CancellationToken::new())
        };
        old.cancel();

        let link = inner.link.write().await.take();
        if let Some(link) = link {
            link.close().await;
        }
        inner.store.update(SessionState::reset);
    }

    /// One request/response exchange on the current link
    async fn request(&self, request: Message, accepted: &[MessageType]) -> Result<Message> {
        let inner = &self.inner;
        inner.ensure_controls()?;
        let guard = inner.requests.lock().await;
        let (generation, transport, dispatcher) = inner.current_link().await?;

        match inner.exchange(&transport, &dispatcher, &request, accepted).await {
            Ok(response) => Ok(response),
            Err(Failed { error, link_failed }) => {
                drop(guard);
                if link_failed {
                    warn!(request = %request.kind(), error = %error, "Request failed with the link");
                    // Own task: recovery must finish even if this caller goes away
                    let recovery = tokio::spawn(Arc::clone(inner).recover(generation, error.to_string()));
                    let recovered = recovery.await.unwrap_or(false);
                    if recovered && matches!(error, Error::Timeout) {
                        inner.notifier.alert(Alert::RequestTimedOut);
                    }
                }
                Err(error)
            }
        }
    }
}

impl Inner {
    fn shutdown_token(&self) -> CancellationToken {
        self.shutdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn ensure_controls(&self) -> Result<()> {
        if self.store.read(|s| s.controls_disabled) {
            return Err(Error::IllegalState("reconnecting".into()));
        }
        Ok(())
    }

    async fn current_link(&self) -> Result<(u64, Transport, Dispatcher)> {
        self.ensure_controls()?;
        self.link
            .read()
            .await
            .as_ref()
            .map(|l| (l.generation, l.transport.clone(), l.dispatcher.clone()))
            .ok_or(Error::NotConnected)
    }

    /// Open a connection and complete the handshake
    ///
    /// On failure nothing is left running.
    async fn establish(&self, endpoint: &ServerEndpoint, nickname: &str) -> Result<(Link, Handshake)> {
        let (transport, reader) =
            Transport::open(&endpoint.address, endpoint.port, self.config.connect_timeout()).await?;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let dispatcher = Dispatcher::new(generation);
        let (queue_tx, queue) = mpsc::unbounded_channel();
        let welcome = dispatcher.expect(&[MessageType::Welcome, MessageType::LimitClients]);
        dispatcher.spawn(
            reader,
            self.config.idle_timeout(),
            queue_tx,
            self.failures.clone(),
            self.store.clone(),
        );

        match self.handshake(&transport, &dispatcher, welcome, nickname).await {
            Ok(handshake) => Ok((
                Link {
                    generation,
                    transport,
                    dispatcher,
                    queue: Some(queue),
                    processor: None,
                    liveness: None,
                },
                handshake,
            )),
            Err(e) => {
                dispatcher.stop();
                transport.shutdown().await;
                Err(e)
            }
        }
    }

    async fn handshake(
        &self,
        transport: &Transport,
        dispatcher: &Dispatcher,
        welcome: oneshot::Receiver<Result<Message>>,
        nickname: &str,
    ) -> Result<Handshake> {
        let welcome = self.await_response(dispatcher, welcome).await?;
        if welcome.kind() == MessageType::LimitClients {
            let limit = parse_limit(&welcome)?;
            info!(limit, "Server is full");
            return Err(Error::LimitReached(limit));
        }
        debug!(server = welcome.param(0), "Welcome received");

        let response = self
            .exchange(
                transport,
                dispatcher,
                &Message::nickname_set(nickname),
                &[
                    MessageType::Ack,
                    MessageType::NicknameExists,
                    MessageType::Rejoin,
                ],
            )
            .await?;

        match response.kind() {
            MessageType::Ack => Ok(Handshake::Fresh),
            MessageType::Rejoin => {
                let room_code = response.param(1).to_string();
                info!(room = %room_code, "Rejoining room");
                Ok(Handshake::Rejoined { room_code })
            }
            _ => Err(Error::AlreadyExists),
        }
    }

    /// Arm, send, wait
    async fn exchange(
        &self,
        transport: &Transport,
        dispatcher: &Dispatcher,
        request: &Message,
        accepted: &[MessageType],
    ) -> std::result::Result<Message, Failed> {
        let response = dispatcher.expect(accepted);
        if let Err(error) = transport.send_frame(request).await {
            dispatcher.clear_expectation();
            return Err(Failed {
                error,
                link_failed: true,
            });
        }
        self.await_response(dispatcher, response).await
    }

    async fn await_response(
        &self,
        dispatcher: &Dispatcher,
        response: oneshot::Receiver<Result<Message>>,
    ) -> std::result::Result<Message, Failed> {
        match tokio::time::timeout(self.config.response_timeout(), response).await {
            Ok(Ok(Ok(message))) => Ok(message),
            Ok(Ok(Err(error))) => Err(Failed {
                error,
                link_failed: true,
            }),
            // Dispatcher stopped under us
            Ok(Err(_)) => Err(Failed {
                error: Error::ConnectionClosed,
                link_failed: true,
            }),
            Err(_) => {
                dispatcher.clear_expectation();
                warn!("No response in time");
                Err(Failed {
                    error: Error::Timeout,
                    link_failed: false,
                })
            }
        }
    }

    /// Make `link` the current one and start its workers
    ///
    /// Returns false (and closes the link) if the session was shut down in
    /// the meantime.
    async fn install(
        &self,
        mut link: Link,
        handshake: &Handshake,
        shutdown: &CancellationToken,
        prepare: impl FnOnce(&mut SessionState),
    ) -> bool {
        let mut current = self.link.write().await;
        if shutdown.is_cancelled() {
            drop(current);
            link.close().await;
            return false;
        }

        self.store.update(|s| {
            prepare(s);
            s.connection = ConnectionStatus::Connected;
            s.controls_disabled = false;
            s.player.responding = true;
            s.opponent.responding = true;
            if let Handshake::Rejoined { room_code } = handshake {
                s.room_code = room_code.clone();
            }
        });
        link.start_workers(&self.store, &self.notifier, &self.config);
        *current = Some(link);
        true
    }

    /// Replace a failed link
    ///
    /// Runs at most once per generation: a caller reporting a link that is
    /// no longer current returns right away. Returns whether the session is
    /// connected afterwards.
    async fn recover(self: Arc<Self>, generation: u64, cause: String) -> bool {
        let _guard = self.requests.lock().await;
        let shutdown = self.shutdown_token();

        {
            let mut current = self.link.write().await;
            match current.as_ref() {
                Some(link) if link.generation == generation => {}
                other => {
                    debug!(generation, "Failure already handled");
                    return other.is_some();
                }
            }
            if let Some(old) = current.take() {
                old.stop();
            }
        }

        let (server, nickname) = self
            .store
            .read(|s| (s.server.clone(), s.player.nickname.clone()));
        let Some(server) = server else {
            self.store.update(SessionState::reset);
            return false;
        };

        warn!(server = %server, cause = %cause, "Connection lost, reconnecting");
        self.store.update(|s| {
            s.connection = ConnectionStatus::Reconnecting;
            s.controls_disabled = true;
            s.player.responding = false;
        });

        let deadline = Instant::now() + self.config.reconnect_deadline();
        let mut attempt = 0u32;
        while Instant::now() < deadline && !shutdown.is_cancelled() {
            attempt += 1;
            match self.establish(&server, &nickname).await {
                Ok((link, handshake)) => {
                    if !self.install(link, &handshake, &shutdown, |_| {}).await {
                        break;
                    }
                    info!(attempt, "Reconnected");
                    self.notifier.navigate(handshake.scene());
                    return true;
                }
                Err(e) => {
                    debug!(attempt, error = %e, "Reconnect attempt failed");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(self.config.reconnect_backoff()) => {}
                    }
                }
            }
        }

        if shutdown.is_cancelled() {
            // disconnect() already reset the session
            debug!("Reconnect aborted");
            return false;
        }

        error!(attempts = attempt, "Could not reconnect, giving up");
        self.store.update(SessionState::reset);
        self.notifier.navigate(Scene::Index);
        self.notifier.alert(Alert::ConnectionLost);
        false
    }
}

/// Runs recovery for links that died with no request in flight
async fn supervise(inner: Weak<Inner>, mut failures: mpsc::UnboundedReceiver<LinkFailure>) {
    while let Some(failure) = failures.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner
            .recover(failure.generation, failure.error.to_string())
            .await;
    }
    debug!("Supervisor stopped");
}

fn validate_nickname(nickname: &str) -> Result<()> {
    if nickname.trim().is_empty() {
        return Err(Error::InvalidArgument("nickname must not be empty".into()));
    }
    if nickname.contains('\n') {
        return Err(Error::InvalidArgument(
            "nickname must be a single line".into(),
        ));
    }
    Ok(())
}

fn parse_limit(message: &Message) -> Result<usize> {
    message.param(0).parse().map_err(|_| {
        Error::Protocol(format!(
            "{} carries a non-numeric limit '{}'",
            message.kind(),
            message.param(0)
        ))
    })
}
