//! Unsolicited server events
//!
//! Messages the dispatcher did not hand to a pending request end up here.
//! Each one is parsed into an [`Event`] and applied to the session state by
//! a single task, so events are applied in the order they arrived.

use std::str::FromStr;

use bship_core::{Board, Cell, Field, PlayerState, SessionState};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::notify::{Alert, Notifier, Scene};
use crate::protocol::{Message, MessageType};
use crate::store::SessionStore;
use crate::worker::Worker;

/// Which side of the table a message is about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    You,
    Opponent,
}

impl FromStr for Side {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "YOU" => Ok(Side::You),
            "OPPONENT" => Ok(Side::Opponent),
            _ => Err(Error::Protocol(format!("Unknown side '{}'", s))),
        }
    }
}

/// Outcome of a shot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShotResult {
    Hit,
    Miss,
}

impl ShotResult {
    pub fn field(self) -> Field {
        match self {
            ShotResult::Hit => Field::Hit,
            ShotResult::Miss => Field::Miss,
        }
    }
}

impl FromStr for ShotResult {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "HIT" => Ok(ShotResult::Hit),
            "MISS" => Ok(ShotResult::Miss),
            _ => Err(Error::Protocol(format!("Unknown shot result '{}'", s))),
        }
    }
}

/// How long the opponent has been silent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Silence {
    /// Briefly; they may still come back
    Short,
    /// For good; the room is gone
    Long,
}

impl FromStr for Silence {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "SHORT" => Ok(Silence::Short),
            "LONG" => Ok(Silence::Long),
            _ => Err(Error::Protocol(format!("Unknown silence '{}'", s))),
        }
    }
}

/// A parsed unsolicited message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Server is about to close the connection
    ConnectionTerminated,
    OpponentNickname(String),
    OpponentBoardReady,
    OpponentLeft,
    GameBegin { opponent: String },
    TurnSet(Side),
    OpponentNoResponse(Silence),
    /// The opponent shot at our board
    OpponentTurn { cell: Cell, result: ShotResult },
    GameEnd { winner: Side },
    OpponentRejoined,
    /// Full board contents, sent after a rejoin
    BoardState { side: Side, board: Board },
    InvalidateField { side: Side, cell: Cell },
}

fn parse_cell(s: &str) -> Result<Cell> {
    s.parse::<Cell>()
        .map_err(|e| Error::Protocol(e.to_string()))
}

impl TryFrom<&Message> for Event {
    type Error = Error;

    fn try_from(message: &Message) -> Result<Self> {
        let event = match message.kind() {
            MessageType::ConnTerm => Event::ConnectionTerminated,
            MessageType::OpponentNicknameSet => {
                Event::OpponentNickname(message.param(0).to_string())
            }
            MessageType::OpponentBoardReady => Event::OpponentBoardReady,
            MessageType::OpponentRoomLeave => Event::OpponentLeft,
            MessageType::GameBegin => Event::GameBegin {
                opponent: message.param(0).to_string(),
            },
            MessageType::TurnSet => Event::TurnSet(message.param(0).parse()?),
            MessageType::OpponentNoResponse => {
                Event::OpponentNoResponse(message.param(0).parse()?)
            }
            MessageType::OpponentTurn => Event::OpponentTurn {
                cell: parse_cell(message.param(0))?,
                result: message.param(1).parse()?,
            },
            MessageType::GameEnd => Event::GameEnd {
                winner: message.param(0).parse()?,
            },
            MessageType::OpponentRejoin => Event::OpponentRejoined,
            MessageType::BoardState => {
                let fields = message.params()[1..]
                    .iter()
                    .map(|p| p.parse::<Field>())
                    .collect::<bship_core::Result<Vec<Field>>>()
                    .map_err(|e| Error::Protocol(e.to_string()))?;
                Event::BoardState {
                    side: message.param(0).parse()?,
                    board: Board::from_fields(&fields)
                        .map_err(|e| Error::Protocol(e.to_string()))?,
                }
            }
            MessageType::InvalidateField => Event::InvalidateField {
                side: message.param(0).parse()?,
                cell: parse_cell(message.param(1))?,
            },
            other => {
                return Err(Error::Protocol(format!("{} is not an event", other)));
            }
        };
        Ok(event)
    }
}

fn side_mut(state: &mut SessionState, side: Side) -> &mut PlayerState {
    match side {
        Side::You => &mut state.player,
        Side::Opponent => &mut state.opponent,
    }
}

/// Apply one event to the session state
pub(crate) fn apply(event: Event, store: &SessionStore, notifier: &Notifier) {
    match event {
        Event::ConnectionTerminated => {
            info!("Server is terminating the connection");
        }
        Event::OpponentNickname(nickname) => {
            debug!(opponent = %nickname, "Opponent joined");
            store.update(|s| s.opponent.nickname = nickname);
        }
        Event::OpponentBoardReady => {
            store.update(|s| s.opponent.board_ready = true);
        }
        Event::OpponentLeft => {
            info!("Opponent left the room");
            store.update(SessionState::leave_room);
            notifier.alert(Alert::OpponentLeft);
            notifier.navigate(Scene::Lobby);
        }
        Event::GameBegin { opponent } => {
            info!(opponent = %opponent, "Game begins");
            store.update(|s| s.in_game = true);
        }
        Event::TurnSet(side) => {
            store.update(|s| {
                s.player.on_turn = side == Side::You;
                s.opponent.on_turn = side == Side::Opponent;
            });
        }
        Event::OpponentNoResponse(Silence::Short) => {
            warn!("Opponent is not responding");
            store.update(|s| s.opponent.responding = false);
        }
        Event::OpponentNoResponse(Silence::Long) => {
            warn!("Opponent gone for good, room closed");
            store.update(SessionState::leave_room);
            notifier.alert(Alert::OpponentNotResponding);
            notifier.navigate(Scene::Lobby);
        }
        Event::OpponentTurn { cell, result } => {
            debug!(cell = %cell, ?result, "Opponent fired");
            store.update(|s| s.player.board.set(cell, result.field()));
        }
        Event::GameEnd { winner } => {
            let won = winner == Side::You;
            info!(won, "Game over");
            store.update(SessionState::end_game);
            notifier.alert(Alert::GameEnd { won });
            notifier.navigate(Scene::Room);
        }
        Event::OpponentRejoined => {
            info!("Opponent is back");
            store.update(|s| s.opponent.responding = true);
        }
        Event::BoardState { side, board } => {
            store.update(|s| {
                let player = side_mut(s, side);
                player.board_ready = true;
                player.board = board;
            });
        }
        Event::InvalidateField { side, cell } => {
            store.update(|s| side_mut(s, side).board.set(cell, Field::Invalidated));
        }
    }
}

/// Ordered consumer of the event queue
pub struct EventProcessor {
    worker: Worker,
}

impl EventProcessor {
    pub(crate) fn start(
        mut queue: mpsc::UnboundedReceiver<Message>,
        store: SessionStore,
        notifier: Notifier,
    ) -> Self {
        let worker = Worker::spawn(move |cancel| async move {
            loop {
                let message = tokio::select! {
                    _ = cancel.cancelled() => break,
                    message = queue.recv() => match message {
                        Some(message) => message,
                        None => break,
                    },
                };

                match Event::try_from(&message) {
                    Ok(event) => apply(event, &store, &notifier),
                    Err(e) => warn!(message = %message, error = %e, "Dropping event"),
                }
            }
            debug!("Event processor stopped");
        });
        Self { worker }
    }

    pub fn stop(&self) {
        self.worker.stop();
    }

    pub fn is_running(&self) -> bool {
        !self.worker.is_finished()
    }
}
