//! Network protocol message types
//!
//! A message is a type name followed by zero or more `|`-prefixed string
//! parameters, one message per line:
//!
//! ```text
//! TURN_RESULT|34|HIT\n
//! ```
//!
//! `\`, `|` and line-feed inside a parameter are escaped with `\`. Every type
//! has a fixed parameter count and anything else is a protocol error.

use std::fmt;

use bship_core::{Cell, BOARD_FIELDS, FLEET_CELLS};

use crate::error::{Error, Result};

/// Escape byte
pub const ESCAPE: u8 = b'\\';
/// Separates the type name and parameters
pub const PARAM_DELIMITER: u8 = b'|';
/// Terminates a frame
pub const FRAME_DELIMITER: u8 = b'\n';

/// Message types known to both ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Welcome,
    ConnTerm,
    KeepAlive,
    Ack,
    LimitClients,
    NicknameSet,
    NicknameExists,
    RoomCreate,
    RoomCreated,
    LimitRooms,
    RoomJoin,
    RoomFull,
    RoomNotExists,
    RoomLeave,
    BoardReady,
    BoardIllegal,
    OpponentNicknameSet,
    OpponentBoardReady,
    OpponentRoomLeave,
    GameBegin,
    TurnSet,
    OpponentNoResponse,
    Turn,
    TurnResult,
    TurnIllegal,
    TurnNotYou,
    OpponentTurn,
    GameEnd,
    Rejoin,
    OpponentRejoin,
    BoardState,
    InvalidateField,
}

impl MessageType {
    pub const ALL: [MessageType; 32] = [
        MessageType::Welcome,
        MessageType::ConnTerm,
        MessageType::KeepAlive,
        MessageType::Ack,
        MessageType::LimitClients,
        MessageType::NicknameSet,
        MessageType::NicknameExists,
        MessageType::RoomCreate,
        MessageType::RoomCreated,
        MessageType::LimitRooms,
        MessageType::RoomJoin,
        MessageType::RoomFull,
        MessageType::RoomNotExists,
        MessageType::RoomLeave,
        MessageType::BoardReady,
        MessageType::BoardIllegal,
        MessageType::OpponentNicknameSet,
        MessageType::OpponentBoardReady,
        MessageType::OpponentRoomLeave,
        MessageType::GameBegin,
        MessageType::TurnSet,
        MessageType::OpponentNoResponse,
        MessageType::Turn,
        MessageType::TurnResult,
        MessageType::TurnIllegal,
        MessageType::TurnNotYou,
        MessageType::OpponentTurn,
        MessageType::GameEnd,
        MessageType::Rejoin,
        MessageType::OpponentRejoin,
        MessageType::BoardState,
        MessageType::InvalidateField,
    ];

    /// Name on the wire
    pub fn name(self) -> &'static str {
        match self {
            MessageType::Welcome => "WELCOME",
            MessageType::ConnTerm => "CONN_TERM",
            MessageType::KeepAlive => "KEEP_ALIVE",
            MessageType::Ack => "ACK",
            MessageType::LimitClients => "LIMIT_CLIENTS",
            MessageType::NicknameSet => "NICKNAME_SET",
            MessageType::NicknameExists => "NICKNAME_EXISTS",
            MessageType::RoomCreate => "ROOM_CREATE",
            MessageType::RoomCreated => "ROOM_CREATED",
            MessageType::LimitRooms => "LIMIT_ROOMS",
            MessageType::RoomJoin => "ROOM_JOIN",
            MessageType::RoomFull => "ROOM_FULL",
            MessageType::RoomNotExists => "ROOM_NOT_EXISTS",
            MessageType::RoomLeave => "ROOM_LEAVE",
            MessageType::BoardReady => "BOARD_READY",
            MessageType::BoardIllegal => "BOARD_ILLEGAL",
            MessageType::OpponentNicknameSet => "OPPONENT_NICKNAME_SET",
            MessageType::OpponentBoardReady => "OPPONENT_BOARD_READY",
            MessageType::OpponentRoomLeave => "OPPONENT_ROOM_LEAVE",
            MessageType::GameBegin => "GAME_BEGIN",
            MessageType::TurnSet => "TURN_SET",
            MessageType::OpponentNoResponse => "OPPONENT_NO_RESPONSE",
            MessageType::Turn => "TURN",
            MessageType::TurnResult => "TURN_RESULT",
            MessageType::TurnIllegal => "TURN_ILLEGAL",
            MessageType::TurnNotYou => "TURN_NOT_YOU",
            MessageType::OpponentTurn => "OPPONENT_TURN",
            MessageType::GameEnd => "GAME_END",
            MessageType::Rejoin => "REJOIN",
            MessageType::OpponentRejoin => "OPPONENT_REJOIN",
            MessageType::BoardState => "BOARD_STATE",
            MessageType::InvalidateField => "INVALIDATE_FIELD",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.name() == name)
    }

    /// Number of parameters a message of this type carries
    pub fn param_count(self) -> usize {
        match self {
            MessageType::Welcome => 4,
            MessageType::LimitClients
            | MessageType::NicknameSet
            | MessageType::RoomCreated
            | MessageType::LimitRooms
            | MessageType::RoomJoin
            | MessageType::OpponentNicknameSet
            | MessageType::GameBegin
            | MessageType::TurnSet
            | MessageType::OpponentNoResponse
            | MessageType::Turn
            | MessageType::GameEnd => 1,
            MessageType::TurnResult
            | MessageType::OpponentTurn
            | MessageType::Rejoin
            | MessageType::InvalidateField => 2,
            MessageType::BoardReady => FLEET_CELLS,
            MessageType::BoardState => 1 + BOARD_FIELDS,
            MessageType::ConnTerm
            | MessageType::KeepAlive
            | MessageType::Ack
            | MessageType::NicknameExists
            | MessageType::RoomCreate
            | MessageType::RoomFull
            | MessageType::RoomNotExists
            | MessageType::RoomLeave
            | MessageType::BoardIllegal
            | MessageType::OpponentBoardReady
            | MessageType::OpponentRoomLeave
            | MessageType::TurnIllegal
            | MessageType::TurnNotYou
            | MessageType::OpponentRejoin => 0,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single protocol message
///
/// The parameter count always matches [`MessageType::param_count`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    kind: MessageType,
    params: Vec<String>,
}

impl Message {
    /// Create a message, checking the parameter count
    pub fn new<I, S>(kind: MessageType, params: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let params: Vec<String> = params.into_iter().map(Into::into).collect();
        if params.len() != kind.param_count() {
            return Err(Error::Protocol(format!(
                "{} takes {} parameter(s), got {}",
                kind,
                kind.param_count(),
                params.len()
            )));
        }
        Ok(Self { kind, params })
    }

    pub fn keep_alive() -> Self {
        Self::bare(MessageType::KeepAlive)
    }

    pub fn nickname_set(nickname: &str) -> Self {
        Self::single(MessageType::NicknameSet, nickname)
    }

    pub fn room_create() -> Self {
        Self::bare(MessageType::RoomCreate)
    }

    pub fn room_join(code: &str) -> Self {
        Self::single(MessageType::RoomJoin, code)
    }

    pub fn room_leave() -> Self {
        Self::bare(MessageType::RoomLeave)
    }

    /// Ship positions of a complete fleet
    pub fn board_ready(ships: &[Cell]) -> Result<Self> {
        Self::new(MessageType::BoardReady, ships.iter().map(|c| c.to_string()))
    }

    pub fn turn(cell: Cell) -> Self {
        Self::single(MessageType::Turn, cell.to_string())
    }

    fn bare(kind: MessageType) -> Self {
        debug_assert_eq!(kind.param_count(), 0);
        Self {
            kind,
            params: Vec::new(),
        }
    }

    fn single(kind: MessageType, param: impl Into<String>) -> Self {
        debug_assert_eq!(kind.param_count(), 1);
        Self {
            kind,
            params: vec![param.into()],
        }
    }

    pub fn kind(&self) -> MessageType {
        self.kind
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Positional parameter; `index` must be below the type's parameter count
    pub fn param(&self, index: usize) -> &str {
        &self.params[index]
    }

    /// Encode as a complete frame, terminator included
    pub fn encode(&self) -> Vec<u8> {
        let name = self.kind.name();
        let mut out = Vec::with_capacity(
            name.len() + self.params.iter().map(|p| p.len() + 2).sum::<usize>() + 1,
        );
        out.extend_from_slice(name.as_bytes());
        for param in &self.params {
            out.push(PARAM_DELIMITER);
            for &b in param.as_bytes() {
                if b == ESCAPE || b == PARAM_DELIMITER || b == FRAME_DELIMITER {
                    out.push(ESCAPE);
                }
                out.push(b);
            }
        }
        out.push(FRAME_DELIMITER);
        out
    }

    /// Decode the content of one frame (terminator already stripped)
    pub fn decode(frame: &[u8]) -> Result<Self> {
        let mut tokens: Vec<Vec<u8>> = vec![Vec::new()];
        let mut escape = false;
        for &b in frame {
            if !escape && b == ESCAPE {
                escape = true;
                continue;
            }
            if !escape && b == PARAM_DELIMITER {
                tokens.push(Vec::new());
                continue;
            }
            escape = false;
            if let Some(token) = tokens.last_mut() {
                token.push(b);
            }
        }
        if escape {
            return Err(Error::Protocol("Frame ends inside an escape".into()));
        }

        let mut tokens = tokens.into_iter().map(|t| {
            String::from_utf8(t).map_err(|_| Error::Protocol("Frame is not valid UTF-8".into()))
        });
        let name = tokens.next().transpose()?.unwrap_or_default();
        let kind = MessageType::from_name(&name)
            .ok_or_else(|| Error::Protocol(format!("Unknown message type '{}'", name)))?;
        let params = tokens.collect::<Result<Vec<String>>>()?;

        Self::new(kind, params)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind.name())?;
        for param in &self.params {
            write!(f, "|{}", param)?;
        }
        Ok(())
    }
}
