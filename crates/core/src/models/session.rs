//! Session state model
//!
//! Plain data describing what the client currently knows about its session.
//! The network layer owns the live copy and hands out snapshots of it.

use std::fmt;

use chrono::{DateTime, Utc};

use super::board::Board;

/// Connection lifecycle as seen by the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Connection lost, reconnect attempts in progress
    Reconnecting,
}

/// Server the session is (or was last) connected to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEndpoint {
    pub address: String,
    pub port: u16,
}

impl fmt::Display for ServerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Per-side state (the local player or the opponent)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerState {
    pub nickname: String,
    pub board: Board,
    pub board_ready: bool,
    pub on_turn: bool,
    /// False while the server reports this side as silent
    pub responding: bool,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            nickname: String::new(),
            board: Board::new(),
            board_ready: false,
            on_turn: false,
            responding: true,
        }
    }
}

impl PlayerState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn reset_except_nickname(&mut self) {
        let nickname = std::mem::take(&mut self.nickname);
        *self = Self {
            nickname,
            ..Self::default()
        };
    }
}

/// Snapshot of the whole session
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionState {
    pub connection: ConnectionStatus,
    pub server: Option<ServerEndpoint>,
    pub room_code: String,
    /// User-triggered operations are refused while set
    pub controls_disabled: bool,
    pub in_game: bool,
    /// When the last frame (heartbeats included) arrived
    pub last_activity: Option<DateTime<Utc>>,
    pub player: PlayerState,
    pub opponent: PlayerState,
}

impl SessionState {
    pub fn nickname(&self) -> &str {
        &self.player.nickname
    }

    pub fn in_room(&self) -> bool {
        !self.room_code.is_empty()
    }

    /// Drop everything tied to the current room, keeping our own nickname
    pub fn leave_room(&mut self) {
        self.room_code.clear();
        self.in_game = false;
        self.player.reset_except_nickname();
        self.opponent.reset();
    }

    /// Clear both boards after a finished game, staying in the room
    pub fn end_game(&mut self) {
        self.in_game = false;
        self.player.reset_except_nickname();
        self.opponent.reset_except_nickname();
    }

    /// Back to a fresh, disconnected session
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::board::{Cell, Field};

    fn populated() -> SessionState {
        let mut state = SessionState {
            connection: ConnectionStatus::Connected,
            room_code: "1234".to_string(),
            in_game: true,
            ..Default::default()
        };
        state.player.nickname = "alice".to_string();
        state.player.board_ready = true;
        state.player.board.set(Cell::new(1, 1).unwrap(), Field::Ship);
        state.opponent.nickname = "bob".to_string();
        state.opponent.responding = false;
        state
    }

    #[test]
    fn test_leave_room_keeps_nickname() {
        let mut state = populated();
        state.leave_room();

        assert!(!state.in_room());
        assert_eq!(state.nickname(), "alice");
        assert!(state.player.board.is_empty());
        assert!(!state.player.board_ready);
        assert_eq!(state.opponent, PlayerState::default());
        assert_eq!(state.connection, ConnectionStatus::Connected);
    }

    #[test]
    fn test_end_game_keeps_room_and_nicknames() {
        let mut state = populated();
        state.end_game();

        assert_eq!(state.room_code, "1234");
        assert!(!state.in_game);
        assert_eq!(state.opponent.nickname, "bob");
        assert!(state.opponent.responding);
        assert!(state.player.board.is_empty());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut state = populated();
        state.reset();
        assert_eq!(state, SessionState::default());
        assert_eq!(state.connection, ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_endpoint_display() {
        let endpoint = ServerEndpoint {
            address: "10.0.1.62".to_string(),
            port: 50000,
        };
        assert_eq!(endpoint.to_string(), "10.0.1.62:50000");
    }
}
