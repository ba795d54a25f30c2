//! Notifications for the presentation layer
//!
//! Fire-and-forget: the session never waits on whoever consumes these.

use tokio::sync::mpsc;
use tracing::trace;

/// Screen the presentation layer should show
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scene {
    /// Connect screen
    Index,
    /// Create or join a room
    Lobby,
    /// Inside a room, before or during a game
    Room,
}

/// Something the user should be told about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alert {
    OpponentLeft,
    OpponentNotResponding,
    GameEnd { won: bool },
    /// A request got no answer and the connection was restored
    RequestTimedOut,
    /// Reconnecting gave up; the session is back at the start
    ConnectionLost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    Navigate(Scene),
    Alert(Alert),
}

#[derive(Debug, Clone)]
pub(crate) struct Notifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl Notifier {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Notification>) -> Self {
        Self { tx }
    }

    pub(crate) fn navigate(&self, scene: Scene) {
        self.emit(Notification::Navigate(scene));
    }

    pub(crate) fn alert(&self, alert: Alert) {
        self.emit(Notification::Alert(alert));
    }

    fn emit(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            trace!(?notification, "Nobody listening for notifications");
        }
    }
}
