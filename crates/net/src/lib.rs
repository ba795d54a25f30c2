//! Battleship Network Library
//!
//! Client side of the Battleship protocol over TCP.
//!
//! # Architecture
//!
//! - **Protocol**: One line of text per message, `TYPE|param|param`
//! - **Transport**: Shared frame writer plus a single frame reader
//! - **Dispatcher**: Reads every frame; responses go to the waiting request,
//!   everything else to the event queue
//! - **EventProcessor**: Applies server events to the session state in order
//! - **LivenessProbe**: Periodic KEEP_ALIVE
//! - **Session**: Requests, connection lifecycle and automatic reconnect
//!
//! # Usage
//!
//! ```ignore
//! let (session, mut notifications) = Session::new(SessionConfig::default());
//! session.connect("127.0.0.1", DEFAULT_PORT, "standa").await?;
//! session.create_room().await?;
//!
//! while let Some(notification) = notifications.recv().await {
//!     match notification {
//!         Notification::Navigate(scene) => { /* switch screens */ }
//!         Notification::Alert(alert) => { /* tell the user */ }
//!     }
//! }
//! ```

mod dispatcher;
pub mod error;
pub mod events;
mod frame;
mod liveness;
pub mod notify;
pub mod protocol;
mod session;
mod store;
#[cfg(test)]
mod testing;
mod transport;
mod worker;

pub use error::{Error, ErrorKind, Result};
pub use events::{Event, EventProcessor, ShotResult, Side, Silence};
pub use liveness::LivenessProbe;
pub use notify::{Alert, Notification, Scene};
pub use protocol::{Message, MessageType};
pub use session::{Session, ROOM_CODE_LENGTH};
pub use store::SessionStore;
pub use transport::{FrameReader, Transport};

/// Default port of Battleship servers
pub const DEFAULT_PORT: u16 = 50000;
