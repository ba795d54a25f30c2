//! Data models for Battleship

mod board;
mod session;

pub use board::*;
pub use session::*;
