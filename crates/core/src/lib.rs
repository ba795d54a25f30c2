//! Battleship Core Library
//!
//! Board model, fleet rules, session state snapshots and configuration
//! shared by the network layer and its front ends.

pub mod config;
pub mod error;
pub mod models;

pub use config::{ClientConfig, ServerConfig, SessionConfig};
pub use error::{Error, Result};
pub use models::*;
