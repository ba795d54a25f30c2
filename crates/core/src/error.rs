//! Error types for Battleship Core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid board: {0}")]
    InvalidBoard(String),

    #[error("Invalid cell: {0}")]
    InvalidCell(String),

    #[error("Invalid field: {0}")]
    InvalidField(String),

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
