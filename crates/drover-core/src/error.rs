//! Error types for the drover control plane.

use thiserror::Error;

/// Main error type for drover operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the underlying channel.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Ctrl-D on an empty line, or a command handler asking the
    /// dispatcher to exit.
    #[error("end of input")]
    EndOfInput,

    /// User or controllee lookup failed.
    #[error("{0} not found")]
    NotFound(String),

    /// An alias resolved to more than one controllee. The message
    /// enumerates the candidates so the operator can disambiguate.
    #[error("{count} connections match alias '{alias}'\n{candidates}")]
    Ambiguous {
        alias: String,
        count: usize,
        candidates: String,
    },

    /// A second operator session tried to attach with an already-used
    /// `user@remote-address` label.
    #[error("connection already exists for {0}")]
    DuplicateSession(String),

    /// A controllee id is already present in the registry.
    #[error("controllee {0} is already registered")]
    ClientExists(String),

    /// An autocomplete value set was registered twice under one tag.
    #[error("autocomplete values for {0} are already registered")]
    TagExists(String),

    /// Malformed search glob.
    #[error("filter is not well formed")]
    InvalidFilter,

    /// The dispatcher found no registered command for the line.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// One or more flags were not accepted by the command.
    #[error("invalid flag{}: {names}", if *.count == 1 { "" } else { "s" })]
    InvalidFlag { names: String, count: usize },
}

impl Error {
    /// True for errors that terminate the dispatcher loop. Everything
    /// else is printed to the operator and the loop continues.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::EndOfInput | Error::Io(_))
    }
}

/// Convenience result type for drover operations.
pub type Result<T> = std::result::Result<T, Error>;
