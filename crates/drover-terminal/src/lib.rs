//! drover-terminal: The operator-facing terminal core.
//!
//! This crate provides:
//! - A VT100 line editor with history, bracketed paste, and
//!   context-aware autocomplete ([`Terminal`])
//! - The line parser used for dispatch and completion ([`parse_line`])
//! - The raw-byte key decoder ([`keys::decode`])
//! - The command capability contract ([`Command`]) and the dispatcher
//!   loop ([`Terminal::run`])
//!
//! The editor consumes a byte-oriented bidirectional channel (the
//! operator's SSH channel) and, for advanced terminals, an operator
//! session whose out-of-band request queue feeds window resizes.

pub mod autocomplete;
pub mod command;
mod dispatch;
pub mod editor;
pub mod history;
pub mod keys;
pub mod parse;

pub use autocomplete::tags;
pub use command::Command;
pub use editor::{EscapeCodes, Line, Terminal, VT100_ESCAPE_CODES};
pub use history::RingHistory;
pub use keys::{decode, Decoded, Key};
pub use parse::{parse_line, Node, NodeKind, ParsedLine};
