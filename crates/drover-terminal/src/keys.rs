//! Raw byte-sequence to key-event decoding.
//!
//! The decoder is a stateless function over the editor's pending input
//! buffer. Partial sequences (half a UTF-8 rune, an unterminated escape)
//! yield [`Decoded::Incomplete`] and consume nothing, so the editor reads
//! more bytes and retries.

/// An editor key event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// A printable (or at least insertable) code point.
    Char(char),
    Enter,
    Up,
    Down,
    Left,
    Right,
    AltLeft,
    AltRight,
    Home,
    End,
    /// Delete the character under the cursor (the `Delete` key).
    Delete,
    Backspace,
    /// ^W: delete the word left of the cursor.
    DeleteWord,
    /// ^K: delete from the cursor to the end of the line.
    DeleteLine,
    /// ^U: delete from the start of the line to the cursor.
    DeleteToStart,
    /// ^L
    ClearScreen,
    /// ^C
    Interrupt,
    /// ^D: end of input on an empty line, forward-delete otherwise.
    Eof,
    PasteStart,
    PasteEnd,
    /// An escape sequence we do not recognise; the editor ignores it.
    Unknown,
}

/// Decoder outcome for the front of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    Key(Key),
    /// A partial sequence: read more bytes and retry.
    Incomplete,
}

pub(crate) const PASTE_START: &[u8] = b"\x1b[200~";
pub(crate) const PASTE_END: &[u8] = b"\x1b[201~";

/// Decode one key event from the front of `buf`, returning the event and
/// the number of bytes consumed. While a bracketed paste is active only
/// Enter and the paste terminator keep their meaning; everything else
/// decodes as literal runes.
pub fn decode(buf: &[u8], paste_active: bool) -> (Decoded, usize) {
    if buf.is_empty() {
        return (Decoded::Incomplete, 0);
    }

    if !paste_active {
        let control = match buf[0] {
            0x01 => Some(Key::Home),
            0x02 => Some(Key::Left),
            0x03 => Some(Key::Interrupt),
            0x04 => Some(Key::Eof),
            0x05 => Some(Key::End),
            0x06 => Some(Key::Right),
            0x08 => Some(Key::Backspace),
            0x0b => Some(Key::DeleteLine),
            0x0c => Some(Key::ClearScreen),
            0x0e => Some(Key::Down),
            0x10 => Some(Key::Up),
            0x15 => Some(Key::DeleteToStart),
            0x17 => Some(Key::DeleteWord),
            0x7f => Some(Key::Backspace),
            _ => None,
        };
        if let Some(key) = control {
            return (Decoded::Key(key), 1);
        }
    }

    // CR and LF both terminate a line, in and out of paste mode, so that
    // multi-line pastes deliver one line per terminator.
    if buf[0] == b'\r' || buf[0] == b'\n' {
        return (Decoded::Key(Key::Enter), 1);
    }

    if buf[0] != 0x1b {
        return match decode_rune(buf) {
            Some((c, len)) => (Decoded::Key(Key::Char(c)), len),
            None => (Decoded::Incomplete, 0),
        };
    }

    if !paste_active && buf.len() >= 3 && buf[1] == b'[' {
        match buf[2] {
            b'A' => return (Decoded::Key(Key::Up), 3),
            b'B' => return (Decoded::Key(Key::Down), 3),
            b'C' => return (Decoded::Key(Key::Right), 3),
            b'D' => return (Decoded::Key(Key::Left), 3),
            b'H' => return (Decoded::Key(Key::Home), 3),
            b'F' => return (Decoded::Key(Key::End), 3),
            b'3' if buf.len() >= 4 && buf[3] == b'~' => {
                return (Decoded::Key(Key::Delete), 4)
            }
            _ => {}
        }
    }

    if !paste_active && buf.len() >= 6 && &buf[1..5] == b"[1;3" {
        match buf[5] {
            b'C' => return (Decoded::Key(Key::AltRight), 6),
            b'D' => return (Decoded::Key(Key::AltLeft), 6),
            _ => {}
        }
    }

    if !paste_active && buf.len() >= 6 && &buf[..6] == PASTE_START {
        return (Decoded::Key(Key::PasteStart), 6);
    }

    if paste_active && buf.len() >= 6 && &buf[..6] == PASTE_END {
        return (Decoded::Key(Key::PasteEnd), 6);
    }

    // A sequence we don't recognise. There is no way to know the length of
    // every sequence, but [a-zA-Z~] only appears as a terminator.
    for (i, &b) in buf.iter().enumerate() {
        if b.is_ascii_alphabetic() || b == b'~' {
            return (Decoded::Key(Key::Unknown), i + 1);
        }
    }

    (Decoded::Incomplete, 0)
}

fn decode_rune(buf: &[u8]) -> Option<(char, usize)> {
    let need = match buf[0] {
        0x00..=0x7f => return Some((buf[0] as char, 1)),
        0xc2..=0xdf => 2,
        0xe0..=0xef => 3,
        0xf0..=0xf4 => 4,
        // A stray continuation or invalid lead byte decodes as the
        // replacement character, consuming one byte.
        _ => return Some((char::REPLACEMENT_CHARACTER, 1)),
    };
    if buf.len() < need {
        return None;
    }
    match std::str::from_utf8(&buf[..need])
        .ok()
        .and_then(|s| s.chars().next())
    {
        Some(c) => Some((c, need)),
        None => Some((char::REPLACEMENT_CHARACTER, 1)),
    }
}
