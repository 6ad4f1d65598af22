//! In-memory byte channel for exercising the editor without a transport.

use std::time::Duration;

use tokio::io::{AsyncReadExt, DuplexStream};

/// Create a connected pair of in-memory byte channels.
///
/// The first half plays the operator's terminal emulator (write keystrokes,
/// read repaints); the second half is handed to the editor under test.
pub fn mock_channel() -> (DuplexStream, DuplexStream) {
    tokio::io::duplex(64 * 1024)
}

/// Drain whatever the peer has written so far, returning after `wait` of
/// silence. Useful for asserting on repaint bytes without knowing their
/// exact framing in advance.
pub async fn read_available(stream: &mut DuplexStream, wait: Duration) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match tokio::time::timeout(wait, stream.read(&mut buf)).await {
            Ok(Ok(0)) | Err(_) => break,
            Ok(Ok(n)) => out.extend_from_slice(&buf[..n]),
            Ok(Err(_)) => break,
        }
    }
    out
}
