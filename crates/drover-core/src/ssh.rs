//! Collaborator traits and wire helpers for the SSH transport layer.
//!
//! The transport itself (key exchange, channel multiplexing, request
//! routing) lives outside this workspace. The control plane consumes a
//! byte-oriented channel plus the small surface defined here: a handle on
//! the authenticated connection and a queue of out-of-band requests.

use tokio::sync::oneshot;

/// Handle on an authenticated SSH connection, for both operators and
/// controllees. Implementations wrap the real transport's connection
/// object; tests use a fake.
pub trait SshConnection: Send + Sync + std::fmt::Debug {
    /// The authenticated username.
    fn username(&self) -> String;

    /// Remote address in `host:port` form.
    fn remote_addr(&self) -> String;

    /// Lookup in the connection's permissions-extensions bag.
    fn extension(&self, name: &str) -> Option<String>;

    /// Tear the connection down. Idempotent.
    fn close(&self);
}

/// Pseudo-terminal attributes negotiated for an operator session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PtyRequest {
    pub term: String,
    pub columns: u32,
    pub rows: u32,
}

/// An out-of-band request delivered on an operator session's queue,
/// e.g. `window-change`.
#[derive(Debug)]
pub struct SessionRequest {
    pub ty: String,
    pub payload: Vec<u8>,
    pub want_reply: bool,
    reply: Option<oneshot::Sender<bool>>,
}

impl SessionRequest {
    /// A request whose sender does not expect a reply.
    pub fn new(ty: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            ty: ty.into(),
            payload,
            want_reply: false,
            reply: None,
        }
    }

    /// A request carrying a reply slot; the receiver must answer it.
    pub fn with_reply(
        ty: impl Into<String>,
        payload: Vec<u8>,
    ) -> (Self, oneshot::Receiver<bool>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                ty: ty.into(),
                payload,
                want_reply: true,
                reply: Some(tx),
            },
            rx,
        )
    }

    /// Answer the request. A dropped receiver is ignored.
    pub fn reply(&mut self, accept: bool) {
        if let Some(tx) = self.reply.take() {
            let _ = tx.send(accept);
        }
    }
}

/// Decode a `window-change` payload: two 32-bit big-endian unsigned
/// integers (columns, rows) from the first 8 bytes. `None` when the
/// payload is short.
pub fn parse_dims(payload: &[u8]) -> Option<(u32, u32)> {
    if payload.len() < 8 {
        return None;
    }
    let columns = u32::from_be_bytes(payload[0..4].try_into().ok()?);
    let rows = u32::from_be_bytes(payload[4..8].try_into().ok()?);
    Some((columns, rows))
}

/// Encode a `window-change` payload for the given dimensions.
pub fn encode_dims(columns: u32, rows: u32) -> Vec<u8> {
    let mut payload = Vec::with_capacity(8);
    payload.extend_from_slice(&columns.to_be_bytes());
    payload.extend_from_slice(&rows.to_be_bytes());
    payload
}
