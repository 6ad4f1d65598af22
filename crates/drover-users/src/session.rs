//! Operator session state.

use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, Mutex as AsyncMutex};

use drover_core::ssh::{PtyRequest, SessionRequest, SshConnection};

/// The `user@remote-address` label identifying an operator session within
/// a user.
pub fn connection_details(conn: &dyn SshConnection) -> String {
    format!("{}@{}", conn.username(), conn.remote_addr())
}

/// One attached operator connection: the underlying SSH connection, the
/// negotiated pty attributes, and the queue of out-of-band requests the
/// transport delivers for it.
pub struct OperatorSession {
    conn: Arc<dyn SshConnection>,
    pty: Mutex<Option<PtyRequest>>,
    requests: AsyncMutex<mpsc::UnboundedReceiver<SessionRequest>>,
    request_tx: Mutex<Option<mpsc::UnboundedSender<SessionRequest>>>,
    details: String,
}

impl OperatorSession {
    pub fn new(conn: Arc<dyn SshConnection>) -> Arc<Self> {
        let details = connection_details(conn.as_ref());
        let (request_tx, requests) = mpsc::unbounded_channel();
        Arc::new(Self {
            conn,
            pty: Mutex::new(None),
            requests: AsyncMutex::new(requests),
            request_tx: Mutex::new(Some(request_tx)),
            details,
        })
    }

    /// The server-side connection. Used for closure and remote-address
    /// reporting, never for bulk data.
    pub fn connection(&self) -> &Arc<dyn SshConnection> {
        &self.conn
    }

    pub fn details(&self) -> &str {
        &self.details
    }

    /// The out-of-band request queue. The editor's background worker holds
    /// this lock while it is running.
    pub fn requests(&self) -> &AsyncMutex<mpsc::UnboundedReceiver<SessionRequest>> {
        &self.requests
    }

    /// Sender half for the request queue; the transport layer (or a test)
    /// pushes `window-change` and friends through this. `None` once the
    /// queue has been closed.
    pub fn request_sender(&self) -> Option<mpsc::UnboundedSender<SessionRequest>> {
        self.request_tx
            .lock()
            .expect("request sender lock poisoned")
            .clone()
    }

    /// Close the request queue. Once every outstanding sender clone is
    /// dropped the consuming worker observes the close and exits.
    pub fn close_requests(&self) {
        self.request_tx
            .lock()
            .expect("request sender lock poisoned")
            .take();
    }

    pub fn pty(&self) -> Option<PtyRequest> {
        self.pty.lock().expect("pty lock poisoned").clone()
    }

    pub fn set_pty(&self, req: PtyRequest) {
        *self.pty.lock().expect("pty lock poisoned") = Some(req);
    }

    /// Record the dimensions from a `window-change` request.
    pub fn update_size(&self, columns: u32, rows: u32) {
        let mut pty = self.pty.lock().expect("pty lock poisoned");
        let attrs = pty.get_or_insert_with(PtyRequest::default);
        attrs.columns = columns;
        attrs.rows = rows;
    }
}

impl std::fmt::Debug for OperatorSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorSession")
            .field("details", &self.details)
            .field("pty", &self.pty)
            .finish_non_exhaustive()
    }
}
