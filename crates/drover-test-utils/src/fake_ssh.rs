//! Fake SSH connection for registry and editor tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use drover_core::ssh::SshConnection;

/// Scriptable [`SshConnection`] carrying a username, remote address, and a
/// permissions-extensions bag.
#[derive(Debug, Default)]
pub struct FakeSshConnection {
    username: String,
    remote_addr: String,
    extensions: HashMap<String, String>,
    closed: AtomicBool,
}

impl FakeSshConnection {
    pub fn new(username: &str, remote_addr: &str) -> Self {
        Self {
            username: username.to_string(),
            remote_addr: remote_addr.to_string(),
            extensions: HashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Add a permissions extension, e.g. `privilege = 5`.
    pub fn with_extension(mut self, name: &str, value: &str) -> Self {
        self.extensions.insert(name.to_string(), value.to_string());
        self
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl SshConnection for FakeSshConnection {
    fn username(&self) -> String {
        self.username.clone()
    }

    fn remote_addr(&self) -> String {
        self.remote_addr.clone()
    }

    fn extension(&self, name: &str) -> Option<String> {
        self.extensions.get(name).cloned()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
