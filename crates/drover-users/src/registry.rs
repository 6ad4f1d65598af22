//! The process-wide user, controllee, and alias registry.
//!
//! One readers/writer lock guards every shared map. Read-heavy operations
//! (`get_user`, `list_users`, and the lookups on [`User`]) take shared
//! access; attach, detach, and controllee registration take exclusive
//! access.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use tracing::{debug, info, warn};

use drover_core::constants::PRIVILEGE_EXTENSION;
use drover_core::ssh::SshConnection;
use drover_core::{Error, Result, Trie};

use crate::session::{connection_details, OperatorSession};
use crate::user::{Privilege, User};

#[derive(Default)]
pub(crate) struct UserRecord {
    pub(crate) privilege: Option<Privilege>,
    pub(crate) sessions: HashMap<String, Arc<OperatorSession>>,
    pub(crate) clients: HashMap<String, Arc<dyn SshConnection>>,
    pub(crate) autocomplete: Arc<Trie>,
}

impl UserRecord {
    /// A user record is kept alive by controllees or operator sessions;
    /// with neither it must leave the registry.
    fn is_empty(&self) -> bool {
        self.clients.is_empty() && self.sessions.is_empty()
    }
}

#[derive(Default)]
pub(crate) struct State {
    pub(crate) users: HashMap<String, UserRecord>,
    pub(crate) all_clients: HashMap<String, Arc<dyn SshConnection>>,
    pub(crate) aliases: HashMap<String, HashSet<String>>,
    pub(crate) client_aliases: HashMap<String, Vec<String>>,
    pub(crate) active_connections: HashSet<String>,
    pub(crate) global_autocomplete: Arc<Trie>,
}

/// Registry of users, their operator sessions, and the controllees they
/// own. Constructed once and threaded into session construction; there is
/// no ambient global. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct Registry {
    pub(crate) shared: Arc<RwLock<State>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch or create the record for `username`. When `conn` is present an
    /// operator session keyed `user@remote-address` is attached to it; a
    /// second session with the same label is refused. The privilege level
    /// is parsed from the connection's permissions extensions; a missing or
    /// malformed value is logged and leaves the record's privilege as-is.
    ///
    /// Without a connection only a handle is returned: records exist in the
    /// username map iff they hold at least one session or controllee.
    pub fn create_or_get_user(
        &self,
        username: &str,
        conn: Option<Arc<dyn SshConnection>>,
    ) -> Result<(User, String)> {
        let Some(conn) = conn else {
            return Ok((User::new(self, username), String::new()));
        };

        let mut state = self.shared.write().expect("registry lock poisoned");

        let details = {
            let record = state.users.entry(username.to_string()).or_default();

            match conn
                .extension(PRIVILEGE_EXTENSION)
                .map(|raw| raw.parse::<i64>())
            {
                Some(Ok(level)) => record.privilege = Some(Privilege::from_wire(level)),
                Some(Err(err)) => {
                    warn!(user = username, error = %err, "could not parse privilege")
                }
                None => warn!(user = username, "no privilege extension on connection"),
            }

            let session = OperatorSession::new(conn);
            let details = session.details().to_string();

            if record.sessions.contains_key(&details) {
                return Err(Error::DuplicateSession(details));
            }
            record.sessions.insert(details.clone(), session);
            details
        };

        state.active_connections.insert(details.clone());
        info!(user = username, session = %details, "operator attached");

        Ok((User::new(self, username), details))
    }

    /// Read-only lookup of an existing user.
    pub fn get_user(&self, username: &str) -> Result<User> {
        let state = self.shared.read().expect("registry lock poisoned");
        if state.users.contains_key(username) {
            Ok(User::new(self, username))
        } else {
            Err(Error::NotFound(username.to_string()))
        }
    }

    /// All known usernames, sorted.
    pub fn list_users(&self) -> Vec<String> {
        let state = self.shared.read().expect("registry lock poisoned");
        let mut users: Vec<String> = state.users.keys().cloned().collect();
        users.sort();
        users
    }

    /// Detach the operator session belonging to `conn`, closing the
    /// connection. The user record is dropped once it owns no controllees
    /// and has no remaining sessions.
    pub fn disconnect_user(&self, conn: &Arc<dyn SshConnection>) {
        let username = conn.username();
        let details = connection_details(conn.as_ref());

        {
            let mut state = self.shared.write().expect("registry lock poisoned");
            state.active_connections.remove(&details);

            if let Some(record) = state.users.get_mut(&username) {
                record.sessions.remove(&details);
                if record.is_empty() {
                    state.users.remove(&username);
                    debug!(user = %username, "removed empty user record");
                }
            }
        }

        conn.close();
        info!(user = %username, session = %details, "operator detached");
    }

    /// Register a newly connected controllee under `owner`, together with
    /// its human-readable aliases. Feeds the id and aliases into the
    /// owner's and the global autocomplete indexes.
    pub fn register_controllee(
        &self,
        owner: &str,
        id: &str,
        aliases: &[&str],
        conn: Arc<dyn SshConnection>,
    ) -> Result<()> {
        let mut state = self.shared.write().expect("registry lock poisoned");

        if state.all_clients.contains_key(id) {
            return Err(Error::ClientExists(id.to_string()));
        }

        state.all_clients.insert(id.to_string(), Arc::clone(&conn));
        state.global_autocomplete.add(id);

        {
            let record = state.users.entry(owner.to_string()).or_default();
            record.clients.insert(id.to_string(), conn);
            record.autocomplete.add(id);
            for alias in aliases {
                record.autocomplete.add(alias);
            }
        }

        for alias in aliases {
            state
                .aliases
                .entry(alias.to_string())
                .or_default()
                .insert(id.to_string());
            state
                .client_aliases
                .entry(id.to_string())
                .or_default()
                .push(alias.to_string());
            state.global_autocomplete.add(alias);
        }

        info!(owner, id, aliases = aliases.len(), "controllee registered");
        Ok(())
    }

    /// Drop a controllee from every map it appears in. Autocomplete
    /// indexes are insert-only; a stale suggestion simply fails lookup.
    pub fn remove_controllee(&self, id: &str) {
        let mut state = self.shared.write().expect("registry lock poisoned");

        state.all_clients.remove(id);

        if let Some(aliases) = state.client_aliases.remove(id) {
            for alias in aliases {
                if let Some(ids) = state.aliases.get_mut(&alias) {
                    ids.remove(id);
                    if ids.is_empty() {
                        state.aliases.remove(&alias);
                    }
                }
            }
        }

        for record in state.users.values_mut() {
            record.clients.remove(id);
        }
        state.users.retain(|_, record| !record.is_empty());

        info!(id, "controllee removed");
    }

    /// The autocomplete index over every controllee, as seen by admins.
    pub fn global_autocomplete(&self) -> Arc<Trie> {
        let state = self.shared.read().expect("registry lock poisoned");
        Arc::clone(&state.global_autocomplete)
    }

    /// Whether an operator session with this `user@remote-address` label
    /// is currently attached.
    pub fn is_connected(&self, details: &str) -> bool {
        let state = self.shared.read().expect("registry lock poisoned");
        state.active_connections.contains(details)
    }
}
