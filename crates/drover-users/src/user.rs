//! User handles and privilege levels.

use std::collections::HashMap;
use std::sync::Arc;

use glob::Pattern;
use tracing::warn;

use drover_core::ssh::SshConnection;
use drover_core::{Error, Result, Trie};

use crate::registry::{Registry, State};
use crate::session::OperatorSession;

/// Operator privilege. The SSH wire carries an integer (0 ordinary,
/// 5 admin); nothing outside the registry ever sees the integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Privilege {
    #[default]
    Ordinary,
    Admin,
}

impl Privilege {
    /// Map a wire privilege level onto a variant. Anything that is not
    /// the admin level is ordinary.
    pub fn from_wire(level: i64) -> Self {
        if level == drover_core::constants::ADMIN_PRIVILEGE_LEVEL {
            Privilege::Admin
        } else {
            Privilege::Ordinary
        }
    }
}

/// Handle on a user record inside a [`Registry`]. Cheap to clone; all
/// lookups go through the registry's shared lock.
#[derive(Clone)]
pub struct User {
    registry: Registry,
    username: String,
}

impl User {
    pub(crate) fn new(registry: &Registry, username: &str) -> Self {
        Self {
            registry: registry.clone(),
            username: username.to_string(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// The user's privilege. Unset privilege (the extension was missing
    /// or unparseable at attach time) is observed as ordinary.
    pub fn privilege(&self) -> Privilege {
        let state = self.registry.shared.read().expect("registry lock poisoned");
        match state.users.get(&self.username).and_then(|r| r.privilege) {
            Some(p) => p,
            None => {
                warn!(user = %self.username, "privilege unset, defaulting to ordinary");
                Privilege::Ordinary
            }
        }
    }

    pub fn is_admin(&self) -> bool {
        self.privilege() == Privilege::Admin
    }

    /// Every controllee whose id, alias, or remote address matches
    /// `filter + "*"` as a path-glob. Admins search the global controllee
    /// map; everyone else searches their own subset.
    pub fn search_clients(&self, filter: &str) -> Result<HashMap<String, Arc<dyn SshConnection>>> {
        // A trailing "*" enables prefix matching; doubling one up would be
        // rejected as a recursive wildcard.
        let glob = if filter.ends_with('*') {
            filter.to_string()
        } else {
            format!("{filter}*")
        };
        let pattern = Pattern::new(&glob).map_err(|_| Error::InvalidFilter)?;

        let admin = self.is_admin();
        let state = self.registry.shared.read().expect("registry lock poisoned");

        let search: &HashMap<String, Arc<dyn SshConnection>> = if admin {
            &state.all_clients
        } else {
            match state.users.get(&self.username) {
                Some(record) => &record.clients,
                None => return Ok(HashMap::new()),
            }
        };

        let mut out = HashMap::new();
        for (id, conn) in search {
            if matches_locked(&state, &pattern, id, &conn.remote_addr()) {
                out.insert(id.clone(), Arc::clone(conn));
            }
        }

        Ok(out)
    }

    /// Test a single controllee against a glob, consulting its aliases.
    pub fn matches(&self, filter: &str, client_id: &str, remote_addr: &str) -> bool {
        let Ok(pattern) = Pattern::new(filter) else {
            return false;
        };
        let state = self.registry.shared.read().expect("registry lock poisoned");
        matches_locked(&state, &pattern, client_id, remote_addr)
    }

    /// Resolve an identifier to exactly one controllee: a direct id hit in
    /// the global map first, then through the alias map. Non-admins only
    /// see alias hits they own. More than one survivor is an error that
    /// enumerates the candidates.
    pub fn get_client(&self, identifier: &str) -> Result<Arc<dyn SshConnection>> {
        let admin = self.is_admin();
        let state = self.registry.shared.read().expect("registry lock poisoned");

        if let Some(conn) = state.all_clients.get(identifier) {
            return Ok(Arc::clone(conn));
        }

        // Work on a copy of the alias set: pruning must never write through
        // a map other readers are holding under the shared lock.
        let mut matching: Vec<String> = state
            .aliases
            .get(identifier)
            .map(|ids| ids.iter().cloned().collect())
            .ok_or_else(|| Error::NotFound(identifier.to_string()))?;

        let record = state.users.get(&self.username);
        if !admin {
            matching.retain(|id| {
                record.map_or(false, |r| r.clients.contains_key(id))
            });
        }

        let search: &HashMap<String, Arc<dyn SshConnection>> = if admin {
            &state.all_clients
        } else {
            match record {
                Some(r) => &r.clients,
                None => return Err(Error::NotFound(identifier.to_string())),
            }
        };

        if matching.len() == 1 {
            if let Some(conn) = search.get(&matching[0]) {
                return Ok(Arc::clone(conn));
            }
            return Err(Error::NotFound(identifier.to_string()));
        }

        if matching.is_empty() {
            return Err(Error::NotFound(identifier.to_string()));
        }

        matching.sort();
        let candidates = matching
            .iter()
            .filter_map(|id| {
                search
                    .get(id)
                    .map(|conn| format!("{} ({} {})", id, conn.username(), conn.remote_addr()))
            })
            .collect::<Vec<_>>()
            .join("\n");

        Err(Error::Ambiguous {
            alias: identifier.to_string(),
            count: matching.len(),
            candidates,
        })
    }

    /// The autocomplete index covering this user's view of the world:
    /// the global index for admins, the private one otherwise.
    pub fn autocomplete(&self) -> Arc<Trie> {
        let state = self.registry.shared.read().expect("registry lock poisoned");
        if state.users.get(&self.username).and_then(|r| r.privilege) == Some(Privilege::Admin) {
            return Arc::clone(&state.global_autocomplete);
        }
        state
            .users
            .get(&self.username)
            .map(|r| Arc::clone(&r.autocomplete))
            .unwrap_or_default()
    }

    /// Look up one of this user's operator sessions by its
    /// `user@remote-address` label.
    pub fn session(&self, details: &str) -> Result<Arc<OperatorSession>> {
        let state = self.registry.shared.read().expect("registry lock poisoned");
        state
            .users
            .get(&self.username)
            .and_then(|r| r.sessions.get(details))
            .map(Arc::clone)
            .ok_or_else(|| Error::NotFound(format!("session {details}")))
    }
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

fn matches_locked(state: &State, pattern: &Pattern, client_id: &str, remote_addr: &str) -> bool {
    if pattern.matches(client_id) {
        return true;
    }
    if let Some(aliases) = state.client_aliases.get(client_id) {
        if aliases.iter().any(|a| pattern.matches(a)) {
            return true;
        }
    }
    pattern.matches(remote_addr)
}
