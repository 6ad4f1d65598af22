//! Shared setup for terminal integration tests.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::DuplexStream;

use drover_core::ssh::SshConnection;
use drover_core::{Error, Result};
use drover_terminal::{Command, ParsedLine, Terminal};
use drover_test_utils::{mock_channel, FakeSshConnection};
use drover_users::{OperatorSession, Registry, User};

pub struct TestSession {
    pub term: Terminal,
    pub client: DuplexStream,
    pub user: User,
    pub session: Arc<OperatorSession>,
    pub registry: Registry,
}

/// An advanced terminal wired to a fresh registry, an ordinary operator
/// `alice`, and an in-memory channel whose far end plays the operator's
/// terminal emulator.
pub fn advanced_terminal(prompt: &str) -> TestSession {
    let registry = Registry::new();
    let conn: Arc<dyn SshConnection> = Arc::new(
        FakeSshConnection::new("alice", "1.2.3.4:50000").with_extension("privilege", "0"),
    );
    let (user, details) = registry
        .create_or_get_user("alice", Some(conn))
        .expect("attach alice");
    let session = user.session(&details).expect("session exists");

    let (client, server) = mock_channel();
    let term = Terminal::advanced(server, user.clone(), Arc::clone(&session), prompt);

    TestSession {
        term,
        client,
        user,
        session,
        registry,
    }
}

/// What a [`StubCommand`] does when run.
#[derive(Clone)]
pub enum StubBehavior {
    /// Write a canned reply through the editor.
    Reply(&'static str),
    /// Fail with a printable error.
    Fail(&'static str),
    /// Ask the dispatcher to exit.
    Exit,
}

/// Minimal command for dispatcher and autocomplete tests.
pub struct StubCommand {
    pub name: &'static str,
    pub expectation: Option<Vec<String>>,
    pub flags: BTreeMap<String, String>,
    pub behavior: StubBehavior,
}

impl StubCommand {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            expectation: None,
            flags: BTreeMap::new(),
            behavior: StubBehavior::Reply(""),
        }
    }

    pub fn expecting(mut self, expected: &[&str]) -> Self {
        self.expectation = Some(expected.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn with_flag(mut self, name: &str, description: &str) -> Self {
        self.flags.insert(name.to_string(), description.to_string());
        self
    }

    pub fn behaving(mut self, behavior: StubBehavior) -> Self {
        self.behavior = behavior;
        self
    }
}

#[async_trait]
impl Command for StubCommand {
    fn expect(&self, _line: &ParsedLine) -> Option<Vec<String>> {
        self.expectation.clone()
    }

    async fn run(&self, _user: &User, term: &Terminal, _line: ParsedLine) -> Result<()> {
        match &self.behavior {
            StubBehavior::Reply(reply) => {
                if !reply.is_empty() {
                    term.write_str(reply).await?;
                }
                Ok(())
            }
            StubBehavior::Fail(message) => Err(Error::NotFound(message.to_string())),
            StubBehavior::Exit => Err(Error::EndOfInput),
        }
    }

    fn help(&self, _verbose: bool) -> String {
        format!("usage: {} [options]\n", self.name)
    }

    fn valid_args(&self) -> BTreeMap<String, String> {
        self.flags.clone()
    }
}

/// Register stubs on a terminal by name.
pub fn install_commands(term: &Terminal, stubs: Vec<StubCommand>) {
    let mut map: std::collections::HashMap<String, Arc<dyn Command>> =
        std::collections::HashMap::new();
    for stub in stubs {
        map.insert(stub.name.to_string(), Arc::new(stub));
    }
    term.add_commands(map);
}
