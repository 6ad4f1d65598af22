//! drover-test-utils: Test infrastructure for drover.
//!
//! Provides:
//! - `mock_channel`: in-memory bidirectional byte channel standing in for
//!   an operator's SSH channel
//! - `FakeSshConnection`: scriptable [`drover_core::ssh::SshConnection`]

mod fake_ssh;
mod mock_channel;

pub use fake_ssh::FakeSshConnection;
pub use mock_channel::{mock_channel, read_available};
