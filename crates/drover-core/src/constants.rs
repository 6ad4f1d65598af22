//! Editor and registry constants for drover.

// =============================================================================
// Editor Constants
// =============================================================================

/// Maximum line length in code points; further printable input is dropped.
pub const MAX_LINE_LENGTH: usize = 4096;

/// Command history depth.
pub const HISTORY_CAPACITY: usize = 100;

/// Input read buffer size; also bounds the pending-key remainder.
pub const INPUT_BUFFER_SIZE: usize = 256;

/// Default terminal columns before the first window-change arrives.
pub const DEFAULT_TERM_WIDTH: usize = 80;

/// Default terminal rows before the first window-change arrives.
pub const DEFAULT_TERM_HEIGHT: usize = 24;

// =============================================================================
// SSH Wire Constants
// =============================================================================

/// Permissions-extension key carrying the operator privilege level.
pub const PRIVILEGE_EXTENSION: &str = "privilege";

/// Wire privilege level denoting an administrator.
pub const ADMIN_PRIVILEGE_LEVEL: i64 = 5;

/// Out-of-band request type for terminal resizes.
pub const WINDOW_CHANGE_REQUEST: &str = "window-change";
