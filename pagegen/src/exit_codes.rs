//! Stable exit codes for pagegen CLI commands.

/// Command succeeded. A batch that ran to completion exits OK even when
/// individual items failed.
pub const OK: i32 = 0;
/// Command failed on a top-level fault (malformed prompt list, status
/// persist failure, invalid config).
pub const INVALID: i32 = 1;
