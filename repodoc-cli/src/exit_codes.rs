//! Exit code constants for CLI commands
//!
//! - 0: Success
//! - 1: Partial results or warnings
//! - 2: The command could not run at all

/// Successful execution
pub const EXIT_SUCCESS: i32 = 0;

/// Some lanes failed, or doctor found warnings
pub const EXIT_WARNING: i32 = 1;

/// Bad input, missing tool server, or doctor found errors
pub const EXIT_ERROR: i32 = 2;
