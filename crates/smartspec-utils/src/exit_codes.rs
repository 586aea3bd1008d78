//! Exit code constants for the smartspec CLI.
//!
//! # Exit Code Table
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | Operation completed successfully |
//! | 2 | `VALIDATION` | Bad input or configuration |
//! | 3 | `GOVERNANCE` | Required flag missing (`apply`, `allow-network`) |
//! | 4 | `INSUFFICIENT_CREDITS` | Pre-flight balance check failed |
//! | 5 | `PROVIDER` | All providers failed or disabled |
//! | 6 | `BUNDLE_BUSY` | Bundle mutex held by another writer |
//! | 7 | `INTERRUPT_TIMEOUT` | HITL response not received in time |
//! | 8 | `STEP_FAILED` | A workflow step body returned an error |
//! | 9 | `IO` | Filesystem or database failure |
//! | 70 | `INTERNAL` | Invariant violation |
//!
//! The numeric values are part of the public contract and will not change
//! within a major version.

/// Type-safe exit code for smartspec operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    pub const VALIDATION: ExitCode = ExitCode(2);
    pub const GOVERNANCE: ExitCode = ExitCode(3);
    pub const INSUFFICIENT_CREDITS: ExitCode = ExitCode(4);
    pub const PROVIDER: ExitCode = ExitCode(5);
    pub const BUNDLE_BUSY: ExitCode = ExitCode(6);
    pub const INTERRUPT_TIMEOUT: ExitCode = ExitCode(7);
    pub const STEP_FAILED: ExitCode = ExitCode(8);
    pub const IO: ExitCode = ExitCode(9);
    pub const INTERNAL: ExitCode = ExitCode(70);

    /// Numeric value for `std::process::exit()`.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self.0
    }

    /// Construct from a raw value. Unknown values map to `INTERNAL`.
    #[must_use]
    pub fn from_i32(code: i32) -> Self {
        match code {
            0 | 2..=9 => ExitCode(code),
            _ => Self::INTERNAL,
        }
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
