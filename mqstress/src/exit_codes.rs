#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// The run finished but no summary could be built (no results, or no client
    /// produced a throughput sample).
    NoSummary = 20,

    /// Invalid CLI/config (bad flags, unreadable payload or TLS files, bad broker URL).
    InvalidInput = 30,

    /// Internal/runtime error (IO errors, unexpected invariants).
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}
