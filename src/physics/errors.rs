use thiserror::Error;

/// Failures surfaced by the engine's fallible surfaces. Hot-path kernels
/// never unwind; they communicate through sentinel lanes and best-so-far
/// results, so this taxonomy only covers construction, mutation, and
/// per-step resource acquisition.
#[derive(Debug, Error)]
pub enum KeelError {
    /// A caller violated an API precondition. In release builds the deep
    /// per-kernel checks are compiled down to debug assertions; the
    /// conditions checked on the public surface always report.
    #[error("contract violation: {0}")]
    ContractViolation(&'static str),

    /// Scratch memory acquisition failed. The step that observed the
    /// failure aborts atomically; no partial mutation is visible.
    #[error("resource exhaustion: failed to acquire {requested_bytes} bytes of scratch")]
    ResourceExhaustion { requested_bytes: usize },
}
