//! The single top-level handler for unrecoverable conditions.
//!
//! Library code propagates `anyhow::Result`; task and thread entry points
//! route errors here. Persistence failures, event-buffer overflow and
//! schema drift all terminate the process through this one function.

/// Exit code for fatal runtime conditions. Configuration errors at startup
/// exit 1 via `main`; graceful shutdown exits 0.
pub const FATAL_EXIT_CODE: i32 = 2;

/// Log the error with its full chain and terminate the process.
pub fn unrecoverable(component: &str, err: anyhow::Error) -> ! {
    tracing::error!("{component}: fatal: {err:#}");
    std::process::exit(FATAL_EXIT_CODE);
}

/// Unwrap a result, routing the error through [`unrecoverable`].
pub fn or_exit<T>(component: &str, result: anyhow::Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(err) => unrecoverable(component, err),
    }
}
