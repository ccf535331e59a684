//! # Termination signals.
//!
//! [`wait_for_shutdown_signal`] completes when the process is asked to stop;
//! [`Supervisor::run_until_signal`](crate::Supervisor::run_until_signal) turns
//! that into cancellation of the whole run.
//!
//! **Unix:** `SIGINT`, `SIGTERM` (sent by kubectl/systemd on stop), `SIGQUIT`.
//! **Elsewhere:** Ctrl-C via [`tokio::signal::ctrl_c`].

/// Waits for a termination signal.
///
/// Returns `Err` if a signal listener cannot be registered.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = sigint.recv()  => tracing::debug!("received SIGINT"),
        _ = sigterm.recv() => tracing::debug!("received SIGTERM"),
        _ = sigquit.recv() => tracing::debug!("received SIGQUIT"),
    }
    Ok(())
}

/// Waits for a termination signal.
///
/// Returns `Err` if the Ctrl-C listener cannot be registered.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
