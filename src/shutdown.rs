//! Process shutdown for the long-running commands (`serve` and
//! `sync --watch-with-interval`).
//!
//! The first SIGINT, SIGTERM or SIGHUP cancels the returned token: the HTTP
//! server stops accepting connections and drains, watch mode finishes the
//! sync in flight. Any later signal exits immediately with status 130.

use tokio_util::sync::CancellationToken;

/// Exit status used when a second signal forces the process down.
const FORCED_EXIT_CODE: i32 = 130;

/// Signal streams registered once at startup.
struct Signals {
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
    #[cfg(unix)]
    hangup: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn register() -> anyhow::Result<Self> {
        use anyhow::Context;
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            terminate: signal(SignalKind::terminate()).context("failed to register SIGTERM handler")?,
            hangup: signal(SignalKind::hangup()).context("failed to register SIGHUP handler")?,
        })
    }

    /// Wait for the next shutdown signal. Returns its name for logging.
    async fn next(&mut self) -> std::io::Result<&'static str> {
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map(|()| "SIGINT"),
            _ = self.terminate.recv() => Ok("SIGTERM"),
            _ = self.hangup.recv() => Ok("SIGHUP"),
        }
    }
}

#[cfg(not(unix))]
impl Signals {
    fn register() -> anyhow::Result<Self> {
        Ok(Self {})
    }

    async fn next(&mut self) -> std::io::Result<&'static str> {
        tokio::signal::ctrl_c().await.map(|()| "Ctrl+C")
    }
}

/// Register signal handlers and return the token they cancel.
pub(crate) fn install_signal_handler() -> anyhow::Result<CancellationToken> {
    let mut signals = Signals::register()?;
    let token = CancellationToken::new();
    let cancel = token.clone();

    tokio::spawn(async move {
        let mut received = 0u32;
        loop {
            let name = match signals.next().await {
                Ok(name) => name,
                Err(e) => {
                    tracing::error!(error = %e, "Signal listener failed");
                    return;
                }
            };
            received += 1;
            if received == 1 {
                tracing::info!(signal = name, "Shutting down after current work, signal again to force");
                cancel.cancel();
            } else {
                tracing::warn!(signal = name, "Forced exit");
                std::process::exit(FORCED_EXIT_CODE);
            }
        }
    });

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn handler_token_starts_live() {
        let token = install_signal_handler().unwrap();
        assert!(!token.is_cancelled());
        // Children handed to the server observe cancellation.
        let child = token.child_token();
        token.cancel();
        assert!(child.is_cancelled());
    }
}
