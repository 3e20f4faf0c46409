// SPDX-FileCopyrightText: 2026 Parlor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Signal-driven shutdown for `parlor serve`.
//!
//! SIGTERM or SIGINT cancels one [`CancellationToken`] shared by the sync
//! worker and the job schedulers. An in-flight delivery or reconciliation
//! pass finishes before the process exits.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Spawn the signal listener and hand back the token it will cancel.
pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let handle = token.clone();

    tokio::spawn(async move {
        let signal = wait_for_signal().await;
        info!(signal, "stop signal received, shutting down");
        handle.cancel();
        debug!("signal handler finished");
    });

    token
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "ctrl-c"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn handler_token_starts_uncancelled() {
        let token = install_signal_handler();
        assert!(!token.is_cancelled());
        // Cancel manually so the background task does not outlive the test.
        token.cancel();
    }
}
