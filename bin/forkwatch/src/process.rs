// Copyright 2023 IOTA Stiftung
// SPDX-License-Identifier: Apache-2.0

/// Waits for the first termination request and returns the name of the signal.
#[cfg(unix)]
pub async fn shutdown_requested() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

#[cfg(not(unix))]
pub async fn shutdown_requested() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|_| "Ctrl-C")
}
