//! Background monitor loop
//!
//! One task per connected device: reads unsolicited status frames, keeps
//! cached state fresh, detects disconnection and drives reconnect with a
//! capped backoff. The loop never exits on error; only an explicit stop
//! ends it.

use crate::connection::Connection;
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::sleep;

/// Pacing delay between reads while connected; cooperative, not a protocol
/// requirement, and taken outside the io lock so commands get a window
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Bound on each reconnect attempt inside the loop
const RECONNECT_TIMEOUT: Duration = Duration::from_secs(30);

const INITIAL_BACKOFF: Duration = Duration::from_secs(15);
const MAX_BACKOFF: Duration = Duration::from_secs(120);

/// Next delay after another failed reconnect: doubles up to the cap
fn next_backoff(current: Option<Duration>) -> Duration {
    match current {
        None => INITIAL_BACKOFF,
        Some(delay) => (delay * 2).min(MAX_BACKOFF),
    }
}

/// Spawn the monitor task; a message on `stop_tx` ends it cooperatively
pub(crate) fn spawn(
    connection: Arc<Connection>,
    stop_tx: broadcast::Sender<()>,
) -> tokio::task::JoinHandle<()> {
    // subscribe before spawning so a stop sent right away is not missed
    let mut stop_rx = stop_tx.subscribe();
    tokio::spawn(async move {
        let mut backoff: Option<Duration> = None;
        let mut previous: Vec<u8> = Vec::new();

        tracing::info!("start monitoring {}", connection.host());
        loop {
            tokio::select! {
                _ = stop_rx.recv() => {
                    tracing::info!("monitor stopped");
                    break;
                }
                _ = async {
                    if let Some(delay) = backoff {
                        tracing::info!(
                            "waiting {:?} before reconnecting to {}",
                            delay,
                            connection.host()
                        );
                        sleep(delay).await;
                    }
                    match run_iteration(&connection, &mut previous).await {
                        Ok(()) => backoff = None,
                        Err(e) => {
                            tracing::warn!("monitor error on {}: {}", connection.host(), e);
                            connection.drop_stream().await;
                            connection.set_available(false);
                            backoff = Some(next_backoff(backoff));
                        }
                    }
                } => {}
            }
        }
    })
}

async fn run_iteration(connection: &Arc<Connection>, previous: &mut Vec<u8>) -> Result<()> {
    if !connection.is_connected().await {
        tracing::info!("reconnecting to {}", connection.host());
        connection.connect(RECONNECT_TIMEOUT).await?;
        connection.set_available(true);
        previous.clear();
    }

    sleep(POLL_INTERVAL).await;
    connection.poll_status(previous).await
}
