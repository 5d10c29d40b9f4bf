//! UDP ingestion loop
//!
//! Receives datagrams as fast as they arrive and folds each one into the
//! shared store under a short write lock. Malformed datagrams are logged at
//! debug level and otherwise ignored; the loop only ends on shutdown.

use crate::decoder::{PacketDecoder, SessionSignal};
use anyhow::{Context, Result};
use boxbox_core::store::TelemetryStore;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const DEFAULT_UDP_PORT: u16 = 20777;

/// Larger than any datagram the game sends
const MAX_DATAGRAM_BYTES: usize = 2048;

/// Pause after a socket error so a broken socket cannot spin the loop
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(100);

pub async fn bind(addr: SocketAddr) -> Result<UdpSocket> {
    let socket = UdpSocket::bind(addr)
        .await
        .with_context(|| format!("Failed to bind telemetry socket on {}", addr))?;
    info!("Telemetry listener bound to {}", socket.local_addr()?);
    Ok(socket)
}

/// Main ingestion loop
pub async fn run(
    socket: UdpSocket,
    store: Arc<RwLock<TelemetryStore>>,
    decoder: PacketDecoder,
    signals: mpsc::Sender<SessionSignal>,
    shutdown: CancellationToken,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_BYTES];

    loop {
        let len = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Telemetry listener stopping");
                return;
            }
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, _peer)) => len,
                Err(e) => {
                    error!("Telemetry receive error: {}", e);
                    if !backoff(&shutdown).await {
                        info!("Telemetry listener stopping");
                        return;
                    }
                    continue;
                }
            },
        };

        let outcome = {
            let mut store = store.write().await;
            decoder.apply(&mut store, &buf[..len], Instant::now())
        };

        match outcome {
            Ok(outcome) => {
                if let Some(signal) = outcome.signal {
                    if let Err(e) = signals.try_send(signal) {
                        warn!("Dropping session signal: {}", e);
                    }
                }
            }
            Err(e) => debug!("Ignoring datagram ({} bytes): {}", len, e),
        }
    }
}

/// Wait out the error backoff. False when shutdown arrived first.
async fn backoff(shutdown: &CancellationToken) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(RECV_ERROR_BACKOFF) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::StreamHeader;
    use std::time::Duration;

    #[tokio::test]
    async fn test_listener_applies_datagrams_and_signals() {
        let socket = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = socket.local_addr().unwrap();
        let store = Arc::new(RwLock::new(TelemetryStore::new()));
        let (tx, mut rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();

        let task = tokio::spawn(run(
            socket,
            store.clone(),
            PacketDecoder::default(),
            tx,
            shutdown.clone(),
        ));

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(&[1, 2, 3], addr).await.unwrap();
        let stream = StreamHeader::new(2025, 42, 0);
        sender.send_to(&stream.event("SSTA"), addr).await.unwrap();

        let signal = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap();
        assert_eq!(signal, Some(SessionSignal::Changed { session_uid: 42 }));

        {
            let store = store.read().await;
            assert_eq!(store.packets_received(), 2);
            assert!(store.is_tracked(0));
        }

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_error_backoff_waits_then_yields_to_shutdown() {
        let shutdown = CancellationToken::new();
        let started = Instant::now();
        assert!(backoff(&shutdown).await);
        assert!(started.elapsed() >= RECV_ERROR_BACKOFF);

        shutdown.cancel();
        let started = Instant::now();
        assert!(!backoff(&shutdown).await);
        assert!(started.elapsed() < RECV_ERROR_BACKOFF);
    }
}
