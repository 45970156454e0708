//! One direction of a tunnel.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;

/// Teardown signal shared by the two directions of one tunnel.
///
/// Whichever direction finishes first fires it; the other stops copying and
/// releases its halves, so both connections close together.
#[derive(Debug, Clone)]
pub struct Teardown {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Teardown {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Fire the signal. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the signal has fired.
    pub async fn triggered(&mut self) {
        // The sender lives as long as any clone of self, so this only errors
        // if it was never going to fire.
        let _ = self.rx.wait_for(|fired| *fired).await;
    }
}

impl Default for Teardown {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy buffer size, matching `tokio::io::copy`.
const COPY_BUFFER: usize = 8 * 1024;

/// How a relay direction ended. Each variant carries the bytes relayed.
#[derive(Debug)]
pub enum RelayEnd {
    /// Source reached end-of-stream.
    Eof(u64),
    /// Reading or writing failed.
    Failed { bytes: u64, error: io::Error },
    /// The opposite direction finished first.
    PeerClosed(u64),
}

impl RelayEnd {
    /// Bytes written to the destination before the relay ended.
    pub fn bytes(&self) -> u64 {
        match self {
            RelayEnd::Eof(bytes) | RelayEnd::PeerClosed(bytes) => *bytes,
            RelayEnd::Failed { bytes, .. } => *bytes,
        }
    }
}

/// Copy `source` into `destination` until end-of-stream, an I/O error, or
/// the tunnel's teardown signal.
///
/// On every exit path the destination is shut down and both ends are
/// dropped, then teardown fires so the opposite direction follows.
pub async fn relay<R, W>(mut destination: W, mut source: R, mut teardown: Teardown) -> RelayEnd
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut bytes = 0u64;

    let outcome = tokio::select! {
        copied = copy_counted(&mut source, &mut destination, &mut bytes) => Some(copied),
        _ = teardown.triggered() => None,
    };

    let end = match outcome {
        Some(Ok(())) => RelayEnd::Eof(bytes),
        Some(Err(error)) => RelayEnd::Failed { bytes, error },
        None => RelayEnd::PeerClosed(bytes),
    };

    let _ = destination.shutdown().await;
    drop(destination);
    drop(source);
    teardown.trigger();
    end
}

/// Copy until end-of-stream, adding every chunk written to `bytes` as it
/// goes so the count survives cancellation.
async fn copy_counted<R, W>(source: &mut R, destination: &mut W, bytes: &mut u64) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; COPY_BUFFER];
    loop {
        let n = source.read(&mut buf).await?;
        if n == 0 {
            return destination.flush().await;
        }
        destination.write_all(&buf[..n]).await?;
        *bytes += n as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt};

    #[tokio::test]
    async fn copies_until_eof_and_closes_destination() {
        let (mut client, source) = duplex(64);
        let (destination, mut server) = duplex(64);

        let teardown = Teardown::new();
        let task = tokio::spawn(relay(destination, source, teardown.clone()));

        client.write_all(b"\x16\x03\x01hello").await.unwrap();
        drop(client);

        let mut received = Vec::new();
        server.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"\x16\x03\x01hello");

        assert!(matches!(task.await.unwrap(), RelayEnd::Eof(8)));
        assert!(teardown.is_triggered());
    }

    #[tokio::test]
    async fn stops_when_peer_direction_finishes() {
        let (_client, source) = duplex(64);
        let (destination, mut server) = duplex(64);

        let teardown = Teardown::new();
        let task = tokio::spawn(relay(destination, source, teardown.clone()));

        teardown.trigger();
        let end = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(end, RelayEnd::PeerClosed(0)));

        let mut buf = [0u8; 1];
        assert_eq!(server.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn write_failure_is_reported_not_propagated() {
        let (mut client, source) = duplex(64);
        let (destination, server) = duplex(64);
        drop(server);

        let teardown = Teardown::new();
        let task = tokio::spawn(relay(destination, source, teardown.clone()));
        client.write_all(b"data").await.unwrap();

        assert!(matches!(task.await.unwrap(), RelayEnd::Failed { bytes: 0, .. }));
        assert!(teardown.is_triggered());
    }

    #[tokio::test]
    async fn bytes_are_counted_when_peer_closes_first() {
        let (mut client, source) = duplex(64);
        let (destination, mut server) = duplex(64);

        let teardown = Teardown::new();
        let task = tokio::spawn(relay(destination, source, teardown.clone()));

        client.write_all(b"twelve bytes").await.unwrap();
        let mut buf = [0u8; 12];
        server.read_exact(&mut buf).await.unwrap();

        // The client stays open; the other direction ends the tunnel.
        teardown.trigger();
        let end = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(end, RelayEnd::PeerClosed(12)));
        assert_eq!(end.bytes(), 12);
        drop(client);
    }
}
