//! Return-channel routing.
//!
//! A background listener reads the link, parses [`ControlEvent`]s and hands
//! acks to whichever transfer is currently waiting for them. Each transfer
//! attempt opens its own [`AckSession`]; opening a session replaces the
//! previous channel, so acks left over from an aborted attempt are dropped
//! instead of being read by the next one.
//!
//! ```text
//!   link ──► listener ──► ControlBuffer ──► AckRouter ──► AckSession (transmitter)
//!                                      └──► diagnostics (tracing + optional subscriber)
//! ```
//!
//! Diagnostic lines are only queued once someone has called
//! [`AckRouter::subscribe_diagnostics`]; before that they are logged and
//! dropped.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{LinkError, Result};
use crate::protocol::{ControlBuffer, ControlEvent, Dialect};

/// Read buffer size for the return channel. Control traffic is tiny.
const READ_BUFFER_SIZE: usize = 256;

/// Acknowledgement routed to the waiting transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckSignal {
    /// Positive ack with its value.
    Ack(u32),
    /// Negative ack with the chunk index the remote gave up on.
    Nak(u32),
}

#[derive(Default)]
struct RouterState {
    current: Option<mpsc::UnboundedSender<AckSignal>>,
    diagnostics: Option<mpsc::UnboundedSender<String>>,
    closed: bool,
}

/// Producer side of the ack queue, shared between the listener and the
/// transmitter.
#[derive(Clone, Default)]
pub struct AckRouter {
    state: Arc<Mutex<RouterState>>,
}

impl AckRouter {
    /// Create a router with no open session.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, RouterState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Start a new session, discarding anything queued for the previous one.
    ///
    /// After [`close`](Self::close) the returned session reports
    /// [`LinkError::ConnectionClosed`] on its first wait.
    pub fn open_session(&self) -> AckSession {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state();
        state.current = if state.closed { None } else { Some(tx) };
        AckSession { rx }
    }

    /// Deliver a signal to the open session.
    ///
    /// Returns `false` when nobody is waiting.
    pub fn deliver(&self, signal: AckSignal) -> bool {
        let state = self.state();
        match &state.current {
            Some(tx) => tx.send(signal).is_ok(),
            None => false,
        }
    }

    /// Start forwarding remote diagnostic lines to a new receiver.
    ///
    /// Lines that arrived earlier are not replayed. A later call replaces
    /// the previous subscriber.
    pub fn subscribe_diagnostics(&self) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state();
        state.diagnostics = if state.closed { None } else { Some(tx) };
        rx
    }

    /// Forward a diagnostic line to the subscriber, if there is one.
    ///
    /// A subscriber whose receiver was dropped is forgotten, so nothing
    /// piles up for it.
    pub fn forward_diagnostic(&self, line: String) -> bool {
        let mut state = self.state();
        let sent = match &state.diagnostics {
            Some(tx) => tx.send(line).is_ok(),
            None => return false,
        };
        if !sent {
            state.diagnostics = None;
        }
        sent
    }

    /// Mark the return channel as gone. Any waiting session wakes up with
    /// [`LinkError::ConnectionClosed`].
    pub fn close(&self) {
        let mut state = self.state();
        state.closed = true;
        state.current = None;
        state.diagnostics = None;
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.state().closed
    }
}

/// Consumer side of one transfer attempt.
pub struct AckSession {
    rx: mpsc::UnboundedReceiver<AckSignal>,
}

impl AckSession {
    /// Wait for the next signal.
    ///
    /// `Ok(None)` means the deadline passed.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<AckSignal>> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(signal)) => Ok(Some(signal)),
            Ok(None) => Err(LinkError::ConnectionClosed),
            Err(_) => Ok(None),
        }
    }

    /// Take a signal that is already queued, without waiting.
    pub fn try_recv(&mut self) -> Option<AckSignal> {
        self.rx.try_recv().ok()
    }
}

/// Return-channel listener configuration.
pub struct AckListener {
    router: AckRouter,
    dialect: Dialect,
}

impl AckListener {
    /// Create a listener feeding `router`.
    pub fn new(router: AckRouter, dialect: Dialect) -> Self {
        Self { router, dialect }
    }

    /// Spawn the listener on the current runtime.
    pub fn spawn<R>(self, reader: R) -> JoinHandle<Result<()>>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        tokio::spawn(async move {
            let result = self.run(reader).await;
            if let Err(e) = &result {
                tracing::error!("Ack listener error: {}", e);
            }
            result
        })
    }

    /// Read the return channel until EOF or an I/O error.
    ///
    /// The router is closed on exit either way.
    pub async fn run<R: AsyncRead + Unpin>(self, mut reader: R) -> Result<()> {
        let mut buffer = ControlBuffer::new(self.dialect);
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        let result = loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => break Ok(()),
                Ok(n) => n,
                Err(e) => break Err(LinkError::Io(e)),
            };

            for event in buffer.push(&buf[..n]) {
                self.dispatch(event);
            }
        };

        tracing::debug!("Return channel closed");
        self.router.close();
        result
    }

    fn dispatch(&self, event: ControlEvent) {
        match event {
            ControlEvent::Ack(value) => {
                if !self.router.deliver(AckSignal::Ack(value)) {
                    tracing::debug!("Dropping ack {} with no transfer in progress", value);
                }
            }
            ControlEvent::Nak(chunk) => {
                if !self.router.deliver(AckSignal::Nak(chunk)) {
                    tracing::debug!("Dropping NAK {} with no transfer in progress", chunk);
                }
            }
            ControlEvent::Diagnostic(line) => {
                tracing::info!(target: "nrflink::remote", "{}", line);
                self.router.forward_diagnostic(line);
            }
            ControlEvent::Ignored(tag) => {
                tracing::warn!("Ignoring frame with tag 0x{:02X} on return channel", tag);
            }
        }
    }
}

/// Spawn a listener feeding `router`.
pub fn spawn_listener<R>(reader: R, router: AckRouter, dialect: Dialect) -> JoinHandle<Result<()>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    AckListener::new(router, dialect).spawn(reader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Header;
    use tokio::io::AsyncWriteExt;

    const WAIT: Duration = Duration::from_millis(200);

    #[tokio::test]
    async fn test_session_receives_routed_acks() {
        let router = AckRouter::new();
        let mut session = router.open_session();

        assert!(router.deliver(AckSignal::Ack(65)));
        assert!(router.deliver(AckSignal::Nak(2)));

        assert_eq!(session.recv_timeout(WAIT).await.unwrap(), Some(AckSignal::Ack(65)));
        assert_eq!(session.recv_timeout(WAIT).await.unwrap(), Some(AckSignal::Nak(2)));
    }

    #[test]
    fn test_deliver_without_session() {
        let router = AckRouter::new();
        assert!(!router.deliver(AckSignal::Ack(0)));
    }

    #[test]
    fn test_new_session_drops_stale_acks() {
        let router = AckRouter::new();
        let mut first = router.open_session();
        router.deliver(AckSignal::Ack(7));

        let mut second = router.open_session();
        assert_eq!(second.try_recv(), None);

        router.deliver(AckSignal::Ack(0));
        assert_eq!(second.try_recv(), Some(AckSignal::Ack(0)));
        // The old session keeps only what it was sent before the swap.
        assert_eq!(first.try_recv(), Some(AckSignal::Ack(7)));
        assert_eq!(first.try_recv(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recv_timeout_elapses() {
        let router = AckRouter::new();
        let mut session = router.open_session();
        assert_eq!(session.recv_timeout(Duration::from_secs(1)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_close_wakes_session() {
        let router = AckRouter::new();
        let mut session = router.open_session();
        router.close();

        assert!(matches!(
            session.recv_timeout(WAIT).await,
            Err(LinkError::ConnectionClosed)
        ));
        assert!(matches!(
            router.open_session().recv_timeout(WAIT).await,
            Err(LinkError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_listener_routes_and_forwards_diagnostics() {
        let (mut remote, local) = tokio::io::duplex(64);
        let router = AckRouter::new();
        let mut session = router.open_session();
        let mut diag_rx = router.subscribe_diagnostics();

        let handle = AckListener::new(router.clone(), Dialect::Wake).spawn(local);

        remote.write_all(&Header::ack(65).encode()).await.unwrap();
        remote.write_all(&Header::string_data(0).encode()).await.unwrap();
        remote.write_all(b"failed to send payload\r\n").await.unwrap();
        remote.write_all(&Header::nak(1).encode()).await.unwrap();

        assert_eq!(session.recv_timeout(WAIT).await.unwrap(), Some(AckSignal::Ack(65)));
        assert_eq!(session.recv_timeout(WAIT).await.unwrap(), Some(AckSignal::Nak(1)));
        assert_eq!(diag_rx.recv().await.unwrap(), "failed to send payload");

        drop(remote);
        handle.await.unwrap().unwrap();
        assert!(router.is_closed());
    }

    #[test]
    fn test_diagnostics_without_subscriber_are_dropped() {
        let router = AckRouter::new();
        assert!(!router.forward_diagnostic("early".to_string()));

        let mut rx = router.subscribe_diagnostics();
        assert!(router.forward_diagnostic("late".to_string()));
        assert_eq!(rx.try_recv().unwrap(), "late");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_subscriber_is_forgotten() {
        let router = AckRouter::new();
        drop(router.subscribe_diagnostics());

        assert!(!router.forward_diagnostic("one".to_string()));
        assert!(router.state().diagnostics.is_none());
    }

    #[tokio::test]
    async fn test_listener_drops_lines_before_subscription() {
        let (mut remote, local) = tokio::io::duplex(64);
        let router = AckRouter::new();
        let mut session = router.open_session();
        let handle = spawn_listener(local, router.clone(), Dialect::Image);

        remote.write_all(&Header::string_data(0).encode()).await.unwrap();
        remote.write_all(b"boot\n").await.unwrap();
        remote.write_all(&Header::ack(1).encode()).await.unwrap();
        // The ack is parsed after the line, so the line has been handled.
        assert_eq!(session.recv_timeout(WAIT).await.unwrap(), Some(AckSignal::Ack(1)));

        let mut diag_rx = router.subscribe_diagnostics();
        assert!(diag_rx.try_recv().is_err());

        remote.write_all(&Header::string_data(0).encode()).await.unwrap();
        remote.write_all(b"ready\n").await.unwrap();
        assert_eq!(diag_rx.recv().await.unwrap(), "ready");

        drop(remote);
        handle.await.unwrap().unwrap();
    }
}
