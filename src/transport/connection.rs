//! # Connection
//!
//! One framed TCP connection driven by two tasks:
//!
//! - the **read task** owns the read half and the accumulation buffer (a
//!   `FramedRead` over [`FrameCodec`]) and forwards decoded packets;
//! - the **dispatch task** delivers packets to [`ConnCallback::on_received`]
//!   and performs the final close.
//!
//! Close is idempotent. Whatever triggers it (explicit `close()`, a write
//! failure, a framing fault, EOF or the owner's shutdown) the connection
//! moves through `Open -> Closing -> Closed` once, the write half is
//! released, and `on_closed` fires exactly once, after the last
//! `on_received`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use socket2::{SockRef, TcpKeepalive};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};

use crate::config::DEFAULT_BUFFER_LEN;
use crate::core::codec::FrameCodec;
use crate::core::packet::Packet;
use crate::core::protocol::FramingProtocol;
use crate::error::{ProtocolError, Result};
use crate::transport::callback::ConnCallback;
use crate::utils::metrics::global_metrics;
use crate::utils::timeout::with_optional_timeout;

const IDLE: u8 = 0;
const OPEN: u8 = 1;
const CLOSING: u8 = 2;
const CLOSED: u8 = 3;

/// Apply a TCP keep-alive idle period to `stream`. A zero period is a no-op.
pub(crate) fn apply_keep_alive(stream: &TcpStream, period: Duration) -> std::io::Result<()> {
    if period.is_zero() {
        return Ok(());
    }
    let keepalive = TcpKeepalive::new().with_time(period);
    SockRef::from(stream).set_tcp_keepalive(&keepalive)
}

pub struct Connection {
    id: i64,
    peer: Option<SocketAddr>,
    state: AtomicU8,
    errored: AtomicBool,
    protocol: Arc<FramingProtocol>,
    callback: Arc<dyn ConnCallback>,
    buffer_len: usize,
    reader: Mutex<Option<OwnedReadHalf>>,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("state", &self.state.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Wrap `stream` in a standalone connection. Call [`start`](Self::start)
    /// from within a Tokio runtime to begin reading.
    pub fn new(
        id: i64,
        stream: TcpStream,
        protocol: Arc<FramingProtocol>,
        callback: Arc<dyn ConnCallback>,
    ) -> Arc<Self> {
        Self::with_owner(
            id,
            stream,
            protocol,
            callback,
            DEFAULT_BUFFER_LEN,
            &CancellationToken::new(),
            &TaskTracker::new(),
        )
    }

    /// Wrap `stream` in a connection whose tasks are tracked by `tracker` and
    /// stop when `shutdown` is cancelled.
    pub(crate) fn with_owner(
        id: i64,
        stream: TcpStream,
        protocol: Arc<FramingProtocol>,
        callback: Arc<dyn ConnCallback>,
        buffer_len: usize,
        shutdown: &CancellationToken,
        tracker: &TaskTracker,
    ) -> Arc<Self> {
        let peer = stream.peer_addr().ok();
        let (reader, writer) = stream.into_split();
        Arc::new(Self {
            id,
            peer,
            state: AtomicU8::new(IDLE),
            errored: AtomicBool::new(false),
            protocol,
            callback,
            buffer_len: buffer_len.max(1),
            reader: Mutex::new(Some(reader)),
            writer: tokio::sync::Mutex::new(Some(writer)),
            cancel: shutdown.child_token(),
            tracker: tracker.clone(),
        })
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn protocol(&self) -> &FramingProtocol {
        &self.protocol
    }

    /// True once close has begun, whether or not it has finished.
    pub fn is_closed(&self) -> bool {
        self.state.load(Ordering::Acquire) >= CLOSING || self.cancel.is_cancelled()
    }

    /// Spawn the read and dispatch tasks and signal `on_linked`.
    #[instrument(skip(self), fields(conn_id = self.id, peer = ?self.peer))]
    pub fn start(self: &Arc<Self>) -> Result<()> {
        if self
            .state
            .compare_exchange(IDLE, OPEN, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(if self.is_closed() {
                ProtocolError::ConnectionClosed
            } else {
                ProtocolError::AlreadyRunning
            });
        }

        let reader = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(ProtocolError::ConnectionClosed)?;

        global_metrics().connection_established();
        info!("Connection established");

        let (tx, rx) = mpsc::channel(1);
        self.tracker.spawn(Arc::clone(self).read_loop(reader, tx));
        self.callback.on_linked(self);
        self.tracker.spawn(Arc::clone(self).dispatch_loop(rx));
        Ok(())
    }

    /// Write one packet. A zero `timeout` means no write deadline.
    ///
    /// Fails with [`ProtocolError::ConnectionClosed`] once close has begun.
    /// Any other failure closes the connection and is reported through
    /// `on_errored` before being returned.
    pub async fn send(self: &Arc<Self>, packet: &Packet, timeout: Duration) -> Result<()> {
        if self.is_closed() {
            return Err(ProtocolError::ConnectionClosed);
        }

        let wire = packet.to_bytes();
        let result = tokio::select! {
            _ = self.cancel.cancelled() => Err(ProtocolError::ConnectionClosed),
            res = with_optional_timeout(self.write_all(&wire), timeout) => res,
        };

        match result {
            Ok(()) => {
                global_metrics().frame_sent(wire.len() as u64);
                Ok(())
            }
            Err(ProtocolError::ConnectionClosed) => Err(ProtocolError::ConnectionClosed),
            Err(e) => {
                warn!(conn_id = self.id, error = %e, "Write failed, closing connection");
                self.close();
                self.report_error(&e);
                Err(e)
            }
        }
    }

    async fn write_all(&self, wire: &[u8]) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(ProtocolError::ConnectionClosed)?;
        writer.write_all(wire).await?;
        Ok(())
    }

    /// Begin closing. Safe to call any number of times from any task.
    pub fn close(self: &Arc<Self>) {
        loop {
            match self
                .state
                .compare_exchange(OPEN, CLOSING, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    debug!(conn_id = self.id, "Closing connection");
                    self.cancel.cancel();
                    return;
                }
                Err(IDLE) => {
                    // Never started: no dispatch task will finish the close.
                    if self
                        .state
                        .compare_exchange(IDLE, CLOSED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        self.cancel.cancel();
                        self.reader
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .take();
                        if let Ok(mut writer) = self.writer.try_lock() {
                            writer.take();
                        }
                        debug!(conn_id = self.id, "Closed before start");
                        self.callback.on_closed(self);
                        return;
                    }
                }
                Err(_) => return,
            }
        }
    }

    fn report_error(self: &Arc<Self>, err: &ProtocolError) {
        if !self.errored.swap(true, Ordering::AcqRel) {
            self.callback.on_errored(err, Some(self));
        }
    }

    async fn read_loop(self: Arc<Self>, reader: OwnedReadHalf, tx: mpsc::Sender<Packet>) {
        let codec = FrameCodec::new(Arc::clone(&self.protocol));
        let mut frames = FramedRead::with_capacity(reader, codec, self.buffer_len);

        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => break,
                next = frames.next() => next,
            };

            match next {
                Some(Ok(packet)) => {
                    global_metrics().frame_received(packet.encoded_len() as u64);
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        sent = tx.send(packet) => {
                            if sent.is_err() {
                                break;
                            }
                        }
                    }
                }
                Some(Err(ProtocolError::Io(e))) => {
                    debug!(conn_id = self.id, error = %e, "Read failed");
                    break;
                }
                Some(Err(e)) => {
                    global_metrics().framing_error();
                    warn!(conn_id = self.id, error = %e, "Framing fault, closing connection");
                    self.report_error(&e);
                    self.close();
                    break;
                }
                None => {
                    debug!(conn_id = self.id, "Peer closed the connection");
                    break;
                }
            }
        }
        // Dropping `tx` lets the dispatch task drain and finish the close.
    }

    async fn dispatch_loop(self: Arc<Self>, mut rx: mpsc::Receiver<Packet>) {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                packet = rx.recv() => match packet {
                    Some(packet) => self.callback.on_received(&self, packet),
                    None => break,
                },
            }
        }
        self.finish_close().await;
    }

    async fn finish_close(self: &Arc<Self>) {
        if self.state.swap(CLOSED, Ordering::AcqRel) == CLOSED {
            return;
        }
        self.cancel.cancel();

        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            let _ = writer.shutdown().await;
        }

        global_metrics().connection_closed();
        info!(conn_id = self.id, peer = ?self.peer, "Connection closed");
        self.callback.on_closed(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[derive(Default)]
    struct Counting {
        linked: AtomicUsize,
        received: AtomicUsize,
        closed: AtomicUsize,
        errored: AtomicUsize,
    }

    impl ConnCallback for Counting {
        fn on_linked(&self, _conn: &Arc<Connection>) {
            self.linked.fetch_add(1, Ordering::SeqCst);
        }

        fn on_received(&self, _conn: &Arc<Connection>, _packet: Packet) {
            self.received.fetch_add(1, Ordering::SeqCst);
        }

        fn on_closed(&self, _conn: &Arc<Connection>) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }

        fn on_errored(&self, _err: &ProtocolError, _conn: Option<&Arc<Connection>>) {
            self.errored.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, server) = tokio::join!(TcpStream::connect(addr), listener.accept());
        (client.unwrap(), server.unwrap().0)
    }

    async fn wait_for(counter: &AtomicUsize, value: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while counter.load(Ordering::SeqCst) < value {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("callback was not invoked in time");
    }

    #[tokio::test]
    async fn close_before_start_notifies_once() {
        let (stream, _peer) = socket_pair().await;
        let callback = Arc::new(Counting::default());
        let conn = Connection::new(
            7,
            stream,
            Arc::new(FramingProtocol::fixed_head_default()),
            callback.clone(),
        );

        conn.close();
        conn.close();
        assert!(conn.is_closed());
        assert_eq!(callback.closed.load(Ordering::SeqCst), 1);
        assert!(matches!(conn.start(), Err(ProtocolError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn concurrent_close_fires_on_closed_once() {
        let (stream, _peer) = socket_pair().await;
        let callback = Arc::new(Counting::default());
        let conn = Connection::new(
            1,
            stream,
            Arc::new(FramingProtocol::fixed_head_default()),
            callback.clone(),
        );
        conn.start().unwrap();
        assert_eq!(callback.linked.load(Ordering::SeqCst), 1);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let conn = Arc::clone(&conn);
                tokio::spawn(async move { conn.close() })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        wait_for(&callback.closed, 1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(callback.closed.load(Ordering::SeqCst), 1);

        let packet = conn.protocol().build_frame(&[1], b"late").unwrap();
        assert!(matches!(
            conn.send(&packet, Duration::ZERO).await,
            Err(ProtocolError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn framing_fault_reports_and_closes() {
        let (stream, mut peer) = socket_pair().await;
        let callback = Arc::new(Counting::default());
        let protocol = Arc::new(FramingProtocol::fixed_head_default());
        let conn = Connection::new(3, stream, protocol.clone(), callback.clone());
        conn.start().unwrap();

        let mut wire = protocol.build_frame(&[1], b"payload").unwrap().to_bytes();
        let last = wire.len() - 1;
        wire[last] ^= 0xFF;
        peer.write_all(&wire).await.unwrap();

        wait_for(&callback.closed, 1).await;
        assert_eq!(callback.errored.load(Ordering::SeqCst), 1);
        assert_eq!(callback.received.load(Ordering::SeqCst), 0);

        // The write half was shut down.
        let mut buf = [0u8; 8];
        let n = tokio::time::timeout(Duration::from_secs(5), peer.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn peer_reset_racing_failed_sends_closes_once() {
        let (stream, peer) = socket_pair().await;
        let callback = Arc::new(Counting::default());
        let protocol = Arc::new(FramingProtocol::fixed_head_default());
        let conn = Connection::new(5, stream, protocol.clone(), callback.clone());
        conn.start().unwrap();

        // Linger zero turns the drop into a reset.
        SockRef::from(&peer).set_linger(Some(Duration::ZERO)).unwrap();
        drop(peer);

        let senders: Vec<_> = (0..4)
            .map(|_| {
                let conn = Arc::clone(&conn);
                let packet = protocol.build_frame(&[1], &[0x5A; 1024]).unwrap();
                tokio::spawn(async move {
                    for _ in 0..1000 {
                        if conn.send(&packet, Duration::from_secs(1)).await.is_err() {
                            return true;
                        }
                        tokio::task::yield_now().await;
                    }
                    false
                })
            })
            .collect();
        for sender in senders {
            assert!(sender.await.unwrap(), "send kept succeeding after reset");
        }

        wait_for(&callback.closed, 1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(conn.is_closed());
        assert_eq!(callback.closed.load(Ordering::SeqCst), 1);
        assert!(callback.errored.load(Ordering::SeqCst) <= 1);
    }

    #[tokio::test]
    async fn peer_eof_closes_without_error() {
        let (stream, peer) = socket_pair().await;
        let callback = Arc::new(Counting::default());
        let conn = Connection::new(
            4,
            stream,
            Arc::new(FramingProtocol::fixed_head_default()),
            callback.clone(),
        );
        conn.start().unwrap();
        drop(peer);

        wait_for(&callback.closed, 1).await;
        assert_eq!(callback.errored.load(Ordering::SeqCst), 0);
        assert!(conn.is_closed());
    }
}
