//! # Reconnecting Client
//!
//! A [`Client`] keeps one framed connection to a server alive. While running,
//! a supervisor task waits on a single-slot [`RelinkSignal`] and dials
//! whenever a reconnect is requested:
//!
//! - at `start()`;
//! - when the live connection closes;
//! - `relink_wait` after a failed dial (fixed backoff).
//!
//! Requests made while one is already pending are dropped, so a close racing
//! a retry timer never produces two dials. Only the first failure of a run of
//! consecutive dial failures is reported through `on_errored`.
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use frame_link::config::ClientConfig;
//! use frame_link::core::packet::Packet;
//! use frame_link::core::protocol::FramingProtocol;
//! use frame_link::transport::{Client, ConnCallback, Connection};
//!
//! struct Printer;
//!
//! impl ConnCallback for Printer {
//!     fn on_received(&self, _conn: &Arc<Connection>, packet: Packet) {
//!         println!("{:?}", packet.body());
//!     }
//! }
//!
//! # async fn run() -> frame_link::error::Result<()> {
//! let protocol = Arc::new(FramingProtocol::fixed_head_default());
//! let client = Client::new(ClientConfig::default(), protocol.clone(), Arc::new(Printer));
//! client.start()?;
//!
//! let packet = protocol.build_frame(&[0x01], b"ping")?;
//! client.send(&packet, Duration::from_secs(1)).await?;
//! client.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};

use crate::config::ClientConfig;
use crate::core::packet::Packet;
use crate::core::protocol::FramingProtocol;
use crate::error::{ProtocolError, Result};
use crate::transport::callback::ConnCallback;
use crate::transport::connection::{apply_keep_alive, Connection};
use crate::transport::relink::RelinkSignal;
use crate::utils::metrics::{global_metrics, Timer};
use crate::utils::timeout::with_timeout_error;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shutdown token and task set of one `start()`..`stop()` run.
#[derive(Clone)]
struct Run {
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl Run {
    fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }
}

struct ClientShared {
    config: ClientConfig,
    protocol: Arc<FramingProtocol>,
    callback: Arc<dyn ConnCallback>,
    conn: Mutex<Option<Arc<Connection>>>,
    relink: RelinkSignal,
    running: AtomicBool,
    link_failed: AtomicBool,
    next_id: AtomicI64,
    dial_attempts: AtomicU64,
}

impl ClientShared {
    fn current(&self) -> Option<Arc<Connection>> {
        lock(&self.conn).clone()
    }

    fn request_relink(&self) -> bool {
        if !self.running.load(Ordering::Acquire) {
            return false;
        }
        let queued = self.relink.request();
        if !queued {
            debug!("Reconnect already pending");
        }
        queued
    }

    async fn supervise(self: Arc<Self>, run: Run) {
        loop {
            tokio::select! {
                _ = run.cancel.cancelled() => break,
                _ = self.relink.wait() => self.link(&run).await,
            }
        }
        debug!("Client supervisor stopped");
    }

    #[instrument(skip(self, run), fields(address = %self.config.address))]
    async fn link(self: &Arc<Self>, run: &Run) {
        if self.current().is_some_and(|conn| !conn.is_closed()) {
            debug!("Already connected, skipping reconnect");
            return;
        }

        self.dial_attempts.fetch_add(1, Ordering::Relaxed);
        global_metrics().dial_attempt();
        let _timer = Timer::start("dial");

        let dial = with_timeout_error(
            async {
                TcpStream::connect(self.config.address.as_str())
                    .await
                    .map_err(ProtocolError::from)
            },
            self.config.connect_timeout,
        );
        let result = tokio::select! {
            _ = run.cancel.cancelled() => return,
            result = dial => result,
        };

        let stream = match result {
            Ok(stream) => stream,
            Err(e) => {
                global_metrics().dial_failure();
                if !self.link_failed.swap(true, Ordering::AcqRel) {
                    warn!(error = %e, "Dial failed");
                    self.callback.on_errored(&e, None);
                } else {
                    debug!(error = %e, "Dial failed again");
                }
                self.schedule_relink(run);
                return;
            }
        };

        self.link_failed.store(false, Ordering::Release);
        if let Err(e) = apply_keep_alive(&stream, self.config.keep_alive) {
            warn!(error = %e, "Failed to set TCP keep-alive");
        }

        let id = self.next_id.fetch_add(1, Ordering::AcqRel);
        let callback: Arc<dyn ConnCallback> = Arc::clone(self) as Arc<dyn ConnCallback>;
        let conn = Connection::with_owner(
            id,
            stream,
            Arc::clone(&self.protocol),
            callback,
            self.config.buffer_len,
            &run.cancel,
            &run.tracker,
        );
        *lock(&self.conn) = Some(Arc::clone(&conn));

        info!(conn_id = id, "Linked");
        if let Err(e) = conn.start() {
            warn!(conn_id = id, error = %e, "Failed to start connection");
        }
    }

    fn schedule_relink(self: &Arc<Self>, run: &Run) {
        let shared = Arc::clone(self);
        let cancel = run.cancel.clone();
        let wait = self.config.relink_wait;
        run.tracker.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(wait) => {
                    shared.request_relink();
                }
            }
        });
    }
}

impl ConnCallback for ClientShared {
    fn on_linked(&self, conn: &Arc<Connection>) {
        self.callback.on_linked(conn);
    }

    fn on_received(&self, conn: &Arc<Connection>, packet: Packet) {
        self.callback.on_received(conn, packet);
    }

    fn on_closed(&self, conn: &Arc<Connection>) {
        {
            let mut slot = lock(&self.conn);
            if slot.as_ref().is_some_and(|live| Arc::ptr_eq(live, conn)) {
                slot.take();
            }
        }
        self.callback.on_closed(conn);
        self.request_relink();
    }

    fn on_errored(&self, err: &ProtocolError, conn: Option<&Arc<Connection>>) {
        self.callback.on_errored(err, conn);
    }
}

/// A self-reconnecting framed TCP client.
pub struct Client {
    shared: Arc<ClientShared>,
    run: Mutex<Option<Run>>,
}

impl Client {
    pub fn new(
        config: ClientConfig,
        protocol: Arc<FramingProtocol>,
        callback: Arc<dyn ConnCallback>,
    ) -> Self {
        Self {
            shared: Arc::new(ClientShared {
                config,
                protocol,
                callback,
                conn: Mutex::new(None),
                relink: RelinkSignal::new(),
                running: AtomicBool::new(false),
                link_failed: AtomicBool::new(false),
                next_id: AtomicI64::new(1),
                dial_attempts: AtomicU64::new(0),
            }),
            run: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    pub fn protocol(&self) -> &FramingProtocol {
        &self.shared.protocol
    }

    /// Begin connecting in the background. Must be called within a Tokio
    /// runtime.
    #[instrument(skip(self), fields(address = %self.shared.config.address))]
    pub fn start(&self) -> Result<()> {
        let mut slot = lock(&self.run);
        if slot.is_some() {
            let err = ProtocolError::AlreadyRunning;
            self.shared.callback.on_errored(&err, None);
            return Err(err);
        }

        let run = Run::new();
        self.shared.running.store(true, Ordering::Release);
        self.shared.link_failed.store(false, Ordering::Release);
        self.shared.request_relink();
        run.tracker
            .spawn(Arc::clone(&self.shared).supervise(run.clone()));
        *slot = Some(run);

        info!("Client started");
        Ok(())
    }

    /// Stop reconnecting, close the live connection and wait for every task
    /// of this run to exit.
    #[instrument(skip(self), fields(address = %self.shared.config.address))]
    pub async fn stop(&self) -> Result<()> {
        let Some(run) = lock(&self.run).take() else {
            let err = ProtocolError::NotRunning;
            self.shared.callback.on_errored(&err, None);
            return Err(err);
        };

        self.shared.running.store(false, Ordering::Release);
        run.cancel.cancel();
        run.tracker.close();
        run.tracker.wait().await;

        lock(&self.shared.conn).take();
        self.shared.relink.clear();
        info!("Client stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        lock(&self.run).is_some()
    }

    /// Ask for a reconnect. Returns `Ok(false)` when a request is already
    /// pending and this one was dropped.
    ///
    /// Fails with [`ProtocolError::ConnectionClosed`] once the client is
    /// stopped.
    pub fn request_relink(&self) -> Result<bool> {
        if !self.shared.running.load(Ordering::Acquire) {
            return Err(ProtocolError::ConnectionClosed);
        }
        Ok(self.shared.request_relink())
    }

    /// Send through the live connection.
    pub async fn send(&self, packet: &Packet, timeout: Duration) -> Result<()> {
        match self.shared.current() {
            Some(conn) => conn.send(packet, timeout).await,
            None => Err(ProtocolError::ConnectionClosed),
        }
    }

    /// Id of the live connection, or -1 when there is none.
    pub fn id(&self) -> i64 {
        self.shared.current().map_or(-1, |conn| conn.id())
    }

    pub fn is_closed(&self) -> bool {
        self.shared.current().map_or(true, |conn| conn.is_closed())
    }

    /// The live connection, if any.
    pub fn connection(&self) -> Option<Arc<Connection>> {
        self.shared.current()
    }

    /// Dials attempted since construction.
    pub fn dial_attempts(&self) -> u64 {
        self.shared.dial_attempts.load(Ordering::Relaxed)
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Some(run) = lock(&self.run).take() {
            self.shared.running.store(false, Ordering::Release);
            run.cancel.cancel();
        }
    }
}
