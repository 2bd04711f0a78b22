//! # Server
//!
//! [`Server::start`] binds a listener and then runs the accept loop in the
//! calling task until [`Server::stop`] is called, so callers that need to do
//! other work spawn it. It keeps exactly one accept outstanding. Each accept
//! runs in its own task; as soon as it completes (with a connection, an
//! error or a timeout) it signals the accept loop, which arms the next one
//! while the accepted connection is served concurrently. Accept failures
//! are logged and never stop the loop.
//!
//! Connection ids come from one counter per server, starting at 1 and never
//! reused, including across `stop()`/`start()`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, warn};

use crate::config::ServerConfig;
use crate::core::protocol::FramingProtocol;
use crate::error::{ProtocolError, Result};
use crate::transport::callback::ConnCallback;
use crate::transport::connection::{apply_keep_alive, Connection};
use crate::utils::metrics::global_metrics;
use crate::utils::timeout::with_optional_timeout;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone)]
struct Run {
    cancel: CancellationToken,
    tracker: TaskTracker,
}

struct ServerShared {
    config: ServerConfig,
    protocol: Arc<FramingProtocol>,
    callback: Arc<dyn ConnCallback>,
    next_id: AtomicI64,
    local_addr: watch::Sender<Option<SocketAddr>>,
}

impl ServerShared {
    async fn accept_loop(self: Arc<Self>, listener: Arc<TcpListener>, run: Run) {
        let (ready_tx, mut ready_rx) = mpsc::channel::<()>(1);
        self.arm_accept(&listener, &run, ready_tx.clone());

        loop {
            tokio::select! {
                _ = run.cancel.cancelled() => break,
                ready = ready_rx.recv() => match ready {
                    Some(()) => self.arm_accept(&listener, &run, ready_tx.clone()),
                    None => break,
                },
            }
        }
        debug!("Accept loop stopped");
    }

    fn arm_accept(
        self: &Arc<Self>,
        listener: &Arc<TcpListener>,
        run: &Run,
        ready: mpsc::Sender<()>,
    ) {
        let shared = Arc::clone(self);
        let listener = Arc::clone(listener);
        let task_run = run.clone();

        run.tracker.spawn(async move {
            let accept = with_optional_timeout(
                async { listener.accept().await.map_err(ProtocolError::from) },
                shared.config.accept_timeout,
            );
            let accepted = tokio::select! {
                _ = task_run.cancel.cancelled() => return,
                accepted = accept => accepted,
            };

            // Re-arm before serving; the loop may already be gone on shutdown.
            let _ = ready.send(()).await;

            match accepted {
                Ok((stream, peer)) => shared.serve(stream, peer, &task_run),
                Err(ProtocolError::Timeout) => {
                    debug!("Accept timed out");
                }
                Err(e) => {
                    global_metrics().accept_error();
                    warn!(error = %e, "Accept failed");
                }
            }
        });
    }

    fn serve(&self, stream: TcpStream, peer: SocketAddr, run: &Run) {
        if let Err(e) = apply_keep_alive(&stream, self.config.keep_alive) {
            warn!(peer = %peer, error = %e, "Failed to set TCP keep-alive");
        }

        let id = self.next_id.fetch_add(1, Ordering::AcqRel);
        debug!(conn_id = id, peer = %peer, "Accepted connection");
        let conn = Connection::with_owner(
            id,
            stream,
            Arc::clone(&self.protocol),
            Arc::clone(&self.callback),
            self.config.buffer_len,
            &run.cancel,
            &run.tracker,
        );
        if let Err(e) = conn.start() {
            warn!(conn_id = id, error = %e, "Failed to start connection");
        }
    }
}

/// A framed TCP server.
pub struct Server {
    shared: Arc<ServerShared>,
    run: Mutex<Option<Run>>,
}

impl Server {
    pub fn new(
        config: ServerConfig,
        protocol: Arc<FramingProtocol>,
        callback: Arc<dyn ConnCallback>,
    ) -> Self {
        let (local_addr, _) = watch::channel(None);
        Self {
            shared: Arc::new(ServerShared {
                config,
                protocol,
                callback,
                next_id: AtomicI64::new(1),
                local_addr,
            }),
            run: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.shared.config
    }

    pub fn protocol(&self) -> &FramingProtocol {
        &self.shared.protocol
    }

    fn already_running(&self) -> ProtocolError {
        let err = ProtocolError::AlreadyRunning;
        self.shared.callback.on_errored(&err, None);
        err
    }

    /// Bind and run the accept loop until [`stop`](Self::stop) is called.
    ///
    /// Bind failures are reported through `on_errored` and returned at once.
    /// Use [`listening`](Self::listening) from another task to learn the
    /// bound address.
    #[instrument(skip(self), fields(address = %self.shared.config.address))]
    pub async fn start(&self) -> Result<()> {
        if lock(&self.run).is_some() {
            return Err(self.already_running());
        }

        let listener = match TcpListener::bind(self.shared.config.address.as_str()).await {
            Ok(listener) => listener,
            Err(e) => {
                let err = ProtocolError::Io(e);
                error!(error = %err, "Bind failed");
                self.shared.callback.on_errored(&err, None);
                return Err(err);
            }
        };
        let addr = listener.local_addr()?;

        let run = Run {
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        };
        {
            let mut slot = lock(&self.run);
            if slot.is_some() {
                drop(slot);
                return Err(self.already_running());
            }
            *slot = Some(run.clone());
        }

        self.shared.local_addr.send_replace(Some(addr));
        info!(local_addr = %addr, "Listening");
        let accept_loop = Arc::clone(&self.shared).accept_loop(Arc::new(listener), run.clone());
        run.tracker.track_future(accept_loop).await;
        Ok(())
    }

    /// Close the listener, close every connection this run accepted and wait
    /// for all of their tasks, the accept loop included, to exit.
    #[instrument(skip(self), fields(address = %self.shared.config.address))]
    pub async fn stop(&self) -> Result<()> {
        let Some(run) = lock(&self.run).take() else {
            let err = ProtocolError::NotRunning;
            self.shared.callback.on_errored(&err, None);
            return Err(err);
        };

        run.cancel.cancel();
        run.tracker.close();
        run.tracker.wait().await;

        self.shared.local_addr.send_replace(None);
        info!("Server stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        lock(&self.run).is_some()
    }

    /// The bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.shared.local_addr.borrow()
    }

    /// Wait until the server is listening and return the bound address.
    pub async fn listening(&self) -> SocketAddr {
        let mut rx = self.shared.local_addr.subscribe();
        loop {
            let current = *rx.borrow_and_update();
            if let Some(addr) = current {
                return addr;
            }
            // The sender lives as long as `self`.
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// The id the next accepted connection will receive.
    pub fn next_id(&self) -> i64 {
        self.shared.next_id.load(Ordering::Acquire)
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Some(run) = lock(&self.run).take() {
            run.cancel.cancel();
        }
    }
}
