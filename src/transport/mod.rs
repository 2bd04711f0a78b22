//! # TCP Transport
//!
//! Framed connections over TCP, plus the two owners that create them.
//!
//! ## Components
//! - **Connection**: read task + dispatch task around one socket, at-most-once close
//! - **Client**: keeps one connection alive, reconnecting with a fixed backoff
//! - **Server**: self-re-arming accept loop with monotonic connection ids
//! - **ConnCallback**: the owner-supplied event sink
//!
//! ## Shutdown
//! Every task an owner spawns is registered with a `TaskTracker` and watches
//! a `CancellationToken`. `stop()` cancels the token and waits for the
//! tracker to drain, so no task outlives it.

pub mod callback;
pub mod client;
pub mod connection;
pub mod relink;
pub mod server;

pub use callback::ConnCallback;
pub use client::Client;
pub use connection::Connection;
pub use relink::RelinkSignal;
pub use server::Server;
