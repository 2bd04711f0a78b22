//! Owner callbacks.
//!
//! A [`ConnCallback`] is the capability set a connection's owner supplies.
//! Every method is invoked synchronously from the connection's background
//! tasks, so implementations should hand long work off rather than block.
//!
//! For a single connection `on_linked` precedes every `on_received`, which
//! precedes the one and only `on_closed`. Nothing is ordered across
//! connections.

use std::sync::Arc;

use crate::core::packet::Packet;
use crate::error::ProtocolError;
use crate::transport::connection::Connection;

pub trait ConnCallback: Send + Sync + 'static {
    /// The connection's tasks are running and it may be used for sending.
    fn on_linked(&self, _conn: &Arc<Connection>) {}

    /// A complete, verified packet arrived.
    fn on_received(&self, conn: &Arc<Connection>, packet: Packet);

    /// The connection is closed. Fires at most once per connection.
    fn on_closed(&self, _conn: &Arc<Connection>) {}

    /// An error worth surfacing. `conn` is `None` for errors that do not
    /// belong to a live connection (dial and bind failures, lifecycle misuse).
    fn on_errored(&self, _err: &ProtocolError, _conn: Option<&Arc<Connection>>) {}
}
