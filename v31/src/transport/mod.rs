//! The byte stream the client runs over.
//!
//! A [`Connector`] opens one [`Transport`] per connect attempt and reports
//! what happens on it through the [`EventSink`] it was given. Events from a
//! transport the client has already dropped are ignored.

use std::{fmt, rc::Weak};

use url::Url;

use crate::{
    client::Shared,
    error::TransportError,
    session::{Event, SocketEvent},
};

pub use self::ws::{WsConnector, SUB_PROTOCOL};

mod ws;

/// Opens transports.
///
/// Implementations must not call the `EventSink` or the client from inside
/// `open`, `send` or `close`. Events are expected to arrive later, from the
/// event loop.
pub trait Connector {
    fn open(&self, url: &Url, events: EventSink) -> Result<Box<dyn Transport>, TransportError>;
}

pub trait Transport {
    /// Writes one complete packet.
    fn send(&mut self, bytes: Vec<u8>) -> Result<(), TransportError>;

    fn close(&mut self);
}

/// Feeds transport events back into the client that opened the transport.
#[derive(Clone)]
pub struct EventSink {
    client: Weak<Shared>,
    generation: u64,
}

impl EventSink {
    pub(crate) fn new(client: Weak<Shared>, generation: u64) -> Self {
        Self { client, generation }
    }

    /// The connection is established.
    pub fn opened(&self) {
        self.post(SocketEvent::Open);
    }

    /// Bytes arrived. They need not be aligned with packet boundaries.
    pub fn message(&self, bytes: &[u8]) {
        self.post(SocketEvent::Message(bytes.to_vec()));
    }

    pub fn error(&self, reason: &str) {
        self.post(SocketEvent::Error(reason.to_owned()));
    }

    pub fn closed(&self) {
        self.post(SocketEvent::Close);
    }

    /// False once the client is gone.
    pub fn is_attached(&self) -> bool {
        self.client.strong_count() > 0
    }

    fn post(&self, event: SocketEvent) {
        if let Some(client) = self.client.upgrade() {
            client.post(Event::Socket(self.generation, event));
        }
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("generation", &self.generation)
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// `ws://host:port/mqtt`, or `wss://` when `use_ssl` is set.
pub fn server_url(host: &str, port: u16, use_ssl: bool) -> Result<Url, TransportError> {
    let scheme = if use_ssl { "wss" } else { "ws" };
    let host = if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]")
    } else {
        host.to_owned()
    };
    Ok(Url::parse(&format!("{scheme}://{host}:{port}/mqtt"))?)
}
