//! MQTT v3.1 client over WebSocket.
//!
//! A [`Client`] talks to one broker at `ws://host:port/mqtt` using the
//! `mqttv3.1` sub-protocol. QoS 1 and 2 messages in flight are mirrored to a
//! [`persistence::Store`] so a later client with the same identity can
//! finish their handshakes.

pub mod client;
pub mod codec;
pub mod error;
pub mod message;
pub mod options;
pub mod persistence;
mod session;
pub mod timer;
mod trace;
pub mod transport;

pub use client::{Client, Platform, MAX_CLIENT_ID_LEN};
pub use error::{ClientError, CodecError, ErrorCode, StoreError, TransportError};
pub use message::{Message, QualityOfService};
pub use options::{ConnectOptions, InvocationContext, SubscribeOptions, UnsubscribeOptions};
pub use session::{ConnectStatus, DEFAULT_MAX_MESSAGE_IDENTIFIER};
pub use trace::MAX_TRACE_ENTRIES;
