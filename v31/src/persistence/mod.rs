//! Durable mirror of in-flight PUBLISH packets.
//!
//! Every QoS 1/2 PUBLISH waiting for its handshake is written to a
//! [`Store`] under `<direction><host>:<port>:<clientId>:<msgId>`, so a new
//! client for the same server and client id picks the work up again.
//! Records are flat JSON with a hex encoded payload.

use std::{collections::BTreeMap, rc::Rc, sync::Arc};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{
    codec::{MessageType, PublishPacket, WireMessage},
    error::StoreError,
    message::{Message, QualityOfService},
};

pub use self::sled_store::SledStore;

mod sled_store;

const RECORD_VERSION: u8 = 1;

/// String keyed storage, accessed synchronously.
pub trait Store {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    fn remove(&self, key: &str) -> Result<(), StoreError>;

    fn keys(&self) -> Result<Vec<String>, StoreError>;
}

impl<S: Store + ?Sized> Store for Rc<S> {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key)
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        (**self).keys()
    }
}

impl<S: Store + ?Sized> Store for Arc<S> {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key)
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        (**self).keys()
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.lock().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.entries.lock().keys().cloned().collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Sent,
    Received,
}

impl Direction {
    pub fn prefix(self) -> &'static str {
        match self {
            Direction::Sent => "Sent:",
            Direction::Received => "Received:",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    #[serde(rename = "type")]
    pub message_type: u8,
    pub message_identifier: u16,
    pub version: u8,
    #[serde(default, skip_serializing_if = "is_false")]
    pub pub_rec_received: bool,
    pub payload_message: StoredPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredPayload {
    pub payload_hex: String,
    pub qos: u8,
    pub destination_name: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub duplicate: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub retained: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// A PUBLISH read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Restored {
    pub direction: Direction,
    pub message_identifier: u16,
    pub message: Message,
    pub pub_rec_received: bool,
}

/// Binds a [`Store`] to one client's key namespace.
pub struct Persistence {
    store: Box<dyn Store>,
    local_key: String,
}

impl Persistence {
    pub fn new(store: Box<dyn Store>, host: &str, port: u16, client_id: &str) -> Self {
        Self {
            store,
            local_key: format!("{host}:{port}:{client_id}:"),
        }
    }

    pub fn local_key(&self) -> &str {
        &self.local_key
    }

    pub fn key(&self, direction: Direction, message_identifier: u16) -> String {
        format!("{}{}{}", direction.prefix(), self.local_key, message_identifier)
    }

    /// Writes a PUBLISH. Any other packet type is rejected.
    pub fn store(
        &self,
        direction: Direction,
        packet: &WireMessage,
        pub_rec_received: bool,
    ) -> Result<(), StoreError> {
        let WireMessage::Publish(PublishPacket {
            message_identifier: Some(message_identifier),
            message,
        }) = packet
        else {
            return Err(StoreError::InvalidType(packet.message_type() as u8));
        };

        let record = StoredMessage {
            message_type: MessageType::Publish as u8,
            message_identifier: *message_identifier,
            version: RECORD_VERSION,
            pub_rec_received,
            payload_message: StoredPayload {
                payload_hex: hex::encode(message.payload_bytes()),
                qos: message.qos() as u8,
                destination_name: message.destination_name().unwrap_or_default().to_owned(),
                duplicate: message.duplicate(),
                retained: message.retained(),
            },
        };

        let value =
            serde_json::to_string(&record).map_err(|err| StoreError::Backend(err.to_string()))?;
        self.store
            .set(&self.key(direction, *message_identifier), &value)
    }

    pub fn remove(&self, direction: Direction, message_identifier: u16) -> Result<(), StoreError> {
        self.store.remove(&self.key(direction, message_identifier))
    }

    /// Reads one record. Keys outside this client's namespace yield `None`.
    pub fn restore(&self, key: &str) -> Result<Option<Restored>, StoreError> {
        let Some(direction) = self.direction_of(key) else {
            return Ok(None);
        };
        let Some(value) = self.store.get(key)? else {
            return Ok(None);
        };

        let invalid = |reason: String| StoreError::InvalidRecord {
            key: key.to_owned(),
            reason,
        };

        let record: StoredMessage =
            serde_json::from_str(&value).map_err(|err| invalid(err.to_string()))?;
        if record.message_type != MessageType::Publish as u8 {
            return Err(StoreError::InvalidType(record.message_type));
        }

        let payload = hex::decode(&record.payload_message.payload_hex)
            .map_err(|err| invalid(err.to_string()))?;
        let qos = QualityOfService::try_from(record.payload_message.qos)
            .map_err(|err| invalid(err.to_string()))?;

        let mut message =
            Message::from_bytes(payload).with_destination(record.payload_message.destination_name);
        message
            .set_qos(qos)
            .set_retained(record.payload_message.retained);
        message.set_duplicate(record.payload_message.duplicate);

        Ok(Some(Restored {
            direction,
            message_identifier: record.message_identifier,
            message,
            pub_rec_received: record.pub_rec_received,
        }))
    }

    /// Reads every record of this client. Unreadable records are skipped.
    pub fn restore_all(&self) -> Result<Vec<Restored>, StoreError> {
        let mut restored = Vec::new();
        for key in self.store.keys()? {
            match self.restore(&key) {
                Ok(Some(entry)) => restored.push(entry),
                Ok(None) => {}
                Err(err) => log::warn!("skip stored message {key}: {err}"),
            }
        }
        restored.sort_by_key(|entry| entry.message_identifier);
        Ok(restored)
    }

    /// Removes every record of this client in both directions.
    pub fn clear(&self) -> Result<(), StoreError> {
        for key in self.store.keys()? {
            if self.direction_of(&key).is_some() {
                self.store.remove(&key)?;
            }
        }
        Ok(())
    }

    fn direction_of(&self, key: &str) -> Option<Direction> {
        [Direction::Sent, Direction::Received]
            .into_iter()
            .find(|direction| {
                key.strip_prefix(direction.prefix())
                    .and_then(|rest| rest.strip_prefix(self.local_key.as_str()))
                    .is_some_and(|id| !id.is_empty())
            })
    }
}
