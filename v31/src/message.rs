use std::cell::OnceCell;

use crate::{
    codec::utf8,
    error::{ClientError, CodecError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum QualityOfService {
    #[default]
    Level0 = 0,
    Level1 = 1,
    Level2 = 2,
}

impl TryFrom<u8> for QualityOfService {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(QualityOfService::Level0),
            1 => Ok(QualityOfService::Level1),
            2 => Ok(QualityOfService::Level2),
            n => Err(CodecError::InvalidQos(n)),
        }
    }
}

impl From<QualityOfService> for u8 {
    fn from(qos: QualityOfService) -> Self {
        qos as u8
    }
}

#[derive(Debug, Clone)]
enum Payload {
    Text(String),
    Bytes(Vec<u8>),
}

/// An application message, either published by this client or delivered to it.
///
/// The payload is kept in the form it was created from. The other view is
/// computed on first access and cached, so both views always describe the
/// same bytes.
#[derive(Debug, Clone)]
pub struct Message {
    payload: Payload,
    bytes_view: OnceCell<Vec<u8>>,
    string_view: OnceCell<Result<String, CodecError>>,
    destination_name: Option<String>,
    qos: QualityOfService,
    retained: bool,
    duplicate: bool,
}

impl Message {
    fn with_payload(payload: Payload) -> Self {
        Self {
            payload,
            bytes_view: OnceCell::new(),
            string_view: OnceCell::new(),
            destination_name: None,
            qos: QualityOfService::Level0,
            retained: false,
            duplicate: false,
        }
    }

    pub fn from_string<S: Into<String>>(payload: S) -> Self {
        Self::with_payload(Payload::Text(payload.into()))
    }

    pub fn from_bytes<V: Into<Vec<u8>>>(payload: V) -> Self {
        Self::with_payload(Payload::Bytes(payload.into()))
    }

    pub fn payload_bytes(&self) -> &[u8] {
        match &self.payload {
            Payload::Bytes(bytes) => bytes,
            Payload::Text(text) => self.bytes_view.get_or_init(|| utf8::encode(text)),
        }
    }

    /// Fails when a binary payload is not valid modified UTF-8.
    pub fn payload_string(&self) -> Result<&str, CodecError> {
        match &self.payload {
            Payload::Text(text) => Ok(text),
            Payload::Bytes(bytes) => self
                .string_view
                .get_or_init(|| utf8::decode(bytes))
                .as_deref()
                .map_err(Clone::clone),
        }
    }

    pub fn destination_name(&self) -> Option<&str> {
        self.destination_name.as_deref()
    }

    /// The destination can be chosen once. A message handed to
    /// `Client::send` is moved, so it can't be retargeted afterwards either.
    pub fn set_destination_name<S: Into<String>>(&mut self, name: S) -> Result<(), ClientError> {
        if let Some(current) = &self.destination_name {
            return Err(ClientError::InvalidArgument(format!(
                "destinationName already set to {current}"
            )));
        }
        self.destination_name = Some(name.into());
        Ok(())
    }

    pub fn qos(&self) -> QualityOfService {
        self.qos
    }

    pub fn set_qos(&mut self, qos: QualityOfService) -> &mut Self {
        self.qos = qos;
        self
    }

    pub fn retained(&self) -> bool {
        self.retained
    }

    pub fn set_retained(&mut self, retained: bool) -> &mut Self {
        self.retained = retained;
        self
    }

    pub fn duplicate(&self) -> bool {
        self.duplicate
    }

    pub(crate) fn set_duplicate(&mut self, duplicate: bool) {
        self.duplicate = duplicate;
    }

    pub(crate) fn with_destination(mut self, name: String) -> Self {
        self.destination_name = Some(name);
        self
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.payload_bytes() == other.payload_bytes()
            && self.destination_name == other.destination_name
            && self.qos == other.qos
            && self.retained == other.retained
            && self.duplicate == other.duplicate
    }
}

impl From<&str> for Message {
    fn from(payload: &str) -> Self {
        Message::from_string(payload)
    }
}

impl From<String> for Message {
    fn from(payload: String) -> Self {
        Message::from_string(payload)
    }
}

impl From<Vec<u8>> for Message {
    fn from(payload: Vec<u8>) -> Self {
        Message::from_bytes(payload)
    }
}

impl From<&[u8]> for Message {
    fn from(payload: &[u8]) -> Self {
        Message::from_bytes(payload)
    }
}
