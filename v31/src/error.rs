use std::fmt;

/// Reason codes reported to `on_failure` and `on_connection_lost` callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Ok,
    ConnectTimeout,
    SubscribeTimeout,
    UnsubscribeTimeout,
    PingTimeout,
    InternalError,
    ConnackReturnCode,
    SocketError,
    SocketClose,
    MalformedUtf,
    Unsupported,
}

impl ErrorCode {
    pub fn code(self) -> u8 {
        match self {
            ErrorCode::Ok => 0,
            ErrorCode::ConnectTimeout => 1,
            ErrorCode::SubscribeTimeout => 2,
            ErrorCode::UnsubscribeTimeout => 3,
            ErrorCode::PingTimeout => 4,
            ErrorCode::InternalError => 5,
            ErrorCode::ConnackReturnCode => 6,
            ErrorCode::SocketError => 7,
            ErrorCode::SocketClose => 8,
            ErrorCode::MalformedUtf => 9,
            ErrorCode::Unsupported => 10,
        }
    }

    /// Message template, `{n}` marks the n-th substitution.
    pub fn text(self) -> &'static str {
        match self {
            ErrorCode::Ok => "AMQJS0000I OK.",
            ErrorCode::ConnectTimeout => "AMQJSC0001E Connect timed out.",
            ErrorCode::SubscribeTimeout => "AMQJS0002E Subscribe timed out.",
            ErrorCode::UnsubscribeTimeout => "AMQJS0003E Unsubscribe timed out.",
            ErrorCode::PingTimeout => "AMQJS0004E Ping timed out.",
            ErrorCode::InternalError => "AMQJS0005E Internal error. {0}",
            ErrorCode::ConnackReturnCode => "AMQJS0006E Bad Connack return code:{0}",
            ErrorCode::SocketError => "AMQJS0007E Socket error:{0}",
            ErrorCode::SocketClose => "AMQJS0008I Socket closed.",
            ErrorCode::MalformedUtf => "AMQJS0009E Malformed UTF data:{0} {1} {2}",
            ErrorCode::Unsupported => "AMQJS0010E {0} is not supported by this browser",
        }
    }

    /// Renders the template. Missing substitutions are left empty.
    pub fn format(self, substitutions: &[&str]) -> String {
        let mut text = self.text().to_owned();
        for i in 0.. {
            let field = format!("{{{i}}}");
            if !text.contains(&field) {
                break;
            }
            let value = substitutions.get(i).copied().unwrap_or_default();
            text = text.replacen(&field, value, 1);
        }
        text.trim_end().to_owned()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

fn hex_bytes(bytes: &[u8]) -> Vec<String> {
    bytes.iter().map(|b| format!("{b:x}")).collect()
}

fn format_malformed(bytes: &[u8]) -> String {
    let hex = hex_bytes(bytes);
    let subs: Vec<&str> = hex.iter().map(String::as_str).collect();
    ErrorCode::MalformedUtf.format(&subs)
}

fn format_unsupported(capability: &str) -> String {
    ErrorCode::Unsupported.format(&[capability])
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("{}", format_malformed(.0))]
    MalformedUtf(Vec<u8>),
    #[error("Malformed remaining length")]
    MalformedLength,
    #[error("Invalid message type: {0}")]
    InvalidType(u8),
    #[error("Invalid qos: {0}")]
    InvalidQos(u8),
    #[error("Truncated packet: need {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },
    #[error("Packet too large: {0} bytes")]
    PacketTooLarge(usize),
    #[error("String too long: {0} bytes")]
    StringTooLong(usize),
    #[error("Missing field {0}")]
    MissingField(&'static str),
    #[error("Invalid protocol identifier")]
    InvalidProtocol,
    #[error("Io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for CodecError {
    fn from(err: std::io::Error) -> Self {
        CodecError::Io(err.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store backend: {0}")]
    Backend(String),
    #[error("Invalid stored record {key}: {reason}")]
    InvalidRecord { key: String, reason: String },
    #[error("Invalid type: {0}")]
    InvalidType(u8),
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("Invalid url: {0}")]
    InvalidUrl(String),
    #[error("Transport closed")]
    Closed,
    #[error("Transport error: {0}")]
    Io(String),
}

impl From<url::ParseError> for TransportError {
    fn from(err: url::ParseError) -> Self {
        TransportError::InvalidUrl(err.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Invalid state, {0}.")]
    InvalidState(&'static str),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Unknown property, {key}. Valid properties are: {valid}")]
    UnknownProperty { key: String, valid: String },
    #[error("InvalidType:{found} for {key}")]
    InvalidType { key: String, found: &'static str },
    #[error("Too many messages:{0}")]
    TooManyMessages(usize),
    #[error("{}", format_unsupported(.0))]
    Unsupported(&'static str),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}
