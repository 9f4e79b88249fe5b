//! Per-call options for connect, subscribe and unsubscribe.
//!
//! Options are built with `new()` and chained setters, or read from a JSON
//! object with `from_value`. JSON input is checked against a fixed list of
//! keys and types: an unknown key or a value of the wrong type is an error,
//! never ignored. Callbacks can only be attached through the setters.

use std::{fmt, time::Duration};

use serde_json::{Map, Value};

use crate::{
    error::{ClientError, ErrorCode},
    message::{Message, QualityOfService},
    timer::DEFAULT_KEEP_ALIVE,
};

/// Caller data handed back to the success or failure callback of a call.
pub type InvocationContext = Value;

pub type OnSuccess = Box<dyn FnOnce(Option<InvocationContext>)>;

pub type OnFailure = Box<dyn FnOnce(Option<InvocationContext>, ErrorCode, &str)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Number,
    String,
    Boolean,
    Object,
    Function,
}

impl Kind {
    fn of(value: &Value) -> Kind {
        match value {
            Value::Number(_) => Kind::Number,
            Value::String(_) => Kind::String,
            Value::Bool(_) => Kind::Boolean,
            Value::Null | Value::Array(_) | Value::Object(_) => Kind::Object,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Kind::Number => "number",
            Kind::String => "string",
            Kind::Boolean => "boolean",
            Kind::Object => "object",
            Kind::Function => "function",
        }
    }
}

const CONNECT_KEYS: &[(&str, Kind)] = &[
    ("timeout", Kind::Number),
    ("userName", Kind::String),
    ("password", Kind::String),
    ("willMessage", Kind::Object),
    ("keepAliveInterval", Kind::Number),
    ("cleanSession", Kind::Boolean),
    ("useSSL", Kind::Boolean),
    ("invocationContext", Kind::Object),
    ("onSuccess", Kind::Function),
    ("onFailure", Kind::Function),
];

const SUBSCRIBE_KEYS: &[(&str, Kind)] = &[
    ("qos", Kind::Number),
    ("invocationContext", Kind::Object),
    ("onSuccess", Kind::Function),
    ("onFailure", Kind::Function),
    ("timeout", Kind::Number),
];

const UNSUBSCRIBE_KEYS: &[(&str, Kind)] = &[
    ("invocationContext", Kind::Object),
    ("onSuccess", Kind::Function),
    ("onFailure", Kind::Function),
    ("timeout", Kind::Number),
];

fn validate<'a>(
    value: &'a Value,
    keys: &[(&str, Kind)],
) -> Result<Option<&'a Map<String, Value>>, ClientError> {
    let map = match value {
        Value::Null => return Ok(None),
        Value::Object(map) => map,
        other => return Err(ClientError::InvalidArgument(other.to_string())),
    };

    for (key, value) in map {
        let Some((_, expected)) = keys.iter().find(|(name, _)| *name == key.as_str()) else {
            let valid: Vec<&str> = keys.iter().map(|(name, _)| *name).collect();
            return Err(ClientError::UnknownProperty {
                key: key.clone(),
                valid: valid.join(" "),
            });
        };
        let found = Kind::of(value);
        if found != *expected {
            return Err(ClientError::InvalidType {
                key: key.clone(),
                found: found.name(),
            });
        }
    }

    Ok(Some(map))
}

fn invalid(key: &str, value: &Value) -> ClientError {
    ClientError::InvalidArgument(format!("{key}:{value}"))
}

fn seconds(key: &str, value: &Value) -> Result<Duration, ClientError> {
    value
        .as_f64()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .ok_or_else(|| invalid(key, value))
}

fn string(key: &str, value: &Value) -> Result<String, ClientError> {
    value
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| invalid(key, value))
}

fn boolean(key: &str, value: &Value) -> Result<bool, ClientError> {
    value.as_bool().ok_or_else(|| invalid(key, value))
}

/// A timeout of zero means no per-call timer.
fn armed(timeout: Option<Duration>) -> Option<Duration> {
    timeout.filter(|timeout| !timeout.is_zero())
}

#[derive(Default)]
pub struct ConnectOptions {
    pub(crate) timeout: Option<Duration>,
    pub(crate) user_name: Option<String>,
    pub(crate) password: Option<String>,
    pub(crate) will_message: Option<Message>,
    pub(crate) keep_alive_interval: Option<Duration>,
    pub(crate) clean_session: Option<bool>,
    pub(crate) use_ssl: bool,
    pub(crate) invocation_context: Option<InvocationContext>,
    pub(crate) on_success: Option<OnSuccess>,
    pub(crate) on_failure: Option<OnFailure>,
}

impl ConnectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(value: &Value) -> Result<Self, ClientError> {
        let mut options = Self::new();
        let Some(map) = validate(value, CONNECT_KEYS)? else {
            return Ok(options);
        };

        for (key, value) in map {
            match key.as_str() {
                "timeout" => {
                    options.set_timeout(seconds(key, value)?);
                }
                "userName" => {
                    options.set_user_name(string(key, value)?);
                }
                "password" => {
                    options.set_password(string(key, value)?);
                }
                // plain JSON is never a Message
                "willMessage" => return Err(ClientError::InvalidArgument(value.to_string())),
                "keepAliveInterval" => {
                    options.set_keep_alive_interval(seconds(key, value)?);
                }
                "cleanSession" => {
                    options.set_clean_session(boolean(key, value)?);
                }
                "useSSL" => {
                    options.set_use_ssl(boolean(key, value)?);
                }
                "invocationContext" => {
                    options.set_invocation_context(value.clone());
                }
                _ => {}
            }
        }

        Ok(options)
    }

    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn set_user_name<S: Into<String>>(&mut self, user_name: S) -> &mut Self {
        self.user_name = Some(user_name.into());
        self
    }

    pub fn set_password<S: Into<String>>(&mut self, password: S) -> &mut Self {
        self.password = Some(password.into());
        self
    }

    pub fn set_will_message(&mut self, will: Message) -> &mut Self {
        self.will_message = Some(will);
        self
    }

    pub fn set_keep_alive_interval(&mut self, keep_alive: Duration) -> &mut Self {
        self.keep_alive_interval = Some(keep_alive);
        self
    }

    pub fn set_clean_session(&mut self, clean: bool) -> &mut Self {
        self.clean_session = Some(clean);
        self
    }

    pub fn set_use_ssl(&mut self, use_ssl: bool) -> &mut Self {
        self.use_ssl = use_ssl;
        self
    }

    pub fn set_invocation_context(&mut self, context: InvocationContext) -> &mut Self {
        self.invocation_context = Some(context);
        self
    }

    pub fn set_on_success<F>(&mut self, callback: F) -> &mut Self
    where
        F: FnOnce(Option<InvocationContext>) + 'static,
    {
        self.on_success = Some(Box::new(callback));
        self
    }

    pub fn set_on_failure<F>(&mut self, callback: F) -> &mut Self
    where
        F: FnOnce(Option<InvocationContext>, ErrorCode, &str) + 'static,
    {
        self.on_failure = Some(Box::new(callback));
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn user_name(&self) -> Option<&str> {
        self.user_name.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn will_message(&self) -> Option<&Message> {
        self.will_message.as_ref()
    }

    pub fn keep_alive_interval(&self) -> Duration {
        self.keep_alive_interval.unwrap_or(DEFAULT_KEEP_ALIVE)
    }

    /// Defaults to a clean session.
    pub fn clean_session(&self) -> bool {
        self.clean_session.unwrap_or(true)
    }

    pub fn use_ssl(&self) -> bool {
        self.use_ssl
    }

    pub fn invocation_context(&self) -> Option<&InvocationContext> {
        self.invocation_context.as_ref()
    }

    pub(crate) fn check(&self) -> Result<(), ClientError> {
        if let Some(will) = &self.will_message {
            will.payload_string()?;
            if will.destination_name().is_none() {
                return Err(ClientError::InvalidArgument(
                    "Invalid parameter connectOptions.willMessage.destinationName:undefined"
                        .to_owned(),
                ));
            }
        }
        // CONNECT carries whole seconds
        let keep_alive = self.keep_alive_interval();
        if keep_alive.subsec_nanos() != 0 || keep_alive.as_secs() > u16::MAX as u64 {
            return Err(ClientError::InvalidArgument(format!(
                "keepAliveInterval:{}",
                keep_alive.as_secs_f64()
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("timeout", &self.timeout)
            .field("user_name", &self.user_name)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .field("will_message", &self.will_message)
            .field("keep_alive_interval", &self.keep_alive_interval)
            .field("clean_session", &self.clean_session)
            .field("use_ssl", &self.use_ssl)
            .field("invocation_context", &self.invocation_context)
            .field("on_success", &self.on_success.is_some())
            .field("on_failure", &self.on_failure.is_some())
            .finish()
    }
}

#[derive(Default)]
pub struct SubscribeOptions {
    pub(crate) qos: Option<QualityOfService>,
    pub(crate) invocation_context: Option<InvocationContext>,
    pub(crate) on_success: Option<OnSuccess>,
    pub(crate) on_failure: Option<OnFailure>,
    pub(crate) timeout: Option<Duration>,
}

impl SubscribeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(value: &Value) -> Result<Self, ClientError> {
        let mut options = Self::new();
        let Some(map) = validate(value, SUBSCRIBE_KEYS)? else {
            return Ok(options);
        };

        for (key, value) in map {
            match key.as_str() {
                "qos" => {
                    let qos = value
                        .as_u64()
                        .and_then(|qos| u8::try_from(qos).ok())
                        .and_then(|qos| QualityOfService::try_from(qos).ok())
                        .ok_or_else(|| {
                            ClientError::InvalidArgument(format!("Invalid option:{value}"))
                        })?;
                    options.set_qos(qos);
                }
                "invocationContext" => {
                    options.set_invocation_context(value.clone());
                }
                "timeout" => {
                    options.set_timeout(seconds(key, value)?);
                }
                _ => {}
            }
        }

        Ok(options)
    }

    pub fn set_qos(&mut self, qos: QualityOfService) -> &mut Self {
        self.qos = Some(qos);
        self
    }

    pub fn set_invocation_context(&mut self, context: InvocationContext) -> &mut Self {
        self.invocation_context = Some(context);
        self
    }

    pub fn set_on_success<F>(&mut self, callback: F) -> &mut Self
    where
        F: FnOnce(Option<InvocationContext>) + 'static,
    {
        self.on_success = Some(Box::new(callback));
        self
    }

    pub fn set_on_failure<F>(&mut self, callback: F) -> &mut Self
    where
        F: FnOnce(Option<InvocationContext>, ErrorCode, &str) + 'static,
    {
        self.on_failure = Some(Box::new(callback));
        self
    }

    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn qos(&self) -> QualityOfService {
        self.qos.unwrap_or_default()
    }

    pub fn timeout(&self) -> Option<Duration> {
        armed(self.timeout)
    }

    pub(crate) fn check(&self) -> Result<(), ClientError> {
        if self.timeout().is_some() && self.on_failure.is_none() {
            return Err(ClientError::InvalidArgument(
                "subscribeOptions.timeout specified with no onFailure callback.".to_owned(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for SubscribeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscribeOptions")
            .field("qos", &self.qos)
            .field("invocation_context", &self.invocation_context)
            .field("on_success", &self.on_success.is_some())
            .field("on_failure", &self.on_failure.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Default)]
pub struct UnsubscribeOptions {
    pub(crate) invocation_context: Option<InvocationContext>,
    pub(crate) on_success: Option<OnSuccess>,
    pub(crate) on_failure: Option<OnFailure>,
    pub(crate) timeout: Option<Duration>,
}

impl UnsubscribeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(value: &Value) -> Result<Self, ClientError> {
        let mut options = Self::new();
        let Some(map) = validate(value, UNSUBSCRIBE_KEYS)? else {
            return Ok(options);
        };

        for (key, value) in map {
            match key.as_str() {
                "invocationContext" => {
                    options.set_invocation_context(value.clone());
                }
                "timeout" => {
                    options.set_timeout(seconds(key, value)?);
                }
                _ => {}
            }
        }

        Ok(options)
    }

    pub fn set_invocation_context(&mut self, context: InvocationContext) -> &mut Self {
        self.invocation_context = Some(context);
        self
    }

    pub fn set_on_success<F>(&mut self, callback: F) -> &mut Self
    where
        F: FnOnce(Option<InvocationContext>) + 'static,
    {
        self.on_success = Some(Box::new(callback));
        self
    }

    pub fn set_on_failure<F>(&mut self, callback: F) -> &mut Self
    where
        F: FnOnce(Option<InvocationContext>, ErrorCode, &str) + 'static,
    {
        self.on_failure = Some(Box::new(callback));
        self
    }

    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        armed(self.timeout)
    }

    pub(crate) fn check(&self) -> Result<(), ClientError> {
        if self.timeout().is_some() && self.on_failure.is_none() {
            return Err(ClientError::InvalidArgument(
                "unsubscribeOptions.timeout specified with no onFailure callback.".to_owned(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for UnsubscribeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnsubscribeOptions")
            .field("invocation_context", &self.invocation_context)
            .field("on_success", &self.on_success.is_some())
            .field("on_failure", &self.on_failure.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}
