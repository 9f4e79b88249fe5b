use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    fmt,
    rc::Rc,
};

use crate::{
    error::{ClientError, ErrorCode},
    message::Message,
    options::{ConnectOptions, SubscribeOptions, UnsubscribeOptions},
    persistence::{MemoryStore, Persistence, Store},
    session::{ClientImpl, ConnectStatus, Event, Notification, SessionParts},
    timer::{Scheduler, TokioScheduler},
    transport::{Connector, WsConnector},
};

/// Longest client id, in UTF-16 code units.
pub const MAX_CLIENT_ID_LEN: usize = 23;

type ConnectionLostHandler = Rc<RefCell<dyn FnMut(ErrorCode, &str)>>;
type MessageHandler = Rc<RefCell<dyn FnMut(&Message)>>;

#[derive(Default)]
struct Callbacks {
    on_connection_lost: Option<ConnectionLostHandler>,
    on_message_delivered: Option<MessageHandler>,
    on_message_arrived: Option<MessageHandler>,
}

/// The capabilities a client runs on.
///
/// A client can only be built when all three are present.
#[derive(Default)]
pub struct Platform {
    connector: Option<Box<dyn Connector>>,
    store: Option<Box<dyn Store>>,
    scheduler: Option<Rc<dyn Scheduler>>,
}

impl Platform {
    /// A platform with nothing in it.
    pub fn new() -> Self {
        Self::default()
    }

    /// WebSocket transport and timers on the current tokio `LocalSet`,
    /// in-memory persistence.
    pub fn tokio() -> Self {
        let mut platform = Self::new();
        platform
            .with_connector(WsConnector::new())
            .with_store(MemoryStore::new())
            .with_scheduler(Rc::new(TokioScheduler::new()));
        platform
    }

    pub fn with_connector<C: Connector + 'static>(&mut self, connector: C) -> &mut Self {
        self.connector = Some(Box::new(connector));
        self
    }

    pub fn with_store<S: Store + 'static>(&mut self, store: S) -> &mut Self {
        self.store = Some(Box::new(store));
        self
    }

    pub fn with_scheduler<S: Scheduler + 'static>(&mut self, scheduler: Rc<S>) -> &mut Self {
        self.scheduler = Some(scheduler);
        self
    }
}

impl fmt::Debug for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Platform")
            .field("connector", &self.connector.is_some())
            .field("store", &self.store.is_some())
            .field("scheduler", &self.scheduler.is_some())
            .finish()
    }
}

/// State behind a [`Client`] handle.
///
/// Events from transports and timers go through `inputs`. They are handled
/// one at a time, and callbacks run only when no borrow of the session is
/// held, so a callback may call back into the client.
pub(crate) struct Shared {
    session: RefCell<ClientImpl>,
    callbacks: RefCell<Callbacks>,
    inputs: RefCell<VecDeque<Event>>,
    busy: Cell<bool>,
}

impl Shared {
    fn with_session<R>(&self, f: impl FnOnce(&mut ClientImpl) -> R) -> R {
        let outermost = !self.busy.replace(true);
        let result = f(&mut self.session.borrow_mut());
        if outermost {
            self.pump();
            self.busy.set(false);
        }
        result
    }

    pub(crate) fn post(&self, event: Event) {
        self.inputs.borrow_mut().push_back(event);
        if !self.busy.get() {
            self.with_session(|_| ());
        }
    }

    fn pump(&self) {
        loop {
            let notification = self.session.borrow_mut().take_notification();
            if let Some(notification) = notification {
                self.dispatch(notification);
                continue;
            }

            let input = self.inputs.borrow_mut().pop_front();
            match input {
                Some(event) => self.session.borrow_mut().handle(event),
                None => return,
            }
        }
    }

    fn dispatch(&self, notification: Notification) {
        match notification {
            Notification::ConnectionLost { code, message } => {
                let handler = self.callbacks.borrow().on_connection_lost.clone();
                if let Some(handler) = handler {
                    let mut handler = handler.borrow_mut();
                    (&mut *handler)(code, &message);
                }
            }
            Notification::Delivered(message) => {
                let handler = self.callbacks.borrow().on_message_delivered.clone();
                if let Some(handler) = handler {
                    let mut handler = handler.borrow_mut();
                    (&mut *handler)(&message);
                }
            }
            Notification::Arrived(message) => {
                let handler = self.callbacks.borrow().on_message_arrived.clone();
                if let Some(handler) = handler {
                    let mut handler = handler.borrow_mut();
                    (&mut *handler)(&message);
                }
            }
            Notification::Success { callback, context } => callback(context),
            Notification::Failure {
                callback,
                context,
                code,
                message,
            } => callback(context, code, &message),
        }
    }
}

/// MQTT v3.1 client over WebSocket.
///
/// Handles are cheap to clone and all refer to the same session. The client
/// is single threaded: it lives on one thread and, with
/// [`Platform::tokio`], inside one `LocalSet`.
#[derive(Clone)]
pub struct Client {
    shared: Rc<Shared>,
}

impl Client {
    /// Builds a client for `ws://host:port/mqtt`.
    ///
    /// In-flight messages left in the platform store by an earlier client
    /// with the same host, port and client id are restored.
    pub fn new<H, C>(host: H, port: u16, client_id: C, platform: Platform) -> Result<Self, ClientError>
    where
        H: Into<String>,
        C: Into<String>,
    {
        let host = host.into();
        let client_id = client_id.into();

        if host.is_empty() {
            return Err(ClientError::InvalidArgument(format!("host:{host}")));
        }
        let len = client_id.encode_utf16().count();
        if len == 0 || len > MAX_CLIENT_ID_LEN {
            return Err(ClientError::InvalidArgument(format!("clientId:{client_id}")));
        }

        let Platform {
            connector,
            store,
            scheduler,
        } = platform;
        let connector = connector.ok_or(ClientError::Unsupported("WebSocket"))?;
        let store = store.ok_or(ClientError::Unsupported("localStorage"))?;
        let scheduler = scheduler.ok_or(ClientError::Unsupported("timers"))?;

        let persistence = Persistence::new(store, &host, port, &client_id);
        let restored = persistence.restore_all()?;

        let parts = SessionParts {
            host,
            port,
            client_id,
            connector,
            scheduler,
            persistence,
        };
        let shared = Rc::new_cyclic(|owner| Shared {
            session: RefCell::new(ClientImpl::new(owner.clone(), parts, restored)),
            callbacks: RefCell::new(Callbacks::default()),
            inputs: RefCell::new(VecDeque::new()),
            busy: Cell::new(false),
        });

        Ok(Self { shared })
    }

    pub fn host(&self) -> String {
        self.shared.with_session(|session| session.host().to_owned())
    }

    pub fn port(&self) -> u16 {
        self.shared.with_session(|session| session.port())
    }

    pub fn client_id(&self) -> String {
        self.shared
            .with_session(|session| session.client_id().to_owned())
    }

    pub fn is_connected(&self) -> bool {
        self.shared.with_session(|session| session.is_connected())
    }

    pub fn status(&self) -> ConnectStatus {
        self.shared.with_session(|session| session.status())
    }

    /// Identifiers of outbound requests still waiting for their handshake.
    pub fn sent_message_ids(&self) -> Vec<u16> {
        self.shared.with_session(|session| session.sent_message_ids())
    }

    /// Identifiers of QoS 2 messages received but not yet released.
    pub fn received_message_ids(&self) -> Vec<u16> {
        self.shared
            .with_session(|session| session.received_message_ids())
    }

    /// Starts connecting. The outcome is reported through the callbacks in
    /// `options`.
    pub fn connect(&self, options: ConnectOptions) -> Result<(), ClientError> {
        log::debug!("start connect.");
        self.shared.with_session(|session| session.connect(options))
    }

    pub fn subscribe(&self, filter: &str, options: SubscribeOptions) -> Result<(), ClientError> {
        log::debug!("start subscribe {filter}.");
        self.shared
            .with_session(|session| session.subscribe(filter, options))
    }

    pub fn unsubscribe(&self, filter: &str, options: UnsubscribeOptions) -> Result<(), ClientError> {
        log::debug!("start unsubscribe {filter}.");
        self.shared
            .with_session(|session| session.unsubscribe(filter, options))
    }

    pub fn send(&self, message: Message) -> Result<(), ClientError> {
        self.shared.with_session(|session| session.send(message))
    }

    /// Sends DISCONNECT and closes the connection. A connect still in
    /// progress is abandoned.
    pub fn disconnect(&self) -> Result<(), ClientError> {
        log::debug!("start disconnect.");
        self.shared.with_session(|session| session.disconnect())
    }

    pub fn start_trace(&self) {
        self.shared.with_session(|session| session.start_trace())
    }

    pub fn stop_trace(&self) {
        self.shared.with_session(|session| session.stop_trace())
    }

    /// `None` unless tracing is on.
    pub fn get_trace_log(&self) -> Option<Vec<String>> {
        self.shared.with_session(|session| session.trace_log())
    }

    /// Called once the connection is lost after a successful connect,
    /// including after an explicit disconnect.
    pub fn set_on_connection_lost<F>(&self, handler: F) -> &Self
    where
        F: FnMut(ErrorCode, &str) + 'static,
    {
        self.shared.callbacks.borrow_mut().on_connection_lost = Some(Rc::new(RefCell::new(handler)));
        self
    }

    pub fn set_on_message_delivered<F>(&self, handler: F) -> &Self
    where
        F: FnMut(&Message) + 'static,
    {
        self.shared.callbacks.borrow_mut().on_message_delivered =
            Some(Rc::new(RefCell::new(handler)));
        self
    }

    pub fn set_on_message_arrived<F>(&self, handler: F) -> &Self
    where
        F: FnMut(&Message) + 'static,
    {
        self.shared.callbacks.borrow_mut().on_message_arrived =
            Some(Rc::new(RefCell::new(handler)));
        self
    }

    /// Identifiers are allocated from `1..max`. `max` must be in
    /// `2..=65536`.
    pub fn set_max_message_identifier(&self, max: u32) -> Result<(), ClientError> {
        self.shared
            .with_session(|session| session.set_max_message_identifier(max))
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (host, port, client_id, status) = self.shared.with_session(|session| {
            (
                session.host().to_owned(),
                session.port(),
                session.client_id().to_owned(),
                session.status(),
            )
        });
        f.debug_struct("Client")
            .field("host", &host)
            .field("port", &port)
            .field("client_id", &client_id)
            .field("status", &status)
            .finish()
    }
}
