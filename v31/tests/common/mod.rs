#![allow(dead_code)]

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use mqttws_client_v31::{
    codec::{ConnackPacket, WireMessage},
    persistence::{MemoryStore, Persistence},
    timer::ManualScheduler,
    transport::{Connector, EventSink, Transport},
    Client, ConnectOptions, ErrorCode, Message, Platform, QualityOfService, TransportError,
};
use url::Url;

pub const HOST: &str = "localhost";
pub const PORT: u16 = 8083;
pub const CLIENT_ID: &str = "c1";

/// What the client did to its transports.
#[derive(Default)]
pub struct Wire {
    pub urls: RefCell<Vec<String>>,
    pub sinks: RefCell<Vec<EventSink>>,
    pub writes: RefCell<Vec<Vec<u8>>>,
    pub closes: Cell<usize>,
    pub fail_writes: Cell<bool>,
}

struct MockConnector(Rc<Wire>);

impl Connector for MockConnector {
    fn open(&self, url: &Url, events: EventSink) -> Result<Box<dyn Transport>, TransportError> {
        self.0.urls.borrow_mut().push(url.to_string());
        self.0.sinks.borrow_mut().push(events);
        Ok(Box::new(MockTransport(self.0.clone())))
    }
}

struct MockTransport(Rc<Wire>);

impl Transport for MockTransport {
    fn send(&mut self, bytes: Vec<u8>) -> Result<(), TransportError> {
        if self.0.fail_writes.get() {
            return Err(TransportError::Io("broken pipe".to_owned()));
        }
        self.0.writes.borrow_mut().push(bytes);
        Ok(())
    }

    fn close(&mut self) {
        self.0.closes.set(self.0.closes.get() + 1);
    }
}

/// Records callbacks in the order they ran.
#[derive(Clone, Default)]
pub struct Log(Rc<RefCell<Vec<String>>>);

impl Log {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.borrow_mut().push(entry.into());
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.borrow_mut())
    }
}

pub struct Harness {
    pub client: Client,
    pub wire: Rc<Wire>,
    pub clock: Rc<ManualScheduler>,
    pub store: Rc<MemoryStore>,
    pub log: Log,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(Rc::new(MemoryStore::new()))
    }

    pub fn with_store(store: Rc<MemoryStore>) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let wire = Rc::new(Wire::default());
        let clock = Rc::new(ManualScheduler::new());
        let mut platform = Platform::new();
        platform
            .with_connector(MockConnector(wire.clone()))
            .with_store(store.clone())
            .with_scheduler(clock.clone());
        let client = Client::new(HOST, PORT, CLIENT_ID, platform).unwrap();

        let log = Log::default();
        let lost = log.clone();
        client.set_on_connection_lost(move |code, message| {
            lost.push(format!("lost {code} {message}"));
        });
        let delivered = log.clone();
        client.set_on_message_delivered(move |message| {
            delivered.push(format!("delivered {}", message.payload_string().unwrap()));
        });
        let arrived = log.clone();
        client.set_on_message_arrived(move |message| {
            arrived.push(format!(
                "arrived {} {}",
                message.destination_name().unwrap(),
                message.payload_string().unwrap()
            ));
        });

        Self {
            client,
            wire,
            clock,
            store,
            log,
        }
    }

    pub fn persistence(&self) -> Persistence {
        Persistence::new(Box::new(self.store.clone()), HOST, PORT, CLIENT_ID)
    }

    /// Sink of the most recent transport.
    pub fn sink(&self) -> EventSink {
        self.wire.sinks.borrow().last().cloned().unwrap()
    }

    pub fn open(&self) {
        self.sink().opened();
    }

    pub fn deliver(&self, packet: WireMessage) {
        self.sink().message(&packet.encode().unwrap());
    }

    pub fn deliver_bytes(&self, bytes: &[u8]) {
        self.sink().message(bytes);
    }

    /// Drains and decodes everything written since the last call.
    pub fn written(&self) -> Vec<WireMessage> {
        std::mem::take(&mut *self.wire.writes.borrow_mut())
            .iter()
            .map(|bytes| WireMessage::decode(bytes).unwrap())
            .collect()
    }

    /// Connects and accepts the session.
    pub fn connect(&self, options: ConnectOptions) {
        self.client.connect(options).unwrap();
        self.open();
        self.deliver(connack(0));
        assert!(self.client.is_connected());
    }

    pub fn connect_keeping_session(&self) {
        let mut options = ConnectOptions::new();
        options.set_clean_session(false);
        self.connect(options);
    }
}

pub fn connack(return_code: u8) -> WireMessage {
    WireMessage::Connack(ConnackPacket {
        topic_name_compression_response: 0,
        return_code,
    })
}

pub fn message(topic: &str, payload: &str, qos: QualityOfService) -> Message {
    let mut message = Message::from_string(payload);
    message.set_destination_name(topic).unwrap();
    message.set_qos(qos);
    message
}

pub fn lost(code: ErrorCode, text: &str) -> String {
    format!("lost {code} {text}")
}
