//! Connection lifecycle, message identifiers and QoS handshakes.
//!
//! `ClientImpl` never runs user callbacks itself. Everything the
//! application must hear about is queued as a [`Notification`] and handed
//! out by the facade once the session borrow has been released.

use std::{
    collections::{BTreeMap, VecDeque},
    fmt,
    rc::{Rc, Weak},
    time::SystemTime,
};

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::{
    client::Shared,
    codec::{
        ConnackPacket, ConnectPacket, MessageType, MqttCodec, PublishPacket, SubscribePacket,
        UnsubscribePacket, WireMessage,
    },
    error::{ClientError, CodecError, ErrorCode},
    message::{Message, QualityOfService},
    options::{
        ConnectOptions, InvocationContext, OnFailure, OnSuccess, SubscribeOptions,
        UnsubscribeOptions,
    },
    persistence::{Direction, Persistence, Restored},
    timer::{PingAction, Pinger, Scheduler, Task, Timeout},
    trace::TraceBuffer,
    transport::{server_url, Connector, EventSink, Transport},
};

/// Default upper bound (exclusive) for message identifiers.
pub const DEFAULT_MAX_MESSAGE_IDENTIFIER: u32 = 65536;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStatus {
    Disconnected,
    /// Transport opening, CONNECT not sent yet.
    Connecting,
    AwaitingConnack,
    Connected,
}

#[derive(Debug)]
pub(crate) enum SocketEvent {
    Open,
    Message(Vec<u8>),
    Error(String),
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerEvent {
    Ping { generation: u64 },
    ConnectTimeout { generation: u64 },
    SubscribeTimeout { id: u16, seq: u64 },
    UnsubscribeTimeout { id: u16, seq: u64 },
}

#[derive(Debug)]
pub(crate) enum Event {
    /// Tagged with the generation of the transport that produced it.
    Socket(u64, SocketEvent),
    Timer(TimerEvent),
}

pub(crate) enum Notification {
    ConnectionLost {
        code: ErrorCode,
        message: String,
    },
    Delivered(Message),
    Arrived(Message),
    Success {
        callback: OnSuccess,
        context: Option<InvocationContext>,
    },
    Failure {
        callback: OnFailure,
        context: Option<InvocationContext>,
        code: ErrorCode,
        message: String,
    },
}

struct SessionTimer {
    client: Weak<Shared>,
    event: TimerEvent,
}

impl Task for SessionTimer {
    fn fire(self: Box<Self>) {
        let SessionTimer { client, event } = *self;
        if let Some(client) = client.upgrade() {
            client.post(Event::Timer(event));
        }
    }
}

struct PendingConnect {
    clean_session: bool,
    packet: Vec<u8>,
    context: Option<InvocationContext>,
    on_success: Option<OnSuccess>,
    on_failure: Option<OnFailure>,
}

struct SentEntry {
    packet: WireMessage,
    pub_rec_received: bool,
    /// Admission order, used for replay.
    seq: u64,
    context: Option<InvocationContext>,
    on_success: Option<OnSuccess>,
    on_failure: Option<OnFailure>,
    timeout: Option<Timeout>,
}

impl SentEntry {
    fn new(packet: WireMessage, seq: u64) -> Self {
        Self {
            packet,
            pub_rec_received: false,
            seq,
            context: None,
            on_success: None,
            on_failure: None,
            timeout: None,
        }
    }

    fn is_publish(&self) -> bool {
        matches!(self.packet, WireMessage::Publish(_))
    }
}

impl fmt::Debug for SentEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SentEntry")
            .field("packet", &self.packet)
            .field("pub_rec_received", &self.pub_rec_received)
            .field("seq", &self.seq)
            .field("timeout", &self.timeout)
            .finish()
    }
}

enum AfterWrite {
    Delivered(Message),
    Disconnect,
}

struct Outbound {
    message_type: MessageType,
    message_identifier: Option<u16>,
    bytes: Vec<u8>,
    after_write: Option<AfterWrite>,
}

impl Outbound {
    fn new(packet: &WireMessage) -> Result<Self, CodecError> {
        Ok(Self {
            message_type: packet.message_type(),
            message_identifier: packet.message_identifier(),
            bytes: packet.encode()?,
            after_write: None,
        })
    }

    fn then(mut self, action: AfterWrite) -> Self {
        self.after_write = Some(action);
        self
    }
}

pub(crate) struct SessionParts {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub connector: Box<dyn Connector>,
    pub scheduler: Rc<dyn Scheduler>,
    pub persistence: Persistence,
}

pub(crate) struct ClientImpl {
    owner: Weak<Shared>,
    host: String,
    port: u16,
    client_id: String,
    connector: Box<dyn Connector>,
    scheduler: Rc<dyn Scheduler>,
    persistence: Persistence,

    status: ConnectStatus,
    /// Bumped for every transport, events of older ones are dropped.
    generation: u64,
    transport: Option<Box<dyn Transport>>,
    connect: Option<PendingConnect>,
    connect_timeout: Option<Timeout>,
    pinger: Option<Pinger>,

    sent: BTreeMap<u16, SentEntry>,
    received: BTreeMap<u16, Message>,
    queue: VecDeque<Outbound>,
    next_seq: u64,
    next_message_identifier: u32,
    max_message_identifier: u32,

    codec: MqttCodec,
    receive_buffer: BytesMut,
    notifications: VecDeque<Notification>,
    trace: TraceBuffer,
}

impl ClientImpl {
    pub(crate) fn new(owner: Weak<Shared>, parts: SessionParts, restored: Vec<Restored>) -> Self {
        let SessionParts {
            host,
            port,
            client_id,
            connector,
            scheduler,
            persistence,
        } = parts;

        let mut session = Self {
            owner,
            host,
            port,
            client_id,
            connector,
            scheduler,
            persistence,
            status: ConnectStatus::Disconnected,
            generation: 0,
            transport: None,
            connect: None,
            connect_timeout: None,
            pinger: None,
            sent: BTreeMap::new(),
            received: BTreeMap::new(),
            queue: VecDeque::new(),
            next_seq: 0,
            next_message_identifier: 1,
            max_message_identifier: DEFAULT_MAX_MESSAGE_IDENTIFIER,
            codec: MqttCodec::new(),
            receive_buffer: BytesMut::new(),
            notifications: VecDeque::new(),
            trace: TraceBuffer::new(),
        };

        for entry in restored {
            let Restored {
                direction,
                message_identifier,
                message,
                pub_rec_received,
            } = entry;
            match direction {
                Direction::Sent => {
                    let packet = WireMessage::Publish(PublishPacket {
                        message_identifier: Some(message_identifier),
                        message,
                    });
                    let seq = session.next_seq();
                    let mut entry = SentEntry::new(packet, seq);
                    entry.pub_rec_received = pub_rec_received;
                    session.sent.insert(message_identifier, entry);
                }
                Direction::Received => {
                    session.received.insert(message_identifier, message);
                }
            }
        }
        if !session.sent.is_empty() || !session.received.is_empty() {
            log::info!(
                "restored {} sent and {} received messages.",
                session.sent.len(),
                session.received.len()
            );
        }

        session
    }

    pub(crate) fn host(&self) -> &str {
        &self.host
    }

    pub(crate) fn port(&self) -> u16 {
        self.port
    }

    pub(crate) fn client_id(&self) -> &str {
        &self.client_id
    }

    pub(crate) fn status(&self) -> ConnectStatus {
        self.status
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.status == ConnectStatus::Connected
    }

    pub(crate) fn sent_message_ids(&self) -> Vec<u16> {
        self.sent.keys().copied().collect()
    }

    pub(crate) fn received_message_ids(&self) -> Vec<u16> {
        self.received.keys().copied().collect()
    }

    pub(crate) fn set_max_message_identifier(&mut self, max: u32) -> Result<(), ClientError> {
        if !(2..=DEFAULT_MAX_MESSAGE_IDENTIFIER).contains(&max) {
            return Err(ClientError::InvalidArgument(format!(
                "maxMessageIdentifier:{max}"
            )));
        }
        self.max_message_identifier = max;
        if self.next_message_identifier >= max {
            self.next_message_identifier = 1;
        }
        Ok(())
    }

    pub(crate) fn take_notification(&mut self) -> Option<Notification> {
        self.notifications.pop_front()
    }

    pub(crate) fn connect(&mut self, options: ConnectOptions) -> Result<(), ClientError> {
        self.trace
            .record("Client.connect", format_args!("{options:?} {:?}", self.status));

        if self.status == ConnectStatus::Connected {
            return Err(ClientError::InvalidState("already connected"));
        }
        if self.transport.is_some() {
            return Err(ClientError::InvalidState("already connecting"));
        }
        options.check()?;

        let url = server_url(&self.host, self.port, options.use_ssl())?;
        let keep_alive = options.keep_alive_interval();
        let clean_session = options.clean_session();
        let ConnectOptions {
            timeout,
            user_name,
            password,
            will_message,
            invocation_context,
            on_success,
            on_failure,
            ..
        } = options;

        let packet = WireMessage::Connect(ConnectPacket {
            client_id: self.client_id.clone(),
            clean_session,
            keep_alive_interval: keep_alive.as_secs() as u16,
            will_message,
            user_name,
            password,
        })
        .encode()?;

        self.generation += 1;
        let generation = self.generation;
        let transport = self
            .connector
            .open(&url, EventSink::new(self.owner.clone(), generation))?;
        log::info!("connecting to {url}.");

        self.transport = Some(transport);
        self.status = ConnectStatus::Connecting;
        self.receive_buffer.clear();
        self.connect = Some(PendingConnect {
            clean_session,
            packet,
            context: invocation_context,
            on_success,
            on_failure,
        });

        let owner = self.owner.clone();
        self.pinger = Some(Pinger::new(self.scheduler.clone(), keep_alive, move || {
            Box::new(SessionTimer {
                client: owner.clone(),
                event: TimerEvent::Ping { generation },
            }) as Box<dyn Task>
        }));
        self.connect_timeout = Some(Timeout::start(
            self.scheduler.clone(),
            timeout,
            self.timer(TimerEvent::ConnectTimeout { generation }),
        ));

        Ok(())
    }

    pub(crate) fn subscribe(
        &mut self,
        filter: &str,
        options: SubscribeOptions,
    ) -> Result<(), ClientError> {
        self.trace
            .record("Client.subscribe", format_args!("{filter} {options:?}"));

        if !self.is_connected() {
            return Err(ClientError::InvalidState("not connected"));
        }
        options.check()?;

        let id = self.next_identifier()?;
        let packet = WireMessage::Subscribe(SubscribePacket {
            message_identifier: id,
            topics: vec![filter.to_owned()],
            requested_qos: vec![options.qos()],
        });
        let timeout = options.timeout();
        self.track_request(packet, id, timeout, options.into_parts(), |id, seq| {
            TimerEvent::SubscribeTimeout { id, seq }
        })
    }

    pub(crate) fn unsubscribe(
        &mut self,
        filter: &str,
        options: UnsubscribeOptions,
    ) -> Result<(), ClientError> {
        self.trace
            .record("Client.unsubscribe", format_args!("{filter} {options:?}"));

        if !self.is_connected() {
            return Err(ClientError::InvalidState("not connected"));
        }
        options.check()?;

        let id = self.next_identifier()?;
        let packet = WireMessage::Unsubscribe(UnsubscribePacket {
            message_identifier: id,
            topics: vec![filter.to_owned()],
        });
        let timeout = options.timeout();
        self.track_request(packet, id, timeout, options.into_parts(), |id, seq| {
            TimerEvent::UnsubscribeTimeout { id, seq }
        })
    }

    pub(crate) fn send(&mut self, message: Message) -> Result<(), ClientError> {
        self.trace.record("Client.send", format_args!("{message:?}"));

        if !self.is_connected() {
            return Err(ClientError::InvalidState("not connected"));
        }
        if message.destination_name().is_none() {
            return Err(ClientError::InvalidArgument(
                "Invalid parameter Message.destinationName:undefined".to_owned(),
            ));
        }

        if message.qos() == QualityOfService::Level0 {
            let outbound = Outbound::new(&WireMessage::Publish(PublishPacket {
                message_identifier: None,
                message: message.clone(),
            }))?;
            self.schedule(outbound.then(AfterWrite::Delivered(message)));
            return Ok(());
        }

        let id = self.next_identifier()?;
        let packet = WireMessage::Publish(PublishPacket {
            message_identifier: Some(id),
            message,
        });
        let outbound = Outbound::new(&packet)?;
        self.persistence.store(Direction::Sent, &packet, false)?;
        let seq = self.next_seq();
        self.sent.insert(id, SentEntry::new(packet, seq));
        self.schedule(outbound);
        Ok(())
    }

    pub(crate) fn disconnect(&mut self) -> Result<(), ClientError> {
        self.trace.record("Client.disconnect", format_args!(""));

        if self.transport.is_none() {
            return Err(ClientError::InvalidState("not connecting or connected"));
        }

        if self.is_connected() {
            let outbound = Outbound::new(&WireMessage::Disconnect)?;
            self.schedule(outbound.then(AfterWrite::Disconnect));
        } else {
            self.disconnected(ErrorCode::Ok, ErrorCode::Ok.format(&[]));
        }
        Ok(())
    }

    pub(crate) fn start_trace(&mut self) {
        self.trace.start();
        self.trace
            .record("Client.startTrace", format_args!("{:?}", SystemTime::now()));
    }

    pub(crate) fn stop_trace(&mut self) {
        self.trace.stop();
    }

    pub(crate) fn trace_log(&mut self) -> Option<Vec<String>> {
        if !self.trace.is_active() {
            return None;
        }
        self.trace
            .record("Client.getTraceLog", format_args!("{:?}", SystemTime::now()));
        self.trace.record(
            "Client.getTraceLog in flight messages",
            format_args!("{}", self.sent.len()),
        );
        for (id, entry) in &self.sent {
            self.trace
                .record("_sentMessages", format_args!("{id} {entry:?}"));
        }
        for (id, message) in &self.received {
            self.trace
                .record("_receivedMessages", format_args!("{id} {message:?}"));
        }
        self.trace.snapshot()
    }

    pub(crate) fn handle(&mut self, event: Event) {
        match event {
            Event::Socket(generation, event) => {
                if generation != self.generation || self.transport.is_none() {
                    log::debug!("drop event {event:?} of stale transport {generation}.");
                    return;
                }
                match event {
                    SocketEvent::Open => self.on_socket_open(),
                    SocketEvent::Message(bytes) => self.on_socket_message(&bytes),
                    SocketEvent::Error(reason) => {
                        log::error!("socket error: {reason}");
                        self.disconnected(
                            ErrorCode::SocketError,
                            ErrorCode::SocketError.format(&[&reason]),
                        )
                    }
                    SocketEvent::Close => {
                        self.disconnected(ErrorCode::SocketClose, ErrorCode::SocketClose.format(&[]))
                    }
                }
            }
            Event::Timer(timer) => self.on_timer(timer),
        }
    }

    fn timer(&self, event: TimerEvent) -> Box<dyn Task> {
        Box::new(SessionTimer {
            client: self.owner.clone(),
            event,
        })
    }

    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Next identifier in `[1, max)` that is not in flight.
    fn next_identifier(&mut self) -> Result<u16, ClientError> {
        let capacity = (self.max_message_identifier - 1) as usize;
        if self.sent.len() >= capacity {
            return Err(ClientError::TooManyMessages(self.sent.len()));
        }

        loop {
            let id = self.next_message_identifier as u16;
            self.next_message_identifier += 1;
            if self.next_message_identifier >= self.max_message_identifier {
                self.next_message_identifier = 1;
            }
            if !self.sent.contains_key(&id) {
                return Ok(id);
            }
        }
    }

    fn track_request<F>(
        &mut self,
        packet: WireMessage,
        id: u16,
        timeout: Option<std::time::Duration>,
        parts: RequestParts,
        timer_event: F,
    ) -> Result<(), ClientError>
    where
        F: FnOnce(u16, u64) -> TimerEvent,
    {
        let outbound = Outbound::new(&packet)?;
        let seq = self.next_seq();
        let mut entry = SentEntry::new(packet, seq);
        entry.context = parts.context;
        entry.on_success = parts.on_success;
        entry.on_failure = parts.on_failure;
        entry.timeout = timeout.map(|timeout| {
            Timeout::start(
                self.scheduler.clone(),
                Some(timeout),
                self.timer(timer_event(id, seq)),
            )
        });
        self.sent.insert(id, entry);
        self.schedule(outbound);
        Ok(())
    }

    fn schedule(&mut self, outbound: Outbound) {
        self.queue.push_back(outbound);
        if self.is_connected() {
            self.process_queue();
        }
    }

    fn schedule_packet(&mut self, packet: WireMessage) {
        match Outbound::new(&packet) {
            Ok(outbound) => self.schedule(outbound),
            Err(err) => self.disconnected(
                ErrorCode::InternalError,
                ErrorCode::InternalError.format(&[&err.to_string()]),
            ),
        }
    }

    fn process_queue(&mut self) {
        while self.is_connected() {
            let Some(outbound) = self.queue.pop_front() else {
                return;
            };
            self.trace.record(
                "Client._socket_send",
                format_args!(
                    "{:?} {:?}",
                    outbound.message_type, outbound.message_identifier
                ),
            );
            if !self.socket_send(outbound.bytes) {
                return;
            }
            match outbound.after_write {
                Some(AfterWrite::Delivered(message)) => {
                    self.notifications.push_back(Notification::Delivered(message));
                }
                Some(AfterWrite::Disconnect) => {
                    self.disconnected(ErrorCode::Ok, ErrorCode::Ok.format(&[]));
                }
                None => {}
            }
        }
    }

    /// Returns false when the write failed and the session went down.
    fn socket_send(&mut self, bytes: Vec<u8>) -> bool {
        let Some(transport) = self.transport.as_mut() else {
            return false;
        };
        log::debug!("write to server: {} bytes.", bytes.len());
        match transport.send(bytes) {
            Ok(()) => {
                if let Some(pinger) = self.pinger.as_mut() {
                    pinger.reset();
                }
                true
            }
            Err(err) => {
                self.disconnected(
                    ErrorCode::SocketError,
                    ErrorCode::SocketError.format(&[&err.to_string()]),
                );
                false
            }
        }
    }

    fn on_socket_open(&mut self) {
        if self.status != ConnectStatus::Connecting {
            return;
        }
        let Some(packet) = self.connect.as_ref().map(|connect| connect.packet.clone()) else {
            return;
        };
        log::info!("socket open, send CONNECT.");
        self.status = ConnectStatus::AwaitingConnack;
        self.socket_send(packet);
    }

    fn on_socket_message(&mut self, bytes: &[u8]) {
        self.receive_buffer.extend_from_slice(bytes);
        let generation = self.generation;

        loop {
            match self.codec.decode(&mut self.receive_buffer) {
                Ok(Some(packet)) => {
                    if let Some(pinger) = self.pinger.as_mut() {
                        pinger.reset();
                    }
                    log::debug!("read from server: {packet:?}");
                    self.trace
                        .record("Client._on_socket_message", format_args!("{packet:?}"));
                    self.handle_packet(packet);
                    if self.generation != generation || self.transport.is_none() {
                        return;
                    }
                }
                Ok(None) => return,
                Err(err) => {
                    log::error!("decode packet failed: {err}");
                    self.disconnected(
                        ErrorCode::InternalError,
                        ErrorCode::InternalError.format(&[&err.to_string()]),
                    );
                    return;
                }
            }
        }
    }

    fn handle_packet(&mut self, packet: WireMessage) {
        match packet {
            WireMessage::Connack(connack) => self.on_connack(connack),
            WireMessage::Publish(publish) => self.on_publish(publish),
            WireMessage::Puback(id) | WireMessage::Pubcomp(id) => self.on_delivered(id),
            WireMessage::Pubrec(id) => self.on_pubrec(id),
            WireMessage::Pubrel(id) => self.on_pubrel(id),
            WireMessage::Suback(suback) => self.on_request_ack(suback.message_identifier),
            WireMessage::Unsuback(id) => self.on_request_ack(id),
            WireMessage::Pingresp | WireMessage::Disconnect => {}
            WireMessage::Connect(_)
            | WireMessage::Subscribe(_)
            | WireMessage::Unsubscribe(_)
            | WireMessage::Pingreq => {
                let reason = format!("Invalid message type:{}", packet.message_type() as u8);
                self.disconnected(
                    ErrorCode::InternalError,
                    ErrorCode::InternalError.format(&[&reason]),
                );
            }
        }
    }

    fn on_connack(&mut self, connack: ConnackPacket) {
        if self.status != ConnectStatus::AwaitingConnack {
            log::warn!("unexpected CONNACK in state {:?}.", self.status);
            return;
        }
        if let Some(mut timeout) = self.connect_timeout.take() {
            timeout.cancel();
        }

        if connack.return_code != 0 {
            let code = connack.return_code.to_string();
            self.disconnected(
                ErrorCode::ConnackReturnCode,
                ErrorCode::ConnackReturnCode.format(&[&code]),
            );
            return;
        }

        log::info!("connected, return code 0.");
        self.status = ConnectStatus::Connected;

        let clean_session = self
            .connect
            .as_ref()
            .map_or(true, |connect| connect.clean_session);
        if clean_session {
            self.purge();
        } else {
            self.replay();
        }

        if let Some(connect) = self.connect.as_mut() {
            connect.on_failure = None;
            if let Some(callback) = connect.on_success.take() {
                self.notifications.push_back(Notification::Success {
                    callback,
                    context: connect.context.clone(),
                });
            }
        }

        self.process_queue();
    }

    fn purge(&mut self) {
        if let Err(err) = self.persistence.clear() {
            log::warn!("clear stored messages failed: {err}");
        }
        self.sent.clear();
        self.received.clear();
    }

    fn replay(&mut self) {
        let mut order: Vec<(u64, u16)> = self
            .sent
            .iter()
            .map(|(id, entry)| (entry.seq, *id))
            .collect();
        order.sort_unstable();

        for (_, id) in order {
            let Some(entry) = self.sent.get(&id) else {
                continue;
            };
            // the stored packet goes out as it was first written
            let packet = match &entry.packet {
                WireMessage::Publish(_) if entry.pub_rec_received => WireMessage::Pubrel(id),
                other => other.clone(),
            };
            match Outbound::new(&packet) {
                Ok(outbound) => self.queue.push_back(outbound),
                Err(err) => log::error!("replay message {id} failed: {err}"),
            }
        }
    }

    fn on_publish(&mut self, publish: PublishPacket) {
        let PublishPacket {
            message_identifier,
            message,
        } = publish;

        match (message.qos(), message_identifier) {
            (QualityOfService::Level0, _) => {
                self.notifications.push_back(Notification::Arrived(message));
            }
            (QualityOfService::Level1, Some(id)) => {
                self.schedule_packet(WireMessage::Puback(id));
                self.notifications.push_back(Notification::Arrived(message));
            }
            (QualityOfService::Level2, Some(id)) => {
                let packet = WireMessage::Publish(PublishPacket {
                    message_identifier: Some(id),
                    message,
                });
                if let Err(err) = self.persistence.store(Direction::Received, &packet, false) {
                    self.disconnected(
                        ErrorCode::InternalError,
                        ErrorCode::InternalError.format(&[&err.to_string()]),
                    );
                    return;
                }
                if let WireMessage::Publish(PublishPacket { message, .. }) = packet {
                    self.received.insert(id, message);
                }
                self.schedule_packet(WireMessage::Pubrec(id));
            }
            (_, None) => {
                log::warn!("drop PUBLISH without message identifier.");
            }
        }
    }

    /// PUBACK or PUBCOMP.
    fn on_delivered(&mut self, id: u16) {
        if !self.sent.get(&id).is_some_and(SentEntry::is_publish) {
            log::debug!("ack for unknown message {id}.");
            return;
        }
        let Some(entry) = self.sent.remove(&id) else {
            return;
        };
        if let Err(err) = self.persistence.remove(Direction::Sent, id) {
            log::warn!("remove stored message {id} failed: {err}");
        }
        if let WireMessage::Publish(publish) = entry.packet {
            self.notifications
                .push_back(Notification::Delivered(publish.message));
        }
    }

    fn on_pubrec(&mut self, id: u16) {
        let Some(entry) = self.sent.get_mut(&id).filter(|entry| entry.is_publish()) else {
            log::debug!("PUBREC for unknown message {id}.");
            return;
        };
        entry.pub_rec_received = true;
        if let Err(err) = self.persistence.store(Direction::Sent, &entry.packet, true) {
            self.disconnected(
                ErrorCode::InternalError,
                ErrorCode::InternalError.format(&[&err.to_string()]),
            );
            return;
        }
        self.schedule_packet(WireMessage::Pubrel(id));
    }

    fn on_pubrel(&mut self, id: u16) {
        if let Err(err) = self.persistence.remove(Direction::Received, id) {
            log::warn!("remove stored message {id} failed: {err}");
        }
        if let Some(message) = self.received.remove(&id) {
            self.notifications.push_back(Notification::Arrived(message));
        }
        self.schedule_packet(WireMessage::Pubcomp(id));
    }

    /// SUBACK or UNSUBACK.
    fn on_request_ack(&mut self, id: u16) {
        if self.sent.get(&id).map_or(true, SentEntry::is_publish) {
            log::debug!("ack for unknown request {id}.");
            return;
        }
        let Some(mut entry) = self.sent.remove(&id) else {
            return;
        };
        if let Some(mut timeout) = entry.timeout.take() {
            timeout.cancel();
        }
        if let Some(callback) = entry.on_success.take() {
            self.notifications.push_back(Notification::Success {
                callback,
                context: entry.context.take(),
            });
        }
    }

    fn on_timer(&mut self, timer: TimerEvent) {
        match timer {
            TimerEvent::Ping { generation } => {
                if generation != self.generation {
                    return;
                }
                let Some(pinger) = self.pinger.as_mut() else {
                    return;
                };
                match pinger.expire() {
                    PingAction::SendPing => self.send_ping(),
                    PingAction::TimedOut => {
                        log::warn!("ping timed out.");
                        self.disconnected(ErrorCode::PingTimeout, ErrorCode::PingTimeout.format(&[]))
                    }
                }
            }
            TimerEvent::ConnectTimeout { generation } => {
                if generation != self.generation || self.is_connected() {
                    return;
                }
                if let Some(mut timeout) = self.connect_timeout.take() {
                    timeout.expired();
                }
                log::warn!("connect timed out.");
                self.disconnected(
                    ErrorCode::ConnectTimeout,
                    ErrorCode::ConnectTimeout.format(&[]),
                );
            }
            TimerEvent::SubscribeTimeout { id, seq } => {
                self.on_request_timeout(id, seq, ErrorCode::SubscribeTimeout)
            }
            TimerEvent::UnsubscribeTimeout { id, seq } => {
                self.on_request_timeout(id, seq, ErrorCode::UnsubscribeTimeout)
            }
        }
    }

    /// The keep-alive PINGREQ bypasses the queue and does not count as
    /// traffic.
    fn send_ping(&mut self) {
        self.trace.record("Pinger.doPing", format_args!("send PINGREQ"));
        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        let bytes = match WireMessage::Pingreq.encode() {
            Ok(bytes) => bytes,
            Err(err) => {
                log::error!("encode PINGREQ failed: {err}");
                return;
            }
        };
        if let Err(err) = transport.send(bytes) {
            self.disconnected(
                ErrorCode::SocketError,
                ErrorCode::SocketError.format(&[&err.to_string()]),
            );
        }
    }

    /// The entry stays in flight, a late ack only removes it.
    fn on_request_timeout(&mut self, id: u16, seq: u64, code: ErrorCode) {
        let Some(entry) = self.sent.get_mut(&id).filter(|entry| entry.seq == seq) else {
            return;
        };
        if let Some(mut timeout) = entry.timeout.take() {
            timeout.expired();
        }
        entry.on_success = None;
        if let Some(callback) = entry.on_failure.take() {
            self.notifications.push_back(Notification::Failure {
                callback,
                context: entry.context.clone(),
                code,
                message: code.format(&[]),
            });
        }
    }

    /// Tears the connection down. Safe to call any number of times.
    fn disconnected(&mut self, code: ErrorCode, message: String) {
        self.trace
            .record("Client._disconnected", format_args!("{code} {message}"));

        if let Some(pinger) = self.pinger.as_mut() {
            pinger.cancel();
        }
        if let Some(mut timeout) = self.connect_timeout.take() {
            timeout.cancel();
        }
        self.queue.clear();
        self.receive_buffer.clear();

        if let Some(mut transport) = self.transport.take() {
            self.generation += 1;
            transport.close();
        }

        let was_connected = self.is_connected();
        self.status = ConnectStatus::Disconnected;

        if was_connected {
            log::info!("connection lost: {code} {message}");
            self.notifications
                .push_back(Notification::ConnectionLost { code, message });
        } else if let Some(connect) = self.connect.as_mut() {
            if let Some(callback) = connect.on_failure.take() {
                log::info!("connect failed: {code} {message}");
                self.notifications.push_back(Notification::Failure {
                    callback,
                    context: connect.context.clone(),
                    code,
                    message,
                });
            }
        }
    }
}

/// Callbacks and context of a subscribe or unsubscribe call.
pub(crate) struct RequestParts {
    pub context: Option<InvocationContext>,
    pub on_success: Option<OnSuccess>,
    pub on_failure: Option<OnFailure>,
}

impl SubscribeOptions {
    fn into_parts(self) -> RequestParts {
        RequestParts {
            context: self.invocation_context,
            on_success: self.on_success,
            on_failure: self.on_failure,
        }
    }
}

impl UnsubscribeOptions {
    fn into_parts(self) -> RequestParts {
        RequestParts {
            context: self.invocation_context,
            on_success: self.on_success,
            on_failure: self.on_failure,
        }
    }
}
