//! MQTT v3.1 control packets.

use bytes::{BufMut, BytesMut};

use crate::{
    error::CodecError,
    message::{Message, QualityOfService},
};

pub use self::framed::MqttCodec;

mod framed;
pub mod mbi;
pub mod utf8;

/// Protocol name `MQIsdp` and protocol version 3.
pub const PROTOCOL_IDENTIFIER: [u8; 9] = [0x00, 0x06, b'M', b'Q', b'I', b's', b'd', b'p', 0x03];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Connect = 1,
    Connack = 2,
    Publish = 3,
    Puback = 4,
    Pubrec = 5,
    Pubrel = 6,
    Pubcomp = 7,
    Subscribe = 8,
    Suback = 9,
    Unsubscribe = 10,
    Unsuback = 11,
    Pingreq = 12,
    Pingresp = 13,
    Disconnect = 14,
}

impl TryFrom<u8> for MessageType {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            1 => MessageType::Connect,
            2 => MessageType::Connack,
            3 => MessageType::Publish,
            4 => MessageType::Puback,
            5 => MessageType::Pubrec,
            6 => MessageType::Pubrel,
            7 => MessageType::Pubcomp,
            8 => MessageType::Subscribe,
            9 => MessageType::Suback,
            10 => MessageType::Unsubscribe,
            11 => MessageType::Unsuback,
            12 => MessageType::Pingreq,
            13 => MessageType::Pingresp,
            14 => MessageType::Disconnect,
            n => return Err(CodecError::InvalidType(n)),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectPacket {
    pub client_id: String,
    pub clean_session: bool,
    pub keep_alive_interval: u16,
    pub will_message: Option<Message>,
    pub user_name: Option<String>,
    pub password: Option<String>,
}

impl ConnectPacket {
    pub fn new<S: Into<String>>(client_id: S) -> Self {
        Self {
            client_id: client_id.into(),
            clean_session: true,
            keep_alive_interval: 60,
            will_message: None,
            user_name: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnackPacket {
    pub topic_name_compression_response: u8,
    pub return_code: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishPacket {
    /// Present exactly when the message QoS is above zero.
    pub message_identifier: Option<u16>,
    pub message: Message,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribePacket {
    pub message_identifier: u16,
    pub topics: Vec<String>,
    pub requested_qos: Vec<QualityOfService>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubackPacket {
    pub message_identifier: u16,
    pub granted_qos: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsubscribePacket {
    pub message_identifier: u16,
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    Connect(ConnectPacket),
    Connack(ConnackPacket),
    Publish(PublishPacket),
    Puback(u16),
    Pubrec(u16),
    Pubrel(u16),
    Pubcomp(u16),
    Subscribe(SubscribePacket),
    Suback(SubackPacket),
    Unsubscribe(UnsubscribePacket),
    Unsuback(u16),
    Pingreq,
    Pingresp,
    Disconnect,
}

impl WireMessage {
    pub fn message_type(&self) -> MessageType {
        match self {
            WireMessage::Connect(_) => MessageType::Connect,
            WireMessage::Connack(_) => MessageType::Connack,
            WireMessage::Publish(_) => MessageType::Publish,
            WireMessage::Puback(_) => MessageType::Puback,
            WireMessage::Pubrec(_) => MessageType::Pubrec,
            WireMessage::Pubrel(_) => MessageType::Pubrel,
            WireMessage::Pubcomp(_) => MessageType::Pubcomp,
            WireMessage::Subscribe(_) => MessageType::Subscribe,
            WireMessage::Suback(_) => MessageType::Suback,
            WireMessage::Unsubscribe(_) => MessageType::Unsubscribe,
            WireMessage::Unsuback(_) => MessageType::Unsuback,
            WireMessage::Pingreq => MessageType::Pingreq,
            WireMessage::Pingresp => MessageType::Pingresp,
            WireMessage::Disconnect => MessageType::Disconnect,
        }
    }

    pub fn message_identifier(&self) -> Option<u16> {
        match self {
            WireMessage::Publish(p) => p.message_identifier,
            WireMessage::Puback(id)
            | WireMessage::Pubrec(id)
            | WireMessage::Pubrel(id)
            | WireMessage::Pubcomp(id)
            | WireMessage::Unsuback(id) => Some(*id),
            WireMessage::Subscribe(p) => Some(p.message_identifier),
            WireMessage::Suback(p) => Some(p.message_identifier),
            WireMessage::Unsubscribe(p) => Some(p.message_identifier),
            _ => None,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut out = BytesMut::new();
        self.encode_into(&mut out)?;
        Ok(out.to_vec())
    }

    pub fn encode_into<B: BufMut>(&self, out: &mut B) -> Result<(), CodecError> {
        let mut first = (self.message_type() as u8) << 4;
        let mut body = BytesMut::new();

        match self {
            WireMessage::Connect(connect) => encode_connect(connect, &mut body)?,
            WireMessage::Connack(connack) => {
                body.put_u8(connack.topic_name_compression_response);
                body.put_u8(connack.return_code);
            }
            WireMessage::Publish(publish) => {
                let message = &publish.message;
                if message.duplicate() {
                    first |= 0x08;
                }
                first |= (message.qos() as u8) << 1;
                if message.retained() {
                    first |= 0x01;
                }
                let topic = message
                    .destination_name()
                    .ok_or(CodecError::MissingField("destinationName"))?;
                write_string(topic, &mut body)?;
                if message.qos() != QualityOfService::Level0 {
                    let id = publish
                        .message_identifier
                        .ok_or(CodecError::MissingField("messageIdentifier"))?;
                    body.put_u16(id);
                }
                body.put_slice(message.payload_bytes());
            }
            WireMessage::Puback(id)
            | WireMessage::Pubrec(id)
            | WireMessage::Pubrel(id)
            | WireMessage::Pubcomp(id)
            | WireMessage::Unsuback(id) => body.put_u16(*id),
            WireMessage::Subscribe(subscribe) => {
                first |= 0x02;
                if subscribe.topics.len() != subscribe.requested_qos.len() {
                    return Err(CodecError::MissingField("requestedQos"));
                }
                body.put_u16(subscribe.message_identifier);
                for (topic, qos) in subscribe.topics.iter().zip(&subscribe.requested_qos) {
                    write_string(topic, &mut body)?;
                    body.put_u8(*qos as u8);
                }
            }
            WireMessage::Suback(suback) => {
                body.put_u16(suback.message_identifier);
                body.put_slice(&suback.granted_qos);
            }
            WireMessage::Unsubscribe(unsubscribe) => {
                first |= 0x02;
                body.put_u16(unsubscribe.message_identifier);
                for topic in &unsubscribe.topics {
                    write_string(topic, &mut body)?;
                }
            }
            WireMessage::Pingreq | WireMessage::Pingresp | WireMessage::Disconnect => {}
        }

        out.put_u8(first);
        mbi::write_remaining_length(body.len(), out)?;
        out.put_slice(&body);
        Ok(())
    }

    /// Decodes one complete packet. Bytes after the packet are ignored.
    pub fn decode(input: &[u8]) -> Result<WireMessage, CodecError> {
        match decode_frame(input)? {
            Some((message, _)) => Ok(message),
            None => Err(CodecError::Truncated {
                needed: input.len() + 1,
                available: input.len(),
            }),
        }
    }
}

fn encode_connect(connect: &ConnectPacket, body: &mut BytesMut) -> Result<(), CodecError> {
    body.put_slice(&PROTOCOL_IDENTIFIER);

    let mut flags = 0u8;
    if connect.clean_session {
        flags |= 0x02;
    }
    if let Some(will) = &connect.will_message {
        flags |= 0x04;
        flags |= (will.qos() as u8) << 3;
        if will.retained() {
            flags |= 0x20;
        }
    }
    if connect.user_name.is_some() {
        flags |= 0x80;
    }
    if connect.password.is_some() {
        flags |= 0x40;
    }
    body.put_u8(flags);
    body.put_u16(connect.keep_alive_interval);

    write_string(&connect.client_id, body)?;
    if let Some(will) = &connect.will_message {
        let topic = will
            .destination_name()
            .ok_or(CodecError::MissingField("willMessage.destinationName"))?;
        write_string(topic, body)?;
        let payload = will.payload_bytes();
        if payload.len() > u16::MAX as usize {
            return Err(CodecError::StringTooLong(payload.len()));
        }
        body.put_u16(payload.len() as u16);
        body.put_slice(payload);
    }
    if let Some(user_name) = &connect.user_name {
        write_string(user_name, body)?;
    }
    if let Some(password) = &connect.password {
        write_string(password, body)?;
    }
    Ok(())
}

fn write_string<B: BufMut>(input: &str, out: &mut B) -> Result<(), CodecError> {
    let len = utf8::utf8_length(input);
    if len > u16::MAX as usize {
        return Err(CodecError::StringTooLong(len));
    }
    out.put_u16(len as u16);
    utf8::write_utf8(input, out);
    Ok(())
}

/// Decodes the first packet of `input` and reports how many bytes it used.
/// Returns `None` until the whole packet is available.
pub fn decode_frame(input: &[u8]) -> Result<Option<(WireMessage, usize)>, CodecError> {
    let Some(&first) = input.first() else {
        return Ok(None);
    };
    let Some((remaining, len_bytes)) = mbi::read_remaining_length(&input[1..])? else {
        return Ok(None);
    };
    let total = 1 + len_bytes + remaining;
    if input.len() < total {
        return Ok(None);
    }

    let body = &input[1 + len_bytes..total];
    let message = decode_body(first, body)?;
    Ok(Some((message, total)))
}

fn decode_body(first: u8, body: &[u8]) -> Result<WireMessage, CodecError> {
    let message_type = MessageType::try_from(first >> 4)?;
    let flags = first & 0x0f;
    let mut reader = Reader::new(body);

    let message = match message_type {
        MessageType::Connect => WireMessage::Connect(decode_connect(&mut reader)?),
        MessageType::Connack => WireMessage::Connack(ConnackPacket {
            topic_name_compression_response: reader.read_u8()?,
            return_code: reader.read_u8()?,
        }),
        MessageType::Publish => {
            let qos = QualityOfService::try_from((flags >> 1) & 0x03)?;
            let topic = reader.read_string()?;
            let message_identifier = match qos {
                QualityOfService::Level0 => None,
                _ => Some(reader.read_u16()?),
            };
            let mut message = Message::from_bytes(reader.rest()).with_destination(topic);
            message.set_qos(qos).set_retained(flags & 0x01 == 0x01);
            message.set_duplicate(flags & 0x08 == 0x08);
            WireMessage::Publish(PublishPacket {
                message_identifier,
                message,
            })
        }
        MessageType::Puback => WireMessage::Puback(reader.read_u16()?),
        MessageType::Pubrec => WireMessage::Pubrec(reader.read_u16()?),
        MessageType::Pubrel => WireMessage::Pubrel(reader.read_u16()?),
        MessageType::Pubcomp => WireMessage::Pubcomp(reader.read_u16()?),
        MessageType::Unsuback => WireMessage::Unsuback(reader.read_u16()?),
        MessageType::Subscribe => {
            let message_identifier = reader.read_u16()?;
            let mut topics = Vec::new();
            let mut requested_qos = Vec::new();
            while !reader.is_empty() {
                topics.push(reader.read_string()?);
                requested_qos.push(QualityOfService::try_from(reader.read_u8()?)?);
            }
            WireMessage::Subscribe(SubscribePacket {
                message_identifier,
                topics,
                requested_qos,
            })
        }
        MessageType::Suback => WireMessage::Suback(SubackPacket {
            message_identifier: reader.read_u16()?,
            granted_qos: reader.rest().to_vec(),
        }),
        MessageType::Unsubscribe => {
            let message_identifier = reader.read_u16()?;
            let mut topics = Vec::new();
            while !reader.is_empty() {
                topics.push(reader.read_string()?);
            }
            WireMessage::Unsubscribe(UnsubscribePacket {
                message_identifier,
                topics,
            })
        }
        MessageType::Pingreq => WireMessage::Pingreq,
        MessageType::Pingresp => WireMessage::Pingresp,
        MessageType::Disconnect => WireMessage::Disconnect,
    };

    Ok(message)
}

fn decode_connect(reader: &mut Reader<'_>) -> Result<ConnectPacket, CodecError> {
    if reader.read_bytes(PROTOCOL_IDENTIFIER.len())? != PROTOCOL_IDENTIFIER {
        return Err(CodecError::InvalidProtocol);
    }
    let flags = reader.read_u8()?;
    let keep_alive_interval = reader.read_u16()?;
    let client_id = reader.read_string()?;

    let will_message = if flags & 0x04 != 0 {
        let topic = reader.read_string()?;
        let len = reader.read_u16()? as usize;
        let mut will = Message::from_bytes(reader.read_bytes(len)?).with_destination(topic);
        will.set_qos(QualityOfService::try_from((flags >> 3) & 0x03)?)
            .set_retained(flags & 0x20 != 0);
        Some(will)
    } else {
        None
    };
    let user_name = match flags & 0x80 {
        0 => None,
        _ => Some(reader.read_string()?),
    };
    let password = match flags & 0x40 {
        0 => None,
        _ => Some(reader.read_string()?),
    };

    Ok(ConnectPacket {
        client_id,
        clean_session: flags & 0x02 != 0,
        keep_alive_interval,
        will_message,
        user_name,
        password,
    })
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        let end = self.pos + len;
        if end > self.buf.len() {
            return Err(CodecError::Truncated {
                needed: end,
                available: self.buf.len(),
            });
        }
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.read_bytes(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16, CodecError> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn read_string(&mut self) -> Result<String, CodecError> {
        let len = self.read_u16()? as usize;
        utf8::decode(self.read_bytes(len)?)
    }

    fn rest(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.pos.min(self.buf.len())..];
        self.pos = self.buf.len();
        rest
    }
}
