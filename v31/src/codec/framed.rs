use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::{decode_frame, WireMessage};
use crate::error::CodecError;

/// Splits a byte stream into control packets.
///
/// WebSocket frames are not aligned with packet boundaries, so the inbound
/// side appends every frame to one buffer and drains whole packets from it.
#[derive(Debug, Default, Clone, Copy)]
pub struct MqttCodec;

impl MqttCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for MqttCodec {
    type Item = WireMessage;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match decode_frame(src)? {
            Some((message, used)) => {
                src.advance(used);
                Ok(Some(message))
            }
            None => Ok(None),
        }
    }
}

impl Encoder<WireMessage> for MqttCodec {
    type Error = CodecError;

    fn encode(&mut self, item: WireMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode_into(dst)
    }
}

impl Encoder<&WireMessage> for MqttCodec {
    type Error = CodecError;

    fn encode(&mut self, item: &WireMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode_into(dst)
    }
}
