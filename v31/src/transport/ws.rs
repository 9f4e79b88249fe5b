use async_tungstenite::{
    tokio::connect_async,
    tungstenite::{client::IntoClientRequest, http::HeaderValue, Message},
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use url::Url;

use super::{Connector, EventSink, Transport};
use crate::error::TransportError;

/// WebSocket sub-protocol token of MQTT v3.1.
pub const SUB_PROTOCOL: &str = "mqttv3.1";

enum Command {
    Send(Vec<u8>),
    Close,
}

/// Opens WebSocket connections on the current `LocalSet`.
///
/// Only `ws://` is supported by the default feature set; a `wss://` connect
/// fails with a socket error.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for WsConnector {
    fn open(&self, url: &Url, events: EventSink) -> Result<Box<dyn Transport>, TransportError> {
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|err| TransportError::InvalidUrl(err.to_string()))?;
        request
            .headers_mut()
            .insert("Sec-WebSocket-Protocol", HeaderValue::from_static(SUB_PROTOCOL));

        let (tx, rx) = mpsc::unbounded_channel();
        log::debug!("open websocket {url}.");
        tokio::task::spawn_local(run(request, rx, events));

        Ok(Box::new(WsTransport { commands: tx }))
    }
}

struct WsTransport {
    commands: mpsc::UnboundedSender<Command>,
}

impl Transport for WsTransport {
    fn send(&mut self, bytes: Vec<u8>) -> Result<(), TransportError> {
        self.commands
            .send(Command::Send(bytes))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&mut self) {
        let _ = self.commands.send(Command::Close);
    }
}

async fn run<R>(request: R, mut commands: mpsc::UnboundedReceiver<Command>, events: EventSink)
where
    R: IntoClientRequest + Unpin,
{
    let stream = match connect_async(request).await {
        Ok((stream, _)) => stream,
        Err(err) => {
            log::warn!("websocket connect failed: {err}");
            events.error(&err.to_string());
            return;
        }
    };
    events.opened();

    let (mut writer, mut reader) = stream.split();
    log::info!("start websocket loop.");
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Send(bytes)) => {
                    if let Err(err) = writer.send(Message::binary(bytes)).await {
                        log::error!("websocket write: {err}");
                        events.error(&err.to_string());
                        break;
                    }
                }
                Some(Command::Close) | None => {
                    let _ = writer.close().await;
                    break;
                }
            },
            frame = reader.next() => match frame {
                Some(Ok(Message::Binary(data))) => events.message(&data),
                Some(Ok(Message::Close(_))) | None => {
                    events.closed();
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    log::error!("websocket read: {err}");
                    events.error(&err.to_string());
                    break;
                }
            },
        }
    }
    log::info!("websocket loop exit.");
}
