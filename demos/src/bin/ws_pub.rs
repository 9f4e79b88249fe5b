use std::{cell::Cell, env, rc::Rc};

use mqttws_client_v31::{Client, ConnectOptions, Message, Platform, QualityOfService};
use tokio::{sync::mpsc, task::LocalSet};

const COUNT: usize = 3;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env::set_var("RUST_LOG", "info");
    env_logger::init();

    let host = env::args().nth(1).unwrap_or_else(|| "localhost".to_owned());
    let port = env::args()
        .nth(2)
        .and_then(|port| port.parse().ok())
        .unwrap_or(8083);

    LocalSet::new()
        .run_until(async move {
            let cli = Client::new(host, port, "ws-pub", Platform::tokio()).unwrap();

            let (tx, mut rx) = mpsc::unbounded_channel();
            cli.set_on_connection_lost(move |code, text| {
                log::info!("connection closed: {code} {text}");
                let _ = tx.send(());
            });

            let delivered = Rc::new(Cell::new(0));
            let closer = cli.clone();
            cli.set_on_message_delivered(move |msg| {
                log::info!("delivered: {:?}", msg.payload_string());
                delivered.set(delivered.get() + 1);
                if delivered.get() == COUNT {
                    if let Err(err) = closer.disconnect() {
                        log::error!("{err}");
                    }
                }
            });

            let publisher = cli.clone();
            let mut options = ConnectOptions::new();
            options
                .set_on_success(move |_| {
                    for (i, qos) in [
                        QualityOfService::Level0,
                        QualityOfService::Level1,
                        QualityOfService::Level2,
                    ]
                    .into_iter()
                    .enumerate()
                    {
                        let mut msg = Message::from_string(format!("hello, world! #{i}"));
                        msg.set_qos(qos);
                        if let Err(err) = msg
                            .set_destination_name("test/topic")
                            .and_then(|()| publisher.send(msg))
                        {
                            log::error!("{err}");
                        }
                    }
                })
                .set_on_failure(|_, code, text| panic!("connect failed: {code} {text}"));
            cli.connect(options).unwrap();

            rx.recv().await;
        })
        .await;
}
