use std::env;

use mqttws_client_v31::{
    Client, ConnectOptions, Message, Platform, QualityOfService, SubscribeOptions,
};
use tokio::{sync::mpsc, task::LocalSet};

fn handler(msg: &Message) {
    log::info!(
        "topic: {}, payload: {:?}, qos: {:?}, retain: {}, dup: {}",
        msg.destination_name().unwrap_or_default(),
        msg.payload_string(),
        msg.qos(),
        msg.retained(),
        msg.duplicate()
    );
}

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
            let cli = Client::new(host, port, "ws-sub", Platform::tokio()).unwrap();

            let (tx, mut rx) = mpsc::unbounded_channel();
            cli.set_on_message_arrived(handler);
            cli.set_on_connection_lost(move |code, text| {
                log::warn!("connection lost: {code} {text}");
                let _ = tx.send(());
            });

            let subscriber = cli.clone();
            let mut options = ConnectOptions::new();
            options
                .set_keep_alive_interval(std::time::Duration::from_secs(10))
                .set_on_success(move |_| {
                    let mut options = SubscribeOptions::new();
                    options
                        .set_qos(QualityOfService::Level1)
                        .set_on_success(|_| log::info!("subscribed to test/#"));
                    if let Err(err) = subscriber.subscribe("test/#", options) {
                        log::error!("{err}");
                    }
                })
                .set_on_failure(|_, code, text| panic!("connect failed: {code} {text}"));
            cli.connect(options).unwrap();

            rx.recv().await;
        })
        .await;
}
