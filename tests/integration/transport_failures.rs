//! Broker failure tests
//!
//! No broker is needed: these tests point the client at local sockets that
//! either refuse connections or accept them and never answer.

use std::time::Duration;

use assert_matches::assert_matches;
use sensu_bridge::{
    AlarmCallback, DispatchError, Publisher, RabbitMqClient, SensuCallback, TransportError,
    config::{BrokerSettings, RABBITMQ_PORT, SecretString},
};
use tokio::{
    io::AsyncReadExt,
    net::{TcpListener, TcpStream},
    sync::oneshot,
};
use tokio_util::sync::CancellationToken;

use crate::helpers::*;

fn settings(port: u16) -> BrokerSettings {
    BrokerSettings {
        host: "127.0.0.1".to_string(),
        port,
        user: "sensu".to_string(),
        password: SecretString::new("secret"),
        virtual_host: "/sensu".to_string(),
        use_tls: false,
    }
}

/// Accepts one connection and never answers. The accepted socket is handed
/// back so tests can watch what the client does with it.
async fn silent_broker() -> (u16, oneshot::Receiver<TcpStream>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (accepted, socket) = oneshot::channel();

    tokio::spawn(async move {
        if let Ok((socket, _)) = listener.accept().await {
            let _ = accepted.send(socket);
        }
    });

    (port, socket)
}

/// Drain the broker side of the connection and return what the client sent
/// before closing it. Panics if the client leaves the socket open.
async fn assert_closed_by_client(socket: oneshot::Receiver<TcpStream>) -> Vec<u8> {
    let mut socket = socket.await.expect("client never connected");
    let mut received = vec![];

    // a reset counts as closed too, only the deadline matters
    let _ = tokio::time::timeout(Duration::from_secs(3), socket.read_to_end(&mut received))
        .await
        .expect("socket still open 3s after send returned");

    received
}

#[tokio::test]
async fn test_refused_connection_is_a_transport_error() {
    let client =
        RabbitMqClient::new(settings(closed_port())).with_timeout(Duration::from_secs(5));

    let result = client.send("{}").await;
    assert_matches!(result, Err(TransportError::Connection(_)));
}

#[tokio::test]
async fn test_unresponsive_broker_times_out() {
    let (port, socket) = silent_broker().await;
    let client = RabbitMqClient::new(settings(port)).with_timeout(Duration::from_millis(200));

    let result = client.send("{}").await;
    assert_matches!(result, Err(TransportError::Timeout(timeout)) if timeout == Duration::from_millis(200));

    let received = assert_closed_by_client(socket).await;
    assert!(received.starts_with(b"AMQP"));
}

#[tokio::test]
async fn test_in_flight_send_can_be_cancelled() {
    let (port, socket) = silent_broker().await;
    let client = RabbitMqClient::new(settings(port)).with_timeout(Duration::from_secs(30));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        client.send_with_cancel("{}", &cancel),
    )
    .await
    .expect("cancellation should end the send promptly");
    assert_matches!(result, Err(TransportError::Cancelled));

    assert_closed_by_client(socket).await;
}

#[tokio::test]
async fn test_dispatch_wraps_transport_failure() {
    let mut configuration = create_test_configuration();
    configuration.set(RABBITMQ_PORT, closed_port());

    let callback = SensuCallback::initialize(configuration)
        .unwrap()
        .with_send_timeout(Duration::from_secs(5));

    let err = callback
        .dispatch(&create_test_event(&[("source", "message")]))
        .await
        .unwrap_err();

    assert_matches!(err, DispatchError::Delivery(TransportError::Connection(_)));
    assert!(std::error::Error::source(&err).is_some());
}
