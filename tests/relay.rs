use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::{Bytes, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use duplex_signal::config::RelayConfig;
use duplex_signal::signaling::{RelayHandle, SignalingServer};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const GRACE_MS: u64 = 20;
const SETTLE: Duration = Duration::from_millis(150);
const PEER_READY: &str = r#"{"type":"peer-ready"}"#;
const OFFER: &str = r#"{"sdp":{"type":"offer","sdp":"v=0\r\no=- 1 2 IN IP4 127.0.0.1\r\n"}}"#;
const ANSWER: &str = r#"{"sdp":{"type":"answer","sdp":"v=0\r\no=- 3 4 IN IP4 127.0.0.1\r\n"}}"#;
const ICE: &str = r#"{"ice":{"candidate":"candidate:842163049 1 udp 1677729535 192.0.2.7 61665 typ srflx","sdpMid":"0","sdpMLineIndex":0}}"#;

async fn setup_test_server() -> (String, RelayHandle) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let config = RelayConfig {
        bind: addr.to_string(),
        grace_delay_ms: GRACE_MS,
        ..RelayConfig::default()
    };
    let server = SignalingServer::new(&config);
    let handle = server.handle();

    tokio::spawn(async move {
        server.serve(listener).await.unwrap();
    });

    (format!("ws://{}", addr), handle)
}

async fn connect(url: &str) -> Client {
    let (ws, _) = connect_async(url).await.expect("Failed to connect");
    // let the grace delay pass
    tokio::time::sleep(SETTLE).await;
    ws
}

async fn recv_text(ws: &mut Client) -> String {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("Timeout waiting for message")
            .unwrap()
            .unwrap();
        match msg {
            Message::Text(text) => return text.as_str().to_owned(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("Unexpected message: {:?}", other),
        }
    }
}

async fn assert_silent(ws: &mut Client) {
    let result = tokio::time::timeout(Duration::from_millis(300), ws.next()).await;
    assert!(result.is_err(), "Expected no message, got {:?}", result);
}

#[tokio::test]
async fn offer_buffered_until_second_peer_arrives() {
    let (url, handle) = setup_test_server().await;

    let mut a = connect(&url).await;
    a.send(Message::text(OFFER)).await.unwrap();
    tokio::time::sleep(SETTLE).await;
    assert!(handle.stats().await.unwrap().pending_offer);

    let mut b = connect(&url).await;
    assert_eq!(recv_text(&mut b).await, PEER_READY);
    assert_eq!(recv_text(&mut b).await, OFFER);
    assert_eq!(recv_text(&mut a).await, PEER_READY);

    let stats = handle.stats().await.unwrap();
    assert!(!stats.pending_offer);
    assert_eq!(stats.open_peers, 2);

    // delivered exactly once
    assert_silent(&mut b).await;
}

#[tokio::test]
async fn ice_candidate_relayed_unchanged() {
    let (url, _handle) = setup_test_server().await;

    let mut a = connect(&url).await;
    let mut b = connect(&url).await;
    assert_eq!(recv_text(&mut a).await, PEER_READY);
    assert_eq!(recv_text(&mut b).await, PEER_READY);

    a.send(Message::text(ICE)).await.unwrap();
    assert_eq!(recv_text(&mut b).await, ICE);
    assert_silent(&mut a).await;
}

#[tokio::test]
async fn disconnect_discards_buffered_offer() {
    let (url, handle) = setup_test_server().await;

    let mut a = connect(&url).await;
    a.send(Message::text(OFFER)).await.unwrap();
    tokio::time::sleep(SETTLE).await;
    a.close(None).await.unwrap();
    tokio::time::sleep(SETTLE).await;

    let stats = handle.stats().await.unwrap();
    assert_eq!(stats.peers, 0);
    assert!(!stats.pending_offer);

    let mut b = connect(&url).await;
    assert_silent(&mut b).await;
}

#[tokio::test]
async fn offer_answer_exchange_leaves_nothing_pending() {
    let (url, handle) = setup_test_server().await;

    let mut a = connect(&url).await;
    let mut b = connect(&url).await;
    assert_eq!(recv_text(&mut a).await, PEER_READY);
    assert_eq!(recv_text(&mut b).await, PEER_READY);

    a.send(Message::text(OFFER)).await.unwrap();
    assert_eq!(recv_text(&mut b).await, OFFER);
    assert!(!handle.stats().await.unwrap().pending_offer);

    b.send(Message::text(ANSWER)).await.unwrap();
    assert_eq!(recv_text(&mut a).await, ANSWER);

    let stats = handle.stats().await.unwrap();
    assert!(!stats.pending_offer);
    assert!(!stats.pending_answer);
}

#[tokio::test]
async fn ready_notifies_the_other_peer() {
    let (url, _handle) = setup_test_server().await;

    let mut a = connect(&url).await;
    let mut b = connect(&url).await;
    assert_eq!(recv_text(&mut a).await, PEER_READY);
    assert_eq!(recv_text(&mut b).await, PEER_READY);

    b.send(Message::text(r#"{"type":"ready"}"#)).await.unwrap();
    assert_eq!(recv_text(&mut a).await, PEER_READY);
    assert_silent(&mut b).await;
}

#[tokio::test]
async fn opaque_frames_pass_through_byte_identical() {
    let (url, _handle) = setup_test_server().await;

    let mut a = connect(&url).await;
    let mut b = connect(&url).await;
    assert_eq!(recv_text(&mut a).await, PEER_READY);
    assert_eq!(recv_text(&mut b).await, PEER_READY);

    a.send(Message::text("hello, not json {")).await.unwrap();
    assert_eq!(recv_text(&mut b).await, "hello, not json {");

    let payload = Bytes::from_static(&[0x00, 0xff, 0x10, 0x80]);
    a.send(Message::Binary(payload.clone())).await.unwrap();
    let msg = tokio::time::timeout(Duration::from_secs(2), b.next())
        .await
        .expect("Timeout waiting for binary frame")
        .unwrap()
        .unwrap();
    assert_eq!(msg, Message::Binary(payload));
}

#[tokio::test]
async fn reconnecting_peer_receives_missed_answer() {
    let (url, handle) = setup_test_server().await;

    // b answers while alone, e.g. after a drops and before it comes back
    let mut b = connect(&url).await;
    b.send(Message::text(ANSWER)).await.unwrap();
    tokio::time::sleep(SETTLE).await;
    assert!(handle.stats().await.unwrap().pending_answer);

    let mut a = connect(&url).await;
    assert_eq!(recv_text(&mut a).await, PEER_READY);
    assert_eq!(recv_text(&mut a).await, ANSWER);
    assert!(!handle.stats().await.unwrap().pending_answer);
}

#[tokio::test]
async fn offer_sent_right_after_connecting_is_kept_for_the_next_peer() {
    let (url, handle) = setup_test_server().await;

    // no settle: the offer lands inside a's own grace window
    let (mut a, _) = connect_async(url.as_str()).await.expect("Failed to connect");
    a.send(Message::text(OFFER)).await.unwrap();
    tokio::time::sleep(SETTLE).await;
    assert!(handle.stats().await.unwrap().pending_offer);
    assert_silent(&mut a).await;

    let mut b = connect(&url).await;
    assert_eq!(recv_text(&mut b).await, PEER_READY);
    assert_eq!(recv_text(&mut b).await, OFFER);
    assert!(!handle.stats().await.unwrap().pending_offer);
}
