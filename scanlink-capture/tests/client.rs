//! Capture client integration tests against a scripted fake relay.

use std::time::Duration;

use scanlink_capture::{CaptureClient, ScanFeedback};
use scanlink_core::{
    Connection, ConnectionInfo, Event, Packet, PhoneConnect, ScanEnvelope, ScannedItem,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

// ── Helpers ──────────────────────────────────────────────────────

async fn ephemeral_listener() -> (TcpListener, ConnectionInfo) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let info = ConnectionInfo::new(addr.ip().to_string(), addr.port());
    (listener, info)
}

async fn recv_event(conn: &mut Connection) -> Packet {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let pkt = conn.recv().await.expect("connection closed");
            if pkt.sequence() != 0 {
                return pkt;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

// ── Connect / rendezvous ─────────────────────────────────────────

#[tokio::test]
async fn connect_parses_url_and_joins() {
    let (listener, info) = ephemeral_listener().await;

    let url = "https://shelf.test/scan/abc-123";
    let client = CaptureClient::connect(&info, url).await.unwrap();
    assert_eq!(client.session().as_str(), "abc-123");
    assert!(client.link().is_connected());

    let (stream, _) = listener.accept().await.unwrap();
    let mut relay = Connection::new(stream);
    let pkt = recv_event(&mut relay).await;
    assert_eq!(pkt.event().unwrap(), Event::PhoneConnect);
    let join = PhoneConnect::from_bytes(pkt.payload()).unwrap();
    assert_eq!(join.session_id.as_str(), "abc-123");
}

#[tokio::test]
async fn malformed_rendezvous_is_rejected() {
    let (_listener, info) = ephemeral_listener().await;
    let result = CaptureClient::connect(&info, "https://shelf.test/pair/abc").await;
    assert!(result.is_err());
}

#[tokio::test]
async fn refused_dial_is_an_error() {
    let (listener, info) = ephemeral_listener().await;
    drop(listener);

    let result = CaptureClient::connect(&info, "https://shelf.test/scan/abc-123").await;
    assert!(result.is_err());
}

// ── Shuttling ────────────────────────────────────────────────────

#[tokio::test]
async fn emissions_are_forwarded_as_scan_envelopes() {
    let (listener, info) = ephemeral_listener().await;
    let mut client = CaptureClient::connect(&info, "https://shelf.test/scan/abc-123")
        .await
        .unwrap();

    let (stream, _) = listener.accept().await.unwrap();
    let mut relay = Connection::new(stream);
    recv_event(&mut relay).await; // phone-connect

    let (emit_tx, emit_rx) = mpsc::channel(4);
    let (fb_tx, _fb_rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(async move {
        client.run(emit_rx, fb_tx).await.unwrap();
        client
    });

    let item = ScannedItem::new("00001234567811").with_extension("00411");
    emit_tx.send(item.clone()).await.unwrap();

    let pkt = recv_event(&mut relay).await;
    assert_eq!(pkt.event().unwrap(), Event::BarcodeScanned);
    let envelope = ScanEnvelope::from_bytes(pkt.payload()).unwrap();
    assert_eq!(envelope.session_id.as_str(), "abc-123");
    assert_eq!(ScannedItem::from_bytes(&envelope.item).unwrap(), item);

    // Dropping the emission channel ends the shuttle.
    drop(emit_tx);
    handle.await.unwrap();
}

#[tokio::test]
async fn duplicate_detected_becomes_feedback() {
    let (listener, info) = ephemeral_listener().await;
    let mut client = CaptureClient::connect(&info, "https://shelf.test/scan/abc-123")
        .await
        .unwrap();

    let (stream, _) = listener.accept().await.unwrap();
    let mut relay = Connection::new(stream);
    recv_event(&mut relay).await; // phone-connect

    let (_emit_tx, emit_rx) = mpsc::channel::<ScannedItem>(4);
    let (fb_tx, mut fb_rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(async move {
        client.run(emit_rx, fb_tx).await.unwrap();
        client
    });

    let bytes = ScannedItem::new("00001234567811").to_bytes().unwrap();
    relay
        .send(Packet::new_event(Event::DuplicateDetected, 1, bytes).unwrap())
        .await
        .unwrap();

    match fb_rx.recv().await.unwrap() {
        ScanFeedback::Duplicate(item) => assert_eq!(item.identity_key, "00001234567811"),
        other => panic!("expected Duplicate, got {other:?}"),
    }

    drop(relay);
    let client = handle.await.unwrap();
    assert!(client.link().is_terminal());
}

#[tokio::test]
async fn close_is_idempotent() {
    let (listener, info) = ephemeral_listener().await;
    let mut client = CaptureClient::connect(&info, "https://shelf.test/scan/abc-123")
        .await
        .unwrap();
    let (_stream, _) = listener.accept().await.unwrap();

    client.close().await;
    assert!(client.link().is_terminal());
    client.close().await; // still fine
}
