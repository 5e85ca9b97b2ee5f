//! Integration tests for the sliding-window protocol over the in-memory
//! simulator.
//!
//! Every test runs with a paused tokio clock, so retransmission timeouts
//! elapse instantly once both endpoints are idle.

use std::time::Duration;

use sliding_window::simulator::{link, SimEndpoint, SimulatorConfig};
use sliding_window::{
    Packet, PacketType, Receiver, ReceiverConfig, Sender, SenderConfig, SwpError, MAX_DATA_SIZE,
};

fn session(
    sender_link: SimulatorConfig,
    receiver_link: SimulatorConfig,
    window_size: usize,
    buffer_size: usize,
) -> (Sender<SimEndpoint>, Receiver<SimEndpoint>) {
    let (a, b) = link(sender_link, receiver_link);
    let sender = Sender::new(
        a,
        SenderConfig {
            window_size,
            ..SenderConfig::default()
        },
    )
    .expect("sender");
    let receiver = Receiver::new(b, ReceiverConfig { buffer_size }).expect("receiver");
    (sender, receiver)
}

fn decode_all(frames: Vec<Vec<u8>>, kind: PacketType) -> Vec<Packet> {
    frames
        .iter()
        .map(|raw| Packet::decode(raw).expect("valid frame"))
        .filter(|p| p.kind == kind)
        .collect()
}

/// Payload whose bytes depend on their position, so misordering shows up.
fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

// ---------------------------------------------------------------------------
// Test 1: 3500 bytes through window 5 / buffer 5 without loss
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn three_chunk_transfer_without_loss() {
    let (sender, receiver) = session(
        SimulatorConfig::default(),
        SimulatorConfig::default(),
        5,
        5,
    );
    let data = pattern(3500);
    sender.send(&data).unwrap();

    let mut received = Vec::new();
    for _ in 0..3 {
        received.extend(receiver.recv().await.unwrap());
    }
    assert_eq!(received, data);
    sender.flush().await.unwrap();

    let sent = decode_all(sender.transport().delivered(), PacketType::Data);
    let sizes: Vec<usize> = sent.iter().map(|p| p.payload.len()).collect();
    assert_eq!(sizes, vec![1400, 1400, 700]);
    assert_eq!(
        sent.iter().map(|p| p.seq_num).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );

    let acks = decode_all(receiver.transport().delivered(), PacketType::Ack);
    assert_eq!(acks.len(), 3);
    assert!(acks.windows(2).all(|w| w[0].seq_num <= w[1].seq_num));
    assert_eq!(acks.last().unwrap().seq_num, 2);
}

// ---------------------------------------------------------------------------
// Test 2: fragmentation round-trip at chunk boundaries
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn fragmentation_roundtrip_at_boundaries() {
    for len in [1, MAX_DATA_SIZE - 1, MAX_DATA_SIZE, MAX_DATA_SIZE + 1, 5000] {
        let (sender, receiver) = session(
            SimulatorConfig::default(),
            SimulatorConfig::default(),
            5,
            5,
        );
        let data = pattern(len);
        sender.send(&data).unwrap();

        let mut received = Vec::new();
        while received.len() < len {
            let chunk = receiver.recv().await.unwrap();
            assert!(chunk.len() <= MAX_DATA_SIZE);
            received.extend(chunk);
        }
        assert_eq!(received, data, "length {len}");
    }
}

// ---------------------------------------------------------------------------
// Test 3: lost ACK forces a retransmission, delivered once
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn lost_ack_triggers_retransmission_without_duplicate_delivery() {
    let (sender, receiver) = session(
        SimulatorConfig::default(),
        SimulatorConfig::default(),
        5,
        5,
    );
    receiver.transport().drop_next(1);

    sender.send(b"only once").unwrap();
    sender.flush().await.unwrap();

    let sent = decode_all(sender.transport().delivered(), PacketType::Data);
    assert!(sent.len() >= 2, "expected a retransmission, saw {}", sent.len());
    assert!(sent.iter().all(|p| p.seq_num == 0 && p.payload == b"only once"));

    assert_eq!(receiver.recv().await.unwrap(), b"only once");
    assert!(
        tokio::time::timeout(Duration::from_secs(5), receiver.recv())
            .await
            .is_err(),
        "duplicate chunk reached the application"
    );
}

// ---------------------------------------------------------------------------
// Test 4: lost DATA is recovered by retransmission
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn lost_data_is_recovered() {
    let (sender, receiver) = session(
        SimulatorConfig::default(),
        SimulatorConfig::default(),
        5,
        5,
    );
    sender.transport().drop_next(1);
    sender.send(b"first").unwrap();
    sender.send(b"second").unwrap();

    assert_eq!(receiver.recv().await.unwrap(), b"first");
    assert_eq!(receiver.recv().await.unwrap(), b"second");
}

// ---------------------------------------------------------------------------
// Test 5: flow control against a consumer that is not reading
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn closed_window_holds_back_third_packet() {
    let (sender, receiver) = session(
        SimulatorConfig::default(),
        SimulatorConfig::default(),
        5,
        2,
    );
    for chunk in [b"a", b"b", b"c"] {
        sender.send(chunk).unwrap();
    }
    tokio::time::sleep(Duration::from_secs(5)).await;

    let acks = decode_all(receiver.transport().delivered(), PacketType::Ack);
    assert_eq!(acks.last().unwrap().adv_win, 0);
    let sent = decode_all(sender.transport().delivered(), PacketType::Data);
    assert!(
        sent.iter().all(|p| p.seq_num < 2),
        "third packet went out while the window was closed"
    );

    assert_eq!(receiver.recv().await.unwrap(), b"a");
    assert_eq!(receiver.recv().await.unwrap(), b"b");
    assert_eq!(receiver.recv().await.unwrap(), b"c");
    sender.flush().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn lost_window_update_is_recovered_by_persist_timer() {
    let (sender, receiver) = session(
        SimulatorConfig::default(),
        SimulatorConfig::default(),
        5,
        1,
    );
    sender.send(b"a").unwrap();
    sender.send(b"b").unwrap();
    // ACK(0, win 0) at t=0, then seq 0 is resent once per RTO while the
    // window stays closed.  1.5 s sits between two resends.
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let closed = decode_all(sender.transport().delivered(), PacketType::Data);
    assert!(closed.len() >= 2, "expected a resend, saw {}", closed.len());
    assert!(
        closed.iter().all(|p| p.seq_num == 0),
        "new sequence number used while the window was closed"
    );

    // The window update sent on consumption is lost.
    receiver.transport().drop_next(1);
    assert_eq!(receiver.recv().await.unwrap(), b"a");
    assert_eq!(receiver.recv().await.unwrap(), b"b");

    let after = decode_all(sender.transport().delivered(), PacketType::Data);
    let after = &after[closed.len()..];
    let first_new = after
        .iter()
        .position(|p| p.seq_num == 1)
        .expect("seq 1 was sent");
    assert!(first_new > 0, "seq 1 went out without a resend of seq 0");
    assert!(after[..first_new].iter().all(|p| p.seq_num == 0));
}

// ---------------------------------------------------------------------------
// Test 6: slow consumer
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn slow_consumer_receives_everything_in_order() {
    let (sender, receiver) = session(
        SimulatorConfig::default(),
        SimulatorConfig::default(),
        4,
        2,
    );
    for i in 0..20u32 {
        sender.send(&i.to_be_bytes()).unwrap();
    }
    for i in 0..20u32 {
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(receiver.recv().await.unwrap(), i.to_be_bytes());
    }
    sender.flush().await.unwrap();
}

// ---------------------------------------------------------------------------
// Test 7: hostile link in both directions
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn lossy_reordering_duplicating_link_preserves_stream() {
    let hostile = |seed| SimulatorConfig {
        loss_rate: 0.2,
        reorder_rate: 0.2,
        duplicate_rate: 0.1,
        seed: Some(seed),
    };
    let (sender, receiver) = session(hostile(1), hostile(2), 5, 5);

    let messages: Vec<Vec<u8>> = (0..40usize).map(|i| pattern(1 + i * 97)).collect();
    for message in &messages {
        sender.send(message).unwrap();
    }
    let expected: Vec<u8> = messages.concat();

    let consumer = tokio::spawn(async move {
        let mut received = Vec::new();
        while received.len() < expected.len() {
            received.extend(receiver.recv().await.unwrap());
        }
        assert_eq!(received, expected);
        receiver
    });

    sender.flush().await.unwrap();
    let receiver = consumer.await.unwrap();
    sender.shutdown().await;
    receiver.shutdown().await;
}

// ---------------------------------------------------------------------------
// Test 8: shutdown
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn sender_shutdown_ends_receiver_stream() {
    let (sender, receiver) = session(
        SimulatorConfig::default(),
        SimulatorConfig::default(),
        5,
        5,
    );
    sender.send(b"last words").unwrap();
    sender.flush().await.unwrap();
    sender.shutdown().await;

    assert_eq!(receiver.recv().await.unwrap(), b"last words");
    assert!(matches!(receiver.recv().await, Err(SwpError::Closed)));
}
