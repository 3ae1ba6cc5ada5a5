//! Integration tests for connection lifecycle, heartbeat and the outbound queue
//!
//! The state machine is driven directly where exact timing matters; the
//! manager is exercised under paused tokio time.

mod common;

use common::{wait_until, ScriptedTransport};
use parking_lot::Mutex;
use realtime_link::core::connection_state::{AtomicConnectionStatus, AtomicMetrics};
use realtime_link::core::Observers;
use realtime_link::{
    ClientConfig, ClientEvent, ConnectionStateMachine, ConnectionStatus, ExponentialBackoff,
    HeartbeatConfig, Message, MessageType, OverflowPolicy, QueuePolicy, RealtimeError,
    RealtimeManager, TransportEvent, TransportEventKind, WsMessage,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::unbounded_channel;
use tokio::time::Instant;

/// Tiny deterministic generator for event sequences
struct Lcg(u64);

impl Lcg {
    fn next(&mut self, bound: u64) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (self.0 >> 33) % bound
    }
}

#[test]
fn test_random_sequences_only_take_legal_transitions() {
    verbose_println!("Driving the state machine with pseudo-random events...");

    for seed in 0..50u64 {
        let transport = ScriptedTransport::new();
        let observers = Observers::new();
        let (tx, _rx) = unbounded_channel::<TransportEvent>();
        let config = ClientConfig::new("ws://campus.test")
            .with_heartbeat(Some(HeartbeatConfig {
                interval: Duration::from_millis(100),
                timeout: Duration::from_millis(40),
            }))
            .with_reconnect_strategy(Box::new(ExponentialBackoff::new(
                Duration::from_millis(10),
                Some(4),
            )));
        let mut machine = ConnectionStateMachine::new(
            config,
            Arc::new(transport.clone()),
            tx,
            Arc::clone(&observers),
            Arc::new(AtomicConnectionStatus::new(ConnectionStatus::Disconnected)),
            Arc::new(AtomicMetrics::new()),
        );

        let transitions = Arc::new(Mutex::new(Vec::new()));
        let t = Arc::clone(&transitions);
        let _sub = observers.on_status_change(move |from, to| t.lock().push((from, to)));

        let mut rng = Lcg(seed);
        let mut now = Instant::now();
        for _ in 0..200 {
            let generation = if rng.next(10) == 0 {
                machine.generation().saturating_sub(1)
            } else {
                machine.generation()
            };
            let kind = match rng.next(8) {
                0 => {
                    machine.connect(now);
                    continue;
                }
                1 => {
                    machine.disconnect();
                    continue;
                }
                2 => {
                    now += Duration::from_millis(rng.next(200));
                    machine.fire_timers(now);
                    continue;
                }
                3 => TransportEventKind::Open,
                4 => TransportEventKind::Close { clean: true },
                5 => TransportEventKind::Close { clean: false },
                6 => TransportEventKind::Error("boom".into()),
                _ => TransportEventKind::Message(WsMessage::Text(
                    serde_json::to_string(&Message::heartbeat()).unwrap(),
                )),
            };
            machine.handle_event(TransportEvent { generation, kind }, now);
        }

        let transitions = transitions.lock();
        let mut current = ConnectionStatus::Disconnected;
        for &(from, to) in transitions.iter() {
            assert_eq!(from, current, "seed {}: transition chain broken", seed);
            assert!(from.can_transition_to(to), "seed {}: illegal {} -> {}", seed, from, to);
            current = to;
        }
        assert_eq!(current, machine.status());
        verbose_println!("  seed {}: {} transitions", seed, transitions.len());
    }
}

#[test]
fn test_never_connected_without_connecting() {
    let transport = ScriptedTransport::new();
    let (tx, _rx) = unbounded_channel();
    let mut machine = ConnectionStateMachine::new(
        ClientConfig::new("ws://campus.test").with_heartbeat(None),
        Arc::new(transport),
        tx,
        Observers::new(),
        Arc::new(AtomicConnectionStatus::new(ConnectionStatus::Disconnected)),
        Arc::new(AtomicMetrics::new()),
    );

    // Open for a link that does not exist
    machine.handle_event(
        TransportEvent {
            generation: 1,
            kind: TransportEventKind::Open,
        },
        Instant::now(),
    );
    assert_eq!(machine.status(), ConnectionStatus::Disconnected);
}

fn manager_builder(
    transport: &ScriptedTransport,
) -> realtime_link::RealtimeManagerBuilder<
    realtime_link::manager::states::HasUrl,
    realtime_link::manager::states::HasTransport,
> {
    RealtimeManager::builder()
        .url("ws://campus.test/realtime")
        .transport(transport.clone())
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_timeout_forces_reconnect() {
    let transport = ScriptedTransport::auto_open();
    let manager = manager_builder(&transport)
        .heartbeat(Duration::from_secs(1), Duration::from_millis(500))
        .build()
        .await
        .unwrap();
    let (events, _sub) = manager.subscribe();

    let connected_at = Instant::now();
    manager.connect().unwrap();
    assert!(wait_until(|| manager.is_ready()).await);

    assert!(wait_until(|| manager.status() == ConnectionStatus::Reconnecting).await);
    let elapsed = connected_at.elapsed();
    verbose_println!("  Reconnecting after {:?}", elapsed);

    // First probe at 1s, unanswered for 500ms
    assert!(elapsed >= Duration::from_millis(1500));
    assert!(elapsed < Duration::from_millis(1600));
    assert_eq!(transport.close_count(), 1);
    assert!(events
        .try_iter()
        .any(|e| matches!(e, ClientEvent::Error(RealtimeError::HeartbeatTimeout(_)))));

    manager.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_answered_heartbeats_keep_connection() {
    let transport = ScriptedTransport::auto_open();
    let manager = manager_builder(&transport)
        .heartbeat(Duration::from_secs(1), Duration::from_millis(500))
        .build()
        .await
        .unwrap();
    let received = Arc::new(AtomicUsize::new(0));
    let r = Arc::clone(&received);
    let _sub = manager.on_message(move |_| {
        r.fetch_add(1, Ordering::SeqCst);
    });

    manager.connect().unwrap();
    assert!(wait_until(|| manager.is_ready()).await);

    for probe in 1..=5 {
        assert!(wait_until(|| transport.sent().iter().filter(|m| m.is_heartbeat()).count() == probe).await);
        transport.deliver(&Message::heartbeat());
    }

    assert!(manager.is_ready());
    assert_eq!(transport.open_count(), 1);
    assert_eq!(received.load(Ordering::SeqCst), 0, "heartbeats are not dispatched");

    manager.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_queue_flushes_in_order_on_open() {
    let transport = ScriptedTransport::new();
    let manager = manager_builder(&transport).no_heartbeat().build().await.unwrap();

    let ids: Vec<String> = ["m1", "m2", "m3"]
        .iter()
        .map(|text| {
            let message = Message::new(MessageType::Message, json!({ "text": text }));
            let id = message.id().to_string();
            manager.send(message).unwrap();
            id
        })
        .collect();

    assert_eq!(manager.queued_message_ids().await.unwrap(), ids);
    assert_eq!(manager.metrics().queued, 3);

    manager.connect().unwrap();
    assert!(wait_until(|| transport.open_count() == 1).await);
    assert!(transport.sent().is_empty(), "nothing is sent before open");

    transport.accept();
    assert!(wait_until(|| transport.sent_payload_ids().len() == 3).await);
    assert_eq!(transport.sent_payload_ids(), ids);
    assert!(manager.queued_message_ids().await.unwrap().is_empty());

    // Sent straight through once connected
    let live = Message::new(MessageType::StatusUpdate, json!({"online": true}));
    let live_id = live.id().to_string();
    manager.send(live).unwrap();
    assert!(wait_until(|| transport.sent_payload_ids().len() == 4).await);
    assert_eq!(transport.sent_payload_ids()[3], live_id);

    manager.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_failed_flush_keeps_order_for_next_open() {
    let transport = ScriptedTransport::new();
    let manager = manager_builder(&transport).no_heartbeat().build().await.unwrap();

    for n in 0..3 {
        manager.send(Message::new(MessageType::Message, json!(n))).unwrap();
    }
    let queued = manager.queued_message_ids().await.unwrap();

    transport.set_fail_sends(true);
    manager.connect().unwrap();
    assert!(wait_until(|| transport.open_count() == 1).await);
    transport.accept();
    assert!(wait_until(|| manager.is_ready()).await);
    assert_eq!(manager.queued_message_ids().await.unwrap(), queued);

    transport.set_fail_sends(false);
    transport.drop_connection(false);
    assert!(wait_until(|| transport.open_count() == 2).await);
    transport.accept();
    assert!(wait_until(|| transport.sent_payload_ids().len() == 3).await);
    assert_eq!(transport.sent_payload_ids(), queued);

    manager.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_bounded_queue_reports_overflow() {
    let transport = ScriptedTransport::new();
    let manager = manager_builder(&transport)
        .no_heartbeat()
        .queue_policy(QueuePolicy::bounded(2, OverflowPolicy::DropOldest))
        .build()
        .await
        .unwrap();
    let overflowed = Arc::new(Mutex::new(Vec::new()));
    let o = Arc::clone(&overflowed);
    let _sub = manager.on_error(move |e| {
        if let RealtimeError::QueueOverflow { dropped_id, .. } = e {
            o.lock().push(dropped_id.clone());
        }
    });

    let first = Message::new(MessageType::Message, json!(1));
    let first_id = first.id().to_string();
    manager.send(first).unwrap();
    manager.send(Message::new(MessageType::Message, json!(2))).unwrap();
    manager.send(Message::new(MessageType::Message, json!(3))).unwrap();

    let queued = manager.queued_message_ids().await.unwrap();
    assert_eq!(queued.len(), 2);
    assert!(!queued.contains(&first_id));
    assert_eq!(*overflowed.lock(), vec![first_id]);

    manager.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_messages_dispatched_to_observers() {
    let transport = ScriptedTransport::auto_open();
    let manager = manager_builder(&transport).no_heartbeat().build().await.unwrap();

    let all = Arc::new(AtomicUsize::new(0));
    let a = Arc::clone(&all);
    let _all = manager.on_message(move |_| {
        a.fetch_add(1, Ordering::SeqCst);
    });
    let updates = Arc::new(AtomicUsize::new(0));
    let u = Arc::clone(&updates);
    let updates_sub = manager.on_message_type(MessageType::RealtimeUpdate, move |m| {
        assert_eq!(m.kind(), MessageType::RealtimeUpdate);
        u.fetch_add(1, Ordering::SeqCst);
    });

    manager.connect().unwrap();
    assert!(wait_until(|| manager.is_ready()).await);

    transport.deliver(&Message::new(MessageType::RealtimeUpdate, json!({"slide": 4})));
    transport.deliver(&Message::new(MessageType::Notification, json!({"msg": "hi"})));
    transport.deliver_raw(WsMessage::Text("{ not json".into()));
    assert!(wait_until(|| all.load(Ordering::SeqCst) == 2).await);
    assert_eq!(updates.load(Ordering::SeqCst), 1);
    assert!(manager.is_ready(), "malformed frame does not affect the connection");
    assert_eq!(manager.metrics().messages_received, 3);

    assert!(updates_sub.unsubscribe());
    transport.deliver(&Message::new(MessageType::RealtimeUpdate, json!({"slide": 5})));
    assert!(wait_until(|| all.load(Ordering::SeqCst) == 3).await);
    assert_eq!(updates.load(Ordering::SeqCst), 1);

    manager.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_lifecycle_callbacks() {
    let transport = ScriptedTransport::auto_open();
    let manager = manager_builder(&transport).no_heartbeat().build().await.unwrap();

    let connects = Arc::new(AtomicUsize::new(0));
    let disconnects = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&connects);
    let d = Arc::clone(&disconnects);
    let _c = manager.on_connect(move || {
        c.fetch_add(1, Ordering::SeqCst);
    });
    let _d = manager.on_disconnect(move || {
        d.fetch_add(1, Ordering::SeqCst);
    });
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&statuses);
    let _s = manager.on_status_change(move |_, to| s.lock().push(to));

    manager.connect().unwrap();
    assert!(wait_until(|| manager.is_ready()).await);
    transport.drop_connection(true);
    assert!(wait_until(|| manager.status() == ConnectionStatus::Disconnected).await);

    assert_eq!(connects.load(Ordering::SeqCst), 1);
    assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    assert_eq!(
        *statuses.lock(),
        vec![
            ConnectionStatus::Connecting,
            ConnectionStatus::Connected,
            ConnectionStatus::Disconnected
        ]
    );

    // Clean close: no automatic reconnection
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(transport.open_count(), 1);

    manager.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_drops_queue_and_rejects_commands() {
    let transport = ScriptedTransport::new();
    let manager = manager_builder(&transport).no_heartbeat().build().await.unwrap();
    manager.send(Message::new(MessageType::Message, json!("lost"))).unwrap();

    let signal = manager.host_signal();
    manager.shutdown().await.unwrap();

    assert!(matches!(signal.online(), Err(RealtimeError::ChannelSend(_))));
    assert!(transport.sent().is_empty());
}
