// The reminder flow end to end: engine fires, the registry routes, and a
// reminder handler hands a formatted delivery to the channel-adapter queue.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Duration as Delta;
use serde_json::Map;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

use chime_core::reminder::{ReminderDelivery, ReminderPayload};
use chime_core::timefmt::utcnow;
use chime_core::TimerConfig;
use chime_timers::{EventRegistry, TimerEngine, TimerFired, TimerHandle, TimerHandler, TimerStore};

/// Formats a fired reminder and queues it for the channel adapter.
struct ReminderHandler {
    delivery_tx: mpsc::Sender<ReminderDelivery>,
}

#[async_trait]
impl TimerHandler for ReminderHandler {
    async fn handle(&self, fired: TimerFired) -> anyhow::Result<()> {
        let payload = ReminderPayload::from_args(&fired.timer.args)
            .ok_or_else(|| anyhow::anyhow!("not a reminder payload"))?;
        self.delivery_tx
            .send(ReminderDelivery {
                timer_id: fired.timer.id,
                channel_id: payload.channel_id,
                text: format!(
                    "<@{}>, {} ago: {}",
                    payload.author_id, fired.elapsed, payload.message
                ),
            })
            .await?;
        Ok(())
    }
}

struct Rig {
    handle: TimerHandle,
    delivery_rx: mpsc::Receiver<ReminderDelivery>,
    _shutdown_tx: watch::Sender<bool>,
}

fn spawn_reminder_stack() -> Rig {
    let store = TimerStore::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap();
    let config = TimerConfig {
        short_timer_cutoff_secs: 0,
        dispatch_horizon_days: 40,
    };
    let (fired_tx, fired_rx) = mpsc::channel(64);
    let engine = TimerEngine::new(store, config, fired_tx);
    let handle = engine.handle();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(engine.run(shutdown_rx));

    let (delivery_tx, delivery_rx) = mpsc::channel(64);
    let mut registry = EventRegistry::new();
    registry.register("reminder", Arc::new(ReminderHandler { delivery_tx }));
    tokio::spawn(registry.run(fired_rx));

    Rig {
        handle,
        delivery_rx,
        _shutdown_tx: shutdown_tx,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reminder_reaches_the_adapter_queue() {
    let mut rig = spawn_reminder_stack();

    let payload = ReminderPayload {
        author_id: 42,
        channel_id: 100,
        message: "stretch your legs".to_string(),
    };
    let timer = rig
        .handle
        .create_timer(
            utcnow() + Delta::milliseconds(300),
            "reminder",
            payload.to_args(),
            Map::new(),
        )
        .unwrap();

    let delivery = timeout(Duration::from_secs(10), rig.delivery_rx.recv())
        .await
        .expect("timed out waiting for delivery")
        .expect("delivery channel closed");

    assert_eq!(delivery.timer_id, timer.id);
    assert_eq!(delivery.channel_id, 100);
    assert!(delivery.text.contains("<@42>"));
    assert!(delivery.text.contains("stretch your legs"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn owner_can_list_and_cancel_their_reminders() {
    let rig = spawn_reminder_stack();

    let payload = |message: &str| ReminderPayload {
        author_id: 42,
        channel_id: 100,
        message: message.to_string(),
    };
    let first = rig
        .handle
        .create_timer(
            utcnow() + Delta::seconds(120),
            "reminder",
            payload("first").to_args(),
            Map::new(),
        )
        .unwrap();
    rig.handle
        .create_timer(
            utcnow() + Delta::seconds(240),
            "reminder",
            payload("second").to_args(),
            Map::new(),
        )
        .unwrap();

    let mine = rig.handle.list_timers("reminder", "42", 10).unwrap();
    assert_eq!(mine.len(), 2);
    assert_eq!(mine[0].id, first.id);

    rig.handle
        .cancel_timer(first.id.unwrap(), "reminder", "42")
        .unwrap();
    let mine = rig.handle.list_timers("reminder", "42", 10).unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(
        ReminderPayload::from_args(&mine[0].args).unwrap().message,
        "second"
    );
}
