//! Completion-event routing: named events to handlers registered at startup.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::types::TimerFired;

/// A completion-event consumer.
///
/// Implementations own any user-visible side effect (sending a message,
/// mutating state) and may fail freely; failures never reach the engine.
#[async_trait]
pub trait TimerHandler: Send + Sync {
    async fn handle(&self, fired: TimerFired) -> anyhow::Result<()>;
}

/// Maps timer event names to handlers. Register everything before `run`.
#[derive(Default)]
pub struct EventRegistry {
    handlers: HashMap<String, Arc<dyn TimerHandler>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for timers created with `event` (e.g. "reminder").
    /// The handler observes the `"{event}_timer_complete"` signal.
    pub fn register(&mut self, event: impl Into<String>, handler: Arc<dyn TimerHandler>) {
        self.handlers.insert(event.into(), handler);
    }

    /// Delivery router: consumes fired timers until the engine side closes.
    ///
    /// A missing handler or a handler error is logged and dropped; it
    /// isolates to that one event and never disturbs the engine.
    pub async fn run(self, mut fired_rx: mpsc::Receiver<TimerFired>) {
        while let Some(fired) = fired_rx.recv().await {
            let signal = fired.completion_event();
            let Some(handler) = self.handlers.get(&fired.timer.event) else {
                warn!(event = %signal, "no handler registered, event dropped");
                continue;
            };
            debug!(event = %signal, timer_id = ?fired.timer.id, "routing completion event");
            if let Err(e) = handler.handle(fired).await {
                warn!(event = %signal, "handler failed: {e:#}");
            }
        }
        info!("event registry exiting (channel closed)");
    }
}
