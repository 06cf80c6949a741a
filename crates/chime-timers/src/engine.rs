//! Timer engine: the scheduling handle and the supervised dispatch loop.
//!
//! One worker task owns the currently armed timer and sleeps until its
//! expiry. The supervisor relaunches the worker whenever it is preempted
//! (a nearer timer appeared, or the armed timer was cancelled) and whenever
//! a store failure aborts a pass. Firing deletes the row first, then emits
//! the completion event; delivery is at-most-once.

use std::sync::{Arc, Mutex};

use chrono::NaiveDateTime;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

use chime_core::config::TimerConfig;
use chime_core::timefmt::{human_delta, utcnow};

use crate::db::TimerStore;
use crate::error::{Result, TimerError};
use crate::types::{Timer, TimerFired};

/// State shared between the handle, the supervisor, and the worker.
struct EngineShared {
    store: TimerStore,
    config: TimerConfig,
    /// Completion events leave the engine through this channel.
    fired_tx: mpsc::Sender<TimerFired>,
    /// The timer the worker is sleeping on, if any.
    ///
    /// The worker updates this under the lock in the same critical section
    /// as its next-due query, so a concurrent `create_timer` always observes
    /// either the armed timer or a store state that already includes its own
    /// insert. That closes the window where a nearer timer could slip in
    /// unnoticed while the worker arms a farther one.
    current: Mutex<Option<Timer>>,
    /// Wakes an Idle worker once a timer lands within the horizon.
    wake: Notify,
    /// Abort handle of the in-flight worker; aborting preempts the loop.
    worker: Mutex<Option<AbortHandle>>,
}

/// Clonable creation/cancellation API for the timer engine.
///
/// All methods must run inside the tokio runtime that drives
/// [`TimerEngine::run`]: the short-timer path spawns its own sleeper task.
#[derive(Clone)]
pub struct TimerHandle {
    shared: Arc<EngineShared>,
}

impl TimerHandle {
    /// Schedule `event` to fire at `when` (naive UTC) with the given payload.
    ///
    /// Timers due sooner than the short-timer cutoff stay in memory
    /// (`id: None`) and are lost on restart; anything farther is persisted
    /// first. Callers validate user-supplied times; a `when` already in the
    /// past lands on the in-memory path and fires immediately.
    pub fn create_timer(
        &self,
        when: NaiveDateTime,
        event: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<Timer> {
        self.create_timer_at(when, utcnow(), event, args, kwargs)
    }

    /// Like [`TimerHandle::create_timer`] with an explicit creation instant,
    /// for callers that anchor elapsed-time display to an earlier moment
    /// (e.g. the message that asked for the reminder).
    pub fn create_timer_at(
        &self,
        when: NaiveDateTime,
        created: NaiveDateTime,
        event: &str,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<Timer> {
        let mut timer = Timer {
            id: None,
            event: event.to_string(),
            args,
            kwargs,
            expires: when,
            created,
        };

        let delta = when - created;
        if delta < chrono::Duration::seconds(self.shared.config.short_timer_cutoff_secs) {
            debug!(
                event,
                delta_ms = delta.num_milliseconds(),
                "short timer, keeping in memory"
            );
            let shared = Arc::clone(&self.shared);
            let short = timer.clone();
            tokio::spawn(async move { run_short_timer(shared, short).await });
            return Ok(timer);
        }

        timer.id = Some(self.shared.store.insert(
            &timer.event,
            &timer.args,
            &timer.kwargs,
            timer.expires,
            timer.created,
        )?);
        info!(timer_id = ?timer.id, event, expires = %timer.expires, "timer persisted");

        if delta <= chrono::Duration::days(self.shared.config.dispatch_horizon_days) {
            // An Idle worker is watching this signal, not the table.
            self.shared.wake.notify_one();
        }

        // A worker asleep on a later timer would miss this one: preempt it.
        let preempt = {
            let current = self.shared.current.lock().unwrap();
            current.as_ref().is_some_and(|cur| when < cur.expires)
        };
        if preempt {
            self.preempt_worker();
        }

        Ok(timer)
    }

    /// Cancel a persisted timer owned by `owner`.
    ///
    /// `owner` must match the first positional arg stored with the timer.
    /// Returns [`TimerError::TimerNotFound`] when no matching row exists, so
    /// callers can answer "no reminder with that ID" without treating it as
    /// a failure of the engine.
    pub fn cancel_timer(&self, id: i64, event: &str, owner: &str) -> Result<()> {
        let removed = self.shared.store.delete_scoped(id, event, owner)?;
        if removed == 0 {
            return Err(TimerError::TimerNotFound { id });
        }
        info!(timer_id = id, event, "timer cancelled");

        let armed = {
            let current = self.shared.current.lock().unwrap();
            current.as_ref().is_some_and(|cur| cur.id == Some(id))
        };
        if armed {
            // The worker is sleeping on a row that no longer exists.
            self.preempt_worker();
        }
        Ok(())
    }

    /// Pending timers for one owner and event, soonest first.
    pub fn list_timers(&self, event: &str, owner: &str, limit: u32) -> Result<Vec<Timer>> {
        self.shared.store.list_scoped(event, owner, limit)
    }

    fn preempt_worker(&self) {
        if let Some(worker) = self.shared.worker.lock().unwrap().take() {
            debug!("preempting dispatch loop");
            worker.abort();
        }
    }
}

/// Owns the dispatch loop. Construct once, take handles, then `run`.
pub struct TimerEngine {
    shared: Arc<EngineShared>,
}

impl TimerEngine {
    /// Build an engine over `store`.
    ///
    /// Completion events are delivered on `fired_tx`; pair the receiving end
    /// with an [`EventRegistry`](crate::registry::EventRegistry) consumer.
    pub fn new(store: TimerStore, config: TimerConfig, fired_tx: mpsc::Sender<TimerFired>) -> Self {
        Self {
            shared: Arc::new(EngineShared {
                store,
                config,
                fired_tx,
                current: Mutex::new(None),
                wake: Notify::new(),
                worker: Mutex::new(None),
            }),
        }
    }

    pub fn handle(&self) -> TimerHandle {
        TimerHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Supervisor loop. Runs until `shutdown` broadcasts `true`.
    ///
    /// The worker never terminates on its own. Every exit is classified:
    /// cancellation is expected preemption and relaunches silently; an error
    /// (store connectivity) is logged and relaunched immediately, retrying
    /// indefinitely so already-persisted timers are never abandoned.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("timer engine started");
        loop {
            // Spawn and publish the abort handle under one lock so a
            // preemption request can never observe a running worker without
            // a handle to abort it.
            let mut worker = {
                let mut slot = self.shared.worker.lock().unwrap();
                let worker = tokio::spawn(dispatch_loop(Arc::clone(&self.shared)));
                *slot = Some(worker.abort_handle());
                worker
            };

            let stopping = tokio::select! {
                exit = &mut worker => {
                    match exit {
                        Ok(Err(e)) => error!("dispatch loop error: {e}; relaunching"),
                        Ok(Ok(())) => warn!("dispatch loop returned; relaunching"),
                        Err(join) if join.is_cancelled() => {
                            debug!("dispatch loop preempted; relaunching");
                        }
                        Err(join) => error!("dispatch loop panicked: {join}; relaunching"),
                    }
                    false
                }
                _ = shutdown.wait_for(|stop| *stop) => true,
            };
            if stopping {
                worker.abort();
                info!("timer engine shutting down");
                break;
            }

            // Discard in-flight state: the fresh worker re-reads the store
            // and will naturally pick up the nearest pending timer.
            *self.shared.current.lock().unwrap() = None;
        }
    }
}

/// One pass of the engine: wait for a timer, sleep, fire, repeat.
///
/// Returns only on store failure; the supervisor relaunches. Cancellation
/// mid-sleep leaves nothing to reconcile because the row is neither deleted
/// nor dispatched until the sleep completes.
async fn dispatch_loop(shared: Arc<EngineShared>) -> Result<()> {
    loop {
        let timer = wait_for_active_timer(&shared).await?;

        let now = utcnow();
        if timer.expires > now {
            let sleep_for = (timer.expires - now).to_std().unwrap_or_default();
            tokio::time::sleep(sleep_for).await;
        }
        // Past-due timers (e.g. found at startup after a crash) fire
        // without sleeping.

        fire_timer(&shared, timer).await?;
        *shared.current.lock().unwrap() = None;
    }
}

/// Idle state: the next due timer within the horizon, or block until one
/// exists.
///
/// The query and the arming of `current` happen in one critical section;
/// see [`EngineShared::current`].
async fn wait_for_active_timer(shared: &EngineShared) -> Result<Timer> {
    loop {
        {
            let mut current = shared.current.lock().unwrap();
            if let Some(timer) = shared
                .store
                .fetch_next_due(shared.config.dispatch_horizon_days)?
            {
                *current = Some(timer.clone());
                return Ok(timer);
            }
            *current = None;
        }
        // Nothing within the horizon. `notify_one` stores a permit, so an
        // insert landing between the query above and this await still wakes
        // us for the retry.
        shared.wake.notified().await;
    }
}

/// Firing state: delete first, then dispatch. A timer lost between the two
/// steps stays lost; delivery is at-most-once.
async fn fire_timer(shared: &EngineShared, timer: Timer) -> Result<()> {
    if let Some(id) = timer.id {
        if shared.store.delete(id)? == 0 {
            // Cancelled while we were waking up; nothing to dispatch.
            debug!(timer_id = id, "timer row already removed, skipping dispatch");
            return Ok(());
        }
    }
    dispatch(shared, timer);
    Ok(())
}

/// Emit the completion event without ever blocking the loop.
fn dispatch(shared: &EngineShared, timer: Timer) {
    let signal = timer.completion_event();
    let elapsed = human_delta(timer.created, utcnow());
    let fired = TimerFired { timer, elapsed };
    match shared.fired_tx.try_send(fired) {
        Ok(()) => debug!(event = %signal, "completion event dispatched"),
        Err(e) => warn!(event = %signal, "completion channel full or closed, event dropped: {e}"),
    }
}

/// Short-timer fast path: an independent sleeping task, fully decoupled from
/// the dispatch loop and never persisted.
async fn run_short_timer(shared: Arc<EngineShared>, timer: Timer) {
    let now = utcnow();
    if timer.expires > now {
        let sleep_for = (timer.expires - now).to_std().unwrap_or_default();
        tokio::time::sleep(sleep_for).await;
    }
    dispatch(&shared, timer);
}
