//! `chime-timers`: persistent one-shot timer engine with at-most-once
//! completion dispatch.
//!
//! # Overview
//!
//! Timers are persisted to a SQLite `timers` table. The [`engine::TimerEngine`]
//! supervisor runs a single dispatch-loop worker that always sleeps on the
//! earliest pending timer and fires it by deleting the row, then emitting a
//! completion event on an mpsc channel. [`engine::TimerHandle`] creates and
//! cancels timers, preempting the sleeping worker whenever a nearer timer
//! appears. [`registry::EventRegistry`] routes fired timers to the handlers
//! registered for their event name.
//!
//! # Timer paths
//!
//! | Path    | Condition                    | Behaviour                                           |
//! |---------|------------------------------|-----------------------------------------------------|
//! | Short   | due sooner than the cutoff   | in-process sleeping task, no store row, lost on restart |
//! | Durable | anything farther             | persisted, survives restarts, fired in expiry order |

pub mod db;
pub mod engine;
pub mod error;
pub mod registry;
pub mod types;

pub use db::TimerStore;
pub use engine::{TimerEngine, TimerHandle};
pub use error::{Result, TimerError};
pub use registry::{EventRegistry, TimerHandler};
pub use types::{Timer, TimerFired};
