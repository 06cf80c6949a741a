//! `chime-core`: configuration, errors, and payload types shared between the
//! timer engine and the channel adapters that deliver fired reminders.

pub mod config;
pub mod error;
pub mod reminder;
pub mod timefmt;

pub use config::{ChimeConfig, DatabaseConfig, TimerConfig};
pub use error::{ChimeError, Result};
