//! Reminder payload types, shared between the timer engine and the channel
//! adapters that deliver fired reminders.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Rides in a reminder timer's positional args as
/// `[author_id, channel_id, message]`.
///
/// The author id sits first: the store's owner-scoped cancellation predicate
/// keys on `args[0]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderPayload {
    /// User that asked for the reminder; owns the timer for cancellation.
    pub author_id: u64,
    /// Channel the reminder is delivered back to.
    pub channel_id: u64,
    /// Text to deliver.
    pub message: String,
}

impl ReminderPayload {
    /// Positional-args encoding used when creating the timer.
    pub fn to_args(&self) -> Vec<Value> {
        vec![
            Value::from(self.author_id),
            Value::from(self.channel_id),
            Value::from(self.message.clone()),
        ]
    }

    /// Decode from a fired timer's args. `None` when the shape is not a
    /// reminder payload.
    pub fn from_args(args: &[Value]) -> Option<Self> {
        let author_id = args.first()?.as_u64()?;
        let channel_id = args.get(1)?.as_u64()?;
        let message = args.get(2)?.as_str()?.to_string();
        Some(Self {
            author_id,
            channel_id,
            message,
        })
    }
}

/// Parsed and ready-to-send reminder, handed to a channel-specific delivery
/// task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderDelivery {
    /// Originating timer id, if the timer was persisted. Used for logging.
    pub timer_id: Option<i64>,
    /// Destination channel.
    pub channel_id: u64,
    /// Fully formatted text, elapsed-time suffix included.
    pub text: String,
}
