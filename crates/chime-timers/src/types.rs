use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A scheduled one-shot event, durable (id set) or in-memory (id `None`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timer {
    /// Store-assigned row id. `None` for short-path timers that never persist.
    pub id: Option<i64>,
    /// Which completion event fires when the timer expires, e.g. `"reminder"`.
    pub event: String,
    /// Positional payload forwarded to the completion handler.
    pub args: Vec<Value>,
    /// Keyword payload forwarded to the completion handler.
    pub kwargs: Map<String, Value>,
    /// Naive-UTC instant the timer fires at.
    pub expires: NaiveDateTime,
    /// Naive-UTC instant the timer was created.
    pub created: NaiveDateTime,
}

impl Timer {
    /// Name of the completion signal observed by handlers:
    /// `"{event}_timer_complete"`.
    pub fn completion_event(&self) -> String {
        format!("{}_timer_complete", self.event)
    }
}

/// A fired timer plus the derived human-readable elapsed string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerFired {
    pub timer: Timer,
    /// Time between creation and firing, e.g. "2 hours and 10 minutes".
    pub elapsed: String,
}

impl TimerFired {
    pub fn completion_event(&self) -> String {
        self.timer.completion_event()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chime_core::timefmt::utcnow;

    #[test]
    fn completion_event_name() {
        let timer = Timer {
            id: Some(1),
            event: "reminder".to_string(),
            args: vec![],
            kwargs: Map::new(),
            expires: utcnow(),
            created: utcnow(),
        };
        assert_eq!(timer.completion_event(), "reminder_timer_complete");
    }
}
