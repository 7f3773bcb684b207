//! Tagged simulation events and the sinks that consume them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    System,
    Combat,
    Honour,
    Item,
    Weather,
    Victory,
    Defeat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimEvent {
    pub turn: u64,
    pub kind: EventKind,
    pub message: String,
}

/// Append-only, order-preserving log of everything the engine reported.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<SimEvent>,
}

impl EventLog {
    pub fn push(&mut self, turn: u64, kind: EventKind, message: impl Into<String>) {
        self.events.push(SimEvent {
            turn,
            kind,
            message: message.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn all(&self) -> &[SimEvent] {
        &self.events
    }

    /// Events appended at or after `mark`.
    pub fn since(&self, mark: usize) -> &[SimEvent] {
        &self.events[mark.min(self.events.len())..]
    }

    pub fn of_kind(&self, kind: EventKind) -> impl Iterator<Item = &SimEvent> {
        self.events.iter().filter(move |e| e.kind == kind)
    }
}

/// Receives every event once, in emission order, after its turn completes.
pub trait EventSink: Send {
    fn accept(&mut self, event: &SimEvent);

    /// Called when the engine is reset.
    fn reset(&mut self) {}
}

impl EventSink for Vec<SimEvent> {
    fn accept(&mut self, event: &SimEvent) {
        self.push(event.clone());
    }

    fn reset(&mut self) {
        self.clear();
    }
}

/// Forwards events to the `tracing` subscriber.
#[derive(Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn accept(&mut self, event: &SimEvent) {
        tracing::info!(
            target: "badlands::events",
            turn = event.turn,
            kind = ?event.kind,
            "{}",
            event.message
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn since_returns_the_tail() {
        let mut log = EventLog::default();
        log.push(1, EventKind::System, "start");
        let mark = log.len();
        log.push(1, EventKind::Combat, "hit");
        log.push(1, EventKind::Item, "pickup");
        let tail = log.since(mark);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].message, "hit");
        assert!(log.since(99).is_empty());
        assert_eq!(log.of_kind(EventKind::Item).count(), 1);
    }
}
