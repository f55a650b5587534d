//! Event delivery
//!
//! Embedders receive engine output through [`EventSink`]. Progress and
//! activation callbacks are required; the state-change callback is optional
//! and defaults to a no-op. [`MemorySink`] records events as values for
//! replay, the CLI, and the FFI surface.

use crate::types::{EngineEvent, InteractionState};

/// Receives engine output during a tick
pub trait EventSink {
    /// Dwell completion ratio in [0,1]; ratio 0 signals a reset
    fn on_progress(&mut self, ratio: f32);

    /// The confirmed selection; invoked exactly once per activation
    fn on_activate(&mut self, selection: u8);

    /// State transition, with the selection current after the move
    fn on_state_change(&mut self, state: InteractionState, selection: Option<u8>) {
        let _ = (state, selection);
    }
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn on_progress(&mut self, _ratio: f32) {}
    fn on_activate(&mut self, _selection: u8) {}
}

/// Records events in arrival order
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Vec<EngineEvent>,
}

impl MemorySink {
    pub fn new() -> Self {
        MemorySink::default()
    }

    pub fn events(&self) -> &[EngineEvent] {
        &self.events
    }

    /// Take everything recorded so far, leaving the sink empty
    pub fn drain(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    /// Selections delivered through `on_activate`, in order
    pub fn activations(&self) -> Vec<u8> {
        self.events
            .iter()
            .filter_map(|e| match e {
                EngineEvent::Activated { selection } => Some(*selection),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for MemorySink {
    fn on_progress(&mut self, ratio: f32) {
        self.events.push(EngineEvent::Progress { ratio });
    }

    fn on_activate(&mut self, selection: u8) {
        self.events.push(EngineEvent::Activated { selection });
    }

    fn on_state_change(&mut self, state: InteractionState, selection: Option<u8>) {
        self.events.push(EngineEvent::StateChanged { state, selection });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_records_in_order() {
        let mut sink = MemorySink::new();
        sink.on_progress(0.25);
        sink.on_state_change(InteractionState::Confirm, Some(2));
        sink.on_activate(2);

        assert_eq!(
            sink.events(),
            &[
                EngineEvent::Progress { ratio: 0.25 },
                EngineEvent::StateChanged {
                    state: InteractionState::Confirm,
                    selection: Some(2)
                },
                EngineEvent::Activated { selection: 2 },
            ]
        );
        assert_eq!(sink.activations(), vec![2]);
    }

    #[test]
    fn test_drain_empties_the_sink() {
        let mut sink = MemorySink::new();
        sink.on_progress(1.0);
        let drained = sink.drain();
        assert_eq!(drained.len(), 1);
        assert!(sink.events().is_empty());
    }
}
