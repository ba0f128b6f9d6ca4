// Process-wide shared state: one registry and the two map-level channels.

use crate::domain::{BroadcastEvent, MapCommand};
use crate::use_cases::fanout::{FanOut, PublishReport};
use crate::use_cases::registry::MarkerRegistry;

/// Built once at startup and handed to every component by `Arc`.
#[derive(Debug)]
pub struct MapHub {
    /// Marker state and its op channel; committed ops are mirrored onto `events`.
    pub markers: MarkerRegistry,
    /// Camera/highlight commands for every view.
    pub commands: FanOut<MapCommand>,
    /// Marker ops and browser interactions for `map.events.subscribe` streams.
    pub events: FanOut<BroadcastEvent>,
}

impl MapHub {
    pub fn new(queue_capacity: usize) -> Self {
        let events = FanOut::new("map-events", queue_capacity);
        Self {
            markers: MarkerRegistry::with_events(queue_capacity, events.clone()),
            commands: FanOut::new("map-commands", queue_capacity),
            events,
        }
    }

    pub fn issue_command(&self, command: MapCommand) -> PublishReport {
        self.commands.publish(command)
    }
}
