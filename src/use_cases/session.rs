// Per-view session state and the tick step that turns queued ops into view deltas.

use crate::domain::{BroadcastEvent, LatLng, MapCommand, Marker, MarkerOp};
use crate::use_cases::fanout::{FanOut, PublishReport, Subscription};
use crate::use_cases::hub::MapHub;
use crate::use_cases::simulation::MockGenerator;
use crate::use_cases::source::{ApiMarkerSource, MarkerSource};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Shortest tick period the runtime will schedule; zero is raised to this.
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Which feed new sessions render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Shared registry; every view sees the same markers.
    Api,
    /// A private simulated fleet per view.
    Mock,
}

/// Shared configuration for view sessions.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Delay between the transport opening and the first tick.
    pub connect_grace: Duration,
    /// Fixed tick interval for draining ops.
    pub tick_interval: Duration,
    /// Marker feed for new sessions.
    pub source: SourceKind,
    /// Initial fleet size for mock sources.
    pub mock_initial_markers: usize,
}

impl SessionSettings {
    pub fn open_source(&self, hub: &Arc<MapHub>) -> Box<dyn MarkerSource> {
        match self.source {
            SourceKind::Api => Box::new(ApiMarkerSource::attach(Arc::clone(hub))),
            SourceKind::Mock => Box::new(MockGenerator::new(self.mock_initial_markers)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Mounted,
    Connected,
    Ticking,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Transport went away.
    Disconnected,
    /// A queue filled up and the session was dropped from a channel.
    Evicted,
}

/// One UI change for the view to apply.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewDelta {
    AddMarker {
        id: String,
        name: String,
        position: LatLng,
    },
    MoveMarker {
        id: String,
        position: LatLng,
    },
    RemoveMarker {
        id: String,
    },
    Command(MapCommand),
}

impl From<MarkerOp> for ViewDelta {
    fn from(op: MarkerOp) -> Self {
        match op {
            MarkerOp::Add { id, name, position } => Self::AddMarker { id, name, position },
            MarkerOp::Update { id, position, .. } => Self::MoveMarker { id, position },
            MarkerOp::Delete { id } => Self::RemoveMarker { id },
        }
    }
}

/// Mounted -> Connected -> Ticking -> Closed.
///
/// Closing drops the marker source and the command subscription together, so
/// a closed session holds no channel slot.
pub struct ViewSession {
    phase: SessionPhase,
    source: Option<Box<dyn MarkerSource>>,
    commands: Option<Subscription<MapCommand>>,
    events: FanOut<BroadcastEvent>,
    close_reason: Option<CloseReason>,
    ticks: u64,
}

impl ViewSession {
    pub fn mount(source: Box<dyn MarkerSource>, hub: &MapHub) -> Self {
        Self {
            phase: SessionPhase::Mounted,
            source: Some(source),
            commands: Some(hub.commands.subscribe()),
            events: hub.events.clone(),
            close_reason: None,
            ticks: 0,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Markers for the initial render.
    pub fn initial_markers(&self) -> Vec<Marker> {
        self.source
            .as_ref()
            .map(|source| source.snapshot())
            .unwrap_or_default()
    }

    /// Transport is established; ticks start applying ops.
    pub fn connect(&mut self) {
        if self.phase == SessionPhase::Mounted {
            self.phase = SessionPhase::Connected;
        }
    }

    /// Applies at most one marker op and at most one map command.
    ///
    /// Does nothing before `connect` or after `close`. A source or command
    /// queue that was evicted closes the session.
    pub fn tick(&mut self) -> Vec<ViewDelta> {
        if !matches!(self.phase, SessionPhase::Connected | SessionPhase::Ticking) {
            return Vec::new();
        }
        self.phase = SessionPhase::Ticking;
        self.ticks += 1;

        let mut deltas = Vec::with_capacity(2);
        let mut evicted = false;

        if let Some(source) = self.source.as_mut() {
            match source.poll() {
                Some(op) => deltas.push(ViewDelta::from(op)),
                None => evicted |= source.is_closed(),
            }
        }
        if let Some(commands) = self.commands.as_mut() {
            match commands.try_next() {
                Some(command) => deltas.push(ViewDelta::Command(command)),
                None => evicted |= commands.is_evicted(),
            }
        }

        if evicted {
            self.close(CloseReason::Evicted);
        }
        deltas
    }

    /// Publishes a browser interaction to every event subscriber.
    pub fn forward(&self, event: BroadcastEvent) -> PublishReport {
        if self.phase == SessionPhase::Closed {
            return PublishReport::default();
        }
        self.events.publish(event)
    }

    /// Releases every subscription this session holds. Idempotent.
    pub fn close(&mut self, reason: CloseReason) {
        if self.phase == SessionPhase::Closed {
            return;
        }
        self.phase = SessionPhase::Closed;
        self.close_reason = Some(reason);
        self.source = None;
        self.commands = None;
        debug!(?reason, ticks = self.ticks, "view session closed");
    }
}

impl Drop for ViewSession {
    fn drop(&mut self) {
        self.close(CloseReason::Disconnected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MapInteraction;
    use crate::domain::tuning::motion::MotionTuning;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn hub(capacity: usize) -> Arc<MapHub> {
        Arc::new(MapHub::new(capacity))
    }

    fn api_session(hub: &Arc<MapHub>) -> ViewSession {
        ViewSession::mount(Box::new(ApiMarkerSource::attach(hub.clone())), hub)
    }

    fn marker(id: &str) -> Marker {
        Marker::new(id, format!("{id}-name"), LatLng::new(30.0, -100.0))
    }

    #[test]
    fn session_walks_through_its_phases() {
        let hub = hub(8);
        let mut session = api_session(&hub);
        assert_eq!(session.phase(), SessionPhase::Mounted);

        session.connect();
        assert_eq!(session.phase(), SessionPhase::Connected);

        session.tick();
        assert_eq!(session.phase(), SessionPhase::Ticking);

        session.close(CloseReason::Disconnected);
        assert_eq!(session.phase(), SessionPhase::Closed);
        assert_eq!(session.close_reason(), Some(CloseReason::Disconnected));
    }

    #[test]
    fn initial_render_uses_the_registry_snapshot() {
        let hub = hub(8);
        hub.markers.add(marker("a1"));
        hub.markers.add(marker("b2"));

        let session = api_session(&hub);

        let mut ids: Vec<String> = session.initial_markers().into_iter().map(|m| m.id).collect();
        ids.sort();
        assert_eq!(ids, vec!["a1", "b2"]);
    }

    #[test]
    fn ticks_before_connect_apply_nothing() {
        let hub = hub(8);
        let mut session = api_session(&hub);
        hub.markers.add(marker("a1"));

        assert!(session.tick().is_empty());
        assert_eq!(session.ticks(), 0);

        session.connect();
        assert_eq!(session.tick().len(), 1);
    }

    #[test]
    fn each_tick_applies_at_most_one_marker_op_in_order() {
        let hub = hub(8);
        let mut session = api_session(&hub);
        session.connect();

        hub.markers.add(marker("a1"));
        hub.markers.update("a1", LatLng::new(31.0, -100.0));
        hub.markers.delete("a1");

        assert_eq!(
            session.tick(),
            vec![ViewDelta::AddMarker {
                id: "a1".to_string(),
                name: "a1-name".to_string(),
                position: LatLng::new(30.0, -100.0),
            }]
        );
        assert_eq!(
            session.tick(),
            vec![ViewDelta::MoveMarker {
                id: "a1".to_string(),
                position: LatLng::new(31.0, -100.0),
            }]
        );
        assert_eq!(session.tick(), vec![ViewDelta::RemoveMarker { id: "a1".to_string() }]);
        assert!(session.tick().is_empty());
    }

    #[test]
    fn map_commands_are_delivered_alongside_marker_ops() {
        let hub = hub(8);
        let mut session = api_session(&hub);
        session.connect();

        hub.markers.add(marker("a1"));
        hub.issue_command(MapCommand::SetZoom { zoom: 6.0 });

        let deltas = session.tick();
        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas[1], ViewDelta::Command(MapCommand::SetZoom { zoom: 6.0 }));
    }

    #[test]
    fn closing_releases_every_channel_slot() {
        let hub = hub(8);
        let mut session = api_session(&hub);
        assert_eq!(hub.markers.ops().subscriber_count(), 1);
        assert_eq!(hub.commands.subscriber_count(), 1);

        session.close(CloseReason::Disconnected);

        assert_eq!(hub.markers.ops().subscriber_count(), 0);
        assert_eq!(hub.commands.subscriber_count(), 0);
        assert!(session.tick().is_empty());
    }

    #[test]
    fn dropping_a_session_releases_its_subscriptions() {
        let hub = hub(8);
        let session = api_session(&hub);

        drop(session);

        assert_eq!(hub.markers.ops().subscriber_count(), 0);
        assert_eq!(hub.commands.subscriber_count(), 0);
    }

    #[test]
    fn slow_session_is_evicted_and_closes_after_draining_its_backlog() {
        let capacity = 3;
        let hub = hub(capacity);
        let mut slow = api_session(&hub);
        slow.connect();

        for n in 0..=capacity {
            hub.markers.add(marker(&format!("m{n}")));
        }
        assert_eq!(hub.markers.ops().subscriber_count(), 0);

        // the queued backlog is still rendered, one op per tick
        for _ in 0..capacity {
            assert_eq!(slow.tick().len(), 1);
        }
        assert!(slow.tick().is_empty());
        assert_eq!(slow.phase(), SessionPhase::Closed);
        assert_eq!(slow.close_reason(), Some(CloseReason::Evicted));
    }

    #[test]
    fn forwarded_browser_events_reach_event_subscribers() {
        let hub = hub(8);
        let mut events = hub.events.subscribe();
        let session = api_session(&hub);
        let event = BroadcastEvent::Map(MapInteraction {
            event: "click".to_string(),
            center: LatLng::new(39.5, -98.35),
            zoom: 4.0,
            position: Some(LatLng::new(40.0, -99.0)),
        });

        assert_eq!(session.forward(event.clone()).delivered, 1);
        assert_eq!(events.try_next(), Some(event));
    }

    #[test]
    fn mock_session_produces_an_op_every_tick() {
        let hub = hub(8);
        let generator =
            MockGenerator::with_rng(5, MotionTuning::default(), StdRng::seed_from_u64(3));
        let mut session = ViewSession::mount(Box::new(generator), &hub);

        assert_eq!(session.initial_markers().len(), 5);
        session.connect();
        for _ in 0..20 {
            assert_eq!(session.tick().len(), 1);
        }
        // a private fleet never touches the shared registry
        assert!(hub.markers.is_empty());
    }
}
