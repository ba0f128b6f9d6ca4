// Use cases layer: shared map state, fan-out channels and view sessions.

pub mod fanout;
pub mod hub;
pub mod registry;
pub mod session;
pub mod simulation;
pub mod source;

pub use fanout::{FanOut, PublishReport, SubscriberId, Subscription};
pub use hub::MapHub;
pub use registry::MarkerRegistry;
pub use session::{
    CloseReason, MIN_TICK_INTERVAL, SessionPhase, SessionSettings, SourceKind, ViewDelta,
    ViewSession,
};
pub use simulation::{MockGenerator, fleet_task};
pub use source::{ApiMarkerSource, MarkerSource};
