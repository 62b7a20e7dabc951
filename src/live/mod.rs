//! Live delivery: topic routing, presence, and the wire event vocabulary.

pub mod events;
pub mod presence;
pub mod router;

pub use events::{LiveEvent, PresenceState, Topic};
pub use presence::PresenceTracker;
pub use router::{ConnectionId, EventRouter};
