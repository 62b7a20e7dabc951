//! duepulse — due-date reminder scheduling and live notification fan-out.
//!
//! The crate is organized leaf-first:
//!
//! - [`status`]: pure due-date urgency classification
//! - [`reminders`]: the eligibility policy and the periodic scan driver
//! - [`notify`]: preference resolution, external channels, and dispatch
//! - [`live`]: topic routing, presence tracking, and the wire events
//! - [`store`]: the backend-agnostic persistence contract
//! - [`service`]: the facade the API and connection layers call
//! - [`digest`]: calendar-scheduled summary notifications
//!
//! Everything is injected; there are no globals. A typical embedding
//! builds one [`live::EventRouter`], one [`live::PresenceTracker`], one
//! [`notify::NotificationDispatcher`] over a [`store::Store`] backend,
//! then hands them to a [`service::ReminderService`] and spawns the
//! [`reminders::ReminderScheduler`] and [`digest::DigestRunner`] loops.

pub mod config;
pub mod digest;
pub mod error;
pub mod live;
pub mod notify;
pub mod reminders;
pub mod service;
pub mod status;
pub mod store;

pub use config::AppConfig;
pub use error::{ChannelError, ConfigError, StoreError};
pub use service::{ReminderService, TaskMutation};

/// Install the tracing subscriber. `RUST_LOG` controls the filter;
/// `DUEPULSE_LOG_JSON=1` switches to JSON output.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("DUEPULSE_LOG_JSON").is_ok_and(|v| v == "1");
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
