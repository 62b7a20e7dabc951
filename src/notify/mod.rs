//! Notification dispatch: preference resolution, external channels, and
//! the durable-record + live-publish + fan-out pipeline.

pub mod channels;
pub mod dispatcher;
pub mod preferences;

pub use channels::{ChannelDelivery, DeliveryPool, NotificationChannel, WebhookChannel};
pub use dispatcher::{NotificationDispatcher, NotifyEvent};
pub use preferences::PreferenceResolver;
