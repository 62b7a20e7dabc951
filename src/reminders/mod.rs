//! Reminder eligibility and the periodic scan.

pub mod policy;
pub mod scheduler;

pub use policy::is_eligible;
pub use scheduler::{ReminderScheduler, SchedulerHandle};
