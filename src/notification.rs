//! Notification domain: study-update and audit events and the bus carrying them.

pub mod bus;
pub mod events;

pub use bus::{NotificationBus, NotificationReceivers};
pub use events::{ElementUpdate, StudyUpdate, UpdateType};
