pub mod alerts;
pub mod locks;
pub mod registrations;
pub mod scheduler;

pub use alerts::{
    AlertService, StatusEventOutcome, collect_registrations, get_active_registrations, should_alert,
};
pub use locks::{KeyedGuard, KeyedLocks};
pub use registrations::{register_for_course, resubscribe};
pub use scheduler::AlertScheduler;
