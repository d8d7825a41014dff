pub mod prelude;

pub mod audit_events;
pub mod sessions;
pub mod users;
