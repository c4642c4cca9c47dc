//! Automation session registry

mod store;
mod types;

pub use store::SessionStore;
pub use types::{Area, DriverSession, SessionInfo};
