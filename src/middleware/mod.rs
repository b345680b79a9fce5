pub mod admin;
pub mod logging;

pub use admin::{admin_guard, AdminToken};
pub use logging::request_logging;
