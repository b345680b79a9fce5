//! Banca Backend Library
//!
//! Daily settlement engine for a network of lottery sales agents
//! (pasadores). Exposes the engine modules for use by the server binary,
//! the settle_day CLI, and integration tests.

pub mod api;
pub mod middleware;
pub mod models;
pub mod settlement;
pub mod store;
