// Library root — exposes internals for integration tests.
// The binary entry point is src/main.rs.

pub mod comms;
pub mod config;
pub mod discovery;
pub mod error;
pub mod logger;
pub mod runtime;
pub mod session;
pub mod task;
