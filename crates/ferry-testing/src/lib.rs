//! Test support for the ferry workspace.
//!
//! Provides a controllable clock so deadline and interval logic runs on
//! virtual time, plus a builder for queue message fixtures.

pub mod fixtures;
pub mod time;

pub use fixtures::MessageBuilder;
pub use time::TestClock;
