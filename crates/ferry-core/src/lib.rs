//! Core domain types shared across the ferry workspace.
//!
//! Defines the queue message model, the worker response classification, and
//! the clock abstraction used to keep time-dependent logic testable.

pub mod models;
pub mod time;

pub use models::{Message, MessageId, ReceiptToken, WorkerResponse};
pub use time::{Clock, RealClock};
