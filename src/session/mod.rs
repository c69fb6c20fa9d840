//! Recognition session engine
//!
//! This module provides the `TranscriptionClient` that drives a session:
//! - Connecting and sending `StartRecognition`
//! - A producer task streaming audio under flow control
//! - A consumer task dispatching server messages to handlers
//! - Racing the two tasks and tearing the connection down afterwards

mod client;
mod consumer;
mod control;
mod flow;
mod producer;
mod registry;
mod state;
mod stats;

pub use client::TranscriptionClient;
pub use control::{SessionControl, SessionPhase};
pub use flow::FlowController;
pub use registry::{EventHandler, ExtensionRegistry, Middleware, ALL_EVENTS};
pub use state::SessionState;
pub use stats::SessionStats;
