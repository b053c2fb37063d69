//! Session management for command delivery
//!
//! This module handles:
//! - Tracking the per-drone command mailbox and delivery generation
//! - Session takeover when a drone reconnects
//! - The sender loop draining a mailbox onto an open command stream

mod registry;
mod sender;

pub use registry::{SenderLease, SessionRegistry, MAILBOX_CAPACITY};
pub use sender::sender_loop;
