//! Live latency streaming
//!
//! A refresh cycle resolves locations, fetches and enriches each one in its
//! own task and pushes `location`, `error`, `info` and `end` events through a
//! bounded [`channel::PushChannel`]. The web layer adapts the receiving half
//! to Server-Sent Events.

pub mod channel;
pub mod publisher;

pub use channel::{PushChannel, PushOutcome, PushReceiver, PushSender};
pub use publisher::{StreamPublisher, normalize_codes};
