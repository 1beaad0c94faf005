//! Stream consumer side: arc state and the reconnecting SSE watcher

pub mod arc_store;
pub mod consumer;

pub use arc_store::{ArcStats, ArcStore, FilterState, FilterUpdate, RegionOption};
pub use consumer::{SessionStatus, SseDecoder, SseFrame, Watcher, parse_event};
