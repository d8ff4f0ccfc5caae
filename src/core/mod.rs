//! Core runtime components:
//! - Per-target polling loops
//! - Supervisor launching and joining all loops
//! - Fatal-failure escalation into the shared cancellation token

pub mod supervisor;
pub mod watcher;

pub use supervisor::{RuntimeError, Supervisor};
pub use watcher::TargetWatcher;
