//! Live, in-memory job output and progress.

mod progress;
mod registry;

pub use progress::ProgressSnapshot;
pub use registry::{JobLogRegistry, LogEvent};
