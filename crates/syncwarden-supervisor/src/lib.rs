pub mod executor;
pub mod manager;
pub mod outcome;
mod signal;
mod supervisor;

pub use manager::{CancelOutcome, ClearOutcome, JobManager, StartOutcome, StatusView};
pub use outcome::{JobOutcome, classify};
