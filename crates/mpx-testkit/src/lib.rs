//! Test support for the workflow engine: fault-injecting store, recording
//! notifiers and fixtures. Scenario tests live under `tests/`.

mod faulty;
mod fixtures;
mod sinks;

pub use faulty::FaultyStore;
pub use fixtures::{bid, new_rfq, t0, Harness};
pub use sinks::{FailingSink, RecordingNotifier, RecordingSink};
