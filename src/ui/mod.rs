//! Terminal output helpers
//!
//! Progress bars degrade to plain line output when stderr is not a
//! terminal, so CI logs stay readable.

pub mod progress;

pub use progress::StepProgress;
