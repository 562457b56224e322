//! Scripted collaborators and fixtures for casegraph tests.

pub mod mocks;

use std::time::Duration;

use casegraph_core::config::RetryPolicy;

pub use mocks::{
    chunk, InferenceCall, MockInference, MockReader, MockRetrieval, MockSearch, MockTranslation,
    COMPLETE,
};

/// A retry policy with millisecond delays, for tests that exercise retries
/// without a paused clock.
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::default()
        .with_max_attempts(max_attempts)
        .with_delays(Duration::from_millis(1), Duration::from_millis(5))
}
