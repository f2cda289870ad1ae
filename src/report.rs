//! Side channel for non-fatal errors.

use color_eyre::Report;

/// Receives failures that are recovered from or captured into state.
///
/// Implementations must not block; the fetch loop calls this inline.
pub trait Reporter: Send + Sync {
  fn error(&self, failure: &Report, message: &str);
}

/// Reporter that emits each failure as an `error` level tracing event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
  fn error(&self, failure: &Report, message: &str) {
    tracing::error!(error = %failure, "{}", message);
  }
}
