use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::config::AnalyticsSection;
use crate::error::AnalyzeError;

/// How many items a scan processes between cancellation checks.
const CHECK_INTERVAL: usize = 256;

/// Cancellation and deadline signal threaded through full-graph scans.
///
/// A scan that observes either signal fails closed; it never returns a
/// partial aggregate.
#[derive(Debug, Clone, Default)]
pub struct ScanControl {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl ScanControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the configured default deadline, if any.
    pub fn from_config(config: &AnalyticsSection) -> Self {
        let mut control = Self::new();
        if let Some(ms) = config.scan_deadline_ms {
            control = control.with_timeout(Duration::from_millis(ms));
        }
        control
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fail if the scan was cancelled or ran past its deadline.
    pub fn check(&self, operation: &'static str) -> Result<(), AnalyzeError> {
        if self.cancel.is_cancelled() {
            return Err(AnalyzeError::Cancelled { operation });
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(AnalyzeError::Timeout { operation });
        }
        Ok(())
    }

    /// Periodic check for the `i`th item of a scan loop.
    pub fn step(&self, i: usize, operation: &'static str) -> Result<(), AnalyzeError> {
        if i % CHECK_INTERVAL == 0 {
            self.check(operation)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_token_fails_closed() {
        let control = ScanControl::new();
        control.check("scan").unwrap();
        control.token().cancel();
        assert!(matches!(
            control.check("scan"),
            Err(AnalyzeError::Cancelled { operation: "scan" })
        ));
    }

    #[test]
    fn elapsed_deadline_is_a_timeout() {
        let control = ScanControl::new().with_deadline(Instant::now());
        assert!(matches!(control.step(0, "scan"), Err(AnalyzeError::Timeout { .. })));
        // Between checkpoints the signal is not consulted.
        control.step(1, "scan").unwrap();
    }
}
