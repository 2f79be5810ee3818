//! Capabilities injected by the driving layer: progress reporting and
//! yes/no confirmation. The pipeline never talks to a terminal directly.

use std::sync::Mutex;

use tracing::info;

pub trait ProgressReporter: Send + Sync {
    fn report(&self, stage: &str, percent: u8);
}

/// Emits progress as tracing events.
#[derive(Debug, Default)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn report(&self, stage: &str, percent: u8) {
        info!(stage, percent, "progress");
    }
}

#[derive(Debug, Default)]
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {
    fn report(&self, _stage: &str, _percent: u8) {}
}

/// Keeps every update in memory. Handy for headless runs that want to
/// inspect what was reported afterwards.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<(String, u8)>>,
}

impl RecordingReporter {
    pub fn events(&self) -> Vec<(String, u8)> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl ProgressReporter for RecordingReporter {
    fn report(&self, stage: &str, percent: u8) {
        if let Ok(mut events) = self.events.lock() {
            events.push((stage.to_string(), percent));
        }
    }
}

pub trait Confirm: Send + Sync {
    fn confirm(&self, question: &str) -> bool;
}

#[derive(Debug, Default)]
pub struct AlwaysConfirm;

impl Confirm for AlwaysConfirm {
    fn confirm(&self, _question: &str) -> bool {
        true
    }
}

#[derive(Debug, Default)]
pub struct NeverConfirm;

impl Confirm for NeverConfirm {
    fn confirm(&self, _question: &str) -> bool {
        false
    }
}

/// Percentage of `done` over `total`, rounded half up and clamped to 100.
/// `None` when there is no denominator.
pub fn percent(done: u64, total: u64) -> Option<u8> {
    if total == 0 {
        return None;
    }
    let scaled = (done as u128 * 200 + total as u128) / (total as u128 * 2);
    Some(scaled.min(100) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_rounds_half_up() {
        assert_eq!(percent(45, 90), Some(50));
        assert_eq!(percent(1, 200), Some(1));
        assert_eq!(percent(1, 3), Some(33));
        assert_eq!(percent(2, 3), Some(67));
    }

    #[test]
    fn percent_without_total_is_none() {
        assert_eq!(percent(10, 0), None);
    }

    #[test]
    fn percent_is_clamped() {
        assert_eq!(percent(130, 100), Some(100));
    }

    #[test]
    fn recording_reporter_keeps_order() {
        let reporter = RecordingReporter::default();
        reporter.report("merge", 10);
        reporter.report("merge", 20);
        assert_eq!(
            reporter.events(),
            vec![("merge".to_string(), 10), ("merge".to_string(), 20)]
        );
    }
}
