use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::sync::Mutex;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use trailer_core::report::{Confirm, ProgressReporter};

const BAR_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos:>3}% {msg}";

/// One terminal bar per stage, drawn on stderr.
#[derive(Debug, Default)]
pub struct TerminalReporter {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
}

impl TerminalReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn bar(&self, stage: &str) -> Option<ProgressBar> {
        let mut bars = self.bars.lock().ok()?;
        let bar = bars.entry(stage.to_string()).or_insert_with(|| {
            let bar = self.multi.add(ProgressBar::new(100));
            if let Ok(style) = ProgressStyle::with_template(BAR_TEMPLATE) {
                bar.set_style(style.progress_chars("#>-"));
            }
            bar.set_message(stage.to_string());
            bar
        });
        Some(bar.clone())
    }
}

impl ProgressReporter for TerminalReporter {
    fn report(&self, stage: &str, percent: u8) {
        let Some(bar) = self.bar(stage) else {
            return;
        };
        bar.set_position(u64::from(percent));
        if percent >= 100 {
            bar.finish();
        }
    }
}

/// Asks on stderr and reads the answer from stdin. Anything but `s`/`y`
/// counts as no.
#[derive(Debug, Default)]
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, question: &str) -> bool {
        eprint!("{question} [s/N] ");
        if io::stderr().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(_) => is_yes(&answer),
            Err(_) => false,
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(
        answer.trim().to_lowercase().as_str(),
        "s" | "sim" | "y" | "yes"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answers_in_both_languages() {
        assert!(is_yes("s\n"));
        assert!(is_yes(" Sim "));
        assert!(is_yes("YES"));
        assert!(!is_yes(""));
        assert!(!is_yes("n"));
        assert!(!is_yes("talvez"));
    }

    #[test]
    fn bars_are_reused_per_stage() {
        let reporter = TerminalReporter::new();
        reporter.report("video", 10);
        reporter.report("video", 60);
        reporter.report("audio", 100);
        let bars = reporter.bars.lock().unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars["video"].position(), 60);
        assert!(bars["audio"].is_finished());
    }
}
