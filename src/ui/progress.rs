//! Pipeline step progress with CI fallback

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar for one pipeline stage
pub struct StepProgress {
    bar: Option<ProgressBar>,
    prefix: String,
}

impl StepProgress {
    /// Start a bar titled `prefix` over `len` items (interactive), or print
    /// a plain header (CI)
    pub fn start(prefix: &str, len: usize) -> Self {
        let bar = if console::user_attended_stderr() {
            let bar = ProgressBar::new(len as u64);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{prefix:.bold} {bar:24} {pos}/{len} {msg:.dim}")
                    .unwrap()
                    .progress_chars("━╸─"),
            );
            bar.set_prefix(prefix.to_string());
            Some(bar)
        } else {
            eprintln!("{} ({len})", prefix);
            None
        };
        Self {
            bar,
            prefix: prefix.to_string(),
        }
    }

    /// Show what the stage is currently doing
    pub fn note(&self, message: &str) {
        if let Some(ref bar) = self.bar {
            bar.set_message(message.to_string());
        }
    }

    /// One item finished
    pub fn inc(&self) {
        if let Some(ref bar) = self.bar {
            bar.inc(1);
        }
    }

    /// Finish the stage successfully
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.finish_with_message("done");
        } else {
            eprintln!("{} {}", style("[OK]").green(), self.prefix);
        }
    }

    /// Abandon the stage on failure, keeping the bar's last state visible
    pub fn abandon(&self) {
        if let Some(ref bar) = self.bar {
            bar.abandon_with_message("failed");
        } else {
            eprintln!("{} {}", style("[FAIL]").red(), self.prefix);
        }
    }
}
