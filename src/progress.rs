//! Progress display for profile runs
//!
//! One bar per unit type; failures are printed above the bar as they arrive.

use colored::Colorize;
use declarative::{Outcome, ProgressCallback};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Progress bars driven by orchestrator callbacks
pub struct BarProgress {
    bar: Option<ProgressBar>,
    hidden: bool,
}

impl BarProgress {
    pub fn new(hidden: bool) -> Self {
        Self { bar: None, hidden }
    }

    fn style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{spinner:.green} {prefix:>12.cyan.bold} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-")
    }
}

impl ProgressCallback for BarProgress {
    fn on_bucket_start(&mut self, unit: &str, count: usize) {
        let bar = ProgressBar::new(count as u64);
        if self.hidden {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        bar.set_style(Self::style());
        bar.set_prefix(unit.to_string());
        self.bar = Some(bar);
    }

    fn on_instance_complete(
        &mut self,
        unit: &str,
        instance: &str,
        result: &declarative::Result<Outcome>,
    ) {
        let Some(bar) = &self.bar else {
            return;
        };
        bar.set_message(instance.to_string());
        bar.inc(1);

        let line = match result {
            Ok(Outcome::Applied) => format!("  {} {} {}", "✓".green(), unit, instance),
            Ok(Outcome::Removed) => format!("  {} {} {}", "−".red(), unit, instance),
            Ok(Outcome::NoChange) => format!("  {} {} {}", "·".dimmed(), unit, instance),
            Ok(Outcome::Skipped { reason }) => {
                format!("  {} {} {} ({})", "○".yellow(), unit, instance, reason.dimmed())
            }
            Err(e) => format!("  {} {} {}: {}", "✗".red(), unit, instance, e),
        };
        if !self.hidden {
            bar.println(line);
        }
    }

    fn on_bucket_complete(&mut self, _unit: &str) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::Error;

    #[test]
    fn test_hidden_progress_lifecycle() {
        let mut progress = BarProgress::new(true);
        progress.on_bucket_start("run", 2);
        progress.on_instance_complete("run", "a", &Ok(Outcome::Applied));
        progress.on_instance_complete(
            "run",
            "b",
            &Err(Error::declaration("run", "b", "_task", "missing")),
        );
        assert_eq!(progress.bar.as_ref().map(ProgressBar::position), Some(2));

        progress.on_bucket_complete("run");
        assert!(progress.bar.is_none());
    }

    #[test]
    fn test_complete_without_start_is_ignored() {
        let mut progress = BarProgress::new(true);
        progress.on_instance_complete("run", "a", &Ok(Outcome::NoChange));
        progress.on_bucket_complete("run");
        assert!(progress.bar.is_none());
    }
}
