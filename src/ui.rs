//! Operator-facing stage and progress rendering for the binaries.
//!
//! Pretty output (spinners, a frame counter) is only used on a TTY; plain
//! mode prints one line per stage and leaves frame progress to the log.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use crate::access::{AccessState, Transition};
use crate::pipeline::{RunObserver, RunProgress};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

impl UiMode {
    pub fn parse(flag: Option<&str>) -> Self {
        match flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        Self { mode, is_tty }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool) -> Self {
        Self::new(UiMode::parse(ui_flag), is_tty)
    }

    fn pretty(&self) -> bool {
        self.is_tty && self.mode != UiMode::Plain
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.pretty() {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    /// Frame counter for a run. `total` is the frame limit, when known.
    pub fn run_progress(&self, total: Option<u64>) -> RunIndicator {
        if !self.pretty() {
            return RunIndicator { bar: None };
        }
        let (bar, template) = match total {
            Some(total) => (
                ProgressBar::new(total),
                "{bar:30} {pos}/{len} frames {msg}",
            ),
            None => (ProgressBar::new_spinner(), "{spinner} {pos} frames {msg}"),
        };
        bar.set_draw_target(ProgressDrawTarget::stderr());
        let style = ProgressStyle::with_template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        RunIndicator { bar: Some(bar) }
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let message = format!("✔ {} ({})", self.name, format_duration(elapsed));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

/// Frame counter that follows the access state.
pub struct RunIndicator {
    bar: Option<ProgressBar>,
}

impl RunIndicator {
    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish();
        }
    }
}

impl RunObserver for RunIndicator {
    fn on_frame(&mut self, progress: &RunProgress) {
        if let Some(bar) = &self.bar {
            bar.set_position(progress.frames_read);
            bar.set_message(format!(
                "({} processed) {}",
                progress.frames_processed,
                state_label(progress.state)
            ));
        }
    }

    fn on_transition(&mut self, transition: &Transition) {
        if let Some(bar) = &self.bar {
            bar.println(format!("access: {}", state_label(transition.to)));
        }
    }
}

pub fn state_label(state: AccessState) -> &'static str {
    match state {
        AccessState::Uninitialized => "waiting",
        AccessState::Permitted => "GRANTED",
        AccessState::Denied => "DENIED",
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_mode_never_draws() {
        let ui = Ui::from_args(Some("plain"), true);
        let mut indicator = ui.run_progress(Some(10));
        assert!(indicator.bar.is_none());
        indicator.on_frame(&RunProgress {
            frames_read: 1,
            frames_processed: 1,
            frames_rejected: 0,
            state: AccessState::Denied,
        });
        indicator.finish();
    }

    #[test]
    fn non_tty_is_plain() {
        let ui = Ui::from_args(Some("pretty"), false);
        assert!(!ui.pretty());
        assert!(Ui::from_args(None, true).pretty());
    }

    #[test]
    fn durations_format_by_magnitude() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    }
}
