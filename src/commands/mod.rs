pub mod detect;
pub mod install;
pub mod pack;
pub mod publish;

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Spinner for a network-bound step; hidden automatically when stderr is not a terminal
pub fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.blue} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
    spinner.set_style(style);
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}
