use crate::batch::BatchObserver;
use crate::config::Theme;
use crate::constants::PROGRESS_BAR_WIDTH;
use crate::processing::TransformResult;
use crate::utils::{describe_savings, format_size};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

fn bar_template(theme: Theme) -> String {
    let colors = match theme {
        Theme::Dark => "cyan/blue",
        Theme::Light => "blue/black",
    };
    format!(
        "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:{}.{}}}] {{pos}}/{{len}} {{msg}}",
        PROGRESS_BAR_WIDTH, colors
    )
}

/// Bar with the theme's palette. Falls back to the default style if the
/// template is rejected.
pub fn styled_bar(len: u64, theme: Theme, hidden: bool) -> ProgressBar {
    let pb = if hidden {
        ProgressBar::with_draw_target(Some(len), ProgressDrawTarget::hidden())
    } else {
        ProgressBar::new(len)
    };
    let style = ProgressStyle::with_template(&bar_template(theme))
        .map(|s| s.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}

/// Reports batch progress on a terminal bar.
pub struct ProgressObserver {
    bar: ProgressBar,
}

impl ProgressObserver {
    pub fn new(total: usize, theme: Theme, hidden: bool) -> Self {
        Self {
            bar: styled_bar(total as u64, theme, hidden),
        }
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

impl BatchObserver for ProgressObserver {
    fn on_item_started(&self, index: usize, total: usize, name: &str) {
        self.bar
            .set_message(format!("({}/{}) {}", index + 1, total, name));
    }

    fn on_item_finished(&self, _index: usize, _total: usize, result: &TransformResult) {
        match result {
            TransformResult::Success {
                original_name,
                original_size,
                transformed_size,
                ..
            } => self.bar.println(format!(
                "✅ {}: {} → {} (saved {})",
                original_name,
                format_size(*original_size),
                format_size(*transformed_size),
                describe_savings(*original_size, *transformed_size)
            )),
            TransformResult::Failure {
                original_name,
                reason,
                ..
            } => self
                .bar
                .println(format!("❌ {}: {}", original_name, reason)),
        }
        self.bar.inc(1);
    }
}
