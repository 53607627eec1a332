//! Terminal output for streamed replies.
//!
//! Deltas are printed raw as they arrive; status lines use `console` styling.

use std::io::Write;
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use palaver_types::bot::BotConfig;
use palaver_types::chat::{ChatMessage, ChatRole};

/// Spinner shown until the first delta arrives.
pub fn thinking_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(spinner_style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        spinner.set_style(spinner_style);
    }
    spinner.set_message("thinking...");
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

pub struct ChatRenderer {
    name: String,
    avatar: Option<String>,
    started: bool,
}

impl ChatRenderer {
    pub fn new(bot: &BotConfig) -> Self {
        Self {
            name: bot.name.clone(),
            avatar: bot.avatar.clone(),
            started: false,
        }
    }

    /// Whether any text of the current reply has been printed.
    pub fn started(&self) -> bool {
        self.started
    }

    /// Print one delta, prefixing the first one with the bot's name.
    pub fn print_delta(&mut self, spinner: &ProgressBar, text: &str) {
        if !self.started {
            spinner.finish_and_clear();
            self.started = true;
            match &self.avatar {
                Some(avatar) => print!("\n  {} {} ", avatar, style(&self.name).cyan().bold()),
                None => print!("\n  {} ", style(&self.name).cyan().bold()),
            }
        }
        print!("{text}");
        let _ = std::io::stdout().flush();
    }

    /// Reset for the next reply.
    pub fn reset(&mut self) {
        self.started = false;
    }

    /// Footer after a reply: `| {tokens} tokens . {time}s . {model}`.
    pub fn print_stats_footer(&self, tokens: Option<u32>, elapsed: Duration, model: &str) {
        let tokens = tokens
            .map(|t| format!("{t} tokens"))
            .unwrap_or_else(|| "usage n/a".to_string());
        println!(
            "\n  {} {} {} {:.1}s {} {}",
            style("|").dim(),
            style(tokens).dim(),
            style("\u{00b7}").dim(),
            style(elapsed.as_secs_f64()).dim(),
            style("\u{00b7}").dim(),
            style(model).dim(),
        );
    }
}

/// One-line preview of a message for transcript listings.
pub fn preview(message: &ChatMessage, bot_name: &str, width: usize) -> String {
    let who = match message.role {
        ChatRole::User => style("You").green().bold().to_string(),
        ChatRole::Assistant => style(bot_name).cyan().bold().to_string(),
    };
    let text: String = message.content.chars().take(width).collect();
    let ellipsis = if message.content.chars().count() > width {
        "..."
    } else {
        ""
    };
    let marker = if message.partial {
        style(" (partial)").yellow().to_string()
    } else {
        String::new()
    };
    format!("{who} {}{ellipsis}{marker}", text.replace('\n', " "))
}
