//! Welcome banner display for chat sessions.

use console::style;

use palaver_types::bot::BotConfig;

/// Print the welcome banner at the start of a chat session.
pub fn print_welcome_banner(bot: &BotConfig, chat_id: &str, resumed_turns: usize, ephemeral: bool) {
    let avatar = bot.avatar.as_deref().unwrap_or("*");

    println!();
    println!("  {} {}", avatar, style(&bot.name).cyan().bold());
    println!();
    println!("  {}  {}", style("Model:").bold(), style(&bot.model.name).dim());
    println!(
        "  {}   {}",
        style("Chat:").bold(),
        style(&chat_id[..8.min(chat_id.len())]).dim()
    );
    if resumed_turns > 0 {
        println!(
            "  {}  {}",
            style("Resumed:").bold(),
            style(format!("{resumed_turns} messages")).dim()
        );
    }
    if ephemeral {
        println!(
            "  {}",
            style("Session token is not stored; history ends with this run.").yellow()
        );
    }
    println!();
    println!(
        "  {}",
        style("Type /help for commands, Ctrl+C to stop a reply, Ctrl+D to exit").dim()
    );
    println!("  {}", style("---").dim());
    println!();
}
