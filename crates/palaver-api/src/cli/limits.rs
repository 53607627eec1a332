//! `palaver limits <bot>`: usage against each applicable quota.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use palaver_core::usage::gate::summarize;
use palaver_types::chat::ChatIdentity;
use palaver_types::usage::{UsageLimit, UserRole};

use crate::cli::caller::CallerArgs;
use crate::state::AppState;

pub async fn show_limits(
    state: &AppState,
    bot_id: &str,
    caller: &CallerArgs,
    json: bool,
) -> Result<()> {
    state.bot(bot_id)?;
    let resolved = caller.resolve(state).await;
    print_limits(state, &resolved.chat_identity(), bot_id, caller.role(), json).await
}

/// Print usage for `identity`. Shared with the chat loop's `/limits`.
pub async fn print_limits(
    state: &AppState,
    identity: &ChatIdentity,
    bot_id: &str,
    role: UserRole,
    json: bool,
) -> Result<()> {
    let limits = state.engine.gate().limits(identity, bot_id, role).await?;

    if json {
        let body = serde_json::json!({
            "bot_id": bot_id,
            "role": role,
            "limits": limits,
            "summary": summarize(&limits),
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    println!();
    if limits.is_empty() {
        println!(
            "  {} No quotas apply to {} users of '{}'.",
            style("i").blue().bold(),
            role,
            style(bot_id).cyan()
        );
        println!();
        return Ok(());
    }

    println!("{}", limits_table(&limits));
    let summary = summarize(&limits);
    if summary.exceeded {
        println!(
            "  {} {} limit reached{}",
            style("!").red().bold(),
            summary.limit_type,
            summary
                .reset_date
                .map(|d| format!(", resets {}", d.format("%Y-%m-%d %H:%M UTC")))
                .unwrap_or_default()
        );
    }
    println!();
    Ok(())
}

fn limits_table(limits: &[UsageLimit]) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Limit").fg(Color::White),
        Cell::new("Used").fg(Color::White),
        Cell::new("Max").fg(Color::White),
        Cell::new("Period").fg(Color::White),
        Cell::new("Resets").fg(Color::White),
    ]);

    for limit in limits {
        let used = if limit.is_exceeded() {
            Cell::new(limit.current_usage).fg(Color::Red)
        } else {
            Cell::new(limit.current_usage).fg(Color::Green)
        };
        table.add_row(vec![
            Cell::new(limit.limit_type),
            used,
            Cell::new(limit.max_usage),
            Cell::new(limit.reset_period),
            Cell::new(
                limit
                    .reset_date
                    .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use palaver_types::usage::{LimitType, ResetPeriod};

    use super::*;

    #[test]
    fn test_table_has_row_per_limit() {
        let limits = vec![
            UsageLimit {
                limit_type: LimitType::Messages,
                max_usage: 10,
                reset_period: ResetPeriod::Daily,
                reset_date: None,
                current_usage: 3,
            },
            UsageLimit {
                limit_type: LimitType::Tokens,
                max_usage: 1000,
                reset_period: ResetPeriod::Never,
                reset_date: None,
                current_usage: 1000,
            },
        ];
        let rendered = limits_table(&limits).to_string();
        assert!(rendered.contains("messages"));
        assert!(rendered.contains("tokens"));
        assert!(rendered.contains("never"));
    }
}
