//! `palaver history`: grouped listing and deletion of past conversations.

use anyhow::{Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use dialoguer::Confirm;

use palaver_types::chat::{ChatIdentity, ChatRecord};

use crate::cli::caller::CallerArgs;
use crate::http::extractors::query::HistoryGrouping;
use crate::http::handlers::history::HistoryView;
use crate::state::AppState;

/// Whose history to show: an explicit client id, or the resolved caller.
pub async fn history_identity(
    state: &AppState,
    client: Option<&str>,
    caller: &CallerArgs,
) -> ChatIdentity {
    match client {
        Some(client) => ChatIdentity::Client(client.to_string()),
        None => caller.resolve(state).await.chat_identity(),
    }
}

pub async fn list_history(
    state: &AppState,
    identity: &ChatIdentity,
    bot_id: Option<&str>,
    grouping: HistoryGrouping,
    json: bool,
) -> Result<()> {
    let records = state.engine.history().list_for(identity, bot_id).await?;
    let view = HistoryView::build(records, grouping);

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    println!();
    let empty = match &view {
        HistoryView::Full(groups) => groups.is_empty(),
        HistoryView::Date(groups) => groups.is_empty(),
        HistoryView::Client(groups) => groups.is_empty(),
        HistoryView::None(records) => records.is_empty(),
    };
    if empty {
        println!(
            "  {} No conversations for {}.",
            style("i").blue().bold(),
            style(identity).cyan()
        );
        println!();
        return Ok(());
    }

    match view {
        HistoryView::Full(groups) => {
            for group in groups {
                println!("  {}", style(group.bucket).bold().underlined());
                for client in group.clients {
                    println!("  {}", style(&client.owner).dim());
                    println!("{}", records_table(&client.records));
                }
                println!();
            }
        }
        HistoryView::Date(groups) => {
            for group in groups {
                println!("  {}", style(group.bucket).bold().underlined());
                println!("{}", records_table(&group.records));
                println!();
            }
        }
        HistoryView::Client(groups) => {
            for group in groups {
                println!("  {}", style(&group.owner).bold().underlined());
                println!("{}", records_table(&group.records));
                println!();
            }
        }
        HistoryView::None(records) => {
            println!("{}", records_table(&records));
            println!();
        }
    }
    Ok(())
}

pub async fn delete_history(
    state: &AppState,
    identity: &ChatIdentity,
    bot_id: Option<&str>,
    chat_id: Option<&str>,
    force: bool,
    json: bool,
) -> Result<()> {
    let history = state.engine.history();
    let records = history.list_for(identity, bot_id).await?;
    let targets: Vec<&ChatRecord> = match chat_id {
        Some(chat_id) => {
            let found: Vec<&ChatRecord> =
                records.iter().filter(|r| r.chat_id == chat_id).collect();
            if found.is_empty() {
                bail!("conversation '{chat_id}' not found for {identity}");
            }
            found
        }
        None => records.iter().collect(),
    };

    if targets.is_empty() {
        if !json {
            println!();
            println!("  {} Nothing to delete.", style("i").blue().bold());
            println!();
        }
        return Ok(());
    }

    if !force {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Delete {} conversation(s) for {identity}? This cannot be undone",
                targets.len()
            ))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("  Cancelled.");
            return Ok(());
        }
    }

    for record in &targets {
        history.delete(&record.chat_id).await?;
    }

    if json {
        println!("{}", serde_json::json!({ "deleted": targets.len() }));
    } else {
        println!();
        println!(
            "  {} Deleted {} conversation(s).",
            style("*").cyan().bold(),
            targets.len()
        );
        println!();
    }
    Ok(())
}

/// First user message, used as a title.
fn title(record: &ChatRecord) -> String {
    let first = record
        .messages
        .first()
        .map(|m| m.content.replace('\n', " "))
        .unwrap_or_else(|| "(empty)".to_string());
    if first.chars().count() > 40 {
        format!("{}...", first.chars().take(37).collect::<String>())
    } else {
        first
    }
}

fn records_table(records: &[ChatRecord]) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Chat").fg(Color::White),
        Cell::new("Bot").fg(Color::White),
        Cell::new("Title").fg(Color::White),
        Cell::new("Messages").fg(Color::White),
        Cell::new("Updated").fg(Color::White),
    ]);
    for record in records {
        table.add_row(vec![
            Cell::new(&record.chat_id[..8.min(record.chat_id.len())]),
            Cell::new(&record.bot_id).fg(Color::Cyan),
            Cell::new(title(record)),
            Cell::new(record.messages.len()),
            Cell::new(record.updated_at.format("%Y-%m-%d %H:%M")),
        ]);
    }
    table
}
