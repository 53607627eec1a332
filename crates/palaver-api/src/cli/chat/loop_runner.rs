//! Main chat loop orchestration.
//!
//! Resolves the caller's identity, loads the conversation when resuming,
//! then alternates between reading a line and streaming the bot's reply.
//! Ctrl-C while a reply streams cancels that reply only.

use std::sync::Arc;
use std::time::Instant;

use console::style;
use futures_util::StreamExt;
use tracing::{debug, warn};

use palaver_core::chat::accumulator::ExchangeOutcome;
use palaver_core::chat::engine::{ExchangeReport, PersistenceStatus};
use palaver_core::chat::feed::{ExchangeEvent, exchange_feed};
use palaver_types::bot::BotConfig;
use palaver_types::chat::{ChatMessage, ChatRecord, ChatSession};
use palaver_types::error::ChatError;
use palaver_types::usage::UserRole;

use crate::cli::caller::{CallerArgs, chat_session};
use crate::cli::limits::print_limits;
use crate::state::AppState;

use super::banner::print_welcome_banner;
use super::commands::{self, ChatCommand};
use super::input::{ChatInput, InputEvent};
use super::renderer::{ChatRenderer, preview, thinking_spinner};

/// Run the interactive chat loop for a bot.
pub async fn run_chat_loop(
    state: &AppState,
    bot_id: &str,
    chat_id: Option<String>,
    caller: &CallerArgs,
) -> anyhow::Result<()> {
    let bot = state.bot(bot_id)?;
    let resolved = caller.resolve(state).await;
    let session = chat_session(&resolved, &bot.id)?;
    let role = caller.role();

    let mut chat_id = chat_id.unwrap_or_else(new_chat_id);
    let stored = state.engine.history().get(&chat_id).await?;
    let mut transcript = resume_transcript(stored, &session)?;

    print_welcome_banner(&bot, &chat_id, transcript.len(), resolved.ephemeral);

    let mut renderer = ChatRenderer::new(&bot);
    let mut input = ChatInput::new(format!("  {} ", style("You >").green().bold()));

    loop {
        let text = match input.read_line().await {
            InputEvent::Eof => {
                println!("\n  {}", style("Session ended.").dim());
                break;
            }
            InputEvent::Interrupted => {
                println!("\n  {}", style("Press Ctrl+D to exit, or keep chatting.").dim());
                continue;
            }
            InputEvent::Message(text) if text.is_empty() => continue,
            InputEvent::Message(text) => text,
        };

        if let Some(cmd) = commands::parse(&text) {
            match cmd {
                ChatCommand::Help => commands::print_help(),
                ChatCommand::Clear => {
                    let _ = console::Term::stdout().clear_screen();
                }
                ChatCommand::Exit => {
                    println!("\n  {}", style("Session ended.").dim());
                    break;
                }
                ChatCommand::New => {
                    chat_id = new_chat_id();
                    transcript.clear();
                    println!(
                        "\n  {} New conversation {}\n",
                        style("*").cyan().bold(),
                        style(&chat_id[..8]).dim()
                    );
                }
                ChatCommand::History => print_transcript(&transcript, &bot),
                ChatCommand::Limits => {
                    if let Err(e) =
                        print_limits(state, &session.identity, &bot.id, role, false).await
                    {
                        eprintln!("\n  {} Could not read usage: {e}\n", style("!").red().bold());
                    }
                }
                ChatCommand::Unknown(name) => println!(
                    "\n  {} Unknown command: {}. Type /help for available commands.\n",
                    style("?").yellow().bold(),
                    style(name).dim()
                ),
            }
            continue;
        }

        if let Some(report) =
            exchange(state, &session, role, &bot, &chat_id, &transcript, &text, &mut renderer).await
        {
            if keeps_transcript(&report) {
                transcript = report.transcript;
            }
        }
    }

    Ok(())
}

/// Messages to continue from, if the stored conversation may be resumed here.
fn resume_transcript(
    stored: Option<ChatRecord>,
    session: &ChatSession,
) -> anyhow::Result<Vec<ChatMessage>> {
    match stored {
        Some(record) if record.identity().as_ref() != Some(&session.identity) => {
            anyhow::bail!("conversation '{}' belongs to someone else", record.chat_id);
        }
        Some(record) if record.bot_id != session.bot_id => {
            anyhow::bail!(
                "conversation '{}' belongs to bot '{}'",
                record.chat_id,
                record.bot_id
            );
        }
        Some(record) => Ok(record.messages),
        None => Ok(Vec::new()),
    }
}

fn new_chat_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

/// Whether the loop should continue from the report's transcript.
///
/// A completed reply is kept in memory even when saving failed; an
/// unanswered or unsaved partial turn is dropped so it can be retried.
fn keeps_transcript(report: &ExchangeReport) -> bool {
    matches!(report.outcome, ExchangeOutcome::Completed { .. })
        || matches!(report.persistence, PersistenceStatus::Saved(_))
}

/// Send one message and render the reply. `None` when nothing was sent.
#[allow(clippy::too_many_arguments)]
async fn exchange(
    state: &AppState,
    session: &ChatSession,
    role: UserRole,
    bot: &BotConfig,
    chat_id: &str,
    transcript: &[ChatMessage],
    text: &str,
    renderer: &mut ChatRenderer,
) -> Option<ExchangeReport> {
    let pending = match state
        .engine
        .begin(session, role, chat_id, bot, transcript.to_vec(), text)
        .await
    {
        Ok(pending) => pending,
        Err(ChatError::LimitExceeded {
            limit_type,
            max_usage,
            reset_date,
            ..
        }) => {
            let reset = reset_date
                .map(|d| format!(" It resets {}.", d.format("%Y-%m-%d %H:%M UTC")))
                .unwrap_or_default();
            println!(
                "\n  {} You have reached the {limit_type} limit ({max_usage}).{reset}\n",
                style("!").yellow().bold()
            );
            return None;
        }
        Err(e) => {
            eprintln!("\n  {} {e}\n", style("!").red().bold());
            return None;
        }
    };

    let cancel = pending.cancellation();
    let spinner = thinking_spinner();
    let started = Instant::now();
    renderer.reset();

    let feed = exchange_feed(Arc::clone(&state.engine), pending);
    tokio::pin!(feed);

    let report = loop {
        tokio::select! {
            event = feed.next() => match event {
                Some(ExchangeEvent::Delta(delta)) => renderer.print_delta(&spinner, &delta),
                Some(ExchangeEvent::Finished(report)) => break Some(report),
                None => break None,
            },
            _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                debug!(chat_id, "reply cancelled from keyboard");
                cancel.cancel();
            }
        }
    };
    spinner.finish_and_clear();

    let report = report?;
    match &report.outcome {
        ExchangeOutcome::Completed { usage, .. } => {
            println!();
            renderer.print_stats_footer(
                usage.as_ref().map(|u| u.output_tokens),
                started.elapsed(),
                &bot.model.name,
            );
        }
        ExchangeOutcome::Cancelled { .. } => {
            println!(
                "\n\n  {}",
                style("Reply stopped.").yellow()
            );
        }
        ExchangeOutcome::Failed { error, .. } => {
            if renderer.started() {
                println!();
            }
            eprintln!("\n  {} Reply failed: {error}", style("!").red().bold());
            eprintln!("  {}", style("Type a message to retry, /exit to quit.").dim());
        }
    }

    if let PersistenceStatus::Failed(e) = &report.persistence {
        warn!(chat_id, error = %e, "conversation not saved");
        eprintln!(
            "  {} Conversation not saved: {e}",
            style("!").yellow().bold()
        );
    }
    println!();
    Some(report)
}

fn print_transcript(transcript: &[ChatMessage], bot: &BotConfig) {
    println!();
    if transcript.is_empty() {
        println!("  {}", style("No messages yet.").dim());
    }
    for message in transcript {
        println!("  {}", preview(message, &bot.name, 100));
    }
    println!();
}
