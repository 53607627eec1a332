//! Palaver CLI and REST API entry point.
//!
//! Binary name: `palaver`
//!
//! Parses CLI arguments, initializes the database and engine, then
//! dispatches to the appropriate command handler or starts the REST API server.

mod cli;
mod http;
mod state;

use clap::Parser;
use clap_complete::generate;
use tracing::warn;

use cli::{Cli, Commands, HistoryAction};
use palaver_observe::tracing_setup::{init_tracing, shutdown_tracing, verbosity_filter};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(verbosity_filter(cli.verbose, cli.quiet), cli.otel) {
        eprintln!("failed to initialize tracing: {e}");
    }

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "palaver", &mut std::io::stdout());
        return Ok(());
    }

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let state = AppState::init().await?;

    match cli.command {
        Commands::Chat {
            bot,
            chat_id,
            caller,
        } => {
            cli::chat::loop_runner::run_chat_loop(&state, &bot, chat_id, &caller).await?;
        }

        Commands::History {
            action,
            bot,
            client,
            caller,
            group,
        } => {
            let identity = cli::history::history_identity(&state, client.as_deref(), &caller).await;
            match action {
                None => {
                    cli::history::list_history(&state, &identity, bot.as_deref(), group, cli.json)
                        .await?;
                }
                Some(HistoryAction::Delete { chat_id, force }) => {
                    cli::history::delete_history(
                        &state,
                        &identity,
                        bot.as_deref(),
                        chat_id.as_deref(),
                        force,
                        cli.json,
                    )
                    .await?;
                }
            }
        }

        Commands::Limits { bot, caller } => {
            cli::limits::show_limits(&state, &bot, &caller, cli.json).await?;
        }

        Commands::Whoami { forget, caller } => {
            cli::whoami::whoami(&state, &caller, forget, cli.json).await?;
        }

        Commands::Serve { port, host } => {
            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;

            if !cli.quiet {
                println!(
                    "  {} Palaver API listening on {}",
                    console::style("⚡").bold(),
                    console::style(format!("http://{addr}")).cyan()
                );
                println!("  {}", console::style("Press Ctrl+C to stop").dim());
            }

            let router = http::router::build_router(state);

            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            if !cli.quiet {
                println!("\n  Server stopped.");
            }
        }

        Commands::Completions { .. } => {}
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
