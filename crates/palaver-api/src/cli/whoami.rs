//! `palaver whoami`: the identity this machine chats as.

use anyhow::Result;
use console::style;

use crate::cli::caller::CallerArgs;
use crate::state::AppState;

pub async fn whoami(state: &AppState, caller: &CallerArgs, forget: bool, json: bool) -> Result<()> {
    if forget {
        state.identity.forget().await?;
        if json {
            println!("{}", serde_json::json!({ "forgotten": true }));
        } else {
            println!();
            println!(
                "  {} Stored session token removed. The next chat starts a new identity.",
                style("*").cyan().bold()
            );
            println!();
        }
        return Ok(());
    }

    let resolved = caller.resolve(state).await;
    let identity = resolved.chat_identity();

    if json {
        let body = serde_json::json!({
            "token": resolved.token,
            "identity": identity,
            "role": caller.role(),
            "is_authenticated": resolved.is_authenticated,
            "ephemeral": resolved.ephemeral,
            "data_dir": state.data_dir,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    println!();
    println!("  {}  {}", style("Identity:").bold(), style(&identity).cyan());
    println!("  {}     {}", style("Token:").bold(), style(&resolved.token).dim());
    println!("  {}      {}", style("Role:").bold(), caller.role());
    println!(
        "  {}      {}",
        style("Data:").bold(),
        style(state.data_dir.display()).dim()
    );
    if resolved.ephemeral {
        println!(
            "  {}",
            style("Token is ephemeral: it was not stored and lasts for this run only.").yellow()
        );
    }
    println!();
    Ok(())
}
