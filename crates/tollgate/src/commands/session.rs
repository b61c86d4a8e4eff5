//! Session command - inspect and seed the stored session.

use anyhow::Result;
use clap::{Args, Subcommand};

use super::Context;

/// Arguments for the session command.
#[derive(Args, Debug)]
pub struct SessionArgs {
    #[command(subcommand)]
    pub command: SessionCommand,
}

#[derive(Subcommand, Debug)]
pub enum SessionCommand {
    /// Show the stored session (tokens are never printed)
    Show,

    /// Store credentials obtained from a login
    Login {
        /// Access token
        #[arg(long)]
        access_token: String,

        /// Refresh token
        #[arg(long)]
        refresh_token: Option<String>,

        /// Brand context id
        #[arg(long)]
        brand: Option<String>,
    },

    /// Clear the stored session
    Clear,
}

/// Run the session command.
pub fn run(args: SessionArgs, ctx: &Context) -> Result<()> {
    match args.command {
        SessionCommand::Show => cmd_show(ctx),
        SessionCommand::Login {
            access_token,
            refresh_token,
            brand,
        } => cmd_login(ctx, access_token, refresh_token, brand),
        SessionCommand::Clear => cmd_clear(ctx),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let store = ctx.open_store();
    let session = store.get();
    let expires_at = session
        .access_token
        .as_deref()
        .and_then(tollgate_auth::token::expires_at);

    if ctx.json_output {
        let output = serde_json::json!({
            "authenticated": session.is_authenticated(),
            "refresh_token": session.refresh_token.is_some(),
            "brand_context_id": session.brand_context_id,
            "expires_at": expires_at.map(|t| t.to_rfc3339()),
            "session_file": ctx.session_file.display().to_string(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Session");
    println!("-------");
    println!("File:          {}", ctx.session_file.display());
    println!(
        "Authenticated: {}",
        if session.is_authenticated() { "yes" } else { "no" }
    );
    println!(
        "Refresh token: {}",
        if session.refresh_token.is_some() { "present" } else { "absent" }
    );
    println!(
        "Brand context: {}",
        session.brand_context_id.as_deref().unwrap_or("-")
    );
    if let Some(exp) = expires_at {
        println!("Expires:       {}", exp.to_rfc3339());
    }
    Ok(())
}

fn cmd_login(
    ctx: &Context,
    access_token: String,
    refresh_token: Option<String>,
    brand: Option<String>,
) -> Result<()> {
    let store = ctx.open_store();
    store.login(access_token, refresh_token);
    if brand.is_some() {
        store.set_brand_context(brand);
    }

    if !ctx.json_output {
        println!("Session stored in {}", ctx.session_file.display());
    }
    Ok(())
}

fn cmd_clear(ctx: &Context) -> Result<()> {
    ctx.open_store().clear();

    if !ctx.json_output {
        println!("Session cleared.");
    }
    Ok(())
}
